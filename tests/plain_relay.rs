//! Plain HTTP relaying through a running proxy.

use reqwest::StatusCode;
use std::sync::atomic::Ordering;

mod common;

use common::{authed_client, client_via, spawn_proxy, start_echo_origin, test_config};

#[tokio::test]
async fn test_relays_every_method() {
    let (origin, hits) = start_echo_origin().await;
    let proxy = spawn_proxy(test_config()).await;
    let client = authed_client(proxy.addr);

    for method in ["GET", "POST", "PUT", "DELETE", "PATCH"] {
        let method = reqwest::Method::from_bytes(method.as_bytes()).unwrap();
        let res = client
            .request(method.clone(), format!("http://{origin}/items/7"))
            .body("payload")
            .send()
            .await
            .unwrap();

        let expected = if method == reqwest::Method::POST {
            StatusCode::CREATED
        } else {
            StatusCode::OK
        };
        assert_eq!(res.status(), expected, "{method}");
        let body = res.text().await.unwrap();
        assert!(body.starts_with(&format!("method: {method}\npath: /items/7\n")), "{body}");
        assert!(body.contains("body-length: 7\n"), "{body}");
    }

    assert_eq!(hits.load(Ordering::SeqCst), 5);
    proxy.stop().await;
}

#[tokio::test]
async fn test_missing_credentials_get_challenge() {
    let (origin, hits) = start_echo_origin().await;
    let proxy = spawn_proxy(test_config()).await;
    let client = client_via(proxy.addr, None);

    for method in ["GET", "POST", "PUT", "DELETE"] {
        let method = reqwest::Method::from_bytes(method.as_bytes()).unwrap();
        let res = client
            .request(method.clone(), format!("http://{origin}/"))
            .body("payload")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::PROXY_AUTHENTICATION_REQUIRED, "{method}");
        assert_eq!(
            res.headers().get("proxy-authenticate").unwrap(),
            "Basic realm=\"Proxy Server\""
        );
        assert_eq!(res.text().await.unwrap(), "Proxy Authentication Required");
    }

    assert_eq!(hits.load(Ordering::SeqCst), 0, "origin must not be contacted");
    proxy.stop().await;
}

#[tokio::test]
async fn test_wrong_password_rejected() {
    let (origin, hits) = start_echo_origin().await;
    let proxy = spawn_proxy(test_config()).await;
    let client = client_via(proxy.addr, Some((common::USERNAME, "not-the-password")));

    let res = client.get(format!("http://{origin}/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::PROXY_AUTHENTICATION_REQUIRED);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    proxy.stop().await;
}

#[tokio::test]
async fn test_custom_realm_in_challenge() {
    let mut config = test_config();
    config.auth.realm = "Corp Egress".to_string();
    let proxy = spawn_proxy(config).await;
    let client = client_via(proxy.addr, None);

    let res = client.get("http://127.0.0.1:1/").send().await.unwrap();
    assert_eq!(
        res.headers().get("proxy-authenticate").unwrap(),
        "Basic realm=\"Corp Egress\""
    );
    proxy.stop().await;
}

#[tokio::test]
async fn test_unreachable_origin_is_bad_gateway() {
    let target = common::unused_addr().await;
    let proxy = spawn_proxy(test_config()).await;
    let client = authed_client(proxy.addr);

    let res = client.get(format!("http://{target}/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(res.text().await.unwrap(), "Error making proxy request");
    proxy.stop().await;
}

#[tokio::test]
async fn test_proxy_headers_stripped_and_others_forwarded() {
    let (origin, _) = start_echo_origin().await;
    let proxy = spawn_proxy(test_config()).await;
    let client = authed_client(proxy.addr);

    let res = client
        .get(format!("http://{origin}/headers"))
        .header("Proxy-Connection", "keep-alive")
        .header("X-Request-Tag", "alpha")
        .header("Accept", "text/plain")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.text().await.unwrap().to_ascii_lowercase();
    assert!(!body.contains("proxy-authorization"), "{body}");
    assert!(!body.contains("proxy-connection"), "{body}");
    assert!(body.contains("x-request-tag: alpha\n"), "{body}");
    assert!(body.contains("accept: text/plain\n"), "{body}");
    assert!(body.contains(&format!("host: {origin}\n")), "{body}");
    proxy.stop().await;
}

#[tokio::test]
async fn test_response_headers_passed_through() {
    let (origin, _) = start_echo_origin().await;
    let proxy = spawn_proxy(test_config()).await;
    let client = authed_client(proxy.addr);

    let res = client.get(format!("http://{origin}/")).send().await.unwrap();
    assert_eq!(res.headers().get("x-origin").unwrap(), "echo");
    let multi: Vec<_> = res
        .headers()
        .get_all("x-multi")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert_eq!(multi, vec!["a", "b"]);
    proxy.stop().await;
}

#[tokio::test]
async fn test_large_bodies_stream_both_ways() {
    let (origin, _) = start_echo_origin().await;
    let proxy = spawn_proxy(test_config()).await;
    let client = authed_client(proxy.addr);

    let upload = vec![b'u'; common::LARGE_BODY_LEN];
    let res = client
        .post(format!("http://{origin}/upload"))
        .body(upload)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = res.text().await.unwrap();
    assert!(
        body.contains(&format!("body-length: {}\n", common::LARGE_BODY_LEN)),
        "{body}"
    );

    let res = client
        .get(format!("http://{origin}/large"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = res.bytes().await.unwrap();
    assert_eq!(bytes.len(), common::LARGE_BODY_LEN);
    assert!(bytes.iter().all(|&b| b == b'x'));
    proxy.stop().await;
}
