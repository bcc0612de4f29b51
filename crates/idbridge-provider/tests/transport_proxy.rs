//! Proxy routing and credential scope of the shared transport.

use idbridge_provider::Transport;
use idbridge_provider::config::{ProxyConfig, TransportConfig};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn proxied(proxy: &MockServer, no_proxy: Option<&str>) -> Transport {
    let config = TransportConfig {
        proxy: Some(ProxyConfig {
            uri: proxy.uri(),
            username: Some("svc".to_string()),
            password: Some("pw".to_string()),
            no_proxy: no_proxy.map(str::to_string),
        }),
        ..TransportConfig::default()
    };
    Transport::provision(&config, Vec::new()).unwrap()
}

#[tokio::test]
async fn test_proxy_receives_credentials() {
    let proxy = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/realms/test/.well-known/openid-configuration"))
        // base64("svc:pw")
        .and(header("proxy-authorization", "Basic c3ZjOnB3"))
        .respond_with(ResponseTemplate::new(200).set_body_string("via proxy"))
        .expect(1)
        .mount(&proxy)
        .await;

    let transport = proxied(&proxy, None);
    let response = transport
        .execute(transport.get("http://idp.proxied.test/realms/test/.well-known/openid-configuration"))
        .await
        .unwrap();
    assert_eq!(response.body(), "via proxy");
}

#[tokio::test]
async fn test_bypassed_host_never_sees_proxy_credentials() {
    let proxy = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&proxy)
        .await;

    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/direct"))
        .and(|request: &Request| !request.headers.contains_key("proxy-authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_string("direct"))
        .expect(1)
        .mount(&origin)
        .await;

    let transport = proxied(&proxy, Some("127.0.0.1,localhost"));
    let response = transport
        .execute(transport.get(&format!("{}/direct", origin.uri())))
        .await
        .unwrap();
    assert_eq!(response.body(), "direct");
}

#[tokio::test]
async fn test_direct_request_without_proxy() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/plain"))
        .respond_with(ResponseTemplate::new(200).set_body_string("plain"))
        .expect(1)
        .mount(&origin)
        .await;

    let transport = Transport::provision(&TransportConfig::default(), Vec::new()).unwrap();
    let response = transport
        .execute(transport.get(&format!("{}/plain", origin.uri())))
        .await
        .unwrap();
    assert_eq!(response.body(), "plain");
}
