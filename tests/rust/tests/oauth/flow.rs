//! Authorization and callback flow tests

use pretty_assertions::assert_eq;
use tests::{
    client, location_header, query_param_of, spawn_gateway, spawn_gateway_with, GatewayOptions,
};

// =============================================================================
// /oauth/authorize
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn authorize_redirects_to_google_consent() {
    let gateway = spawn_gateway().await;

    let response = client()
        .get(gateway.url("/oauth/authorize"))
        .query(&[
            ("response_type", "code"),
            ("client_id", "mcp_12345678"),
            ("redirect_uri", "http://client.example/cb"),
            ("state", "client-xyz"),
        ])
        .send()
        .await
        .expect("authorize request");

    assert!(response.status().is_redirection());
    let location = location_header(&response);
    assert!(location.starts_with(&format!("{}/auth?", gateway.google.uri())));
    assert!(location.contains("response_type=code"));
    assert!(location.contains("access_type=offline"));
    assert!(location.contains("prompt=consent"));
    assert!(location.contains("drive.readonly"));
    assert!(location.contains("drive.metadata.readonly"));

    // The gateway's own callback is the redirect target, not the client's
    let redirect_uri = query_param_of(&location, "redirect_uri").unwrap();
    assert_eq!(
        redirect_uri,
        format!("{}/oauth/callback", gateway.base_url)
    );

    // The state in the consent URL is minted here, not the client's
    let minted = query_param_of(&location, "state").unwrap();
    assert_ne!(minted, "client-xyz");
    assert_eq!(minted.len(), 22);
}

#[tokio::test(flavor = "multi_thread")]
async fn authorize_works_without_any_parameters() {
    let gateway = spawn_gateway().await;

    let response = client()
        .get(gateway.url("/oauth/authorize"))
        .send()
        .await
        .expect("authorize request");

    assert!(response.status().is_redirection());
    assert!(location_header(&response).starts_with(&gateway.google.uri()));
}

#[tokio::test(flavor = "multi_thread")]
async fn unsupported_response_type_redirects_back_with_error() {
    let gateway = spawn_gateway().await;

    let response = client()
        .get(gateway.url("/oauth/authorize"))
        .query(&[
            ("response_type", "token"),
            ("redirect_uri", "http://client.example/cb"),
            ("state", "client-xyz"),
        ])
        .send()
        .await
        .expect("authorize request");

    assert!(response.status().is_redirection());
    let location = location_header(&response);
    assert!(location.starts_with("http://client.example/cb?"));
    assert_eq!(
        query_param_of(&location, "error").as_deref(),
        Some("unsupported_response_type")
    );
    assert_eq!(
        query_param_of(&location, "state").as_deref(),
        Some("client-xyz")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unsupported_response_type_without_redirect_renders_a_page() {
    let gateway = spawn_gateway().await;

    let response = client()
        .get(gateway.url("/oauth/authorize"))
        .query(&[("response_type", "token")])
        .send()
        .await
        .expect("authorize request");

    assert_eq!(response.status(), 400);
    let body = response.text().await.unwrap();
    assert!(body.contains("unsupported_response_type"));
}

// =============================================================================
// /oauth/callback
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn callback_redirects_to_the_client_with_a_proxy_code() {
    let gateway = spawn_gateway().await;
    gateway.mount_token_exchange().await;

    let state = gateway
        .start_authorization(Some("http://client.example/cb"), Some("client-xyz"))
        .await;
    let response = gateway.finish_authorization(&state).await;

    assert!(response.status().is_redirection());
    let location = location_header(&response);
    assert!(location.starts_with("http://client.example/cb?"));

    // The client gets a gateway-minted code, never Google's
    let code = query_param_of(&location, "code").unwrap();
    assert!(code.starts_with("gdp_"));
    assert_ne!(code, "google-code-123");

    // The client's own state comes back verbatim
    assert_eq!(
        query_param_of(&location, "state").as_deref(),
        Some("client-xyz")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn callback_state_cannot_be_replayed() {
    let gateway = spawn_gateway().await;
    gateway.mount_token_exchange().await;

    let state = gateway
        .start_authorization(Some("http://client.example/cb"), None)
        .await;
    let first = gateway.finish_authorization(&state).await;
    assert!(first.status().is_redirection());

    let replay = gateway.finish_authorization(&state).await;
    assert_eq!(replay.status(), 400);
    let body = replay.text().await.unwrap();
    assert!(body.contains("invalid_state"));
}

#[tokio::test(flavor = "multi_thread")]
async fn callback_rejects_states_it_never_minted() {
    let gateway = spawn_gateway().await;

    let response = gateway.finish_authorization("not-a-minted-state").await;
    assert_eq!(response.status(), 400);
    assert!(response.text().await.unwrap().contains("invalid_state"));
}

#[tokio::test(flavor = "multi_thread")]
async fn expired_state_is_rejected() {
    let gateway = spawn_gateway_with(GatewayOptions {
        state_ttl_secs: 0,
        ..Default::default()
    })
    .await;
    gateway.mount_token_exchange().await;

    let state = gateway
        .start_authorization(Some("http://client.example/cb"), None)
        .await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let response = gateway.finish_authorization(&state).await;
    assert_eq!(response.status(), 400);
    assert!(response.text().await.unwrap().contains("invalid_state"));
}

#[tokio::test(flavor = "multi_thread")]
async fn callback_with_a_google_error_renders_a_failure_page() {
    let gateway = spawn_gateway().await;

    let response = client()
        .get(gateway.url("/oauth/callback"))
        .query(&[
            ("error", "access_denied"),
            ("error_description", "User denied access"),
        ])
        .send()
        .await
        .expect("callback request");

    assert_eq!(response.status(), 400);
    let body = response.text().await.unwrap();
    assert!(body.contains("access_denied"));
    assert!(body.contains("User denied access"));
}

#[tokio::test(flavor = "multi_thread")]
async fn callback_without_a_code_is_invalid_request() {
    let gateway = spawn_gateway().await;

    let state = gateway.start_authorization(None, None).await;
    let response = client()
        .get(gateway.url("/oauth/callback"))
        .query(&[("state", state.as_str())])
        .send()
        .await
        .expect("callback request");

    assert_eq!(response.status(), 400);
    assert!(response.text().await.unwrap().contains("invalid_request"));
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_exchange_renders_a_server_error_page() {
    let gateway = spawn_gateway().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/token"))
        .respond_with(wiremock::ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&gateway.google)
        .await;

    let state = gateway
        .start_authorization(Some("http://client.example/cb"), None)
        .await;
    let response = gateway.finish_authorization(&state).await;

    assert_eq!(response.status(), 500);
    assert!(response.text().await.unwrap().contains("server_error"));
}

#[tokio::test(flavor = "multi_thread")]
async fn manual_flow_renders_the_token_page() {
    let gateway = spawn_gateway().await;
    gateway.mount_token_exchange().await;

    // No redirect_uri: the user is pasting the token by hand
    let state = gateway.start_authorization(None, None).await;
    let response = gateway.finish_authorization(&state).await;

    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("Authorization complete"));
    assert!(body.contains("ya29.mock-access"));
    assert!(body.contains("1//mock-refresh"));
}
