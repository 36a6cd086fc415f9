//! Bearer token middleware tests

use drivemcp_gateway::AuthPolicy;
use pretty_assertions::assert_eq;
use serde_json::Value;
use tests::{
    client, initialize_request, preauth_context, spawn_gateway, spawn_gateway_with,
    GatewayOptions,
};

const DRIVE_SCOPES: &str = "https://www.googleapis.com/auth/drive.readonly \
     https://www.googleapis.com/auth/drive.metadata.readonly";

#[tokio::test(flavor = "multi_thread")]
async fn protected_routes_require_a_bearer_token() {
    let gateway = spawn_gateway().await;

    let response = client()
        .post(gateway.url("/mcp"))
        .json(&initialize_request(1))
        .send()
        .await
        .expect("mcp request");

    assert_eq!(response.status(), 401);

    let challenge = response
        .headers()
        .get("www-authenticate")
        .expect("WWW-Authenticate header")
        .to_str()
        .unwrap()
        .to_string();
    assert!(challenge.starts_with("Bearer realm=\"drivemcp\""));
    assert!(challenge.contains("error=\"invalid_token\""));
    assert!(challenge.contains(&format!(
        "resource_metadata=\"{}/.well-known/oauth-protected-resource\"",
        gateway.base_url
    )));

    let link = response
        .headers()
        .get("link")
        .expect("Link header")
        .to_str()
        .unwrap()
        .to_string();
    assert!(link.contains("rel=\"oauth-protected-resource\""));

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "invalid_token");
    assert_eq!(body["error_description"], "Missing Authorization header");
}

#[tokio::test(flavor = "multi_thread")]
async fn non_bearer_schemes_are_invalid_request() {
    let gateway = spawn_gateway().await;

    let response = client()
        .post(gateway.url("/mcp"))
        .header("authorization", "Basic dXNlcjpwYXNz")
        .json(&initialize_request(1))
        .send()
        .await
        .expect("mcp request");

    assert_eq!(response.status(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "invalid_request");
    assert_eq!(
        body["error_description"],
        "Authorization header must use the Bearer scheme"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_tokens_are_unauthorized() {
    let gateway = spawn_gateway().await;
    // No tokeninfo mock mounted: Google answers 404 for the lookup

    let response = client()
        .post(gateway.url("/mcp"))
        .header("authorization", "Bearer ya29.forged")
        .json(&initialize_request(1))
        .send()
        .await
        .expect("mcp request");

    assert_eq!(response.status(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "invalid_token");
    assert_eq!(body["error_description"], "Token is invalid or expired");
}

#[tokio::test(flavor = "multi_thread")]
async fn tokens_without_drive_scopes_are_forbidden() {
    let gateway = spawn_gateway().await;
    gateway.mount_tokeninfo("ya29.narrow", "openid email").await;

    let response = client()
        .post(gateway.url("/mcp"))
        .header("authorization", "Bearer ya29.narrow")
        .json(&initialize_request(1))
        .send()
        .await
        .expect("mcp request");

    assert_eq!(response.status(), 403);
    assert!(response.headers().get("www-authenticate").is_none());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_scope");
    assert_eq!(
        body["error_description"],
        "Token is missing the required Google Drive scopes"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn valid_tokens_are_revalidated_on_every_request() {
    let gateway = spawn_gateway().await;
    gateway.mount_tokeninfo("ya29.live", DRIVE_SCOPES).await;

    for id in 1..=2 {
        let response = client()
            .post(gateway.url("/mcp"))
            .header("authorization", "Bearer ya29.live")
            .json(&initialize_request(id))
            .send()
            .await
            .expect("mcp request");
        assert_eq!(response.status(), 200);
    }

    let lookups = gateway
        .google
        .received_requests()
        .await
        .expect("recorded requests")
        .into_iter()
        .filter(|request| request.url.path() == "/tokeninfo")
        .count();
    assert_eq!(lookups, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn optional_policy_falls_back_to_the_stored_credential() {
    let gateway = spawn_gateway_with(GatewayOptions {
        auth_policy: AuthPolicy::Optional,
        preauth: Some(preauth_context()),
        ..Default::default()
    })
    .await;

    let response = client()
        .post(gateway.url("/mcp"))
        .json(&initialize_request(1))
        .send()
        .await
        .expect("mcp request");

    assert_eq!(response.status(), 200);
}

#[tokio::test(flavor = "multi_thread")]
async fn optional_policy_still_rejects_bad_tokens() {
    let gateway = spawn_gateway_with(GatewayOptions {
        auth_policy: AuthPolicy::Optional,
        preauth: Some(preauth_context()),
        ..Default::default()
    })
    .await;

    let response = client()
        .post(gateway.url("/mcp"))
        .header("authorization", "Bearer ya29.forged")
        .json(&initialize_request(1))
        .send()
        .await
        .expect("mcp request");

    assert_eq!(response.status(), 401);
}

#[tokio::test(flavor = "multi_thread")]
async fn disabled_policy_skips_validation_entirely() {
    let gateway = spawn_gateway_with(GatewayOptions {
        auth_policy: AuthPolicy::Disabled,
        preauth: Some(preauth_context()),
        ..Default::default()
    })
    .await;

    let response = client()
        .post(gateway.url("/mcp"))
        .json(&initialize_request(1))
        .send()
        .await
        .expect("mcp request");
    assert_eq!(response.status(), 200);

    let lookups = gateway
        .google
        .received_requests()
        .await
        .expect("recorded requests")
        .into_iter()
        .filter(|request| request.url.path() == "/tokeninfo")
        .count();
    assert_eq!(lookups, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn public_paths_bypass_validation() {
    let gateway = spawn_gateway().await;

    let health = client()
        .get(gateway.url("/health"))
        .send()
        .await
        .expect("health request");
    assert_eq!(health.status(), 200);

    let metadata = client()
        .get(gateway.url("/.well-known/oauth-authorization-server"))
        .send()
        .await
        .expect("metadata request");
    assert_eq!(metadata.status(), 200);

    // /message is public too; it fails on the missing session, not on auth
    let message = client()
        .post(gateway.url("/message"))
        .json(&initialize_request(1))
        .send()
        .await
        .expect("message request");
    assert_eq!(message.status(), 400);
}
