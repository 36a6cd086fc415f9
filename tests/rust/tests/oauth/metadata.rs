//! Discovery metadata tests (RFC 8414 and RFC 9728)

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tests::{client, spawn_gateway};

#[tokio::test(flavor = "multi_thread")]
async fn authorization_server_metadata_follows_rfc8414() {
    let gateway = spawn_gateway().await;

    let response = client()
        .get(gateway.url("/.well-known/oauth-authorization-server"))
        .send()
        .await
        .expect("metadata request");

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();

    let base = &gateway.base_url;
    assert_eq!(body["issuer"], *base);
    assert_eq!(
        body["authorization_endpoint"],
        format!("{}/oauth/authorize", base)
    );
    assert_eq!(body["token_endpoint"], format!("{}/oauth/token", base));
    assert_eq!(
        body["registration_endpoint"],
        format!("{}/oauth/register", base)
    );
    assert_eq!(body["response_types_supported"], json!(["code"]));
    assert_eq!(
        body["grant_types_supported"],
        json!(["authorization_code", "refresh_token"])
    );
    assert_eq!(
        body["token_endpoint_auth_methods_supported"],
        json!(["none"])
    );

    let scopes = body["scopes_supported"].as_array().unwrap();
    assert!(scopes
        .iter()
        .any(|s| s.as_str().unwrap().ends_with("drive.readonly")));
    assert!(scopes
        .iter()
        .any(|s| s.as_str().unwrap().ends_with("drive.metadata.readonly")));

    // Codes are proxied to Google untouched, so PKCE support is not claimed
    assert!(body.get("code_challenge_methods_supported").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn protected_resource_metadata_points_at_this_server() {
    let gateway = spawn_gateway().await;

    let response = client()
        .get(gateway.url("/.well-known/oauth-protected-resource"))
        .send()
        .await
        .expect("metadata request");

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["resource"], gateway.base_url);
    assert_eq!(body["authorization_servers"], json!([gateway.base_url]));
    assert_eq!(body["bearer_methods_supported"], json!(["header"]));
}

#[tokio::test(flavor = "multi_thread")]
async fn the_401_pointer_resolves_to_fetchable_metadata() {
    let gateway = spawn_gateway().await;

    let challenge = client()
        .post(gateway.url("/mcp"))
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}))
        .send()
        .await
        .expect("unauthenticated request");
    assert_eq!(challenge.status(), 401);

    let body: Value = challenge.json().await.unwrap();
    let metadata_url = body["resource_metadata"].as_str().unwrap().to_string();

    let metadata = client()
        .get(&metadata_url)
        .send()
        .await
        .expect("metadata request");
    assert_eq!(metadata.status(), 200);
    let metadata: Value = metadata.json().await.unwrap();
    assert_eq!(metadata["resource"], gateway.base_url);
}
