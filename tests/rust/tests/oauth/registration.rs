//! Dynamic client registration tests

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tests::{client, location_header, spawn_gateway};

#[tokio::test(flavor = "multi_thread")]
async fn registration_returns_created_with_a_minted_id() {
    let gateway = spawn_gateway().await;

    let response = client()
        .post(gateway.url("/oauth/register"))
        .json(&json!({
            "redirect_uris": ["http://127.0.0.1:33418/callback"],
            "client_name": "Inspector",
        }))
        .send()
        .await
        .expect("register request");

    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();

    let client_id = body["client_id"].as_str().unwrap();
    assert!(client_id.starts_with("mcp_"), "got {}", client_id);
    assert_eq!(client_id.len(), "mcp_".len() + 8);

    assert_eq!(body["client_name"], "Inspector");
    assert_eq!(
        body["redirect_uris"],
        json!(["http://127.0.0.1:33418/callback"])
    );
    assert_eq!(body["token_endpoint_auth_method"], "none");
    assert!(body["client_id_issued_at"].as_i64().unwrap() > 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn registration_defaults_apply_when_the_body_is_minimal() {
    let gateway = spawn_gateway().await;

    let response = client()
        .post(gateway.url("/oauth/register"))
        .json(&json!({}))
        .send()
        .await
        .expect("register request");

    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["client_name"], "MCP Client");
    assert_eq!(body["response_types"], json!(["code"]));
    assert_eq!(
        body["grant_types"],
        json!(["authorization_code", "refresh_token"])
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn registered_ids_are_unique() {
    let gateway = spawn_gateway().await;

    let mut seen = std::collections::HashSet::new();
    for _ in 0..4 {
        let response = client()
            .post(gateway.url("/oauth/register"))
            .json(&json!({"client_name": "Repeat"}))
            .send()
            .await
            .expect("register request");
        let body: Value = response.json().await.unwrap();
        seen.insert(body["client_id"].as_str().unwrap().to_string());
    }
    assert_eq!(seen.len(), 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn registration_is_not_required_to_authorize() {
    let gateway = spawn_gateway().await;

    // A client_id the gateway has never seen still gets the Google redirect
    let response = client()
        .get(gateway.url(
            "/oauth/authorize?response_type=code&client_id=mcp_unregistered\
             &redirect_uri=http%3A%2F%2F127.0.0.1%3A41100%2Fcb",
        ))
        .send()
        .await
        .expect("authorize request");

    assert!(response.status().is_redirection());
    let location = location_header(&response);
    assert!(location.starts_with(&format!("{}/auth?", gateway.google.uri())));
}
