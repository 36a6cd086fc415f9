//! Streamable HTTP transport tests

use drivemcp_gateway::AuthPolicy;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tests::{
    client, initialize_request, preauth_context, read_sse_until, session_id_from_endpoint,
    spawn_gateway_with, GatewayOptions, TestGateway,
};

async fn spawn_open_gateway() -> TestGateway {
    spawn_gateway_with(GatewayOptions {
        auth_policy: AuthPolicy::Disabled,
        preauth: Some(preauth_context()),
        ..Default::default()
    })
    .await
}

async fn open_session(gateway: &TestGateway) -> String {
    let response = client()
        .post(gateway.url("/mcp"))
        .json(&initialize_request(1))
        .send()
        .await
        .expect("initialize request");
    assert_eq!(response.status(), 200);
    response
        .headers()
        .get("mcp-session-id")
        .expect("session header")
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test(flavor = "multi_thread")]
async fn initialize_mints_a_session() {
    let gateway = spawn_open_gateway().await;

    let response = client()
        .post(gateway.url("/mcp"))
        .json(&initialize_request(1))
        .send()
        .await
        .expect("initialize request");

    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("mcp-session-id"));

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(body["result"]["serverInfo"]["name"], "drivemcp");
}

#[tokio::test(flavor = "multi_thread")]
async fn requests_without_a_session_are_rejected() {
    let gateway = spawn_open_gateway().await;

    let response = client()
        .post(gateway.url("/mcp"))
        .json(&json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
        .send()
        .await
        .expect("mcp request");

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32600);
    assert_eq!(body["id"], Value::Null);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_sessions_are_not_found() {
    let gateway = spawn_open_gateway().await;

    let response = client()
        .post(gateway.url("/mcp"))
        .header("mcp-session-id", "no-such-session")
        .json(&json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
        .send()
        .await
        .expect("mcp request");

    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Session not found"));
}

#[tokio::test(flavor = "multi_thread")]
async fn tools_list_over_a_session() {
    let gateway = spawn_open_gateway().await;
    let session = open_session(&gateway).await;

    let response = client()
        .post(gateway.url("/mcp"))
        .header("mcp-session-id", &session)
        .json(&json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
        .send()
        .await
        .expect("mcp request");

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let tools = body["result"]["tools"].as_array().unwrap();
    let names: Vec<&str> = tools
        .iter()
        .map(|tool| tool["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["search", "read_file"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn notifications_are_acknowledged_without_a_body() {
    let gateway = spawn_open_gateway().await;
    let session = open_session(&gateway).await;

    let response = client()
        .post(gateway.url("/mcp"))
        .header("mcp-session-id", &session)
        .json(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .send()
        .await
        .expect("mcp request");

    assert_eq!(response.status(), 202);
    assert!(response.text().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn tool_calls_reach_the_drive_api() {
    let gateway = spawn_open_gateway().await;
    gateway.mount_drive_file_list().await;
    let session = open_session(&gateway).await;

    let response = client()
        .post(gateway.url("/mcp"))
        .header("mcp-session-id", &session)
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": "search", "arguments": {"query": "report"}},
        }))
        .send()
        .await
        .expect("mcp request");

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert!(body["result"].get("isError").is_none());
    let text = body["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.starts_with("Found 2 files:"), "got {}", text);
    assert!(text.contains("Q3 Report"));
}

#[tokio::test(flavor = "multi_thread")]
async fn sse_sessions_cannot_be_used_on_the_streamable_transport() {
    let gateway = spawn_open_gateway().await;

    let mut stream = client()
        .get(gateway.url("/sse"))
        .send()
        .await
        .expect("sse request");
    let buffer = read_sse_until(&mut stream, |buf| buf.contains("\n\n")).await;
    let session = session_id_from_endpoint(&buffer);

    let response = client()
        .post(gateway.url("/mcp"))
        .header("mcp-session-id", &session)
        .json(&json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
        .send()
        .await
        .expect("mcp request");

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("different transport protocol"));
}

#[tokio::test(flavor = "multi_thread")]
async fn the_push_stream_attaches_with_get() {
    let gateway = spawn_open_gateway().await;
    let session = open_session(&gateway).await;

    let response = client()
        .get(gateway.url("/mcp"))
        .header("mcp-session-id", &session)
        .send()
        .await
        .expect("mcp stream request");

    assert_eq!(response.status(), 200);
    let content_type = response
        .headers()
        .get("content-type")
        .expect("content type")
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_closes_the_session() {
    let gateway = spawn_open_gateway().await;
    let session = open_session(&gateway).await;

    let deleted = client()
        .delete(gateway.url("/mcp"))
        .header("mcp-session-id", &session)
        .send()
        .await
        .expect("delete request");
    assert_eq!(deleted.status(), 204);

    let after = client()
        .post(gateway.url("/mcp"))
        .header("mcp-session-id", &session)
        .json(&json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}))
        .send()
        .await
        .expect("mcp request");
    assert_eq!(after.status(), 404);

    let again = client()
        .delete(gateway.url("/mcp"))
        .header("mcp-session-id", &session)
        .send()
        .await
        .expect("delete request");
    assert_eq!(again.status(), 404);
}
