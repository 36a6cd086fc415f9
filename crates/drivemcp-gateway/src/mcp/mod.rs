//! MCP request dispatch.
//!
//! One dispatcher serves every transport: stdio, SSE, and streamable
//! HTTP all decode a JSON-RPC message, hand it to [`McpDispatcher::handle`]
//! with the identity the transport authenticated, and ship the response
//! back however their wire format wants it.

pub mod protocol;
pub mod stdio;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use drivemcp_core::drive::DRIVE_API_BASE;
use drivemcp_core::{CoreError, DriveClient, FileContent};

use crate::auth::AuthContext;
use protocol::{
    error_codes, Capabilities, Implementation, InitializeResult, JsonRpcRequest, Resource,
    ResourceContents, ResourcesListParams, ResourcesListResult, ResourcesReadParams,
    ResourcesReadResult, Tool, ToolCallParams, ToolCallResult, ToolsListResult,
    PROTOCOL_VERSION,
};

/// URI scheme for Drive-backed resources.
pub const RESOURCE_SCHEME: &str = "gdrive:///";

const LIST_PAGE_SIZE: u32 = 100;
const SEARCH_PAGE_SIZE: u32 = 25;

/// Method outcome: a result value, or an error code with message.
type DispatchResult = Result<Value, (i64, String)>;

/// Stateless MCP method dispatcher backed by the Drive API.
#[derive(Debug, Clone)]
pub struct McpDispatcher {
    server_name: String,
    server_version: String,
    drive_base_url: String,
}

impl Default for McpDispatcher {
    fn default() -> Self {
        Self::new(DRIVE_API_BASE)
    }
}

impl McpDispatcher {
    pub fn new(drive_base_url: impl Into<String>) -> Self {
        Self {
            server_name: "drivemcp".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            drive_base_url: drive_base_url.into(),
        }
    }

    /// Dispatch one decoded JSON-RPC message. Returns `None` when no
    /// response should be sent (notifications).
    pub async fn handle(&self, raw: Value, auth: &AuthContext) -> Option<Value> {
        let request: JsonRpcRequest = match serde_json::from_value(raw) {
            Ok(request) => request,
            Err(err) => {
                warn!("[MCP] Discarding malformed request: {}", err);
                return Some(protocol::error_response(
                    Value::Null,
                    error_codes::INVALID_REQUEST,
                    format!("Invalid request: {}", err),
                ));
            }
        };

        debug!("[MCP] {} (id: {:?})", request.method, request.id);

        let id = request.id.clone();
        let result = match request.method.as_str() {
            "initialize" => to_result(self.initialize_result()),
            "notifications/initialized" | "notifications/cancelled" => return None,
            "ping" => Ok(json!({})),
            "tools/list" => to_result(ToolsListResult {
                tools: self.tool_definitions(),
            }),
            "tools/call" => self.tools_call(request.params, auth).await,
            "resources/list" => self.resources_list(request.params, auth).await,
            "resources/read" => self.resources_read(request.params, auth).await,
            other => Err((
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            )),
        };

        // Requests without an id are notifications: even failures
        // produce no response for them.
        let id = id?;
        Some(match result {
            Ok(result) => protocol::response(id, result),
            Err((code, message)) => protocol::error_response(id, code, message),
        })
    }

    fn initialize_result(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: Capabilities {
                tools: Some(json!({})),
                resources: Some(json!({})),
            },
            server_info: Implementation {
                name: self.server_name.clone(),
                version: self.server_version.clone(),
            },
        }
    }

    fn tool_definitions(&self) -> Vec<Tool> {
        vec![
            Tool {
                name: "search".to_string(),
                description: "Search for files in Google Drive".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Full-text search query",
                        },
                        "pageToken": {
                            "type": "string",
                            "description": "Token for the next page of results",
                        },
                    },
                    "required": ["query"],
                }),
            },
            Tool {
                name: "read_file".to_string(),
                description: "Read the contents of a file from Google Drive".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "file_id": {
                            "type": "string",
                            "description": "ID of the file to read",
                        },
                    },
                    "required": ["file_id"],
                }),
            },
        ]
    }

    async fn tools_call(&self, params: Value, auth: &AuthContext) -> DispatchResult {
        let params: ToolCallParams = serde_json::from_value(params)
            .map_err(|err| (error_codes::INVALID_PARAMS, format!("Invalid params: {}", err)))?;

        let drive = auth.drive_client(&self.drive_base_url);
        let result = match params.name.as_str() {
            "search" => self.run_search(&drive, &params.arguments).await,
            "read_file" => self.run_read_file(&drive, &params.arguments).await,
            other => {
                return Err((
                    error_codes::INVALID_PARAMS,
                    format!("Unknown tool: {}", other),
                ))
            }
        };
        to_result(result)
    }

    async fn run_search(&self, drive: &DriveClient, arguments: &Value) -> ToolCallResult {
        let Some(query) = arguments.get("query").and_then(Value::as_str) else {
            return ToolCallResult::error("search requires a 'query' argument");
        };
        let page_token = arguments.get("pageToken").and_then(Value::as_str);

        match drive.search(query, SEARCH_PAGE_SIZE, page_token).await {
            Ok(list) => {
                let mut lines = vec![format!("Found {} files:", list.files.len())];
                for file in &list.files {
                    lines.push(format!("{} ({}) [{}]", file.name, file.mime_type, file.id));
                }
                if let Some(token) = &list.next_page_token {
                    lines.push(format!("More results available with pageToken: {}", token));
                }
                ToolCallResult::text(lines.join("\n"))
            }
            // Tool-level failures are reported in-band, not as protocol
            // errors.
            Err(err) => ToolCallResult::error(err.to_string()),
        }
    }

    async fn run_read_file(&self, drive: &DriveClient, arguments: &Value) -> ToolCallResult {
        let Some(file_id) = arguments.get("file_id").and_then(Value::as_str) else {
            return ToolCallResult::error("read_file requires a 'file_id' argument");
        };

        match drive.read_file(file_id).await {
            Ok((file, FileContent::Text { mime_type, body })) => {
                ToolCallResult::text(format!("{} ({}):\n{}", file.name, mime_type, body))
            }
            Ok((file, FileContent::Binary { mime_type, data })) => ToolCallResult::text(format!(
                "{} ({}, {} bytes, base64):\n{}",
                file.name,
                mime_type,
                data.len(),
                BASE64_STANDARD.encode(&data)
            )),
            Err(err) => ToolCallResult::error(err.to_string()),
        }
    }

    async fn resources_list(&self, params: Value, auth: &AuthContext) -> DispatchResult {
        let params: ResourcesListParams = parse_params(params)?;
        let drive = auth.drive_client(&self.drive_base_url);
        let list = drive
            .list(None, LIST_PAGE_SIZE, params.cursor.as_deref())
            .await
            .map_err(drive_error)?;

        let resources = list
            .files
            .into_iter()
            .map(|file| Resource {
                uri: format!("{}{}", RESOURCE_SCHEME, file.id),
                name: file.name,
                mime_type: Some(file.mime_type),
            })
            .collect();

        to_result(ResourcesListResult {
            resources,
            next_cursor: list.next_page_token,
        })
    }

    async fn resources_read(&self, params: Value, auth: &AuthContext) -> DispatchResult {
        let params: ResourcesReadParams = serde_json::from_value(params)
            .map_err(|err| (error_codes::INVALID_PARAMS, format!("Invalid params: {}", err)))?;

        let Some(file_id) = params.uri.strip_prefix(RESOURCE_SCHEME) else {
            return Err((
                error_codes::INVALID_PARAMS,
                format!("Unsupported resource URI: {}", params.uri),
            ));
        };

        let drive = auth.drive_client(&self.drive_base_url);
        let (_, content) = drive.read_file(file_id).await.map_err(drive_error)?;

        let contents = match content {
            FileContent::Text { mime_type, body } => ResourceContents {
                uri: params.uri.clone(),
                mime_type: Some(mime_type),
                text: Some(body),
                blob: None,
            },
            FileContent::Binary { mime_type, data } => ResourceContents {
                uri: params.uri.clone(),
                mime_type: Some(mime_type),
                text: None,
                blob: Some(BASE64_STANDARD.encode(&data)),
            },
        };

        to_result(ResourcesReadResult {
            contents: vec![contents],
        })
    }
}

fn to_result<T: Serialize>(value: T) -> DispatchResult {
    serde_json::to_value(value).map_err(|err| {
        (
            error_codes::INTERNAL_ERROR,
            format!("Serialization failed: {}", err),
        )
    })
}

/// Missing params means "use the defaults" for list-style methods.
fn parse_params<T: DeserializeOwned + Default>(params: Value) -> Result<T, (i64, String)> {
    if params.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(params)
        .map_err(|err| (error_codes::INVALID_PARAMS, format!("Invalid params: {}", err)))
}

fn drive_error(err: CoreError) -> (i64, String) {
    (error_codes::INTERNAL_ERROR, err.to_string())
}
