//! DriveMCP Gateway
//!
//! MCP server for Google Drive that provides:
//! - OAuth 2.0 authorization-code proxying against Google
//! - RFC 8414 / RFC 9728 discovery metadata
//! - Bearer-token validation via Google tokeninfo
//! - Streamable HTTP and legacy SSE MCP transports
//! - A stdio transport for local single-user use

pub mod auth;
pub mod mcp;
pub mod oauth;
pub mod server;

pub use auth::{AuthContext, AuthPolicy};
pub use mcp::McpDispatcher;
pub use oauth::GoogleEndpoints;
pub use server::{AppState, GatewayConfig, GatewayServer};
