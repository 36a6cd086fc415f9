//! Stdio transport for local MCP clients.
//!
//! Messages are newline-delimited JSON on stdin and stdout. All logging
//! must stay on stderr or it would corrupt the protocol stream.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use crate::auth::AuthContext;

use super::protocol::{self, error_codes};
use super::McpDispatcher;

/// Serves MCP over stdin/stdout under a single fixed identity.
pub struct StdioTransport {
    dispatcher: McpDispatcher,
    auth: AuthContext,
}

impl StdioTransport {
    pub fn new(dispatcher: McpDispatcher, auth: AuthContext) -> Self {
        Self { dispatcher, auth }
    }

    /// Serve requests until stdin closes.
    pub async fn run(self) -> std::io::Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    async fn serve<R, W>(self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();

        info!("[Stdio] Serving MCP on stdin/stdout");
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                info!("[Stdio] stdin closed, shutting down");
                break;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<serde_json::Value>(trimmed) {
                Ok(message) => self.dispatcher.handle(message, &self.auth).await,
                Err(err) => {
                    error!("[Stdio] Unparseable line: {}", err);
                    Some(protocol::error_response(
                        serde_json::Value::Null,
                        error_codes::PARSE_ERROR,
                        format!("Parse error: {}", err),
                    ))
                }
            };

            match response {
                Some(response) => {
                    let mut bytes = serde_json::to_vec(&response)?;
                    bytes.push(b'\n');
                    writer.write_all(&bytes).await?;
                    writer.flush().await?;
                }
                None => debug!("[Stdio] No response for notification"),
            }
        }
        Ok(())
    }
}
