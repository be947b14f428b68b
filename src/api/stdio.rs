//! MCP over stdio: one JSON-RPC message per line.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use super::mcp::{handle_message, JsonRpcResponse};
use crate::{AppState, Result};

/// Serve MCP on stdin/stdout until stdin closes.
pub async fn serve(state: AppState) -> Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    serve_io(state, stdin, stdout).await
}

/// Serve MCP on any line-oriented reader/writer pair.
///
/// A line that is not UTF-8 gets a parse error reply; only I/O failures end
/// the loop.
pub async fn serve_io<R, W>(state: AppState, mut reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("MCP stdio transport ready");

    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }

        let response = match std::str::from_utf8(&buf) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                handle_message(&state, line).await
            }
            Err(e) => {
                warn!(error = %e, "Received a line that is not UTF-8");
                Some(JsonRpcResponse::parse_error(e))
            }
        };

        if let Some(response) = response {
            let mut out = serde_json::to_string(&response)?;
            out.push('\n');
            writer.write_all(out.as_bytes()).await?;
            writer.flush().await?;
        }
    }

    info!("stdin closed, stopping");
    Ok(())
}
