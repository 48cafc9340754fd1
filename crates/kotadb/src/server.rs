//! Stdio RPC server: newline-delimited JSON messages, one per line.
//!
//! Lifecycle: `initialize` negotiates the protocol version, `tools/list`
//! returns the tier-filtered catalog, `tools/call` dispatches to the tool
//! surface. Tool calls run to completion in order on one connection.

use crate::tools::{self, ToolContext, Toolset};
use kota_core::ToolError;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

/// Protocol version this server speaks.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Bounded per-message size; longer lines are rejected, not buffered.
pub const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// Connection state for one RPC session.
pub struct RpcServer {
    ctx: Arc<ToolContext>,
    toolset: Toolset,
    negotiated: Option<String>,
    fatal: bool,
}

impl RpcServer {
    pub fn new(ctx: Arc<ToolContext>, toolset: Toolset) -> Self {
        Self {
            ctx,
            toolset,
            negotiated: None,
            fatal: false,
        }
    }

    /// The protocol version agreed at initialize, if any.
    pub fn negotiated_version(&self) -> &str {
        self.negotiated.as_deref().unwrap_or(PROTOCOL_VERSION)
    }

    /// Whether a fatal error was observed; the connection should close.
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// Handle one framed message. Returns None for notifications.
    pub async fn handle(&mut self, raw: &str) -> Option<Value> {
        if raw.len() > MAX_MESSAGE_BYTES {
            return Some(error_response(
                Value::Null,
                -32600,
                format!("message exceeds {MAX_MESSAGE_BYTES} bytes"),
            ));
        }
        let msg: Value = match serde_json::from_str(raw) {
            Ok(msg) => msg,
            Err(e) => {
                return Some(error_response(
                    Value::Null,
                    -32700,
                    format!("parse error: {e}"),
                ));
            }
        };

        // Messages without an id are notifications; no response.
        let id = msg.get("id").cloned()?;
        let method = msg.get("method").and_then(Value::as_str).unwrap_or("");
        let params = msg.get("params").cloned().unwrap_or_else(|| json!({}));

        let response = match method {
            "initialize" => self.handle_initialize(id, &params),
            "ping" => json!({"id": id, "result": {}}),
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, &params).await,
            other => error_response(id, -32601, format!("method not found: {other}")),
        };
        Some(response)
    }

    fn handle_initialize(&mut self, id: Value, params: &Value) -> Value {
        let requested = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(PROTOCOL_VERSION);
        self.negotiated = Some(requested.to_string());
        if let Some(client) = params.get("clientInfo").and_then(|c| c.get("name")) {
            info!(client = %client, protocol = requested, "client initialized");
        }

        json!({
            "id": id,
            "result": {
                "protocolVersion": requested,
                "serverInfo": {
                    "name": "kotadb",
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "capabilities": {"tools": {"listChanged": false}},
            }
        })
    }

    fn handle_tools_list(&self, id: Value) -> Value {
        let tools: Vec<Value> = tools::catalog(self.toolset)
            .into_iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "inputSchema": tool.input_schema,
                })
            })
            .collect();
        json!({"id": id, "result": {"tools": tools}})
    }

    async fn handle_tools_call(&mut self, id: Value, params: &Value) -> Value {
        let name = params.get("name").and_then(Value::as_str).unwrap_or("");
        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));

        match tools::dispatch(&self.ctx, self.toolset, name, &arguments).await {
            Ok(payload) => {
                // The payload is wrapped as a single text content block.
                let text = payload.to_string();
                json!({
                    "id": id,
                    "result": {"content": [{"type": "text", "text": text}]},
                })
            }
            Err(e) => {
                if matches!(e, ToolError::Fatal(_)) {
                    error!(tool = name, error = %e, "fatal tool error");
                    self.fatal = true;
                }
                error_response(id, e.code(), e.to_string())
            }
        }
    }

    /// Serve newline-delimited JSON over stdin/stdout until EOF or a fatal
    /// error. One message is handled at a time; a long-running call blocks
    /// the next message on this connection.
    pub async fn run_stdio(mut self) -> std::io::Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let mut lines = stdin.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(reply) = self.handle(&line).await {
                let mut out = reply.to_string();
                out.push('\n');
                stdout.write_all(out.as_bytes()).await?;
                stdout.flush().await?;
            }
            if self.fatal {
                error!("closing connection after fatal error");
                break;
            }
        }
        Ok(())
    }
}

fn error_response(id: Value, code: i64, message: String) -> Value {
    json!({"id": id, "error": {"code": code, "message": message}})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::DomainRules;
    use crate::storage::test_support::create_test_storage;
    use kota_core::KotaConfig;
    use tempfile::TempDir;

    async fn server() -> (TempDir, RpcServer) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.ts"), "export function foo() {}\n").unwrap();

        let ts = create_test_storage().await;
        let crate::storage::test_support::TestStorage { storage, _dir } = ts;
        Box::leak(Box::new(_dir));
        let ctx = Arc::new(ToolContext {
            storage: Arc::new(storage),
            config: KotaConfig::for_dir(dir.path().to_path_buf()),
            rules: DomainRules::default(),
        });
        (dir, RpcServer::new(ctx, Toolset::Default))
    }

    #[tokio::test]
    async fn initialize_negotiates_protocol_version() {
        let (_dir, mut server) = server().await;
        let reply = server
            .handle(r#"{"id": 1, "method": "initialize", "params": {"protocolVersion": "2024-11-05", "clientInfo": {"name": "test"}, "capabilities": {}}}"#)
            .await
            .unwrap();
        assert_eq!(reply["result"]["protocolVersion"], json!("2024-11-05"));
        assert_eq!(
            reply["result"]["capabilities"]["tools"]["listChanged"],
            json!(false)
        );
        assert_eq!(server.negotiated_version(), "2024-11-05");
    }

    #[tokio::test]
    async fn tools_list_is_tier_filtered() {
        let (_dir, mut server) = server().await;
        let reply = server
            .handle(r#"{"id": 2, "method": "tools/list"}"#)
            .await
            .unwrap();
        let tools = reply["result"]["tools"].as_array().unwrap();
        let names: Vec<&str> = tools
            .iter()
            .filter_map(|t| t["name"].as_str())
            .collect();
        assert!(names.contains(&"search"));
        assert!(names.contains(&"kota_sync_export"));
        assert!(!names.contains(&"record_decision"));
    }

    #[tokio::test]
    async fn tools_call_wraps_payload_as_text_content() {
        let (_dir, mut server) = server().await;
        let reply = server
            .handle(r#"{"id": 3, "method": "tools/call", "params": {"name": "search", "arguments": {"query": "foo", "scope": ["symbols"]}}}"#)
            .await
            .unwrap();
        let text = reply["result"]["content"][0]["text"].as_str().unwrap();
        let payload: Value = serde_json::from_str(text).unwrap();
        assert_eq!(payload["counts"]["symbols"], json!(1));
        assert_eq!(payload["results"]["symbols"][0]["name"], json!("foo"));
    }

    #[tokio::test]
    async fn invalid_params_use_canonical_code() {
        let (_dir, mut server) = server().await;
        let reply = server
            .handle(r#"{"id": 4, "method": "tools/call", "params": {"name": "search", "arguments": {"query": "x", "context_lines": 99}}}"#)
            .await
            .unwrap();
        assert_eq!(reply["error"]["code"], json!(-32602));
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let (_dir, mut server) = server().await;
        let reply = server
            .handle(r#"{"method": "notifications/initialized"}"#)
            .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn unknown_method_is_32601() {
        let (_dir, mut server) = server().await;
        let reply = server
            .handle(r#"{"id": 5, "method": "resources/read"}"#)
            .await
            .unwrap();
        assert_eq!(reply["error"]["code"], json!(-32601));
    }

    #[tokio::test]
    async fn oversized_message_is_rejected() {
        let (_dir, mut server) = server().await;
        let big = format!(
            r#"{{"id": 6, "method": "ping", "pad": "{}"}}"#,
            "x".repeat(MAX_MESSAGE_BYTES)
        );
        let reply = server.handle(&big).await.unwrap();
        assert_eq!(reply["error"]["code"], json!(-32600));
    }
}
