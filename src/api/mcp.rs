//! MCP (Model Context Protocol) JSON-RPC handling.
//!
//! One dispatcher serves both transports: the stdio loop feeds it lines and
//! the HTTP route feeds it request bodies.
//!
//! Routes:
//! - POST /mcp - JSON-RPC 2.0 requests from client

use axum::{extract::State, http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strata_models::{
    Level, QueryMemoryRequest, QueryMemoryResponse, StoreMemoryRequest, StoreMemoryResponse,
    MAX_K, MAX_MAX_TOKENS, MIN_K, MIN_MAX_TOKENS,
};
use tracing::{debug, warn};

use crate::AppState;

/// MCP protocol revision announced in `initialize`.
const PROTOCOL_VERSION: &str = "2024-11-05";

// ============================================================================
// JSON-RPC Types
// ============================================================================

/// JSON-RPC 2.0 request.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Reply to a message that could not be read as JSON.
    pub fn parse_error(reason: impl std::fmt::Display) -> Self {
        Self::error(None, PARSE_ERROR, format!("Parse error: {}", reason))
    }

    fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
        }
    }
}

// JSON-RPC error codes
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

// ============================================================================
// MCP Tool Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ToolsListResponse {
    tools: Vec<ToolDefinition>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDefinition {
    name: &'static str,
    description: &'static str,
    input_schema: Value,
}

/// MCP tools/call parameters.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// MCP tools/call response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallResponse {
    content: Vec<ToolContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_error: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

// ============================================================================
// Dispatch
// ============================================================================

/// Handle one raw JSON-RPC message.
///
/// Returns `None` for notifications, which get no reply.
pub async fn handle_message(state: &AppState, raw: &str) -> Option<JsonRpcResponse> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => return Some(JsonRpcResponse::parse_error(e)),
    };

    // Keep the id if the envelope is otherwise malformed.
    let id = value.get("id").cloned();
    let request: JsonRpcRequest = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            return Some(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                format!("Invalid request: {}", e),
            ))
        }
    };

    handle_request(state, request).await
}

/// Handle one parsed JSON-RPC request.
pub async fn handle_request(state: &AppState, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
    if request.jsonrpc != "2.0" {
        return Some(JsonRpcResponse::error(
            request.id,
            INVALID_REQUEST,
            "Invalid JSON-RPC version".into(),
        ));
    }

    debug!(method = %request.method, "MCP request");

    let response = match request.method.as_str() {
        "initialize" => handle_initialize(request.id),
        "ping" => JsonRpcResponse::success(request.id, json!({})),
        "tools/list" => handle_tools_list(request.id),
        "tools/call" => handle_tools_call(state, request.id, request.params).await,
        method if method.starts_with("notifications/") || method == "initialized" => {
            return None;
        }
        _ => JsonRpcResponse::error(
            request.id,
            METHOD_NOT_FOUND,
            format!("Method not found: {}", request.method),
        ),
    };

    Some(response)
}

/// Handle MCP JSON-RPC POST request.
///
/// POST /mcp
pub async fn handle_mcp_post(State(state): State<AppState>, body: String) -> Response {
    match handle_message(&state, &body).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Usage guidance sent to the client in `initialize`.
fn server_instructions() -> String {
    format!(
        "This server stores and queries memories about software projects.\n\
         Every memory has a level: {}.\n\
         When you analyze a project, store memories at several levels. For a file \
         such as \"Todos.ts\" you might store that the project uses prisma for its \
         database models (project), that the module provides functions for \
         manipulating todos (module), and that the file depends on the prisma \
         client and on a notification module (file).\n\
         As you change the project, store updated memories with the new commit id.\n\
         Before making changes, call query_memory to find memories relevant to them.",
        Level::allowed_values()
    )
}

/// Handle MCP initialize.
fn handle_initialize(id: Option<Value>) -> JsonRpcResponse {
    JsonRpcResponse::success(
        id,
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "instructions": server_instructions(),
            "serverInfo": {
                "name": "strata",
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {
                "tools": {}
            }
        }),
    )
}

fn tool_definitions() -> Vec<ToolDefinition> {
    let levels: Vec<&str> = Level::all().iter().map(Level::as_str).collect();

    vec![
        ToolDefinition {
            name: "store_memory",
            description: "Store code context chunks. Each chunk is embedded and assigned to a \
                          semantic cluster at its level.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "commit_id": {
                        "type": "string",
                        "description": "SHA or unique ID of the commit being indexed"
                    },
                    "chunks": {
                        "type": "array",
                        "description": "Memory chunks to store",
                        "items": {
                            "type": "object",
                            "properties": {
                                "level": { "type": "string", "enum": levels },
                                "repo_path": {
                                    "type": "string",
                                    "description": "Path of the described artifact"
                                },
                                "context": {
                                    "type": "string",
                                    "description": "Memory content"
                                },
                                "score": {
                                    "type": "number",
                                    "description": "Optional relevance score"
                                }
                            },
                            "required": ["level", "repo_path", "context"]
                        }
                    },
                    "repo_root": { "type": "string", "default": "." }
                },
                "required": ["commit_id"]
            }),
        },
        ToolDefinition {
            name: "query_memory",
            description: "Retrieve stored context relevant to a prompt, packed into a token \
                          budget.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "prompt": { "type": "string", "description": "What to find context for" },
                    "max_tokens": {
                        "type": "integer",
                        "minimum": MIN_MAX_TOKENS,
                        "maximum": MAX_MAX_TOKENS,
                        "default": 1000
                    },
                    "context_levels": {
                        "type": "array",
                        "items": { "type": "string", "enum": levels },
                        "description":
                            "Levels to search; only the first is used. Defaults to all levels"
                    },
                    "filter": {
                        "type": "object",
                        "description":
                            "Exact-match payload filter, e.g. {\"repo_path\": \"/a/b.py\"}",
                        "additionalProperties": { "type": ["string", "integer", "boolean"] }
                    },
                    "k": {
                        "type": "integer",
                        "minimum": MIN_K,
                        "maximum": MAX_K,
                        "default": 24,
                        "description": "Chunks scanned per matching cluster"
                    }
                },
                "required": ["prompt"]
            }),
        },
    ]
}

/// Handle tools/list method.
fn handle_tools_list(id: Option<Value>) -> JsonRpcResponse {
    to_response(id, &ToolsListResponse {
        tools: tool_definitions(),
    })
}

/// Handle tools/call method.
async fn handle_tools_call(state: &AppState, id: Option<Value>, params: Value) -> JsonRpcResponse {
    let call_params: ToolCallParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(e) => {
            return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid params: {}", e));
        }
    };

    state.stats.record_request();
    let arguments = unwrap_arguments(call_params.arguments);

    let (text, is_error) = match call_params.name.as_str() {
        "store_memory" => {
            let response = match serde_json::from_value::<StoreMemoryRequest>(arguments) {
                Ok(request) => state.memory.store_memory(request).await,
                Err(e) => StoreMemoryResponse::failed(format!("Invalid arguments: {}", e)),
            };
            (render(&response), response.is_error())
        }
        "query_memory" => {
            let response = match serde_json::from_value::<QueryMemoryRequest>(arguments) {
                Ok(request) => state.memory.query_memory(request).await,
                Err(e) => QueryMemoryResponse::failed(format!("Invalid arguments: {}", e)),
            };
            (render(&response), response.is_error())
        }
        _ => {
            return JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Tool not found: {}", call_params.name),
            );
        }
    };

    if is_error {
        state.stats.record_error();
    }

    to_response(
        id,
        &ToolCallResponse {
            content: vec![ToolContent::Text { text }],
            is_error: is_error.then_some(true),
        },
    )
}

/// Accept arguments either bare or wrapped as `{"params": {...}}`.
fn unwrap_arguments(arguments: Value) -> Value {
    match arguments {
        Value::Object(mut map)
            if map.len() == 1 && map.get("params").is_some_and(Value::is_object) =>
        {
            map.remove("params").unwrap_or(Value::Null)
        }
        Value::Null => json!({}),
        other => other,
    }
}

fn render<T: Serialize>(response: &T) -> String {
    serde_json::to_string_pretty(response).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to render tool response");
        json!({ "error": e.to_string() }).to_string()
    })
}

fn to_response<T: Serialize>(id: Option<Value>, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, format!("Internal error: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_arguments() {
        let inner = json!({ "prompt": "x" });
        assert_eq!(unwrap_arguments(json!({ "params": inner.clone() })), inner);
        assert_eq!(unwrap_arguments(inner.clone()), inner);
        assert_eq!(unwrap_arguments(Value::Null), json!({}));

        // Only a lone object-valued "params" key is unwrapped.
        let mixed = json!({ "params": { "a": 1 }, "prompt": "x" });
        assert_eq!(unwrap_arguments(mixed.clone()), mixed);
    }

    #[test]
    fn test_tool_schemas_use_camel_case() {
        let value = serde_json::to_value(ToolsListResponse {
            tools: tool_definitions(),
        })
        .unwrap();

        let tools = value["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert!(tools.iter().all(|t| t.get("inputSchema").is_some()));
        assert_eq!(
            tools[1]["inputSchema"]["properties"]["context_levels"]["items"]["enum"][0],
            "function_signature"
        );
    }

    #[test]
    fn test_tool_error_flag_serialization() {
        let ok = serde_json::to_value(ToolCallResponse {
            content: vec![ToolContent::Text { text: "{}".into() }],
            is_error: None,
        })
        .unwrap();
        assert_eq!(ok, json!({ "content": [{ "type": "text", "text": "{}" }] }));

        let failed = serde_json::to_value(ToolCallResponse {
            content: vec![],
            is_error: Some(true),
        })
        .unwrap();
        assert_eq!(failed["isError"], json!(true));
    }
}
