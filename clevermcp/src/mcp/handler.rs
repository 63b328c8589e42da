//! MCP JSON-RPC 2.0 handler

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

use super::tools::{ToolContext, ToolRegistry};
use crate::config::McpConfig;
use crate::error::METHOD_NOT_FOUND;
use crate::metrics;

/// JSON-RPC request.
///
/// Envelopes are read leniently: `jsonrpc` is not validated, a missing `id`
/// becomes `null` and a non-string `method` is treated as absent.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: Option<String>,
    pub id: Value,
    pub method: Option<String>,
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut map) => Self {
                jsonrpc: map
                    .get("jsonrpc")
                    .and_then(|v| v.as_str())
                    .map(String::from),
                id: map.remove("id").unwrap_or(Value::Null),
                method: map.get("method").and_then(|v| v.as_str()).map(String::from),
                params: map.remove("params"),
            },
            // Batches and bare scalars carry no usable method
            _ => Self {
                jsonrpc: None,
                id: Value::Null,
                method: None,
                params: None,
            },
        }
    }
}

/// JSON-RPC error
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

/// JSON-RPC response
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i32, message: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.to_string(),
            }),
        }
    }
}

/// What the transport sends back for one POST
#[derive(Debug)]
pub enum McpReply {
    /// A JSON-RPC envelope with the HTTP status that accompanies it
    Envelope {
        status: StatusCode,
        response: JsonRpcResponse,
    },
    /// Notification acknowledged, empty body
    Accepted,
    /// Body was not JSON; answered outside the JSON-RPC envelope
    InvalidJson,
}

impl McpReply {
    fn ok(response: JsonRpcResponse) -> Self {
        McpReply::Envelope {
            status: StatusCode::OK,
            response,
        }
    }

    fn method_not_found(id: Value) -> Self {
        Self::ok(JsonRpcResponse::error(id, METHOD_NOT_FOUND, "Method not found"))
    }

    fn outcome(&self) -> &'static str {
        match self {
            McpReply::Envelope { response, .. } if response.error.is_some() => "error",
            McpReply::Envelope { .. } => "ok",
            McpReply::Accepted => "accepted",
            McpReply::InvalidJson => "invalid_json",
        }
    }
}

impl IntoResponse for McpReply {
    fn into_response(self) -> Response {
        match self {
            McpReply::Envelope { status, response } => (status, Json(response)).into_response(),
            McpReply::Accepted => StatusCode::NO_CONTENT.into_response(),
            McpReply::InvalidJson => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid JSON" })),
            )
                .into_response(),
        }
    }
}

/// MCP protocol handler.
///
/// Holds no per-client state: every request is answered from the read-only
/// tool registry and the collaborators in the tool context.
pub struct McpHandler {
    tools: Arc<ToolRegistry>,
    ctx: ToolContext,
    info: McpConfig,
}

impl McpHandler {
    pub fn new(tools: Arc<ToolRegistry>, ctx: ToolContext, info: McpConfig) -> Self {
        Self { tools, ctx, info }
    }

    /// Handle a raw POST body
    pub async fn handle_body(&self, body: &[u8]) -> McpReply {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => self.handle(JsonRpcRequest::from_value(value)).await,
            Err(e) => {
                tracing::debug!("Rejecting unparsable JSON-RPC body: {}", e);
                metrics::record_rpc_request("", McpReply::InvalidJson.outcome());
                McpReply::InvalidJson
            }
        }
    }

    /// Handle a JSON-RPC request
    pub async fn handle(&self, req: JsonRpcRequest) -> McpReply {
        if req.jsonrpc.as_deref() != Some("2.0") {
            tracing::debug!("Accepting envelope with jsonrpc={:?}", req.jsonrpc);
        }

        let method = req.method.clone().unwrap_or_default();
        let reply = match method.as_str() {
            "initialize" => self.handle_initialize(req.id, req.params.as_ref()),
            // Notification: no id-correlated response
            "notifications/initialized" => McpReply::Accepted,
            "tools/list" => self.handle_tools_list(req.id),
            "tools/call" => self.handle_tools_call(req.id, req.params).await,
            _ => {
                tracing::debug!("Method not found: {:?}", req.method);
                McpReply::method_not_found(req.id)
            }
        };

        metrics::record_rpc_request(&method, reply.outcome());
        reply
    }

    fn handle_initialize(&self, id: Value, params: Option<&Value>) -> McpReply {
        if let Some(params) = params {
            let client = params.get("clientInfo");
            tracing::info!(
                client_name = client.and_then(|c| c.get("name")).and_then(|v| v.as_str()),
                client_version = client.and_then(|c| c.get("version")).and_then(|v| v.as_str()),
                requested_protocol = params.get("protocolVersion").and_then(|v| v.as_str()),
                "MCP initialize"
            );
        }

        McpReply::ok(JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": self.info.protocol_version,
                "serverInfo": {
                    "name": self.info.server_name,
                    "version": self.info.server_version
                },
                "capabilities": {
                    "tools": {}
                }
            }),
        ))
    }

    fn handle_tools_list(&self, id: Value) -> McpReply {
        let tools = self.tools.list();
        McpReply::ok(JsonRpcResponse::success(id, json!({ "tools": tools })))
    }

    async fn handle_tools_call(&self, id: Value, params: Option<Value>) -> McpReply {
        let params = params.unwrap_or(Value::Null);

        // Unknown and missing tool names are reported like unknown methods
        let tool = match params
            .get("name")
            .and_then(|v| v.as_str())
            .and_then(|name| self.tools.get(name))
        {
            Some(tool) => tool.clone(),
            None => {
                tracing::debug!("tools/call for unknown tool: {:?}", params.get("name"));
                return McpReply::method_not_found(id);
            }
        };

        let arguments = match params.get("arguments") {
            Some(Value::Null) | None => json!({}),
            Some(args) => args.clone(),
        };

        let started = Instant::now();
        let result = tool.call(arguments, &self.ctx).await;
        metrics::record_tool_call(tool.name(), started.elapsed(), result.is_ok());

        match result {
            Ok(output) => McpReply::ok(JsonRpcResponse::success(id, json!(output))),
            Err(e) => {
                if e.http_status().is_server_error() {
                    tracing::warn!("Tool '{}' failed: {}", tool.name(), e);
                } else {
                    tracing::debug!("Tool '{}' rejected arguments: {}", tool.name(), e);
                }
                McpReply::Envelope {
                    status: e.http_status(),
                    response: JsonRpcResponse::error(id, e.rpc_code(), &e.to_string()),
                }
            }
        }
    }
}
