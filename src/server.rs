/*!
 * Line-delimited JSON-RPC front end
 *
 * One request per line on the reader, one response per line on the writer.
 * Supported methods are `tools/list` (the command catalogue) and
 * `tools/call` (dispatch one command). Requests without an `id` member are
 * notifications and get no reply; `"id": null` is still answered.
 */

use crate::command::{schema, Dispatcher, ErrorTag};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    /// `None` when the member is absent, `Some(Value::Null)` for `"id": null`
    #[serde(default, deserialize_with = "present_id")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

fn present_id<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// The command catalogue as published by `tools/list`
pub fn tool_catalogue() -> Value {
    let tools: Vec<Value> = schema::all()
        .iter()
        .map(|spec| {
            json!({
                "name": spec.name,
                "description": spec.description,
                "inputSchema": spec.input_schema(),
            })
        })
        .collect();
    json!({ "tools": tools })
}

pub struct Server {
    dispatcher: Dispatcher,
}

impl Server {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handle one raw line; `None` means nothing is written back
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Unparseable request");
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    error_codes::PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };

        let id = value.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                warn!(error = %e, "Malformed request");
                Some(JsonRpcResponse::failure(
                    id,
                    error_codes::INVALID_REQUEST,
                    format!("Invalid request: {}", e),
                ))
            }
        }
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = request.id else {
            debug!(method = %request.method, "Ignoring notification");
            return None;
        };

        let response = match request.method.as_str() {
            "tools/list" => JsonRpcResponse::success(id, tool_catalogue()),
            "tools/call" => self.call_tool(id, request.params).await,
            other => JsonRpcResponse::failure(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            ),
        };
        Some(response)
    }

    async fn call_tool(&self, id: Value, params: Value) -> JsonRpcResponse {
        let params: CallToolParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => {
                return JsonRpcResponse::failure(
                    id,
                    error_codes::INVALID_PARAMS,
                    format!("Invalid tools/call params: {}", e),
                )
            }
        };

        let response = self
            .dispatcher
            .dispatch(&params.name, &params.arguments)
            .await;

        match response.error {
            Some(ErrorTag::UnknownCommand) => JsonRpcResponse::failure(
                id,
                error_codes::METHOD_NOT_FOUND,
                response.joined_text(),
            ),
            Some(ErrorTag::Internal) => JsonRpcResponse::failure(
                id,
                error_codes::INTERNAL_ERROR,
                response.joined_text(),
            ),
            None => match serde_json::to_value(&response) {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err(e) => JsonRpcResponse::failure(
                    id,
                    error_codes::INTERNAL_ERROR,
                    format!("Failed to encode response: {}", e),
                ),
            },
        }
    }

    /// Serve until the reader reaches end of input
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(response) = self.handle_line(line).await {
                let mut encoded = serde_json::to_vec(&response)?;
                encoded.push(b'\n');
                writer.write_all(&encoded).await?;
                writer.flush().await?;
            }
        }

        info!("Input closed, shutting down");
        Ok(())
    }

    /// Serve on the process's stdin and stdout
    pub async fn serve_stdio(&self) -> io::Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }
}
