//! Line-delimited JSON-RPC server over stdio.
//!
//! Each `tools/call` runs on its own task against the shared client, so slow
//! store calls do not block other requests. Responses go through a single
//! writer task and are written one JSON object per line.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use willys_client::WillysClient;

use crate::protocol::{
    CallToolParams, CancelledParams, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION,
    METHOD_NOT_FOUND, PARSE_ERROR, Request, Response, ToolResult, initialize_result,
};
use crate::tools::{Tool, ToolExecutor, willys_tools};

type InFlight = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// MCP server exposing the grocery tools for one shared session.
pub struct Server {
    client: WillysClient,
    tools: Arc<Vec<Tool>>,
    in_flight: InFlight,
}

impl Server {
    #[must_use]
    pub fn new(client: WillysClient) -> Self {
        Self {
            client,
            tools: Arc::new(willys_tools()),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Serve on the process's stdin and stdout until stdin closes.
    ///
    /// # Errors
    ///
    /// Returns an error if reading stdin fails.
    pub async fn serve_stdio(self) -> io::Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve requests read from `reader`, writing responses to `writer`.
    ///
    /// Returns once `reader` reaches EOF and every in-flight call has
    /// answered.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub async fn serve<R, W>(self, reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<Response>();
        let writer_task = tokio::spawn(write_responses(rx, writer));
        let mut calls = JoinSet::new();

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Request>(line) {
                Ok(request) => self.handle(request, &tx, &mut calls).await,
                Err(e) => {
                    warn!(error = %e, "unparseable message");
                    let _ = tx.send(Response::failure(Value::Null, PARSE_ERROR, "parse error"));
                }
            }
        }

        debug!(in_flight = calls.len(), "input closed, draining calls");
        while calls.join_next().await.is_some() {}
        drop(tx);
        if let Err(e) = writer_task.await {
            warn!(error = %e, "response writer failed");
        }
        info!("server stopped");
        Ok(())
    }

    async fn handle(
        &self,
        request: Request,
        tx: &mpsc::UnboundedSender<Response>,
        calls: &mut JoinSet<()>,
    ) {
        let Some(id) = request.id.clone() else {
            self.handle_notification(&request).await;
            return;
        };

        if request.jsonrpc != JSONRPC_VERSION {
            let _ = tx.send(Response::failure(id, INVALID_REQUEST, "expected jsonrpc 2.0"));
            return;
        }

        let response = match request.method.as_str() {
            "initialize" => {
                info!("client initializing");
                Response::success(id, initialize_result(&request.params))
            }
            "ping" => Response::success(id, json!({})),
            "tools/list" => Response::success(id, json!({ "tools": self.tools.as_slice() })),
            "tools/call" => match serde_json::from_value::<CallToolParams>(request.params) {
                Ok(params) => {
                    self.spawn_call(id, params, tx.clone(), calls).await;
                    return;
                }
                Err(e) => Response::failure(id, INVALID_PARAMS, format!("invalid params: {e}")),
            },
            other => Response::failure(id, METHOD_NOT_FOUND, format!("method not found: {other}")),
        };
        let _ = tx.send(response);
    }

    async fn handle_notification(&self, request: &Request) {
        match request.method.as_str() {
            "notifications/initialized" => debug!("client initialized"),
            "notifications/cancelled" => {
                let Ok(params) = serde_json::from_value::<CancelledParams>(request.params.clone())
                else {
                    warn!("malformed cancellation");
                    return;
                };
                let key = params.request_id.to_string();
                if let Some(token) = self.in_flight.lock().await.get(&key) {
                    info!(request_id = %key, reason = ?params.reason, "cancelling call");
                    token.cancel();
                }
            }
            other => debug!(method = other, "ignoring notification"),
        }
    }

    async fn spawn_call(
        &self,
        id: Value,
        params: CallToolParams,
        tx: mpsc::UnboundedSender<Response>,
        calls: &mut JoinSet<()>,
    ) {
        let key = id.to_string();
        let token = CancellationToken::new();
        self.in_flight.lock().await.insert(key.clone(), token.clone());

        let executor = ToolExecutor::new(self.client.with_cancellation(token));
        let in_flight = Arc::clone(&self.in_flight);
        calls.spawn(async move {
            let result = run_tool(&executor, &params).await;
            in_flight.lock().await.remove(&key);
            let _ = tx.send(Response::success(id, result.into_value()));
        });
    }
}

#[instrument(skip_all, fields(tool = %params.name))]
async fn run_tool(executor: &ToolExecutor, params: &CallToolParams) -> ToolResult {
    match executor.execute(&params.name, &params.arguments).await {
        Ok(value) => ToolResult::success(&value),
        Err(e) => {
            warn!(kind = e.kind(), error = %e, "tool call failed");
            ToolResult::error(&e)
        }
    }
}

async fn write_responses<W>(mut rx: mpsc::UnboundedReceiver<Response>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = match serde_json::to_vec(&response) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to encode response");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = writer.write_all(&line).await {
            warn!(error = %e, "failed to write response");
            return;
        }
        if let Err(e) = writer.flush().await {
            warn!(error = %e, "failed to flush response");
            return;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    async fn run(input: &str) -> Vec<Value> {
        let server = Server::new(WillysClient::new("https://www.willys.se").unwrap());
        let (mut input_write, input_read) = tokio::io::duplex(64 * 1024);
        let (output_write, mut output_read) = tokio::io::duplex(64 * 1024);

        input_write.write_all(input.as_bytes()).await.unwrap();
        input_write.shutdown().await.unwrap();

        server.serve(input_read, output_write).await.unwrap();

        let mut output = String::new();
        output_read.read_to_string(&mut output).await.unwrap();
        output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_initialize_list_and_ping() {
        let responses = run(concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#,
            "\n",
        ))
        .await;

        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"]["serverInfo"]["name"], "willys-mcp");
        assert_eq!(responses[1]["result"]["tools"].as_array().unwrap().len(), 7);
        assert_eq!(responses[2]["result"], json!({}));
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let responses = run(concat!(
            "not json\n",
            r#"{"jsonrpc":"2.0","id":"a","method":"resources/list"}"#,
            "\n",
            r#"{"jsonrpc":"1.0","id":"b","method":"ping"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":"c","method":"tools/call","params":{}}"#,
            "\n",
        ))
        .await;

        assert_eq!(responses.len(), 4);
        assert_eq!(responses[0]["error"]["code"], PARSE_ERROR);
        assert_eq!(responses[1]["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(responses[2]["error"]["code"], INVALID_REQUEST);
        assert_eq!(responses[3]["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_tool_call_results() {
        let responses = run(concat!(
            r#"{"jsonrpc":"2.0","id":10,"method":"tools/call","params":{"name":"proceed_to_checkout"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":11,"method":"tools/call","params":{"name":"order_pizza","arguments":{}}}"#,
            "\n",
        ))
        .await;

        assert_eq!(responses.len(), 2);
        let by_id = |id: i64| responses.iter().find(|r| r["id"] == id).unwrap();

        let checkout = &by_id(10)["result"];
        assert_eq!(checkout["isError"], false);
        let text: Value =
            serde_json::from_str(checkout["content"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(text["checkout_url"], "https://www.willys.se/kassa");

        let unknown = &by_id(11)["result"];
        assert_eq!(unknown["isError"], true);
        let payload: Value =
            serde_json::from_str(unknown["content"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(payload["kind"], "unknown_tool");
    }
}
