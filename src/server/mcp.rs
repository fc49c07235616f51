use std::sync::Arc;

use crate::query::guard::DEFAULT_ROW_CEILING;
use crate::query::{DataEngine, InspectMode};
use mcp_sdk_rs::error::Error;
use mcp_sdk_rs::error::ErrorCode;
use mcp_sdk_rs::server::{Server, ServerHandler};
use mcp_sdk_rs::transport::stdio::StdioTransport;
use mcp_sdk_rs::types::{
    ClientCapabilities, Implementation, ListToolsResult, ServerCapabilities, Tool, ToolResult,
};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

#[derive(Deserialize)]
struct CallToolRequest {
    name: String,
    arguments: Option<Value>,
}

#[derive(Deserialize)]
struct InspectArgs {
    mode: String,
    table: Option<String>,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct QueryArgs {
    experiment: String,
    table: String,
    limit: Option<usize>,
    window_hours: Option<u32>,
}

#[derive(Deserialize)]
struct RawQueryArgs {
    sql: String,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct SummarizeArgs {
    experiment: String,
    window_days: Option<u32>,
}

pub struct McpService {
    engine: Arc<DataEngine>,
}

impl McpService {
    pub fn new(engine: Arc<DataEngine>) -> Self {
        Self { engine }
    }

    pub async fn run_stdio(&self) -> anyhow::Result<()> {
        let (read_tx, read_rx) = mpsc::channel::<String>(32);
        let (write_tx, mut write_rx) = mpsc::channel::<String>(32);

        // Stdin reader
        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let mut reader = BufReader::new(stdin).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                if read_tx.send(line).await.is_err() {
                    break;
                }
            }
        });

        // Stdout writer
        tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(msg) = write_rx.recv().await {
                let _ = stdout.write_all(msg.as_bytes()).await;
                let _ = stdout.write_all(b"\n").await;
                let _ = stdout.flush().await;
            }
        });

        let transport = StdioTransport::new(read_rx, write_tx);
        let server = Server::new(Arc::new(transport), Arc::new(self.clone()));
        server.start().await?;
        Ok(())
    }

    /// Run one engine operation, folding errors into a structured payload.
    ///
    /// Engine failures (missing table, rejected statement, unavailable
    /// store) come back as `{status: "error", ...}` tool results rather than
    /// protocol errors, so the agent's session survives and it can read the
    /// reason.
    fn dispatch(&self, name: &str, arguments: Value) -> Result<Value, Error> {
        let outcome = match name {
            "inspect_database" => {
                let args: InspectArgs = parse_args(arguments)?;
                args.mode
                    .parse::<InspectMode>()
                    .and_then(|mode| self.engine.inspect(mode, args.table.as_deref(), args.limit))
            }
            "query_experiment_data" => {
                let args: QueryArgs = parse_args(arguments)?;
                self.engine
                    .query(
                        &args.experiment,
                        &args.table,
                        args.limit.unwrap_or(50),
                        args.window_hours.unwrap_or(24),
                    )
                    .and_then(|out| serde_json::to_value(out).map_err(json_error))
            }
            "execute_read_query" => {
                let args: RawQueryArgs = parse_args(arguments)?;
                self.engine
                    .raw_query(&args.sql, args.limit.unwrap_or(DEFAULT_ROW_CEILING))
                    .and_then(|out| serde_json::to_value(out).map_err(json_error))
            }
            "summarize_experiment" => {
                let args: SummarizeArgs = parse_args(arguments)?;
                self.engine
                    .summarize(&args.experiment, args.window_days.unwrap_or(7))
                    .and_then(|out| serde_json::to_value(out).map_err(json_error))
            }
            other => return Err(Error::protocol(ErrorCode::MethodNotFound, other.to_string())),
        };

        Ok(match outcome {
            Ok(value) => json!({ "status": "success", "result": value }),
            Err(e) => json!({ "status": "error", "kind": e.kind(), "message": e.to_string() }),
        })
    }
}

impl Clone for McpService {
    fn clone(&self) -> Self {
        Self { engine: self.engine.clone() }
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(arguments: Value) -> Result<T, Error> {
    serde_json::from_value(arguments)
        .map_err(|e| Error::protocol(ErrorCode::InvalidParams, e.to_string()))
}

fn json_error(e: serde_json::Error) -> crate::Error {
    crate::Error::Config(e.to_string())
}

fn tool(name: &str, description: &str, schema: Value) -> Result<Tool, Error> {
    Ok(Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: serde_json::from_value(schema)
            .map_err(|e| Error::protocol(ErrorCode::ParseError, e.to_string()))?,
        annotations: None,
    })
}

#[async_trait]
impl ServerHandler for McpService {
    async fn initialize(
        &self,
        _implementation: Implementation,
        _capabilities: ClientCapabilities,
    ) -> Result<ServerCapabilities, Error> {
        Ok(ServerCapabilities::default())
    }

    async fn shutdown(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn handle_method(&self, method: &str, params: Option<Value>) -> Result<Value, Error> {
        match method {
            "tools/list" => {
                let tools = vec![
                    tool(
                        "inspect_database",
                        "Explore the experiment database schema: list tables, describe columns, or sample rows",
                        json!({
                            "type": "object",
                            "properties": {
                                "mode": { "type": "string", "enum": ["tables", "schema", "columns", "sample"] },
                                "table": { "type": "string" },
                                "limit": { "type": "integer" }
                            },
                            "required": ["mode"]
                        }),
                    )?,
                    tool(
                        "query_experiment_data",
                        "Get recent rows from one table for an experiment, newest first",
                        json!({
                            "type": "object",
                            "properties": {
                                "experiment": { "type": "string" },
                                "table": { "type": "string" },
                                "limit": { "type": "integer", "default": 50 },
                                "window_hours": { "type": "integer", "default": 24 }
                            },
                            "required": ["experiment", "table"]
                        }),
                    )?,
                    tool(
                        "execute_read_query",
                        "Run a read-only SELECT statement against the experiment database",
                        json!({
                            "type": "object",
                            "properties": {
                                "sql": { "type": "string" },
                                "limit": { "type": "integer", "default": 100 }
                            },
                            "required": ["sql"]
                        }),
                    )?,
                    tool(
                        "summarize_experiment",
                        "Cross-table data availability and key metrics report for an experiment",
                        json!({
                            "type": "object",
                            "properties": {
                                "experiment": { "type": "string" },
                                "window_days": { "type": "integer", "default": 7 }
                            },
                            "required": ["experiment"]
                        }),
                    )?,
                ];
                let result = ListToolsResult { tools, next_cursor: None };
                serde_json::to_value(result)
                    .map_err(|e| Error::protocol(ErrorCode::InternalError, e.to_string()))
            }
            "tools/call" => {
                let req: CallToolRequest = params
                    .and_then(|v| serde_json::from_value(v).ok())
                    .ok_or(Error::protocol(ErrorCode::InvalidParams, "Missing params"))?;

                let payload = self.dispatch(&req.name, req.arguments.unwrap_or(json!({})))?;
                let text = serde_json::to_string_pretty(&payload)
                    .map_err(|e| Error::protocol(ErrorCode::InternalError, e.to_string()))?;

                let result = ToolResult {
                    content: Vec::new(),
                    structured_content: Some(
                        serde_json::to_value(vec![json!({
                            "type": "text",
                            "text": text
                        })])
                        .unwrap(),
                    ),
                };
                serde_json::to_value(result)
                    .map_err(|e| Error::protocol(ErrorCode::InternalError, e.to_string()))
            }
            _ => Err(Error::protocol(ErrorCode::MethodNotFound, method.to_string())),
        }
    }
}
