//! A minimal MCP server: one tool, served over stdio.
//!
//! stdout carries JSON-RPC only; `tracing`'s default writer is stderr, so
//! logging here never corrupts the message stream.

use std::sync::Arc;

use conduit_core::TransportType;
use conduit_protocol::types::{LoggingCapability, ToolsCapability};
use conduit_protocol::{Content, ServerCapabilities, Tool};
use conduit_server::{McpServer, ServerConfig};
use conduit_transport::{StdioTransport, Transport};

fn hello_tool() -> Tool {
    Tool {
        name: "hello".to_string(),
        description: Some("Say hello to someone".to_string()),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "The name to greet"}
            },
            "additionalProperties": false,
        }),
        output_schema: None,
    }
}

fn hello(args: serde_json::Map<String, serde_json::Value>) -> conduit_protocol::CallToolResult {
    let name = args.get("name").and_then(|v| v.as_str()).unwrap_or("World");
    conduit_protocol::CallToolResult::success(vec![Content::text(format!("Hello, {name}!"))])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::builder("conduit-demo", env!("CARGO_PKG_VERSION"))
        .capabilities(ServerCapabilities {
            tools: Some(ToolsCapability { list_changed: Some(true) }),
            logging: Some(LoggingCapability {}),
            ..Default::default()
        })
        .build();
    let server = Arc::new(McpServer::new(config));
    server.add_tool(hello_tool(), Arc::new(hello)).await;

    let transport = Arc::new(StdioTransport::new());
    let (outbound_tx, mut outbound_rx) = tokio::sync::mpsc::channel(64);
    server.register_session(StdioTransport::SESSION_ID, TransportType::Stdio, outbound_tx);

    let writer_transport = transport.clone();
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if writer_transport.send(message).await.is_err() {
                break;
            }
        }
    });

    loop {
        match transport.recv().await {
            Ok(Some(message)) => {
                if let Some(response) = server.handle_message(StdioTransport::SESSION_ID, message).await {
                    if transport.send(response).await.is_err() {
                        break;
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                tracing::error!(%err, "stdio transport error");
                break;
            }
        }
    }

    server.remove_session(StdioTransport::SESSION_ID);
    drop(transport);
    writer.await.ok();
    Ok(())
}
