#[macro_use]
extern crate tracing;

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use chat_relay_core::RelayBuilder;
use chat_relay_gemini_model::GeminiProvider;
use chat_relay_mcp::McpClient;
use chat_relay_server::{ServerConfig, router};
use clap::Parser;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::parse();
    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ServerConfig) -> Result<(), Box<dyn Error>> {
    let system_instruction = config.system_instruction().await?;
    let mcp = Arc::new(McpClient::connect(config.mcp_config()).await?);

    let relay =
        RelayBuilder::with_model_provider(GeminiProvider::new(config.gemini_config()))
            .with_tools(mcp.clone())
            .with_system_instruction(system_instruction)
            .with_max_tool_rounds(config.max_tool_rounds)
            .build();

    let listener = TcpListener::bind(config.http_addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router(relay))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    if let Err(err) = mcp.close().await {
        warn!("failed to close the MCP session: {err}");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("cannot listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
}
