use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use chat_relay_core::DEFAULT_MAX_TOOL_ROUNDS;
use chat_relay_gemini_model::{GeminiConfig, GeminiConfigBuilder};
use chat_relay_mcp::{McpConfig, McpConfigBuilder};
use clap::Parser;

const DEFAULT_SYSTEM_PROMPT: &str = include_str!("./system_prompt.md");

/// Command line and environment configuration of the relay server.
#[derive(Clone, Parser)]
#[command(version, about = "Streams Gemini answers about a codebase over HTTP")]
pub struct ServerConfig {
    /// Address the HTTP server listens on.
    #[arg(long, env = "RELAY_HTTP_ADDR", default_value = "127.0.0.1:3000")]
    pub http_addr: SocketAddr,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: String,

    /// Gemini model name.
    #[arg(
        long,
        env = "GEMINI_MODEL",
        default_value = "gemini-2.5-flash-lite-preview-06-17"
    )]
    pub gemini_model: String,

    /// Base URL of the Gemini API.
    #[arg(
        long,
        env = "GEMINI_BASE_URL",
        default_value = "https://generativelanguage.googleapis.com/v1beta"
    )]
    pub gemini_base_url: String,

    /// Sampling temperature.
    #[arg(long, env = "RELAY_TEMPERATURE", default_value_t = 0.2)]
    pub temperature: f32,

    /// URL of the MCP server providing the code tools.
    #[arg(long, env = "MCP_URL", default_value = "http://localhost:8000/mcp/")]
    pub mcp_url: String,

    /// Bearer token for the MCP server.
    #[arg(long, env = "API_SECRET_TOKEN", hide_env_values = true)]
    pub mcp_token: Option<String>,

    /// File with a system prompt replacing the built-in one.
    #[arg(long = "system-prompt", env = "RELAY_SYSTEM_PROMPT_FILE")]
    pub system_prompt_file: Option<PathBuf>,

    /// Tool rounds allowed in a single turn.
    #[arg(long, env = "RELAY_MAX_TOOL_ROUNDS", default_value_t = DEFAULT_MAX_TOOL_ROUNDS)]
    pub max_tool_rounds: usize,
}

impl ServerConfig {
    /// Returns the Gemini provider configuration.
    pub fn gemini_config(&self) -> GeminiConfig {
        GeminiConfigBuilder::with_api_key(&self.gemini_api_key)
            .with_model(&self.gemini_model)
            .with_base_url(&self.gemini_base_url)
            .with_temperature(self.temperature)
            .build()
    }

    /// Returns the MCP client configuration.
    pub fn mcp_config(&self) -> McpConfig {
        let builder = McpConfigBuilder::with_url(&self.mcp_url);
        match &self.mcp_token {
            Some(token) => builder.with_bearer_token(token),
            None => builder,
        }
        .build()
    }

    /// Loads the system instruction, the built-in one unless a file is
    /// configured.
    pub async fn system_instruction(&self) -> io::Result<String> {
        match &self.system_prompt_file {
            Some(path) => tokio::fs::read_to_string(path).await,
            None => Ok(DEFAULT_SYSTEM_PROMPT.to_owned()),
        }
    }
}
