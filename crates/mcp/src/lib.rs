//! A client for MCP servers speaking the streamable HTTP transport.
//!
//! The client performs the `initialize` handshake once, caches the tool
//! list and then serves as the [`ToolProvider`] of the relay. A session
//! the server has forgotten is re-established transparently.

#[macro_use]
extern crate tracing;

mod config;
mod error;
mod proto;
mod sse;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use chat_relay_core::tool::{self, ToolProvider, ToolResult};
use chat_relay_model::ModelTool;
use mime::Mime;
use reqwest::{Client, Response, StatusCode, header};
use serde_json::{Value, json};
use tracing::Instrument;

pub use config::{McpConfig, McpConfigBuilder};
pub use error::McpError;
use proto::{
    CallToolResult, InitializeResult, ListToolsResult, Message,
    PROTOCOL_HEADER, PROTOCOL_VERSION, Request, SESSION_HEADER,
};
use sse::LineBuffer;

/// A connected MCP server.
pub struct McpClient {
    http: Client,
    config: McpConfig,
    session_id: Mutex<Option<String>>,
    next_id: AtomicU64,
    tools: Vec<ModelTool>,
}

impl McpClient {
    /// Connects to the server and loads its tools.
    ///
    /// The handshake is retried with exponential backoff until the
    /// configured deadline passes, so a server that is still starting up
    /// does not fail the caller.
    pub async fn connect(config: McpConfig) -> Result<Self, McpError> {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(200))
            .with_max_elapsed_time(Some(config.connect_deadline))
            .build();
        let mut client = Self {
            http: Client::new(),
            config,
            session_id: Mutex::new(None),
            next_id: AtomicU64::new(1),
            tools: vec![],
        };

        let client_ref = &client;
        backoff::future::retry_notify(
            backoff,
            || async move { client_ref.initialize().await.map_err(classify) },
            |err, wait| {
                warn!("MCP server not ready ({err}), retrying in {wait:?}")
            },
        )
        .await?;

        client.tools = client.list_tools().await?;
        info!(
            "connected to MCP server at {} with {} tools",
            client.config.url,
            client.tools.len()
        );
        Ok(client)
    }

    /// Returns the tools the server declared at connect time.
    #[inline]
    pub fn tools(&self) -> &[ModelTool] {
        &self.tools
    }

    /// Calls a tool on the server.
    pub async fn call(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolOutput, McpError> {
        let params = json!({ "name": name, "arguments": arguments });
        let result: CallToolResult =
            serde_json::from_value(self.request("tools/call", Some(params)).await?)?;
        Ok(CallToolOutput {
            text: result.text(),
            is_error: result.is_error,
        })
    }

    /// Ends the session on the server.
    ///
    /// Servers that do not support explicit termination answer with
    /// `405 Method Not Allowed`, which is fine.
    pub async fn close(&self) -> Result<(), McpError> {
        let Some(session_id) = self.take_session_id() else {
            return Ok(());
        };
        let mut req = self
            .http
            .delete(&self.config.url)
            .header(SESSION_HEADER, &session_id);
        if let Some(token) = &self.config.bearer_token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() || status == StatusCode::METHOD_NOT_ALLOWED {
            info!("closed MCP session {session_id}");
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(McpError::Status { status, body })
        }
    }

    async fn initialize(&self) -> Result<(), McpError> {
        self.take_session_id();
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        let result: InitializeResult = serde_json::from_value(
            self.raw_request("initialize", Some(params)).await?,
        )?;
        match &result.server_info {
            Some(info) => debug!(
                "initialized with {} {} (protocol {})",
                info.name, info.version, result.protocol_version
            ),
            None => debug!("initialized (protocol {})", result.protocol_version),
        }
        self.post(&Request::notification("notifications/initialized"))
            .await?;
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ModelTool>, McpError> {
        let mut tools = vec![];
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.take().map(|cursor| json!({ "cursor": cursor }));
            let page: ListToolsResult =
                serde_json::from_value(self.request("tools/list", params).await?)?;
            tools.extend(page.tools.into_iter().map(ModelTool::from));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(tools),
            }
        }
    }

    /// Sends a request, starting a new session once if the server has
    /// dropped ours.
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, McpError> {
        async move {
            match self.raw_request(method, params.clone()).await {
                Err(McpError::SessionExpired) => {
                    warn!("MCP session expired, starting a new one");
                    self.initialize().await?;
                    self.raw_request(method, params).await
                }
                other => other,
            }
        }
        .instrument(debug_span!("mcp request", method))
        .await
    }

    async fn raw_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resp = self.post(&Request::call(id, method, params)).await?;
        read_message(resp, id).await?.into_result()
    }

    async fn post(&self, body: &Request<'_>) -> Result<Response, McpError> {
        let session_id = self.session_id();
        let mut req = self
            .http
            .post(&self.config.url)
            .header(header::ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(token) = &self.config.bearer_token {
            req = req.bearer_auth(token);
        }
        if let Some(session_id) = &session_id {
            req = req
                .header(SESSION_HEADER, session_id)
                .header(PROTOCOL_HEADER, PROTOCOL_VERSION);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND && session_id.is_some() {
            return Err(McpError::SessionExpired);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(McpError::Status { status, body });
        }
        if let Some(new_id) = resp
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            self.set_session_id(new_id.to_owned());
        }
        Ok(resp)
    }

    fn session_id(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_session_id(&self, session_id: String) {
        *self.session_id.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(session_id);
    }

    fn take_session_id(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// The flattened result of a tool call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallToolOutput {
    /// Text content of the result.
    pub text: String,
    /// Whether the tool reported a failure.
    pub is_error: bool,
}

#[async_trait]
impl ToolProvider for McpClient {
    async fn definitions(&self) -> Result<Vec<ModelTool>, tool::Error> {
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> ToolResult {
        let output = self.call(name, arguments).await?;
        if output.is_error {
            return Err(tool::Error::execution_error().with_reason(output.text));
        }
        Ok(output.text)
    }
}

/// Connection problems and server errors are worth another attempt,
/// protocol errors are not.
fn classify(err: McpError) -> backoff::Error<McpError> {
    match &err {
        McpError::Http(_) | McpError::SessionExpired => {
            backoff::Error::transient(err)
        }
        McpError::Status { status, .. } if status.is_server_error() => {
            backoff::Error::transient(err)
        }
        _ => backoff::Error::permanent(err),
    }
}

/// Reads the answer to request `id` from a JSON or event-stream reply.
async fn read_message(mut resp: Response, id: u64) -> Result<Message, McpError> {
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    let essence = content_type
        .parse::<Mime>()
        .map(|mime| mime.essence_str().to_owned())
        .unwrap_or_default();

    match essence.as_str() {
        "application/json" => {
            let body = resp.bytes().await?;
            let message: Message = serde_json::from_slice(&body)?;
            if message.answers(id) {
                Ok(message)
            } else {
                Err(McpError::NoResponse(id))
            }
        }
        "text/event-stream" => {
            let mut lines = LineBuffer::default();
            while let Some(chunk) = resp.chunk().await? {
                for line in lines.push(&chunk) {
                    if let Some(message) = parse_event_line(&line, id)? {
                        return Ok(message);
                    }
                }
            }
            for line in lines.finish() {
                if let Some(message) = parse_event_line(&line, id)? {
                    return Ok(message);
                }
            }
            Err(McpError::NoResponse(id))
        }
        _ => Err(McpError::ContentType(content_type)),
    }
}

fn parse_event_line(line: &str, id: u64) -> Result<Option<Message>, McpError> {
    let Some(payload) = sse::data_payload(line) else {
        return Ok(None);
    };
    if payload.is_empty() {
        return Ok(None);
    }
    let message: Message = serde_json::from_str(payload)?;
    if message.answers(id) {
        Ok(Some(message))
    } else {
        trace!("skipping unrelated message: {payload}");
        Ok(None)
    }
}
