use std::fmt::{self, Debug};
use std::time::Duration;

const DEFAULT_CONNECT_DEADLINE: Duration = Duration::from_secs(30);

/// Configuration of an [`McpClient`](crate::McpClient).
#[derive(Clone)]
pub struct McpConfig {
    pub(crate) url: String,
    pub(crate) bearer_token: Option<String>,
    pub(crate) connect_deadline: Duration,
}

impl McpConfig {
    /// Returns the endpoint URL.
    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Debug for McpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpConfig")
            .field("url", &self.url)
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "<redacted>"),
            )
            .field("connect_deadline", &self.connect_deadline)
            .finish()
    }
}

/// Builder of [`McpConfig`].
pub struct McpConfigBuilder {
    config: McpConfig,
}

impl McpConfigBuilder {
    /// Starts a configuration for the server at `url`.
    #[inline]
    pub fn with_url<S: Into<String>>(url: S) -> Self {
        Self {
            config: McpConfig {
                url: url.into(),
                bearer_token: None,
                connect_deadline: DEFAULT_CONNECT_DEADLINE,
            },
        }
    }

    /// Sends `token` as a bearer token with every request.
    #[inline]
    pub fn with_bearer_token<S: Into<String>>(mut self, token: S) -> Self {
        self.config.bearer_token = Some(token.into());
        self
    }

    /// Sets for how long connecting keeps retrying.
    #[inline]
    pub fn with_connect_deadline(mut self, deadline: Duration) -> Self {
        self.config.connect_deadline = deadline;
        self
    }

    #[inline]
    pub fn build(self) -> McpConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_redacted() {
        let config = McpConfigBuilder::with_url("http://localhost:8000/mcp/")
            .with_bearer_token("s3cret")
            .build();
        let debug = format!("{config:?}");
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("<redacted>"));
    }
}
