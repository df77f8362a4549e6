use std::sync::Arc;

use chat_relay_model::ModelProvider;

use super::Relay;
use crate::model_client::ModelClient;
use crate::tool::{NoTools, ToolProvider};

/// Default limit of model rounds that may request tools in one turn.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

/// [`Relay`] builder.
pub struct RelayBuilder {
    pub(crate) model_client: ModelClient,
    pub(crate) tools: Arc<dyn ToolProvider>,
    pub(crate) system_instruction: Option<String>,
    pub(crate) max_tool_rounds: usize,
}

impl RelayBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            tools: Arc::new(NoTools),
            system_instruction: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    /// Sets the provider executing tool calls.
    #[inline]
    pub fn with_tools(mut self, tools: Arc<dyn ToolProvider>) -> Self {
        self.tools = tools;
        self
    }

    /// Sets the system instruction sent with every request.
    #[inline]
    pub fn with_system_instruction<S: Into<String>>(
        mut self,
        instruction: S,
    ) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    /// Sets how many model rounds of one turn may request tools.
    #[inline]
    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    /// Builds the relay.
    #[inline]
    pub fn build(self) -> Relay {
        Relay::from_builder(self)
    }
}
