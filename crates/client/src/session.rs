mod state;

use chat_relay_core::conversation::Message;
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

use crate::relay_client::RelayClient;
use crate::segments::SegmentPair;
use crate::{ClientError, History};
use state::{Command, SessionState, run_session};

/// A change the renderer should reflect.
#[derive(Debug)]
pub enum ChatUpdate {
    /// A user message was added.
    UserMessage(Message),
    /// The in-flight assistant message grew.
    Streaming {
        /// The message as it stands.
        message: Message,
        /// Its current split into reasoning and answer.
        segments: SegmentPair,
    },
    /// An assistant message was finalized. Sent once per turn, an empty
    /// `segments` means there is nothing to show.
    Committed {
        /// The terminal message.
        message: Message,
        /// Its final split into reasoning and answer.
        segments: SegmentPair,
    },
    /// The turn `id` ended with an error. Follows its `Committed`.
    Failed {
        /// Id of the assistant message of the turn.
        id: String,
        /// What went wrong.
        error: ClientError,
    },
    /// No turn is running and none is queued.
    Idle,
}

/// [`ChatSession`] builder.
pub struct ChatSessionBuilder {
    relay: RelayClient,
    history: History,
}

impl ChatSessionBuilder {
    /// Creates a builder for a session talking to the relay at `endpoint`.
    #[inline]
    pub fn with_endpoint<S: Into<String>>(endpoint: S) -> Self {
        Self {
            relay: RelayClient::new(endpoint),
            history: History::default(),
        }
    }

    /// Continues an earlier conversation.
    #[inline]
    pub fn with_history(mut self, history: History) -> Self {
        self.history = history;
        self
    }

    /// Spawns the session task. Updates arrive on the returned receiver,
    /// dropping it stops the session.
    pub fn build(self) -> (ChatSession, mpsc::UnboundedReceiver<ChatUpdate>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let state = SessionState::new(
            self.relay,
            self.history,
            update_tx,
            command_tx.downgrade(),
        );
        tokio::spawn(
            run_session(state, command_rx).instrument(trace_span!("chat session")),
        );
        (ChatSession { commands: command_tx }, update_rx)
    }
}

/// A chat with the relay, like a window with a message list and an
/// input box.
///
/// All state lives in a task that processes one command at a time. At
/// most one turn is in flight; messages sent meanwhile are queued.
/// Dropping the session stops the task and any running turn.
pub struct ChatSession {
    commands: mpsc::UnboundedSender<Command>,
}

impl ChatSession {
    /// Sends a user message, or queues it while a turn is running.
    pub fn send_message<S: Into<String>>(&self, text: S) -> Result<(), ClientError> {
        self.commands
            .send(Command::SendMessage(text.into()))
            .map_err(|_| ClientError::SessionClosed)
    }

    /// Returns a snapshot of the conversation.
    pub async fn history(&self) -> Result<History, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Snapshot(tx))
            .map_err(|_| ClientError::SessionClosed)?;
        rx.await.map_err(|_| ClientError::SessionClosed)
    }
}
