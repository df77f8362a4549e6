use std::collections::VecDeque;
use std::fmt;

use chat_relay_core::conversation::{Message, Role};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use super::ChatUpdate;
use crate::reader::{TurnEvent, read_turn};
use crate::relay_client::RelayClient;
use crate::segments::split;
use crate::{ClientError, History};

pub enum Command {
    SendMessage(String),
    BufferGrew {
        id: String,
        buffer: String,
    },
    TurnCompleted {
        id: String,
        outcome: Result<(), ClientError>,
    },
    Snapshot(oneshot::Sender<History>),
}

impl fmt::Debug for Command {
    // Buffers grow with every chunk, only their length is worth logging.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SendMessage(text) => f
                .debug_struct("SendMessage")
                .field("len", &text.len())
                .finish(),
            Command::BufferGrew { id, buffer } => f
                .debug_struct("BufferGrew")
                .field("id", id)
                .field("len", &buffer.len())
                .finish(),
            Command::TurnCompleted { id, outcome } => f
                .debug_struct("TurnCompleted")
                .field("id", id)
                .field("outcome", outcome)
                .finish(),
            Command::Snapshot(_) => f.write_str("Snapshot"),
        }
    }
}

struct RunningTurn {
    id: String,
    task: JoinHandle<()>,
}

pub struct SessionState {
    relay: RelayClient,
    history: History,
    updates: mpsc::UnboundedSender<ChatUpdate>,
    // Weak, so that the session stops once its handle is dropped even
    // while a reader task is running.
    mailbox: mpsc::WeakUnboundedSender<Command>,
    current_turn: Option<RunningTurn>,
    pending_inputs: VecDeque<String>,
    closed: bool,
}

impl SessionState {
    pub fn new(
        relay: RelayClient,
        history: History,
        updates: mpsc::UnboundedSender<ChatUpdate>,
        mailbox: mpsc::WeakUnboundedSender<Command>,
    ) -> Self {
        Self {
            relay,
            history,
            updates,
            mailbox,
            current_turn: None,
            pending_inputs: VecDeque::new(),
            closed: false,
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::SendMessage(text) => self.enqueue_user_input(text),
            Command::BufferGrew { id, buffer } => self.buffer_grew(id, buffer),
            Command::TurnCompleted { id, outcome } => {
                self.turn_completed(id, outcome)
            }
            Command::Snapshot(tx) => {
                tx.send(self.history.clone()).ok();
            }
        }
    }

    fn enqueue_user_input(&mut self, text: String) {
        if self.current_turn.is_some() {
            // Handled once the running turn completes.
            self.pending_inputs.push_back(text);
            return;
        }
        self.start_turn(text);
    }

    fn process_next_input(&mut self) {
        if self.current_turn.is_some() {
            return;
        }
        match self.pending_inputs.pop_front() {
            Some(text) => self.start_turn(text),
            None => self.emit(ChatUpdate::Idle),
        }
    }

    fn start_turn(&mut self, text: String) {
        let user = Message::user(Uuid::new_v4().to_string(), text);
        self.history.append_user(user.clone());
        self.emit(ChatUpdate::UserMessage(user));
        let messages = self.history.messages().to_vec();

        let id = Uuid::new_v4().to_string();
        let placeholder = Message::assistant_streaming(id.clone());
        self.history.upsert_streaming(placeholder.clone());
        self.emit(ChatUpdate::Streaming {
            segments: split(&placeholder.content),
            message: placeholder,
        });

        let relay = self.relay.clone();
        let mailbox = self.mailbox.clone();
        let turn_id = id.clone();
        let emit = move |event: TurnEvent| {
            let Some(mailbox) = mailbox.upgrade() else {
                return false;
            };
            let command = match event {
                TurnEvent::BufferGrew(buffer) => Command::BufferGrew {
                    id: turn_id.clone(),
                    buffer,
                },
                TurnEvent::Completed(outcome) => Command::TurnCompleted {
                    id: turn_id.clone(),
                    outcome,
                },
            };
            mailbox.send(command).is_ok()
        };
        let task = tokio::spawn(
            async move {
                match relay.open(&messages).await {
                    Ok(stream) => read_turn(stream, emit).await,
                    Err(err) => {
                        emit(TurnEvent::Completed(Err(err)));
                    }
                }
            }
            .instrument(debug_span!("turn", id = %id)),
        );
        self.current_turn = Some(RunningTurn { id, task });
    }

    fn buffer_grew(&mut self, id: String, buffer: String) {
        if !self.is_current(&id) {
            trace!("dropping a late update of turn {id}");
            return;
        }
        let message = Message {
            role: Role::Assistant,
            content: buffer,
            id,
            streaming: true,
        };
        self.history.upsert_streaming(message.clone());
        let segments = split(&message.content);
        self.emit(ChatUpdate::Streaming { message, segments });
    }

    fn turn_completed(&mut self, id: String, outcome: Result<(), ClientError>) {
        if !self.is_current(&id) {
            trace!("dropping a late completion of turn {id}");
            return;
        }
        self.current_turn = None;

        if let Some(message) = self.history.commit_final(&id) {
            let segments = split(&message.content);
            self.emit(ChatUpdate::Committed { message, segments });
        }
        if let Err(error) = outcome {
            error!("turn {id} failed: {error}");
            self.emit(ChatUpdate::Failed { id, error });
        }
        self.process_next_input();
    }

    #[inline]
    fn is_current(&self, id: &str) -> bool {
        self.current_turn.as_ref().is_some_and(|turn| turn.id == id)
    }

    fn emit(&mut self, update: ChatUpdate) {
        if self.updates.send(update).is_err() && !self.closed {
            debug!("update receiver is gone");
            self.closed = true;
        }
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        if let Some(turn) = self.current_turn.take() {
            turn.task.abort();
        }
    }
}

pub async fn run_session(
    mut state: SessionState,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    debug!("started");
    while let Some(command) = commands.recv().await {
        trace!("received command: {command:?}");
        state.handle(command);
        if state.closed {
            break;
        }
    }
    debug!("will terminate");
}
