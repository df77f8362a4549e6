use std::collections::HashSet;
use std::io;
use std::path::Path;

use chat_relay_core::conversation::{Message, Role};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ClientError;

/// The single conversation of a client, in turn order.
///
/// Updates replace whole messages. Every id appears at most once after
/// a commit, however many streaming updates preceded it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    /// Returns the messages in turn order.
    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Appends a user message.
    #[inline]
    pub fn append_user(&mut self, msg: Message) {
        debug_assert_eq!(msg.role, Role::User);
        self.messages.push(msg);
    }

    /// Replaces the in-progress message if `partial` continues it, and
    /// appends `partial` otherwise.
    ///
    /// A partial for an id that is already terminal is ignored.
    pub fn upsert_streaming(&mut self, partial: Message) {
        if self.terminal(&partial.id).is_some() {
            trace!("ignoring a late update of committed message {}", partial.id);
            return;
        }
        match self.messages.last_mut() {
            Some(last) if last.id == partial.id && last.streaming => {
                *last = partial;
            }
            _ => self.messages.push(partial),
        }
    }

    /// Finalizes the message `id`, leaving exactly one terminal entry
    /// with that id.
    ///
    /// A message that is already terminal is never changed again, its
    /// entry wins over any streaming leftovers. Otherwise the latest
    /// entry is finalized and moved to the end. Returns the committed
    /// message, `None` if `id` is unknown.
    pub fn commit_final(&mut self, id: &str) -> Option<Message> {
        if let Some(idx) = self.terminal(id) {
            let committed = self.messages[idx].clone();
            let mut seen = false;
            self.messages.retain(|msg| {
                if msg.id != id {
                    return true;
                }
                let keep = !msg.streaming && !seen;
                seen |= keep;
                keep
            });
            return Some(committed);
        }

        let mut latest = self
            .messages
            .iter()
            .rev()
            .find(|msg| msg.id == id)
            .cloned()?;
        latest.streaming = false;
        self.messages.retain(|msg| msg.id != id);
        self.messages.push(latest.clone());
        Some(latest)
    }

    fn terminal(&self, id: &str) -> Option<usize> {
        self.messages
            .iter()
            .position(|msg| msg.id == id && !msg.streaming)
    }

    /// Reads a history file. A missing file is an empty history.
    ///
    /// Messages left streaming by an interrupted run are finalized. Ids
    /// are made unique again: later entries reusing an id are dropped,
    /// and entries without an id get a fresh one.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let bytes = match tokio::fs::read(path.as_ref()).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };
        let loaded: Vec<Message> = serde_json::from_slice(&bytes)?;

        let mut seen = HashSet::with_capacity(loaded.len());
        let mut messages = Vec::with_capacity(loaded.len());
        for mut msg in loaded {
            if msg.id.is_empty() {
                msg.id = Uuid::new_v4().to_string();
                warn!("assigned id {} to a message without one", msg.id);
            }
            if !seen.insert(msg.id.clone()) {
                warn!("dropping a duplicate of message {}", msg.id);
                continue;
            }
            if msg.streaming {
                warn!("finalizing message {} left streaming", msg.id);
                msg.streaming = false;
            }
            messages.push(msg);
        }
        Ok(Self { messages })
    }

    /// Writes the history file.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ClientError> {
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn assistant(id: &str, content: &str, streaming: bool) -> Message {
        Message {
            role: Role::Assistant,
            content: content.to_owned(),
            id: id.to_owned(),
            streaming,
        }
    }

    #[test]
    fn test_streaming_then_commit() {
        let mut history = History::default();
        history.append_user(Message::user("u1", "hi"));
        history.upsert_streaming(assistant("a1", "", true));
        history.upsert_streaming(assistant("a1", "<think>", true));
        history.upsert_streaming(assistant("a1", "<think>x</think>Hey", true));
        assert_eq!(history.messages().len(), 2);

        let committed = history.commit_final("a1").unwrap();
        assert_eq!(committed, assistant("a1", "<think>x</think>Hey", false));
        assert_eq!(
            history.messages(),
            [Message::user("u1", "hi"), committed.clone()]
        );

        // Repeated commits keep the single terminal entry.
        assert_eq!(history.commit_final("a1"), Some(committed));
        assert_eq!(history.messages().len(), 2);
        assert_eq!(history.commit_final("nope"), None);
    }

    #[test]
    fn test_committed_message_is_final() {
        let mut history = History::default();
        history.append_user(Message::user("u1", "hi"));
        history.upsert_streaming(assistant("a1", "full", true));
        history.upsert_streaming(assistant("a1", "full answer", true));
        history.commit_final("a1");

        // A late update for the committed id changes nothing.
        history.upsert_streaming(assistant("a1", "full", true));
        assert_eq!(
            history.messages(),
            [Message::user("u1", "hi"), assistant("a1", "full answer", false)]
        );

        let committed = history.commit_final("a1").unwrap();
        assert_eq!(committed, assistant("a1", "full answer", false));
        assert_eq!(history.messages().len(), 2);
    }

    #[test]
    fn test_terminal_entry_wins_over_leftovers() {
        let mut history = History {
            messages: vec![
                Message::user("u1", "hi"),
                assistant("a1", "done", false),
                assistant("a1", "do", true),
            ],
        };
        let committed = history.commit_final("a1").unwrap();
        assert_eq!(committed, assistant("a1", "done", false));
        assert_eq!(
            history.messages(),
            [Message::user("u1", "hi"), assistant("a1", "done", false)]
        );
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("chat-relay-history-{}.json", uuid::Uuid::new_v4()));
        assert_eq!(History::load(&path).await.unwrap(), History::default());

        let mut history = History::default();
        history.append_user(Message::user("u1", "hi"));
        history.upsert_streaming(assistant("a1", "cut off", true));
        history.save(&path).await.unwrap();

        let loaded = History::load(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();
        assert_eq!(
            loaded.messages(),
            [Message::user("u1", "hi"), assistant("a1", "cut off", false)]
        );
    }

    #[tokio::test]
    async fn test_load_restores_unique_ids() {
        let path = std::env::temp_dir()
            .join(format!("chat-relay-history-{}.json", uuid::Uuid::new_v4()));
        tokio::fs::write(
            &path,
            r#"[{"role":"user","content":"hi","id":"u1"},
                {"role":"assistant","content":"first","id":"a1"},
                {"role":"assistant","content":"again","id":"a1"},
                {"role":"user","content":"more","id":""}]"#,
        )
        .await
        .unwrap();

        let loaded = History::load(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();
        let messages = loaded.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1], assistant("a1", "first", false));
        assert_eq!(messages[2].content, "more");
        assert!(!messages[2].id.is_empty());

        let mut ids: Vec<_> = messages.iter().map(|msg| msg.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }
}
