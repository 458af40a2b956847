use crate::error::{QuarryError, Result};
use crate::types::Message;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Conversation {
    messages: Vec<Message>,
    touched_at: Instant,
}

/// Bounded per-conversation message history.
///
/// Keeps the most recent `max_messages` per conversation. A conversation
/// idle for longer than `ttl` reads as empty and is dropped on the next
/// access or [`purge_expired`](Self::purge_expired). Contents do not
/// survive a restart.
pub struct ConversationCache {
    entries: Mutex<HashMap<String, Conversation>>,
    max_messages: usize,
    ttl: Option<Duration>,
}

impl ConversationCache {
    pub fn new(max_messages: usize, ttl: Option<Duration>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_messages: max_messages.max(1),
            ttl,
        }
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Append messages to a conversation, truncating to the newest N.
    pub fn append(&self, conversation_id: &str, messages: impl IntoIterator<Item = Message>) -> Result<()> {
        let mut entries = self.lock()?;
        let now = Instant::now();

        let conversation = entries
            .entry(conversation_id.to_string())
            .or_insert_with(|| Conversation {
                messages: Vec::new(),
                touched_at: now,
            });
        if self.expired(conversation, now) {
            conversation.messages.clear();
        }

        conversation.messages.extend(messages);
        let overflow = conversation.messages.len().saturating_sub(self.max_messages);
        if overflow > 0 {
            conversation.messages.drain(..overflow);
        }
        conversation.touched_at = now;
        Ok(())
    }

    /// Messages of a conversation, oldest first. Unknown or expired
    /// conversations are empty.
    pub fn history(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let mut entries = self.lock()?;
        let now = Instant::now();

        match entries.get(conversation_id) {
            Some(c) if self.expired(c, now) => {
                entries.remove(conversation_id);
                Ok(Vec::new())
            }
            Some(c) => Ok(c.messages.clone()),
            None => Ok(Vec::new()),
        }
    }

    /// Drop every expired conversation. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, c| !self.expired(c, now));
        Ok(before - entries.len())
    }

    /// Number of live conversations.
    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(entries) => entries.len(),
            Err(poisoned) => {
                log::warn!("Conversation cache lock is poisoned, reading through it");
                poisoned.into_inner().len()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expired(&self, conversation: &Conversation, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.duration_since(conversation.touched_at) > ttl,
            None => false,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Conversation>>> {
        self.entries
            .lock()
            .map_err(|_| QuarryError::LockPoisoned("conversation cache"))
    }
}
