//! Per-patient chat history kept in memory

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use crate::types::Message;

type SessionKey = (String, i64);

/// Bounded conversation log for each (user, patient) pair
pub struct ChatSessions {
    limit: usize,
    histories: RwLock<HashMap<SessionKey, VecDeque<Message>>>,
}

impl ChatSessions {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            histories: RwLock::new(HashMap::new()),
        }
    }

    /// Add messages, dropping the oldest once over the limit
    pub fn append(&self, user_id: &str, patient_id: i64, messages: impl IntoIterator<Item = Message>) {
        let mut histories = self.histories.write().unwrap_or_else(|e| e.into_inner());
        let history = histories
            .entry((user_id.to_string(), patient_id))
            .or_default();
        for message in messages {
            history.push_back(message);
        }
        while history.len() > self.limit {
            history.pop_front();
        }
    }

    pub fn history(&self, user_id: &str, patient_id: i64) -> Vec<Message> {
        let histories = self.histories.read().unwrap_or_else(|e| e.into_inner());
        histories
            .get(&(user_id.to_string(), patient_id))
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns how many messages were discarded
    pub fn clear(&self, user_id: &str, patient_id: i64) -> usize {
        let mut histories = self.histories.write().unwrap_or_else(|e| e.into_inner());
        histories
            .remove(&(user_id.to_string(), patient_id))
            .map(|h| h.len())
            .unwrap_or(0)
    }
}
