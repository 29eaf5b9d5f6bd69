//! Visibility into which messages are currently being sent

use crate::metrics;

use dashmap::DashSet;

/// Message ids held by in-progress sends.
///
/// Advisory only: two sends carrying the same id are not serialized, and the
/// first one to finish removes the id for both.
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    msg_ids: DashSet<String>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, msg_id: &str) {
        self.msg_ids.insert(msg_id.to_string());
        metrics::set_messages_in_flight(self.msg_ids.len());
    }

    pub fn remove(&self, msg_id: &str) {
        self.msg_ids.remove(msg_id);
        metrics::set_messages_in_flight(self.msg_ids.len());
    }

    pub fn contains(&self, msg_id: &str) -> bool {
        self.msg_ids.contains(msg_id)
    }

    pub fn len(&self) -> usize {
        self.msg_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.msg_ids.is_empty()
    }

    /// Register `msg_ids` until the returned guard is dropped
    pub fn track<'a>(&'a self, msg_ids: &'a [String]) -> InFlightGuard<'a> {
        for msg_id in msg_ids {
            self.insert(msg_id);
        }
        InFlightGuard {
            registry: self,
            msg_ids,
        }
    }
}

/// Removes its message ids from the registry on drop, whichever way the send
/// ends (return, error, panic or the future being dropped).
#[must_use = "ids are removed as soon as the guard is dropped"]
pub struct InFlightGuard<'a> {
    registry: &'a InFlightRegistry,
    msg_ids: &'a [String],
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        for msg_id in self.msg_ids {
            self.registry.remove(msg_id);
        }
    }
}
