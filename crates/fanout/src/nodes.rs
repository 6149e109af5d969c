use std::collections::HashMap;
use std::time::{Duration, Instant};

use pgsocket_core::types::NodeId;

/// Last-seen bookkeeping for peer nodes.
///
/// Time is passed in explicitly so callers decide the clock.
#[derive(Debug)]
pub struct NodeTracker {
    last_seen: HashMap<NodeId, Instant>,
    timeout: Duration,
}

impl NodeTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_seen: HashMap::new(),
            timeout,
        }
    }

    /// Record activity from `uid`. Returns `true` if the node was unknown.
    pub fn touch(&mut self, uid: &str, now: Instant) -> bool {
        self.last_seen.insert(uid.to_string(), now).is_none()
    }

    /// Drop nodes silent for longer than the timeout, returning their IDs.
    pub fn prune(&mut self, now: Instant) -> Vec<NodeId> {
        let timeout = self.timeout;
        let mut expired = Vec::new();
        self.last_seen.retain(|uid, seen| {
            let alive = now.saturating_duration_since(*seen) <= timeout;
            if !alive {
                expired.push(uid.clone());
            }
            alive
        });
        expired
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}
