//! Best-effort in-process flag that keeps two evaluations of the same
//! session from running at once. Flags expire on their own, so a crashed
//! request never blocks a session for longer than the TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug)]
pub struct EvaluationGuard {
    ttl: Duration,
    flags: Mutex<HashMap<String, Instant>>,
}

impl EvaluationGuard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            flags: Mutex::new(HashMap::new()),
        }
    }

    /// `None` while another unexpired evaluation holds the session.
    pub fn try_acquire(self: &Arc<Self>, session_id: &str) -> Option<EvaluationTicket> {
        let now = Instant::now();
        let mut flags = self.flags.lock();
        flags.retain(|_, started| now.duration_since(*started) < self.ttl);
        if flags.contains_key(session_id) {
            return None;
        }
        flags.insert(session_id.to_string(), now);
        Some(EvaluationTicket {
            guard: Arc::clone(self),
            session_id: session_id.to_string(),
            acquired_at: now,
        })
    }

    pub fn in_flight(&self) -> usize {
        let now = Instant::now();
        self.flags
            .lock()
            .values()
            .filter(|started| now.duration_since(**started) < self.ttl)
            .count()
    }
}

pub struct EvaluationTicket {
    guard: Arc<EvaluationGuard>,
    session_id: String,
    acquired_at: Instant,
}

impl Drop for EvaluationTicket {
    fn drop(&mut self) {
        let mut flags = self.guard.flags.lock();
        // a newer holder may have replaced an expired flag
        if flags.get(&self.session_id) == Some(&self.acquired_at) {
            flags.remove(&self.session_id);
        }
    }
}
