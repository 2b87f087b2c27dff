// Per-actor, per-target serialization of toggle operations

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::error::{AppError, AppResult};

/// Tracks toggles that have been issued but not yet resolved.
/// A second toggle on the same key fails fast instead of racing the first.
#[derive(Debug, Clone, Default)]
pub struct InFlightGuard {
    keys: Arc<Mutex<HashSet<String>>>,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, key: String) -> AppResult<InFlightTicket> {
        let mut keys = self
            .keys
            .lock()
            .map_err(|_| AppError::Internal("in-flight registry poisoned".to_string()))?;
        if !keys.insert(key.clone()) {
            debug!("Rejected overlapping toggle {}", key);
            return Err(AppError::InFlight(key));
        }
        Ok(InFlightTicket {
            key,
            keys: Arc::clone(&self.keys),
        })
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.keys.lock().map(|keys| keys.contains(key)).unwrap_or(false)
    }
}

/// Releases its key when dropped, whether the toggle succeeded or not
#[derive(Debug)]
pub struct InFlightTicket {
    key: String,
    keys: Arc<Mutex<HashSet<String>>>,
}

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        if let Ok(mut keys) = self.keys.lock() {
            keys.remove(&self.key);
        }
    }
}

pub fn like_key(actor: &str, post: &str) -> String {
    format!("like:{}:{}", actor, post)
}

pub fn follow_key(actor: &str, target: &str) -> String {
    format!("follow:{}:{}", actor, target)
}
