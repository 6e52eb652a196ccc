use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::core::process::ProcessState;

/// What a single observation of a process meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First time this key was seen; establishes the baseline.
    Baseline,
    /// Same state as last time.
    Unchanged,
    /// Left RUNNING without anyone asking it to. Worth a notification.
    Crashed { previous: ProcessState },
    /// Left RUNNING after a user-issued stop; the suppression flag was consumed.
    SuppressedStop,
    /// Any other change, e.g. STOPPED -> STARTING or FATAL -> RUNNING.
    Changed { previous: ProcessState },
}

impl Observation {
    pub fn should_notify(self) -> bool {
        matches!(self, Observation::Crashed { .. })
    }
}

/// Last observed state per process key plus the keys whose next stop was
/// requested by a user. Both live behind one lock so "flag then stop" and
/// "check flag then clear" never interleave.
#[derive(Debug, Default)]
pub struct ProcessTracker {
    states: HashMap<String, ProcessState>,
    suppressed: HashSet<String>,
}

pub type SharedTracker = Arc<Mutex<ProcessTracker>>;

impl ProcessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedTracker {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn observe(&mut self, key: &str, current: ProcessState) -> Observation {
        let previous = self.states.insert(key.to_string(), current);

        if current.is_running() {
            self.suppressed.remove(key);
        }

        match previous {
            None => Observation::Baseline,
            Some(prev) if prev == current => Observation::Unchanged,
            Some(prev) if prev.is_running() => {
                if self.suppressed.remove(key) {
                    Observation::SuppressedStop
                } else {
                    Observation::Crashed { previous: prev }
                }
            }
            Some(prev) => Observation::Changed { previous: prev },
        }
    }

    /// Marks the next RUNNING -> non-RUNNING transition of `key` as user
    /// initiated. Only keys last seen RUNNING can be flagged; returns whether
    /// the flag is now set.
    pub fn suppress(&mut self, key: &str) -> bool {
        if self.states.get(key).is_some_and(|s| s.is_running()) {
            self.suppressed.insert(key.to_string());
            true
        } else {
            false
        }
    }

    pub fn clear_suppression(&mut self, key: &str) -> bool {
        self.suppressed.remove(key)
    }

    pub fn is_suppressed(&self, key: &str) -> bool {
        self.suppressed.contains(key)
    }

    pub fn state_of(&self, key: &str) -> Option<ProcessState> {
        self.states.get(key).copied()
    }

    pub fn tracked_count(&self) -> usize {
        self.states.len()
    }
}
