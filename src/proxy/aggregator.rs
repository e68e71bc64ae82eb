//! Result aggregation for a check run

use crate::proxy::models::ProbeOutcome;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// State accumulated over one check run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckSession {
    /// Every outcome, in completion order
    pub all_results: Vec<ProbeOutcome>,
    /// Raw strings of proxies that answered
    pub working: Vec<String>,
    /// Raw strings of proxies that did not
    pub failed: Vec<String>,
}

impl CheckSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one outcome to the full list and to exactly one of the
    /// working/failed lists
    pub fn record(&mut self, outcome: ProbeOutcome) {
        if outcome.succeeded {
            self.working.push(outcome.raw_proxy.clone());
        } else {
            self.failed.push(outcome.raw_proxy.clone());
        }
        self.all_results.push(outcome);
    }

    pub fn len(&self) -> usize {
        self.all_results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all_results.is_empty()
    }

    /// Copy of the outcomes, fastest first; outcomes without latency go last
    /// and ties keep completion order
    pub fn sorted_by_latency(&self) -> Vec<ProbeOutcome> {
        let mut sorted = self.all_results.clone();
        sorted.sort_by_key(|outcome| (outcome.latency_ms.is_none(), outcome.latency_ms));
        sorted
    }
}

/// Shared handle to a [`CheckSession`].
///
/// Clones point at the same session. Every write goes through one lock so the
/// three lists always agree.
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    session: Arc<Mutex<CheckSession>>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: ProbeOutcome) {
        self.lock().record(outcome);
    }

    /// Consistent copy of the session as it stands now
    pub fn snapshot(&self) -> CheckSession {
        self.lock().clone()
    }

    pub fn sorted_by_latency(&self) -> Vec<ProbeOutcome> {
        self.lock().sorted_by_latency()
    }

    /// Number of outcomes recorded so far
    pub fn completed(&self) -> usize {
        self.lock().len()
    }

    /// Take the session out, leaving an empty one behind
    pub fn take(&self) -> CheckSession {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, CheckSession> {
        // Records are appended whole, so a poisoned session is still consistent.
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
