use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Orders concurrent refreshes of the same resource.
///
/// Every refresh takes a ticket from [`RequestSequencer::begin`]; only a completion
/// whose ticket is newer than the last applied one may touch the view.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    state: Mutex<HashMap<&'static str, Tickets>>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tickets {
    issued: u64,
    applied: u64,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, resource: &'static str) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let tickets = state.entry(resource).or_default();
        tickets.issued += 1;
        tickets.issued
    }

    /// Returns whether the completion carrying `ticket` is still current. Stale
    /// completions return `false` and must be dropped.
    pub fn complete(&self, resource: &'static str, ticket: u64) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let tickets = state.entry(resource).or_default();
        if ticket <= tickets.applied {
            return false;
        }
        tickets.applied = ticket;
        true
    }
}
