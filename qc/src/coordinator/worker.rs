//! Worker dispatch
//!
//! Runs a provider's Query Operation on the blocking pool. The provider and
//! its cached info move into the worker as a single [`QuerySlot`] and come
//! back with the outcome, so two queries for one coordinator can never
//! overlap and the info is never touched from both sides at once.

use std::panic::{AssertUnwindSafe, catch_unwind};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::messages::{FailureReason, QueryOutcome};
use crate::provider::InfoProvider;

/// The provider together with the info it fills in
pub(crate) struct QuerySlot<P: InfoProvider> {
    pub provider: P,
    pub info: P::Info,
}

impl<P: InfoProvider> QuerySlot<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            info: P::Info::default(),
        }
    }
}

/// Worker result delivered back to the control task
pub(crate) struct QueryCompleted<P: InfoProvider> {
    pub cycle: u64,
    /// `None` when the task was dropped before it ran
    pub slot: Option<QuerySlot<P>>,
    pub outcome: QueryOutcome,
}

/// Reports `NotScheduled` if the worker closure is dropped unrun
struct CompletionGuard<P: InfoProvider> {
    cycle: u64,
    tx: Option<mpsc::UnboundedSender<QueryCompleted<P>>>,
}

impl<P: InfoProvider> CompletionGuard<P> {
    fn complete(mut self, slot: QuerySlot<P>, outcome: QueryOutcome) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(QueryCompleted {
                cycle: self.cycle,
                slot: Some(slot),
                outcome,
            });
        }
    }
}

impl<P: InfoProvider> Drop for CompletionGuard<P> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            warn!(cycle = self.cycle, "Query task dropped before running");
            let _ = tx.send(QueryCompleted {
                cycle: self.cycle,
                slot: None,
                outcome: QueryOutcome::Failed(FailureReason::NotScheduled),
            });
        }
    }
}

/// Hand `slot` to the blocking pool and report back on `completions`
pub(crate) fn run_query<P: InfoProvider>(
    cycle: u64,
    slot: QuerySlot<P>,
    completions: mpsc::UnboundedSender<QueryCompleted<P>>,
) {
    debug!(cycle, provider = slot.provider.name(), "run_query: called");
    let guard = CompletionGuard {
        cycle,
        tx: Some(completions),
    };

    // The JoinHandle is not needed; the guard reports every exit path
    let _ = tokio::task::spawn_blocking(move || {
        let (slot, outcome) = execute(slot);
        guard.complete(slot, outcome);
    });
}

fn execute<P: InfoProvider>(mut slot: QuerySlot<P>) -> (QuerySlot<P>, QueryOutcome) {
    let QuerySlot { provider, info } = &mut slot;
    let outcome = match catch_unwind(AssertUnwindSafe(|| provider.query(info))) {
        Ok(Ok(())) => QueryOutcome::Succeeded,
        Ok(Err(e)) => {
            debug!(error = %e, "execute: query reported failure");
            QueryOutcome::Failed(FailureReason::Query(format!("{e:#}")))
        }
        Err(_) => {
            warn!(provider = slot.provider.name(), "Query operation panicked");
            QueryOutcome::Failed(FailureReason::QueryPanicked)
        }
    };
    (slot, outcome)
}
