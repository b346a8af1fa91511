//! Information providers
//!
//! An [`InfoProvider`] supplies the two per-type pieces a coordinator needs:
//! the Query Operation that fills in the information, and an optional
//! preparation hook that runs on the control task before each query.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::coordinator::ControlSignal;

/// A source of expensive, cacheable information
///
/// The provider and its `Info` value travel together: while a query is in
/// flight both are owned by the worker task, otherwise by the control task.
pub trait InfoProvider: Send + 'static {
    /// The information produced by [`InfoProvider::query`]
    type Info: Default + Send + 'static;

    /// Name used in logs and metrics
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Runs on the control task once per dispatch cycle.
    ///
    /// Implementations must call [`Ready::dispatch`] eventually, either
    /// directly or from an asynchronous chain. Dropping the token without
    /// dispatching fails the cycle.
    fn prepare(&mut self, ready: Ready) {
        ready.dispatch();
    }

    /// Synchronously compute the information into `info`.
    ///
    /// Runs on the blocking pool and may perform blocking I/O. On error the
    /// contents of `info` are unspecified.
    fn query(&mut self, info: &mut Self::Info) -> eyre::Result<()>;
}

/// Continuation handed to [`InfoProvider::prepare`]
///
/// Consuming it with [`Ready::dispatch`] lets the coordinator schedule the
/// query for this cycle.
#[must_use = "the cycle never completes unless Ready::dispatch is called"]
pub struct Ready {
    cycle: u64,
    signals: Option<mpsc::UnboundedSender<ControlSignal>>,
}

impl Ready {
    pub(crate) fn new(cycle: u64, signals: mpsc::UnboundedSender<ControlSignal>) -> Self {
        Self {
            cycle,
            signals: Some(signals),
        }
    }

    /// The drain cycle this token belongs to
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Signal that preparation is finished and the query may be scheduled
    pub fn dispatch(mut self) {
        debug!(cycle = self.cycle, "Ready::dispatch: called");
        if let Some(tx) = self.signals.take() {
            // A closed channel means the coordinator already stopped
            let _ = tx.send(ControlSignal::Prepared(self.cycle));
        }
    }
}

impl Drop for Ready {
    fn drop(&mut self) {
        if let Some(tx) = self.signals.take() {
            warn!(cycle = self.cycle, "Preparation token dropped without dispatch");
            let _ = tx.send(ControlSignal::PreparationAbandoned(self.cycle));
        }
    }
}

impl std::fmt::Debug for Ready {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ready").field("cycle", &self.cycle).finish()
    }
}
