//! Message types for the Coordinator

use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

use super::queue::InfoCallback;

/// Why a drain cycle delivered failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("Query failed: {0}")]
    Query(String),

    #[error("Query panicked")]
    QueryPanicked,

    #[error("Query could not be scheduled on the worker pool")]
    NotScheduled,

    #[error("Preparation timed out")]
    PreparationTimedOut,

    #[error("Preparation abandoned without dispatch")]
    PreparationAbandoned,

    #[error("Coordinator shutting down")]
    ShuttingDown,
}

/// Outcome delivered uniformly to every callback of one drain cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Succeeded,
    Failed(FailureReason),
}

impl QueryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, QueryOutcome::Succeeded)
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            QueryOutcome::Succeeded => None,
            QueryOutcome::Failed(reason) => Some(reason),
        }
    }

    pub fn into_result(self) -> Result<(), FailureReason> {
        match self {
            QueryOutcome::Succeeded => Ok(()),
            QueryOutcome::Failed(reason) => Err(reason),
        }
    }
}

/// Errors surfaced by [`super::CoordinatorHandle`]
#[derive(Debug, Error)]
pub enum CoordError {
    #[error("Coordinator channel closed")]
    ChannelClosed,

    #[error("Coordinator channel full")]
    ChannelFull,

    #[error("Coordinator dropped the reply")]
    ReplyDropped,

    #[error(transparent)]
    QueryFailed(#[from] FailureReason),
}

/// Requests to the Coordinator task
pub enum CoordRequest<I> {
    /// Queue a completion callback, starting a query if none is in flight
    RequestInfo { callback: InfoCallback<I> },

    /// Get current metrics
    GetMetrics {
        reply_tx: oneshot::Sender<CoordinatorMetrics>,
    },

    /// Shutdown the coordinator
    Shutdown,
}

impl<I> std::fmt::Debug for CoordRequest<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordRequest::RequestInfo { .. } => f.write_str("RequestInfo"),
            CoordRequest::GetMetrics { .. } => f.write_str("GetMetrics"),
            CoordRequest::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Signals raised on the control task's own behalf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// The preparation hook released the cycle for dispatch
    Prepared(u64),
    /// The preparation bound elapsed
    PreparationTimedOut(u64),
    /// The preparation token was dropped without dispatching
    PreparationAbandoned(u64),
}

/// Lifecycle of one drain cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoordinatorState {
    #[default]
    Idle,
    AwaitingPreparation,
    AwaitingQuery,
    Draining,
}

/// Coordinator metrics for observability
#[derive(Debug, Clone, Default, Serialize)]
pub struct CoordinatorMetrics {
    /// Callbacks accepted, including reentrant ones
    pub requests: u64,
    /// Requests that joined an already running cycle
    pub coalesced: u64,
    /// Requests issued from inside a completion callback
    pub reentrant: u64,
    /// Query Operations handed to the worker pool
    pub dispatches: u64,
    pub successes: u64,
    pub failures: u64,
    pub pending_callbacks: usize,
    pub state: CoordinatorState,
}

impl CoordinatorMetrics {
    /// Fraction of requests served by an existing cycle (0.0 to 1.0)
    pub fn coalescing_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            (self.coalesced + self.reentrant) as f64 / self.requests as f64
        }
    }

    pub fn in_flight(&self) -> bool {
        self.state != CoordinatorState::Idle
    }
}
