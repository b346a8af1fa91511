//! Coordinator for deduplicated information queries
//!
//! A Coordinator owns one [`InfoProvider`](crate::provider::InfoProvider) and
//! turns any number of concurrent requests into at most one in-flight query:
//! - **Request:** queue a completion callback, starting a query when idle
//! - **Coalesce:** requests made while a query runs share its result
//! - **Drain:** every queued callback fires once, in request order, including
//!   callbacks queued from inside the drain itself

mod config;
mod core;
mod handle;
mod messages;
mod queue;
mod worker;

pub use config::{CoordinatorConfig, ShutdownPolicy};
pub use core::Coordinator;
pub use handle::CoordinatorHandle;
pub use messages::{CoordError, CoordRequest, CoordinatorMetrics, CoordinatorState, FailureReason, QueryOutcome};
pub use queue::{CallbackQueue, Completion, InfoCallback};

pub(crate) use messages::ControlSignal;
