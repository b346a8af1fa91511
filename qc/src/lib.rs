//! querycoord - Deduplicating query coordinator
//!
//! Some information is expensive to compute and asked for by many callers at
//! once: storage capacity, hardware snapshots, integrity sweeps. A
//! [`Coordinator`] sits in front of one such source and guarantees that at
//! most one query runs at a time. Requests that arrive while it runs share
//! its result.
//!
//! # Modules
//!
//! - [`coordinator`] - Control task, handles, callback queue
//! - [`provider`] - The [`InfoProvider`] trait and preparation token
//! - [`providers`] - Storage and integrity providers
//! - [`registry`] - One coordinator per provider type
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod provider;
pub mod providers;
pub mod registry;

// Re-export commonly used types
pub use config::{Config, StorageConfig};
pub use coordinator::{
    CallbackQueue, Completion, CoordError, CoordRequest, Coordinator, CoordinatorConfig, CoordinatorHandle,
    CoordinatorMetrics, CoordinatorState, FailureReason, InfoCallback, QueryOutcome, ShutdownPolicy,
};
pub use provider::{InfoProvider, Ready};
pub use providers::{
    IntegrityCheck, IntegrityReport, IntegrityResult, IntegrityStatus, IntegritySweep, IntegrityTarget, StorageInfo,
    StorageProvider, StorageUnit,
};
pub use registry::Registry;
