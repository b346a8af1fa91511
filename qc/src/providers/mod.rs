//! Built-in information providers

mod integrity;
mod storage;

pub use integrity::{IntegrityCheck, IntegrityReport, IntegrityResult, IntegrityStatus, IntegritySweep, IntegrityTarget};
pub use storage::{StorageInfo, StorageProvider, StorageUnit};
