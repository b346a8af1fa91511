//! Integrity sweep provider
//!
//! Runs a caller-supplied [`IntegrityCheck`] over a list of database files.
//! The checker itself lives outside this crate; the sweep only decides which
//! results count as failures.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use serde::Serialize;
use tracing::{debug, warn};

use crate::provider::InfoProvider;

/// Result of checking one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntegrityStatus {
    Ok,
    /// Number of integrity errors reported
    Corrupted(u32),
    NotFound,
    CannotOpen,
    Locked,
}

/// Checks a single storage file
pub trait IntegrityCheck: Send + 'static {
    fn check_integrity(&self, path: &Path) -> IntegrityStatus;
}

impl<F> IntegrityCheck for F
where
    F: Fn(&Path) -> IntegrityStatus + Send + 'static,
{
    fn check_integrity(&self, path: &Path) -> IntegrityStatus {
        self(path)
    }
}

/// A file to sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityTarget {
    pub path: PathBuf,
    /// A missing critical file is a failure; a missing optional one is not
    pub critical: bool,
}

impl IntegrityTarget {
    pub fn critical(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            critical: true,
        }
    }

    pub fn optional(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            critical: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityResult {
    pub target: IntegrityTarget,
    pub status: IntegrityStatus,
}

impl IntegrityResult {
    pub fn is_failure(&self) -> bool {
        match self.status {
            IntegrityStatus::Ok => false,
            IntegrityStatus::NotFound => self.target.critical,
            _ => true,
        }
    }
}

/// Outcome of the most recent sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityReport {
    pub results: Vec<IntegrityResult>,
}

impl IntegrityReport {
    pub fn failures(&self) -> impl Iterator<Item = &IntegrityResult> {
        self.results.iter().filter(|r| r.is_failure())
    }

    pub fn is_healthy(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Provider that sweeps every target with `C` on each query
pub struct IntegritySweep<C: IntegrityCheck> {
    checker: C,
    targets: Vec<IntegrityTarget>,
}

impl<C: IntegrityCheck> IntegritySweep<C> {
    pub fn new(checker: C, targets: Vec<IntegrityTarget>) -> Self {
        debug!(targets = targets.len(), "IntegritySweep::new: called");
        Self { checker, targets }
    }
}

impl<C: IntegrityCheck> InfoProvider for IntegritySweep<C> {
    type Info = IntegrityReport;

    fn name(&self) -> &'static str {
        "integrity-sweep"
    }

    fn query(&mut self, info: &mut IntegrityReport) -> Result<()> {
        debug!(targets = self.targets.len(), "IntegritySweep::query: called");
        if self.targets.is_empty() {
            return Err(eyre!("No integrity targets configured"));
        }

        info.results = self
            .targets
            .iter()
            .map(|target| {
                let status = self.checker.check_integrity(&target.path);
                debug!(path = ?target.path, ?status, "IntegritySweep::query: checked");
                IntegrityResult {
                    target: target.clone(),
                    status,
                }
            })
            .collect();

        for failure in info.failures() {
            warn!(path = ?failure.target.path, status = ?failure.status, "Integrity check failed");
        }
        Ok(())
    }
}
