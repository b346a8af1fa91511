//! Storage snapshot provider

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use nix::sys::statvfs::statvfs;
use serde::Serialize;
use tracing::debug;

use crate::provider::{InfoProvider, Ready};

/// Capacity figures for one mounted filesystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageUnit {
    pub path: PathBuf,
    pub capacity_bytes: u64,
    /// Space usable by unprivileged users
    pub available_bytes: u64,
    pub free_bytes: u64,
    pub filesystem_id: u64,
}

impl StorageUnit {
    /// Stat the filesystem containing `path`
    pub fn stat(path: PathBuf) -> Result<Self> {
        debug!(?path, "StorageUnit::stat: called");
        let stat = statvfs(path.as_path()).context(format!("statvfs failed for {}", path.display()))?;
        let fragment = stat.fragment_size() as u64;

        Ok(Self {
            capacity_bytes: stat.blocks() as u64 * fragment,
            available_bytes: stat.blocks_available() as u64 * fragment,
            free_bytes: stat.blocks_free() as u64 * fragment,
            filesystem_id: stat.filesystem_id() as u64,
            path,
        })
    }

    pub fn used_bytes(&self) -> u64 {
        self.capacity_bytes.saturating_sub(self.free_bytes)
    }

    /// Fraction of capacity in use (0.0 to 1.0)
    pub fn usage_ratio(&self) -> f64 {
        if self.capacity_bytes == 0 {
            0.0
        } else {
            self.used_bytes() as f64 / self.capacity_bytes as f64
        }
    }
}

/// Latest snapshot of every configured storage path
#[derive(Debug, Clone, Default, Serialize)]
pub struct StorageInfo {
    pub units: Vec<StorageUnit>,
    pub queried_at: Option<DateTime<Utc>>,
}

/// Queries filesystem capacity for a set of paths
#[derive(Debug, Clone)]
pub struct StorageProvider {
    paths: Vec<PathBuf>,
}

impl StorageProvider {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        debug!(?paths, "StorageProvider::new: called");
        Self { paths }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Default for StorageProvider {
    fn default() -> Self {
        Self::new(vec![PathBuf::from("/")])
    }
}

impl InfoProvider for StorageProvider {
    type Info = StorageInfo;

    fn name(&self) -> &'static str {
        "storage"
    }

    fn prepare(&mut self, ready: Ready) {
        debug!(cycle = ready.cycle(), "StorageProvider::prepare: called");
        self.paths.sort();
        self.paths.dedup();
        ready.dispatch();
    }

    fn query(&mut self, info: &mut StorageInfo) -> Result<()> {
        debug!(paths = self.paths.len(), "StorageProvider::query: called");
        let units = self
            .paths
            .iter()
            .cloned()
            .map(StorageUnit::stat)
            .collect::<Result<Vec<_>>>()?;

        info.units = units;
        info.queried_at = Some(Utc::now());
        Ok(())
    }
}
