//! Worker-local bookkeeping for containers and volumes
//!
//! Podman labels are fixed at creation, so state that changes afterwards
//! (container properties, cache initialization of volumes) lives here.

use crate::error::ResfetchResult;
use crate::persist::{read_json, write_json_atomic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// A volume mounted into a recorded container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountRecord {
    pub volume: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub owner: String,
    pub mounts: Vec<MountRecord>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeRecord {
    /// Cache this volume was committed to
    pub resource_cache_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Default for VolumeRecord {
    fn default() -> Self {
        Self {
            resource_cache_id: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerState {
    pub containers: BTreeMap<String, ContainerRecord>,
    pub volumes: BTreeMap<String, VolumeRecord>,
}

impl LedgerState {
    /// Handle of the volume committed to a cache
    pub fn volume_for_cache(&self, cache_id: i64) -> Option<&str> {
        self.volumes
            .iter()
            .find(|(_, v)| v.resource_cache_id == Some(cache_id))
            .map(|(handle, _)| handle.as_str())
    }
}

/// Ledger persisted as a JSON file
pub struct Ledger {
    path: PathBuf,
    state: Mutex<LedgerState>,
}

impl Ledger {
    pub async fn open(path: impl Into<PathBuf>) -> ResfetchResult<Self> {
        let path = path.into();
        let state = read_json(&path).await?.unwrap_or_default();
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read<R>(&self, f: impl FnOnce(&LedgerState) -> R) -> R {
        let state = self.state.lock().await;
        f(&state)
    }

    /// Apply a mutation and persist it
    ///
    /// The mutation runs on a copy that replaces the state only once it is
    /// on disk. If `f` or the write fails, readers keep seeing the old state.
    pub async fn update<R>(
        &self,
        f: impl FnOnce(&mut LedgerState) -> ResfetchResult<R>,
    ) -> ResfetchResult<R> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let result = f(&mut next)?;
        write_json_atomic(&self.path, &next).await?;
        *state = next;
        Ok(result)
    }
}
