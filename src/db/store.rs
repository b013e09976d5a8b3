//! File-backed metadata store
//!
//! Keeps resource cache rows and their metadata in a single JSON document.
//! Every mutation rewrites the document through a temp file and rename, so a
//! crash leaves either the old or the new state on disk. Mutations are
//! applied to a copy and only become visible once the write succeeded.

use crate::atc::{MetadataField, Version};
use crate::db::resource_cache::{ResourceCacheDescriptor, ResourceCacheFactory, UsedResourceCache};
use crate::error::{ResfetchError, ResfetchResult};
use crate::persist::{read_json, write_json_atomic};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// A stored resource cache row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResourceCache {
    pub id: i64,
    pub resource_type: String,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Vec<MetadataField>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    next_id: i64,
    /// Rows keyed by descriptor digest
    caches: BTreeMap<String, StoredResourceCache>,
}

impl StoreState {
    fn find_by_id_mut(&mut self, id: i64) -> Option<&mut StoredResourceCache> {
        self.caches.values_mut().find(|c| c.id == id)
    }
}

/// Resource cache store persisted as JSON on the local filesystem
pub struct FileResourceCacheStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl FileResourceCacheStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub async fn open(path: impl Into<PathBuf>) -> ResfetchResult<Self> {
        let path = path.into();

        let state = match read_json(&path).await? {
            Some(state) => state,
            None => {
                debug!("Store {} not found, starting empty", path.display());
                StoreState::default()
            }
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All cache rows, ordered by id
    pub async fn list(&self) -> Vec<StoredResourceCache> {
        let state = self.state.lock().await;
        let mut caches: Vec<_> = state.caches.values().cloned().collect();
        caches.sort_by_key(|c| c.id);
        caches
    }

    async fn persist(&self, state: &StoreState) -> ResfetchResult<()> {
        write_json_atomic(&self.path, state).await
    }
}

#[async_trait]
impl ResourceCacheFactory for FileResourceCacheStore {
    async fn find_or_create_resource_cache(
        &self,
        descriptor: &ResourceCacheDescriptor,
    ) -> ResfetchResult<UsedResourceCache> {
        let key = descriptor.key()?;
        let mut state = self.state.lock().await;

        if let Some(existing) = state.caches.get(&key) {
            return Ok(UsedResourceCache {
                id: existing.id,
                key,
                resource_type: existing.resource_type.clone(),
                version: existing.version.clone(),
            });
        }

        let mut next = state.clone();
        next.next_id += 1;
        let row = StoredResourceCache {
            id: next.next_id,
            resource_type: descriptor.resource_type.clone(),
            version: descriptor.version.clone(),
            created_at: Utc::now(),
            metadata: Vec::new(),
        };
        let cache = UsedResourceCache {
            id: row.id,
            key: key.clone(),
            resource_type: row.resource_type.clone(),
            version: row.version.clone(),
        };
        next.caches.insert(key, row);
        self.persist(&next).await?;
        *state = next;

        debug!(cache_id = cache.id, "Created resource cache");
        Ok(cache)
    }

    async fn update_resource_cache_metadata(
        &self,
        cache: &UsedResourceCache,
        metadata: &[MetadataField],
    ) -> ResfetchResult<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let row = next
            .find_by_id_mut(cache.id)
            .ok_or(ResfetchError::ResourceCacheNotFound(cache.id))?;
        row.metadata = metadata.to_vec();
        self.persist(&next).await?;
        *state = next;
        Ok(())
    }

    async fn resource_cache_metadata(
        &self,
        cache: &UsedResourceCache,
    ) -> ResfetchResult<Vec<MetadataField>> {
        let state = self.state.lock().await;
        Ok(state
            .caches
            .values()
            .find(|c| c.id == cache.id)
            .map(|c| c.metadata.clone())
            .unwrap_or_default())
    }
}
