//! Resource cache identity
//!
//! A resource cache is the worker-independent identity of "the fetched bits
//! of this resource at this version". Volumes on different workers that hold
//! the same bits are joined through it.

use crate::atc::{MetadataField, Params, Source, Version, VersionedResourceTypes};
use crate::error::ResfetchResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Everything that determines the content of a fetched resource
///
/// Params are part of the key: get params can change what is fetched, so
/// fetches of one version with different params get separate caches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceCacheDescriptor {
    pub resource_type: String,
    pub source: Source,
    pub params: Params,
    pub version: Version,
    pub resource_types: VersionedResourceTypes,
}

impl ResourceCacheDescriptor {
    /// Content-addressed key: SHA256 over the canonical JSON form
    ///
    /// All maps are ordered, so equal descriptors always serialize to the
    /// same bytes.
    pub fn key(&self) -> ResfetchResult<String> {
        let canonical = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        Ok(hex::encode(hasher.finalize()))
    }
}

/// A persisted resource cache row that is in use
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsedResourceCache {
    pub id: i64,
    pub key: String,
    pub resource_type: String,
    pub version: Version,
}

impl UsedResourceCache {
    pub fn id(&self) -> i64 {
        self.id
    }
}

/// Metadata-store operations the fetch path depends on
#[async_trait]
pub trait ResourceCacheFactory: Send + Sync {
    /// Find the cache row for a descriptor, creating it if missing
    ///
    /// Equal descriptors always resolve to the same row.
    async fn find_or_create_resource_cache(
        &self,
        descriptor: &ResourceCacheDescriptor,
    ) -> ResfetchResult<UsedResourceCache>;

    /// Overwrite the metadata recorded for a cache
    async fn update_resource_cache_metadata(
        &self,
        cache: &UsedResourceCache,
        metadata: &[MetadataField],
    ) -> ResfetchResult<()>;

    /// Metadata recorded for a cache, empty if none was stored yet
    async fn resource_cache_metadata(
        &self,
        cache: &UsedResourceCache,
    ) -> ResfetchResult<Vec<MetadataField>>;
}
