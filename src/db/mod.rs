//! Metadata-store collaborator
//!
//! Container ownership keys, resource cache identity, and a file-backed
//! store implementing the cache operations the fetch path calls.

pub mod owner;
pub mod resource_cache;
pub mod store;

pub use owner::{ContainerMetadata, ContainerOwner, ContainerType};
pub use resource_cache::{ResourceCacheDescriptor, ResourceCacheFactory, UsedResourceCache};
pub use store::{FileResourceCacheStore, StoredResourceCache};
