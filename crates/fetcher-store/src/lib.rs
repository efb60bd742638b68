//! Cache store adapters implementing [`CacheStorePort`].
//!
//! - [`MemoryCacheStore`] - volatile tier, optionally bounded, LRU eviction
//! - [`DiskCacheStore`] - durable tier with atomic writes and JSON sidecars
//! - [`TieredCacheStore`] - memory in front of disk, promoting disk hits
//!
//! [`CacheStorePort`]: fetcher_core::CacheStorePort

mod disk;
mod memory;
mod tiered;

pub use disk::DiskCacheStore;
pub use memory::MemoryCacheStore;
pub use tiered::TieredCacheStore;
