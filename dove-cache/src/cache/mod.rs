//! Dependency-aware read cache.
//!
//! Every piece of remote state the client shows goes through this module.
//! Entries are stamped with the generation of their type at fetch time and
//! with the stamps of the dependencies they were built from, so staleness is
//! explicit and checked on every read.
//!
//! # Example
//!
//! ```ignore
//! let registry = CacheRegistry::builder(accessor)
//!     .register(WorldCache)
//!     .register(VaultCache)
//!     .build()?;
//!
//! // One-shot read
//! let world = registry.resolve::<WorldCache>().await?;
//!
//! // Live view that refetches after invalidation
//! let mut vault = registry.subscribe::<VaultCache>()?;
//! let view = vault.settled().await?;
//!
//! // After a confirmed write
//! registry.invalidate(&[VaultCache::ID]);
//! ```

pub mod entry;
pub mod fanout;
pub mod generation;
pub mod graph;
pub mod registry;
pub mod scope_key;
pub mod snapshot;
pub mod subscription;
pub mod traits;

pub use entry::{EntrySnapshot, EntryStatus};
pub use fanout::{fan_out, FanOut};
pub use generation::{EpochTable, Generation, Stamp};
pub use graph::DependencyGraph;
pub use registry::{CacheEvent, CacheRegistry, RegistryBuilder, RegistryConfig};
pub use scope_key::ScopeKey;
pub use snapshot::Snapshot;
pub use subscription::{CacheView, Subscription};
pub use traits::{CacheType, CacheValue, Dependency, FetchContext, ResolvedDeps};
