//! Dove Cache - dependency-aware read cache for protocol state
//!
//! The generic machinery (registry, dependency graph, generations,
//! subscriptions) lives in [`cache`]. The protocol's cache types live in
//! [`caches`].

pub mod cache;
pub mod caches;

pub use cache::{
    fan_out, CacheEvent, CacheRegistry, CacheType, CacheValue, CacheView, Dependency,
    DependencyGraph, EntrySnapshot, EntryStatus, FanOut, FetchContext, Generation,
    RegistryBuilder, RegistryConfig, ScopeKey, Snapshot, Stamp, Subscription,
};
pub use caches::register_defaults;
