//! Function Cache - An in-process memoization layer
//!
//! Caches the results of computations keyed by their source text and
//! argument list, with optional group-level TTL expiry and set/delete
//! notifications.

pub mod cache;
pub mod computation;
pub mod config;
pub mod error;
pub mod function_cache;
pub mod notify;
pub mod tasks;

pub use cache::{
    ByValue, CacheEntry, CacheIdentifier, CacheKey, CacheStats, Cached, ContentHasher, EntryKey,
    FxContentHasher, GroupKey, KeyDeriver,
};
pub use computation::Computation;
pub use config::{CacheConfig, ConfigUpdate, DeleteOptions, GetOptions};
pub use error::{CacheError, Result};
pub use function_cache::FunctionCache;
pub use notify::{on_delete, on_set, DeleteCallback, DeleteEvent, SetCallback, SetEvent};
