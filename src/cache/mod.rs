//! Cache Module
//!
//! Key derivation, nested entry storage and statistics for memoized results.

mod entry;
mod keys;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::{CacheEntry, Cached};
pub use keys::{
    canonical_string, ByValue, CacheIdentifier, CacheKey, ContentHasher, EntryKey,
    FxContentHasher, GroupKey, KeyDeriver,
};
pub use stats::CacheStats;
pub use store::CacheStore;

// == Public Constants ==
/// Event name reported to set callbacks unless configured otherwise
pub const DEFAULT_SET_EVENT: &str = "function_cache_set";

/// Event name reported to delete callbacks unless configured otherwise
pub const DEFAULT_DELETE_EVENT: &str = "function_cache_delete";
