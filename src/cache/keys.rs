//! Cache Key Module
//!
//! Derives two-part cache keys from computations, argument lists and
//! deletion identifiers.

use std::fmt;
use std::hash::Hasher;
use std::sync::Arc;

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::computation::Computation;

// == Content Hasher ==
/// Maps a string to a fixed-size fingerprint.
///
/// Implementations must be deterministic across calls and processes. They do
/// not need to be cryptographically secure.
pub trait ContentHasher: Send + Sync {
    fn fingerprint(&self, input: &str) -> u64;
}

/// Default hasher backed by `FxHasher`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FxContentHasher;

impl ContentHasher for FxContentHasher {
    fn fingerprint(&self, input: &str) -> u64 {
        let mut hasher = FxHasher::default();
        hasher.write(input.as_bytes());
        hasher.write_usize(input.len());
        hasher.finish()
    }
}

// == Canonical Stringify ==
/// Serializes a value into a stable string.
///
/// Object keys are sorted recursively, so two values that differ only in map
/// ordering produce the same output.
pub fn canonical_string<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    let value = serde_json::to_value(value)?;
    let mut out = String::new();
    write_canonical(&value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> serde_json::Result<()> {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (name, field)) in fields.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(name)?);
                out.push(':');
                write_canonical(field, out)?;
            }
            out.push('}');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

/// Normalizes an argument value into an argument list.
///
/// `()`/`null` and empty lists mean "no arguments". Any non-list value is a
/// single-argument list.
fn normalize_args(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Array(items) if items.is_empty() => None,
        list @ Value::Array(_) => Some(list),
        single => Some(Value::Array(vec![single])),
    }
}

// == Group Key ==
/// First-level key: identifies a computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupKey {
    /// Fingerprint of a computation's source text or a serialized identifier
    Fingerprint(u64),
    /// Name supplied directly by the caller
    Name(String),
}

impl From<u64> for GroupKey {
    fn from(value: u64) -> Self {
        GroupKey::Fingerprint(value)
    }
}

impl From<u32> for GroupKey {
    fn from(value: u32) -> Self {
        GroupKey::Fingerprint(u64::from(value))
    }
}

impl From<&str> for GroupKey {
    /// Decimal strings address the fingerprint with that value, matching
    /// keys rendered into event payloads.
    fn from(value: &str) -> Self {
        match value.parse::<u64>() {
            Ok(fingerprint) if !value.starts_with('+') => GroupKey::Fingerprint(fingerprint),
            _ => GroupKey::Name(value.to_string()),
        }
    }
}

impl From<String> for GroupKey {
    fn from(value: String) -> Self {
        GroupKey::from(value.as_str())
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Fingerprint(value) => write!(f, "{}", value),
            GroupKey::Name(name) => f.write_str(name),
        }
    }
}

// == Entry Key ==
/// Second-level key: identifies an argument list within a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKey {
    /// Fingerprint of the canonical argument list
    Fingerprint(u64),
    /// No arguments were given
    Empty,
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKey::Fingerprint(value) => write!(f, "{}", value),
            EntryKey::Empty => f.write_str("empty"),
        }
    }
}

// == Cache Key ==
/// Two-part cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub key1: GroupKey,
    pub key2: EntryKey,
}

impl CacheKey {
    pub fn new(key1: GroupKey, key2: EntryKey) -> Self {
        Self { key1, key2 }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.key1, self.key2)
    }
}

// == Key Deriver ==
/// Combines a content hasher with canonical serialization to build keys.
#[derive(Clone)]
pub struct KeyDeriver {
    hasher: Arc<dyn ContentHasher>,
}

impl KeyDeriver {
    pub fn new(hasher: Arc<dyn ContentHasher>) -> Self {
        Self { hasher }
    }

    pub fn fingerprint(&self, input: &str) -> u64 {
        self.hasher.fingerprint(input)
    }

    /// Group key of a computation, from its source text.
    pub fn source_key(&self, source: &str) -> GroupKey {
        GroupKey::Fingerprint(self.fingerprint(source))
    }

    /// Group key of an arbitrary serializable value.
    pub fn value_key<T: Serialize + ?Sized>(&self, value: &T) -> serde_json::Result<GroupKey> {
        Ok(GroupKey::Fingerprint(
            self.fingerprint(&canonical_string(value)?),
        ))
    }

    /// Entry key of an argument list; `Empty` when there are no arguments.
    pub fn args_key<A: Serialize + ?Sized>(&self, args: &A) -> serde_json::Result<EntryKey> {
        match normalize_args(serde_json::to_value(args)?) {
            Some(list) => Ok(EntryKey::Fingerprint(
                self.fingerprint(&canonical_string(&list)?),
            )),
            None => Ok(EntryKey::Empty),
        }
    }

    // == Derive Computation Key ==
    /// Key for a memoized call of `source` with `args`.
    pub fn computation_key<A: Serialize + ?Sized>(
        &self,
        source: &str,
        args: &A,
    ) -> serde_json::Result<CacheKey> {
        Ok(CacheKey::new(self.source_key(source), self.args_key(args)?))
    }

    // == Derive Lookup Key ==
    /// Key for a delete: the group of `identifier` and, when `args` is given,
    /// the entry for that argument list.
    pub fn lookup_key<I, A>(
        &self,
        identifier: &I,
        args: Option<&A>,
    ) -> serde_json::Result<(GroupKey, Option<EntryKey>)>
    where
        I: CacheIdentifier + ?Sized,
        A: Serialize + ?Sized,
    {
        let key1 = identifier.group_key(self)?;
        let key2 = args.map(|args| self.args_key(args)).transpose()?;
        Ok((key1, key2))
    }
}

impl Default for KeyDeriver {
    fn default() -> Self {
        Self::new(Arc::new(FxContentHasher))
    }
}

impl fmt::Debug for KeyDeriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDeriver").finish_non_exhaustive()
    }
}

// == Cache Identifier ==
/// Anything that names a group of cache entries.
///
/// Strings and integers pass through verbatim, computations are
/// fingerprinted by source text, and [`ByValue`] fingerprints any
/// serializable value.
pub trait CacheIdentifier {
    fn group_key(&self, deriver: &KeyDeriver) -> serde_json::Result<GroupKey>;
}

impl CacheIdentifier for str {
    fn group_key(&self, _deriver: &KeyDeriver) -> serde_json::Result<GroupKey> {
        Ok(GroupKey::from(self))
    }
}

impl CacheIdentifier for String {
    fn group_key(&self, _deriver: &KeyDeriver) -> serde_json::Result<GroupKey> {
        Ok(GroupKey::from(self.as_str()))
    }
}

impl CacheIdentifier for u64 {
    fn group_key(&self, _deriver: &KeyDeriver) -> serde_json::Result<GroupKey> {
        Ok(GroupKey::Fingerprint(*self))
    }
}

impl CacheIdentifier for u32 {
    fn group_key(&self, _deriver: &KeyDeriver) -> serde_json::Result<GroupKey> {
        Ok(GroupKey::Fingerprint(u64::from(*self)))
    }
}

impl CacheIdentifier for GroupKey {
    fn group_key(&self, _deriver: &KeyDeriver) -> serde_json::Result<GroupKey> {
        Ok(self.clone())
    }
}

impl<F> CacheIdentifier for Computation<F> {
    fn group_key(&self, deriver: &KeyDeriver) -> serde_json::Result<GroupKey> {
        Ok(deriver.source_key(self.source()))
    }
}

/// Identifies a group by the fingerprint of a serialized value.
#[derive(Debug, Clone)]
pub struct ByValue<T>(pub T);

impl<T: Serialize> CacheIdentifier for ByValue<T> {
    fn group_key(&self, deriver: &KeyDeriver) -> serde_json::Result<GroupKey> {
        deriver.value_key(&self.0)
    }
}
