//! Notification Module
//!
//! Set and delete events, callback types and synchronous dispatch.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::{CacheKey, EntryKey, GroupKey};
use crate::error::{CacheError, Result};

/// Callback invoked after a computation runs, before its result is stored.
pub type SetCallback = Arc<dyn Fn(&SetEvent<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Callback invoked when entries are deleted.
pub type DeleteCallback = Arc<dyn Fn(&DeleteEvent<'_>) -> anyhow::Result<()> + Send + Sync>;

// == Set Event ==
/// Payload delivered to a set callback.
pub struct SetEvent<'a> {
    pub event_name: &'a str,
    pub key: &'a CacheKey,
    pub value: &'a (dyn Any + Send + Sync),
    /// Requested TTL, zero when none
    pub ttl: Duration,
    pub no_freeze: bool,
}

impl SetEvent<'_> {
    /// The computed value, if it is a `T`.
    pub fn value_as<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

// == Delete Event ==
/// Payload delivered to a delete callback.
#[derive(Debug)]
pub struct DeleteEvent<'a> {
    pub event_name: &'a str,
    pub key1: &'a GroupKey,
    /// The targeted entry, or `None` when the whole group was removed
    pub key2: Option<EntryKey>,
}

/// Wraps a closure as a [`SetCallback`].
pub fn on_set<F>(f: F) -> SetCallback
where
    F: Fn(&SetEvent<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wraps a closure as a [`DeleteCallback`].
pub fn on_delete<F>(f: F) -> DeleteCallback
where
    F: Fn(&DeleteEvent<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

// == Dispatch ==
pub(crate) fn dispatch_set(callback: &SetCallback, event: &SetEvent<'_>) -> Result<()> {
    debug!(event = event.event_name, key = %event.key, "Dispatching set event");
    callback(event).map_err(CacheError::Callback)
}

pub(crate) fn dispatch_delete(callback: &DeleteCallback, event: &DeleteEvent<'_>) -> Result<()> {
    debug!(
        event = event.event_name,
        key1 = %event.key1,
        key2 = ?event.key2,
        "Dispatching delete event"
    );
    callback(event).map_err(CacheError::Callback)
}
