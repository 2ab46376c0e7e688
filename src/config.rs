//! Configuration Module
//!
//! Process-wide defaults for a cache instance and per-call options.

use std::env;
use std::fmt;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::cache::{DEFAULT_DELETE_EVENT, DEFAULT_SET_EVENT};
use crate::notify::{DeleteCallback, SetCallback};

// == Cache Config ==
/// Default callbacks and event names of a cache.
///
/// Set once at construction; [`crate::FunctionCache::configure`] changes
/// the defaults for every later call.
#[derive(Clone)]
pub struct CacheConfig {
    /// Callback fired after a miss, before the result is stored
    pub on_set: Option<SetCallback>,
    /// Callback fired on delete
    pub on_delete: Option<DeleteCallback>,
    /// Event name passed to the set callback
    pub set_event_name: String,
    /// Event name passed to the delete callback
    pub delete_event_name: String,
}

impl CacheConfig {
    /// Creates a CacheConfig with event names taken from the environment.
    ///
    /// # Environment Variables
    /// - `FUNCTION_CACHE_SET_EVENT` - Set event name (default: function_cache_set)
    /// - `FUNCTION_CACHE_DELETE_EVENT` - Delete event name (default: function_cache_delete)
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(name) = env::var("FUNCTION_CACHE_SET_EVENT") {
            config.set_set_event_name(name);
        }
        if let Ok(name) = env::var("FUNCTION_CACHE_DELETE_EVENT") {
            config.set_delete_event_name(name);
        }
        config
    }

    // == Apply Update ==
    /// Applies every option present in `update`.
    pub fn apply(&mut self, update: ConfigUpdate) {
        if let Some(callback) = update.on_set {
            self.on_set = Some(callback);
        }
        if let Some(callback) = update.on_delete {
            self.on_delete = Some(callback);
        }
        if let Some(name) = update.set_event_name {
            self.set_set_event_name(name);
        }
        if let Some(name) = update.delete_event_name {
            self.set_delete_event_name(name);
        }
    }

    // == Apply JSON ==
    /// Applies event names from a JSON object.
    ///
    /// Options of the wrong type, unknown options and callbacks (which cannot
    /// be expressed in JSON) are ignored and the previous values kept.
    /// Returns the number of options applied.
    pub fn apply_json(&mut self, options: &Value) -> usize {
        let Some(options) = options.as_object() else {
            warn!("Ignoring cache configuration: expected a JSON object");
            return 0;
        };

        let mut applied = 0;
        for (name, value) in options {
            let accepted = match (name.as_str(), value.as_str()) {
                ("set_event_name", Some(event)) => self.set_set_event_name(event.to_string()),
                ("delete_event_name", Some(event)) => {
                    self.set_delete_event_name(event.to_string())
                }
                ("set_event_name" | "delete_event_name", None) => {
                    warn!(option = %name, "Ignoring cache option: expected a string");
                    false
                }
                _ => {
                    warn!(option = %name, "Ignoring unknown cache option");
                    false
                }
            };
            if accepted {
                applied += 1;
            }
        }
        applied
    }

    fn set_set_event_name(&mut self, name: String) -> bool {
        if name.is_empty() {
            warn!("Ignoring empty set event name");
            return false;
        }
        self.set_event_name = name;
        true
    }

    fn set_delete_event_name(&mut self, name: String) -> bool {
        if name.is_empty() {
            warn!("Ignoring empty delete event name");
            return false;
        }
        self.delete_event_name = name;
        true
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            on_set: None,
            on_delete: None,
            set_event_name: DEFAULT_SET_EVENT.to_string(),
            delete_event_name: DEFAULT_DELETE_EVENT.to_string(),
        }
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("on_set", &self.on_set.is_some())
            .field("on_delete", &self.on_delete.is_some())
            .field("set_event_name", &self.set_event_name)
            .field("delete_event_name", &self.delete_event_name)
            .finish()
    }
}

// == Config Update ==
/// A partial change to a [`CacheConfig`]; absent options are left alone.
#[derive(Clone, Default)]
pub struct ConfigUpdate {
    pub on_set: Option<SetCallback>,
    pub on_delete: Option<DeleteCallback>,
    pub set_event_name: Option<String>,
    pub delete_event_name: Option<String>,
}

impl ConfigUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_set(mut self, callback: SetCallback) -> Self {
        self.on_set = Some(callback);
        self
    }

    pub fn on_delete(mut self, callback: DeleteCallback) -> Self {
        self.on_delete = Some(callback);
        self
    }

    pub fn set_event_name(mut self, name: impl Into<String>) -> Self {
        self.set_event_name = Some(name.into());
        self
    }

    pub fn delete_event_name(mut self, name: impl Into<String>) -> Self {
        self.delete_event_name = Some(name.into());
        self
    }
}

// == Get Options ==
/// Options for a single memoized call.
#[derive(Clone, Default)]
pub struct GetOptions {
    /// Group TTL; only the first TTL stored into a group schedules expiry
    pub ttl: Option<Duration>,
    /// Store the result as a live, mutable value instead of freezing it
    pub no_freeze: bool,
    /// Set callback for this call only, replacing the configured default
    pub on_set: Option<SetCallback>,
}

impl GetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_no_freeze(mut self) -> Self {
        self.no_freeze = true;
        self
    }

    pub fn with_on_set(mut self, callback: SetCallback) -> Self {
        self.on_set = Some(callback);
        self
    }

    /// The TTL if it is positive.
    pub(crate) fn effective_ttl(&self) -> Option<Duration> {
        self.ttl.filter(|ttl| !ttl.is_zero())
    }
}

// == Delete Options ==
/// Options for a single delete.
#[derive(Clone, Default)]
pub struct DeleteOptions {
    /// Drop the timer bookkeeping without cancelling it and skip the group
    /// delete notification; used by expiry itself
    pub skip_timer_clear: bool,
    /// Delete callback for this call only, replacing the configured default
    pub on_delete: Option<DeleteCallback>,
}

impl DeleteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_skip_timer_clear(mut self) -> Self {
        self.skip_timer_clear = true;
        self
    }

    pub fn with_on_delete(mut self, callback: DeleteCallback) -> Self {
        self.on_delete = Some(callback);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::on_set;
    use serde_json::json;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert!(config.on_set.is_none());
        assert!(config.on_delete.is_none());
        assert_eq!(config.set_event_name, "function_cache_set");
        assert_eq!(config.delete_event_name, "function_cache_delete");
    }

    #[test]
    fn test_config_from_env() {
        env::set_var("FUNCTION_CACHE_SET_EVENT", "memo_set");
        env::remove_var("FUNCTION_CACHE_DELETE_EVENT");

        let config = CacheConfig::from_env();
        assert_eq!(config.set_event_name, "memo_set");
        assert_eq!(config.delete_event_name, "function_cache_delete");

        env::remove_var("FUNCTION_CACHE_SET_EVENT");
    }

    #[test]
    fn test_apply_update() {
        let mut config = CacheConfig::default();
        config.apply(
            ConfigUpdate::new()
                .on_set(on_set(|_| Ok(())))
                .delete_event_name("gone"),
        );

        assert!(config.on_set.is_some());
        assert!(config.on_delete.is_none());
        assert_eq!(config.set_event_name, "function_cache_set");
        assert_eq!(config.delete_event_name, "gone");
    }

    #[test]
    fn test_apply_update_ignores_empty_name() {
        let mut config = CacheConfig::default();
        config.apply(ConfigUpdate::new().set_event_name(""));
        assert_eq!(config.set_event_name, "function_cache_set");
    }

    #[test]
    fn test_apply_json_ignores_invalid_options() {
        let mut config = CacheConfig::default();
        let applied = config.apply_json(&json!({
            "set_event_name": "stored",
            "delete_event_name": 42,
            "set_callback": "not a function",
            "unknown": true,
        }));

        assert_eq!(applied, 1);
        assert_eq!(config.set_event_name, "stored");
        assert_eq!(config.delete_event_name, "function_cache_delete");
        assert!(config.on_set.is_none());
    }

    #[test]
    fn test_apply_json_non_object() {
        let mut config = CacheConfig::default();
        assert_eq!(config.apply_json(&json!(["set_event_name"])), 0);
        assert_eq!(config.set_event_name, "function_cache_set");
    }

    #[test]
    fn test_get_options_effective_ttl() {
        assert_eq!(GetOptions::new().effective_ttl(), None);
        assert_eq!(
            GetOptions::new().with_ttl(Duration::ZERO).effective_ttl(),
            None
        );
        assert_eq!(
            GetOptions::new()
                .with_ttl(Duration::from_millis(50))
                .effective_ttl(),
            Some(Duration::from_millis(50))
        );
    }
}
