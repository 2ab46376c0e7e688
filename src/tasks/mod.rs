//! Background Tasks Module
//!
//! Contains the timer tasks that run alongside the cache.
//!
//! # Tasks
//! - Group expiry: removes a whole group once its TTL elapses

mod expiry;

pub use expiry::ExpiryManager;
