//! Pooled Redis abstraction used by the Tally counters.
//!
//! This crate wraps [`deadpool_redis`] so that the rest of the workspace can
//! talk to a single Redis instance or a Redis cluster through one connection
//! type. Commands and pipelines are built with the re-exported [`redis`]
//! crate and executed against a [`RedisConnection`] checked out from a
//! [`RedisPool`].
#![warn(missing_docs)]

mod client;
mod config;

pub use self::client::*;
pub use self::config::*;

pub use deadpool_redis::redis;
