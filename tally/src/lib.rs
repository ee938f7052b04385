//! Hierarchical time-bucketed counters backed by Redis.
//!
//! A [`TimedCounter`] records increments for an application-defined key at
//! minute, hour, day, month and year granularity plus an all-time total, and
//! answers point and range queries at any of those granularities. Keys can be
//! hierarchical: incrementing `clicks/User#1` also increments `clicks`.
//!
//! All state lives in Redis; the counter itself holds no mutable state and
//! can be shared freely between tasks. Every increment for one key fragment
//! is applied as a single atomic batch, so readers never observe a partially
//! updated set of buckets.

#![warn(missing_docs)]

mod config;
mod counter;
mod key;
mod range;
mod scope;
mod time;

pub use self::config::*;
pub use self::counter::*;
pub use self::key::*;
pub use self::scope::*;
pub use self::time::*;
