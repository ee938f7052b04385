use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::scope::Scope;

const fn default_true() -> bool {
    true
}

/// Independent toggles for the time-bucket scopes.
///
/// A disabled scope's bucket is not written on increment, so point and range
/// queries at that scope read 0. The all-time total is always maintained.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Granularities {
    /// Maintain yearly buckets.
    #[serde(default = "default_true")]
    pub years: bool,
    /// Maintain monthly buckets.
    #[serde(default = "default_true")]
    pub months: bool,
    /// Maintain daily buckets.
    #[serde(default = "default_true")]
    pub days: bool,
    /// Maintain hourly buckets.
    #[serde(default = "default_true")]
    pub hours: bool,
    /// Maintain minute buckets.
    #[serde(default = "default_true")]
    pub minutes: bool,
}

impl Granularities {
    /// Returns `true` if the given scope is enabled.
    pub fn contains(&self, scope: Scope) -> bool {
        match scope {
            Scope::Year => self.years,
            Scope::Month => self.months,
            Scope::Day => self.days,
            Scope::Hour => self.hours,
            Scope::Minute => self.minutes,
        }
    }
}

impl Default for Granularities {
    fn default() -> Self {
        Self {
            years: true,
            months: true,
            days: true,
            hours: true,
            minutes: true,
        }
    }
}

/// Optional time-based eviction of fine-grained buckets.
///
/// Disabled by default: without retention every bucket is kept forever. When
/// a TTL is configured for a scope, it is applied to a bucket hash the first
/// time that hash is created, using the same newly-created signal as fragment
/// registration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Retention {
    /// TTL in seconds for hour buckets.
    #[serde(default)]
    pub hours: Option<u64>,
    /// TTL in seconds for minute buckets.
    #[serde(default)]
    pub minutes: Option<u64>,
}

impl Retention {
    /// Returns `true` if no TTL is configured for any scope.
    pub fn is_disabled(&self) -> bool {
        self.hours.is_none() && self.minutes.is_none()
    }

    /// Returns the TTL configured for the given scope, if any.
    ///
    /// The value is returned as seconds ready to pass to a Redis `EXPIRE`,
    /// saturating at `i64::MAX` if the configured value exceeds its range.
    pub fn ttl(&self, scope: Scope) -> Option<i64> {
        let seconds = match scope {
            Scope::Hour => self.hours,
            Scope::Minute => self.minutes,
            _ => None,
        }?;
        Some(i64::try_from(seconds).unwrap_or(i64::MAX))
    }
}

fn default_key_prefix() -> String {
    "tc".to_owned()
}

fn default_timezone() -> Tz {
    Tz::UTC
}

/// Configuration for a [`TimedCounter`](crate::TimedCounter).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CounterConfig {
    /// Prefix of every Redis key written by the counter.
    ///
    /// A fragment's storage lives under `{key_prefix}:{fragment}:`.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Timezone in which bucket timestamps are computed.
    #[serde(default = "default_timezone")]
    pub timezone: Tz,

    /// Which scopes to maintain on increment.
    #[serde(default)]
    pub granularities: Granularities,

    /// Optional eviction of fine-grained buckets.
    #[serde(default)]
    pub retention: Retention,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            timezone: default_timezone(),
            granularities: Granularities::default(),
            retention: Retention::default(),
        }
    }
}
