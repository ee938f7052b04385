use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// A bucket timestamp of the fixed format `YYYYMMDDHHmm`.
///
/// The instant is converted into the configured timezone and truncated to
/// minute precision (seconds are discarded, never rounded). Because the
/// format is fixed-width and zero-padded, lexicographic order of bucket
/// timestamps and of every prefix sliced from them coincides with
/// chronological order.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct BucketTimestamp(String);

impl BucketTimestamp {
    /// Normalizes an instant into a bucket timestamp in the given timezone.
    pub fn new(instant: DateTime<Utc>, timezone: Tz) -> Self {
        Self(
            instant
                .with_timezone(&timezone)
                .format("%Y%m%d%H%M")
                .to_string(),
        )
    }

    /// Returns the full `YYYYMMDDHHmm` string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
