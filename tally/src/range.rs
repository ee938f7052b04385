use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

use crate::scope::Scope;
use crate::time::BucketTimestamp;

/// A planned batched range query over one fragment.
///
/// Every step's timestamp is split into the scope's bucket suffix and field,
/// and the fields are grouped by bucket. The `BTreeMap` iterates buckets in
/// lexicographic order, and within a bucket fields keep step order. Since
/// bucket suffixes are fixed-width zero-padded date prefixes, lexicographic
/// bucket order is chronological order, so concatenating the per-bucket
/// result rows in iteration order yields values in request order. Results
/// must be reassembled exactly this way, not re-sorted per step.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct RangePlan {
    /// Hash fields to fetch, grouped by bucket suffix.
    pub groups: BTreeMap<String, Vec<String>>,
    /// Total number of steps, equal to the summed group sizes.
    pub steps: usize,
}

impl RangePlan {
    /// Plans a range query of `count` steps of `step_seconds` each, starting
    /// at `start`.
    pub fn new(
        scope: Scope,
        start: DateTime<Utc>,
        count: usize,
        step_seconds: u64,
        timezone: Tz,
    ) -> Self {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for step in 0..count {
            let instant = start + Duration::seconds(step_seconds as i64 * step as i64);
            let ts = BucketTimestamp::new(instant, timezone);
            let (bucket, field) = scope.split(&ts);
            groups
                .entry(bucket.to_owned())
                .or_default()
                .push(field.to_owned());
        }

        Self {
            groups,
            steps: count,
        }
    }
}
