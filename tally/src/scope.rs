use crate::time::BucketTimestamp;

/// A time granularity at which counts are aggregated.
///
/// Each scope is stored as one sparse Redis hash per time window inside a
/// fragment's namespace. The hash name and the field within it are both
/// slices of the minute-resolution [`BucketTimestamp`]:
///
/// | Scope    | bucket suffix | field  |
/// |----------|---------------|--------|
/// | `Year`   | `years`       | `YYYY` |
/// | `Month`  | `YYYY`        | `MM`   |
/// | `Day`    | `YYYYMM`      | `DD`   |
/// | `Hour`   | `YYYYMMDD`    | `HH`   |
/// | `Minute` | `YYYYMMDDHH`  | `mm`   |
///
/// The all-time total is a plain scalar counter and not a scope.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Scope {
    /// Yearly buckets.
    Year,
    /// Monthly buckets.
    Month,
    /// Daily buckets.
    Day,
    /// Hourly buckets.
    Hour,
    /// Minute buckets.
    Minute,
}

impl Scope {
    /// All scopes, coarsest first.
    pub const ALL: [Scope; 5] = [
        Scope::Year,
        Scope::Month,
        Scope::Day,
        Scope::Hour,
        Scope::Minute,
    ];

    /// The natural range-query step of this scope in seconds.
    ///
    /// Years and months have no fixed length, so range queries over those
    /// scopes must pass an explicit step.
    pub const fn step_seconds(self) -> Option<u64> {
        match self {
            Scope::Year | Scope::Month => None,
            Scope::Day => Some(86_400),
            Scope::Hour => Some(3_600),
            Scope::Minute => Some(60),
        }
    }

    /// Splits a bucket timestamp into this scope's (bucket suffix, field)
    /// pair.
    pub fn split(self, ts: &BucketTimestamp) -> (&str, &str) {
        let s = ts.as_str();
        match self {
            Scope::Year => ("years", &s[0..4]),
            Scope::Month => (&s[0..4], &s[4..6]),
            Scope::Day => (&s[0..6], &s[6..8]),
            Scope::Hour => (&s[0..8], &s[8..10]),
            Scope::Minute => (&s[0..10], &s[10..12]),
        }
    }
}
