use chrono::{DateTime, Utc};
use smallvec::SmallVec;
use tally_redis::redis::{self, FromRedisValue};
use tally_redis::{RedisConnection, RedisError, RedisPool};
use thiserror::Error;

use crate::config::CounterConfig;
use crate::key::{CounterKey, Fragment, Fragments};
use crate::range::RangePlan;
use crate::scope::Scope;
use crate::time::BucketTimestamp;

/// Key suffix of the scalar all-time total.
const TOTAL_SUFFIX: &str = "total";

/// An error returned by [`TimedCounter`] operations.
#[derive(Debug, Error)]
pub enum CounterError {
    /// Failed to communicate with Redis.
    ///
    /// The underlying store error is surfaced unchanged; the counter never
    /// retries internally.
    #[error("failed to communicate with redis")]
    Redis(
        #[from]
        #[source]
        RedisError,
    ),

    /// The counter key has no parts and cannot derive a fragment.
    #[error("counter key is empty")]
    EmptyKey,
}

/// Result type for counter operations.
pub type Result<T, E = CounterError> = std::result::Result<T, E>;

/// The discovery set of all fragments ever incremented.
///
/// A fragment registers itself the first time its total transitions from
/// absent to present, detected by comparing the post-increment total of the
/// atomic batch against the increment amount itself. This is a heuristic
/// rather than an existence check: a total that was driven back to zero and
/// then incremented by the same amount registers again (harmless, `SADD` is
/// idempotent), and a first increment racing other writers in the same batch
/// window cannot misfire because the comparison uses the batch's own result.
///
/// The registry is explicit state passed to the counter, not a process-wide
/// global, so tests and tenants can isolate their discovery sets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registry {
    set: String,
}

impl Registry {
    /// Creates a registry stored in the Redis set with the given name.
    pub fn new(set: impl Into<String>) -> Self {
        Self { set: set.into() }
    }

    /// Returns the name of the backing Redis set.
    pub fn set_name(&self) -> &str {
        &self.set
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new("tc:counters")
    }
}

/// A counter value read back from Redis.
///
/// Reads are lenient: a missing key, a missing hash field, and a stored
/// value that does not parse as an integer all coerce to 0. The sparse
/// storage model makes absence the common case; a non-numeric value means
/// external tampering and is logged rather than failing the whole read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Count(i64);

impl FromRedisValue for Count {
    fn from_redis_value(v: &redis::Value) -> redis::RedisResult<Self> {
        if matches!(v, redis::Value::Nil) {
            return Ok(Self(0));
        }

        match i64::from_redis_value(v) {
            Ok(value) => Ok(Self(value)),
            Err(_) => {
                tracing::warn!(value = ?v, "non-numeric counter value in redis, reading as 0");
                Ok(Self(0))
            }
        }
    }
}

/// Hierarchical time-bucketed counters on Redis.
///
/// Each key fragment owns a namespace `{key_prefix}:{fragment}:` holding a
/// scalar total plus one sparse hash per [`Scope`] time window. An increment
/// updates the total and every enabled scope bucket in a single `MULTI`/
/// `EXEC` batch per fragment, so concurrent readers never see a partially
/// updated fragment. Increments to a hierarchical key cascade to all
/// ancestor fragments as independent atomic batches.
///
/// The counter holds no mutable state; clones share the underlying pool and
/// can be used concurrently from any number of tasks.
#[derive(Clone, Debug)]
pub struct TimedCounter {
    pool: RedisPool,
    registry: Registry,
    config: CounterConfig,
}

impl TimedCounter {
    /// Creates a new counter on the given pool.
    pub fn new(pool: RedisPool, registry: Registry, config: CounterConfig) -> Self {
        Self {
            pool,
            registry,
            config,
        }
    }

    /// Records `amount` for the key at the given instant.
    ///
    /// Negative amounts are legal and travel the same path; the stored sums
    /// are signed and never clamped. `time` defaults to the current time.
    ///
    /// Returns the post-increment total of the most-specific fragment.
    pub async fn incr(
        &self,
        key: impl Into<CounterKey>,
        amount: i64,
        time: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        let fragments = self.fragments(&key.into())?;
        let ts = self.normalize(time);

        // The (scope, bucket, field) pairs only depend on the timestamp and
        // are shared by every fragment in the cascade.
        let buckets: SmallVec<[(Scope, &str, &str); 5]> = Scope::ALL
            .into_iter()
            .filter(|scope| self.config.granularities.contains(*scope))
            .map(|scope| {
                let (bucket, field) = scope.split(&ts);
                (scope, bucket, field)
            })
            .collect();

        let mut connection = self.pool.connection().await?;

        let mut most_specific_total = 0;
        for (i, fragment) in fragments.iter().enumerate() {
            let total = self
                .incr_fragment(&mut connection, fragment, amount, &buckets)
                .await?;
            if i == 0 {
                most_specific_total = total;
            }
        }

        Ok(most_specific_total)
    }

    /// Applies one fragment's increment batch and follow-up effects.
    async fn incr_fragment(
        &self,
        connection: &mut RedisConnection,
        fragment: &Fragment,
        amount: i64,
        buckets: &[(Scope, &str, &str)],
    ) -> Result<i64> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.incr(self.storage_key(fragment, TOTAL_SUFFIX), amount);
        for (_, bucket, field) in buckets {
            pipe.hincr(self.storage_key(fragment, bucket), *field, amount);
        }

        let results: Vec<i64> = pipe
            .query_async(&mut *connection)
            .await
            .map_err(RedisError::Redis)?;

        let total = results.first().copied().unwrap_or(0);

        // A post-increment value equal to the amount itself signals that the
        // counter did not exist before this batch. Registration happens
        // strictly after the batch, so a reader can observe the new total
        // before the fragment appears in the registry.
        if total == amount {
            redis::cmd("SADD")
                .arg(self.registry.set_name())
                .arg(fragment.as_str())
                .query_async::<()>(&mut *connection)
                .await
                .map_err(RedisError::Redis)?;
        }

        self.apply_retention(connection, fragment, amount, buckets, &results)
            .await?;

        Ok(total)
    }

    /// Expires newly created fine-grained buckets if retention is configured.
    async fn apply_retention(
        &self,
        connection: &mut RedisConnection,
        fragment: &Fragment,
        amount: i64,
        buckets: &[(Scope, &str, &str)],
        results: &[i64],
    ) -> Result<()> {
        let retention = self.config.retention;
        if retention.is_disabled() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        let mut expires = false;

        // results[0] is the total, the remainder aligns with `buckets`.
        for ((scope, bucket, _), value) in buckets.iter().zip(results.iter().skip(1)) {
            if *value != amount {
                continue;
            }
            let Some(ttl) = retention.ttl(*scope) else {
                continue;
            };

            pipe.expire(self.storage_key(fragment, bucket), ttl);
            expires = true;
        }

        if expires {
            pipe.query_async::<()>(&mut *connection)
                .await
                .map_err(RedisError::Redis)?;
        }

        Ok(())
    }

    /// Returns the all-time total for the key's most-specific fragment.
    pub async fn total(&self, key: impl Into<CounterKey>) -> Result<i64> {
        let fragment = self.most_specific(&key.into())?;

        let mut connection = self.pool.connection().await?;
        let Count(total) = redis::cmd("GET")
            .arg(self.storage_key(&fragment, TOTAL_SUFFIX))
            .query_async(&mut connection)
            .await
            .map_err(RedisError::Redis)?;

        Ok(total)
    }

    /// Returns the yearly count for the bucket containing `time`.
    ///
    /// `time` defaults to the current time, as in all point queries.
    pub async fn year(
        &self,
        key: impl Into<CounterKey>,
        time: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        self.read_scope(key.into(), Scope::Year, time).await
    }

    /// Returns the monthly count for the bucket containing `time`.
    pub async fn month(
        &self,
        key: impl Into<CounterKey>,
        time: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        self.read_scope(key.into(), Scope::Month, time).await
    }

    /// Returns the daily count for the bucket containing `time`.
    pub async fn day(
        &self,
        key: impl Into<CounterKey>,
        time: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        self.read_scope(key.into(), Scope::Day, time).await
    }

    /// Returns the hourly count for the bucket containing `time`.
    pub async fn hour(
        &self,
        key: impl Into<CounterKey>,
        time: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        self.read_scope(key.into(), Scope::Hour, time).await
    }

    /// Returns the minute count for the bucket containing `time`.
    pub async fn minute(
        &self,
        key: impl Into<CounterKey>,
        time: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        self.read_scope(key.into(), Scope::Minute, time).await
    }

    /// Reads a single scope bucket for the most-specific fragment.
    ///
    /// Point queries never sum the cascade; only the exact fragment derived
    /// from the full key is read.
    async fn read_scope(
        &self,
        key: CounterKey,
        scope: Scope,
        time: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        let fragment = self.most_specific(&key)?;
        let ts = self.normalize(time);
        let (bucket, field) = scope.split(&ts);

        let mut connection = self.pool.connection().await?;
        let Count(value) = redis::cmd("HGET")
            .arg(self.storage_key(&fragment, bucket))
            .arg(field)
            .query_async(&mut connection)
            .await
            .map_err(RedisError::Redis)?;

        Ok(value)
    }

    /// Returns `count` values at the given scope, one per step of
    /// `step_seconds`, in chronological order starting at `start`.
    ///
    /// All buckets touched by the range are fetched in one pipelined round
    /// trip, one `HMGET` per distinct bucket.
    pub async fn range(
        &self,
        key: impl Into<CounterKey>,
        start: DateTime<Utc>,
        count: usize,
        step_seconds: u64,
        scope: Scope,
    ) -> Result<Vec<i64>> {
        let fragment = self.most_specific(&key.into())?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let plan = RangePlan::new(scope, start, count, step_seconds, self.config.timezone);

        let mut pipe = redis::pipe();
        for (bucket, fields) in &plan.groups {
            pipe.cmd("HMGET")
                .arg(self.storage_key(&fragment, bucket))
                .arg(fields);
        }

        let mut connection = self.pool.connection().await?;
        let rows: Vec<Vec<Count>> = pipe
            .query_async(&mut connection)
            .await
            .map_err(RedisError::Redis)?;

        // The plan iterates buckets in sorted order, which for the
        // fixed-width timestamp prefixes is chronological order, so the
        // concatenated rows already line up with the requested steps.
        let values: Vec<i64> = rows.into_iter().flatten().map(|Count(v)| v).collect();
        debug_assert_eq!(values.len(), plan.steps);

        Ok(values)
    }

    /// Returns `count` daily values starting at `start`.
    pub async fn days(
        &self,
        key: impl Into<CounterKey>,
        start: DateTime<Utc>,
        count: usize,
    ) -> Result<Vec<i64>> {
        let step = Scope::Day.step_seconds().expect("day scope has a fixed step");
        self.range(key, start, count, step, Scope::Day).await
    }

    /// Returns `count` hourly values starting at `start`.
    pub async fn hours(
        &self,
        key: impl Into<CounterKey>,
        start: DateTime<Utc>,
        count: usize,
    ) -> Result<Vec<i64>> {
        let step = Scope::Hour
            .step_seconds()
            .expect("hour scope has a fixed step");
        self.range(key, start, count, step, Scope::Hour).await
    }

    /// Returns `count` minute values starting at `start`.
    pub async fn minutes(
        &self,
        key: impl Into<CounterKey>,
        start: DateTime<Utc>,
        count: usize,
    ) -> Result<Vec<i64>> {
        let step = Scope::Minute
            .step_seconds()
            .expect("minute scope has a fixed step");
        self.range(key, start, count, step, Scope::Minute).await
    }

    /// Deletes all storage of every cascaded fragment of the key, including
    /// every descendant fragment's storage.
    ///
    /// Sweeps each fragment's subtree with `SCAN` cursors and removes the
    /// fragment from the registry, so a later first increment registers it
    /// again. Deletion is not transactional across fragments; this exists
    /// primarily for test isolation.
    pub async fn reset(&self, key: impl Into<CounterKey>) -> Result<()> {
        let fragments = self.fragments(&key.into())?;
        let mut connection = self.pool.connection().await?;

        for fragment in &fragments {
            let namespace = self.namespace(fragment);
            let mut deleted = 0usize;

            // The `:` pattern matches the fragment's own entries, the `/`
            // pattern every descendant fragment's namespace. Both stay
            // anchored so siblings sharing a name prefix (`click` next to
            // `clicks`) are untouched.
            for pattern in [format!("{namespace}:*"), format!("{namespace}/*")] {
                deleted += self.delete_matching(&mut connection, &pattern).await?;
            }

            redis::cmd("SREM")
                .arg(self.registry.set_name())
                .arg(fragment.as_str())
                .query_async::<()>(&mut connection)
                .await
                .map_err(RedisError::Redis)?;

            tracing::debug!(fragment = fragment.as_str(), deleted, "reset counter");
        }

        Ok(())
    }

    /// Deletes every key matching `pattern` with a `SCAN` cursor sweep.
    async fn delete_matching(
        &self,
        connection: &mut RedisConnection,
        pattern: &str,
    ) -> Result<usize> {
        let mut deleted = 0usize;
        let mut cursor: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut *connection)
                .await
                .map_err(RedisError::Redis)?;

            if !keys.is_empty() {
                deleted += keys.len();
                let mut pipe = redis::pipe();
                for redis_key in &keys {
                    pipe.del(redis_key);
                }
                pipe.query_async::<()>(&mut *connection)
                    .await
                    .map_err(RedisError::Redis)?;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(deleted)
    }

    /// The Redis key namespace of a fragment, without trailing separator.
    fn namespace(&self, fragment: &Fragment) -> String {
        format!("{}:{}", self.config.key_prefix, fragment)
    }

    /// The full Redis key for one entry in a fragment's namespace.
    fn storage_key(&self, fragment: &Fragment, suffix: &str) -> String {
        format!("{}:{}:{}", self.config.key_prefix, fragment, suffix)
    }

    /// Derives the cascade, failing fast on empty keys.
    fn fragments(&self, key: &CounterKey) -> Result<Fragments> {
        let fragments = key.fragments();
        if fragments.is_empty() {
            return Err(CounterError::EmptyKey);
        }
        Ok(fragments)
    }

    /// Derives only the most-specific fragment of the key.
    fn most_specific(&self, key: &CounterKey) -> Result<Fragment> {
        key.fragments()
            .into_iter()
            .next()
            .ok_or(CounterError::EmptyKey)
    }

    /// Normalizes an optional instant into a bucket timestamp.
    fn normalize(&self, time: Option<DateTime<Utc>>) -> BucketTimestamp {
        BucketTimestamp::new(time.unwrap_or_else(Utc::now), self.config.timezone)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use tally_redis::RedisConfigOptions;
    use uuid::Uuid;

    use super::*;
    use crate::config::{Granularities, Retention};
    use crate::key::KeyPart;

    fn build_counter(config: CounterConfig) -> TimedCounter {
        let url = std::env::var("TALLY_REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_owned());
        let pool = RedisPool::single(&url, &RedisConfigOptions::default()).unwrap();

        TimedCounter::new(pool, Registry::new("tally-test:counters"), config)
    }

    fn unique_key() -> String {
        format!("test-{}", Uuid::new_v4())
    }

    #[test]
    fn test_storage_key_layout() {
        let counter = build_counter(CounterConfig::default());
        let fragment = CounterKey::from("test").fragments().remove(0);

        assert_eq!(counter.namespace(&fragment), "tc:test");
        assert_eq!(counter.storage_key(&fragment, "total"), "tc:test:total");
        assert_eq!(counter.storage_key(&fragment, "years"), "tc:test:years");
        assert_eq!(
            counter.storage_key(&fragment, "2011031109"),
            "tc:test:2011031109"
        );
    }

    #[tokio::test]
    async fn test_empty_key_fails_fast() {
        let counter = build_counter(CounterConfig::default());
        let key = CounterKey::new([]);

        // The key is rejected before any connection is made.
        let result = counter.incr(key.clone(), 1, None).await;
        assert!(matches!(result, Err(CounterError::EmptyKey)));

        let result = counter.total(key.clone()).await;
        assert!(matches!(result, Err(CounterError::EmptyKey)));

        let result = counter.minutes(key, Utc::now(), 10).await;
        assert!(matches!(result, Err(CounterError::EmptyKey)));
    }

    #[tokio::test]
    #[ignore] // Requires Redis, run explicitly with `cargo test -- --ignored`.
    async fn test_incr_updates_every_scope() {
        let counter = build_counter(CounterConfig::default());
        let key = unique_key();
        let now = Some(Utc::now());

        assert_eq!(counter.total(key.as_str()).await.unwrap(), 0);
        assert_eq!(counter.year(key.as_str(), now).await.unwrap(), 0);
        assert_eq!(counter.month(key.as_str(), now).await.unwrap(), 0);
        assert_eq!(counter.day(key.as_str(), now).await.unwrap(), 0);
        assert_eq!(counter.hour(key.as_str(), now).await.unwrap(), 0);
        assert_eq!(counter.minute(key.as_str(), now).await.unwrap(), 0);

        assert_eq!(counter.incr(key.as_str(), 1, now).await.unwrap(), 1);
        assert_eq!(counter.total(key.as_str()).await.unwrap(), 1);
        assert_eq!(counter.year(key.as_str(), now).await.unwrap(), 1);
        assert_eq!(counter.month(key.as_str(), now).await.unwrap(), 1);
        assert_eq!(counter.day(key.as_str(), now).await.unwrap(), 1);
        assert_eq!(counter.hour(key.as_str(), now).await.unwrap(), 1);
        assert_eq!(counter.minute(key.as_str(), now).await.unwrap(), 1);

        assert_eq!(counter.incr(key.as_str(), 100, now).await.unwrap(), 101);
        assert_eq!(counter.total(key.as_str()).await.unwrap(), 101);
        assert_eq!(counter.minute(key.as_str(), now).await.unwrap(), 101);

        // Negative increments flow through the same batch.
        assert_eq!(counter.incr(key.as_str(), -50, now).await.unwrap(), 51);
        assert_eq!(counter.total(key.as_str()).await.unwrap(), 51);
        assert_eq!(counter.year(key.as_str(), now).await.unwrap(), 51);
        assert_eq!(counter.month(key.as_str(), now).await.unwrap(), 51);
        assert_eq!(counter.day(key.as_str(), now).await.unwrap(), 51);
        assert_eq!(counter.hour(key.as_str(), now).await.unwrap(), 51);
        assert_eq!(counter.minute(key.as_str(), now).await.unwrap(), 51);
    }

    #[tokio::test]
    #[ignore] // Requires Redis, run explicitly with `cargo test -- --ignored`.
    async fn test_cascade_increments_ancestors() {
        let counter = build_counter(CounterConfig::default());
        let parent = unique_key();

        let key = CounterKey::from(vec![
            KeyPart::scalar(parent.clone()),
            KeyPart::identified("User", 1),
        ]);

        assert_eq!(counter.incr(key.clone(), 3, None).await.unwrap(), 3);

        assert_eq!(counter.total(key).await.unwrap(), 3);
        assert_eq!(counter.total(parent.as_str()).await.unwrap(), 3);
    }

    #[tokio::test]
    #[ignore] // Requires Redis, run explicitly with `cargo test -- --ignored`.
    async fn test_queryable_by_minutes() {
        let counter = build_counter(CounterConfig::default());
        let key = unique_key();

        let now = Utc::now();
        let five_ago = now - Duration::seconds(300);
        let ten_ago = now - Duration::seconds(600);

        counter.incr(key.as_str(), 1, Some(five_ago)).await.unwrap();
        counter.incr(key.as_str(), 1, Some(ten_ago)).await.unwrap();

        let minutes = counter.minutes(key.as_str(), ten_ago, 10).await.unwrap();
        assert_eq!(minutes.len(), 10);
        assert_eq!(minutes.iter().sum::<i64>(), 2);
        assert_eq!(minutes[0], 1);
        assert_eq!(minutes[5], 1);
    }

    #[tokio::test]
    #[ignore] // Requires Redis, run explicitly with `cargo test -- --ignored`.
    async fn test_queryable_by_hours() {
        let counter = build_counter(CounterConfig::default());
        let key = unique_key();

        let now = Utc::now();
        let five_ago = now - Duration::seconds(300 * 60);
        let ten_ago = now - Duration::seconds(600 * 60);

        counter.incr(key.as_str(), 1, Some(five_ago)).await.unwrap();
        counter.incr(key.as_str(), 1, Some(ten_ago)).await.unwrap();

        let hours = counter.hours(key.as_str(), ten_ago, 10).await.unwrap();
        assert_eq!(hours.len(), 10);
        assert_eq!(hours.iter().sum::<i64>(), 2);
        assert_eq!(hours[0], 1);
        assert_eq!(hours[5], 1);
    }

    #[tokio::test]
    #[ignore] // Requires Redis, run explicitly with `cargo test -- --ignored`.
    async fn test_queryable_by_days() {
        let counter = build_counter(CounterConfig::default());
        let key = unique_key();

        let now = Utc::now();
        let five_ago = now - Duration::seconds(300 * 60 * 24);
        let ten_ago = now - Duration::seconds(600 * 60 * 24);

        counter.incr(key.as_str(), 1, Some(five_ago)).await.unwrap();
        counter.incr(key.as_str(), 1, Some(ten_ago)).await.unwrap();

        let days = counter.days(key.as_str(), ten_ago, 10).await.unwrap();
        assert_eq!(days.len(), 10);
        assert_eq!(days.iter().sum::<i64>(), 2);
        assert_eq!(days[0], 1);
        assert_eq!(days[5], 1);
    }

    #[tokio::test]
    #[ignore] // Requires Redis, run explicitly with `cargo test -- --ignored`.
    async fn test_disabled_granularities() {
        let config = CounterConfig {
            granularities: Granularities {
                hours: false,
                minutes: false,
                ..Granularities::default()
            },
            ..CounterConfig::default()
        };
        let counter = build_counter(config);
        let key = unique_key();

        let time = Utc.with_ymd_and_hms(2011, 1, 1, 0, 0, 0).unwrap();
        counter.incr(key.as_str(), 1, Some(time)).await.unwrap();

        assert_eq!(counter.minute(key.as_str(), Some(time)).await.unwrap(), 0);
        assert_eq!(counter.minutes(key.as_str(), time, 1).await.unwrap(), [0]);

        assert_eq!(counter.hour(key.as_str(), Some(time)).await.unwrap(), 0);
        assert_eq!(counter.hours(key.as_str(), time, 1).await.unwrap(), [0]);

        assert_eq!(counter.day(key.as_str(), Some(time)).await.unwrap(), 1);
        assert_eq!(counter.days(key.as_str(), time, 1).await.unwrap(), [1]);

        assert_eq!(counter.total(key.as_str()).await.unwrap(), 1);
    }

    #[tokio::test]
    #[ignore] // Requires Redis, run explicitly with `cargo test -- --ignored`.
    async fn test_range_of_zero_steps() {
        let counter = build_counter(CounterConfig::default());
        let key = unique_key();

        let minutes = counter.minutes(key.as_str(), Utc::now(), 0).await.unwrap();
        assert!(minutes.is_empty());
    }

    #[tokio::test]
    #[ignore] // Requires Redis, run explicitly with `cargo test -- --ignored`.
    async fn test_registry_registration() {
        let counter = build_counter(CounterConfig::default());
        let parent = unique_key();

        let key = CounterKey::from(vec![
            KeyPart::scalar(parent.clone()),
            KeyPart::identified("User", 42),
        ]);
        counter.incr(key, 1, None).await.unwrap();

        let mut connection = counter.pool.connection().await.unwrap();
        for member in [format!("{parent}/User#42"), parent] {
            let registered: bool = redis::cmd("SISMEMBER")
                .arg(counter.registry.set_name())
                .arg(&member)
                .query_async(&mut connection)
                .await
                .unwrap();
            assert!(registered, "fragment {member} missing from registry");
        }
    }

    #[tokio::test]
    #[ignore] // Requires Redis, run explicitly with `cargo test -- --ignored`.
    async fn test_reset() {
        let counter = build_counter(CounterConfig::default());
        let key = unique_key();
        let now = Some(Utc::now());

        counter.incr(key.as_str(), 10, now).await.unwrap();
        assert_eq!(counter.total(key.as_str()).await.unwrap(), 10);

        counter.reset(key.as_str()).await.unwrap();

        assert_eq!(counter.total(key.as_str()).await.unwrap(), 0);
        assert_eq!(counter.year(key.as_str(), now).await.unwrap(), 0);
        assert_eq!(counter.month(key.as_str(), now).await.unwrap(), 0);
        assert_eq!(counter.day(key.as_str(), now).await.unwrap(), 0);
        assert_eq!(counter.hour(key.as_str(), now).await.unwrap(), 0);
        assert_eq!(counter.minute(key.as_str(), now).await.unwrap(), 0);

        let mut connection = counter.pool.connection().await.unwrap();
        let registered: bool = redis::cmd("SISMEMBER")
            .arg(counter.registry.set_name())
            .arg(key.as_str())
            .query_async(&mut connection)
            .await
            .unwrap();
        assert!(!registered);

        // Resetting an already clean key is a no-op.
        counter.reset(key.as_str()).await.unwrap();
        assert_eq!(counter.total(key.as_str()).await.unwrap(), 0);
    }

    #[tokio::test]
    #[ignore] // Requires Redis, run explicitly with `cargo test -- --ignored`.
    async fn test_reset_deletes_descendants() {
        let counter = build_counter(CounterConfig::default());
        let parent = unique_key();
        let sibling = format!("{parent}x");

        let child = CounterKey::from(vec![
            KeyPart::scalar(parent.clone()),
            KeyPart::identified("User", 7),
        ]);
        counter.incr(child.clone(), 5, None).await.unwrap();
        counter.incr(sibling.as_str(), 2, None).await.unwrap();

        assert_eq!(counter.total(child.clone()).await.unwrap(), 5);
        assert_eq!(counter.total(parent.as_str()).await.unwrap(), 5);

        // Resetting the parent wipes its whole subtree, but a sibling whose
        // name merely starts with the parent's stays intact.
        counter.reset(parent.as_str()).await.unwrap();

        assert_eq!(counter.total(parent.as_str()).await.unwrap(), 0);
        assert_eq!(counter.total(child).await.unwrap(), 0);
        assert_eq!(counter.total(sibling.as_str()).await.unwrap(), 2);
    }

    #[tokio::test]
    #[ignore] // Requires Redis, run explicitly with `cargo test -- --ignored`.
    async fn test_retention_expires_new_buckets() {
        let config = CounterConfig {
            retention: Retention {
                hours: Some(86_400 * 180),
                minutes: Some(86_400 * 30),
            },
            ..CounterConfig::default()
        };
        let counter = build_counter(config);
        let key = unique_key();

        let time = Utc.with_ymd_and_hms(2011, 1, 1, 12, 30, 0).unwrap();
        counter.incr(key.as_str(), 1, Some(time)).await.unwrap();

        let fragment = CounterKey::from(key.as_str()).fragments().remove(0);
        let mut connection = counter.pool.connection().await.unwrap();

        let minute_ttl: i64 = redis::cmd("TTL")
            .arg(counter.storage_key(&fragment, "2011010112"))
            .query_async(&mut connection)
            .await
            .unwrap();
        assert!(minute_ttl > 0);

        let hour_ttl: i64 = redis::cmd("TTL")
            .arg(counter.storage_key(&fragment, "20110101"))
            .query_async(&mut connection)
            .await
            .unwrap();
        assert!(hour_ttl > 0);

        // Coarse buckets are never expired.
        let day_ttl: i64 = redis::cmd("TTL")
            .arg(counter.storage_key(&fragment, "201101"))
            .query_async(&mut connection)
            .await
            .unwrap();
        assert_eq!(day_ttl, -1);
    }

    #[tokio::test]
    #[ignore] // Requires Redis, run explicitly with `cargo test -- --ignored`.
    async fn test_timezone_changes_buckets() {
        let cet = CounterConfig {
            timezone: chrono_tz::Tz::CET,
            ..CounterConfig::default()
        };
        let counter_utc = build_counter(CounterConfig::default());
        let counter_cet = build_counter(cet);
        let key = unique_key();

        // 23:30 UTC is already the next day in CET, so the two counters
        // write into different day buckets.
        let time = Utc.with_ymd_and_hms(2011, 3, 11, 23, 30, 0).unwrap();
        counter_utc.incr(key.as_str(), 1, Some(time)).await.unwrap();

        assert_eq!(counter_utc.day(key.as_str(), Some(time)).await.unwrap(), 1);
        assert_eq!(counter_cet.day(key.as_str(), Some(time)).await.unwrap(), 0);
    }
}
