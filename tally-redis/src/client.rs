use std::fmt;
use std::time::Duration;

use deadpool::managed::{BuildError, PoolError};
use deadpool_redis::cluster::{
    Config as ClusterConfig, Connection as ClusterConnection, Pool as ClusterPool,
};
use deadpool_redis::redis::{Cmd, Pipeline, RedisFuture, Value};
use deadpool_redis::{
    Config as SingleConfig, ConfigError, Connection as SingleConnection, Pool as SinglePool,
    Runtime,
};
use thiserror::Error;

use crate::config::{RedisConfig, RedisConfigOptions};

/// An error type that represents various failure modes when interacting with Redis.
#[derive(Debug, Error)]
pub enum RedisError {
    /// An error that occurs when parsing the Redis configuration.
    #[error("failed to configure redis: {0}")]
    Configuration(#[from] ConfigError),

    /// An error that occurs when creating the connection pool.
    #[error("failed to create redis pool: {0}")]
    CreatePool(#[from] BuildError),

    /// An error that occurs when checking a connection out of the pool.
    #[error("failed to interact with the redis pool: {0}")]
    Pool(#[source] PoolError<redis::RedisError>),

    /// An error that occurs during communication with Redis.
    #[error("failed to communicate with redis: {0}")]
    Redis(#[source] redis::RedisError),
}

/// Statistics about the state of a [`RedisPool`].
#[derive(Debug)]
pub struct RedisPoolStats {
    /// The number of connections currently managed by the pool.
    pub connections: u32,
    /// The number of idle connections.
    pub idle_connections: u32,
}

/// A connection pool that can manage either a single Redis instance or a Redis cluster.
#[derive(Clone)]
pub enum RedisPool {
    /// Contains a connection pool to a Redis cluster.
    Cluster(ClusterPool),
    /// Contains a connection pool to a single Redis instance.
    Single(SinglePool),
}

impl RedisPool {
    /// Creates a new connection pool for a Redis cluster.
    pub fn cluster<'a>(
        servers: impl IntoIterator<Item = &'a str>,
        opts: &RedisConfigOptions,
    ) -> Result<Self, RedisError> {
        let servers = servers
            .into_iter()
            .map(|s| s.to_owned())
            .collect::<Vec<_>>();

        let mut builder = ClusterConfig::from_urls(servers)
            .builder()?
            .max_size(opts.max_connections as usize)
            .runtime(Runtime::Tokio1);
        if let Some(secs) = opts.wait_timeout {
            builder = builder.wait_timeout(Some(Duration::from_secs(secs)));
        }

        Ok(RedisPool::Cluster(builder.build()?))
    }

    /// Creates a new connection pool for a single Redis instance.
    pub fn single(server: &str, opts: &RedisConfigOptions) -> Result<Self, RedisError> {
        let mut builder = SingleConfig::from_url(server)
            .builder()?
            .max_size(opts.max_connections as usize)
            .runtime(Runtime::Tokio1);
        if let Some(secs) = opts.wait_timeout {
            builder = builder.wait_timeout(Some(Duration::from_secs(secs)));
        }

        Ok(RedisPool::Single(builder.build()?))
    }

    /// Creates a connection pool from a [`RedisConfig`].
    pub fn from_config(config: &RedisConfig) -> Result<Self, RedisError> {
        match config {
            RedisConfig::Cluster {
                cluster_nodes,
                options,
            } => Self::cluster(cluster_nodes.iter().map(String::as_str), options),
            RedisConfig::Single(server) => Self::single(server, &RedisConfigOptions::default()),
            RedisConfig::SingleWithOpts { server, options } => Self::single(server, options),
        }
    }

    /// Checks a connection out of the pool.
    ///
    /// The connection is returned to the pool when the [`RedisConnection`]
    /// is dropped.
    pub async fn connection(&self) -> Result<RedisConnection, RedisError> {
        let connection = match self {
            Self::Cluster(pool) => {
                RedisConnection::Cluster(pool.get().await.map_err(RedisError::Pool)?)
            }
            Self::Single(pool) => {
                RedisConnection::Single(pool.get().await.map_err(RedisError::Pool)?)
            }
        };

        Ok(connection)
    }

    /// Returns statistics about the current state of the connection pool.
    pub fn stats(&self) -> RedisPoolStats {
        let status = match self {
            Self::Cluster(pool) => pool.status(),
            Self::Single(pool) => pool.status(),
        };

        RedisPoolStats {
            connections: status.size as u32,
            idle_connections: status.available as u32,
        }
    }
}

impl fmt::Debug for RedisPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedisPool::Cluster(_) => write!(f, "RedisPool::Cluster"),
            RedisPool::Single(_) => write!(f, "RedisPool::Single"),
        }
    }
}

/// A connection to either a single Redis instance or a Redis cluster.
///
/// Implements [`redis::aio::ConnectionLike`], so commands and pipelines
/// built with the [`redis`] crate run against it uniformly.
pub enum RedisConnection {
    /// A connection to a Redis cluster.
    Cluster(ClusterConnection),
    /// A connection to a single Redis instance.
    Single(SingleConnection),
}

impl fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cluster(_) => "Cluster",
            Self::Single(_) => "Single",
        };
        f.debug_tuple(name).finish()
    }
}

impl redis::aio::ConnectionLike for RedisConnection {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        match self {
            Self::Cluster(conn) => conn.req_packed_command(cmd),
            Self::Single(conn) => conn.req_packed_command(cmd),
        }
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        match self {
            Self::Cluster(conn) => conn.req_packed_commands(cmd, offset, count),
            Self::Single(conn) => conn.req_packed_commands(cmd, offset, count),
        }
    }

    fn get_db(&self) -> i64 {
        match self {
            Self::Cluster(conn) => conn.get_db(),
            Self::Single(conn) => conn.get_db(),
        }
    }
}
