use serde::{Deserialize, Serialize};

const fn default_max_connections() -> u32 {
    24
}

/// Additional configuration options for a Redis connection pool.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct RedisConfigOptions {
    /// Maximum number of connections managed by the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Maximum time in seconds to wait for a connection checkout.
    ///
    /// When unset, callers wait indefinitely for a free connection. This is
    /// the only deadline applied by this crate; command deadlines are the
    /// responsibility of the Redis server and the caller.
    #[serde(default)]
    pub wait_timeout: Option<u64>,
}

impl Default for RedisConfigOptions {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            wait_timeout: None,
        }
    }
}

/// Configuration for connecting a Redis client.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
pub enum RedisConfig {
    /// Connect to a Redis cluster.
    Cluster {
        /// List of `redis://` urls to use in cluster mode.
        ///
        /// This can also be a single node which is configured in cluster mode.
        cluster_nodes: Vec<String>,

        /// Additional configuration options for the connection pool.
        #[serde(flatten)]
        options: RedisConfigOptions,
    },

    /// Connect to a single Redis instance.
    ///
    /// Contains the `redis://` url of the node.
    Single(String),

    /// Connect to a single Redis instance with pool options.
    SingleWithOpts {
        /// Contains the `redis://` url of the node.
        server: String,

        /// Additional configuration options for the connection pool.
        #[serde(flatten)]
        options: RedisConfigOptions,
    },
}
