use std::time::Duration;

use blockfeed_codec::Encoder;
use clap::{Parser, ValueEnum};

/// Reorg-aware block-event ingester for EVM-compatible chains.
#[derive(Debug, Clone, Parser)]
#[command(name = "blockfeed", version, about)]
pub struct Args {
    /// Log level for the service (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Websocket RPC endpoint serving the newHeads subscription.
    #[arg(long, env = "WS_RPC", default_value = "ws://localhost:8546")]
    pub ws_rpc: String,

    /// Http RPC endpoint used for hydration and gap fills.
    #[arg(long, env = "HTTP_RPC", default_value = "http://localhost:8545")]
    pub http_rpc: String,

    /// Optional secondary RPC endpoint used by the sanity check.
    #[arg(long, env = "SANITY_RPC")]
    pub sanity_rpc: Option<String>,

    /// Interval of the sanity check against the secondary node, in seconds.
    #[arg(long, env = "SANITY_CHECK_INTERVAL", default_value_t = 24)]
    pub sanity_check_interval: u64,

    /// Outer deadline for dialing RPC endpoints, in seconds.
    #[arg(long, env = "RPC_REQUEST_TIMEOUT", default_value_t = 10)]
    pub rpc_request_timeout: u64,

    /// Capacity of the recent-block cache.
    #[arg(long, env = "MAX_NUM_BLOCKS", default_value_t = 64)]
    pub max_num_blocks: usize,

    /// Retention of persisted blocks, in seconds.
    #[arg(long, env = "BLOCK_EXPIRATION", default_value_t = 24 * 60 * 60)]
    pub block_expiration: u64,

    /// Warn when a handled block lags wall clock by more than this many
    /// seconds.
    #[arg(long, env = "BLOCK_SLOW_WARNING_THRESHOLD")]
    pub block_slow_warning_threshold: Option<u64>,

    /// Size of the reordering window for parallel hydration.
    #[arg(long, env = "QUEUE_LEN", default_value_t = 256)]
    pub queue_len: usize,

    /// Also hydrate blocks with their transactions.
    #[arg(long, env = "WITH_TRANSACTIONS")]
    pub with_transactions: bool,

    /// Publisher backend to deliver messages to.
    #[arg(long, env = "PUBLISHER_TYPE", value_enum, default_value = "redis-stream")]
    pub publisher_type: PublisherType,

    /// Topic (stream) name to publish messages to.
    #[arg(long, env = "PUBLISHER_TOPIC", required = true)]
    pub publisher_topic: String,

    /// Approximate maximum length of the publisher's stream.
    #[arg(long, env = "PUBLISHER_MAX_LEN", default_value_t = 7200)]
    pub publisher_max_len: usize,

    /// Wire format of published messages.
    #[arg(long, env = "ENCODER_TYPE", value_enum, default_value = "json")]
    pub encoder_type: EncoderType,

    /// Address of the redis server backing the keeper and the stream
    /// publisher.
    #[arg(long, env = "REDIS_ADDR", default_value = "localhost:6379")]
    pub redis_addr: String,

    /// Redis database index.
    #[arg(long, env = "REDIS_DB", default_value_t = 0)]
    pub redis_db: i64,

    /// Username for authenticating with redis.
    #[arg(long, env = "REDIS_USERNAME")]
    pub redis_username: Option<String>,

    /// Password for authenticating with redis.
    #[arg(long, env = "REDIS_PASSWORD")]
    pub redis_password: Option<String>,

    /// Prefix for every key the keeper persists.
    #[arg(long, env = "REDIS_KEY_PREFIX", default_value = "")]
    pub redis_key_prefix: String,
}

impl Args {
    /// Returns the sanity check interval as a duration.
    pub const fn sanity_check_interval(&self) -> Duration {
        Duration::from_secs(self.sanity_check_interval)
    }

    /// Returns the RPC dial deadline as a duration.
    pub const fn rpc_request_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_request_timeout)
    }

    /// Returns the block retention as a duration.
    pub const fn block_expiration(&self) -> Duration {
        Duration::from_secs(self.block_expiration)
    }
}

/// The supported publisher backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PublisherType {
    /// Append messages to a redis stream.
    #[value(name = "redis-stream")]
    RedisStream,
}

/// The supported message wire formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EncoderType {
    /// Plain JSON.
    Json,
    /// Protobuf, LZ4-compressed with a length prefix.
    Protobuf,
}

impl From<EncoderType> for Encoder {
    fn from(value: EncoderType) -> Self {
        match value {
            EncoderType::Json => Self::Json,
            EncoderType::Protobuf => Self::Protobuf,
        }
    }
}
