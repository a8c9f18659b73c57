//! The blockfeed service binary: parses the configuration, wires the chain
//! clients, the keeper, the publisher and the listener together, and runs
//! until shutdown or a fatal error.

mod args;

use crate::args::{Args, PublisherType};

use std::sync::Arc;

use blockfeed_client::{chain_name, ChainNode, RpcChainNode};
use blockfeed_keeper::BlockKeeper;
use blockfeed_listener::{FilterOptions, Handler, Hydrator, Listener};
use blockfeed_publisher::{validate_topic_name, Publisher, RedisStreamPublisher};
use blockfeed_store::{RedisConfig, RedisStore};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = run(args) {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn run(args: Args) -> eyre::Result<()> {
    validate_topic_name(&args.publisher_topic)?;

    let dial_timeout = args.rpc_request_timeout();
    tracing::info!(target: "blockfeed", rpc = args.ws_rpc, "connecting to websocket rpc");
    let ws_node = RpcChainNode::connect_ws(&args.ws_rpc, dial_timeout).await?;
    tracing::info!(target: "blockfeed", rpc = args.http_rpc, "connecting to http rpc");
    let http_node = RpcChainNode::connect_http(&args.http_rpc, dial_timeout).await?;
    tracing::info!(
        target: "blockfeed",
        chain = chain_name(http_node.chain_id()),
        "connected to chain"
    );

    let sanity_node: Option<Arc<dyn ChainNode>> = match &args.sanity_rpc {
        Some(rpc) => {
            tracing::info!(target: "blockfeed", rpc, "connecting to sanity check rpc");
            Some(Arc::new(RpcChainNode::connect_http(rpc, dial_timeout).await?))
        }
        None => None,
    };

    let redis_config = RedisConfig {
        addr: args.redis_addr.clone(),
        db: args.redis_db,
        username: args.redis_username.clone(),
        password: args.redis_password.clone(),
        key_prefix: args.redis_key_prefix.clone(),
    };
    tracing::info!(target: "blockfeed", addr = redis_config.addr, "connecting to redis");
    let connection = redis_config.connect().await?;
    let store = RedisStore::new(connection.clone(), redis_config.key_prefix.clone());

    tracing::info!(
        target: "blockfeed",
        capacity = args.max_num_blocks,
        expiration_secs = args.block_expiration,
        "setting up block keeper"
    );
    let keeper = Arc::new(BlockKeeper::new(
        args.max_num_blocks,
        args.block_expiration(),
        Arc::new(store),
    ));

    let publisher: Arc<dyn Publisher> = match args.publisher_type {
        PublisherType::RedisStream => {
            Arc::new(RedisStreamPublisher::new(connection, args.publisher_max_len))
        }
    };

    let hydrator = Arc::new(Hydrator::new(
        Arc::new(http_node),
        FilterOptions { with_transactions: args.with_transactions, ..Default::default() },
    ));

    tracing::info!(target: "blockfeed", topic = args.publisher_topic, "setting up handler");
    let mut handler = Handler::new(
        args.publisher_topic.clone(),
        keeper.clone(),
        hydrator.clone(),
        publisher,
        args.encoder_type.into(),
    );
    if let Some(threshold) = args.block_slow_warning_threshold {
        handler = handler.with_slow_block_threshold(std::time::Duration::from_secs(threshold));
    }

    let listener = Listener::new(
        Arc::new(ws_node),
        sanity_node,
        args.sanity_check_interval(),
        Arc::new(handler),
        hydrator,
        keeper,
        args.queue_len,
    );

    let token = CancellationToken::new();
    tokio::spawn({
        let token = token.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!(target: "blockfeed", "received shutdown signal");
            token.cancel();
        }
    });

    listener.run(token).await?;
    Ok(())
}
