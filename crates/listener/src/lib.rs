//! The listener pipeline: subscribe to new heads, hydrate them in parallel,
//! re-serialize them into dispatch order and hand them to the handler.
//!
//! A run is a sequence of sessions. Within a session the listener
//! resubscribes on transient subscription failures, gap-filling the blocks
//! missed while disconnected. A reorg deeper than the cached window ends the
//! session and starts a fresh one; any other failure ends the run. A sanity
//! ticker compares received heads against a secondary node and fails the run
//! when the primary goes stale.

mod error;
pub use error::ListenerError;

mod handler;
pub use handler::Handler;

mod hydrator;
pub use hydrator::{FilterOptions, Hydrator};

mod metrics;
pub use metrics::ListenerMetrics;

mod queue;
pub use queue::OrderingQueue;

mod resolver;
pub use resolver::{find_reorg_blocks, ChainWalker, LiveChainWalker, StoredChainWalker};

mod retry;
pub use retry::Retry;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use std::{sync::Arc, time::Duration};

use blockfeed_client::{ChainNode, ClientError};
use blockfeed_keeper::{BlockKeeper, KeeperError};
use blockfeed_primitives::{Block, Header};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;

/// Capacity of the channel between hydration and the handler. When it fills,
/// hydration tasks block on dispatch, which in turn slows the subscription
/// reader down.
const BUF_LEN: usize = 100;

/// Shared per-run state touched by the subscription loop and the sanity
/// ticker. The lock is held for field access only.
#[derive(Debug, Default)]
struct SessionState {
    last_received: Option<Header>,
    resuming: bool,
}

/// The ordering queue plus the downstream channel, behind one async lock so
/// ready blocks enter the channel in dispatch order.
#[derive(Debug)]
struct SequencedSender {
    queue: OrderingQueue,
    tx: mpsc::Sender<Block>,
}

impl SequencedSender {
    const fn new(queue: OrderingQueue, tx: mpsc::Sender<Block>) -> Self {
        Self { queue, tx }
    }

    /// Inserts a hydrated block at its sequence position and forwards every
    /// block that became dispatchable. Fails only when the receiver is gone.
    async fn publish(&mut self, seq: u64, block: Block) -> Result<(), ()> {
        for displaced in self.queue.insert(seq, block) {
            self.tx.send(displaced).await.map_err(|_| ())?;
        }
        while self.queue.peek().is_some() {
            let Some(next) = self.queue.dequeue() else {
                break;
            };
            self.tx.send(next).await.map_err(|_| ())?;
        }
        Ok(())
    }
}

/// The listener service: owns the subscription sessions and drives blocks
/// through the [`Handler`].
#[derive(Debug)]
pub struct Listener {
    ws_node: Arc<dyn ChainNode>,
    sanity_node: Option<Arc<dyn ChainNode>>,
    sanity_check_interval: Duration,
    handler: Arc<Handler>,
    hydrator: Arc<Hydrator>,
    keeper: Arc<BlockKeeper>,
    queue_len: usize,
    state: Arc<Mutex<SessionState>>,
    metrics: Arc<ListenerMetrics>,
}

impl Listener {
    /// Returns a new listener.
    ///
    /// `ws_node` serves the `newHeads` subscription; hydration runs over the
    /// hydrator's own (http) node. `sanity_node` is an optional secondary
    /// node used to cross-check liveness every `sanity_check_interval`.
    /// `queue_len` bounds the reordering window for parallel hydration.
    pub fn new(
        ws_node: Arc<dyn ChainNode>,
        sanity_node: Option<Arc<dyn ChainNode>>,
        sanity_check_interval: Duration,
        handler: Arc<Handler>,
        hydrator: Arc<Hydrator>,
        keeper: Arc<BlockKeeper>,
        queue_len: usize,
    ) -> Self {
        Self {
            ws_node,
            sanity_node,
            sanity_check_interval,
            handler,
            hydrator,
            keeper,
            queue_len,
            state: Arc::new(Mutex::new(SessionState::default())),
            metrics: Arc::new(ListenerMetrics::default()),
        }
    }

    /// Runs the listener until the token is cancelled or a fatal error
    /// occurs.
    pub async fn run(&self, token: CancellationToken) -> Result<(), ListenerError> {
        tracing::info!(target: "blockfeed::listener", "starting listener service");
        self.handler.init().await?;

        loop {
            match self.run_session(&token).await {
                Ok(()) => {
                    tracing::info!(target: "blockfeed::listener", "listener service stopped");
                    return Ok(());
                }
                Err(err @ ListenerError::ReorgTooDeep { .. }) => {
                    tracing::error!(
                        target: "blockfeed::listener",
                        %err,
                        "session hit a reorg past the cached window, reconnecting"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Runs one subscription session to completion.
    async fn run_session(&self, root: &CancellationToken) -> Result<(), ListenerError> {
        let token = root.child_token();
        let (block_tx, mut block_rx) = mpsc::channel(BUF_LEN);

        let mut queue = OrderingQueue::new(self.queue_len);
        queue.set_sequence(1);
        self.state.lock().resuming = true;

        let session = SessionContext {
            ws_node: self.ws_node.clone(),
            hydrator: self.hydrator.clone(),
            keeper: self.keeper.clone(),
            sender: Arc::new(AsyncMutex::new(SequencedSender::new(queue, block_tx))),
            state: self.state.clone(),
            metrics: self.metrics.clone(),
            token: token.clone(),
        };

        let sanity = tokio::spawn(run_sanity_check(
            self.sanity_node.clone(),
            self.sanity_check_interval,
            self.state.clone(),
            token.clone(),
        ));
        let sync = tokio::spawn(async move { session.sync_blocks().await });

        let mut handler_result: Result<(), ListenerError> = Ok(());
        while let Some(block) = block_rx.recv().await {
            tracing::debug!(
                target: "blockfeed::listener",
                hash = block.hash,
                parent = block.parent_hash,
                logs = block.logs.len(),
                "received new block"
            );
            if let Err(err) = self.handler.handle(block).await {
                tracing::error!(target: "blockfeed::listener", %err, "failed to handle block");
                handler_result = Err(err);
                break;
            }
        }

        // Unwind: stop the producers, then drain so none stays parked on a
        // full channel.
        token.cancel();
        while block_rx.recv().await.is_some() {}

        let sync_result = sync.await;
        let sanity_result = sanity.await;

        handler_result?;
        match sanity_result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(err) => return Err(ListenerError::TaskFailed(err.to_string())),
        }
        match sync_result {
            Ok(result) => result,
            Err(err) => Err(ListenerError::TaskFailed(err.to_string())),
        }
    }
}

/// Everything one session's background tasks need.
#[derive(Clone)]
struct SessionContext {
    ws_node: Arc<dyn ChainNode>,
    hydrator: Arc<Hydrator>,
    keeper: Arc<BlockKeeper>,
    sender: Arc<AsyncMutex<SequencedSender>>,
    state: Arc<Mutex<SessionState>>,
    metrics: Arc<ListenerMetrics>,
    token: CancellationToken,
}

impl SessionContext {
    /// Consumes the subscription until cancellation, resubscribing on
    /// transient failures.
    async fn sync_blocks(self) -> Result<(), ListenerError> {
        let mut next_seq: u64 = 1;
        loop {
            match self.subscribe_new_heads(&mut next_seq).await {
                Ok(()) => return Ok(()),
                Err(_) if self.token.is_cancelled() => return Ok(()),
                Err(err) if err.is_transient() => {
                    self.metrics.resubscribes.increment(1);
                    tracing::warn!(
                        target: "blockfeed::listener",
                        %err,
                        "subscription failed, resubscribing"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One subscription pass: subscribe, fill the gap since the stored head,
    /// then stream heads into hydration tasks.
    async fn subscribe_new_heads(&self, next_seq: &mut u64) -> Result<(), ListenerError> {
        tracing::info!(target: "blockfeed::listener", "subscribing to new heads");
        let mut subscription = self.ws_node.subscribe_new_heads().await?;

        self.fill_gap(next_seq).await?;

        let (hydration_err_tx, mut hydration_err_rx) = mpsc::channel::<ListenerError>(16);
        loop {
            tokio::select! {
                _ = self.token.cancelled() => {
                    tracing::info!(target: "blockfeed::listener", "stopping subscription");
                    subscription.unsubscribe();
                    return Ok(());
                }
                Some(err) = hydration_err_rx.recv() => {
                    subscription.unsubscribe();
                    return Err(err);
                }
                next = subscription.next() => {
                    let header = match next {
                        Ok(Some(header)) => header,
                        Ok(None) => return Err(ClientError::SubscriptionClosed.into()),
                        Err(err) => return Err(err.into()),
                    };
                    tracing::debug!(
                        target: "blockfeed::listener",
                        hash = header.hash,
                        number = header.number,
                        "received new head"
                    );
                    {
                        let mut state = self.state.lock();
                        let fresher = state
                            .last_received
                            .as_ref()
                            .is_none_or(|last| last.timestamp < header.timestamp);
                        if fresher {
                            state.last_received = Some(header.clone());
                        }
                    }
                    let seq = *next_seq;
                    *next_seq += 1;
                    self.spawn_hydration(seq, header, hydration_err_tx.clone());
                }
            }
        }
    }

    /// Hydrates one head on its own task and dispatches it at `seq`.
    fn spawn_hydration(&self, seq: u64, header: Header, err_tx: mpsc::Sender<ListenerError>) {
        let hydrator = self.hydrator.clone();
        let sender = self.sender.clone();
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                result = hydrator.hydrate(&header) => match result {
                    Ok(block) => {
                        let _ = sender.lock().await.publish(seq, block).await;
                    }
                    Err(err) => {
                        tracing::error!(
                            target: "blockfeed::listener",
                            hash = header.hash,
                            %err,
                            "failed to hydrate head"
                        );
                        let _ = err_tx.try_send(err);
                    }
                }
            }
        });
    }

    /// Replays the blocks between the stored head and the node's current
    /// height through the ordering queue.
    async fn fill_gap(&self, next_seq: &mut u64) -> Result<(), ListenerError> {
        let node_number = self.hydrator.node().block_number().await?;
        let head = match self.keeper.head() {
            Ok(head) => head,
            Err(KeeperError::NotFound(_)) => {
                self.state.lock().resuming = false;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        if node_number <= head.number + 1 {
            self.state.lock().resuming = false;
            return Ok(());
        }

        tracing::info!(
            target: "blockfeed::listener",
            from = head.number + 1,
            to = node_number - 1,
            "synchronizing missed blocks"
        );
        let numbers: Vec<u64> = (head.number + 1..node_number).collect();
        for batch in numbers.chunks(hydrator::FETCH_BATCH_SIZE) {
            let blocks = futures::future::try_join_all(
                batch.iter().map(|number| self.hydrator.block_by_number(*number)),
            )
            .await?;
            for block in blocks {
                let seq = *next_seq;
                *next_seq += 1;
                if self.sender.lock().await.publish(seq, block).await.is_err() {
                    // The session is shutting down.
                    return Ok(());
                }
                self.metrics.gap_filled_blocks.increment(1);
            }
        }
        tracing::info!(target: "blockfeed::listener", "finished synchronizing missed blocks");
        Ok(())
    }
}

/// Periodically compares the freshest received head against a secondary
/// node. While resuming, a fresh head flips the listener to live; while
/// live, a stale head is fatal.
async fn run_sanity_check(
    node: Option<Arc<dyn ChainNode>>,
    interval: Duration,
    state: Arc<Mutex<SessionState>>,
    token: CancellationToken,
) -> Result<(), ListenerError> {
    let Some(node) = node else {
        token.cancelled().await;
        return Ok(());
    };

    let valid_secs = interval.as_secs().max(1);
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    // The first tick fires immediately, skip it.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            _ = ticker.tick() => {
                let last = state.lock().last_received.clone();
                let Some(last) = last else { continue };

                let check = match node.header_by_number(None).await {
                    Ok(header) => header,
                    Err(err) => {
                        tracing::error!(
                            target: "blockfeed::listener",
                            %err,
                            "sanity check lookup failed"
                        );
                        token.cancel();
                        return Err(err.into());
                    }
                };

                let resuming = state.lock().resuming;
                if resuming {
                    if last.timestamp >= check.timestamp.saturating_sub(valid_secs) {
                        state.lock().resuming = false;
                        tracing::info!(target: "blockfeed::listener", "caught up to the chain head");
                    }
                } else if last.timestamp < check.timestamp.saturating_sub(valid_secs) {
                    tracing::error!(
                        target: "blockfeed::listener",
                        last_received = last.timestamp,
                        check = check.timestamp,
                        "primary node stopped delivering fresh heads"
                    );
                    token.cancel();
                    return Err(ListenerError::SanityCheckFailed);
                }
            }
        }
    }
}
