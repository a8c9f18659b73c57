use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use blockfeed_client::{ChainNode, ClientError, FilterQuery, HeadSubscription};
use blockfeed_primitives::{Header, Log, Transaction};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// One scripted event of a mock subscription session.
#[derive(Debug)]
pub enum SessionEvent {
    /// Deliver a head to the subscriber.
    Head(Header),
    /// Fail the subscription with the given error.
    Error(ClientError),
    /// Pause between events.
    Wait(Duration),
}

impl SessionEvent {
    /// A transient subscription failure, as a restarting websocket would
    /// produce.
    pub fn transient_error() -> Self {
        Self::Error(ClientError::SubscriptionClosed)
    }
}

/// A scriptable in-memory [`ChainNode`].
///
/// Headers, logs and the chain height are looked up from registered
/// fixtures; each call to [`ChainNode::subscribe_new_heads`] plays the next
/// scripted session. A session that runs out of events stays open until the
/// subscription is dropped.
#[derive(Debug, Default)]
pub struct MockChainNode {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    block_number: u64,
    latest_header: Option<Header>,
    headers_by_hash: HashMap<String, Header>,
    headers_by_number: HashMap<u64, Header>,
    logs: HashMap<String, Vec<Log>>,
    log_failures: HashMap<String, usize>,
    sessions: VecDeque<Vec<SessionEvent>>,
    opened_sessions: usize,
}

impl MockChainNode {
    /// Returns an empty mock node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers headers for hash and number lookups and raises the chain
    /// height to the highest registered number.
    pub fn add_chain(&self, headers: &[Header]) {
        let mut inner = self.inner.lock();
        for header in headers {
            inner.headers_by_hash.insert(header.hash.clone(), header.clone());
            inner.headers_by_number.insert(header.number, header.clone());
            inner.block_number = inner.block_number.max(header.number);
            inner.latest_header = Some(header.clone());
        }
    }

    /// Overrides the reported chain height.
    pub fn set_block_number(&self, number: u64) {
        self.inner.lock().block_number = number;
    }

    /// Sets the header returned for latest-header lookups.
    pub fn set_latest_header(&self, header: Header) {
        self.inner.lock().latest_header = Some(header);
    }

    /// Registers the logs of a block.
    pub fn set_logs(&self, hash: &str, logs: Vec<Log>) {
        self.inner.lock().logs.insert(hash.to_string(), logs);
    }

    /// Makes the next `times` log queries for `hash` fail with `NotFound`.
    pub fn fail_logs(&self, hash: &str, times: usize) {
        self.inner.lock().log_failures.insert(hash.to_string(), times);
    }

    /// Scripts the next subscription session.
    pub fn push_session(&self, events: Vec<SessionEvent>) {
        self.inner.lock().sessions.push_back(events);
    }

    /// Returns how many subscriptions have been opened.
    pub fn opened_sessions(&self) -> usize {
        self.inner.lock().opened_sessions
    }
}

#[async_trait::async_trait]
impl ChainNode for MockChainNode {
    async fn block_number(&self) -> Result<u64, ClientError> {
        Ok(self.inner.lock().block_number)
    }

    async fn subscribe_new_heads(&self) -> Result<HeadSubscription, ClientError> {
        let events = {
            let mut inner = self.inner.lock();
            inner.opened_sessions += 1;
            inner.sessions.pop_front().unwrap_or_default()
        };

        let (header_tx, header_rx) = mpsc::channel(16);
        let (error_tx, error_rx) = mpsc::channel(1);
        let task = tokio::spawn(async move {
            for event in events {
                match event {
                    SessionEvent::Head(header) => {
                        if header_tx.send(header).await.is_err() {
                            return;
                        }
                    }
                    SessionEvent::Error(err) => {
                        let _ = error_tx.send(err).await;
                        return;
                    }
                    SessionEvent::Wait(delay) => tokio::time::sleep(delay).await,
                }
            }
            // Out of events: stay open until unsubscribed.
            std::future::pending::<()>().await;
        });

        Ok(HeadSubscription::new(header_rx, error_rx).with_task(task))
    }

    async fn filter_logs(&self, query: FilterQuery) -> Result<Vec<Log>, ClientError> {
        let hash = query.block_hash.unwrap_or_default();
        let mut inner = self.inner.lock();
        if let Some(remaining) = inner.log_failures.get_mut(&hash) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ClientError::NotFound(hash));
            }
        }
        Ok(inner.logs.get(&hash).cloned().unwrap_or_default())
    }

    async fn header_by_hash(&self, hash: &str) -> Result<Header, ClientError> {
        self.inner
            .lock()
            .headers_by_hash
            .get(hash)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(hash.to_string()))
    }

    async fn header_by_number(&self, number: Option<u64>) -> Result<Header, ClientError> {
        let inner = self.inner.lock();
        match number {
            Some(number) => inner
                .headers_by_number
                .get(&number)
                .cloned()
                .ok_or_else(|| ClientError::NotFound(number.to_string())),
            None => inner
                .latest_header
                .clone()
                .ok_or_else(|| ClientError::NotFound("latest".to_string())),
        }
    }

    async fn transactions_by_hash(&self, _hash: &str) -> Result<Vec<Transaction>, ClientError> {
        Ok(Vec::new())
    }
}
