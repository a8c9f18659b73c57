use metrics::{Counter, Histogram};
use metrics_derive::Metrics;

/// The metrics for the listener pipeline.
#[derive(Metrics)]
#[metrics(scope = "blockfeed_listener")]
pub struct ListenerMetrics {
    /// A counter on the blocks handled.
    pub handled_blocks: Counter,
    /// A counter on the messages published downstream.
    pub published_messages: Counter,
    /// A counter on the blocks dropped as duplicates or out of window.
    pub dropped_blocks: Counter,
    /// A counter on the reorganizations resolved.
    pub reorgs: Counter,
    /// A histogram of reorganization depths.
    pub reorg_depths: Histogram,
    /// A counter on subscription reconnects.
    pub resubscribes: Counter,
    /// A counter on the blocks replayed by gap fills.
    pub gap_filled_blocks: Counter,
}
