use std::sync::Arc;

use blockfeed_codec::Encoder;
use blockfeed_primitives::Message;
use blockfeed_publisher::{Attributes, PublishError, Publisher};
use parking_lot::Mutex;
use tokio::sync::Notify;

/// A [`Publisher`] that records every payload and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    inner: Arc<Mutex<RecorderState>>,
    notify: Arc<Notify>,
}

#[derive(Debug, Default)]
struct RecorderState {
    published: Vec<(String, Vec<u8>, Option<Attributes>)>,
    fail_remaining: usize,
}

impl RecordingPublisher {
    /// Returns an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` publishes fail.
    pub fn fail_times(&self, times: usize) {
        self.inner.lock().fail_remaining = times;
    }

    /// Returns the recorded payloads in publish order.
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.inner.lock().published.iter().map(|(_, payload, _)| payload.clone()).collect()
    }

    /// Returns the recorded messages, decoded with `encoder`.
    pub fn messages(&self, encoder: Encoder) -> Vec<Message> {
        self.payloads()
            .iter()
            .map(|payload| encoder.decode(payload).expect("recorded payload decodes"))
            .collect()
    }

    /// Returns the attributes attached to each message.
    pub fn attributes(&self) -> Vec<Option<Attributes>> {
        self.inner.lock().published.iter().map(|(_, _, attrs)| attrs.clone()).collect()
    }

    /// Waits until at least `count` messages were published.
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.inner.lock().published.len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait::async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        attrs: Option<Attributes>,
    ) -> Result<(), PublishError> {
        let mut inner = self.inner.lock();
        if inner.fail_remaining > 0 {
            inner.fail_remaining -= 1;
            return Err(PublishError::Backend("injected publish failure".into()));
        }
        inner.published.push((topic.to_string(), payload, attrs));
        drop(inner);
        self.notify.notify_waiters();
        Ok(())
    }
}
