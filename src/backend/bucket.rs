//! Bucket transport — in-memory, for tests and local development.
//!
//! Outbound payloads land in a shared bucket instead of a network;
//! acceptance is a toggle so callers can exercise the rejected-send path.
//! The run loop just idles cooperatively until stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{BackendError, InboundPayload, OutboundPayload, RunContext, Transport};

/// How often the idle loop checks the running flag.
const IDLE_POLL_MS: u64 = 20;

/// In-memory transport capturing everything sent through it.
pub struct BucketTransport {
    name: String,
    accepting: AtomicBool,
    sent: Mutex<Vec<OutboundPayload>>,
    received: Mutex<Vec<InboundPayload>>,
}

impl BucketTransport {
    /// Create a bucket transport with the given backend name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            accepting: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
            received: Mutex::new(Vec::new()),
        }
    }

    /// Toggle whether `send` reports acceptance.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Snapshot of payloads sent so far.
    pub async fn sent(&self) -> Vec<OutboundPayload> {
        self.sent.lock().await.clone()
    }

    /// Snapshot of payloads handed to `receive` so far.
    pub async fn received(&self) -> Vec<InboundPayload> {
        self.received.lock().await.clone()
    }
}

#[async_trait]
impl Transport for BucketTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: RunContext) -> Result<(), BackendError> {
        while ctx.is_running() {
            tokio::time::sleep(Duration::from_millis(IDLE_POLL_MS)).await;
        }
        Ok(())
    }

    async fn send(&self, payload: &OutboundPayload) -> Result<bool, BackendError> {
        self.sent.lock().await.push(payload.clone());
        let accepted = self.accepting.load(Ordering::SeqCst);
        debug!(
            backend = %self.name,
            identity = %payload.identity,
            accepted,
            "bucket send"
        );
        Ok(accepted)
    }

    async fn receive(&self, payload: &InboundPayload) -> Result<(), BackendError> {
        self.received.lock().await.push(payload.clone());
        Ok(())
    }
}
