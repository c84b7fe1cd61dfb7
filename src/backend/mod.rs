//! Backend contract: the uniform lifecycle every transport satisfies.
//!
//! A transport implements [`Transport`] (`run`/`send`/`receive`); the
//! router wraps each one in a [`BackendHandle`], which drives the
//! Idle → Running → Stopped state machine. `start()` runs the transport's
//! blocking event loop and guarantees the handle reads Stopped on every
//! exit path, normal or failed, via a scoped drop guard. `stop()` is an
//! idempotent, cross-task request observed cooperatively by the loop.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::Level;
use uuid::Uuid;

use crate::store::messages::DeliveryReport;

pub mod bucket;
pub mod http;

/// Errors from the backend layer.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// A transport did not override an abstract operation. Fatal
    /// programming error, not recoverable.
    #[error("transport does not implement {0}")]
    Unimplemented(&'static str),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The inbound channel toward the router was closed.
    #[error("inbound channel closed")]
    ChannelClosed,

    /// Transport-specific failure.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// One outbound text handed to a transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundPayload {
    /// Correlation id.
    pub id: Uuid,
    /// Name of the backend expected to carry this payload.
    pub backend: String,
    /// Destination address, in the backend's own terms.
    pub identity: String,
    /// Message body.
    pub text: String,
}

/// One inbound text observed by a transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundPayload {
    /// Correlation id.
    pub id: Uuid,
    /// Name of the backend that observed it.
    pub backend: String,
    /// Source address, in the backend's own terms.
    pub identity: String,
    /// Message body.
    pub text: String,
    /// When the transport observed it.
    pub received_at: DateTime<Utc>,
}

impl InboundPayload {
    /// Build an inbound payload observed now.
    pub fn now(backend: &str, identity: &str, text: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            backend: backend.to_owned(),
            identity: identity.to_owned(),
            text: text.to_owned(),
            received_at: Utc::now(),
        }
    }
}

/// Traffic a transport forwards to the router.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// A text message from the network.
    Message(InboundPayload),
    /// A gateway delivery callback.
    Report(DeliveryReport),
}

/// Lifecycle state of a backend handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Never started.
    Idle,
    /// `run()` loop in progress.
    Running,
    /// `run()` exited, or a stop was requested.
    Stopped,
}

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPED: u8 = 2;

impl LifecycleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            STATE_RUNNING => LifecycleState::Running,
            STATE_STOPPED => LifecycleState::Stopped,
            _ => LifecycleState::Idle,
        }
    }
}

/// Context handed to a transport's `run()` loop.
#[derive(Clone)]
pub struct RunContext {
    state: Arc<AtomicU8>,
    inbound: mpsc::Sender<Inbound>,
}

impl RunContext {
    /// Whether the loop should keep going. Transports poll this between
    /// iterations; a stop request flips it from another task.
    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_RUNNING
    }

    /// Forward inbound traffic to the router.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::ChannelClosed`] if the router side is gone.
    pub async fn forward(&self, inbound: Inbound) -> Result<(), BackendError> {
        self.inbound
            .send(inbound)
            .await
            .map_err(|_| BackendError::ChannelClosed)
    }
}

/// Operations a concrete transport must provide.
///
/// `run`, `send`, and `receive` are unimplemented by default; calling one a
/// transport did not override fails with [`BackendError::Unimplemented`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Stable transport name; must match a configured `backends` row.
    fn name(&self) -> &str;

    /// The transport-specific event loop: poll or listen for inbound
    /// traffic, forwarding it through `ctx`, until `ctx.is_running()` turns
    /// false. Blocking from the caller's point of view.
    ///
    /// # Errors
    ///
    /// Transport failures propagate to whoever called
    /// [`BackendHandle::start`].
    async fn run(&self, ctx: RunContext) -> Result<(), BackendError> {
        let _ = ctx;
        Err(BackendError::Unimplemented("run"))
    }

    /// Deliver one outbound payload. Returns whether the network accepted
    /// it.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unimplemented`] unless overridden.
    async fn send(&self, payload: &OutboundPayload) -> Result<bool, BackendError> {
        let _ = payload;
        Err(BackendError::Unimplemented("send"))
    }

    /// Hand an inbound payload to transport-specific post-processing after
    /// the router has logged it.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unimplemented`] unless overridden.
    async fn receive(&self, payload: &InboundPayload) -> Result<(), BackendError> {
        let _ = payload;
        Err(BackendError::Unimplemented("receive"))
    }
}

/// Clears the running flag on every exit path out of `start()`, including
/// failure.
struct StopGuard {
    state: Arc<AtomicU8>,
}

impl Drop for StopGuard {
    fn drop(&mut self) {
        self.state.store(STATE_STOPPED, Ordering::SeqCst);
    }
}

/// Lifecycle driver wrapping one transport.
pub struct BackendHandle {
    transport: Arc<dyn Transport>,
    state: Arc<AtomicU8>,
    inbound: mpsc::Sender<Inbound>,
}

impl BackendHandle {
    /// Wrap a transport; starts Idle.
    pub fn new(transport: Arc<dyn Transport>, inbound: mpsc::Sender<Inbound>) -> Self {
        Self {
            transport,
            state: Arc::new(AtomicU8::new(STATE_IDLE)),
            inbound,
        }
    }

    /// The wrapped transport's name.
    pub fn name(&self) -> &str {
        self.transport.name()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Whether the transport's loop is (supposed to be) in progress.
    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Transition to Running and drive the transport's `run()` loop.
    ///
    /// Re-enterable: a Stopped handle starts again with a fresh run. On any
    /// exit from `run()` — normal return or failure — the handle reads
    /// Stopped before control returns to the caller.
    ///
    /// # Errors
    ///
    /// Propagates the transport's run failure; the state cleanup has
    /// already happened by then.
    pub async fn start(&self) -> Result<(), BackendError> {
        self.state.store(STATE_RUNNING, Ordering::SeqCst);
        let _guard = StopGuard {
            state: Arc::clone(&self.state),
        };
        let ctx = RunContext {
            state: Arc::clone(&self.state),
            inbound: self.inbound.clone(),
        };
        self.log(Level::INFO, "backend starting");
        let result = self.transport.run(ctx).await;
        self.log(Level::INFO, "backend stopped");
        result
    }

    /// Request the loop to wind down. Idempotent; safe to call from a
    /// different task than the one executing `run()`. Cooperative only —
    /// the loop notices on its next `is_running()` poll.
    pub fn stop(&self) {
        self.state.store(STATE_STOPPED, Ordering::SeqCst);
    }

    /// Deliver one outbound payload through the wrapped transport.
    ///
    /// # Errors
    ///
    /// Propagates the transport's send failure.
    pub async fn send(&self, payload: &OutboundPayload) -> Result<bool, BackendError> {
        self.transport.send(payload).await
    }

    /// Hand an inbound payload to the wrapped transport's receive hook.
    ///
    /// # Errors
    ///
    /// Propagates the transport's receive failure.
    pub async fn receive(&self, payload: &InboundPayload) -> Result<(), BackendError> {
        self.transport.receive(payload).await
    }

    /// Forward a line to the process-wide logging sink with the backend
    /// name attached. Fire and forget.
    pub fn log(&self, level: Level, message: &str) {
        let backend = self.transport.name();
        if level == Level::ERROR {
            tracing::error!(backend, "{message}");
        } else if level == Level::WARN {
            tracing::warn!(backend, "{message}");
        } else if level == Level::INFO {
            tracing::info!(backend, "{message}");
        } else if level == Level::DEBUG {
            tracing::debug!(backend, "{message}");
        } else {
            tracing::trace!(backend, "{message}");
        }
    }
}
