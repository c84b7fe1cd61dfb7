//! The router process: owns backend lifecycles and the inbound loop.
//!
//! One [`BackendHandle`] per configured transport, each driven in its own
//! long-lived tokio task. Inbound traffic funnels through a single mpsc
//! channel into [`Router::process_inbound`], which resolves the sending
//! address to a connection, logs the message, and hands the payload back to
//! the transport's receive hook. Outbound traffic enters through the
//! [`OutboundRouter`] seam. Restart policy for a failed backend stays with
//! the operator: the task logs the failure and does not respawn.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::backend::{BackendHandle, Inbound, InboundPayload, OutboundPayload, Transport};
use crate::extensions::{ExtensionRegistry, NewContact};
use crate::routing::dispatch::OutboundRouter;
use crate::routing::{resolver, RoutingError};
use crate::store::connections::{self, Connection};
use crate::store::contacts::{self, Contact};
use crate::store::messages::{self, DeliveryReport, Direction, NewMessage};
use crate::store::{backends, IdentityStore, StoreError};

/// Capacity of the transports -> router inbound channel.
const INBOUND_CHANNEL_CAPACITY: usize = 256;

/// Owns the backend handles and the inbound processing loop.
pub struct Router {
    store: Arc<IdentityStore>,
    extensions: ExtensionRegistry,
    handles: HashMap<String, Arc<BackendHandle>>,
    inbound_tx: mpsc::Sender<Inbound>,
    inbound_rx: Option<mpsc::Receiver<Inbound>>,
    tasks: Vec<JoinHandle<()>>,
    shutdown: Arc<Notify>,
}

impl Router {
    /// Create a router over the given store with no backends yet.
    ///
    /// The extension registry composed at process start applies to every
    /// contact created through this router.
    pub fn new(store: Arc<IdentityStore>, extensions: ExtensionRegistry) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        Self {
            store,
            extensions,
            handles: HashMap::new(),
            inbound_tx,
            inbound_rx: Some(inbound_rx),
            tasks: Vec::new(),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Create a contact, with the registered extensions applied.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::Store`] on store failure.
    pub async fn create_contact(&self, new: NewContact) -> Result<Contact, RoutingError> {
        let mut tx = self.store.begin().await?;
        let contact = contacts::create_with_extensions(&mut tx, &self.extensions, new).await?;
        tx.commit().await.map_err(StoreError::from)?;
        Ok(contact)
    }

    /// Wrap a transport in a lifecycle handle and register it.
    pub fn register(&mut self, transport: Arc<dyn Transport>) -> Arc<BackendHandle> {
        let handle = Arc::new(BackendHandle::new(transport, self.inbound_tx.clone()));
        self.handles
            .insert(handle.name().to_owned(), Arc::clone(&handle));
        handle
    }

    /// The handle registered under a backend name, if any.
    pub fn handle(&self, name: &str) -> Option<&Arc<BackendHandle>> {
        self.handles.get(name)
    }

    /// Ensure a `backends` row per registered transport and spawn each
    /// transport's run loop as its own task.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::Store`] if a backend row cannot be ensured.
    pub async fn start(&mut self) -> Result<(), RoutingError> {
        {
            let mut tx = self.store.begin().await?;
            for name in self.handles.keys() {
                backends::ensure(&mut tx, name).await?;
            }
            tx.commit().await.map_err(StoreError::from)?;
        }

        for handle in self.handles.values() {
            let handle = Arc::clone(handle);
            let task = tokio::spawn(async move {
                info!(backend = handle.name(), "backend task starting");
                if let Err(e) = handle.start().await {
                    error!(backend = handle.name(), error = %e, "backend run failed");
                }
            });
            self.tasks.push(task);
        }
        Ok(())
    }

    /// Process inbound traffic until shutdown is requested or every
    /// transport sender is gone.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::Store`] if the store becomes unusable;
    /// per-payload failures are logged and skipped.
    pub async fn process_inbound(&mut self) -> Result<(), RoutingError> {
        let Some(rx) = self.inbound_rx.as_mut() else {
            return Ok(());
        };
        loop {
            tokio::select! {
                inbound = rx.recv() => match inbound {
                    Some(Inbound::Message(payload)) => {
                        let handle = self.handles.get(&payload.backend).cloned();
                        if let Err(e) = handle_incoming(&self.store, handle.as_deref(), &payload).await {
                            warn!(
                                backend = %payload.backend,
                                identity = %payload.identity,
                                error = %e,
                                "dropping inbound payload"
                            );
                        }
                    }
                    Some(Inbound::Report(report)) => {
                        if let Err(e) = record_report(&self.store, &report).await {
                            warn!(report_id = %report.report_id, error = %e, "dropping delivery report");
                        }
                    }
                    None => break,
                },
                () = self.shutdown.notified() => break,
            }
        }
        Ok(())
    }

    /// Stop every backend and wait for their tasks to finish.
    pub async fn stop(&mut self) {
        for handle in self.handles.values() {
            handle.stop();
        }
        self.shutdown.notify_waiters();
        self.shutdown.notify_one();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "backend task join failed");
            }
        }
        info!("router stopped");
    }
}

/// Resolve an inbound payload to its connection, log it, and hand it to the
/// transport's receive hook.
///
/// A first-seen address gets a contactless connection; binding it to a
/// contact is a later, explicit `resolve_or_steal` on behalf of whoever
/// claims it.
async fn handle_incoming(
    store: &IdentityStore,
    handle: Option<&BackendHandle>,
    payload: &InboundPayload,
) -> Result<(), RoutingError> {
    let mut tx = store.begin().await?;
    let backend = backends::get(&mut tx, &payload.backend).await?;
    let connection =
        match connections::get_by_address(&mut tx, backend.id, &payload.identity).await? {
            Some(existing) => existing,
            None => resolver::create_connection(&mut tx, backend.id, &payload.identity, None).await?,
        };
    let logged = messages::save(
        &mut tx,
        &NewMessage {
            contact_id: None,
            connection_id: Some(connection.id),
            direction: Direction::Incoming,
            date: payload.received_at,
            text: payload.text.clone(),
        },
    )
    .await?;
    tx.commit().await.map_err(StoreError::from)?;
    info!(
        message_id = logged.id,
        backend = %payload.backend,
        identity = %payload.identity,
        "incoming message logged"
    );

    if let Some(handle) = handle {
        handle.receive(payload).await?;
    }
    Ok(())
}

/// Append a gateway delivery report.
async fn record_report(store: &IdentityStore, report: &DeliveryReport) -> Result<(), RoutingError> {
    let mut conn = store.pool().acquire().await.map_err(StoreError::from)?;
    messages::add_delivery_report(&mut conn, report).await?;
    Ok(())
}

#[async_trait]
impl OutboundRouter for Router {
    async fn submit(&self, connection: &Connection, text: &str) -> Result<bool, RoutingError> {
        let backend_name = {
            let mut conn = self.store.pool().acquire().await.map_err(StoreError::from)?;
            backends::name_of(&mut conn, connection.backend_id).await?
        };
        let handle = self
            .handles
            .get(&backend_name)
            .filter(|handle| handle.is_running())
            .ok_or_else(|| RoutingError::NoRouter(backend_name.clone()))?;

        let payload = OutboundPayload {
            id: Uuid::new_v4(),
            backend: backend_name,
            identity: connection.identity.clone(),
            text: text.to_owned(),
        };
        Ok(handle.send(&payload).await?)
    }
}
