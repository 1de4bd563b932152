//! Moves updates between a store and its transport.
//!
//! Two tasks per component: the outbound task drains the store's queue
//! onto the transport, the receive loop decodes incoming buffers and
//! applies them. Once both run, one Get is sent for every pre-get
//! pattern so a fresh replica does not wait for the next publish.

use crate::{Applied, LocalStore, Update};
use arbor_codec::Wire;
use arbor_transport::{Transport, TransportError};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Running replication tasks of one store
pub struct Replicator {
    outbound: JoinHandle<()>,
    inbound: JoinHandle<()>,
}

impl Replicator {
    /// Attach the store's outbound queue, spawn both tasks and issue the
    /// startup Gets
    pub fn start(
        store: Arc<LocalStore>,
        transport: Arc<dyn Transport>,
        cancel: CancellationToken,
    ) -> Self {
        let queue = store.attach_outbound();
        info!(
            store = %store.name(),
            address = %transport.address(),
            pre_get = store.policy().pre_get.len(),
            "replicator starting"
        );

        let outbound = tokio::spawn(send_loop(
            store.name().to_string(),
            queue,
            Arc::clone(&transport),
            cancel.clone(),
        ));
        let inbound = tokio::spawn(receive_loop(Arc::clone(&store), transport, cancel));

        for pattern in &store.policy().pre_get {
            debug!(store = %store.name(), %pattern, "requesting initial state");
            store.request(pattern);
        }

        Self { outbound, inbound }
    }

    /// Wait for both tasks to finish after cancellation
    pub async fn join(self) {
        for (task, handle) in [("outbound", self.outbound), ("inbound", self.inbound)] {
            if let Err(e) = handle.await {
                warn!(task, error = %e, "replication task panicked");
            }
        }
    }
}

async fn send_loop(
    name: String,
    mut queue: mpsc::UnboundedReceiver<Update>,
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
) {
    loop {
        let update = tokio::select! {
            () = cancel.cancelled() => break,
            next = queue.recv() => match next {
                Some(update) => update,
                None => break,
            },
        };
        send_one(&name, transport.as_ref(), &update).await;
    }

    // Flush what was queued before cancellation
    while let Ok(update) = queue.try_recv() {
        send_one(&name, transport.as_ref(), &update).await;
    }
    debug!(store = %name, "outbound task stopped");
}

async fn send_one(name: &str, transport: &dyn Transport, update: &Update) {
    let bytes = match update.to_wire() {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(store = %name, path = %update.path, error = %e, "cannot encode update");
            return;
        }
    };
    if let Err(e) = transport.send(Bytes::from(bytes)).await {
        warn!(
            store = %name,
            command = %update.command,
            path = %update.path,
            error = %e,
            "send failed"
        );
    }
}

async fn receive_loop(
    store: Arc<LocalStore>,
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            () = cancel.cancelled() => break,
            received = transport.recv() => received,
        };

        let bytes = match received {
            Ok(bytes) => bytes,
            Err(TransportError::Closed) => {
                info!(store = %store.name(), "transport closed");
                break;
            }
            Err(e) => {
                warn!(store = %store.name(), error = %e, "receive failed");
                continue;
            }
        };

        let update = match Update::from_wire(&bytes) {
            Ok(update) => update,
            Err(e) => {
                store.record_malformed();
                warn!(store = %store.name(), error = %e, "dropping malformed update");
                continue;
            }
        };

        let (command, path, origin) = (update.command, update.path.clone(), update.origin.clone());
        match store.apply_remote(update) {
            Ok(Applied::Stored) => {
                debug!(store = %store.name(), %command, %path, %origin, "applied")
            }
            Ok(_) => {}
            Err(e) => warn!(
                store = %store.name(),
                %command,
                %path,
                %origin,
                error = %e,
                "update rejected"
            ),
        }
    }
    debug!(store = %store.name(), "receive loop stopped");
}
