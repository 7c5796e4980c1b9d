//! Reading position persistence.
//!
//! Page changes are written through one background task so they land in
//! the order they were observed. The bridge never blocks the caller.

use crate::document::{Document, DocumentId};
use crate::playback::PageListener;
use crate::store::DocumentStore;
use anyhow::{Context, Result, anyhow};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct BridgeState {
    document: Option<DocumentId>,
    /// Value most recently queued for writing (debounce key).
    last_persisted: Option<usize>,
    /// Value most recently confirmed by the store.
    confirmed: Option<usize>,
    restoring: usize,
}

enum WriterMessage {
    Persist { document: DocumentId, page: usize },
    Flush(oneshot::Sender<()>),
}

pub struct PositionBridge<D> {
    store: Arc<D>,
    state: Arc<Mutex<BridgeState>>,
    writer: mpsc::UnboundedSender<WriterMessage>,
}

/// While alive, page changes are treated as part of a restore and never
/// written.
pub struct RestoreGuard<'a, D> {
    bridge: &'a PositionBridge<D>,
}

impl<D> Drop for RestoreGuard<'_, D> {
    fn drop(&mut self) {
        let mut state = lock_state(&self.bridge.state);
        state.restoring = state.restoring.saturating_sub(1);
    }
}

fn lock_state(state: &Mutex<BridgeState>) -> MutexGuard<'_, BridgeState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<D: DocumentStore> PositionBridge<D> {
    /// Create the bridge and spawn its writer task on the current runtime.
    pub fn spawn(store: Arc<D>) -> Arc<Self> {
        let (writer, inbox) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(BridgeState::default()));
        tokio::spawn(run_writer(Arc::clone(&store), Arc::clone(&state), inbox));
        Arc::new(Self {
            store,
            state,
            writer,
        })
    }

    pub fn store(&self) -> &Arc<D> {
        &self.store
    }

    pub fn document(&self) -> Option<DocumentId> {
        lock_state(&self.state).document
    }

    /// Bind the bridge to `document` and return the page to open on.
    ///
    /// The stored page is used when it lies within `page_count`; otherwise
    /// the first page. Restoring never writes.
    pub fn restore(&self, document: &Document, page_count: usize) -> usize {
        let mut state = lock_state(&self.state);
        state.document = document.id;
        state.last_persisted = document.last_page_index;
        state.confirmed = document.last_page_index;
        let page = document
            .last_page_index
            .filter(|page| *page < page_count)
            .unwrap_or(0);
        info!(
            document = ?document.id,
            saved = ?document.last_page_index,
            page = page + 1,
            "Restored reading position"
        );
        page
    }

    pub fn restoring(&self) -> RestoreGuard<'_, D> {
        lock_state(&self.state).restoring += 1;
        RestoreGuard { bridge: self }
    }

    /// Start persisting for a freshly saved document whose reader currently
    /// shows `page`. Nothing is written until the page changes.
    pub fn attach(&self, document: DocumentId, page: usize) {
        let mut state = lock_state(&self.state);
        state.document = Some(document);
        state.last_persisted = Some(page);
        state.confirmed = Some(page);
        debug!(%document, page = page + 1, "Position bridge attached");
    }

    /// Queue a write of `page` unless it matches the last persisted value,
    /// the document is unsaved, or a restore is in progress.
    pub fn on_page_changed(&self, page: usize) {
        let document = {
            let mut state = lock_state(&self.state);
            if state.restoring > 0 {
                return;
            }
            let Some(document) = state.document else {
                return;
            };
            if state.last_persisted == Some(page) {
                return;
            }
            state.last_persisted = Some(page);
            document
        };
        debug!(%document, page = page + 1, "Queueing reading position write");
        if self
            .writer
            .send(WriterMessage::Persist { document, page })
            .is_err()
        {
            warn!(%document, "Position writer is gone; dropping page update");
        }
    }

    /// Wait until every write queued before this call has been applied.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.writer.send(WriterMessage::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

impl<D: DocumentStore> PageListener for PositionBridge<D> {
    fn on_page_changed(&self, page: usize) {
        PositionBridge::on_page_changed(self, page);
    }
}

async fn run_writer<D: DocumentStore>(
    store: Arc<D>,
    state: Arc<Mutex<BridgeState>>,
    mut inbox: mpsc::UnboundedReceiver<WriterMessage>,
) {
    while let Some(message) = inbox.recv().await {
        match message {
            WriterMessage::Persist { document, page } => {
                let store = Arc::clone(&store);
                let written =
                    tokio::task::spawn_blocking(move || write_position(store.as_ref(), document, page))
                        .await
                        .map_err(|err| anyhow!("position writer task failed: {err}"))
                        .and_then(|result| result);
                let mut guard = lock_state(&state);
                match written {
                    Ok(()) => {
                        if guard.document == Some(document) {
                            guard.confirmed = Some(page);
                        }
                    }
                    Err(err) => {
                        warn!(%document, page = page + 1, "Failed to persist reading position: {err:?}");
                        if guard.document == Some(document) && guard.last_persisted == Some(page) {
                            guard.last_persisted = guard.confirmed;
                        }
                    }
                }
            }
            WriterMessage::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Position writer stopped");
}

fn write_position<D: DocumentStore>(store: &D, id: DocumentId, page: usize) -> Result<()> {
    store
        .set_last_page_index(id, page)
        .with_context(|| format!("writing page {} of document {id}", page + 1))
}
