//! Event feed
//!
//! Holds the one live subscription to the events collection and turns every
//! snapshot into a fresh [`MarkerSet`]. The feed is the only writer of the
//! marker set; nothing is patched in place and nothing is inserted
//! optimistically. Marker order is whatever order the backend delivers.

use log::{error, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;
use crate::model::{EventFields, EventRecord, MarkerSet};
use crate::store::{EventStore, Snapshot, Subscription};

/// What the map renders from
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct FeedState {
    /// Set by the first snapshot and never cleared
    pub loaded: bool,
    pub markers: MarkerSet,
    /// Bumped whenever `markers` or `loaded` changes
    pub revision: u64,
}

/// Translate a snapshot into markers: identity plus stored fields.
/// Documents whose fields do not decode are skipped.
pub fn translate(snapshot: &Snapshot) -> MarkerSet {
    let records = snapshot.documents.iter().filter_map(|doc| {
        match EventFields::from_document(&doc.data) {
            Ok(fields) => Some(EventRecord {
                id: doc.id.clone(),
                fields,
            }),
            Err(e) => {
                warn!("Skipping malformed event document {}: {}", doc.id, e);
                None
            }
        }
    });
    MarkerSet::from_records(records)
}

pub struct EventFeed {
    state: watch::Receiver<FeedState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl EventFeed {
    /// Subscribe to the store and start translating snapshots
    pub async fn start(store: &dyn EventStore) -> Result<Self, StoreError> {
        let subscription = store.subscribe().await?;
        info!("Event feed subscribed to {} store", store.backend_name());

        let (tx, rx) = watch::channel(FeedState::default());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_feed(subscription, tx, cancel.clone()));

        Ok(Self {
            state: rx,
            cancel,
            task: Some(task),
        })
    }

    pub fn state(&self) -> watch::Receiver<FeedState> {
        self.state.clone()
    }

    pub fn current(&self) -> FeedState {
        self.state.borrow().clone()
    }

    /// Release the subscription and wait for the feed task to finish
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Event feed task failed: {}", e);
            }
        }
    }
}

impl Drop for EventFeed {
    fn drop(&mut self) {
        // The task releases the subscription on its way out
        self.cancel.cancel();
    }
}

async fn run_feed(
    mut subscription: Subscription,
    tx: watch::Sender<FeedState>,
    cancel: CancellationToken,
) {
    loop {
        let snapshot = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = subscription.next() => match next {
                Some(snapshot) => snapshot,
                None => {
                    warn!("Event feed closed by the backend");
                    break;
                }
            },
        };

        let markers = translate(&snapshot);
        crate::feed_trace!("Snapshot with {} documents -> {} markers", snapshot.len(), markers.len());

        tx.send_if_modified(|state| {
            if state.loaded && state.markers == markers {
                return false;
            }
            state.loaded = true;
            state.markers = markers;
            state.revision += 1;
            true
        });
    }

    subscription.unsubscribe();
    info!("Event feed subscription released");
}
