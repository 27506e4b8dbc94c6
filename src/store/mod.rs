//! Remote document store seam
//!
//! The map core only needs add-by-value, delete-by-key and a live feed of
//! full collection snapshots. Backends implement [`EventStore`] and
//! [`AuthProvider`]; everything above them is backend-agnostic.

pub mod assembler;
pub mod firestore;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::{AppConfig, BackendConfig};
use crate::error::StoreError;
use crate::model::EventId;

pub use assembler::{DocumentChange, SnapshotAssembler};
pub use firestore::{FirestoreConfig, FirestoreStore};
pub use memory::MemoryStore;

/// A document as the backend holds it: key plus raw fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub id: EventId,
    pub data: Map<String, Value>,
}

impl RemoteDocument {
    pub fn new(id: EventId, data: Map<String, Value>) -> Self {
        Self { id, data }
    }
}

/// The full current contents of a collection, in backend order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub documents: Vec<RemoteDocument>,
}

impl Snapshot {
    pub fn new(documents: Vec<RemoteDocument>) -> Self {
        Self { documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// A live snapshot feed. Released exactly once, by `unsubscribe` or on drop.
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<Snapshot>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<Snapshot>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            receiver,
            release: Some(Box::new(release)),
        }
    }

    /// Next snapshot, or `None` once the backend side has gone away
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.receiver.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if let Some(release) = self.release.take() {
            self.receiver.close();
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_once();
    }
}

/// The remote "events" collection
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Backend name for logs
    fn backend_name(&self) -> &'static str;

    /// Add a document; the backend assigns and returns its key
    async fn add(&self, data: Map<String, Value>) -> Result<EventId, StoreError>;

    /// Delete a document by key
    async fn delete(&self, id: &EventId) -> Result<(), StoreError>;

    /// Open a live feed. The first snapshot reflects the collection as it is now.
    async fn subscribe(&self) -> Result<Subscription, StoreError>;
}

/// Anonymous identity for the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub uid: String,
    pub signed_in_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in_anonymously(&self) -> Result<AuthSession, StoreError>;
}

/// Store and auth collaborators for one backend
#[derive(Clone)]
pub struct Backend {
    pub store: Arc<dyn EventStore>,
    pub auth: Arc<dyn AuthProvider>,
}

impl Backend {
    /// Connect to the backend named in the configuration
    pub fn open(config: &AppConfig) -> Result<Self, StoreError> {
        match &config.backend {
            BackendConfig::Memory => {
                let store = Arc::new(MemoryStore::new());
                Ok(Self {
                    store: store.clone(),
                    auth: store,
                })
            }
            BackendConfig::Firestore(firestore) => {
                let store = Arc::new(FirestoreStore::new(firestore.clone(), &config.collection)?);
                Ok(Self {
                    store: store.clone(),
                    auth: store,
                })
            }
        }
    }
}
