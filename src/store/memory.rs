//! In-process event store
//!
//! Behaves like the remote collection: keys are assigned on add, every change
//! is pushed to each live subscription as a full snapshot, and a new
//! subscription immediately receives the current contents.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::assembler::{DocumentChange, SnapshotAssembler};
use super::{AuthProvider, AuthSession, EventStore, RemoteDocument, Snapshot, Subscription};
use crate::error::StoreError;
use crate::model::EventId;

#[derive(Default)]
struct Inner {
    documents: Mutex<SnapshotAssembler>,
    subscribers: DashMap<u64, mpsc::UnboundedSender<Snapshot>>,
    next_subscriber: AtomicU64,
    released: AtomicUsize,
    fail_writes: AtomicBool,
}

impl Inner {
    fn documents(&self) -> MutexGuard<'_, SnapshotAssembler> {
        // A panic while holding the lock cannot leave the assembler half-applied
        self.documents.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, snapshot: Snapshot) {
        crate::feed_trace!(
            "Memory store publishing {} documents to {} subscribers",
            snapshot.len(),
            self.subscribers.len()
        );
        self.subscribers
            .retain(|_, tx| tx.send(snapshot.clone()).is_ok());
    }
}

/// In-process backend, also used as the test double for the remote collection
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a change as if another client had written it
    pub fn apply(&self, change: DocumentChange) {
        // Publish under the lock so subscribers see snapshots in change order
        let mut docs = self.inner.documents();
        if docs.apply(change) {
            self.inner.publish(docs.snapshot());
        }
    }

    /// Push the current contents again without any change
    pub fn republish(&self) {
        let docs = self.inner.documents();
        self.inner.publish(docs.snapshot());
    }

    /// Make subsequent writes fail with [`StoreError::Rejected`]
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.documents().snapshot()
    }

    pub fn live_subscriptions(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// How many subscriptions have been released so far
    pub fn released_subscriptions(&self) -> usize {
        self.inner.released.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Rejected("writes disabled".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn add(&self, data: Map<String, Value>) -> Result<EventId, StoreError> {
        self.check_writable()?;
        let id = EventId::new(Uuid::new_v4().simple().to_string());
        self.apply(DocumentChange::Added(RemoteDocument::new(id.clone(), data)));
        Ok(id)
    }

    async fn delete(&self, id: &EventId) -> Result<(), StoreError> {
        self.check_writable()?;
        // Deleting a missing key succeeds, like the remote collection
        self.apply(DocumentChange::Removed(id.clone()));
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription, StoreError> {
        let key = self.inner.next_subscriber.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();

        // Hold the document lock so no change slips between the initial
        // snapshot and registration
        {
            let docs = self.inner.documents();
            tx.send(docs.snapshot()).map_err(|_| StoreError::Closed)?;
            self.inner.subscribers.insert(key, tx);
        }

        let inner = Arc::downgrade(&self.inner);
        Ok(Subscription::new(rx, move || {
            if let Some(inner) = inner.upgrade() {
                inner.subscribers.remove(&key);
                inner.released.fetch_add(1, Ordering::SeqCst);
            }
        }))
    }
}

#[async_trait]
impl AuthProvider for MemoryStore {
    async fn sign_in_anonymously(&self) -> Result<AuthSession, StoreError> {
        Ok(AuthSession {
            uid: format!("local-{}", Uuid::new_v4().simple()),
            signed_in_at: Utc::now(),
            expires_at: None,
        })
    }
}
