//! Interaction controller
//!
//! Turns map gestures into writes against the events collection. Results are
//! never applied locally: the feed brings them back. Failed writes are logged
//! and not retried.

use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::Arc;

use crate::dialog::SelectionDialog;
use crate::error::DialogError;
use crate::model::{Coordinate, EventFields, EventId, EventRecord};
use crate::notice::{Alert, AlertAction, Notifier};
use crate::store::EventStore;

pub const DELETE_TITLE: &str = "Aviso";
pub const DELETE_MESSAGE: &str = "Deseja excluir o marcador?";
pub const DELETE_CANCEL: &str = "Cancelar";
pub const DELETE_CONFIRM: &str = "Excluir";

/// Index of the confirm action in the delete alert
const CONFIRM_INDEX: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "id", rename_all = "snake_case")]
pub enum CreateOutcome {
    /// Write accepted; the marker arrives with a later snapshot
    Submitted(EventId),
    /// Dialog dismissed, nothing written
    Dismissed,
    /// The category dialog was already up
    Busy,
    /// The dialog was torn down before an answer, nothing written
    Closed,
    /// Write failed and was logged
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    Cancelled,
    /// The marker is not in the current set
    NotFound,
    Failed,
}

pub fn delete_confirmation() -> Alert {
    Alert::new(DELETE_TITLE, DELETE_MESSAGE)
        .with_action(AlertAction::cancel(DELETE_CANCEL))
        .with_action(AlertAction::new(DELETE_CONFIRM))
}

pub struct InteractionController {
    store: Arc<dyn EventStore>,
    dialog: Arc<dyn SelectionDialog>,
    notifier: Arc<dyn Notifier>,
}

impl InteractionController {
    pub fn new(
        store: Arc<dyn EventStore>,
        dialog: Arc<dyn SelectionDialog>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            dialog,
            notifier,
        }
    }

    /// Long-press: ask for a category, then add the event at `at`
    pub async fn create(&self, at: Coordinate) -> CreateOutcome {
        let option = match self.dialog.show().await {
            Ok(Some(option)) => option,
            Ok(None) => {
                debug!("Category dialog dismissed, nothing to create");
                return CreateOutcome::Dismissed;
            }
            Err(DialogError::AlreadyVisible) => {
                warn!("Category dialog already visible, ignoring long-press");
                return CreateOutcome::Busy;
            }
            Err(DialogError::Closed) => {
                debug!("Category dialog closed without an answer");
                return CreateOutcome::Closed;
            }
        };

        let fields = EventFields::new(&option, at);
        match self.store.add(fields.to_document()).await {
            Ok(id) => {
                info!(
                    "Reported '{}' at ({}, {}) as {}",
                    fields.value, fields.latitude, fields.longitude, id
                );
                CreateOutcome::Submitted(id)
            }
            Err(e) => {
                error!("Failed to create event: {}", e);
                CreateOutcome::Failed
            }
        }
    }

    /// Callout press: confirm, then delete the marker's document
    pub async fn delete(&self, record: &EventRecord) -> DeleteOutcome {
        if self.notifier.alert(delete_confirmation()).await != Some(CONFIRM_INDEX) {
            debug!("Delete of {} cancelled", record.id);
            return DeleteOutcome::Cancelled;
        }

        match self.store.delete(&record.id).await {
            Ok(()) => {
                info!("Deleted event {}", record.id);
                DeleteOutcome::Deleted
            }
            Err(e) => {
                error!("Failed to delete event {}: {}", record.id, e);
                DeleteOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::CategoryDialog;
    use crate::model::CATEGORY_OPTIONS;
    use crate::store::{DocumentChange, MemoryStore, RemoteDocument};
    use crate::test_support::RecordingNotifier;

    struct Fixture {
        store: MemoryStore,
        dialog: Arc<CategoryDialog>,
        controller: Arc<InteractionController>,
    }

    fn fixture(notifier: RecordingNotifier) -> Fixture {
        let store = MemoryStore::new();
        let dialog = Arc::new(CategoryDialog::new());
        let controller = Arc::new(InteractionController::new(
            Arc::new(store.clone()),
            dialog.clone(),
            Arc::new(notifier),
        ));
        Fixture {
            store,
            dialog,
            controller,
        }
    }

    fn stored_record(store: &MemoryStore) -> EventRecord {
        let fields = EventFields::new(&CATEGORY_OPTIONS[0], Coordinate::new(1.0, 2.0));
        let id = EventId::new("existing");
        store.apply(DocumentChange::Added(RemoteDocument::new(id.clone(), fields.to_document())));
        EventRecord { id, fields }
    }

    async fn answer_dialog(dialog: &CategoryDialog, pick: Option<usize>) {
        dialog.watch_visibility().wait_for(|v| *v).await.unwrap();
        match pick {
            Some(index) => assert!(dialog.select(index)),
            None => assert!(dialog.dismiss()),
        }
    }

    #[tokio::test]
    async fn test_create_writes_chosen_category() {
        let f = fixture(RecordingNotifier::new());
        let at = Coordinate::new(-22.9, -43.2);

        let create = tokio::spawn({
            let controller = f.controller.clone();
            async move { controller.create(at).await }
        });
        answer_dialog(&f.dialog, Some(2)).await;

        let CreateOutcome::Submitted(id) = create.await.unwrap() else {
            panic!("expected a submitted create");
        };
        let snapshot = f.store.snapshot();
        assert_eq!(snapshot.len(), 1);
        let doc = &snapshot.documents[0];
        assert_eq!(doc.id, id);
        let fields = EventFields::from_document(&doc.data).unwrap();
        assert_eq!(fields, EventFields::new(&CATEGORY_OPTIONS[2], at));
    }

    #[tokio::test]
    async fn test_dismissed_dialog_writes_nothing() {
        let f = fixture(RecordingNotifier::new());
        let create = tokio::spawn({
            let controller = f.controller.clone();
            async move { controller.create(Coordinate::new(0.0, 0.0)).await }
        });
        answer_dialog(&f.dialog, None).await;

        assert_eq!(create.await.unwrap(), CreateOutcome::Dismissed);
        assert!(f.store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_create_failure_is_not_retried() {
        let f = fixture(RecordingNotifier::new());
        f.store.set_fail_writes(true);

        let create = tokio::spawn({
            let controller = f.controller.clone();
            async move { controller.create(Coordinate::new(0.0, 0.0)).await }
        });
        answer_dialog(&f.dialog, Some(0)).await;

        assert_eq!(create.await.unwrap(), CreateOutcome::Failed);
        f.store.set_fail_writes(false);
        assert!(f.store.snapshot().is_empty());
        assert!(!f.dialog.is_visible());
    }

    #[tokio::test]
    async fn test_second_create_while_picking_is_busy() {
        let f = fixture(RecordingNotifier::new());
        let first = tokio::spawn({
            let controller = f.controller.clone();
            async move { controller.create(Coordinate::new(0.0, 0.0)).await }
        });
        f.dialog.watch_visibility().wait_for(|v| *v).await.unwrap();

        assert_eq!(f.controller.create(Coordinate::new(1.0, 1.0)).await, CreateOutcome::Busy);
        assert!(f.dialog.dismiss());
        assert_eq!(first.await.unwrap(), CreateOutcome::Dismissed);
    }

    #[tokio::test]
    async fn test_closed_dialog_is_not_busy() {
        let f = fixture(RecordingNotifier::new());
        let create = tokio::spawn({
            let controller = f.controller.clone();
            async move { controller.create(Coordinate::new(0.0, 0.0)).await }
        });
        f.dialog.watch_visibility().wait_for(|v| *v).await.unwrap();
        f.dialog.close();

        assert_eq!(create.await.unwrap(), CreateOutcome::Closed);
        assert!(f.store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_delete_confirmed() {
        let notifier = RecordingNotifier::answering(1);
        let f = fixture(notifier);
        let record = stored_record(&f.store);

        assert_eq!(f.controller.delete(&record).await, DeleteOutcome::Deleted);
        assert!(f.store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_delete_cancelled_or_dismissed() {
        for notifier in [RecordingNotifier::answering(0), RecordingNotifier::new()] {
            let f = fixture(notifier);
            let record = stored_record(&f.store);

            assert_eq!(f.controller.delete(&record).await, DeleteOutcome::Cancelled);
            assert_eq!(f.store.snapshot().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_delete_shows_confirmation_texts() {
        let store = MemoryStore::new();
        let notifier = Arc::new(RecordingNotifier::new());
        let controller = InteractionController::new(
            Arc::new(store.clone()),
            Arc::new(CategoryDialog::new()),
            notifier.clone(),
        );
        let record = stored_record(&store);

        controller.delete(&record).await;
        let alert = &notifier.alerts()[0];
        assert_eq!(alert.title, DELETE_TITLE);
        assert_eq!(alert.message, DELETE_MESSAGE);
        let actions: Vec<&str> = alert.actions.iter().map(|a| a.text.as_str()).collect();
        assert_eq!(actions, vec![DELETE_CANCEL, DELETE_CONFIRM]);
    }

    #[tokio::test]
    async fn test_delete_failure_logged() {
        let f = fixture(RecordingNotifier::answering(1));
        let record = stored_record(&f.store);
        f.store.set_fail_writes(true);

        assert_eq!(f.controller.delete(&record).await, DeleteOutcome::Failed);
        assert_eq!(f.store.snapshot().len(), 1);
    }
}
