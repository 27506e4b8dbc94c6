//! Application context
//!
//! Created once at startup and torn down on shutdown. Starts three
//! independent jobs: anonymous sign-in, permission check plus one-shot
//! position fetch, and the event feed. None waits on another, so the first
//! fix may land before or after the first snapshot.

use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::dialog::CategoryDialog;
use crate::error::StoreError;
use crate::feed::EventFeed;
use crate::interaction::InteractionController;
use crate::location::{gate_for_platform, DeviceLocation, PermissionGate, PositionProvider};
use crate::notice::Notifier;
use crate::presenter::MapPresenter;
use crate::store::{AuthProvider, AuthSession, Backend, EventStore};

/// External collaborators the context is wired to
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn EventStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub device: Arc<dyn DeviceLocation>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    pub fn new(
        backend: Backend,
        device: Arc<dyn DeviceLocation>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store: backend.store,
            auth: backend.auth,
            device,
            notifier,
        }
    }
}

pub struct AppContext {
    presenter: Arc<MapPresenter>,
    dialog: Arc<CategoryDialog>,
    session: Arc<RwLock<Option<AuthSession>>>,
    feed: Option<EventFeed>,
    startup: Vec<JoinHandle<()>>,
}

impl AppContext {
    /// Wire everything up and start the three startup jobs
    pub async fn start(config: &AppConfig, collaborators: Collaborators) -> Result<Self, StoreError> {
        let Collaborators {
            store,
            auth,
            device,
            notifier,
        } = collaborators;

        let session = Arc::new(RwLock::new(None));
        let sign_in = tokio::spawn(sign_in(auth, session.clone()));

        let feed = EventFeed::start(store.as_ref()).await?;

        let dialog = Arc::new(CategoryDialog::new());
        let controller = Arc::new(InteractionController::new(
            store,
            dialog.clone(),
            notifier.clone(),
        ));
        let presenter = Arc::new(MapPresenter::new(
            config.default_region,
            feed.state(),
            controller,
        ));

        let gate = gate_for_platform(config.platform, device.clone(), notifier);
        let provider = PositionProvider::new(device, config.position);
        let locate = tokio::spawn({
            let presenter = presenter.clone();
            async move {
                locate(gate.as_ref(), &provider, &presenter).await;
            }
        });

        info!("Application context started");
        Ok(Self {
            presenter,
            dialog,
            session,
            feed: Some(feed),
            startup: vec![sign_in, locate],
        })
    }

    pub fn presenter(&self) -> Arc<MapPresenter> {
        self.presenter.clone()
    }

    pub fn dialog(&self) -> Arc<CategoryDialog> {
        self.dialog.clone()
    }

    pub async fn session(&self) -> Option<AuthSession> {
        self.session.read().await.clone()
    }

    /// Wait for sign-in and initial framing to settle (used by hosts and tests)
    pub async fn settle(&mut self) {
        for job in self.startup.drain(..) {
            if let Err(e) = job.await {
                error!("Startup job failed: {}", e);
            }
        }
    }

    /// Stop unfinished startup jobs, release the feed subscription and
    /// close any open prompt
    pub async fn shutdown(mut self) {
        self.dialog.close();
        for job in self.startup.drain(..) {
            job.abort();
            match job.await {
                Err(e) if !e.is_cancelled() => error!("Startup job failed: {}", e),
                _ => {}
            }
        }
        if let Some(feed) = self.feed.take() {
            feed.close().await;
        }
        info!("Application context shut down");
    }
}

async fn sign_in(auth: Arc<dyn AuthProvider>, session: Arc<RwLock<Option<AuthSession>>>) {
    match auth.sign_in_anonymously().await {
        Ok(signed_in) => {
            info!("Anonymous session {}", signed_in.uid);
            *session.write().await = Some(signed_in);
        }
        Err(e) => warn!("Anonymous sign-in failed: {}", e),
    }
}

/// Frame the map on the device position if the gate allows it.
/// Any failure keeps the default region.
pub async fn locate(gate: &dyn PermissionGate, provider: &PositionProvider, presenter: &MapPresenter) -> bool {
    if !gate.check_and_request().await {
        info!("Location not available, keeping default region");
        return false;
    }

    match provider.get_current_position().await {
        Ok(at) => presenter.frame_initial_position(at),
        Err(e) => {
            warn!("Failed to get current position: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PositionError;
    use crate::interaction::{CreateOutcome, DeleteOutcome};
    use crate::location::{PermissionStatus, Platform};
    use crate::model::{Coordinate, EventFields, EventId, Region, CATEGORY_OPTIONS};
    use crate::presenter::MapView;
    use crate::store::{DocumentChange, MemoryStore, RemoteDocument};
    use crate::test_support::{eventually, RecordingNotifier, ScriptedDevice, DEVICE_FIX};
    use std::time::Duration;

    fn android() -> AppConfig {
        AppConfig {
            platform: Platform::Android { api_level: 33 },
            ..AppConfig::default()
        }
    }

    fn collaborators(store: &MemoryStore, device: Arc<ScriptedDevice>, notifier: Arc<RecordingNotifier>) -> Collaborators {
        Collaborators {
            store: Arc::new(store.clone()),
            auth: Arc::new(store.clone()),
            device,
            notifier,
        }
    }

    #[tokio::test]
    async fn test_startup_frames_region_and_signs_in() {
        let store = MemoryStore::new();
        let device = Arc::new(ScriptedDevice::granted());
        let mut ctx = AppContext::start(&android(), collaborators(&store, device, Arc::new(RecordingNotifier::new())))
            .await
            .unwrap();
        ctx.settle().await;

        assert_eq!(ctx.presenter().region().center(), DEVICE_FIX);
        assert!(ctx.session().await.is_some());
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_denied_permission_skips_position() {
        let store = MemoryStore::new();
        let device = Arc::new(ScriptedDevice::prompting(PermissionStatus::Denied));
        let mut ctx = AppContext::start(&android(), collaborators(&store, device.clone(), Arc::new(RecordingNotifier::new())))
            .await
            .unwrap();
        ctx.settle().await;

        assert_eq!(device.calls().current_position, 0);
        let region = ctx.presenter().region();
        assert_eq!(region, Region::default());
        assert_eq!(
            (region.latitude, region.longitude, region.latitude_delta, region.longitude_delta),
            (37.78825, -122.4324, 0.015, 0.0121)
        );
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_position_failure_keeps_default_region() {
        let store = MemoryStore::new();
        let device = Arc::new(ScriptedDevice::granted().with_position(Err(PositionError::Unavailable("no fix".into()))));
        let mut ctx = AppContext::start(&android(), collaborators(&store, device.clone(), Arc::new(RecordingNotifier::new())))
            .await
            .unwrap();
        ctx.settle().await;

        assert_eq!(device.calls().current_position, 1);
        assert_eq!(ctx.presenter().region(), Region::default());
        ctx.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_fix_after_first_snapshot() {
        let store = MemoryStore::new();
        let device = Arc::new(ScriptedDevice::granted().with_position_delay(Duration::from_secs(2)));
        let mut ctx = AppContext::start(&android(), collaborators(&store, device, Arc::new(RecordingNotifier::new())))
            .await
            .unwrap();
        let presenter = ctx.presenter();

        assert!(presenter.wait_until_loaded().await);
        assert_eq!(presenter.region(), Region::default());
        assert!(matches!(presenter.render(), MapView::Ready { .. }));

        // The fix lands later and only moves the viewport
        ctx.settle().await;
        let MapView::Ready { region, pins, .. } = presenter.render() else {
            panic!("expected a ready map");
        };
        assert_eq!(region.center(), Coordinate::new(DEVICE_FIX.latitude, DEVICE_FIX.longitude));
        assert!(pins.is_empty());
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_create_then_observe() {
        let store = MemoryStore::new();
        let mut ctx = AppContext::start(&AppConfig::default(), collaborators(&store, Arc::new(ScriptedDevice::granted()), Arc::new(RecordingNotifier::new())))
            .await
            .unwrap();
        ctx.settle().await;
        let presenter = ctx.presenter();
        let dialog = ctx.dialog();
        presenter.wait_until_loaded().await;
        let mut feed = presenter.watch_feed();
        feed.borrow_and_update();

        let at = Coordinate::new(-22.95, -43.21);
        let create = tokio::spawn({
            let presenter = presenter.clone();
            async move { presenter.on_long_press(at).await }
        });
        dialog.watch_visibility().wait_for(|v| *v).await.unwrap();
        dialog.select(1);

        let CreateOutcome::Submitted(id) = create.await.unwrap() else {
            panic!("expected a submitted create");
        };
        feed.changed().await.unwrap();
        let markers = presenter.markers();
        assert_eq!(markers.len(), 1);
        let record = markers.get(&id).unwrap();
        assert_eq!(record.fields, EventFields::new(&CATEGORY_OPTIONS[1], at));
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_delete_then_observe() {
        let store = MemoryStore::new();
        let fields = EventFields::new(&CATEGORY_OPTIONS[0], Coordinate::new(1.0, 1.0));
        store.apply(DocumentChange::Added(RemoteDocument::new(EventId::new("x"), fields.to_document())));
        store.apply(DocumentChange::Added(RemoteDocument::new(EventId::new("y"), fields.to_document())));

        let notifier = Arc::new(RecordingNotifier::answering(1));
        let ctx = AppContext::start(&AppConfig::default(), collaborators(&store, Arc::new(ScriptedDevice::granted()), notifier))
            .await
            .unwrap();
        let presenter = ctx.presenter();
        presenter.wait_until_loaded().await;
        let mut feed = presenter.watch_feed();
        feed.borrow_and_update();

        assert_eq!(presenter.on_callout_press(&EventId::new("x")).await, DeleteOutcome::Deleted);
        feed.changed().await.unwrap();

        let markers = presenter.markers();
        assert!(!markers.contains(&EventId::new("x")));
        assert!(markers.contains(&EventId::new("y")));
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancelled_delete_changes_nothing() {
        let store = MemoryStore::new();
        let fields = EventFields::new(&CATEGORY_OPTIONS[0], Coordinate::new(1.0, 1.0));
        store.apply(DocumentChange::Added(RemoteDocument::new(EventId::new("x"), fields.to_document())));

        let notifier = Arc::new(RecordingNotifier::answering(0));
        let ctx = AppContext::start(&AppConfig::default(), collaborators(&store, Arc::new(ScriptedDevice::granted()), notifier))
            .await
            .unwrap();
        let presenter = ctx.presenter();
        presenter.wait_until_loaded().await;
        let before = presenter.watch_feed().borrow().clone();

        assert_eq!(presenter.on_callout_press(&EventId::new("x")).await, DeleteOutcome::Cancelled);
        tokio::task::yield_now().await;

        assert_eq!(store.snapshot().len(), 1);
        assert_eq!(presenter.watch_feed().borrow().clone(), before);
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_pending_locate() {
        let store = MemoryStore::new();
        let device = Arc::new(ScriptedDevice::granted().with_position_delay(Duration::from_secs(3600)));
        let ctx = AppContext::start(&android(), collaborators(&store, device.clone(), Arc::new(RecordingNotifier::new())))
            .await
            .unwrap();
        eventually(Duration::from_secs(1), || device.calls().current_position == 1).await;

        ctx.shutdown().await;
        // The locate job held the gate and provider, both sharing the device
        assert_eq!(Arc::strong_count(&device), 1);
    }

    #[tokio::test]
    async fn test_shutdown_releases_feed_once() {
        let store = MemoryStore::new();
        let ctx = AppContext::start(&AppConfig::default(), collaborators(&store, Arc::new(ScriptedDevice::granted()), Arc::new(RecordingNotifier::new())))
            .await
            .unwrap();
        let presenter = ctx.presenter();
        presenter.wait_until_loaded().await;
        let mut feed = presenter.watch_feed();
        feed.borrow_and_update();
        assert_eq!(store.live_subscriptions(), 1);

        ctx.shutdown().await;
        assert_eq!(store.live_subscriptions(), 0);
        assert_eq!(store.released_subscriptions(), 1);

        let fields = EventFields::new(&CATEGORY_OPTIONS[0], Coordinate::new(1.0, 1.0));
        store.apply(DocumentChange::Added(RemoteDocument::new(EventId::new("late"), fields.to_document())));
        assert!(!feed.has_changed().unwrap_or(false));
        assert!(presenter.markers().is_empty());
    }
}
