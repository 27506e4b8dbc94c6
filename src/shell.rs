//! Tauri plugin exposing the map core to a webview frontend
//!
//! The frontend draws [`MapView`] snapshots pushed through `map-view-changed`
//! and answers prompts through commands. Prompts the core raises (category
//! picker, alerts, position requests) are emitted as events and parked in a
//! [`PromptSlot`] until the matching `resolve_*` command arrives.
//!
//! Host usage: `tauri::Builder::default().plugin(hazard_map_lib::shell::init(config))`,
//! with `hazard-map:default` granted in the host's capability file. The build
//! script generates one `allow-<command>` permission per command below.

use async_trait::async_trait;
use log::{error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use tauri::plugin::{Builder, TauriPlugin};
use tauri::{AppHandle, Emitter, Manager, Runtime, State};

use crate::config::AppConfig;
use crate::context::{AppContext, Collaborators};
use crate::dialog::{CategoryDialog, PromptSlot};
use crate::error::{PlatformError, PositionError};
use crate::interaction::{CreateOutcome, DeleteOutcome};
use crate::location::{
    AuthorizationLevel, AuthorizationStatus, DeviceLocation, PermissionStatus, Position,
    PositionOptions,
};
use crate::model::{Coordinate, EventId};
use crate::notice::{Alert, NoticeDuration, Notifier};
use crate::presenter::{MapPresenter, MapView};
use crate::state::AppState;
use crate::store::Backend;

/// Pending frontend answers
#[derive(Default)]
pub struct ShellPrompts {
    alert: PromptSlot<usize>,
    position: PromptSlot<Result<Position, String>>,
}

#[derive(Debug, Clone, Serialize)]
struct NoticePayload<'a> {
    message: &'a str,
    duration: NoticeDuration,
}

#[derive(Debug, Clone, Serialize)]
struct CategoryDialogPayload {
    visible: bool,
    title: &'static str,
    options: &'static [crate::model::CategoryOption],
}

/// Notices and alerts rendered by the webview
struct WebviewNotifier<R: Runtime> {
    app: AppHandle<R>,
    prompts: Arc<ShellPrompts>,
}

#[async_trait]
impl<R: Runtime> Notifier for WebviewNotifier<R> {
    fn notice(&self, message: &str, duration: NoticeDuration) {
        if let Err(e) = self.app.emit("notice", NoticePayload { message, duration }) {
            warn!("Failed to emit notice: {}", e);
        }
    }

    async fn alert(&self, alert: Alert) -> Option<usize> {
        if let Err(e) = self.app.emit("alert", &alert) {
            warn!("Failed to emit alert: {}", e);
            return None;
        }
        match self.prompts.alert.show().await {
            Ok(choice) => choice,
            Err(e) => {
                warn!("Alert '{}' not shown: {}", alert.title, e);
                None
            }
        }
    }
}

/// Position from the webview's geolocation API. The browser runs its own
/// permission prompt, so the permission calls here report "granted".
struct WebviewLocation<R: Runtime> {
    app: AppHandle<R>,
    prompts: Arc<ShellPrompts>,
}

#[async_trait]
impl<R: Runtime> DeviceLocation for WebviewLocation<R> {
    async fn check_permission(&self) -> Result<bool, PlatformError> {
        Ok(true)
    }

    async fn request_permission(&self) -> Result<PermissionStatus, PlatformError> {
        Ok(PermissionStatus::Granted)
    }

    async fn request_authorization(
        &self,
        _level: AuthorizationLevel,
    ) -> Result<AuthorizationStatus, PlatformError> {
        Ok(AuthorizationStatus::Granted)
    }

    async fn current_position(&self, options: &PositionOptions) -> Result<Position, PositionError> {
        self.app
            .emit("position-request", options)
            .map_err(|e| PositionError::Other(e.to_string()))?;

        match self.prompts.position.show().await {
            Ok(Some(Ok(position))) => Ok(position),
            Ok(Some(Err(message))) => Err(PositionError::Unavailable(message)),
            Ok(None) => Err(PositionError::PermissionDenied),
            Err(e) => Err(PositionError::Other(e.to_string())),
        }
    }

    async fn open_settings(&self) -> Result<(), PlatformError> {
        self.app
            .emit("open-settings", ())
            .map_err(|e| PlatformError::new(e.to_string()))
    }
}

// ============== Commands ==============

async fn presenter(state: &AppState) -> Result<Arc<MapPresenter>, String> {
    state.presenter().await.ok_or_else(|| "Map is not ready".to_string())
}

async fn dialog(state: &AppState) -> Result<Arc<CategoryDialog>, String> {
    state.dialog().await.ok_or_else(|| "Map is not ready".to_string())
}

#[tauri::command]
async fn get_map_view(state: State<'_, AppState>) -> Result<MapView, String> {
    Ok(presenter(&state).await?.render())
}

/// Resolves once the category dialog has been answered
#[tauri::command]
async fn long_press(
    latitude: f64,
    longitude: f64,
    state: State<'_, AppState>,
) -> Result<CreateOutcome, String> {
    let presenter = presenter(&state).await?;
    Ok(presenter
        .on_long_press(Coordinate::new(latitude, longitude))
        .await)
}

#[tauri::command]
async fn callout_press(id: String, state: State<'_, AppState>) -> Result<DeleteOutcome, String> {
    let presenter = presenter(&state).await?;
    Ok(presenter.on_callout_press(&EventId::new(id)).await)
}

#[tauri::command]
async fn select_category(index: usize, state: State<'_, AppState>) -> Result<bool, String> {
    Ok(dialog(&state).await?.select(index))
}

#[tauri::command]
async fn dismiss_category(state: State<'_, AppState>) -> Result<bool, String> {
    Ok(dialog(&state).await?.dismiss())
}

#[tauri::command]
async fn toggle_legend(state: State<'_, AppState>) -> Result<bool, String> {
    Ok(presenter(&state).await?.toggle_legend())
}

#[tauri::command]
fn resolve_alert(choice: Option<usize>, prompts: State<'_, Arc<ShellPrompts>>) -> bool {
    prompts.alert.resolve(choice)
}

#[tauri::command]
fn resolve_position(
    latitude: Option<f64>,
    longitude: Option<f64>,
    accuracy: Option<f64>,
    error: Option<String>,
    prompts: State<'_, Arc<ShellPrompts>>,
) -> bool {
    let answer = match (latitude, longitude, error) {
        (_, _, Some(message)) => Some(Err(message)),
        (Some(latitude), Some(longitude), None) => Some(Ok(Position {
            coordinate: Coordinate::new(latitude, longitude),
            accuracy,
            timestamp: chrono::Utc::now(),
        })),
        // No fix and no error: the user refused
        _ => None,
    };
    prompts.position.resolve(answer)
}

// ============== Plugin ==============

/// Build the plugin. Startup runs in the background; commands answer
/// "Map is not ready" until the context is up.
pub fn init<R: Runtime>(config: AppConfig) -> TauriPlugin<R> {
    Builder::new("hazard-map")
        .invoke_handler(tauri::generate_handler![
            get_map_view,
            long_press,
            callout_press,
            select_category,
            dismiss_category,
            toggle_legend,
            resolve_alert,
            resolve_position,
        ])
        .setup(move |app, _api| {
            let prompts = Arc::new(ShellPrompts::default());
            app.manage(AppState::new());
            app.manage(prompts.clone());

            let app = app.clone();
            tauri::async_runtime::spawn(async move {
                if let Err(e) = start(app, config, prompts).await {
                    error!("Hazard map failed to start: {:#}", e);
                }
            });
            Ok(())
        })
        .on_drop(|app| {
            if let Some(prompts) = app.try_state::<Arc<ShellPrompts>>() {
                prompts.alert.close();
                prompts.position.close();
            }
            if let Some(state) = app.try_state::<AppState>() {
                tauri::async_runtime::block_on(state.shutdown());
            }
        })
        .build()
}

async fn start<R: Runtime>(
    app: AppHandle<R>,
    config: AppConfig,
    prompts: Arc<ShellPrompts>,
) -> anyhow::Result<()> {
    let backend = Backend::open(&config)?;
    let collaborators = Collaborators::new(
        backend,
        Arc::new(WebviewLocation {
            app: app.clone(),
            prompts: prompts.clone(),
        }),
        Arc::new(WebviewNotifier {
            app: app.clone(),
            prompts,
        }),
    );

    let ctx = AppContext::start(&config, collaborators).await?;
    let presenter = ctx.presenter();
    let dialog = ctx.dialog();
    app.state::<AppState>().init_context(ctx).await;
    info!("Hazard map started");

    forward_changes(&app, &presenter, &dialog).await;
    Ok(())
}

/// Push view and dialog changes to the frontend until the feed ends
async fn forward_changes<R: Runtime>(
    app: &AppHandle<R>,
    presenter: &MapPresenter,
    dialog: &CategoryDialog,
) {
    let mut feed = presenter.watch_feed();
    let mut region = presenter.watch_region();
    let mut dialog_visible = dialog.watch_visibility();

    emit_view(app, presenter);
    loop {
        tokio::select! {
            changed = feed.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = region.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = dialog_visible.changed() => {
                if changed.is_err() {
                    break;
                }
                let payload = CategoryDialogPayload {
                    visible: *dialog_visible.borrow_and_update(),
                    title: dialog.title(),
                    options: dialog.options(),
                };
                if let Err(e) = app.emit("category-dialog", payload) {
                    warn!("Failed to emit category dialog: {}", e);
                }
                continue;
            }
        }
        emit_view(app, presenter);
    }
    info!("Stopped forwarding map changes");
}

fn emit_view<R: Runtime>(app: &AppHandle<R>, presenter: &MapPresenter) {
    if let Err(e) = app.emit("map-view-changed", presenter.render()) {
        warn!("Failed to emit map view: {}", e);
    }
}
