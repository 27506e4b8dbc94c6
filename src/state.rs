// State management for the hazard map host

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::context::AppContext;
use crate::dialog::CategoryDialog;
use crate::presenter::MapPresenter;

/// Shared holder for the running context, managed by the host
pub struct AppState {
    /// Started application context; `None` until startup finished
    context: Arc<RwLock<Option<AppContext>>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            context: Arc::new(RwLock::new(None)),
        }
    }

    /// Install a started context, shutting down any previous one
    pub async fn init_context(&self, context: AppContext) {
        let previous = {
            let mut guard = self.context.write().await;
            guard.replace(context)
        };
        if let Some(previous) = previous {
            log::warn!("Replacing an already running context");
            previous.shutdown().await;
        }
    }

    pub async fn is_ready(&self) -> bool {
        self.context.read().await.is_some()
    }

    /// Get the presenter, if the context is running
    pub async fn presenter(&self) -> Option<Arc<MapPresenter>> {
        self.context.read().await.as_ref().map(|ctx| ctx.presenter())
    }

    /// Get the category dialog, if the context is running
    pub async fn dialog(&self) -> Option<Arc<CategoryDialog>> {
        self.context.read().await.as_ref().map(|ctx| ctx.dialog())
    }

    /// Take the context out and tear it down
    pub async fn shutdown(&self) {
        let context = self.context.write().await.take();
        if let Some(context) = context {
            context.shutdown().await;
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
