//! Location permission gate
//!
//! Turns the platform's permission state into a yes/no capability before any
//! position request. One variant per platform family, picked once at startup.
//! Gates never poll and never cache: every call may prompt again if the OS
//! lets it.

use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;

use super::{AuthorizationLevel, AuthorizationStatus, DeviceLocation, PermissionStatus, Platform};
use crate::notice::{Alert, AlertAction, NoticeDuration, Notifier};

pub const DENIED_NOTICE: &str = "Location permission denied by user.";
pub const REVOKED_NOTICE: &str = "Location permission revoked by user.";
pub const DENIED_ALERT: &str = "Location permission denied";
pub const DISABLED_ALERT: &str = "Turn on Location Services to allow to determine your location.";
pub const OPEN_SETTINGS_ACTION: &str = "Go to Settings";
pub const SKIP_LOCATION_ACTION: &str = "Don't Use Location";
pub const SETTINGS_FAILED_ALERT: &str = "Unable to open settings";

/// First API level with runtime permission prompts
const RUNTIME_PERMISSION_API_LEVEL: u32 = 23;

#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Whether location may be requested now. At most one prompt per call.
    async fn check_and_request(&self) -> bool;
}

/// Runtime-prompt platforms: check first, prompt only when not yet granted
pub struct PromptGate {
    device: Arc<dyn DeviceLocation>,
    notifier: Arc<dyn Notifier>,
}

impl PromptGate {
    pub fn new(device: Arc<dyn DeviceLocation>, notifier: Arc<dyn Notifier>) -> Self {
        Self { device, notifier }
    }
}

#[async_trait]
impl PermissionGate for PromptGate {
    async fn check_and_request(&self) -> bool {
        match self.device.check_permission().await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => warn!("Location permission check failed, prompting: {}", e),
        }

        match self.device.request_permission().await {
            Ok(PermissionStatus::Granted) => true,
            Ok(PermissionStatus::Denied) => {
                self.notifier.notice(DENIED_NOTICE, NoticeDuration::Long);
                false
            }
            Ok(PermissionStatus::NeverAskAgain) => {
                self.notifier.notice(REVOKED_NOTICE, NoticeDuration::Long);
                false
            }
            Err(e) => {
                warn!("Location permission request failed: {}", e);
                false
            }
        }
    }
}

/// Platforms with an OS authorization dialog
pub struct AuthorizationGate {
    device: Arc<dyn DeviceLocation>,
    notifier: Arc<dyn Notifier>,
}

impl AuthorizationGate {
    pub fn new(device: Arc<dyn DeviceLocation>, notifier: Arc<dyn Notifier>) -> Self {
        Self { device, notifier }
    }

    /// Offer a jump to system settings without waiting for the answer
    fn offer_settings(&self) {
        let device = self.device.clone();
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            let alert = Alert::new(DISABLED_ALERT, "")
                .with_action(AlertAction::new(OPEN_SETTINGS_ACTION))
                .with_action(AlertAction::new(SKIP_LOCATION_ACTION));

            if notifier.alert(alert).await == Some(0) {
                if let Err(e) = device.open_settings().await {
                    warn!("Failed to open location settings: {}", e);
                    notifier.alert(Alert::info(SETTINGS_FAILED_ALERT)).await;
                }
            }
        });
    }

    fn report_denied(&self) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            notifier.alert(Alert::info(DENIED_ALERT)).await;
        });
    }
}

#[async_trait]
impl PermissionGate for AuthorizationGate {
    async fn check_and_request(&self) -> bool {
        match self
            .device
            .request_authorization(AuthorizationLevel::WhenInUse)
            .await
        {
            Ok(AuthorizationStatus::Granted) => true,
            Ok(AuthorizationStatus::Denied) => {
                self.report_denied();
                false
            }
            Ok(AuthorizationStatus::Disabled) => {
                self.offer_settings();
                false
            }
            Ok(AuthorizationStatus::Restricted) => {
                info!("Location access is restricted on this device");
                false
            }
            Err(e) => {
                warn!("Location authorization request failed: {}", e);
                false
            }
        }
    }
}

/// Permission granted at install time; nothing to ask
#[derive(Debug, Default, Clone, Copy)]
pub struct InstallTimeGate;

#[async_trait]
impl PermissionGate for InstallTimeGate {
    async fn check_and_request(&self) -> bool {
        true
    }
}

/// Pick the gate for this platform
pub fn gate_for_platform(
    platform: Platform,
    device: Arc<dyn DeviceLocation>,
    notifier: Arc<dyn Notifier>,
) -> Arc<dyn PermissionGate> {
    match platform {
        Platform::Ios => Arc::new(AuthorizationGate::new(device, notifier)),
        Platform::Android { api_level } if api_level < RUNTIME_PERMISSION_API_LEVEL => {
            Arc::new(InstallTimeGate)
        }
        Platform::Android { .. } => Arc::new(PromptGate::new(device, notifier)),
        Platform::Desktop => Arc::new(InstallTimeGate),
    }
}
