//! Device location collaborator
//!
//! The platform shell implements [`DeviceLocation`]; the core only decides
//! when to ask and what to do with the answer.

pub mod permission;
pub mod position;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{PlatformError, PositionError};
use crate::model::Coordinate;

pub use permission::{gate_for_platform, AuthorizationGate, InstallTimeGate, PermissionGate, PromptGate};
pub use position::PositionProvider;

/// Result of a runtime permission prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// Denied with "don't ask again"; further prompts are suppressed by the OS
    NeverAskAgain,
}

/// Result of an OS authorization dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    Granted,
    Denied,
    /// Location services are switched off device-wide
    Disabled,
    Restricted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationLevel {
    WhenInUse,
    Always,
}

/// Host platform, decides which permission gate is used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "os", rename_all = "snake_case")]
pub enum Platform {
    Android { api_level: u32 },
    Ios,
    Desktop,
}

impl Default for Platform {
    fn default() -> Self {
        Platform::Desktop
    }
}

/// Options for a one-shot position request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout_ms: u64,
    /// Cached fixes older than this are not reused
    pub maximum_age_ms: u64,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout_ms: 15_000,
            maximum_age_ms: 10_000,
        }
    }
}

impl PositionOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn maximum_age(&self) -> Duration {
        Duration::from_millis(self.maximum_age_ms)
    }
}

/// A position fix from the device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub coordinate: Coordinate,
    /// Horizontal accuracy in meters, when known
    pub accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Position {
    pub fn now(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            accuracy: None,
            timestamp: Utc::now(),
        }
    }
}

/// Location capabilities of the host device
#[async_trait]
pub trait DeviceLocation: Send + Sync {
    /// Whether the runtime location permission is already granted
    async fn check_permission(&self) -> Result<bool, PlatformError>;

    /// Prompt for the runtime location permission
    async fn request_permission(&self) -> Result<PermissionStatus, PlatformError>;

    /// Show the OS authorization dialog
    async fn request_authorization(
        &self,
        level: AuthorizationLevel,
    ) -> Result<AuthorizationStatus, PlatformError>;

    async fn current_position(&self, options: &PositionOptions) -> Result<Position, PositionError>;

    /// Deep-link into the system location settings
    async fn open_settings(&self) -> Result<(), PlatformError>;
}

/// Device without positioning hardware (headless hosts)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLocation;

#[async_trait]
impl DeviceLocation for NoLocation {
    async fn check_permission(&self) -> Result<bool, PlatformError> {
        Ok(false)
    }

    async fn request_permission(&self) -> Result<PermissionStatus, PlatformError> {
        Ok(PermissionStatus::Denied)
    }

    async fn request_authorization(
        &self,
        _level: AuthorizationLevel,
    ) -> Result<AuthorizationStatus, PlatformError> {
        Ok(AuthorizationStatus::Disabled)
    }

    async fn current_position(&self, _options: &PositionOptions) -> Result<Position, PositionError> {
        Err(PositionError::Unavailable("no positioning hardware".to_string()))
    }

    async fn open_settings(&self) -> Result<(), PlatformError> {
        Err(PlatformError::new("no system settings on this host"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_defaults() {
        let options = PositionOptions::default();
        assert!(options.high_accuracy);
        assert_eq!(options.timeout(), Duration::from_secs(15));
        assert_eq!(options.maximum_age(), Duration::from_secs(10));
    }

    #[test]
    fn test_platform_serialization() {
        let platform: Platform = serde_json::from_str(r#"{"os":"android","api_level":22}"#).unwrap();
        assert_eq!(platform, Platform::Android { api_level: 22 });

        let json = serde_json::to_string(&Platform::Ios).unwrap();
        assert_eq!(json, r#"{"os":"ios"}"#);
    }
}
