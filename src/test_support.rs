//! Scripted collaborators for unit tests

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{PlatformError, PositionError};
use crate::location::{
    AuthorizationLevel, AuthorizationStatus, DeviceLocation, PermissionStatus, Position,
    PositionOptions,
};
use crate::model::Coordinate;
use crate::notice::{Alert, NoticeDuration, Notifier};

pub const DEVICE_FIX: Coordinate = Coordinate {
    latitude: -23.55,
    longitude: -46.63,
};

/// Poll `check` every few milliseconds until it holds or `limit` passes
pub async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) {
    tokio::time::timeout(limit, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCalls {
    pub check_permission: usize,
    pub request_permission: usize,
    pub request_authorization: usize,
    pub current_position: usize,
    pub open_settings: usize,
}

pub struct ScriptedDevice {
    already_granted: bool,
    prompt_result: PermissionStatus,
    authorization: AuthorizationStatus,
    position: Option<Result<Position, PositionError>>,
    position_delay: Option<Duration>,
    calls: Mutex<DeviceCalls>,
}

impl ScriptedDevice {
    fn new(already_granted: bool, prompt_result: PermissionStatus, authorization: AuthorizationStatus) -> Self {
        Self {
            already_granted,
            prompt_result,
            authorization,
            position: None,
            position_delay: None,
            calls: Mutex::new(DeviceCalls::default()),
        }
    }

    /// Everything granted; fixes at [`DEVICE_FIX`]
    pub fn granted() -> Self {
        Self::new(true, PermissionStatus::Granted, AuthorizationStatus::Granted)
    }

    /// Not yet granted; the prompt answers `status`
    pub fn prompting(status: PermissionStatus) -> Self {
        Self::new(false, status, AuthorizationStatus::Granted)
    }

    /// The authorization dialog answers `status`
    pub fn authorizing(status: AuthorizationStatus) -> Self {
        Self::new(false, PermissionStatus::Granted, status)
    }

    pub fn with_position(mut self, position: Result<Position, PositionError>) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_position_delay(mut self, delay: Duration) -> Self {
        self.position_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> DeviceCalls {
        *self.calls.lock().unwrap()
    }

    pub async fn wait_for_settings(&self, limit: Duration) {
        eventually(limit, || self.calls().open_settings > 0).await;
    }

    fn record(&self, f: impl FnOnce(&mut DeviceCalls)) {
        f(&mut self.calls.lock().unwrap());
    }
}

#[async_trait]
impl DeviceLocation for ScriptedDevice {
    async fn check_permission(&self) -> Result<bool, PlatformError> {
        self.record(|c| c.check_permission += 1);
        Ok(self.already_granted)
    }

    async fn request_permission(&self) -> Result<PermissionStatus, PlatformError> {
        self.record(|c| c.request_permission += 1);
        Ok(self.prompt_result)
    }

    async fn request_authorization(
        &self,
        _level: AuthorizationLevel,
    ) -> Result<AuthorizationStatus, PlatformError> {
        self.record(|c| c.request_authorization += 1);
        Ok(self.authorization)
    }

    async fn current_position(&self, _options: &PositionOptions) -> Result<Position, PositionError> {
        self.record(|c| c.current_position += 1);
        if let Some(delay) = self.position_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.position {
            Some(scripted) => scripted.clone(),
            None => Ok(Position::now(DEVICE_FIX)),
        }
    }

    async fn open_settings(&self) -> Result<(), PlatformError> {
        self.record(|c| c.open_settings += 1);
        Ok(())
    }
}

/// Notifier that records what it was asked to show
#[derive(Default)]
pub struct RecordingNotifier {
    answer: Option<usize>,
    notices: Mutex<Vec<String>>,
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingNotifier {
    /// Dismisses every alert
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answering(index: usize) -> Self {
        Self {
            answer: Some(index),
            ..Self::default()
        }
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }

    pub async fn wait_for_alerts(&self, count: usize, limit: Duration) {
        eventually(limit, || self.alerts.lock().unwrap().len() >= count).await;
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn notice(&self, message: &str, _duration: NoticeDuration) {
        self.notices.lock().unwrap().push(message.to_string());
    }

    async fn alert(&self, alert: Alert) -> Option<usize> {
        self.alerts.lock().unwrap().push(alert);
        self.answer
    }
}
