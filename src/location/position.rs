//! One-shot position fetch used to frame the map at startup

use chrono::Utc;
use std::sync::Arc;

use super::{DeviceLocation, PositionOptions};
use crate::error::PositionError;
use crate::model::Coordinate;

pub struct PositionProvider {
    device: Arc<dyn DeviceLocation>,
    options: PositionOptions,
}

impl PositionProvider {
    pub fn new(device: Arc<dyn DeviceLocation>, options: PositionOptions) -> Self {
        Self { device, options }
    }

    pub fn options(&self) -> &PositionOptions {
        &self.options
    }

    /// Current coordinates. Never retries.
    ///
    /// The timeout is enforced here as well as passed to the device, and a fix
    /// older than `maximum_age` is rejected even if the device hands it back.
    pub async fn get_current_position(&self) -> Result<Coordinate, PositionError> {
        let fix = tokio::time::timeout(
            self.options.timeout(),
            self.device.current_position(&self.options),
        )
        .await
        .map_err(|_| PositionError::Timeout)??;

        let age = Utc::now()
            .signed_duration_since(fix.timestamp)
            .to_std()
            .unwrap_or_default();
        if age > self.options.maximum_age() {
            return Err(PositionError::Unavailable(format!(
                "cached fix is {}ms old",
                age.as_millis()
            )));
        }

        Ok(fix.coordinate)
    }
}
