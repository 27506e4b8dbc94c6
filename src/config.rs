//! Application configuration
//!
//! JSON file plus a few environment overrides. A missing file means defaults:
//! the in-process backend and the stock San Francisco viewport.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::location::{Platform, PositionOptions};
use crate::model::Region;
use crate::store::FirestoreConfig;

pub const CONFIG_PATH_ENV: &str = "HAZARD_MAP_CONFIG";
pub const BACKEND_ENV: &str = "HAZARD_MAP_BACKEND";
pub const PROJECT_ID_ENV: &str = "FIREBASE_PROJECT_ID";
pub const API_KEY_ENV: &str = "FIREBASE_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Memory,
    Firestore(FirestoreConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Memory
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendConfig,
    /// Remote collection holding the events
    pub collection: String,
    pub default_region: Region,
    pub position: PositionOptions,
    pub platform: Platform,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            collection: "events".to_string(),
            default_region: Region::default(),
            position: PositionOptions::default(),
            platform: Platform::default(),
        }
    }
}

impl AppConfig {
    /// `$HAZARD_MAP_CONFIG`, else `<config dir>/hazard-map/config.json`
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hazard-map")
            .join("config.json")
    }

    /// Load from the default path and apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::default_path())?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load a config file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config {:?}", path))?;
        log::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Apply overrides from a key lookup (the environment in production)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        match lookup(BACKEND_ENV).as_deref() {
            Some("memory") => self.backend = BackendConfig::Memory,
            Some("firestore") => {
                if !matches!(self.backend, BackendConfig::Firestore(_)) {
                    self.backend = BackendConfig::Firestore(FirestoreConfig::default());
                }
            }
            Some(other) => log::warn!("Unknown backend '{}' in {}, ignoring", other, BACKEND_ENV),
            None => {}
        }

        if let BackendConfig::Firestore(firestore) = &mut self.backend {
            if let Some(project_id) = lookup(PROJECT_ID_ENV) {
                firestore.project_id = project_id;
            }
            if let Some(api_key) = lookup(API_KEY_ENV) {
                firestore.api_key = api_key;
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let raw = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, raw).with_context(|| format!("Failed to write config {:?}", path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.json")).unwrap();

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.collection, "events");
        assert_eq!(config.position.timeout_ms, 15_000);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "backend": { "kind": "firestore", "project_id": "hazards-demo" },
                "platform": { "os": "android", "api_level": 30 }
            }"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        let BackendConfig::Firestore(firestore) = &config.backend else {
            panic!("expected firestore backend");
        };
        assert_eq!(firestore.project_id, "hazards-demo");
        assert_eq!(firestore.database, "(default)");
        assert_eq!(config.platform, Platform::Android { api_level: 30 });
        assert_eq!(config.default_region, Region::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = AppConfig::default();
        config.platform = Platform::Ios;

        config.save_to(&path).unwrap();
        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (BACKEND_ENV, "firestore"),
            (PROJECT_ID_ENV, "from-env"),
            (API_KEY_ENV, "secret"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        let BackendConfig::Firestore(firestore) = &config.backend else {
            panic!("expected firestore backend");
        };
        assert_eq!(firestore.project_id, "from-env");
        assert_eq!(firestore.api_key, "secret");
    }
}
