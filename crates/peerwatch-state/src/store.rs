//! InterfaceConfigStore: per-interface monitoring settings with
//! write-through persistence to the settings file.
//!
//! Every mutation happens under a single write lock and is saved before the
//! lock is released, so readers never observe a half-applied update. When
//! saving fails the in-memory value is kept and the error is returned to
//! the caller.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::error::{StateError, StateResult};
use crate::names::validate_interface;
use crate::settings::SettingsFile;
use crate::types::{
    ConfigUpdate, InterfaceHealthConfig, PING_INTERVAL_MIN, clamp_keepalive, clamp_ping_interval,
};

/// Section name prefix for interface settings.
const SECTION_PREFIX: &str = "Health:";

struct Inner {
    configs: HashMap<String, InterfaceHealthConfig>,
    settings: SettingsFile,
}

/// Thread-safe store of `InterfaceHealthConfig` entries.
#[derive(Clone)]
pub struct InterfaceConfigStore {
    inner: Arc<RwLock<Inner>>,
}

impl InterfaceConfigStore {
    /// Open the store, loading every `Health:<interface>` section.
    pub fn open(path: &Path) -> StateResult<Self> {
        let settings = SettingsFile::open(path)?;
        let mut configs = HashMap::new();

        for section in settings.section_names() {
            let Some(interface) = section.strip_prefix(SECTION_PREFIX) else {
                continue;
            };
            if validate_interface(interface).is_err() {
                warn!(%section, "ignoring health section with invalid interface name");
                continue;
            }
            let cfg = read_section(&settings, section);
            info!(
                %interface,
                enabled = cfg.enabled,
                interval = cfg.ping_interval,
                "loaded health config"
            );
            configs.insert(interface.to_string(), cfg);
        }

        Ok(Self {
            inner: Arc::new(RwLock::new(Inner { configs, settings })),
        })
    }

    /// Return the config for `interface`, materialising and persisting the
    /// defaults on first access.
    pub async fn get_or_init(&self, interface: &str) -> StateResult<InterfaceHealthConfig> {
        validate_interface(interface)?;

        if let Some(cfg) = self.inner.read().await.configs.get(interface) {
            return Ok(*cfg);
        }

        let mut inner = self.inner.write().await;
        if let Some(cfg) = inner.configs.get(interface) {
            return Ok(*cfg);
        }
        let cfg = InterfaceHealthConfig::default();
        inner.configs.insert(interface.to_string(), cfg);
        if let Err(e) = persist(&mut inner.settings, interface, &cfg) {
            error!(%interface, error = %e, "failed to persist default health config");
        }
        Ok(cfg)
    }

    /// Apply a partial update and persist it.
    ///
    /// The new value takes effect in memory even when persisting fails;
    /// in that case the error is returned.
    pub async fn update(
        &self,
        interface: &str,
        update: &ConfigUpdate,
    ) -> StateResult<InterfaceHealthConfig> {
        validate_interface(interface)?;

        let mut inner = self.inner.write().await;
        let cfg = inner.configs.entry(interface.to_string()).or_default();
        update.apply(cfg);
        let cfg = *cfg;

        persist(&mut inner.settings, interface, &cfg)?;
        info!(
            %interface,
            enabled = cfg.enabled,
            interval = cfg.ping_interval,
            keepalive = cfg.keepalive_value,
            "updated health config"
        );
        Ok(cfg)
    }

    /// Shortest probe interval among enabled interfaces, or `fallback` if
    /// none is enabled. Never shorter than `PING_INTERVAL_MIN`.
    pub async fn next_interval(&self, fallback: Duration) -> Duration {
        self.inner
            .read()
            .await
            .configs
            .values()
            .filter(|cfg| cfg.enabled)
            .map(|cfg| Duration::from_secs(cfg.ping_interval as u64))
            .min()
            .unwrap_or(fallback)
            .max(Duration::from_secs(PING_INTERVAL_MIN as u64))
    }
}

fn read_section(settings: &SettingsFile, section: &str) -> InterfaceHealthConfig {
    let mut cfg = InterfaceHealthConfig::default();

    if let Some(v) = settings.get(section, "enabled") {
        cfg.enabled = parse_bool(v);
    }
    if let Some(v) = settings.get(section, "ping_interval") {
        match v.trim().parse::<i64>() {
            Ok(secs) => cfg.ping_interval = clamp_ping_interval(secs),
            Err(_) => warn!(%section, value = %v, "invalid ping_interval, using default"),
        }
    }
    if let Some(v) = settings.get(section, "set_keepalive") {
        cfg.set_keepalive = parse_bool(v);
    }
    if let Some(v) = settings.get(section, "keepalive_value") {
        match v.trim().parse::<i64>() {
            Ok(secs) => cfg.keepalive_value = clamp_keepalive(secs),
            Err(_) => warn!(%section, value = %v, "invalid keepalive_value, using default"),
        }
    }
    cfg
}

fn parse_bool(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

fn persist(
    settings: &mut SettingsFile,
    interface: &str,
    cfg: &InterfaceHealthConfig,
) -> Result<(), StateError> {
    let section = format!("{SECTION_PREFIX}{interface}");
    settings.set(&section, "enabled", bool_str(cfg.enabled));
    settings.set(&section, "ping_interval", &cfg.ping_interval.to_string());
    settings.set(&section, "set_keepalive", bool_str(cfg.set_keepalive));
    settings.set(&section, "keepalive_value", &cfg.keepalive_value.to_string());
    settings.save()
}

fn bool_str(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(contents: Option<&str>) -> (tempfile::TempDir, InterfaceConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.ini");
        if let Some(text) = contents {
            std::fs::write(&path, text).unwrap();
        }
        let store = InterfaceConfigStore::open(&path).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn loads_and_clamps_existing_sections() {
        let (_dir, store) = store_with(Some(
            "[Server]\nport = 1\n\n[Health:wg0]\nenabled = False\nping_interval = 5\n\
             set_keepalive = true\nkeepalive_value = 500\n",
        ));
        let cfg = store.get_or_init("wg0").await.unwrap();
        assert!(!cfg.enabled);
        assert_eq!(cfg.ping_interval, 10);
        assert!(cfg.set_keepalive);
        assert_eq!(cfg.keepalive_value, 120);
    }

    #[tokio::test]
    async fn malformed_number_keeps_default() {
        let (_dir, store) = store_with(Some("[Health:wg0]\nping_interval = soon\n"));
        let cfg = store.get_or_init("wg0").await.unwrap();
        assert_eq!(cfg.ping_interval, 30);
    }

    #[tokio::test]
    async fn first_access_persists_defaults() {
        let (dir, store) = store_with(None);
        let cfg = store.get_or_init("wg1").await.unwrap();
        assert_eq!(cfg, InterfaceHealthConfig::default());

        let saved = SettingsFile::open(&dir.path().join("settings.ini")).unwrap();
        assert_eq!(saved.get("Health:wg1", "ping_interval"), Some("30"));
        assert_eq!(saved.get("Health:wg1", "enabled"), Some("true"));
    }

    #[tokio::test]
    async fn update_clamps_and_persists() {
        let (dir, store) = store_with(Some("[Server]\nport = 1\n"));
        let update = ConfigUpdate {
            ping_interval: Some(1),
            keepalive_value: Some(999),
            ..Default::default()
        };
        let cfg = store.update("wg0", &update).await.unwrap();
        assert_eq!(cfg.ping_interval, 10);
        assert_eq!(cfg.keepalive_value, 120);

        let reopened = InterfaceConfigStore::open(&dir.path().join("settings.ini")).unwrap();
        assert_eq!(reopened.get_or_init("wg0").await.unwrap(), cfg);
        let saved = SettingsFile::open(&dir.path().join("settings.ini")).unwrap();
        assert_eq!(saved.get("Server", "port"), Some("1"));
    }

    #[tokio::test]
    async fn update_rejects_invalid_interface() {
        let (_dir, store) = store_with(None);
        let err = store
            .update("wg0]\n[evil", &ConfigUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::InvalidInterface(_)));
    }

    #[tokio::test]
    async fn failed_save_still_applies_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("settings.ini");
        let store = InterfaceConfigStore::open(&path).unwrap();

        let update = ConfigUpdate {
            enabled: Some(false),
            ..Default::default()
        };
        assert!(matches!(
            store.update("wg0", &update).await,
            Err(StateError::Write(_))
        ));
        assert!(!store.get_or_init("wg0").await.unwrap().enabled);
    }

    #[tokio::test]
    async fn next_interval_uses_shortest_enabled() {
        let (_dir, store) = store_with(None);
        let fallback = Duration::from_secs(30);
        assert_eq!(store.next_interval(fallback).await, fallback);

        let set = |secs, enabled| ConfigUpdate {
            enabled: Some(enabled),
            ping_interval: Some(secs),
            ..Default::default()
        };
        store.update("wg0", &set(120, true)).await.unwrap();
        store.update("wg1", &set(15, false)).await.unwrap();
        store.update("wg2", &set(45, true)).await.unwrap();
        assert_eq!(store.next_interval(fallback).await, Duration::from_secs(45));
    }

    #[tokio::test]
    async fn zero_fallback_is_raised_to_minimum() {
        let (_dir, store) = store_with(None);
        assert_eq!(
            store.next_interval(Duration::ZERO).await,
            Duration::from_secs(PING_INTERVAL_MIN as u64)
        );
    }
}
