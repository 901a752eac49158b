//! Configuration sources and the cache in front of them.

use std::{
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::SystemTime,
};

use arc_swap::ArcSwapOption;

use super::{EngineConfig, EngineConfigBuilder, SettingsError};
use crate::{config::ConfigLoader, models::NotificationsSettings};

/// Where raw notification settings come from.
#[cfg_attr(test, mockall::automock)]
pub trait SettingsSource: Send + Sync {
    /// Reads the current settings.
    fn load(&self) -> Result<NotificationsSettings, SettingsError>;

    /// A marker that changes whenever the settings change; `None` when the
    /// source cannot tell.
    fn version(&self) -> Option<SystemTime>;
}

/// Settings read from a YAML file.
#[derive(Debug, Clone)]
pub struct FileSettingsSource {
    loader: ConfigLoader,
}

impl FileSettingsSource {
    /// Reads settings from the file at `path`.
    pub fn new(path: PathBuf) -> Self {
        Self { loader: ConfigLoader::new(path) }
    }
}

impl SettingsSource for FileSettingsSource {
    fn load(&self) -> Result<NotificationsSettings, SettingsError> {
        tracing::debug!(path = %self.loader.path().display(), "Loading notification settings");
        Ok(self.loader.load()?)
    }

    fn version(&self) -> Option<SystemTime> {
        self.loader.modified().ok()
    }
}

/// Fixed, in-memory settings.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings(pub NotificationsSettings);

impl SettingsSource for StaticSettings {
    fn load(&self) -> Result<NotificationsSettings, SettingsError> {
        Ok(self.0.clone())
    }

    fn version(&self) -> Option<SystemTime> {
        None
    }
}

/// Hands out the current engine configuration.
#[cfg_attr(test, mockall::automock)]
pub trait ConfigProvider: Send + Sync {
    /// The current configuration.
    fn get_config(&self) -> Result<Arc<EngineConfig>, SettingsError>;
}

/// A [`ConfigProvider`] that builds the configuration once and reuses it
/// until invalidated.
///
/// Readers only load an atomic pointer. A rebuild happens on the first read
/// after [`invalidate`](Self::invalidate), under a mutex so concurrent readers
/// trigger a single rebuild. When a rebuild fails the previous configuration
/// stays active.
pub struct CachedConfigProvider {
    source: Box<dyn SettingsSource>,
    builder: EngineConfigBuilder,
    current: ArcSwapOption<EngineConfig>,
    stale: AtomicBool,
    generation: AtomicU64,
    rebuild_lock: Mutex<()>,
    last_version: Mutex<Option<SystemTime>>,
}

impl CachedConfigProvider {
    /// Creates a provider; nothing is built until the first read.
    pub fn new(source: Box<dyn SettingsSource>, builder: EngineConfigBuilder) -> Self {
        let version = source.version();
        Self {
            source,
            builder,
            current: ArcSwapOption::empty(),
            stale: AtomicBool::new(true),
            generation: AtomicU64::new(0),
            rebuild_lock: Mutex::new(()),
            last_version: Mutex::new(version),
        }
    }

    /// Marks the cached configuration as outdated.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.stale.store(true, Ordering::Release);
    }

    /// Clears the stale flag, unless an invalidation arrived after
    /// `generation` was read.
    fn mark_fresh(&self, generation: u64) {
        self.stale.store(false, Ordering::Release);
        if self.generation.load(Ordering::Acquire) != generation {
            self.stale.store(true, Ordering::Release);
        }
    }

    /// Invalidates the cache if the source reports a new version. Returns
    /// whether it did.
    pub fn poll_changes(&self) -> bool {
        let version = self.source.version();
        let Ok(mut last_version) = self.last_version.lock() else {
            return false;
        };
        if version.is_none() || *last_version == version {
            return false;
        }
        *last_version = version;
        drop(last_version);

        tracing::info!("Notification settings changed, invalidating configuration");
        self.invalidate();
        true
    }

    fn rebuild(&self) -> Result<Arc<EngineConfig>, SettingsError> {
        let generation = self.generation.load(Ordering::Acquire);
        let built = self.source.load().and_then(|settings| self.builder.build(&settings));
        match (built, self.current.load_full()) {
            (Ok(config), _) => {
                let config = Arc::new(config);
                self.current.store(Some(Arc::clone(&config)));
                self.mark_fresh(generation);
                tracing::info!(config = ?config, "Engine configuration loaded");
                Ok(config)
            }
            (Err(e), Some(previous)) => {
                // The previous configuration stays until the source changes again.
                self.mark_fresh(generation);
                tracing::error!(error = %e, "Failed to rebuild configuration, keeping the previous one");
                Ok(previous)
            }
            (Err(e), None) => Err(e),
        }
    }
}

impl ConfigProvider for CachedConfigProvider {
    fn get_config(&self) -> Result<Arc<EngineConfig>, SettingsError> {
        if !self.stale.load(Ordering::Acquire)
            && let Some(config) = self.current.load_full()
        {
            return Ok(config);
        }

        // Serialize rebuilds; the loser of the race finds a fresh config.
        let _guard = self.rebuild_lock.lock();
        if !self.stale.load(Ordering::Acquire)
            && let Some(config) = self.current.load_full()
        {
            return Ok(config);
        }
        self.rebuild()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        sync::atomic::AtomicUsize,
        time::Duration,
    };

    use serde_json::json;

    use super::*;

    fn settings(message: &str) -> NotificationsSettings {
        serde_json::from_value(json!({
            "templates": { "greeting": { "message": message } }
        }))
        .unwrap()
    }

    #[test]
    fn test_config_is_built_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let mut source = MockSettingsSource::new();
        source.expect_version().returning(|| None);
        source.expect_load().returning(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(settings("hello"))
        });

        let provider = CachedConfigProvider::new(Box::new(source), EngineConfigBuilder::new());
        let first = provider.get_config().unwrap();
        let second = provider.get_config().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalidate_rebuilds() {
        let provider = CachedConfigProvider::new(
            Box::new(StaticSettings(settings("hello"))),
            EngineConfigBuilder::new(),
        );
        let first = provider.get_config().unwrap();
        provider.invalidate();
        let second = provider.get_config().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_invalidate_during_rebuild_is_not_lost() {
        let provider = CachedConfigProvider::new(
            Box::new(StaticSettings(settings("hello"))),
            EngineConfigBuilder::new(),
        );
        let first = provider.get_config().unwrap();

        // A settings change lands between reading the generation and
        // finishing the build.
        let generation = provider.generation.load(Ordering::Acquire);
        provider.invalidate();
        provider.mark_fresh(generation);

        assert!(provider.stale.load(Ordering::Acquire));
        let second = provider.get_config().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!provider.stale.load(Ordering::Acquire));
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_config() {
        let mut source = MockSettingsSource::new();
        source.expect_version().returning(|| None);
        let mut calls = 0;
        source.expect_load().returning(move || {
            calls += 1;
            if calls == 1 { Ok(settings("hello")) } else { Ok(settings("{{ broken")) }
        });

        let provider = CachedConfigProvider::new(Box::new(source), EngineConfigBuilder::new());
        let first = provider.get_config().unwrap();
        provider.invalidate();
        let second = provider.get_config().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_first_build_failure_is_reported() {
        let provider = CachedConfigProvider::new(
            Box::new(StaticSettings(settings("{{ broken"))),
            EngineConfigBuilder::new(),
        );
        assert!(matches!(provider.get_config(), Err(SettingsError::Template(_))));
    }

    #[test]
    fn test_poll_changes_detects_file_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notifications.yaml");
        fs::write(&path, "templates:\n  greeting:\n    message: hello\n").unwrap();

        let provider = CachedConfigProvider::new(
            Box::new(FileSettingsSource::new(path.clone())),
            EngineConfigBuilder::new(),
        );
        let first = provider.get_config().unwrap();
        assert!(!provider.poll_changes());

        let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60)).unwrap();
        drop(file);

        assert!(provider.poll_changes());
        let second = provider.get_config().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
