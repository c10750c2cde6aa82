//! File-backed configuration source

use chrono::{DateTime, Utc};
use futures::{Stream, stream};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigFormat, SwitchyardConfig};
use switchyard_core::{Error, Result};

/// How often the watcher thread checks whether the stream was dropped
const CLOSED_POLL_INTERVAL: Duration = Duration::from_millis(250);

type WatchEvents = std::sync::mpsc::Receiver<std::result::Result<Event, notify::Error>>;

/// A freshly loaded configuration
#[derive(Debug, Clone)]
pub struct ConfigUpdate {
    pub config: SwitchyardConfig,
    pub version: u32,
    pub timestamp: DateTime<Utc>,
}

/// Reloaded configs, or the error that kept a reload from happening
pub type ConfigUpdateStream = Pin<Box<dyn Stream<Item = Result<ConfigUpdate>> + Send>>;

/// Configuration loaded from a YAML or TOML file on disk
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    /// Path to the configuration file
    config_path: PathBuf,
    format: ConfigFormat,
    /// Incremented on every successful save or reload
    version: Arc<AtomicU32>,
}

impl FileConfigSource {
    /// Create a source for `config_path`
    ///
    /// # Errors
    /// - `Error::Config` if `~` is used and there is no home directory
    /// - `Error::ConfigNotFound` if the file doesn't exist
    pub fn new(config_path: impl Into<PathBuf>) -> Result<Self> {
        let config_path = expand_tilde(config_path.into())?;

        if !config_path.exists() {
            return Err(Error::ConfigNotFound);
        }

        info!("Initialized FileConfigSource for {:?}", config_path);

        Ok(Self {
            format: ConfigFormat::from_path(&config_path),
            config_path,
            version: Arc::new(AtomicU32::new(1)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn format(&self) -> ConfigFormat {
        self.format
    }

    pub fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }

    /// Read, parse, apply environment overrides and validate
    pub fn load(&self) -> Result<SwitchyardConfig> {
        load_file(&self.config_path, self.format)
    }

    /// Validate `config` and write it back in the file's format
    pub fn save(&self, config: &SwitchyardConfig) -> Result<()> {
        config.validate()?;
        let contents = config.to_text(self.format)?;

        std::fs::write(&self.config_path, contents).map_err(|e| {
            error!("Failed to write config file: {}", e);
            Error::Io(e)
        })?;

        self.version.fetch_add(1, Ordering::SeqCst);
        info!("Successfully wrote config file");
        Ok(())
    }

    /// Watch the file and yield a reloaded config after every change.
    ///
    /// A change that fails to parse or validate yields an error item; the
    /// stream stays open so a later fix is picked up.
    pub fn watch(&self) -> Result<ConfigUpdateStream> {
        let (tx, rx) = mpsc::channel(16);

        let config_path = self.config_path.clone();
        let format = self.format;
        let version = self.version.clone();

        let (notify_tx, notify_rx) = std::sync::mpsc::channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                if let Err(e) = notify_tx.send(res) {
                    debug!("Config watcher channel closed: {}", e);
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| Error::Config(format!("Failed to create file watcher: {}", e)))?;

        watcher
            .watch(&config_path, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Config(format!("Failed to watch config file: {}", e)))?;

        info!("Watching config file for changes: {:?}", config_path);

        tokio::task::spawn_blocking(move || {
            // Keep the watcher alive for as long as events are consumed
            let _watcher = watcher;
            forward_events(notify_rx, tx, &config_path, format, &version);
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        Ok(Box::pin(stream))
    }
}

/// Turn file events into config updates until the stream is dropped
fn forward_events(
    events: WatchEvents,
    tx: mpsc::Sender<Result<ConfigUpdate>>,
    config_path: &Path,
    format: ConfigFormat,
    version: &AtomicU32,
) {
    loop {
        let event_result = match events.recv_timeout(CLOSED_POLL_INTERVAL) {
            Ok(event_result) => event_result,
            Err(RecvTimeoutError::Timeout) if tx.is_closed() => {
                debug!("Config update stream closed, stopping watcher");
                return;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return,
        };

        let item = match event_result {
            Ok(event) if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) => {
                match load_file(config_path, format) {
                    Ok(config) => {
                        let version = version.fetch_add(1, Ordering::SeqCst) + 1;
                        info!(version, "Reloaded config file");
                        Ok(ConfigUpdate {
                            config,
                            version,
                            timestamp: Utc::now(),
                        })
                    }
                    Err(e) => {
                        warn!("Ignoring invalid config change: {}", e);
                        Err(e)
                    }
                }
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("File watch error: {}", e);
                Err(Error::Internal(format!("File watch error: {}", e)))
            }
        };

        if tx.blocking_send(item).is_err() {
            debug!("Config update stream closed, stopping watcher");
            return;
        }
    }
}

fn expand_tilde(path: PathBuf) -> Result<PathBuf> {
    if !path.starts_with("~") {
        return Ok(path);
    }
    let home = dirs::home_dir()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;
    Ok(home.join(path.strip_prefix("~").unwrap_or(&path)))
}

fn load_file(path: &Path, format: ConfigFormat) -> Result<SwitchyardConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        error!("Failed to read config file: {}", e);
        Error::Io(e)
    })?;

    let mut config = SwitchyardConfig::parse(&contents, format)?;
    config.merge_env();
    config.validate()?;

    debug!("Successfully read config file");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serial_test::serial;
    use tempfile::{Builder, NamedTempFile};

    fn temp_config(suffix: &str, contents: &str) -> NamedTempFile {
        let file = Builder::new().suffix(suffix).tempfile().unwrap();
        std::fs::write(file.path(), contents).unwrap();
        file
    }

    #[test]
    fn test_file_not_found() {
        let result = FileConfigSource::new("/nonexistent/switchyard.yaml");
        assert!(matches!(result.unwrap_err(), Error::ConfigNotFound));
    }

    #[test]
    fn test_expand_tilde() {
        let plain = PathBuf::from("/etc/switchyard.yaml");
        assert_eq!(expand_tilde(plain.clone()).unwrap(), plain);

        if let Some(home) = dirs::home_dir() {
            let expanded = expand_tilde(PathBuf::from("~/.switchyard/config.yaml")).unwrap();
            assert_eq!(expanded, home.join(".switchyard/config.yaml"));
        }
    }

    #[test]
    #[serial]
    fn test_load_yaml() {
        let file = temp_config(
            ".yaml",
            "failover:\n  max_retry_attempts: 5\nlogging:\n  level: debug\n",
        );

        let source = FileConfigSource::new(file.path()).unwrap();
        assert_eq!(source.format(), ConfigFormat::Yaml);

        let config = source.load().unwrap();
        assert_eq!(config.failover.max_retry_attempts, 5);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    #[serial]
    fn test_load_toml() {
        let file = temp_config(".toml", "[failover]\nmax_retry_attempts = 2\n");

        let source = FileConfigSource::new(file.path()).unwrap();
        assert_eq!(source.format(), ConfigFormat::Toml);
        assert_eq!(source.load().unwrap().failover.max_retry_attempts, 2);
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let file = temp_config(".yaml", "failover:\n  max_retry_attempts: 5\n");
        unsafe {
            std::env::set_var("SWITCHYARD_MAX_RETRY_ATTEMPTS", "7");
        }

        let config = FileConfigSource::new(file.path()).unwrap().load().unwrap();
        assert_eq!(config.failover.max_retry_attempts, 7);

        unsafe {
            std::env::remove_var("SWITCHYARD_MAX_RETRY_ATTEMPTS");
        }
    }

    #[test]
    #[serial]
    fn test_load_rejects_invalid_config() {
        let file = temp_config(".yaml", "failover:\n  retry_delays: []\n");
        let err = FileConfigSource::new(file.path()).unwrap().load().unwrap_err();
        assert!(matches!(err, Error::ConfigValidation(_)));
    }

    #[test]
    #[serial]
    fn test_save_and_reload() {
        let file = temp_config(".yaml", "{}\n");
        let source = FileConfigSource::new(file.path()).unwrap();
        assert_eq!(source.version(), 1);

        let mut config = source.load().unwrap();
        config.failover.circuit_breaker.failure_threshold = 2;
        source.save(&config).unwrap();
        assert_eq!(source.version(), 2);

        let reloaded = source.load().unwrap();
        assert_eq!(reloaded.failover.circuit_breaker.failure_threshold, 2);
    }

    #[test]
    fn test_save_rejects_invalid_config() {
        let file = temp_config(".yaml", "{}\n");
        let source = FileConfigSource::new(file.path()).unwrap();

        let mut config = SwitchyardConfig::default();
        config.failover.max_retry_attempts = 0;
        assert!(source.save(&config).is_err());
        assert_eq!(source.version(), 1);
        assert_eq!(std::fs::read_to_string(file.path()).unwrap(), "{}\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    #[serial]
    async fn test_watch_yields_reloaded_config() {
        let file = temp_config(".yaml", "failover:\n  max_retry_attempts: 3\n");
        let source = FileConfigSource::new(file.path()).unwrap();
        let mut updates = source.watch().unwrap();

        std::fs::write(file.path(), "failover:\n  max_retry_attempts: 8\n").unwrap();

        // Some platforms report several events per write; take the first good one
        let update = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(item) = updates.next().await {
                if let Ok(update) = item
                    && update.config.failover.max_retry_attempts == 8
                {
                    return Some(update);
                }
            }
            None
        })
        .await
        .ok()
        .flatten();

        let update = update.expect("no config update received");
        assert!(update.version > 1);
        assert!(source.version() >= update.version);
    }

    #[tokio::test]
    async fn test_watcher_stops_when_stream_dropped() {
        let file = temp_config(".yaml", "{}\n");
        let (_event_tx, event_rx) = std::sync::mpsc::channel();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let path = file.path().to_path_buf();
        let version = Arc::new(AtomicU32::new(1));
        let task = tokio::task::spawn_blocking(move || {
            forward_events(event_rx, tx, &path, ConfigFormat::Yaml, &version);
        });

        // No file event arrives, so only the closed check can end the loop
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("watcher thread kept running")
            .unwrap();
    }
}
