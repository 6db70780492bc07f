use std::fs::{self, File};
use std::io::{Error as IoError, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::*;

// seconds, longest accepted monitor/refresh interval
const MAX_INTERVAL_SECS: f64 = 86_400.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config: {0}")]
    Io(#[from] IoError),
    #[error("unable to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unable to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("{0}")]
    Invalid(String),
}

/// One complete set of tunables, as stored in the flat TOML file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // MHz
    pub frequency_step: u32,
    // MHz
    pub max_frequency: u32,
    // MHz
    pub min_frequency: u32,
    // samples
    #[serde(default = "default_sample_window")]
    pub sample_window: usize,
    // seconds
    pub monitor_interval: f64,
    // seconds
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: f64,
    // °C
    pub temp_tolerance: f64,
}

fn default_sample_window() -> usize {
    DEFAULT_SAMPLE_WINDOW
}

fn default_refresh_interval() -> f64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frequency_step: DEFAULT_FREQ_STEP_MHZ,
            max_frequency: DEFAULT_MAX_FREQ_MHZ,
            min_frequency: DEFAULT_MIN_FREQ_MHZ,
            sample_window: DEFAULT_SAMPLE_WINDOW,
            monitor_interval: DEFAULT_MONITOR_INTERVAL_SECS,
            refresh_interval: DEFAULT_REFRESH_INTERVAL_SECS,
            temp_tolerance: DEFAULT_TEMP_TOLERANCE,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.frequency_step == 0 {
            return invalid("frequency_step must be positive");
        }
        if self.max_frequency < self.min_frequency {
            return invalid("max_frequency can't be lower than min_frequency");
        }
        if self.sample_window == 0 {
            return invalid("sample_window must be positive");
        }
        if !valid_interval(self.monitor_interval) {
            return invalid("monitor_interval must be a positive number of seconds, at most one day");
        }
        if !valid_interval(self.refresh_interval) {
            return invalid("refresh_interval must be a positive number of seconds, at most one day");
        }
        if !(self.temp_tolerance.is_finite() && self.temp_tolerance >= 0.0) {
            return invalid("temp_tolerance must not be negative");
        }
        Ok(())
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs_f64(self.monitor_interval)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs_f64(self.refresh_interval)
    }
}

fn valid_interval(secs: f64) -> bool {
    secs.is_finite() && secs > 0.0 && secs <= MAX_INTERVAL_SECS
}

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Config file backed store handing out whole snapshots
pub struct ConfigStore {
    path: PathBuf,
    current: Config,
}

impl ConfigStore {
    /// Store for `path`, loaded once up front
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let mut store = Self {
            path: path.into(),
            current: Config::default(),
        };
        store.load();
        store
    }

    /// Reads `path` like `load` does, but never writes the defaults back
    pub fn inspect(path: &Path) -> Config {
        read_config(path).unwrap_or_else(|e| {
            tracing::debug!("{e}, using defaults for {}", path.display());
            Config::default()
        })
    }

    /// `$BITAXE_THERMOSTAT_CONFIG`, else the per-user config directory
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        path.push(CONFIG_DIR_NAME);
        path.push(CONFIG_FILE_NAME);
        path
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> Config {
        self.current
    }

    /// Reads the file again. Anything unusable is replaced by the
    /// defaults, which are also written back.
    pub fn load(&mut self) -> Config {
        self.current = match read_config(&self.path) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("{e}, falling back to defaults at {}", self.path.display());
                let config = Config::default();
                if let Err(e) = self.persist(&config) {
                    tracing::debug!("unable to write default config: {e}");
                }
                config
            }
        };
        self.current
    }

    /// Reloads once `refresh_interval` has passed since `last_refresh`
    pub fn maybe_refresh(&mut self, last_refresh: Instant) -> (Config, Instant) {
        self.maybe_refresh_at(last_refresh, Instant::now())
    }

    pub fn maybe_refresh_at(&mut self, last_refresh: Instant, now: Instant) -> (Config, Instant) {
        if now.saturating_duration_since(last_refresh) < self.current.refresh_interval() {
            return (self.current, last_refresh);
        }
        (self.load(), now)
    }

    fn persist(&self, config: &Config) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string(config)?;

        // Write through a temporary file and rename it, so readers
        // never see half a file
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| IoError::new(ErrorKind::InvalidInput, "config path has no file name"))?;
        let mut temp_name = file_name.to_os_string();
        temp_name.push(".tmp");
        let temp_path = self.path.with_file_name(temp_name);

        let mut file = File::create(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let store = ConfigStore::open(&path);
        assert_eq!(store.current(), Config::default());

        let written: Config = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, Config::default());
    }

    #[test]
    fn test_valid_file_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        write(
            &path,
            "frequency_step = 10\n\
             max_frequency = 700\n\
             min_frequency = 500\n\
             sample_window = 3\n\
             monitor_interval = 2\n\
             refresh_interval = 30.0\n\
             temp_tolerance = 1.5\n",
        );

        let store = ConfigStore::open(&path);
        let config = store.current();
        assert_eq!(config.frequency_step, 10);
        assert_eq!(config.max_frequency, 700);
        assert_eq!(config.min_frequency, 500);
        assert_eq!(config.sample_window, 3);
        assert_eq!(config.monitor_interval(), Duration::from_secs(2));
        assert_eq!(config.temp_tolerance, 1.5);
    }

    #[test]
    fn test_optional_keys_keep_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let content = "frequency_step = 10\n\
                       max_frequency = 700\n\
                       min_frequency = 500\n\
                       monitor_interval = 2.0\n\
                       refresh_interval = 30.0\n\
                       temp_tolerance = 1.5\n";
        write(&path, content);

        let config = ConfigStore::open(&path).current();
        assert_eq!(config.frequency_step, 10);
        assert_eq!(config.max_frequency, 700);
        assert_eq!(config.min_frequency, 500);
        assert_eq!(config.sample_window, DEFAULT_SAMPLE_WINDOW);
        assert_eq!(config.refresh_interval(), Duration::from_secs(30));
        assert_eq!(config.temp_tolerance, 1.5);
        // a usable file is left as the operator wrote it
        assert_eq!(fs::read_to_string(&path).unwrap(), content);

        write(&path, "frequency_step = 10\n\
                       max_frequency = 700\n\
                       min_frequency = 500\n\
                       monitor_interval = 2.0\n\
                       temp_tolerance = 1.5\n");
        let config = ConfigStore::open(&path).current();
        assert_eq!(config.max_frequency, 700);
        assert_eq!(config.refresh_interval, DEFAULT_REFRESH_INTERVAL_SECS);
    }

    #[test]
    fn test_inspect_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        assert_eq!(ConfigStore::inspect(&path), Config::default());
        assert!(!path.exists());

        write(&path, "frequency_step = 0\n");
        assert_eq!(ConfigStore::inspect(&path), Config::default());
        assert_eq!(fs::read_to_string(&path).unwrap(), "frequency_step = 0\n");
    }

    #[test]
    fn test_invalid_values_fall_back_completely() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        // Valid step, inverted bounds: nothing from this file may leak through
        write(
            &path,
            "frequency_step = 10\n\
             max_frequency = 400\n\
             min_frequency = 500\n\
             sample_window = 3\n\
             monitor_interval = 1.0\n\
             refresh_interval = 5.0\n\
             temp_tolerance = 0.5\n",
        );

        let store = ConfigStore::open(&path);
        assert_eq!(store.current(), Config::default());

        // and the default is now what the file says
        let reread = ConfigStore::open(&path);
        assert_eq!(reread.current(), Config::default());
    }

    #[test]
    fn test_garbage_and_partial_files_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        write(&path, "this is = = not toml");
        assert_eq!(ConfigStore::open(&path).current(), Config::default());

        write(&path, "frequency_step = 20\n");
        assert_eq!(ConfigStore::open(&path).current(), Config::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            Config { frequency_step: 0, ..Config::default() },
            Config { sample_window: 0, ..Config::default() },
            Config { monitor_interval: 0.0, ..Config::default() },
            Config { monitor_interval: f64::NAN, ..Config::default() },
            Config { refresh_interval: -1.0, ..Config::default() },
            Config { temp_tolerance: -0.1, ..Config::default() },
            Config { min_frequency: 700, max_frequency: 600, ..Config::default() },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{config:?} should be rejected");
        }
        assert!(Config::default().validate().is_ok());
        assert!(Config { temp_tolerance: 0.0, ..Config::default() }.validate().is_ok());
    }

    #[test]
    fn test_maybe_refresh_respects_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut store = ConfigStore::open(&path);

        let start = Instant::now();
        write(
            &path,
            "frequency_step = 7\n\
             max_frequency = 650\n\
             min_frequency = 525\n\
             sample_window = 15\n\
             monitor_interval = 1.0\n\
             refresh_interval = 10.0\n\
             temp_tolerance = 0.5\n",
        );

        let (config, last) = store.maybe_refresh_at(start, start + Duration::from_secs(3));
        assert_eq!(config.frequency_step, DEFAULT_FREQ_STEP_MHZ);
        assert_eq!(last, start);

        let later = start + Duration::from_secs(10);
        let (config, last) = store.maybe_refresh_at(start, later);
        assert_eq!(config.frequency_step, 7);
        assert_eq!(last, later);
    }

    #[test]
    fn test_deleted_file_refreshes_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        write(
            &path,
            "frequency_step = 7\n\
             max_frequency = 650\n\
             min_frequency = 525\n\
             sample_window = 15\n\
             monitor_interval = 1.0\n\
             refresh_interval = 1.0\n\
             temp_tolerance = 0.5\n",
        );
        let mut store = ConfigStore::open(&path);
        assert_eq!(store.current().frequency_step, 7);

        fs::remove_file(&path).unwrap();
        let start = Instant::now();
        let (config, _) = store.maybe_refresh_at(start, start + Duration::from_secs(1));
        assert_eq!(config, Config::default());
        assert!(path.exists());
    }
}
