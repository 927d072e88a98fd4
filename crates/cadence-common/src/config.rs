//! Configuration structures for the cadence scheduler.
//!
//! Supports TOML deserialization with defaults suited to a 60 Hz host loop.
//! Durations are written in humantime form (`"50us"`, `"2ms"`).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Rate substituted when a non-positive target rate is requested.
pub const DEFAULT_TARGET_RATE: f64 = 60.0;

/// Remaining time below which a wait stops sleeping and starts spinning.
///
/// Raising it trades CPU time for precision: the spin covers more of the
/// sleep primitive's overshoot. Lowering it saves CPU on hosts whose sleep
/// primitive is already precise.
pub const DEFAULT_SPIN_THRESHOLD: Duration = Duration::from_micros(50);

/// Top-level cadence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    /// Ticks per second to aim for.
    pub target_rate: f64,

    /// Final slice of each wait that is busy-spun rather than slept.
    #[serde(with = "humantime_serde")]
    pub spin_threshold: Duration,

    /// Primitive used for the coarse part of each wait.
    pub sleep_backend: SleepBackend,

    /// Ask the host to disable its own display-synchronized pacing on start.
    pub suppress_native_pacing: bool,

    /// Metrics collection.
    pub metrics: MetricsConfig,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            target_rate: DEFAULT_TARGET_RATE,
            spin_threshold: DEFAULT_SPIN_THRESHOLD,
            sleep_backend: SleepBackend::Auto,
            suppress_native_pacing: true,
            metrics: MetricsConfig::default(),
        }
    }
}

/// Coarse sleep primitive selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SleepBackend {
    /// Best primitive available on the build target.
    #[default]
    Auto,
    /// `std::thread::sleep`.
    Thread,
    /// Relative `clock_nanosleep` on `CLOCK_MONOTONIC` (Linux only).
    Nanosleep,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Record tick intervals.
    pub enabled: bool,

    /// Size of the interval ring buffer.
    pub histogram_size: usize,

    /// Percentiles to report (e.g. `[50, 99, 99.9]`).
    pub percentiles: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            histogram_size: 4_096,
            percentiles: vec![50.0, 90.0, 99.0, 99.9],
        }
    }
}

impl CadenceConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = Self::from_toml(&content)?;
        debug!(?path, target_rate = config.target_rate, "Loaded cadence config");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Reject values no scheduler could run with.
    ///
    /// A non-positive `target_rate` is not rejected here: the cadence
    /// controller coerces it at run time with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_rate.is_nan() || self.target_rate <= 0.0 {
            warn!(
                target_rate = self.target_rate,
                fallback = DEFAULT_TARGET_RATE,
                "Configured target_rate is not positive and will be replaced"
            );
        }
        if self.target_rate.is_infinite() {
            return Err(ConfigError::Invalid {
                field: "target_rate",
                reason: "must be finite".into(),
            });
        }
        if self.spin_threshold > Duration::from_millis(100) {
            return Err(ConfigError::Invalid {
                field: "spin_threshold",
                reason: format!(
                    "{} would spin for most of a tick",
                    humantime::format_duration(self.spin_threshold)
                ),
            });
        }
        if self.metrics.enabled && self.metrics.histogram_size == 0 {
            return Err(ConfigError::Invalid {
                field: "metrics.histogram_size",
                reason: "must be at least 1 when metrics are enabled".into(),
            });
        }
        Ok(())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but cannot be used.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Dotted field path.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Number of WARN events logged while `f` runs.
    fn warnings_during(f: impl FnOnce()) -> usize {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || SharedBuf(Arc::clone(&sink)))
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);

        let out = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        out.lines().filter(|line| line.contains("WARN")).count()
    }

    #[test]
    fn test_non_positive_rate_warns_but_validates() {
        for rate in [0.0, -30.0, f64::NAN] {
            let config = CadenceConfig {
                target_rate: rate,
                ..CadenceConfig::default()
            };
            let warnings = warnings_during(|| assert!(config.validate().is_ok()));
            assert_eq!(warnings, 1, "rate {rate}");
        }

        let warnings = warnings_during(|| CadenceConfig::default().validate().unwrap());
        assert_eq!(warnings, 0);
    }

    #[test]
    fn test_default_config() {
        let config = CadenceConfig::default();
        assert!((config.target_rate - 60.0).abs() < f64::EPSILON);
        assert_eq!(config.spin_threshold, Duration::from_micros(50));
        assert_eq!(config.sleep_backend, SleepBackend::Auto);
        assert!(config.suppress_native_pacing);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            target_rate = 120.0
            spin_threshold = "80us"
            sleep_backend = "thread"
            suppress_native_pacing = false

            [metrics]
            histogram_size = 256
        "#;

        let config = CadenceConfig::from_toml(toml).unwrap();
        assert!((config.target_rate - 120.0).abs() < f64::EPSILON);
        assert_eq!(config.spin_threshold, Duration::from_micros(80));
        assert_eq!(config.sleep_backend, SleepBackend::Thread);
        assert!(!config.suppress_native_pacing);
        assert_eq!(config.metrics.histogram_size, 256);
        // Unspecified fields keep their defaults
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_bad_duration_rejected() {
        let err = CadenceConfig::from_toml(r#"spin_threshold = "soon""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_roundtrip_toml() {
        let config = CadenceConfig {
            target_rate: 144.0,
            sleep_backend: SleepBackend::Nanosleep,
            ..Default::default()
        };
        let parsed = CadenceConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed.spin_threshold, config.spin_threshold);
        assert_eq!(parsed.sleep_backend, SleepBackend::Nanosleep);
        assert!((parsed.target_rate - 144.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate() {
        // Coerced at run time, so accepted here
        let config = CadenceConfig {
            target_rate: -5.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = CadenceConfig {
            spin_threshold: Duration::from_millis(500),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "spin_threshold", .. })
        ));

        let mut config = CadenceConfig::default();
        config.metrics.histogram_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "target_rate = 30.0").unwrap();

        let config = CadenceConfig::from_file(file.path()).unwrap();
        assert!((config.target_rate - 30.0).abs() < f64::EPSILON);

        let missing = CadenceConfig::from_file(std::path::Path::new("/nonexistent/cadence.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
