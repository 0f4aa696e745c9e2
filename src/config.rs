//! Engine configuration loaded from TOML.
//!
//! Every section has defaults, so an empty document yields a usable
//! configuration apart from the source repository URLs.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::build::domain::SourceSlot;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration '{path}': {reason}")]
    Read {
        /// Configuration path.
        path: Utf8PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// The document is not valid TOML for this schema.
    #[error("invalid configuration: {0}")]
    Parse(String),

    /// A value is out of range or missing.
    #[error("invalid configuration value for '{key}': {reason}")]
    Invalid {
        /// Offending key.
        key: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// How task arguments are appended to a build command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgStyle {
    /// `-key value`
    #[default]
    DashPair,
    /// `--key=value`
    DoubleDashEquals,
}

impl ArgStyle {
    /// Renders one argument pair as command-line tokens.
    #[must_use]
    pub fn render(self, key: &str, value: &str) -> Vec<String> {
        match self {
            Self::DashPair => vec![format!("-{key}"), value.to_owned()],
            Self::DoubleDashEquals => vec![format!("--{key}={value}")],
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Global lock settings.
    #[serde(default)]
    pub lock: LockConfig,
    /// Queue poller settings.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Source repository A.
    #[serde(default = "SourceConfig::default_a")]
    pub source_a: SourceConfig,
    /// Source repository B.
    #[serde(default = "SourceConfig::default_b")]
    pub source_b: SourceConfig,
    /// Packaging settings.
    #[serde(default)]
    pub package: PackageConfig,
    /// Executor settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock: LockConfig::default(),
            queue: QueueConfig::default(),
            source_a: SourceConfig::default_a(),
            source_b: SourceConfig::default_b(),
            package: PackageConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

/// Global lock settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LockConfig {
    /// Lease validity in seconds.
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_secs: default_lease_secs(),
        }
    }
}

/// Queue poller settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct QueueConfig {
    /// Interval between poller ticks, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Sleep after a failed tick, in milliseconds.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
        }
    }
}

/// One source repository and its native build tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    /// Remote URL cloned into the working tree.
    #[serde(default)]
    pub url: String,
    /// Working tree directory.
    pub workdir: Utf8PathBuf,
    /// Build command templates, one per argv element.
    pub build_command: Vec<String>,
    /// Optional command run before the build, without task arguments.
    #[serde(default)]
    pub prepare_command: Option<Vec<String>>,
    /// Style used to append task arguments.
    #[serde(default)]
    pub arg_style: ArgStyle,
}

impl SourceConfig {
    /// Default settings for source A.
    #[must_use]
    pub fn default_a() -> Self {
        Self {
            url: String::new(),
            workdir: Utf8PathBuf::from("workspace/source-a"),
            build_command: [
                "unity",
                "-batchmode",
                "-quit",
                "-projectPath",
                "{{ workdir }}",
                "-executeMethod",
                "BuildScript.ExportToFlutter",
            ]
            .map(str::to_owned)
            .to_vec(),
            prepare_command: None,
            arg_style: ArgStyle::DashPair,
        }
    }

    /// Default settings for source B.
    #[must_use]
    pub fn default_b() -> Self {
        Self {
            url: String::new(),
            workdir: Utf8PathBuf::from("workspace/source-b"),
            build_command: ["flutter", "build", "apk", "--release"]
                .map(str::to_owned)
                .to_vec(),
            prepare_command: Some(["flutter", "pub", "get"].map(str::to_owned).to_vec()),
            arg_style: ArgStyle::DoubleDashEquals,
        }
    }
}

/// Packaging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackageConfig {
    /// Output file path relative to the source B working tree.
    #[serde(default = "default_output_path")]
    pub output_path: Utf8PathBuf,
    /// Directory receiving stored artifacts.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: Utf8PathBuf,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            artifact_dir: default_artifact_dir(),
        }
    }
}

/// Executor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PipelineConfig {
    /// Upper bound on the log text kept per stage.
    #[serde(default = "default_max_captured_log_bytes")]
    pub max_captured_log_bytes: usize,
    /// Version control program.
    #[serde(default = "default_git_program")]
    pub git_program: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_captured_log_bytes: default_max_captured_log_bytes(),
            git_program: default_git_program(),
        }
    }
}

const fn default_lease_secs() -> u64 {
    3600
}

const fn default_poll_interval_ms() -> u64 {
    5_000
}

const fn default_error_backoff_ms() -> u64 {
    10_000
}

fn default_output_path() -> Utf8PathBuf {
    Utf8PathBuf::from("build/app/outputs/flutter-apk/app-release.apk")
}

fn default_artifact_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("artifacts")
}

const fn default_max_captured_log_bytes() -> usize {
    64 * 1024
}

fn default_git_program() -> String {
    "git".to_owned()
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed documents and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(document).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read, otherwise
    /// the errors of [`EngineConfig::from_toml_str`].
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let read_error = |reason: String| ConfigError::Read {
            path: path.to_owned(),
            reason,
        };
        let file_name = path
            .file_name()
            .ok_or_else(|| read_error("path has no file name".to_owned()))?;
        let parent = match path.parent() {
            Some(dir) if !dir.as_str().is_empty() => dir,
            _ => Utf8Path::new("."),
        };
        let dir = Dir::open_ambient_dir(parent, ambient_authority())
            .map_err(|err| read_error(err.to_string()))?;
        let document = dir
            .read_to_string(file_name)
            .map_err(|err| read_error(err.to_string()))?;
        Self::from_toml_str(&document)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero lease, a zero poll
    /// interval or an empty build command.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock.lease_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "lock.lease-secs",
                reason: "must be greater than zero",
            });
        }
        if self.queue.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "queue.poll-interval-ms",
                reason: "must be greater than zero",
            });
        }
        if self.source_a.build_command.is_empty() {
            return Err(ConfigError::Invalid {
                key: "source-a.build-command",
                reason: "must name a program",
            });
        }
        if self.source_b.build_command.is_empty() {
            return Err(ConfigError::Invalid {
                key: "source-b.build-command",
                reason: "must name a program",
            });
        }
        let empty_prepare = |source: &SourceConfig| {
            source
                .prepare_command
                .as_ref()
                .is_some_and(Vec::is_empty)
        };
        if empty_prepare(&self.source_a) || empty_prepare(&self.source_b) {
            return Err(ConfigError::Invalid {
                key: "prepare-command",
                reason: "must name a program when present",
            });
        }
        Ok(())
    }

    /// Returns the settings of one source repository.
    #[must_use]
    pub const fn source(&self, slot: SourceSlot) -> &SourceConfig {
        match slot {
            SourceSlot::A => &self.source_a,
            SourceSlot::B => &self.source_b,
        }
    }

    /// Returns the lock lease duration.
    #[must_use]
    pub const fn lease(&self) -> Duration {
        Duration::from_secs(self.lock.lease_secs)
    }

    /// Returns the poller tick interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue.poll_interval_ms)
    }

    /// Returns the poller error backoff.
    #[must_use]
    pub const fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.queue.error_backoff_ms)
    }
}
