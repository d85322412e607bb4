//! Commit session configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Whole-text replacements larger than this many chars skip incremental reparse.
pub const DEFAULT_LARGE_REPLACE_THRESHOLD: usize = 100_000;
const DEFAULT_MAX_CONCURRENCY: usize = 2;
const DEFAULT_PROGRESS_POLL_INTERVAL_MS: u64 = 10;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML syntax or field types.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// A value parsed but is out of range.
	#[error("invalid value for {field}: {reason}")]
	Invalid { field: &'static str, reason: String },
}

/// What to do when a bookkeeping invariant is found broken at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvariantPolicy {
	/// Log at error level and continue.
	#[default]
	Log,
	/// Surface [`crate::CommitError::InvariantViolation`] to the caller.
	Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommitCfg {
	pub large_replace_threshold: usize,
	/// Schedule an asynchronous commit after every event-system edit.
	pub auto_commit: bool,
	/// Background reparse permits.
	pub max_concurrency: usize,
	pub progress_poll_interval_ms: u64,
	pub invariant_policy: InvariantPolicy,
}

impl Default for CommitCfg {
	fn default() -> Self {
		Self {
			large_replace_threshold: DEFAULT_LARGE_REPLACE_THRESHOLD,
			auto_commit: true,
			max_concurrency: DEFAULT_MAX_CONCURRENCY,
			progress_poll_interval_ms: DEFAULT_PROGRESS_POLL_INTERVAL_MS,
			invariant_policy: InvariantPolicy::Log,
		}
	}
}

impl CommitCfg {
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		let cfg: Self = toml::from_str(input)?;
		cfg.validate()
	}

	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let input = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&input)
	}

	pub fn progress_poll_interval(&self) -> Duration {
		Duration::from_millis(self.progress_poll_interval_ms)
	}

	fn validate(self) -> Result<Self, ConfigError> {
		if self.max_concurrency == 0 {
			return Err(ConfigError::Invalid {
				field: "max_concurrency",
				reason: "must be at least 1".into(),
			});
		}
		if self.progress_poll_interval_ms == 0 {
			return Err(ConfigError::Invalid {
				field: "progress_poll_interval_ms",
				reason: "must be at least 1".into(),
			});
		}
		Ok(self)
	}
}
