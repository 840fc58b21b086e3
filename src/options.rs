//! Flattening and export configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::field::FontSet;

/// Environment variable naming the Ghostscript binary.
pub const ENV_GS: &str = "FILLPDF_GS";
/// Environment variable with the flatten timeout in seconds.
pub const ENV_FLATTEN_TIMEOUT: &str = "FILLPDF_FLATTEN_TIMEOUT";
/// Environment variable with the number of flatten workers.
pub const ENV_FLATTEN_WORKERS: &str = "FILLPDF_FLATTEN_WORKERS";

/// Brasília time, the zone order dates are displayed in.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = -180;

/// Options for the external flattening tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenOptions {
    /// Ghostscript executable, looked up on `PATH` when relative
    pub binary: PathBuf,

    /// Wall-clock limit for one flatten run
    pub timeout: Duration,

    /// Maximum number of tool processes running at once
    pub max_concurrent: usize,

    /// Extra arguments placed before the input file
    pub extra_args: Vec<String>,
}

impl FlattenOptions {
    /// Create new flatten options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `FILLPDF_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();

        if let Some(binary) = lookup(ENV_GS).filter(|v| !v.trim().is_empty()) {
            options.binary = PathBuf::from(binary.trim());
        }
        if let Some(raw) = lookup(ENV_FLATTEN_TIMEOUT) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => options.timeout = Duration::from_secs(secs),
                _ => log::warn!("Ignoring invalid {}={:?}", ENV_FLATTEN_TIMEOUT, raw),
            }
        }
        if let Some(raw) = lookup(ENV_FLATTEN_WORKERS) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => options.max_concurrent = n,
                _ => log::warn!("Ignoring invalid {}={:?}", ENV_FLATTEN_WORKERS, raw),
            }
        }
        options
    }

    /// Set the Ghostscript binary.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the concurrency limit (at least 1).
    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n.max(1);
        self
    }

    /// Append an extra tool argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("gs"),
            timeout: Duration::from_secs(60),
            max_concurrent: 2,
            extra_args: Vec::new(),
        }
    }
}

fn default_utc_offset() -> i32 {
    DEFAULT_UTC_OFFSET_MINUTES
}

/// Where order documents come from and go to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Form template
    pub template_path: PathBuf,

    /// Directory exported documents are written to
    pub output_dir: PathBuf,

    /// Fonts for text appearances
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<FontSet>,

    /// Offset from UTC used when formatting dates, in minutes
    #[serde(default = "default_utc_offset")]
    pub utc_offset_minutes: i32,
}

impl ExportSettings {
    pub fn new(template_path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            template_path: template_path.into(),
            output_dir: output_dir.into(),
            font: None,
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
        }
    }

    /// Set the font set.
    pub fn with_font(mut self, font: FontSet) -> Self {
        self.font = Some(font);
        self
    }

    /// Set the date offset from UTC in minutes.
    pub fn with_utc_offset(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }
}
