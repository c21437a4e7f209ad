//! Log filter and format selection.

use crate::config::LoggingSettings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parses a format name. Unknown names fall back to pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Filter directives.
    pub filter: EnvFilter,
    /// Output format.
    pub format: LogFormat,
    /// Append to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Builds logging configuration from config settings and the process
    /// environment.
    #[must_use]
    pub fn from_settings(settings: &LoggingSettings, verbose: bool) -> Self {
        Self::from_lookup(settings, verbose, |key| std::env::var(key).ok())
    }

    /// Builds logging configuration with an arbitrary variable lookup.
    ///
    /// Filter precedence: `FIRE_MIGRATE_LOG`, `RUST_LOG`, the config file
    /// level, then `info` when verbose and `warn` otherwise.
    #[must_use]
    pub fn from_lookup(
        settings: &LoggingSettings,
        verbose: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let directive = Self::directive(settings, verbose, &lookup);
        let filter = EnvFilter::try_new(&directive).unwrap_or_else(|e| {
            eprintln!("Invalid log filter '{directive}': {e}");
            EnvFilter::new("warn")
        });

        let format = lookup("FIRE_MIGRATE_LOG_FORMAT")
            .or_else(|| settings.format.clone())
            .map(|f| LogFormat::parse(&f))
            .unwrap_or_default();

        let file = lookup("FIRE_MIGRATE_LOG_FILE")
            .filter(|f| !f.is_empty())
            .map(PathBuf::from)
            .or_else(|| settings.file.clone());

        Self {
            filter,
            format,
            file,
        }
    }

    fn directive(
        settings: &LoggingSettings,
        verbose: bool,
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> String {
        lookup("FIRE_MIGRATE_LOG")
            .or_else(|| lookup("RUST_LOG"))
            .or_else(|| settings.level.clone())
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| (if verbose { "info" } else { "warn" }).to_string())
    }
}
