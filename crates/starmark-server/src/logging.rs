//! Logging setup: a preset chosen by CLI flags, per-target overrides and
//! text or JSON output. `RUST_LOG` wins over all of it when set.

use std::collections::HashMap;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Levels for the production preset, one per `starmark::*` target.
const PRODUCTION_TARGETS: &[(&str, &str)] = &[
    ("starmark::startup", "info"),
    ("starmark::api", "info"),
    ("starmark::preview", "info"),
    ("starmark::validity", "info"),
    ("starmark::host", "info"),
    ("starmark::store", "warn"),
    ("starmark::persist", "warn"),
    ("tower_http", "warn"),
];

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: '{}'. Use 'text' or 'json'.", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogPreset {
    #[default]
    Production,
    Verbose,
    Debug,
    Trace,
    /// Warnings and errors only
    Quiet,
}

impl LogPreset {
    /// `(starmark, tower_http)` levels for the blanket presets.
    fn blanket_levels(self) -> Option<(&'static str, &'static str)> {
        match self {
            LogPreset::Production => None,
            LogPreset::Verbose => Some(("info", "info")),
            LogPreset::Debug => Some(("debug", "debug")),
            LogPreset::Trace => Some(("trace", "trace")),
            LogPreset::Quiet => Some(("warn", "error")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub preset: LogPreset,
    /// Full target name to level, e.g. "starmark::preview" -> DEBUG
    pub overrides: HashMap<String, Level>,
    pub format: LogFormat,
}

impl LogConfig {
    /// Flags are checked quiet, trace, debug, verbose; the first set one wins.
    /// Overrides look like `preview=debug` and may be comma separated.
    pub fn from_cli(
        verbose: bool,
        debug: bool,
        trace: bool,
        quiet: bool,
        log_overrides: Vec<String>,
        format: LogFormat,
    ) -> Self {
        let preset = if quiet {
            LogPreset::Quiet
        } else if trace {
            LogPreset::Trace
        } else if debug {
            LogPreset::Debug
        } else if verbose {
            LogPreset::Verbose
        } else {
            LogPreset::Production
        };

        let overrides = log_overrides
            .iter()
            .flat_map(|arg| arg.split(','))
            .filter_map(|part| {
                let (target, level) = part.split_once('=')?;
                Some((full_target(target.trim()), parse_level(level.trim())?))
            })
            .collect();

        Self {
            preset,
            overrides,
            format,
        }
    }

    /// Filter directives for the preset followed by the overrides.
    fn directives(&self) -> Vec<String> {
        let mut directives: Vec<String> = match self.preset.blanket_levels() {
            None => PRODUCTION_TARGETS
                .iter()
                .map(|(target, level)| format!("{}={}", target, level))
                .collect(),
            Some((starmark, tower_http)) => vec![
                format!("starmark={}", starmark),
                format!("tower_http={}", tower_http),
            ],
        };
        directives.extend(
            self.overrides
                .iter()
                .map(|(target, level)| format!("{}={}", target, level.as_str().to_lowercase())),
        );
        directives
    }

    pub fn build_filter(&self) -> EnvFilter {
        if let Ok(env_filter) = EnvFilter::try_from_default_env() {
            return env_filter;
        }
        EnvFilter::try_new(self.directives().join(",")).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// "preview" becomes "starmark::preview"; full names pass through.
fn full_target(target: &str) -> String {
    if target.starts_with("starmark::") || target == "tower_http" {
        target.to_string()
    } else {
        format!("starmark::{}", target)
    }
}

fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Install the global subscriber.
pub fn init(config: &LogConfig) {
    let registry = tracing_subscriber::registry().with(config.build_filter());
    match config.format {
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_span_events(FmtSpan::CLOSE))
            .init(),
    }
}
