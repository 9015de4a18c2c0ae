//! Logging configuration.
//!
//! `CLAIMSCOPE_LOG` takes a base level optionally followed by per-stage
//! levels, e.g. `warn,score=debug,reduce=trace`. Stage names match the
//! leading segment of the event targets in [`super::event_names`], so a
//! stage directive covers every event that stage emits. `-v`/`-q` replace
//! the base level only.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ENV_LOG_LEVEL: &str = "CLAIMSCOPE_LOG";
pub const ENV_LOG_FORMAT: &str = "CLAIMSCOPE_LOG_FORMAT";

/// Target prefixes a stage directive may name.
pub const STAGE_TARGETS: &[&str] = &[
    "run", "config", "load", "classify", "normalize", "reduce", "score", "export",
];

/// Where log lines go and how they look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Console lines on stderr.
    #[default]
    Human,
    /// One JSON object per event on stderr.
    Jsonl,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "text" => Ok(LogFormat::Human),
            "jsonl" | "json" => Ok(LogFormat::Jsonl),
            other => Err(format!("log format must be human or jsonl, not '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    /// Level for a `-v`/`-q` pair. Quiet wins.
    pub fn from_verbosity(verbose: u8, quiet: bool) -> Option<Self> {
        if quiet {
            return Some(LogLevel::Error);
        }
        match verbose {
            0 => None,
            1 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "off" | "quiet" => Ok(LogLevel::Off),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LogLevel> for tracing_subscriber::filter::LevelFilter {
    fn from(level: LogLevel) -> Self {
        use tracing_subscriber::filter::LevelFilter;
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }
}

/// Base level plus stage overrides parsed from one directive string.
///
/// Entries that name neither a level nor a known stage are skipped.
pub fn parse_directives(s: &str) -> (Option<LogLevel>, BTreeMap<String, LogLevel>) {
    let mut base = None;
    let mut stages = BTreeMap::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('=') {
            Some((stage, level)) => {
                let stage = stage.trim().to_ascii_lowercase();
                let known = STAGE_TARGETS.contains(&stage.as_str());
                if let (true, Ok(level)) = (known, level.parse::<LogLevel>()) {
                    stages.insert(stage, level);
                }
            }
            None => {
                if let Ok(level) = part.parse::<LogLevel>() {
                    base = Some(level);
                }
            }
        }
    }
    (base, stages)
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Stage target prefix to level.
    pub stage_levels: BTreeMap<String, LogLevel>,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Human,
            level: LogLevel::Info,
            stage_levels: BTreeMap::new(),
        }
    }
}

impl LogConfig {
    /// Environment first, then CLI flags on top.
    pub fn from_env(cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self {
        Self::from_values(
            std::env::var(ENV_LOG_LEVEL).ok().as_deref(),
            std::env::var(ENV_LOG_FORMAT).ok().as_deref(),
            cli_level,
            cli_format,
        )
    }

    fn from_values(
        level_var: Option<&str>,
        format_var: Option<&str>,
        cli_level: Option<LogLevel>,
        cli_format: Option<LogFormat>,
    ) -> Self {
        let mut config = LogConfig::default();
        if let Some(var) = level_var {
            let (base, stages) = parse_directives(var);
            if let Some(level) = base {
                config.level = level;
            }
            config.stage_levels = stages;
        }
        if let Some(format) = format_var.and_then(|v| v.parse::<LogFormat>().ok()) {
            config.format = format;
        }
        if let Some(level) = cli_level {
            config.level = level;
        }
        if let Some(format) = cli_format {
            config.format = format;
        }
        config
    }

    /// `EnvFilter` directives for the stage overrides.
    pub fn stage_directives(&self) -> Vec<String> {
        self.stage_levels
            .iter()
            .map(|(stage, level)| format!("{stage}={level}"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse() {
        assert_eq!("JSONL".parse::<LogFormat>().unwrap(), LogFormat::Jsonl);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Human);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_directives() {
        let (base, stages) = parse_directives("warn, score=debug,reduce=TRACE,bogus=info,nonsense");
        assert_eq!(base, Some(LogLevel::Warn));
        assert_eq!(stages.len(), 2);
        assert_eq!(stages["score"], LogLevel::Debug);
        assert_eq!(stages["reduce"], LogLevel::Trace);

        let (base, stages) = parse_directives("normalize=error");
        assert_eq!(base, None);
        assert_eq!(stages["normalize"], LogLevel::Error);
    }

    #[test]
    fn test_from_verbosity() {
        assert_eq!(LogLevel::from_verbosity(0, false), None);
        assert_eq!(LogLevel::from_verbosity(1, false), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_verbosity(3, false), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_verbosity(2, true), Some(LogLevel::Error));
    }

    #[test]
    fn test_cli_replaces_base_level_only() {
        let config = LogConfig::from_values(
            Some("error,score=trace"),
            Some("jsonl"),
            Some(LogLevel::Debug),
            None,
        );
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Jsonl);
        assert_eq!(config.stage_directives(), vec!["score=trace".to_string()]);
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = LogConfig::from_values(None, Some("nope"), None, Some(LogFormat::Jsonl));
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Jsonl);
        assert!(config.stage_levels.is_empty());
    }
}
