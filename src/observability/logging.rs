//! Log setup for the probe binary
//!
//! Level comes from `-v` (one for DEBUG, more for TRACE), else `LOG_LEVEL`,
//! else INFO. `LOG_FORMAT` picks json, pretty or the default compact output.
//! `LOG_SPANS=true` adds span open/close lines. `RUST_LOG` replaces the
//! whole filter when set.

use std::env;
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Engine crates that are chatty at DEBUG
const QUIET_CRATES: [&str; 2] = ["rumqttc=warn", "tokio=warn"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl LogFormat {
    /// Anything unrecognised is compact
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }
}

/// Map a `LOG_LEVEL` value to a level, defaulting to INFO
pub fn parse_level(s: &str) -> Level {
    s.trim().parse().unwrap_or(Level::INFO)
}

/// Map the `-v` count to a level; `None` leaves the choice to `LOG_LEVEL`
pub fn level_from_verbosity(verbose: u8) -> Option<Level> {
    match verbose {
        0 => None,
        1 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

/// Resolved logging choices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    pub level: Level,
    pub format: LogFormat,
    pub spans: bool,
}

impl LogSettings {
    /// Combine the `-v` count with the raw environment values
    pub fn resolve(
        verbose: u8,
        log_level: Option<&str>,
        log_format: Option<&str>,
        log_spans: Option<&str>,
    ) -> Self {
        let level = level_from_verbosity(verbose)
            .unwrap_or_else(|| log_level.map(parse_level).unwrap_or(Level::INFO));
        Self {
            level,
            format: log_format.map(LogFormat::parse).unwrap_or(LogFormat::Compact),
            spans: log_spans.is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
        }
    }

    pub fn from_env(verbose: u8) -> Self {
        Self::resolve(
            verbose,
            env::var("LOG_LEVEL").ok().as_deref(),
            env::var("LOG_FORMAT").ok().as_deref(),
            env::var("LOG_SPANS").ok().as_deref(),
        )
    }
}

fn build_filter(level: Level, rust_log: Option<&str>) -> EnvFilter {
    if let Some(directives) = rust_log {
        return EnvFilter::new(directives);
    }
    QUIET_CRATES
        .iter()
        .filter_map(|d| d.parse::<Directive>().ok())
        .fold(EnvFilter::new(level.to_string()), |f, d| f.add_directive(d))
}

fn span_events(include_spans: bool) -> FmtSpan {
    if include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

/// Install the global subscriber; panics if one is already set
pub fn init_logging(level: Level, format: LogFormat, include_spans: bool) {
    let filter = build_filter(level, env::var("RUST_LOG").ok().as_deref());
    let registry = tracing_subscriber::registry().with(filter);
    let spans = span_events(include_spans);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_span_events(spans))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_ansi(true).with_span_events(spans))
            .init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_ansi(true)
                    .with_target(false)
                    .with_span_events(spans),
            )
            .init(),
    }
}

pub fn init_default_logging(verbose: u8) {
    let settings = LogSettings::from_env(verbose);
    init_logging(settings.level, settings.format, settings.spans);
}

/// Span wrapping everything done on one broker connection
#[macro_export]
macro_rules! mqtt_span {
    ($($field:tt)*) => {
        tracing::info_span!("mqtt_operation", $($field)*)
    };
}

pub use mqtt_span;
