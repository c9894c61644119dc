//! Tracing setup and log-safe formatting helpers.
//!
//! Under Stash, plugin stderr lines are framed as `SOH <level> STX <message>`
//! so the Stash log view can assign a level to each line. In dev mode the
//! regular `fmt` output is used instead.

mod rotate;

pub use rotate::{FileRotation, RotateWhen, RotatingFile};

use crate::config::LogConfig;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::sync::Mutex;
use tracing::{Dispatch, Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const REDACTED_KEYS: &[&str] = &["apiKey", "X-Api-Key", "apikey", "WHISPARR_KEY"];

/// Event format understood by the Stash plugin log reader
pub struct StashLogFormat;

impl<S, N> FormatEvent<S, N> for StashLogFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "\x01{}\x02", stash_level_char(event.metadata().level()))?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn stash_level_char(level: &Level) -> char {
    match *level {
        Level::TRACE => 't',
        Level::DEBUG => 'd',
        Level::INFO => 'i',
        Level::WARN => 'w',
        Level::ERROR => 'e',
    }
}

/// Parse a level name as written in the config (`WARNING` and `CRITICAL` included).
pub fn parse_level(name: &str, fallback: LevelFilter) -> LevelFilter {
    match name.trim().to_ascii_uppercase().as_str() {
        "TRACE" => LevelFilter::TRACE,
        "DEBUG" => LevelFilter::DEBUG,
        "INFO" => LevelFilter::INFO,
        "WARN" | "WARNING" => LevelFilter::WARN,
        "ERROR" | "CRITICAL" => LevelFilter::ERROR,
        "OFF" => LevelFilter::OFF,
        _ => fallback,
    }
}

fn crate_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::new(format!("whisparr_bridge={},warn", level))
}

fn console_filter(config: &LogConfig, verbose: bool) -> EnvFilter {
    // Respect RUST_LOG if set, otherwise our crate at the configured level
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose {
            LevelFilter::DEBUG
        } else {
            parse_level(&config.log_level, LevelFilter::INFO)
        };
        crate_filter(level)
    })
}

/// File name for a scene log. Only ASCII alphanumerics, `-` and `_` of the
/// id are kept, so the file always lands inside the log directory.
pub fn log_file_name(scene_id: Option<&str>) -> String {
    let stem: String = scene_id
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if stem.is_empty() {
        "bridge.log".to_string()
    } else {
        format!("{}.log", stem)
    }
}

/// Build a subscriber from the logging config.
///
/// The file layer, when enabled, writes to `<location>/<scene id>.log`
/// (`bridge.log` without a scene id) and rotates per `LOG_FILE_TYPE`.
pub fn build_dispatch(
    config: &LogConfig,
    scene_id: Option<&str>,
    verbose: bool,
    stash_format: bool,
) -> anyhow::Result<Dispatch> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.log_console_enable {
        let filter = console_filter(config, verbose);
        let layer: Box<dyn Layer<Registry> + Send + Sync> = if stash_format {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .event_format(StashLogFormat)
                .with_filter(filter)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter)
                .boxed()
        };
        layers.push(layer);
    }

    if config.log_file_enable {
        let rotation = FileRotation::from_config(config)?;
        std::fs::create_dir_all(&config.log_file_location)?;
        let path = config.log_file_location.join(log_file_name(scene_id));
        let file = RotatingFile::open(path, rotation)?;
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(config.log_file_use_color)
                .with_filter(crate_filter(parse_level(
                    &config.log_file_level,
                    LevelFilter::DEBUG,
                )))
                .boxed(),
        );
    }

    Ok(Dispatch::new(tracing_subscriber::registry().with(layers)))
}

/// Shorten a path for logging, keeping its tail.
pub fn truncate_path(path: &Path, max_len: usize) -> String {
    let s = path.display().to_string();
    let len = s.chars().count();
    if len <= max_len {
        return s;
    }
    let keep = max_len.saturating_sub(3);
    let tail: String = s.chars().skip(len - keep).collect();
    format!("...{}", tail)
}

/// JSON preview for logs with credentials redacted, capped at `max_len` chars.
pub fn safe_json_preview(data: &Value, max_len: usize) -> String {
    let text = match data {
        Value::Object(map) => {
            let mut redacted = map.clone();
            for key in REDACTED_KEYS {
                if let Some(value) = redacted.get_mut(*key) {
                    *value = Value::String("***REDACTED***".to_string());
                }
            }
            Value::Object(redacted).to_string()
        }
        other => other.to_string(),
    };

    if text.chars().count() <= max_len {
        return text;
    }
    let head: String = text.chars().take(max_len).collect();
    format!("{}...(truncated)", head)
}
