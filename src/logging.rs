//! Log sinks for a run.
//!
//! Every event goes to `logging.log`. Events on the `api` and `store` targets
//! are also written to their own channel files so failed requests and failed
//! statements can be reviewed apart from the run narrative. All files share
//! one line layout:
//!
//! ```text
//! 2024-03-01 14:02:11.493 | api | WARN | https://api.census.gov/... returned HTTP 500
//! ```
//!
//! [`export_log_report`] turns `logging.log` into a CSV once the run is over.

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::download::API_TARGET;
use crate::writer::STORE_TARGET;

pub const MAIN_LOG: &str = "logging.log";
pub const API_LOG: &str = "api_log.txt";
pub const STORE_LOG: &str = "store_log.txt";
pub const LOG_REPORT: &str = "LOGFILE.csv";

const FIELD_SEPARATOR: &str = " | ";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_dir: PathBuf,
    /// Filter directives used when `RUST_LOG` is unset
    pub filter: String,
    /// Mirror events to stderr; off while the terminal UI owns the screen
    pub console: bool,
}

impl LogConfig {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            filter: "info".to_string(),
            console: false,
        }
    }
}

/// Keeps the file writers alive; dropping it flushes every sink
pub struct LogGuard {
    _guards: Vec<WorkerGuard>,
}

/// Install the global subscriber. Call once, before the run starts.
pub fn init_logging(config: &LogConfig) -> Result<LogGuard> {
    fs::create_dir_all(&config.log_dir).context("Failed to create log directory")?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .context("Invalid log filter")?;

    let (main_writer, main_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(&config.log_dir, MAIN_LOG));
    let (api_writer, api_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(&config.log_dir, API_LOG));
    let (store_writer, store_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(&config.log_dir, STORE_LOG));

    let console_layer = config.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
    });

    let main_layer = tracing_subscriber::fmt::layer()
        .event_format(PipeFormat)
        .with_writer(main_writer)
        .with_ansi(false);

    let api_layer = tracing_subscriber::fmt::layer()
        .event_format(PipeFormat)
        .with_writer(api_writer)
        .with_ansi(false)
        .with_filter(Targets::new().with_target(API_TARGET, LevelFilter::TRACE));

    let store_layer = tracing_subscriber::fmt::layer()
        .event_format(PipeFormat)
        .with_writer(store_writer)
        .with_ansi(false)
        .with_filter(Targets::new().with_target(STORE_TARGET, LevelFilter::TRACE));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(main_layer)
        .with(api_layer)
        .with(store_layer)
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(LogGuard {
        _guards: vec![main_guard, api_guard, store_guard],
    })
}

/// `timestamp | origin | LEVEL | message`
struct PipeFormat;

impl<S, N> FormatEvent<S, N> for PipeFormat
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
        let meta = event.metadata();
        write!(
            writer,
            "{}{sep}{}{sep}{}{sep}",
            Local::now().format(TIMESTAMP_FORMAT),
            origin(meta.target()),
            meta.level(),
            sep = FIELD_SEPARATOR
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn origin(target: &str) -> &str {
    match target {
        API_TARGET | STORE_TARGET => target,
        _ => "run",
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
struct LogRecord {
    event_time: String,
    origin: String,
    level: String,
    message: String,
}

/// Convert `logging.log` in `log_dir` into `LOGFILE.csv` beside it.
///
/// Lines that do not start a new event (multi-line messages) are appended to
/// the message of the event before them.
pub fn export_log_report(log_dir: &Path) -> Result<PathBuf> {
    let source = log_dir.join(MAIN_LOG);
    let text = fs::read_to_string(&source)
        .with_context(|| format!("Failed to read {}", source.display()))?;

    let mut records: Vec<LogRecord> = Vec::new();
    for line in text.lines() {
        let parts: Vec<&str> = line.splitn(4, FIELD_SEPARATOR).collect();
        match (parts.as_slice(), records.last_mut()) {
            ([time, origin, level, message], _) => records.push(LogRecord {
                event_time: time.to_string(),
                origin: origin.to_string(),
                level: level.to_string(),
                message: message.to_string(),
            }),
            (_, Some(last)) => {
                last.message.push('\n');
                last.message.push_str(line);
            }
            (_, None) => {}
        }
    }

    let target = log_dir.join(LOG_REPORT);
    let mut writer = csv::Writer::from_path(&target)
        .with_context(|| format!("Failed to create {}", target.display()))?;
    for record in &records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    Ok(target)
}
