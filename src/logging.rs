//! Subscriber set-up for the binary.
//!
//! Two layers are installed: a console layer for people, filtered by
//! `RUST_LOG` or `--log-level`, and the ledger layer, which appends this
//! crate's INFO-and-above events to the log file that [`crate::ledger`]
//! reads back on the next run.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use time::{OffsetDateTime, macros::format_description};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::Targets,
    fmt::{FmtContext, FormatEvent, FormatFields, format::Writer},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

use crate::error::{Error, Result};

/// Events from this target (and its modules) are written to the ledger file.
pub const LEDGER_TARGET: &str = "xero_invoice_attachments";

/// `2024-03-01 10:00:02,450 - INFO - message`, timestamps in UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct LedgerFormat;

impl<S, N> FormatEvent<S, N> for LedgerFormat
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
        let now = OffsetDateTime::now_utc();
        let timestamp = now
            .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
            .map_err(|_| fmt::Error)?;
        write!(
            writer,
            "{timestamp},{:03} - {} - ",
            now.millisecond(),
            event.metadata().level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Opens the log file for appending, creating it when missing.
pub fn open_log_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::io(path, e))
}

/// The ledger layer. It carries its own filter so the console filter never
/// hides marker lines from the file. Each event reaches the file in a single
/// unbuffered write.
pub fn ledger_layer<S>(file: File) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .event_format(LedgerFormat)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .with_filter(Targets::new().with_target(LEDGER_TARGET, Level::INFO))
}

/// Installs the global subscriber.
pub fn init(log_file: &Path, level: Level) -> Result<()> {
    let file = open_log_file(log_file)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::builder().parse_lossy(level.as_str().to_ascii_lowercase()));
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(ledger_layer(file))
        .try_init()
        .map_err(Error::LoggingInit)?;

    debug!(log_file = %log_file.display(), ?level, "logging initialized");
    Ok(())
}
