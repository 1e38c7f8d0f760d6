use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "xero-invoice-attachments",
    version,
    about = "Download the files attached to a supplier's Xero invoices"
)]
pub struct Cli {
    /// INI file holding CLIENT_ID, CLIENT_SECRET, SUPPLIER_NAME and START_DATE
    #[arg(short = 'c', long, default_value = "config.ini")]
    pub config: PathBuf,

    /// Xero app client ID (overrides CLIENT_ID)
    #[arg(long, env = "XERO_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Xero app client secret (overrides CLIENT_SECRET).
    /// Prefer the XERO_CLIENT_SECRET environment variable, arguments are
    /// visible in process listings.
    #[arg(long, env = "XERO_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Exact contact name of the supplier (overrides SUPPLIER_NAME)
    #[arg(short = 's', long)]
    pub supplier: Option<String>,

    /// Earliest invoice date, YYYY-MM-DD (overrides START_DATE)
    #[arg(long)]
    pub start_date: Option<String>,

    /// Organisation to use instead of the first connection (overrides TENANT_ID)
    #[arg(long)]
    pub tenant_id: Option<String>,

    /// Space separated OAuth scopes (overrides SCOPES)
    #[arg(long)]
    pub scopes: Option<String>,

    /// Root directory for downloads (overrides OUTPUT_DIR)
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Run log, also read back to resume interrupted runs
    #[arg(long, default_value = "xero_download.log")]
    pub log_file: PathBuf,

    /// Pause between invoice pages and after each download, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub request_delay_ms: u64,

    /// List what would be downloaded without writing files or recording progress
    #[arg(long)]
    pub dry_run: bool,

    /// Console log level (RUST_LOG takes precedence)
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}
