//! Run configuration: an INI file with command-line overrides.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::{Ini, ParseOption};
use miette::Diagnostic;
use thiserror::Error;
use time::{Date, macros::format_description};
use uuid::Uuid;

use crate::cli::Cli;
use crate::endpoints::ApiUrls;
use crate::scope::{ParseScopeError, Scope};

pub const DEFAULT_OUTPUT_DIR: &str = "invoice_attachments";

const CLIENT_ID: &str = "CLIENT_ID";
const CLIENT_SECRET: &str = "CLIENT_SECRET";
const SUPPLIER_NAME: &str = "SUPPLIER_NAME";
const START_DATE: &str = "START_DATE";
const TENANT_ID: &str = "TENANT_ID";
const SCOPES: &str = "SCOPES";
const OUTPUT_DIR: &str = "OUTPUT_DIR";

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("missing required config key: {key}")]
    #[diagnostic(
        code(xero_invoice_attachments::config::missing_key),
        help("Add {key} to the [DEFAULT] section of the config file or pass it on the command line")
    )]
    MissingKey { key: &'static str },

    #[error("START_DATE must be in YYYY-MM-DD format, got '{value}'")]
    #[diagnostic(code(xero_invoice_attachments::config::invalid_start_date))]
    InvalidStartDate { value: String },

    #[error("TENANT_ID '{value}' is not a UUID")]
    #[diagnostic(
        code(xero_invoice_attachments::config::invalid_tenant_id),
        help("Use the tenantId of a connection, e.g. 45e4708e-d862-4111-ab3a-dd8cd03913e1")
    )]
    InvalidTenantId {
        value: String,
        #[source]
        source: uuid::Error,
    },

    #[error(transparent)]
    #[diagnostic(
        code(xero_invoice_attachments::config::invalid_scope),
        help("Known scopes are accounting.transactions, accounting.contacts, accounting.attachments and accounting.settings, each optionally with a .read suffix")
    )]
    InvalidScope(#[from] ParseScopeError),

    #[error("could not read config file {}", .path.display())]
    #[diagnostic(code(xero_invoice_attachments::config::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file {}", .path.display())]
    #[diagnostic(code(xero_invoice_attachments::config::parse))]
    Parse {
        path: PathBuf,
        #[source]
        source: ini::ParseError,
    },
}

/// Values read from the config file, keyed by upper-cased key name.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    values: HashMap<String, String>,
}

impl ConfigFile {
    /// Parses INI text. Keys in `[DEFAULT]` (any case) and keys outside any
    /// section are read; key names are case-insensitive.
    pub fn from_ini_str(text: &str) -> Result<Self, ini::ParseError> {
        let options = ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_str_opt(text, options)?;

        let mut values = HashMap::new();
        for (section, properties) in ini.iter() {
            if !section.is_none_or(|name| name.eq_ignore_ascii_case("DEFAULT")) {
                continue;
            }
            for (key, value) in properties.iter() {
                values.insert(key.trim().to_ascii_uppercase(), value.trim().to_string());
            }
        }
        Ok(Self { values })
    }

    /// Reads the file at `path`. A missing file reads as empty.
    pub fn from_ini_file(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config file not found");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_ini_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The value for `key`, or `None` when absent or blank.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(&key.to_ascii_uppercase())
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    fn contains(&self, key: &str) -> bool {
        self.values.contains_key(&key.to_ascii_uppercase())
    }
}

impl std::fmt::Debug for ConfigFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("ConfigFile").field("keys", &keys).finish()
    }
}

/// Everything a run needs, validated.
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub supplier_name: String,
    pub start_date: Date,
    pub tenant_id: Option<Uuid>,
    /// An empty collection asks Xero for the scopes configured on the app.
    pub scopes: Scope,
    pub output_dir: PathBuf,
    pub log_file: PathBuf,
    pub request_delay: Duration,
    pub dry_run: bool,
    pub api_urls: ApiUrls,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("supplier_name", &self.supplier_name)
            .field("start_date", &self.start_date)
            .field("tenant_id", &self.tenant_id)
            .field("scopes", &self.scopes.to_string())
            .field("output_dir", &self.output_dir)
            .field("log_file", &self.log_file)
            .field("request_delay", &self.request_delay)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Reads the file named by `--config` and applies the command line on top.
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let file = ConfigFile::from_ini_file(&cli.config)?;
        Self::merge(&file, cli)
    }

    /// Merges file values with command-line overrides (the command line wins)
    /// and validates the result.
    pub fn merge(file: &ConfigFile, cli: &Cli) -> Result<Self, ConfigError> {
        let required = |cli_value: Option<&str>, key: &'static str| {
            cli_value
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .or_else(|| file.get(key))
                .map(str::to_string)
                .ok_or(ConfigError::MissingKey { key })
        };

        let client_id = required(cli.client_id.as_deref(), CLIENT_ID)?;
        let client_secret = required(cli.client_secret.as_deref(), CLIENT_SECRET)?;
        let supplier_name = required(cli.supplier.as_deref(), SUPPLIER_NAME)?;
        let start_date = parse_start_date(&required(cli.start_date.as_deref(), START_DATE)?)?;

        let tenant_id = cli
            .tenant_id
            .as_deref()
            .or_else(|| file.get(TENANT_ID))
            .map(|value| {
                Uuid::parse_str(value.trim()).map_err(|source| ConfigError::InvalidTenantId {
                    value: value.to_string(),
                    source,
                })
            })
            .transpose()?;

        let scopes = match cli.scopes.as_deref() {
            Some(list) => Scope::parse_list(list)?,
            None if file.contains(SCOPES) => Scope::parse_list(file.get(SCOPES).unwrap_or_default())?,
            None => Scope::downloader_default(),
        };

        let output_dir = cli
            .output_dir
            .clone()
            .or_else(|| file.get(OUTPUT_DIR).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

        Ok(Self {
            client_id,
            client_secret,
            supplier_name,
            start_date,
            tenant_id,
            scopes,
            output_dir,
            log_file: cli.log_file.clone(),
            request_delay: Duration::from_millis(cli.request_delay_ms),
            dry_run: cli.dry_run,
            api_urls: ApiUrls::default(),
        })
    }
}

fn parse_start_date(value: &str) -> Result<Date, ConfigError> {
    Date::parse(value, format_description!("[year]-[month]-[day]")).map_err(|_| {
        ConfigError::InvalidStartDate {
            value: value.to_string(),
        }
    })
}
