//! # xero-invoice-attachments
//!
//! Downloads every file attached to a supplier's invoices in Xero.
//!
//! A run authenticates with the client-credentials grant, picks the tenant,
//! looks the supplier up by exact contact name, pages through its invoices
//! since a start date and streams each attachment to
//! `<output_dir>/<supplier>/<invoice number>_<file name>`.
//!
//! ## Resuming
//!
//! Progress is recorded as marker lines in the run log (see [`ledger`]). The
//! next run reads the log back and skips finished invoices and files that were
//! already downloaded, so an interrupted run can simply be started again.
//!
//! ```ignore
//! use xero_invoice_attachments::{cli::Cli, config::Config, downloader};
//! use clap::Parser;
//!
//! let config = Config::resolve(&Cli::parse())?;
//! xero_invoice_attachments::logging::init(&config.log_file, tracing::Level::INFO)?;
//! let summary = downloader::run(&config).await?;
//! println!("{} files downloaded", summary.attachments_downloaded);
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

#[macro_use]
extern crate tracing;

pub mod cli;
pub mod client;
pub mod config;
pub mod downloader;
pub mod endpoints;
pub mod entities;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod oauth;
pub mod scope;
pub mod utils;

pub use client::Client;
pub use config::Config;
pub use downloader::{DownloadOptions, Downloader, RunSummary};
pub use endpoints::{ApiUrls, XeroEndpoint};
pub use entities::*;
pub use error::Error;
pub use ledger::Ledger;
pub use oauth::KeyPair;
pub use scope::{Permission, Scope, ScopeType};
