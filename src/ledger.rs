//! Resumption state recovered from the run log.
//!
//! Every run appends marker lines to the log file through the ledger logging
//! layer. On start-up the file is read back and the markers tell the
//! downloader which invoices are complete and which files already exist.

use std::collections::HashSet;
use std::path::Path;

use uuid::Uuid;

use crate::error::{Error, Result};

/// Written once every attachment of an invoice has been handled.
pub const INVOICE_FINISHED_MARKER: &str = "Finished invoice: ";
/// Written after an attachment has been renamed into place.
pub const DOWNLOADED_MARKER: &str = "Downloaded attachment: ";

const ID_PREFIX: &str = "(ID: ";

/// Finished invoices and downloaded files, keyed the way the markers record them.
#[derive(Debug, Default, Clone)]
pub struct Ledger {
    finished_invoices: HashSet<Uuid>,
    downloaded: HashSet<String>,
}

impl Ledger {
    /// Reads the log at `path`. A missing file gives an empty ledger.
    #[instrument]
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no log file yet, starting with an empty ledger");
                return Ok(Self::default());
            }
            Err(e) => return Err(Error::io(path, e)),
        };

        let ledger = Self::parse(&String::from_utf8_lossy(&bytes));
        debug!(
            finished_invoices = ledger.finished_invoices.len(),
            downloaded = ledger.downloaded.len(),
            "loaded ledger"
        );
        Ok(ledger)
    }

    /// Builds a ledger from log text.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut ledger = Self::default();
        for line in text.lines() {
            ledger.parse_line(line);
        }
        ledger
    }

    /// Applies a single log line. Lines without a marker are ignored, and so is
    /// a finished-invoice line whose ID does not parse.
    pub fn parse_line(&mut self, line: &str) {
        if let Some((_, rest)) = line.split_once(DOWNLOADED_MARKER) {
            let name = rest.trim_end_matches(['\r', '\n']);
            if !name.is_empty() {
                self.downloaded.insert(name.to_string());
            }
        } else if let Some((_, rest)) = line.split_once(INVOICE_FINISHED_MARKER) {
            if let Some(invoice_id) = parse_invoice_id(rest) {
                self.finished_invoices.insert(invoice_id);
            }
        }
    }

    #[must_use]
    pub fn is_invoice_finished(&self, invoice_id: Uuid) -> bool {
        self.finished_invoices.contains(&invoice_id)
    }

    #[must_use]
    pub fn is_downloaded(&self, unique_name: &str) -> bool {
        self.downloaded.contains(unique_name)
    }

    #[must_use]
    pub fn finished_invoice_count(&self) -> usize {
        self.finished_invoices.len()
    }

    #[must_use]
    pub fn downloaded_count(&self) -> usize {
        self.downloaded.len()
    }

    /// Remembers a downloaded file and writes its marker line.
    pub fn record_download(&mut self, unique_name: &str) {
        self.downloaded.insert(unique_name.to_string());
        info!("{DOWNLOADED_MARKER}{unique_name}");
    }

    /// Remembers a completed invoice and writes its marker line.
    pub fn record_invoice_finished(&mut self, invoice_id: Uuid, label: &str, attachments: usize) {
        self.finished_invoices.insert(invoice_id);
        info!("{INVOICE_FINISHED_MARKER}{label} (ID: {invoice_id}, attachments: {attachments})");
    }
}

/// `INV-0042 (ID: <uuid>, attachments: 2)` -> `<uuid>`. The last `(ID: ` wins so
/// that a label containing the same text cannot shadow the real ID.
fn parse_invoice_id(rest: &str) -> Option<Uuid> {
    let (_, after) = rest.rsplit_once(ID_PREFIX)?;
    let end = after.find([',', ')']).unwrap_or(after.len());
    Uuid::parse_str(after[..end].trim()).ok()
}
