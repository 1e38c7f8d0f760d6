//! The download run: authenticate, resolve the supplier, enumerate its
//! invoices and fetch every attachment not already on disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use time::OffsetDateTime;
use tokio::{fs, io::AsyncWriteExt, time::sleep};
use uuid::Uuid;

use crate::config::Config;
use crate::entities::{attachment::Attachment, invoice::Invoice};
use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::oauth::KeyPair;
use crate::utils::{
    date_format::format_iso_date,
    filename::{partial_name, supplier_folder_name, unique_attachment_name},
};
use crate::Client;

/// How the download loop behaves.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Root under which the supplier folder is created.
    pub output_dir: PathBuf,
    /// Pause after each downloaded file.
    pub request_delay: Duration,
    pub dry_run: bool,
}

impl From<&Config> for DownloadOptions {
    fn from(config: &Config) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            request_delay: config.request_delay,
            dry_run: config.dry_run,
        }
    }
}

/// Counters for a run. In a dry run `attachments_downloaded` counts the files
/// that would have been downloaded.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub invoices_found: usize,
    /// Invoices whose attachments were listed this run, whether or not every
    /// download succeeded.
    pub invoices_processed: usize,
    pub invoices_skipped: usize,
    pub invoices_failed: usize,
    pub attachments_downloaded: usize,
    pub attachments_skipped: usize,
    pub attachments_failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttachmentOutcome {
    Downloaded,
    Skipped,
    DryRun,
}

/// Walks a list of invoices, fetching attachments into the supplier folder
/// and recording progress in the ledger.
#[derive(Debug)]
pub struct Downloader<'a> {
    client: &'a Client,
    ledger: Ledger,
    options: DownloadOptions,
    target_dir: PathBuf,
}

impl<'a> Downloader<'a> {
    #[must_use]
    pub fn new(client: &'a Client, ledger: Ledger, options: DownloadOptions, supplier_name: &str) -> Self {
        let target_dir = options.output_dir.join(supplier_folder_name(supplier_name));
        Self {
            client,
            ledger,
            options,
            target_dir,
        }
    }

    /// `<output_dir>/<supplier folder>`
    #[must_use]
    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Creates the supplier folder. Nothing is created in a dry run.
    pub async fn prepare(&self) -> Result<()> {
        if self.options.dry_run {
            info!("[DRY RUN] Would save attachments to {}", self.target_dir.display());
            return Ok(());
        }
        fs::create_dir_all(&self.target_dir)
            .await
            .map_err(|e| Error::io(&self.target_dir, e))?;
        info!("Saving attachments to {}", self.target_dir.display());
        Ok(())
    }

    /// Processes invoices in the order given. Per-invoice failures are logged
    /// and counted; they never stop the loop.
    pub async fn process_invoices(&mut self, invoices: &[Invoice]) -> RunSummary {
        let mut summary = RunSummary {
            invoices_found: invoices.len(),
            ..RunSummary::default()
        };
        for invoice in invoices {
            self.process_invoice(invoice, &mut summary).await;
        }
        summary
    }

    #[instrument(skip_all, fields(invoice_id = %invoice.invoice_id))]
    async fn process_invoice(&mut self, invoice: &Invoice, summary: &mut RunSummary) {
        let invoice_id = invoice.invoice_id;
        let label = invoice.label();

        if self.ledger.is_invoice_finished(invoice_id) {
            info!("Skipping invoice: {label} (ID: {invoice_id}) - already processed");
            summary.invoices_skipped += 1;
            return;
        }

        let date = invoice.date.map_or_else(|| "N/A".to_string(), format_iso_date);
        info!("Processing invoice: {label} (ID: {invoice_id}, Date: {date})");

        let attachments = match self.list_attachments(invoice).await {
            Ok(attachments) => attachments,
            Err(e) => {
                error!("Failed to fetch attachments for {label}: {e}");
                summary.invoices_failed += 1;
                return;
            }
        };
        summary.invoices_processed += 1;

        if attachments.is_empty() {
            info!("No attachments found for invoice {label}");
        }

        let mut failed = 0;
        for attachment in &attachments {
            info!("Found attachment: {}", attachment.file_name);
            match self.handle_attachment(invoice_id, &label, attachment).await {
                Ok(AttachmentOutcome::Downloaded | AttachmentOutcome::DryRun) => {
                    summary.attachments_downloaded += 1;
                }
                Ok(AttachmentOutcome::Skipped) => summary.attachments_skipped += 1,
                Err(e) => {
                    error!("Failed to download {}: {e}", attachment.file_name);
                    failed += 1;
                }
            }
        }
        summary.attachments_failed += failed;

        if failed > 0 {
            warn!("Invoice {label} has {failed} failed attachment(s) and will be retried on the next run");
            summary.invoices_failed += 1;
        } else if !self.options.dry_run {
            self.ledger
                .record_invoice_finished(invoice_id, &label, attachments.len());
        }
    }

    async fn list_attachments(&self, invoice: &Invoice) -> Result<Vec<Attachment>> {
        if invoice.has_attachments == Some(false) {
            return Ok(Vec::new());
        }
        self.client
            .invoices()
            .list_attachments(invoice.invoice_id)
            .await
    }

    async fn handle_attachment(
        &mut self,
        invoice_id: Uuid,
        label: &str,
        attachment: &Attachment,
    ) -> Result<AttachmentOutcome> {
        let unique_name = unique_attachment_name(label, &attachment.file_name)?;
        let path = self.target_dir.join(&unique_name);
        if self.ledger.is_downloaded(&unique_name) {
            if fs::try_exists(&path).await.unwrap_or(false) {
                info!("Skipping {unique_name} - already downloaded");
                return Ok(AttachmentOutcome::Skipped);
            }
            warn!(
                "{unique_name} is recorded as downloaded but missing from {}, downloading again",
                self.target_dir.display()
            );
        }

        if self.options.dry_run {
            info!("[DRY RUN] Would download {}", path.display());
            return Ok(AttachmentOutcome::DryRun);
        }

        let result = self
            .download_attachment(invoice_id, &attachment.file_name, &unique_name, &path)
            .await;
        sleep(self.options.request_delay).await;
        result?;

        self.ledger.record_download(&unique_name);
        Ok(AttachmentOutcome::Downloaded)
    }

    /// Fetches one attachment into `path` through a `.part` file.
    async fn download_attachment(
        &self,
        invoice_id: Uuid,
        file_name: &str,
        unique_name: &str,
        path: &Path,
    ) -> Result<()> {
        let response = self
            .client
            .invoices()
            .get_attachment_by_filename(invoice_id, file_name)
            .await?;

        let part_path = self.target_dir.join(partial_name(unique_name));
        let written = match write_body(response, &part_path).await {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&part_path).await;
                return Err(e);
            }
        };
        fs::rename(&part_path, path)
            .await
            .map_err(|e| Error::io(path, e))?;
        debug!(path = %path.display(), bytes = written, "saved attachment");
        Ok(())
    }
}

/// Streams a response body into `part_path`, returning the bytes written.
async fn write_body(response: reqwest::Response, part_path: &Path) -> Result<u64> {
    let mut file = fs::File::create(part_path)
        .await
        .map_err(|e| Error::io(part_path, e))?;

    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| Error::io(part_path, e))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| Error::io(part_path, e))?;
    Ok(written)
}

/// Runs the whole download for `config`.
///
/// Token, tenant, contact and invoice listing failures abort the run. Failures
/// for a single invoice or attachment are logged and counted in the summary.
#[instrument(skip_all, fields(supplier = %config.supplier_name))]
pub async fn run(config: &Config) -> Result<RunSummary> {
    let ledger = Ledger::load(&config.log_file)?;

    let key_pair = KeyPair::new(config.client_id.clone(), config.client_secret.clone());
    let mut client =
        Client::from_client_credentials(key_pair, config.scopes.clone(), config.api_urls.clone())
            .await?;

    let connection = client.connections().select(config.tenant_id).await?;
    info!("Using tenant ID: {}", connection.tenant_id);
    client.set_tenant(Some(connection.tenant_id));

    let contact = client.contacts().find_by_name(&config.supplier_name).await?;
    info!("Found '{}' with ContactID: {}", config.supplier_name, contact.contact_id);

    let invoices = client
        .invoices()
        .list_for_contact_since(contact.contact_id, config.start_date, config.request_delay)
        .await?;
    let today = OffsetDateTime::now_utc().date();
    info!(
        "Found {} invoices for '{}' from {} to {}",
        invoices.len(),
        config.supplier_name,
        format_iso_date(config.start_date),
        format_iso_date(today)
    );

    let mut downloader = Downloader::new(&client, ledger, DownloadOptions::from(config), &config.supplier_name);
    downloader.prepare().await?;
    let summary = downloader.process_invoices(&invoices).await;

    info!("Processed {} new invoices.", summary.invoices_processed);
    debug!(?summary, "run finished");
    Ok(summary)
}
