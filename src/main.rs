use clap::Parser;
use tracing::{error, info};

use xero_invoice_attachments::{cli::Cli, config::Config, downloader, logging};

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_file, cli.log_level.into())?;

    info!("Starting Xero invoice attachment downloader...");
    match run(&cli).await {
        Ok(()) => {
            info!("Download process completed.");
            Ok(())
        }
        Err(e) => {
            error!("Error occurred: {e}");
            Err(e)
        }
    }
}

async fn run(cli: &Cli) -> miette::Result<()> {
    let config = Config::resolve(cli)?;
    tracing::debug!(?config, "configuration loaded");
    let summary = downloader::run(&config).await?;
    info!(
        "Invoices: {} found, {} processed, {} skipped, {} failed. Attachments: {} downloaded, {} skipped, {} failed.",
        summary.invoices_found,
        summary.invoices_processed,
        summary.invoices_skipped,
        summary.invoices_failed,
        summary.attachments_downloaded,
        summary.attachments_skipped,
        summary.attachments_failed
    );
    Ok(())
}
