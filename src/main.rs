//! invoice-harvester: pulls utility invoices from the customer portal into
//! a shared spreadsheet and a Drive folder.
//!
//! `extract` logs in to the portal with a scripted browser session, collects
//! invoice metadata over the portal's REST API, refreshes each client's tab
//! and uploads the PDFs it has not seen before. `paid` stamps the PDFs
//! linked from each tab and links the stamped copies next to them.

#![warn(clippy::all)]

mod cli;
mod collector;
mod config;
mod download;
mod invoice;
mod paid;
mod pipeline;
mod portal;
mod progress;
mod reconcile;
mod report;
pub mod retry;
mod shutdown;
mod store;
mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use config::{Account, Config, ExtractConfig, GoogleConfig, PaidConfig};
use download::DownloadConfig;
use paid::{PaidServices, PaidStamp};
use pipeline::ExtractServices;
use portal::webdriver::WebDriverFactory;
use portal::PortalLogin;
use progress::Progress;
use report::RunReport;
use store::auth::{ServiceAccountTokens, TokenProvider};
use store::drive::GoogleDrive;
use store::sheets::GoogleSheets;

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);
const PAID_CONCURRENCY: usize = 10;

struct Stores {
    sheet: Arc<GoogleSheets>,
    drive: Arc<GoogleDrive>,
}

async fn google_stores(google: &GoogleConfig, http: &reqwest::Client) -> anyhow::Result<Stores> {
    let tokens: Arc<dyn TokenProvider> =
        Arc::new(ServiceAccountTokens::from_key_file(&google.credentials).await?);
    Ok(Stores {
        sheet: Arc::new(GoogleSheets::new(
            http.clone(),
            Arc::clone(&tokens),
            &google.spreadsheet_id,
        )),
        drive: Arc::new(GoogleDrive::new(http.clone(), tokens)),
    })
}

/// Print progress lines as they arrive. The task ends once every sender
/// is dropped.
fn spawn_printer() -> (Progress, JoinHandle<()>) {
    let (progress, mut rx) = Progress::channel();
    let printer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            println!("{}", line);
        }
    });
    (progress, printer)
}

async fn run_extract(
    config: ExtractConfig,
    http: reqwest::Client,
    shutdown: tokio_util::sync::CancellationToken,
) -> anyhow::Result<RunReport> {
    let stores = google_stores(&config.google, &http).await?;
    std::fs::create_dir_all(&config.screenshot_dir).with_context(|| {
        format!(
            "Failed to create screenshot directory {}",
            config.screenshot_dir.display()
        )
    })?;

    let factory = Arc::new(WebDriverFactory::new(
        http.clone(),
        &config.webdriver_url,
        config.chrome_binary.clone(),
    ));
    let services = ExtractServices {
        login: PortalLogin::new(factory, &config.portal_url, &config.screenshot_dir),
        http,
        portal_api: config.portal_api.clone(),
        sheet: stores.sheet,
        objects: stores.drive,
        invoice_folder: config.invoice_folder.clone(),
        cutoff: config.cutoff,
        download: DownloadConfig {
            no_progress_bar: config.no_progress_bar,
            ..DownloadConfig::default()
        },
    };

    let (progress, printer) = spawn_printer();
    let mut report = RunReport::default();
    for client in &config.clients {
        if shutdown.is_cancelled() {
            tracing::info!(client = %client, "Skipped after shutdown request");
            report.skip(client);
            continue;
        }
        let account = match Account::from_env(client) {
            Ok(account) => account,
            Err(e) => {
                tracing::error!(client = %client, "{}", e);
                report.record(client, false, Some("missing configuration"));
                continue;
            }
        };
        progress.line(format!("=== {} ===", client));
        let ok = pipeline::process_account(&services, &account, &progress).await;
        report.record(client, ok, None);
    }
    drop(progress);
    let _ = printer.await;
    Ok(report)
}

async fn run_paid(config: PaidConfig, http: reqwest::Client) -> anyhow::Result<()> {
    let stores = google_stores(&config.google, &http).await?;
    let services = PaidServices {
        sheet: stores.sheet,
        objects: stores.drive,
        paid_folder: config.paid_folder.clone(),
        watermarker: Arc::new(PaidStamp),
        concurrency: PAID_CONCURRENCY,
        no_progress_bar: config.no_progress_bar,
    };

    let accounts: Vec<(String, Option<String>)> = config
        .clients
        .iter()
        .map(|client| {
            let tab = config::worksheet_for(client, |key| std::env::var(key).ok());
            (client.clone(), tab)
        })
        .collect();

    let (progress, printer) = spawn_printer();
    let summaries = paid::process_paid_batch(&services, &accounts, &progress).await;
    drop(progress);
    let _ = printer.await;

    println!();
    for (client, summary) in &summaries {
        println!("{}: {}", client, summary);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    let config = Config::from_cli(cli.command)?;
    let http = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;

    match config {
        Config::Extract(config) => {
            tracing::info!(clients = config.clients.len(), "Starting extraction");
            let shutdown = shutdown::install_signal_handler()?;
            let report = run_extract(config, http, shutdown).await?;
            println!();
            print!("{}", report);
            if report.any_failed() {
                std::process::exit(1);
            }
        }
        Config::Paid(config) => {
            tracing::info!(clients = config.clients.len(), "Starting paid batch");
            run_paid(config, http).await?;
        }
    }
    Ok(())
}
