//! Download/upload orchestrator. Each invoice PDF is resolved against the
//! storage folder through the shared [`FileCache`]: hits cost nothing,
//! misses are fetched from the portal and uploaded once. Runs a bounded
//! concurrent pass, then a smaller pass over whatever failed.

pub mod error;

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};

pub use self::error::DownloadError;
use crate::invoice::InvoiceRecord;
use crate::store::FileCache;
use crate::types::FetchOutcome;

/// Where invoice PDFs come from.
#[async_trait]
pub trait InvoicePdfSource: Send + Sync {
    async fn fetch_pdf(&self, invoice: &InvoiceRecord) -> Result<Vec<u8>, DownloadError>;
}

#[derive(Debug, Clone, Copy)]
pub struct DownloadConfig {
    pub concurrency: usize,
    pub retry_concurrency: usize,
    pub no_progress_bar: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            retry_concurrency: 3,
            no_progress_bar: false,
        }
    }
}

/// Outcome of one task, applied to the dataset by a single consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub invoice_number: String,
    pub file_id: String,
    pub outcome: FetchOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub exists: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

struct DownloadTask {
    filename: String,
    invoice: InvoiceRecord,
}

/// Owns the dataset for the duration of the run; the only writer.
struct ResultSink<'a> {
    records: &'a mut [InvoiceRecord],
    report: DownloadReport,
}

impl ResultSink<'_> {
    fn apply(&mut self, result: FetchResult) {
        match result.outcome {
            FetchOutcome::Exists => self.report.exists += 1,
            FetchOutcome::Downloaded => self.report.downloaded += 1,
        }
        for record in self
            .records
            .iter_mut()
            .filter(|r| r.invoice_number == result.invoice_number)
        {
            record.file_id = Some(result.file_id.clone());
        }
    }
}

/// Create a progress bar with a consistent template.
///
/// Hidden when disabled or when stdout is not a TTY.
pub(crate) fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    ) {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Resolve a PDF for every record that has an invoice number and write
/// the resulting file ids back into `records`.
pub async fn sync_invoice_pdfs(
    records: &mut [InvoiceRecord],
    source: &dyn InvoicePdfSource,
    cache: &FileCache,
    config: &DownloadConfig,
) -> DownloadReport {
    let started = Instant::now();
    let tasks: Vec<DownloadTask> = records
        .iter()
        .filter(|r| r.has_invoice_number())
        .map(|r| DownloadTask {
            filename: r.pdf_filename(),
            invoice: r.clone(),
        })
        .collect();

    let mut sink = ResultSink {
        records,
        report: DownloadReport::default(),
    };
    if tasks.is_empty() {
        tracing::info!("No invoices to download");
        return sink.report;
    }

    let total = tasks.len();
    let failed = run_pass(tasks, source, cache, config.concurrency, config, &mut sink).await;

    let failed = if failed.is_empty() {
        failed
    } else {
        tracing::info!(
            "── Retry pass: {} failed invoices (concurrency: {}) ──",
            failed.len(),
            config.retry_concurrency
        );
        run_pass(failed, source, cache, config.retry_concurrency, config, &mut sink).await
    };

    for task in &failed {
        tracing::error!(invoice = %task.invoice.invoice_number, "Giving up on {}", task.filename);
    }

    sink.report.failed = failed.len();
    sink.report.elapsed = started.elapsed();
    tracing::info!("── Summary ──");
    tracing::info!(
        "  {} existing, {} downloaded, {} failed, {} total",
        sink.report.exists,
        sink.report.downloaded,
        sink.report.failed,
        total
    );
    tracing::info!("  elapsed: {}", format_duration(sink.report.elapsed));
    sink.report
}

/// One bounded pass. Results are consumed as they complete; the tasks
/// that failed are handed back.
async fn run_pass(
    tasks: Vec<DownloadTask>,
    source: &dyn InvoicePdfSource,
    cache: &FileCache,
    concurrency: usize,
    config: &DownloadConfig,
    sink: &mut ResultSink<'_>,
) -> Vec<DownloadTask> {
    let pb = create_progress_bar(config.no_progress_bar, tasks.len() as u64);
    let mut failed = Vec::new();

    let results = stream::iter(tasks)
        .map(|task| async move {
            let result = cache
                .resolve(&task.filename, || source.fetch_pdf(&task.invoice))
                .await;
            (task, result)
        })
        .buffer_unordered(concurrency.max(1));
    tokio::pin!(results);

    while let Some((task, result)) = results.next().await {
        pb.set_message(task.filename.clone());
        match result {
            Ok(resolution) => {
                tracing::debug!(
                    invoice = %task.invoice.invoice_number,
                    outcome = %resolution.outcome,
                    "{}",
                    task.filename
                );
                sink.apply(FetchResult {
                    invoice_number: task.invoice.invoice_number.clone(),
                    file_id: resolution.id,
                    outcome: resolution.outcome,
                });
            }
            Err(e) => {
                pb.suspend(|| {
                    if e.is_portal() {
                        tracing::warn!("Fetch failed: {}: {}", task.filename, e);
                    } else {
                        tracing::warn!("Upload failed: {}: {}", task.filename, e);
                    }
                });
                failed.push(task);
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    failed
}
