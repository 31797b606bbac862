//! Paid variants: for every invoice link in a tab, stamp the stored PDF,
//! store the copy once in the paid folder and link it from column K.

pub mod watermark;

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use thiserror::Error;

pub use self::watermark::{PaidStamp, WatermarkError, Watermarker};
use crate::download::create_progress_bar;
use crate::progress::Progress;
use crate::store::{
    file_id_from_link, view_link, CellUpdate, FileCache, ObjectStore, SpreadsheetStore, StoreError,
};

const LINK_RANGE: &str = "J2:J";
const FIRST_DATA_ROW: usize = 2;
const DRIVE_HOST: &str = "drive.google.com";

#[derive(Debug, Error)]
pub enum PaidError {
    #[error("link does not reference a stored file: {0}")]
    BadLink(String),

    #[error("stored file {0} is not a PDF")]
    NotPdf(String),

    #[error("watermark failed: {0}")]
    Watermark(#[from] WatermarkError),

    #[error("watermark task panicked: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct PaidServices {
    pub sheet: Arc<dyn SpreadsheetStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub paid_folder: String,
    pub watermarker: Arc<dyn Watermarker>,
    pub concurrency: usize,
    pub no_progress_bar: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TabReport {
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug)]
struct PaidTask {
    row: usize,
    link: String,
}

/// Process each account's tab in the given order. `None` means the
/// account has no tab configured. Summaries come back in the same order.
pub async fn process_paid_batch(
    services: &PaidServices,
    accounts: &[(String, Option<String>)],
    progress: &Progress,
) -> Vec<(String, String)> {
    // One listing for the whole batch; names written by earlier tabs stay
    // visible to later ones.
    let cache = FileCache::load(Arc::clone(&services.objects), &services.paid_folder).await;
    tracing::debug!(known = cache.len(), "Loaded paid folder");

    let mut summaries = Vec::with_capacity(accounts.len());
    for (account, worksheet) in accounts {
        let progress = progress.for_account(account);
        let summary = match worksheet {
            None => {
                tracing::warn!(account = %account, "No worksheet configured");
                "Failure (tab not configured)".to_string()
            }
            Some(tab) => match process_tab(services, &cache, tab, &progress).await {
                Ok(report) => format!(
                    "Success: {} | Failures: {}",
                    report.succeeded, report.failed
                ),
                Err(e) => {
                    tracing::error!(account = %account, tab = %tab, "{}", e);
                    format!("Failure ({})", e)
                }
            },
        };
        progress.line(&summary);
        summaries.push((account.clone(), summary));
    }
    summaries
}

pub async fn process_tab(
    services: &PaidServices,
    cache: &FileCache,
    tab: &str,
    progress: &Progress,
) -> Result<TabReport, StoreError> {
    let column_j = services.sheet.read_range(tab, LINK_RANGE).await?;
    let tasks: Vec<PaidTask> = column_j
        .into_iter()
        .enumerate()
        .filter_map(|(i, row)| {
            let link = row.into_iter().next()?;
            link.contains(DRIVE_HOST).then(|| PaidTask {
                row: i + FIRST_DATA_ROW,
                link,
            })
        })
        .collect();

    if tasks.is_empty() {
        progress.line(format!("No invoice links in tab {}", tab));
        return Ok(TabReport::default());
    }
    let total = tasks.len();
    progress.line(format!("Stamping {} invoices", total));

    let pb = create_progress_bar(services.no_progress_bar, total as u64);
    let results = stream::iter(tasks)
        .map(|task| async move {
            let result = stamp_one(services, cache, &task.link).await;
            (task, result)
        })
        .buffer_unordered(services.concurrency.max(1));
    tokio::pin!(results);

    let mut updates = Vec::new();
    while let Some((task, result)) = results.next().await {
        match result {
            Ok(link) => updates.push(CellUpdate {
                range: format!("K{}", task.row),
                values: vec![vec![link]],
            }),
            Err(e) => {
                pb.suspend(|| tracing::warn!(row = task.row, "Paid copy failed: {}", e));
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let report = TabReport {
        succeeded: updates.len(),
        failed: total - updates.len(),
    };
    if !updates.is_empty() {
        updates.sort_by_key(|u| row_of(&u.range));
        services.sheet.batch_update(tab, updates).await?;
    }
    Ok(report)
}

fn row_of(range: &str) -> usize {
    range
        .trim_start_matches(|c: char| c.is_ascii_alphabetic())
        .parse()
        .unwrap_or(usize::MAX)
}

/// Drop a trailing `.ext`. Stored names are not paths: only a dot after
/// the last `/` counts, and leading dots of that segment are not one.
fn strip_extension(name: &str) -> &str {
    let segment_start = name.rfind('/').map_or(0, |i| i + 1);
    let segment = &name[segment_start..];
    let dots = segment.len() - segment.trim_start_matches('.').len();
    match segment[dots..].rfind('.') {
        Some(i) => &name[..segment_start + dots + i],
        None => name,
    }
}

/// `pago_{stem}.pdf` after the original's name, falling back to its id.
fn paid_name(original: Option<&str>, id: &str) -> String {
    let stem = original
        .map(strip_extension)
        .filter(|stem| !stem.is_empty())
        .unwrap_or(id);
    format!("pago_{}.pdf", stem)
}

/// Resolve the paid link for one invoice link, stamping and uploading on
/// a cache miss.
async fn stamp_one(
    services: &PaidServices,
    cache: &FileCache,
    link: &str,
) -> Result<String, PaidError> {
    let id = file_id_from_link(link).ok_or_else(|| PaidError::BadLink(link.to_string()))?;
    let original = match services.objects.name(id).await {
        Ok(name) => name,
        Err(e) => {
            tracing::debug!(file = id, "Name lookup failed: {}", e);
            None
        }
    };
    let name = paid_name(original.as_deref(), id);

    let resolution = cache
        .resolve(&name, || async {
            let bytes = services.objects.get(id).await?;
            if !bytes.starts_with(b"%PDF") {
                return Err(PaidError::NotPdf(id.to_string()));
            }
            let watermarker = Arc::clone(&services.watermarker);
            let stamped =
                tokio::task::spawn_blocking(move || watermarker.apply(&bytes)).await??;
            Ok::<_, PaidError>(stamped)
        })
        .await?;
    tracing::debug!(file = id, outcome = %resolution.outcome, "{}", name);
    Ok(view_link(&resolution.id))
}
