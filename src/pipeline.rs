//! One account, end to end: login, collection, sheet refresh, PDF sync,
//! links and flags.

use std::sync::Arc;

use chrono::NaiveDate;
use reqwest::Client;
use thiserror::Error;

use crate::collector::{CollectError, PortalClient};
use crate::config::Account;
use crate::download::{self, DownloadConfig, DownloadReport};
use crate::invoice::retain_from_cutoff;
use crate::portal::{LoginError, PortalLogin};
use crate::progress::Progress;
use crate::reconcile;
use crate::store::{FileCache, ObjectStore, SpreadsheetStore, StoreError};

/// Failures that end an account's run. Everything else is logged and the
/// run continues.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("portal login failed: {0}")]
    Login(#[from] LoginError),

    #[error("could not fetch account data: {0}")]
    DataFetch(#[from] CollectError),
}

/// Long-lived collaborators shared by every account in a run.
pub struct ExtractServices {
    pub login: PortalLogin,
    pub http: Client,
    pub portal_api: String,
    pub sheet: Arc<dyn SpreadsheetStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub invoice_folder: String,
    pub cutoff: NaiveDate,
    pub download: DownloadConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountReport {
    pub collected: usize,
    pub kept: usize,
    pub download: DownloadReport,
    pub links: usize,
}

/// Run the pipeline for `account`; `true` on success. Progress lines go
/// to `progress`, prefixed with the account name.
pub async fn process_account(
    services: &ExtractServices,
    account: &Account,
    progress: &Progress,
) -> bool {
    let progress = progress.for_account(&account.name);
    match run_account(services, account, &progress).await {
        Ok(report) => {
            progress.line(format!(
                "Done: {} invoices kept of {} collected, {} downloaded, {} existing, {} failed",
                report.kept,
                report.collected,
                report.download.downloaded,
                report.download.exists,
                report.download.failed
            ));
            true
        }
        Err(e) => {
            tracing::error!(account = %account.name, "{}", e);
            progress.line(format!("Failed: {}", e));
            false
        }
    }
}

/// Sheet problems are reported but never stop the run.
fn sheet_step<T>(progress: &Progress, step: &str, result: Result<T, StoreError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Sheet sync failed ({}): {}", step, e);
            progress.line(format!("Sheet sync failed ({}): {}", step, e));
            None
        }
    }
}

pub async fn run_account(
    services: &ExtractServices,
    account: &Account,
    progress: &Progress,
) -> Result<AccountReport, AccountError> {
    let tab = account.worksheet.as_str();
    let sheet = services.sheet.as_ref();

    progress.line("Logging in to the portal");
    let token = services.login.obtain_token(account).await?;
    progress.line("Login succeeded");

    progress.line("Fetching sub-accounts and invoices");
    let portal = PortalClient::new(
        services.http.clone(),
        &services.portal_api,
        token,
        &account.login_user,
    );
    let collection = portal.collect().await?;
    let collected = collection.records.len();
    let mut records = retain_from_cutoff(collection.records, services.cutoff);
    tracing::info!(
        account = %account.name,
        sub_accounts = collection.sub_accounts.len(),
        collected,
        kept = records.len(),
        "Collected invoices"
    );

    progress.line("Updating sheet");
    let saved_flags = sheet_step(
        progress,
        "capture flags",
        reconcile::capture_flags(sheet, tab).await,
    );
    reconcile::sort_for_presentation(&mut records);
    sheet_step(
        progress,
        "write rows",
        reconcile::write_dataset(sheet, tab, &records).await,
    );

    let report = if records.iter().any(|r| r.has_invoice_number()) {
        progress.line("Syncing invoice PDFs");
        let cache = FileCache::load(Arc::clone(&services.objects), &services.invoice_folder).await;
        let source = portal.pdf_source(collection.protocol.clone());
        download::sync_invoice_pdfs(&mut records, &source, &cache, &services.download).await
    } else {
        DownloadReport::default()
    };

    progress.line("Updating links");
    reconcile::assign_links(&mut records);
    let links = sheet_step(
        progress,
        "link column",
        reconcile::update_link_column(sheet, tab, &records).await,
    )
    .unwrap_or_default();
    // Without a captured set, restoring would blank every flag.
    if let Some(saved) = &saved_flags {
        sheet_step(
            progress,
            "restore flags",
            reconcile::restore_flags(sheet, tab, saved).await,
        );
    }

    Ok(AccountReport {
        collected,
        kept: records.len(),
        download: report,
        links,
    })
}
