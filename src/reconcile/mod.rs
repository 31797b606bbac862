//! Putting the dataset into the account's tab: ordering, the data block,
//! the link column and the flag columns.

pub mod flags;

use std::cmp::Ordering;
use std::collections::HashMap;

pub use self::flags::{capture_flags, restore_flags};
use crate::invoice::InvoiceRecord;
use crate::store::{shared_link, SpreadsheetStore, StoreError};

pub const DATA_RANGE: &str = "A2:G";
const CLEARED_RANGES: [&str; 3] = [DATA_RANGE, "J2:J", "K2:K"];

/// Presentation order of invoice statuses: overdue first, settled last.
pub fn status_rank(status: &str) -> u8 {
    match status.trim() {
        "Vencidas" => 0,
        "A Vencer" => 1,
        "Pago" => 2,
        "Enviando ao Banco" | "Enviado ao Banco" => 3,
        _ => 4,
    }
}

/// Stable sort by status rank, then due date; rows without a parsable
/// due date go last within their rank.
pub fn sort_for_presentation(records: &mut [InvoiceRecord]) {
    records.sort_by(|a, b| {
        status_rank(&a.status)
            .cmp(&status_rank(&b.status))
            .then_with(|| match (a.due(), b.due()) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
    });
}

/// Replace the data block. Link columns are cleared too since their rows
/// no longer line up.
pub async fn write_dataset(
    sheet: &dyn SpreadsheetStore,
    tab: &str,
    records: &[InvoiceRecord],
) -> Result<(), StoreError> {
    sheet.clear_ranges(tab, &CLEARED_RANGES).await?;
    if records.is_empty() {
        return Ok(());
    }
    let rows = records.iter().map(InvoiceRecord::sheet_row).collect();
    sheet.write_range(tab, DATA_RANGE, rows).await?;
    tracing::debug!(tab, rows = records.len(), "Wrote invoice rows");
    Ok(())
}

/// Fill `drive_link` from `file_id` (blank when the file is unknown).
pub fn assign_links(records: &mut [InvoiceRecord]) {
    for record in records {
        record.drive_link = record
            .file_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(shared_link);
    }
}

/// Write column J from the invoice numbers currently in column C, so the
/// sheet's row order wins over the dataset's. Returns the rows written.
pub async fn update_link_column(
    sheet: &dyn SpreadsheetStore,
    tab: &str,
    records: &[InvoiceRecord],
) -> Result<usize, StoreError> {
    let links: HashMap<&str, &str> = records
        .iter()
        .map(|r| {
            (
                r.invoice_number.trim(),
                r.drive_link.as_deref().unwrap_or_default(),
            )
        })
        .collect();

    let column_c = sheet.read_range(tab, "C2:C").await?;
    if column_c.is_empty() {
        return Ok(0);
    }
    let values: Vec<Vec<String>> = column_c
        .iter()
        .map(|row| {
            let link = row
                .first()
                .and_then(|invoice| links.get(invoice.trim()))
                .copied()
                .unwrap_or_default();
            vec![link.to_string()]
        })
        .collect();

    let n = values.len();
    sheet
        .write_range(tab, &format!("J2:J{}", n + 1), values)
        .await?;
    Ok(n)
}
