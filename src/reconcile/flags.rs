//! User-maintained checkbox columns `M..R`. They are keyed by invoice
//! number so they follow their invoice when the data rows are rewritten
//! in a different order.

use std::collections::HashMap;

use crate::store::{flag_cell, parse_flag, CellUpdate, SpreadsheetStore, StoreError};

pub const FLAG_COLUMNS: [&str; 6] = ["M", "N", "O", "P", "Q", "R"];

/// Offset of column `M` within a `C2:R` row.
const FIRST_FLAG_OFFSET: usize = 10;

pub type Flags = [bool; FLAG_COLUMNS.len()];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSet {
    by_invoice: HashMap<String, Flags>,
}

impl FlagSet {
    /// Build from `C2:R` rows: column C is the key, `M..R` the flags.
    pub fn from_rows(rows: &[Vec<String>]) -> Self {
        let mut by_invoice = HashMap::new();
        for row in rows {
            let Some(invoice) = row.first().map(|c| c.trim()) else {
                continue;
            };
            if invoice.is_empty() {
                continue;
            }
            let mut flags = Flags::default();
            for (i, flag) in flags.iter_mut().enumerate() {
                *flag = row
                    .get(FIRST_FLAG_OFFSET + i)
                    .is_some_and(|cell| parse_flag(cell));
            }
            by_invoice.insert(invoice.to_string(), flags);
        }
        Self { by_invoice }
    }

    pub fn len(&self) -> usize {
        self.by_invoice.len()
    }

    pub fn get(&self, invoice: &str) -> Flags {
        self.by_invoice
            .get(invoice.trim())
            .copied()
            .unwrap_or_default()
    }

    /// One update per flag column, aligned with `invoice_rows` (the
    /// sheet's current `C2:C`). Unknown or blank invoices get `FALSE`.
    pub fn column_updates(&self, invoice_rows: &[Vec<String>]) -> Vec<CellUpdate> {
        if invoice_rows.is_empty() {
            return Vec::new();
        }
        let aligned: Vec<Flags> = invoice_rows
            .iter()
            .map(|row| match row.first() {
                Some(invoice) if !invoice.trim().is_empty() => self.get(invoice),
                _ => Flags::default(),
            })
            .collect();
        let last_row = aligned.len() + 1;

        FLAG_COLUMNS
            .iter()
            .enumerate()
            .map(|(i, col)| CellUpdate {
                range: format!("{col}2:{col}{last_row}"),
                values: aligned.iter().map(|flags| vec![flag_cell(flags[i])]).collect(),
            })
            .collect()
    }
}

pub async fn capture_flags(
    sheet: &dyn SpreadsheetStore,
    tab: &str,
) -> Result<FlagSet, StoreError> {
    let rows = sheet.read_range(tab, "C2:R").await?;
    let flags = FlagSet::from_rows(&rows);
    tracing::debug!(tab, invoices = flags.len(), "Captured flag columns");
    Ok(flags)
}

/// Re-key `saved` against the invoice numbers now in column C.
pub async fn restore_flags(
    sheet: &dyn SpreadsheetStore,
    tab: &str,
    saved: &FlagSet,
) -> Result<(), StoreError> {
    let current = sheet.read_range(tab, "C2:C").await?;
    let updates = saved.column_updates(&current);
    if updates.is_empty() {
        return Ok(());
    }
    sheet.batch_update(tab, updates).await
}
