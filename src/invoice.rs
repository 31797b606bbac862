//! Invoice records as collected from the portal and persisted to the sheet.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Value the portal data uses (and we emit) for a missing field.
pub const NOT_AVAILABLE: &str = "N/A";

/// Date format written to the sheet's due-date column.
const SHEET_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRecord {
    pub sub_account: String,
    pub reference_month: String,
    pub invoice_number: String,
    pub issue_date: String,
    pub due_date: String,
    pub amount: String,
    pub status: String,
    pub file_id: Option<String>,
    pub drive_link: Option<String>,
}

impl InvoiceRecord {
    /// Synthetic row for a sub-account whose invoice query failed or came
    /// back empty.
    pub fn placeholder(sub_account: &str) -> Self {
        Self {
            sub_account: sub_account.to_string(),
            reference_month: NOT_AVAILABLE.to_string(),
            invoice_number: NOT_AVAILABLE.to_string(),
            issue_date: NOT_AVAILABLE.to_string(),
            due_date: NOT_AVAILABLE.to_string(),
            amount: NOT_AVAILABLE.to_string(),
            status: NOT_AVAILABLE.to_string(),
            file_id: None,
            drive_link: None,
        }
    }

    /// Whether this row carries a real invoice number and can be
    /// associated with a stored PDF.
    pub fn has_invoice_number(&self) -> bool {
        let n = self.invoice_number.trim();
        !n.is_empty() && n != NOT_AVAILABLE
    }

    /// Storage filename: `{referenceMonth}_{subAccount}_{invoiceNumber}.pdf`.
    pub fn pdf_filename(&self) -> String {
        format!(
            "{}_{}_{}.pdf",
            self.reference_month, self.sub_account, self.invoice_number
        )
    }

    pub fn due(&self) -> Option<NaiveDate> {
        parse_due_date(&self.due_date)
    }

    /// Columns `A..G` of the sheet, in order.
    pub fn sheet_row(&self) -> Vec<String> {
        vec![
            self.sub_account.clone(),
            self.reference_month.clone(),
            self.invoice_number.clone(),
            self.issue_date.clone(),
            self.due_date.clone(),
            self.amount.clone(),
            self.status.clone(),
        ]
    }
}

/// Parse the due-date formats the portal has been seen to return.
pub fn parse_due_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() || s == NOT_AVAILABLE {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    NaiveDate::parse_from_str(s, "%d/%m/%Y").ok()
}

/// Portal amounts use `.` as decimal separator; the sheet expects `,`.
pub fn format_amount(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.replace('.', ","),
        Some(serde_json::Value::Number(n)) => n.to_string().replace('.', ","),
        _ => NOT_AVAILABLE.to_string(),
    }
}

/// Drop records whose due date is unparsable or before `cutoff`, and
/// normalize the due date of the survivors.
pub fn retain_from_cutoff(records: Vec<InvoiceRecord>, cutoff: NaiveDate) -> Vec<InvoiceRecord> {
    records
        .into_iter()
        .filter_map(|mut record| {
            let due = record.due()?;
            if due < cutoff {
                return None;
            }
            record.due_date = due.format(SHEET_DATE_FORMAT).to_string();
            Some(record)
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn record(sub: &str, month: &str, number: &str, due: &str, status: &str) -> InvoiceRecord {
    InvoiceRecord {
        sub_account: sub.to_string(),
        reference_month: month.to_string(),
        invoice_number: number.to_string(),
        issue_date: "2024-12-01".to_string(),
        due_date: due.to_string(),
        amount: "10,00".to_string(),
        status: status.to_string(),
        file_id: None,
        drive_link: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cutoff() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 1).unwrap()
    }

    #[test]
    fn test_pdf_filename() {
        let r = record("C123", "2024-05", "INV1", "2024-12-10", "Pago");
        assert_eq!(r.pdf_filename(), "2024-05_C123_INV1.pdf");
    }

    #[test]
    fn test_placeholder_has_no_invoice_number() {
        let p = InvoiceRecord::placeholder("C9");
        assert_eq!(p.sub_account, "C9");
        assert_eq!(p.due_date, NOT_AVAILABLE);
        assert!(!p.has_invoice_number());
    }

    #[test]
    fn test_parse_due_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        assert_eq!(parse_due_date("2025-01-15"), Some(expected));
        assert_eq!(parse_due_date("2025-01-15T00:00:00"), Some(expected));
        assert_eq!(parse_due_date("2025-01-15T10:30:00.000"), Some(expected));
        assert_eq!(parse_due_date("2025-01-15T10:30:00-03:00"), Some(expected));
        assert_eq!(parse_due_date("15/01/2025"), Some(expected));
        assert_eq!(parse_due_date("N/A"), None);
        assert_eq!(parse_due_date("soon"), None);
        assert_eq!(parse_due_date(""), None);
    }

    #[test]
    fn test_format_amount_uses_comma() {
        assert_eq!(format_amount(Some(&json!("123.45"))), "123,45");
        assert_eq!(format_amount(Some(&json!(99.5))), "99,5");
        assert_eq!(format_amount(None), NOT_AVAILABLE);
        assert_eq!(format_amount(Some(&json!(null))), NOT_AVAILABLE);
    }

    #[test]
    fn test_cutoff_drops_old_and_unparsable() {
        let records = vec![
            record("A", "2024-10", "OLD", "2024-11-30", "Pago"),
            record("A", "2024-11", "EDGE", "2024-12-01", "Pago"),
            record("A", "2024-12", "NEW", "2025-01-05T00:00:00", "A Vencer"),
            InvoiceRecord::placeholder("B"),
        ];
        let kept = retain_from_cutoff(records, cutoff());
        let numbers: Vec<_> = kept.iter().map(|r| r.invoice_number.as_str()).collect();
        assert_eq!(numbers, vec!["EDGE", "NEW"]);
        assert!(kept.iter().all(|r| r.due().unwrap() >= cutoff()));
        assert_eq!(kept[1].due_date, "2025-01-05");
    }
}
