//! Portal API response shapes. Identifiers and amounts arrive as either
//! strings or numbers depending on the endpoint version, so they are kept
//! as raw JSON values and rendered with [`text`].

use serde::Deserialize;
use serde_json::Value;

use crate::invoice::NOT_AVAILABLE;

#[derive(Debug, Deserialize)]
pub(crate) struct SubAccountList {
    #[serde(default)]
    pub ucs: Vec<SubAccountEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubAccountEntry {
    pub uc: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProtocolResponse {
    pub protocolo_legado: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InvoiceList {
    #[serde(default)]
    pub faturas: Vec<PortalInvoice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PortalInvoice {
    pub mes_referencia: Option<Value>,
    pub numero_fatura: Option<Value>,
    pub data_emissao: Option<Value>,
    pub data_vencimento: Option<Value>,
    pub valor_emissao: Option<Value>,
    pub status_fatura: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PdfEnvelope {
    pub file_data: Option<String>,
}

/// Render a scalar, or `None` for null/absent/blank values.
pub(crate) fn scalar(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Like [`scalar`], with the `N/A` fallback the sheet uses.
pub(crate) fn text(value: Option<&Value>) -> String {
    scalar(value).unwrap_or_else(|| NOT_AVAILABLE.to_string())
}
