use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("Portal {endpoint} returned HTTP {status}")]
    Status { endpoint: &'static str, status: u16 },

    #[error("Portal returned no sub-accounts for this account")]
    NoSubAccounts,

    #[error("No invoice records for any sub-account")]
    NoRecords,

    #[error("PDF response for invoice {0} has no fileData")]
    MissingFileData(String),

    #[error("Invalid base64 in PDF response: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
