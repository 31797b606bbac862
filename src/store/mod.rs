//! Capability interfaces for the spreadsheet and the cloud folder, plus
//! the Google Sheets v4 / Drive v3 implementations used by the binary.

pub mod auth;
pub mod cache;
pub mod drive;
pub mod error;
pub mod sheets;
#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;

pub use self::cache::FileCache;
pub use self::error::StoreError;

const DRIVE_FILE_URL: &str = "https://drive.google.com/file/d";

/// A single-range write inside a batch update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellUpdate {
    pub range: String,
    pub values: Vec<Vec<String>>,
}

/// Tab-scoped access to one spreadsheet. Ranges use A1 notation without
/// the tab prefix; implementations qualify them.
#[async_trait]
pub trait SpreadsheetStore: Send + Sync {
    async fn read_range(&self, tab: &str, range: &str) -> Result<Vec<Vec<String>>, StoreError>;

    async fn write_range(
        &self,
        tab: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<(), StoreError>;

    async fn clear_ranges(&self, tab: &str, ranges: &[&str]) -> Result<(), StoreError>;

    async fn batch_update(&self, tab: &str, updates: Vec<CellUpdate>) -> Result<(), StoreError>;
}

/// Blob storage addressed by opaque ids, grouped in folders.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Every `(name, id)` in the folder, following pagination.
    async fn list_folder(&self, folder_id: &str) -> Result<Vec<(String, String)>, StoreError>;

    async fn upload(&self, bytes: Vec<u8>, name: &str, folder_id: &str)
        -> Result<String, StoreError>;

    async fn get(&self, id: &str) -> Result<Vec<u8>, StoreError>;

    async fn name(&self, id: &str) -> Result<Option<String>, StoreError>;
}

/// Link written to the invoice column.
pub fn shared_link(file_id: &str) -> String {
    format!("{}/{}/view?usp=sharing", DRIVE_FILE_URL, file_id)
}

/// Link written to the paid column.
pub fn view_link(file_id: &str) -> String {
    format!("{}/{}/view", DRIVE_FILE_URL, file_id)
}

/// Extract the object id from either link form.
pub fn file_id_from_link(link: &str) -> Option<&str> {
    let (_, rest) = link.split_once("/file/d/")?;
    let id = rest.split(['/', '?']).next()?;
    (!id.is_empty()).then_some(id)
}

/// Serialize a flag cell. `USER_ENTERED` turns these into booleans.
pub fn flag_cell(value: bool) -> String {
    let cell = if value { "TRUE" } else { "FALSE" };
    cell.to_string()
}

/// Deserialize a flag cell: anything but a case-insensitive `TRUE` is false.
pub fn parse_flag(cell: &str) -> bool {
    cell.trim().eq_ignore_ascii_case("TRUE")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_formats() {
        assert_eq!(
            shared_link("abc"),
            "https://drive.google.com/file/d/abc/view?usp=sharing"
        );
        assert_eq!(view_link("abc"), "https://drive.google.com/file/d/abc/view");
    }

    #[test]
    fn test_file_id_from_link() {
        assert_eq!(file_id_from_link(&shared_link("id-1")), Some("id-1"));
        assert_eq!(file_id_from_link(&view_link("id_2")), Some("id_2"));
        assert_eq!(
            file_id_from_link("https://drive.google.com/file/d/xyz?usp=sharing"),
            Some("xyz")
        );
        assert_eq!(file_id_from_link("https://drive.google.com/open?id=1"), None);
        assert_eq!(file_id_from_link("https://drive.google.com/file/d/"), None);
    }

    #[test]
    fn test_flag_round_trip_is_case_insensitive() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("true"));
        assert!(parse_flag(" True "));
        assert!(!parse_flag("FALSE"));
        assert!(!parse_flag("yes"));
        assert!(!parse_flag(""));
        assert_eq!(flag_cell(true), "TRUE");
        assert_eq!(flag_cell(false), "FALSE");
    }
}
