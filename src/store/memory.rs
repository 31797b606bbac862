//! In-memory stores for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{CellUpdate, ObjectStore, SpreadsheetStore, StoreError};

struct Blob {
    name: String,
    folder: String,
    bytes: Vec<u8>,
}

#[derive(Default)]
pub(crate) struct MemoryObjectStore {
    blobs: Mutex<Vec<(String, Blob)>>,
    uploads: AtomicUsize,
    lists: AtomicUsize,
    listing_fails: AtomicBool,
    upload_delay: Mutex<Duration>,
}

impl MemoryObjectStore {
    pub(crate) fn seed(&self, folder: &str, name: &str, id: &str, bytes: Vec<u8>) {
        self.blobs.lock().unwrap().push((
            id.to_string(),
            Blob {
                name: name.to_string(),
                folder: folder.to_string(),
                bytes,
            },
        ));
    }

    pub(crate) fn fail_listing(&self) {
        self.listing_fails.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_upload_delay(&self, delay: Duration) {
        *self.upload_delay.lock().unwrap() = delay;
    }

    pub(crate) fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub(crate) fn names_in(&self, folder: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .blobs
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, b)| b.folder == folder)
            .map(|(_, b)| b.name.clone())
            .collect();
        names.sort();
        names
    }

    pub(crate) fn bytes_of(&self, id: &str) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .iter()
            .find(|(blob_id, _)| blob_id == id)
            .map(|(_, b)| b.bytes.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_folder(&self, folder_id: &str) -> Result<Vec<(String, String)>, StoreError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if self.listing_fails.load(Ordering::SeqCst) {
            return Err(StoreError::Api {
                status: 500,
                operation: "files.list",
                message: "backend error".into(),
            });
        }
        Ok(self
            .blobs
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, b)| b.folder == folder_id)
            .map(|(id, b)| (b.name.clone(), id.clone()))
            .collect())
    }

    async fn upload(
        &self,
        bytes: Vec<u8>,
        name: &str,
        folder_id: &str,
    ) -> Result<String, StoreError> {
        let delay = *self.upload_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("uploaded-{}", n);
        self.seed(folder_id, name, &id, bytes);
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        self.bytes_of(id).ok_or_else(|| StoreError::Api {
            status: 404,
            operation: "files.get",
            message: format!("File not found: {}", id),
        })
    }

    async fn name(&self, id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .blobs
            .lock()
            .unwrap()
            .iter()
            .find(|(blob_id, _)| blob_id == id)
            .map(|(_, b)| b.name.clone()))
    }
}

/// A1 reference: zero-based column, one-based row (`None` means open-ended).
#[derive(Debug, Clone, Copy)]
struct CellRef {
    col: usize,
    row: Option<usize>,
}

fn parse_cell(s: &str) -> CellRef {
    let letters: String = s.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let digits = &s[letters.len()..];
    let col = letters
        .to_ascii_uppercase()
        .bytes()
        .fold(0usize, |acc, b| acc * 26 + (b - b'A' + 1) as usize)
        - 1;
    CellRef {
        col,
        row: digits.parse().ok(),
    }
}

fn parse_range(range: &str) -> (CellRef, CellRef) {
    match range.split_once(':') {
        Some((a, b)) => (parse_cell(a), parse_cell(b)),
        None => {
            let c = parse_cell(range);
            (c, c)
        }
    }
}

/// Grid-backed sheet that mimics the Values API: reads drop trailing
/// empty cells and rows, writes start at the range's top-left cell.
#[derive(Default)]
pub(crate) struct MemorySheet {
    tabs: Mutex<HashMap<String, Vec<Vec<String>>>>,
    fail_writes: AtomicBool,
    pub(crate) writes: AtomicUsize,
}

impl MemorySheet {
    pub(crate) fn with_rows(tab: &str, rows: Vec<Vec<&str>>) -> Self {
        let sheet = Self::default();
        let grid = rows
            .into_iter()
            .map(|r| r.into_iter().map(str::to_string).collect())
            .collect();
        sheet.tabs.lock().unwrap().insert(tab.to_string(), grid);
        sheet
    }

    pub(crate) fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Cell text at zero-based `(row, col)`, empty if absent.
    pub(crate) fn cell(&self, tab: &str, row: usize, col: usize) -> String {
        self.tabs
            .lock()
            .unwrap()
            .get(tab)
            .and_then(|g| g.get(row))
            .and_then(|r| r.get(col))
            .cloned()
            .unwrap_or_default()
    }

    /// Column values from one-based `from_row` down to the last non-empty row.
    pub(crate) fn column(&self, tab: &str, col: usize, from_row: usize) -> Vec<String> {
        let tabs = self.tabs.lock().unwrap();
        let Some(grid) = tabs.get(tab) else {
            return Vec::new();
        };
        let mut values: Vec<String> = grid
            .iter()
            .skip(from_row - 1)
            .map(|r| r.get(col).cloned().unwrap_or_default())
            .collect();
        while values.last().is_some_and(|v| v.is_empty()) {
            values.pop();
        }
        values
    }

    fn set(grid: &mut Vec<Vec<String>>, row: usize, col: usize, value: String) {
        if grid.len() <= row {
            grid.resize(row + 1, Vec::new());
        }
        let r = &mut grid[row];
        if r.len() <= col {
            r.resize(col + 1, String::new());
        }
        r[col] = value;
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Api {
                status: 503,
                operation: "values.update",
                message: "unavailable".into(),
            });
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn write(&self, tab: &str, range: &str, rows: Vec<Vec<String>>) {
        let (start, _) = parse_range(range);
        let mut tabs = self.tabs.lock().unwrap();
        let grid = tabs.entry(tab.to_string()).or_default();
        let top = start.row.unwrap_or(1) - 1;
        for (i, row) in rows.into_iter().enumerate() {
            for (j, value) in row.into_iter().enumerate() {
                Self::set(grid, top + i, start.col + j, value);
            }
        }
    }
}

#[async_trait]
impl SpreadsheetStore for MemorySheet {
    async fn read_range(&self, tab: &str, range: &str) -> Result<Vec<Vec<String>>, StoreError> {
        let (start, end) = parse_range(range);
        let tabs = self.tabs.lock().unwrap();
        let Some(grid) = tabs.get(tab) else {
            return Err(StoreError::Api {
                status: 400,
                operation: "values.get",
                message: format!("Unable to parse range: {}!{}", tab, range),
            });
        };
        let top = start.row.unwrap_or(1) - 1;
        let bottom = end.row.unwrap_or(grid.len()).min(grid.len());
        let mut out: Vec<Vec<String>> = (top..bottom)
            .map(|i| {
                let row = &grid[i];
                let mut cells: Vec<String> = (start.col..=end.col)
                    .map(|c| row.get(c).cloned().unwrap_or_default())
                    .collect();
                while cells.last().is_some_and(|v| v.is_empty()) {
                    cells.pop();
                }
                cells
            })
            .collect();
        while out.last().is_some_and(|r| r.is_empty()) {
            out.pop();
        }
        Ok(out)
    }

    async fn write_range(
        &self,
        tab: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        self.write(tab, range, rows);
        Ok(())
    }

    async fn clear_ranges(&self, tab: &str, ranges: &[&str]) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut tabs = self.tabs.lock().unwrap();
        let grid = tabs.entry(tab.to_string()).or_default();
        for range in ranges {
            let (start, end) = parse_range(range);
            let top = start.row.unwrap_or(1) - 1;
            let bottom = end.row.unwrap_or(grid.len()).min(grid.len());
            for row in grid.iter_mut().take(bottom).skip(top) {
                for c in start.col..=end.col {
                    if let Some(cell) = row.get_mut(c) {
                        cell.clear();
                    }
                }
            }
        }
        Ok(())
    }

    async fn batch_update(&self, tab: &str, updates: Vec<CellUpdate>) -> Result<(), StoreError> {
        self.check_writable()?;
        for update in updates {
            self.write(tab, &update.range, update.values);
        }
        Ok(())
    }
}
