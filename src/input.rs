//! Input adapters: turn a links table or a set of uploaded files into the
//! `NamedItem` list the batch pipeline consumes.
//!
//! ## Tables
//!
//! CSV or XLSX (first worksheet) with a header row. The name column is
//! `name` or `names`, the URL column is `links` (matched case-insensitively
//! after trimming). Rows whose link cell is empty are dropped; a row with a
//! link but no name is named `row-<n>` (1-based data row).

use crate::error::BatchError;
use crate::pipeline::source::{is_url, NamedItem};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Header names accepted for the name column.
const NAME_HEADERS: &[&str] = &["name", "names"];
/// Header name of the link column.
const LINK_HEADER: &str = "links";

/// Supported table encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Xlsx,
}

impl TableFormat {
    /// Pick the format from a file extension (`.csv`, `.xlsx`).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(TableFormat::Csv),
            "xlsx" => Some(TableFormat::Xlsx),
            _ => None,
        }
    }
}

/// Read and parse a links table from disk.
pub async fn load_table(path: impl AsRef<Path>) -> Result<Vec<NamedItem>, BatchError> {
    let path = path.as_ref();
    let format = TableFormat::from_path(path).ok_or_else(|| BatchError::UnsupportedTable {
        path: path.to_path_buf(),
    })?;

    let bytes = tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            BatchError::TableNotFound {
                path: path.to_path_buf(),
            }
        } else {
            BatchError::TableParse {
                detail: format!("{}: {}", path.display(), e),
            }
        }
    })?;

    let items = parse_table(&bytes, format)?;
    info!("Loaded {} items from {}", items.len(), path.display());
    Ok(items)
}

/// Parse table bytes into URL items.
pub fn parse_table(bytes: &[u8], format: TableFormat) -> Result<Vec<NamedItem>, BatchError> {
    let rows = match format {
        TableFormat::Csv => csv_rows(bytes)?,
        TableFormat::Xlsx => xlsx_rows(bytes)?,
    };
    items_from_rows(rows)
}

/// Wrap uploaded `(file name, bytes)` pairs as blob items.
///
/// The file name is kept verbatim as the item name.
pub fn from_uploads<I, S>(uploads: I) -> Vec<NamedItem>
where
    I: IntoIterator<Item = (S, Vec<u8>)>,
    S: Into<String>,
{
    uploads
        .into_iter()
        .map(|(name, bytes)| NamedItem::blob(name, bytes))
        .collect()
}

/// Build items from command-line style inputs: URLs stay URLs, anything
/// else is read from disk as an upload named by its file name.
pub async fn from_paths_or_urls(inputs: &[String]) -> Result<Vec<NamedItem>, BatchError> {
    let mut items = Vec::with_capacity(inputs.len());
    for input in inputs {
        if is_url(input) {
            items.push(NamedItem::url(url_item_name(input), input.as_str()));
            continue;
        }

        let path = PathBuf::from(input);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| BatchError::ImageReadFailed {
                path: path.clone(),
                source,
            })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.clone());
        debug!("Read {} ({} bytes)", path.display(), bytes.len());
        items.push(NamedItem::blob(name, bytes));
    }
    Ok(items)
}

/// Last non-empty path segment of a URL, without its extension.
/// A URL with no path (just a host) is named `image`.
fn url_item_name(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()?
                .rev()
                .find(|s| !s.is_empty())
                .map(str::to_string)
        })
        .and_then(|segment| {
            Path::new(&segment)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        })
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "image".to_string())
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn csv_rows(bytes: &[u8]) -> Result<Vec<Vec<String>>, BatchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(str::to_string).collect())
                .map_err(|e| BatchError::TableParse {
                    detail: e.to_string(),
                })
        })
        .collect()
}

fn xlsx_rows(bytes: &[u8]) -> Result<Vec<Vec<String>>, BatchError> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(|e| BatchError::TableParse {
            detail: e.to_string(),
        })?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| BatchError::TableParse {
            detail: "workbook has no worksheets".into(),
        })?
        .map_err(|e| BatchError::TableParse {
            detail: e.to_string(),
        })?;

    Ok(range
        .rows()
        .map(|row| {
            row.iter()
                .map(|cell| match cell {
                    Data::Empty => String::new(),
                    other => other.to_string(),
                })
                .collect()
        })
        .collect())
}

/// Locate the columns in the header row and turn data rows into items.
fn items_from_rows(rows: Vec<Vec<String>>) -> Result<Vec<NamedItem>, BatchError> {
    let mut rows = rows.into_iter();
    let header: Vec<String> = rows
        .next()
        .unwrap_or_default()
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();

    let find = |wanted: &[&str]| {
        header
            .iter()
            .position(|h| wanted.iter().any(|w| h.eq_ignore_ascii_case(w)))
    };

    let (name_col, link_col) = match (find(NAME_HEADERS), find(&[LINK_HEADER])) {
        (Some(n), Some(l)) => (n, l),
        _ => return Err(BatchError::MissingColumns { found: header }),
    };

    let mut items = Vec::new();
    let mut dropped = 0usize;
    for (i, row) in rows.enumerate() {
        let cell = |col: usize| row.get(col).map(|s| s.trim()).unwrap_or("");

        let link = cell(link_col);
        if link.is_empty() {
            dropped += 1;
            continue;
        }

        let name = match cell(name_col) {
            "" => format!("row-{}", i + 1),
            n => n.to_string(),
        };
        items.push(NamedItem::url(name, link));
    }

    if dropped > 0 {
        warn!("Dropped {} rows with no link", dropped);
    }
    Ok(items)
}
