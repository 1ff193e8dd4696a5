//! Archive Builder: package processed images into one zip container.
//!
//! Entries are stored uncompressed (the payloads are already JPEG/PNG). Each
//! entry is named `"<name>.<extension>"` and collisions are settled by
//! [`DuplicateNames`].

use crate::config::DuplicateNames;
use crate::error::BatchError;
use crate::output::ProcessedItem;
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Build a zip archive, letting the last of any same-named items win.
pub fn build_archive(items: &[ProcessedItem]) -> Result<Vec<u8>, BatchError> {
    build_archive_with(items, DuplicateNames::Overwrite)
}

/// Build a zip archive with an explicit duplicate-name policy.
///
/// An empty `items` slice yields a valid, empty archive.
pub fn build_archive_with(
    items: &[ProcessedItem],
    policy: DuplicateNames,
) -> Result<Vec<u8>, BatchError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for (entry, item) in archive_entries(items, policy) {
        debug!("Archiving {} ({} bytes)", entry, item.image.bytes.len());
        zip.start_file(entry, options)?;
        zip.write_all(&item.image.bytes)
            .map_err(|e| BatchError::ArchiveFailed {
                detail: e.to_string(),
            })?;
    }

    Ok(zip.finish()?.into_inner())
}

/// Pair each surviving item with its unique entry name, in output order.
pub fn archive_entries(
    items: &[ProcessedItem],
    policy: DuplicateNames,
) -> Vec<(String, &ProcessedItem)> {
    match policy {
        DuplicateNames::Overwrite => {
            let mut last: HashMap<String, usize> = HashMap::new();
            for (i, item) in items.iter().enumerate() {
                last.insert(item.file_name(), i);
            }
            items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| {
                    let entry = item.file_name();
                    (last.get(&entry) == Some(&i)).then_some((entry, item))
                })
                .collect()
        }
        DuplicateNames::Suffix => {
            let mut used: HashSet<String> = HashSet::new();
            items
                .iter()
                .map(|item| {
                    let mut entry = item.file_name();
                    let mut n = 1;
                    while used.contains(&entry) {
                        entry = format!("{}-{}.{}", item.name, n, item.image.extension);
                        n += 1;
                    }
                    used.insert(entry.clone());
                    (entry, item)
                })
                .collect()
        }
    }
}

/// Build the archive and write it to `path` atomically.
///
/// The bytes go to a temp file in the destination directory which is then
/// renamed over `path`, so readers never see a half-written zip.
pub async fn write_archive(
    items: &[ProcessedItem],
    path: &Path,
    policy: DuplicateNames,
) -> Result<(), BatchError> {
    let bytes = build_archive_with(items, policy)?;
    let target = path.to_path_buf();
    let len = bytes.len();

    tokio::task::spawn_blocking(move || persist_atomically(&target, &bytes))
        .await
        .map_err(|e| BatchError::Internal(format!("Archive write task panicked: {}", e)))??;

    info!("Wrote archive {} ({} bytes)", path.display(), len);
    Ok(())
}

/// Write every item to `dir` as its own `"<name>.<extension>"` file.
///
/// Path separators in names are replaced with `_` so every file lands
/// directly inside `dir`. Returns the written paths in output order.
pub async fn write_individual(
    items: &[ProcessedItem],
    dir: &Path,
    policy: DuplicateNames,
) -> Result<Vec<PathBuf>, BatchError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| BatchError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

    let mut written = Vec::new();
    for (entry, item) in archive_entries(items, policy) {
        let path = dir.join(sanitize_file_name(&entry));
        tokio::fs::write(&path, &item.image.bytes)
            .await
            .map_err(|e| BatchError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;
        debug!("Wrote {}", path.display());
        written.push(path);
    }

    info!("Wrote {} images to {}", written.len(), dir.display());
    Ok(written)
}

fn persist_atomically(path: &Path, bytes: &[u8]) -> Result<(), BatchError> {
    let write_failed = |source: std::io::Error| BatchError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(write_failed)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_failed)?;
    tmp.write_all(bytes).map_err(write_failed)?;
    tmp.persist(path).map_err(|e| write_failed(e.error))?;
    Ok(())
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect()
}
