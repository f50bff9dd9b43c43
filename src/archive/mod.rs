//! Folder archives
//!
//! Streams a folder subtree into a zip, resolving each file through
//! the reassembler. Unlike the rest of the engine this path is not
//! fail-fast: a file that cannot be reconstructed is skipped and
//! reported in the summary so the rest of the archive still delivers.

use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::sync::Arc;

use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{AppError, Result};
use crate::store::{FileStore, FolderRecord, FolderStore};
use crate::transfer::Reassembler;

/// Which items under the share root to include.
#[derive(Debug, Clone)]
pub enum ArchiveSelection {
    /// Everything under the root
    All,
    /// Only the named top-level files/folders (selected folders are
    /// included with their whole subtree)
    Items(HashSet<Uuid>),
}

/// One file that could not be archived.
#[derive(Debug, Clone)]
pub struct ArchiveFailure {
    pub path: String,
    pub reason: String,
}

/// A finished archive plus its partial-failure summary.
pub struct ArchiveOutput {
    pub bytes: Vec<u8>,
    pub entry_count: usize,
    pub failures: Vec<ArchiveFailure>,
}

pub struct ArchiveBuilder {
    files: Arc<dyn FileStore>,
    folders: Arc<dyn FolderStore>,
    reassembler: Arc<Reassembler>,
}

impl ArchiveBuilder {
    pub fn new(
        files: Arc<dyn FileStore>,
        folders: Arc<dyn FolderStore>,
        reassembler: Arc<Reassembler>,
    ) -> Self {
        Self {
            files,
            folders,
            reassembler,
        }
    }

    /// Build a zip of the subtree rooted at `root`, with entry paths
    /// relative to the share root. Traversal uses an explicit stack so
    /// deep trees cannot grow the call stack.
    pub async fn build(
        &self,
        root: &FolderRecord,
        selection: &ArchiveSelection,
    ) -> Result<ArchiveOutput> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut entry_count = 0usize;
        let mut failures: Vec<ArchiveFailure> = Vec::new();

        // (folder id, path prefix relative to the share root)
        let mut pending: Vec<(Uuid, String)> = vec![(root.id, String::new())];
        let mut at_root = true;

        while let Some((folder_id, prefix)) = pending.pop() {
            let subfolders = self.folders.list_folders(Some(folder_id)).await?;
            let files = self.files.list_files(Some(folder_id)).await?;

            for folder in subfolders {
                if at_root && !selection_contains(selection, folder.id) {
                    continue;
                }
                pending.push((folder.id, format!("{}{}/", prefix, folder.name)));
            }

            for file in files {
                if at_root && !selection_contains(selection, file.id) {
                    continue;
                }

                let entry_path = format!("{}{}", prefix, file.name);
                match self.reassembler.reconstruct_bytes(&file).await {
                    Ok(bytes) => {
                        writer
                            .start_file(entry_path.as_str(), options)
                            .map_err(zip_error)?;
                        writer.write_all(&bytes).map_err(io_error)?;
                        entry_count += 1;
                    }
                    Err(e) => {
                        tracing::warn!(
                            file_id = %file.id,
                            path = %entry_path,
                            error = %e,
                            "Skipping file in archive"
                        );
                        failures.push(ArchiveFailure {
                            path: entry_path,
                            reason: e.to_string(),
                        });
                    }
                }
            }

            at_root = false;
        }

        if !failures.is_empty() {
            writer
                .start_file("ARCHIVE_REPORT.txt", options)
                .map_err(zip_error)?;
            let mut report = String::from("The following files could not be included:\n");
            for failure in &failures {
                report.push_str(&format!("{}: {}\n", failure.path, failure.reason));
            }
            writer.write_all(report.as_bytes()).map_err(io_error)?;
        }

        let cursor = writer.finish().map_err(zip_error)?;

        tracing::info!(
            root = %root.name,
            entry_count,
            skipped = failures.len(),
            "Archive built"
        );

        Ok(ArchiveOutput {
            bytes: cursor.into_inner(),
            entry_count,
            failures,
        })
    }
}

fn selection_contains(selection: &ArchiveSelection, id: Uuid) -> bool {
    match selection {
        ArchiveSelection::All => true,
        ArchiveSelection::Items(ids) => ids.contains(&id),
    }
}

fn zip_error(e: zip::result::ZipError) -> AppError {
    AppError::Internal(format!("zip write failed: {}", e))
}

fn io_error(e: std::io::Error) -> AppError {
    AppError::Internal(format!("zip write failed: {}", e))
}
