use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use evp_core::error::AppError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

pub(crate) fn list_files_recursive_sorted(root: &Path) -> Result<Vec<PathBuf>, AppError> {
    fn walk(dir: &Path, acc: &mut Vec<PathBuf>) -> Result<(), AppError> {
        let mut entries: Vec<fs::DirEntry> = fs::read_dir(dir)
            .map_err(|e| {
                AppError::new("PACK_ARCHIVE_READ_FAILED", "Failed to read pack directory")
                    .with_details(format!("path={}; err={}", dir.display(), e))
            })?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                AppError::new("PACK_ARCHIVE_READ_FAILED", "Failed to read pack directory entry")
                    .with_details(format!("path={}; err={}", dir.display(), e))
            })?;

        entries.sort_by_key(|e| e.file_name());
        for e in entries {
            let p = e.path();
            let meta = e.metadata().map_err(|err| {
                AppError::new("PACK_ARCHIVE_READ_FAILED", "Failed to stat pack entry")
                    .with_details(format!("path={}; err={}", p.display(), err))
            })?;
            if meta.is_dir() {
                walk(&p, acc)?;
            } else if meta.is_file() {
                acc.push(p);
            }
        }
        Ok(())
    }

    let mut out = Vec::new();
    walk(root, &mut out)?;
    Ok(out)
}

/// `/`-separated path of `path` relative to `root`, as stored in the archive.
pub(crate) fn archive_entry_name(root: &Path, path: &Path) -> Result<String, AppError> {
    let rel = path.strip_prefix(root).map_err(|e| {
        AppError::new("PACK_ARCHIVE_PATH_INVALID", "File is outside the pack directory")
            .with_details(format!("root={}; path={}; err={}", root.display(), path.display(), e))
    })?;
    Ok(rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

fn zip_err(dest: &Path, e: impl std::fmt::Display) -> AppError {
    AppError::new("PACK_ARCHIVE_WRITE_FAILED", "Failed to write pack archive")
        .with_details(format!("path={}; err={}", dest.display(), e))
}

/// Zips every file under `src_dir` into `dest`. Entries are in sorted relative-path
/// order with a fixed timestamp and mode, so equal inputs give byte-identical archives.
/// Written to a sibling `.tmp` and renamed into place.
pub fn zip_dir_deterministic(src_dir: &Path, dest: &Path) -> Result<usize, AppError> {
    let mut entries = Vec::new();
    for path in list_files_recursive_sorted(src_dir)? {
        entries.push((archive_entry_name(src_dir, &path)?, path));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let tmp = dest.with_extension("zip.tmp");
    let file = fs::File::create(&tmp).map_err(|e| zip_err(&tmp, e))?;
    let mut zip = ZipWriter::new(file);
    for (name, path) in &entries {
        let bytes = fs::read(path).map_err(|e| {
            AppError::new("PACK_ARCHIVE_READ_FAILED", "Failed to read file for archiving")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        zip.start_file(name.as_str(), options).map_err(|e| zip_err(&tmp, e))?;
        zip.write_all(&bytes).map_err(|e| zip_err(&tmp, e))?;
    }
    let file = zip.finish().map_err(|e| zip_err(&tmp, e))?;
    file.sync_all().map_err(|e| zip_err(&tmp, e))?;
    drop(file);

    fs::rename(&tmp, dest).map_err(|e| {
        AppError::new("PACK_ARCHIVE_WRITE_FAILED", "Failed to finalize pack archive")
            .with_details(format!("tmp={}; dest={}; err={}", tmp.display(), dest.display(), e))
    })?;
    Ok(entries.len())
}
