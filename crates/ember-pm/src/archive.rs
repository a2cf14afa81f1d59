//! Package archives (.tar.gz)

use crate::error::{PmError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Builder, EntryType};
use tracing::{debug, warn};

fn extraction(archive: &Path, detail: impl std::fmt::Display) -> PmError {
    PmError::invalid("archive", format!("{}: {}", archive.display(), detail))
}

/// Extract a gzipped tarball into `dest`, dropping the first path component
/// of every entry.
///
/// Entries whose remaining path is not made only of plain names (absolute
/// paths, `..`) are rejected. Links and special files are skipped.
pub fn extract_stripped(archive_path: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive_path).map_err(|e| PmError::io(archive_path, e))?;
    let mut archive = Archive::new(GzDecoder::new(file));
    fs::create_dir_all(dest).map_err(|e| PmError::io(dest, e))?;

    let mut extracted = 0;
    let entries = archive
        .entries()
        .map_err(|e| extraction(archive_path, format!("failed to read entries: {}", e)))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| extraction(archive_path, format!("failed to read entry: {}", e)))?;
        let entry_path = entry
            .path()
            .map_err(|e| extraction(archive_path, format!("invalid entry path: {}", e)))?
            .into_owned();

        let mut rest = PathBuf::new();
        for component in entry_path.components().skip(1) {
            match component {
                Component::Normal(part) => rest.push(part),
                Component::CurDir => {}
                _ => {
                    warn!(entry = %entry_path.display(), "rejected archive entry escaping destination");
                    return Err(PmError::Security(format!(
                        "archive entry escapes destination: {}",
                        entry_path.display()
                    )));
                }
            }
        }
        if rest.as_os_str().is_empty() {
            continue;
        }

        let target = dest.join(&rest);
        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&target).map_err(|e| PmError::io(&target, e))?;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|e| PmError::io(parent, e))?;
                }
                entry
                    .unpack(&target)
                    .map_err(|e| extraction(archive_path, format!("{}: {}", target.display(), e)))?;
                extracted += 1;
            }
            other => debug!(entry = %entry_path.display(), kind = ?other, "skipping archive entry"),
        }
    }

    debug!(archive = %archive_path.display(), dest = %dest.display(), files = extracted, "extracted archive");
    Ok(extracted)
}

/// Pack the contents of `src_dir` into a gzipped tarball at `archive_path`,
/// with every entry placed under the top-level directory `prefix`.
pub fn create_tarball(src_dir: &Path, prefix: &str, archive_path: &Path) -> Result<()> {
    let file = File::create(archive_path).map_err(|e| PmError::io(archive_path, e))?;
    let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);

    builder
        .append_dir_all(prefix, src_dir)
        .map_err(|e| PmError::io(src_dir, e))?;
    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(|e| PmError::io(archive_path, e))?;

    debug!(src = %src_dir.display(), archive = %archive_path.display(), "created archive");
    Ok(())
}
