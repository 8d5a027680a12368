//! Filesystem moves and naming helpers
//!
//! Documents move between source, archive, error, in-flight and target
//! folders which may live on different filesystems. [`move_file`] renames
//! when possible and falls back to copy-then-delete otherwise.

use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, instrument};
use uuid::Uuid;

/// Moves `from` to `to`, creating the destination's parent folder
///
/// A plain rename is attempted first. If it fails for any reason other than
/// a missing source, the file is copied and the source removed.
///
/// # Errors
/// Returns the rename error when the source does not exist, otherwise the
/// error of the copy or of removing the source
#[instrument(level = "debug", fields(from = %from.display(), to = %to.display()))]
pub async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(e),
        Err(e) => {
            debug!(error = %e, "Rename failed, falling back to copy");
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await?;
            Ok(())
        }
    }
}

/// File name of `path` without its last extension
///
/// `/out/invoice.upload` yields `invoice`.
pub fn base_name(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `<base>_<random-id>`, where `<base>` is [`base_name`] of `path`
pub fn unique_stem(path: &Path) -> String {
    format!("{}_{}", base_name(path), Uuid::new_v4().simple())
}

/// Whether `path` has the given extension, compared case-insensitively
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}
