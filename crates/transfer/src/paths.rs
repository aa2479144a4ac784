//! Download directory policy: sanitized names, collision-free creation.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};

use crate::TransferError;

/// Give up probing for a free name after this many suffixes.
const MAX_COLLISION_SUFFIX: u32 = 10_000;

/// Reduces an offered filename to a bare final component.
///
/// Senders control this string, so path separators (either flavor) and
/// dot-names are stripped rather than trusted. An empty result falls back
/// to `"download"`.
pub fn sanitize_filename(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim()
        .to_string();
    match last.as_str() {
        "" | "." | ".." => "download".to_string(),
        _ => last,
    }
}

/// Creates a new file for `filename` under `dir`, resolving collisions as
/// `name.ext` → `name (1).ext` → `name (2).ext` ….
///
/// Uses `create_new` so two concurrent sessions can never claim the same
/// path. The directory is created on demand.
pub async fn create_unique(dir: &Path, filename: &str) -> Result<(PathBuf, File), TransferError> {
    tokio::fs::create_dir_all(dir).await?;

    let clean = sanitize_filename(filename);
    let (stem, ext) = match clean.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), Some(ext.to_string())),
        _ => (clean.clone(), None),
    };

    for n in 0..=MAX_COLLISION_SUFFIX {
        let candidate = match (n, &ext) {
            (0, _) => clean.clone(),
            (n, Some(ext)) => format!("{stem} ({n}).{ext}"),
            (n, None) => format!("{stem} ({n})"),
        };
        let path = dir.join(candidate);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(TransferError::InvalidFile(format!(
        "no free name for {clean} after {MAX_COLLISION_SUFFIX} attempts"
    )))
}
