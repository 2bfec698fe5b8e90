//! JSON Lines file helpers shared by every repository.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::StoreError;

/// Expands a leading `~` or `~/` against the home directory.
pub fn expand_user(path: &str) -> Result<PathBuf, StoreError> {
    let rest = match path.strip_prefix('~') {
        None => return Ok(PathBuf::from(path)),
        Some(rest) if rest.is_empty() => "",
        Some(rest) => match rest.strip_prefix(['/', '\\']) {
            Some(rest) => rest,
            None => return Ok(PathBuf::from(path)),
        },
    };

    let home = dirs::home_dir()
        .ok_or_else(|| StoreError::storage("cannot resolve the home directory"))?;
    Ok(if rest.is_empty() { home } else { home.join(rest) })
}

/// Creates the parent directories and an empty file when `path` is missing.
pub async fn ensure_file(path: &Path) -> Result<(), StoreError> {
    if tokio::fs::try_exists(path)
        .await
        .map_err(|error| StoreError::storage(format!("failed to stat {}: {error}", path.display())))?
    {
        return Ok(());
    }

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|error| {
            StoreError::storage(format!("failed to create directory {}: {error}", parent.display()))
        })?;
    }
    tokio::fs::write(path, b"")
        .await
        .map_err(|error| StoreError::storage(format!("failed to create {}: {error}", path.display())))
}

/// Reads one record per line. Blank lines are ignored; lines that are not
/// UTF-8 or not valid records are reported to `on_skip` with their 1-based line number.
pub(crate) async fn load_jsonl<T: DeserializeOwned>(
    path: &Path,
    mut on_skip: impl FnMut(usize, &str),
) -> Result<Vec<T>, StoreError> {
    let contents = tokio::fs::read(path)
        .await
        .map_err(|error| StoreError::storage(format!("failed to read {}: {error}", path.display())))?;

    let mut items = Vec::new();
    for (index, raw) in contents.split(|byte| *byte == b'\n').enumerate() {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim(),
            Err(error) => {
                on_skip(index + 1, &format!("invalid utf-8: {error}"));
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line) {
            Ok(item) => items.push(item),
            Err(error) => on_skip(index + 1, &error.to_string()),
        }
    }
    Ok(items)
}

/// Rewrites `path` with one line per item via a sibling temporary file.
pub(crate) async fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<(), StoreError> {
    let mut buffer = Vec::new();
    for item in items {
        serde_json::to_writer(&mut buffer, item)
            .map_err(|error| StoreError::serialization(format!("failed to encode record: {error}")))?;
        buffer.push(b'\n');
    }

    let tmp = temporary_sibling(path);
    tokio::fs::write(&tmp, &buffer).await.map_err(|error| {
        StoreError::storage(format!("failed to write {}: {error}", tmp.display()))
    })?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|error| StoreError::storage(format!("failed to replace {}: {error}", path.display())))
}

fn temporary_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("store"));
    name.push(".tmp");
    path.with_file_name(name)
}
