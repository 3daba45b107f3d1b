use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};
use tracing::warn;

/// Reads a JSON document, treating a missing or unreadable file as empty.
pub(crate) async fn read_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "storage: failed to read json file");
            return T::default();
        }
    };

    match serde_json::from_slice(&raw) {
        Ok(value) => value,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "storage: failed to parse json file");
            T::default()
        }
    }
}

/// Writes through a sibling temp file and a rename so readers never see a partial document.
pub(crate) async fn write_atomic<T>(path: &Path, value: &T) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create data dir {}", parent.display()))?;
    }

    let body = serde_json::to_vec_pretty(value)?;
    let tmp_path = temp_path(path);

    tokio::fs::write(&tmp_path, body)
        .await
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("failed to replace {}", path.display()))?;

    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut file_name = path.file_name().unwrap_or_default().to_os_string();
    file_name.push(".tmp");
    path.with_file_name(file_name)
}
