//! JSON state files shared by the metadata store and the worker ledger

use crate::error::{ResfetchError, ResfetchResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// Read a JSON document, returning `None` if the file does not exist
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> ResfetchResult<Option<T>> {
    if !fs::try_exists(path)
        .await
        .map_err(|e| ResfetchError::io(format!("checking {}", path.display()), e))?
    {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .await
        .map_err(|e| ResfetchError::io(format!("reading {}", path.display()), e))?;
    let value = serde_json::from_str(&content).map_err(|e| {
        ResfetchError::Store(format!("decoding {}: {}", path.display(), e))
    })?;
    Ok(Some(value))
}

/// Replace a JSON document through a temp file and rename
///
/// The temp file name is unique per write, so concurrent writers never
/// interleave within one file.
pub(crate) async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> ResfetchResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| ResfetchError::io(format!("creating directory {}", parent.display()), e))?;
    }

    let content = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
    fs::write(&tmp, content)
        .await
        .map_err(|e| ResfetchError::io(format!("writing {}", tmp.display()), e))?;
    if let Err(e) = fs::rename(&tmp, path).await {
        if let Err(cleanup) = fs::remove_file(&tmp).await {
            debug!("Removing {} failed: {}", tmp.display(), cleanup);
        }
        return Err(ResfetchError::io(format!("replacing {}", path.display()), e));
    }
    Ok(())
}
