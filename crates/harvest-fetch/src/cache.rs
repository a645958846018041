use std::future::Future;
use std::path::Path;

use serde::Serialize;

use harvest_store::{write_json, Storage};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Artifact already present; nothing fetched.
    Cached,
    /// Fetched and written; carries the number of records.
    Fetched(usize),
}

impl FetchOutcome {
    pub fn was_fetched(self) -> bool {
        matches!(self, FetchOutcome::Fetched(_))
    }
}

/// Payloads whose size is worth reporting.
pub trait RecordCount {
    fn record_count(&self) -> usize;
}

impl<T> RecordCount for Vec<T> {
    fn record_count(&self) -> usize {
        self.len()
    }
}

impl RecordCount for serde_json::Value {
    fn record_count(&self) -> usize {
        match self {
            serde_json::Value::Array(items) => items.len(),
            serde_json::Value::Null => 0,
            _ => 1,
        }
    }
}

/// Run `fetch` only when `path` holds no non-empty artifact, then write the
/// result atomically. Never overwrites an existing artifact; a refresh needs
/// the file deleted first.
///
/// The existence check is not locked. Callers must keep concurrent workers on
/// disjoint paths.
pub async fn fetch_if_missing<T, F, Fut>(
    storage: &dyn Storage,
    path: &Path,
    fetch: F,
) -> Result<FetchOutcome>
where
    T: Serialize + RecordCount,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if storage.exists(path) {
        return Ok(FetchOutcome::Cached);
    }
    let payload = fetch().await?;
    write_json(storage, path, &payload)?;
    Ok(FetchOutcome::Fetched(payload.record_count()))
}
