use anyhow::{Context, Result};
use std::path::PathBuf;

use harvest_core::JobState;

/// The `job.json` checkpoint document.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    path: PathBuf,
}

impl Checkpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `None` when no run has checkpointed here yet.
    pub fn load(&self) -> Result<Option<JobState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading checkpoint: {}", self.path.display()))?;
        let state: JobState = serde_json::from_str(&content)
            .with_context(|| format!("parsing checkpoint: {}", self.path.display()))?;
        Ok(Some(state))
    }

    /// Replace the checkpoint; readers never see a partial document.
    pub fn save(&self, state: &JobState) -> Result<()> {
        let data = serde_json::to_string_pretty(state)?;
        harvest_store::write_atomic(&self.path, data.as_bytes())
            .with_context(|| format!("saving checkpoint: {}", self.path.display()))?;
        Ok(())
    }
}
