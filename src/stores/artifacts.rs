//! Artifact listing store.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::stores::StoreError;

/// Metadata for one artifact produced by the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub id: String,
    pub name: String,
    /// Artifact kind (e.g., "markdown", "code", "image").
    pub kind: String,
    pub created_at: String,
    #[serde(default)]
    pub size_bytes: u64,
}

/// Read-only view over the artifact listing file.
pub struct ArtifactStore {
    path: PathBuf,
}

impl ArtifactStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// List all artifacts. A missing file is an empty listing, not an error.
    pub fn list(&self) -> Result<Vec<ArtifactMeta>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Look up one artifact by id.
    pub fn get(&self, id: &str) -> Result<Option<ArtifactMeta>, StoreError> {
        Ok(self.list()?.into_iter().find(|a| a.id == id))
    }
}
