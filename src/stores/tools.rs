//! Tool listing store.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::stores::StoreError;

/// Metadata about a registered tool (for the tool manager UI).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub enabled: bool,
}

/// Read-only view over the tool listing file.
pub struct ToolStore {
    path: PathBuf,
}

impl ToolStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// List all registered tools. A missing file is an empty listing.
    pub fn list(&self) -> Result<Vec<ToolInfo>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
