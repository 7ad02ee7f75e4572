//! File-backed metadata stores.
//!
//! The control panel's artifact browser and tool manager read their
//! listings from plain JSON files. These stores are collaborators of the
//! request pipeline, accessed through a read contract; nothing here is
//! cached or watched.

pub mod artifacts;
pub mod tools;

use thiserror::Error;

pub use artifacts::{ArtifactMeta, ArtifactStore};
pub use tools::{ToolInfo, ToolStore};

/// Errors reading a metadata file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
