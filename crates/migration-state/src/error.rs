//! Error types for migration-state

use thiserror::Error;

/// Errors that can occur in the persistence layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Snapshot name is empty or would escape the snapshot directory
    #[error("invalid snapshot name: {name}")]
    InvalidSnapshotName { name: String },

    /// Snapshot does not exist
    #[error("snapshot not found: {name}")]
    SnapshotNotFound { name: String },

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_not_found_displays_name() {
        let err = StorageError::SnapshotNotFound {
            name: "monitor-summary".to_string(),
        };
        assert!(err.to_string().contains("monitor-summary"));
    }
}
