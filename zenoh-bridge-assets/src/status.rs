//! Bridge status reporting.

use serde::{Deserialize, Serialize};

/// Bridge name used in status documents.
pub const BRIDGE_NAME: &str = "assets";

/// Bridge status information, published to `{key_prefix}/@/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStatus {
    /// Bridge name.
    pub bridge: String,
    /// Bridge version.
    pub version: String,
    /// Current status ("running", "offline", "error").
    pub status: String,
    /// Additional metadata, flattened into the document.
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl BridgeStatus {
    /// Create a new status with "running" state.
    pub fn running(version: impl Into<String>) -> Self {
        Self::with_state(version, "running")
    }

    /// Create a status with "offline" state.
    pub fn offline(version: impl Into<String>) -> Self {
        Self::with_state(version, "offline")
    }

    /// Create a status with "error" state.
    pub fn error(version: impl Into<String>, error: impl Into<String>) -> Self {
        let mut status = Self::with_state(version, "error");
        status
            .metadata
            .insert("error".to_string(), serde_json::Value::from(error.into()));
        status
    }

    fn with_state(version: impl Into<String>, state: &str) -> Self {
        Self {
            bridge: BRIDGE_NAME.to_string(),
            version: version.into(),
            status: state.to_string(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Add metadata fields to the status. Non-object values are ignored.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = metadata {
            self.metadata.extend(map);
        }
        self
    }
}
