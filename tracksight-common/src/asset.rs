use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The full set of asset records returned by one fetch call.
///
/// A snapshot lives for exactly one poll tick; it is never persisted or
/// diffed against earlier snapshots.
pub type AssetSnapshot = Vec<AssetRecord>;

/// One tracked asset as reported by the location API.
///
/// The bridge only interprets `uid` and `name` (used for routing metadata);
/// everything else the API reports (position, zone, battery, ...) is carried
/// opaquely in `payload` and forwarded as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    /// Stable unique identifier for the asset.
    pub uid: String,

    /// Human-readable asset name.
    pub name: String,

    /// Free-form location/state fields, opaque to the bridge.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl AssetRecord {
    /// Create a record with an empty payload.
    pub fn new(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            payload: Map::new(),
        }
    }

    /// Add a payload field to this record.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}
