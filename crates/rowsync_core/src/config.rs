//! Engine configuration.

/// Configuration for a [`crate::StorageEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Namespace the engine (and its store) operates in.
    pub namespace: String,
    /// Device id stamped into every locally issued HLC.
    pub device_id: String,
}

impl EngineConfig {
    /// Creates a configuration.
    pub fn new(namespace: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            device_id: device_id.into(),
        }
    }
}
