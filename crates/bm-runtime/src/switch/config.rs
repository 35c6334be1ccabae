use serde::{Deserialize, Serialize};

/// Construction-time settings of a [`Switch`](super::Switch).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchConfig {
    /// Allow staging and cutting over to a new program at runtime
    pub enable_swap: bool,
}

impl SwitchConfig {
    pub fn with_swap() -> Self {
        Self { enable_swap: true }
    }
}
