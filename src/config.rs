use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Settings of a [`CommandStack`](crate::command::CommandStack).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)] // missing keys fall back to the defaults
pub struct StackConfig {
    /// Maximum number of undo steps kept; `None` keeps everything
    pub history_limit: Option<usize>,
    /// Fire `elements.changed` after every outermost call
    pub emit_elements_changed: bool,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            history_limit: None,
            emit_elements_changed: true,
        }
    }
}

impl StackConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| Error::InvalidConfig(err.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| Error::InvalidConfig(err.to_string()))
    }
}
