//! Conversion options shared by the library, CLI and WASM entry points.

use serde::{Deserialize, Serialize};

use crate::error::ConvertError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConvertOptions {
    /// Pipeline name. Defaults to the sanitized root span label.
    pub pipeline_name: Option<String>,
    /// Image used by steps that run outside any `withDockerContainer` block.
    pub default_image: Option<String>,
    /// Merge adjacent compatible script steps into one.
    pub merge_steps: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            pipeline_name: None,
            default_image: None,
            merge_steps: true,
        }
    }
}

impl ConvertOptions {
    /// Read options from a JSON document; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConvertError> {
        serde_json::from_str(json)
            .map_err(|e| ConvertError::parse("P002", format!("Invalid conversion options: {}", e)))
    }
}
