//! Document serialization.

use crate::error::ConvertError;
use crate::ir::Pipeline;

pub fn to_yaml(pipeline: &Pipeline) -> Result<String, ConvertError> {
    serde_yaml::to_string(pipeline)
        .map_err(|e| ConvertError::serialize("S001", format!("Failed to write YAML: {}", e)))
}

pub fn to_json(pipeline: &Pipeline) -> Result<String, ConvertError> {
    serde_json::to_string_pretty(pipeline)
        .map_err(|e| ConvertError::serialize("S002", format!("Failed to write JSON: {}", e)))
}
