//! Parse phase: Jenkins trace JSON → `SpanNode` tree.

pub mod params;
pub mod types;

pub use params::{Param, Sidecar};
pub use types::*;

use crate::error::ConvertError;

/// Deserialize one trace export document into its root span.
pub fn parse(json: &str) -> Result<SpanNode, ConvertError> {
    serde_json::from_str::<SpanNode>(json).map_err(|e| {
        ConvertError::parse("P001", format!("Failed to parse Jenkins trace JSON: {}", e))
    })
}

/// Parse a trace export from raw bytes.
pub fn parse_slice(bytes: &[u8]) -> Result<SpanNode, ConvertError> {
    serde_json::from_slice::<SpanNode>(bytes).map_err(|e| {
        ConvertError::parse("P001", format!("Failed to parse Jenkins trace JSON: {}", e))
    })
}
