//! Top-level conversion API: parse → lower → assemble.

use serde::Serialize;

use crate::codegen;
use crate::config::ConvertOptions;
use crate::error::{ConvertError, Diagnostic};
use crate::ir::Pipeline;
use crate::lower;
use crate::parse::{self, SpanNode};
use crate::steps::Registry;

/// A converted pipeline and the non-fatal findings recorded on the way.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversion {
    pub pipeline: Pipeline,
    pub diagnostics: Vec<Diagnostic>,
}

/// A source format that can be converted into a pipeline document.
pub trait SourceConverter {
    fn convert(&self, input: &str, options: &ConvertOptions) -> Result<Conversion, ConvertError>;
}

/// Converter for Jenkins JSON trace exports.
///
/// Holds only the read-only converter registry, so one instance can serve
/// concurrent conversions.
#[derive(Debug, Clone, Default)]
pub struct JenkinsJsonConverter {
    registry: Registry,
}

impl JenkinsJsonConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: Registry) -> Self {
        JenkinsJsonConverter { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Convert an already parsed span tree. Infallible.
    pub fn convert_tree(&self, root: &SpanNode, options: &ConvertOptions) -> Conversion {
        let mut lowered = lower::lower(root, options, &self.registry);
        let diagnostics = std::mem::take(&mut lowered.diagnostics);
        Conversion {
            pipeline: codegen::assemble(root, lowered, options),
            diagnostics,
        }
    }
}

impl SourceConverter for JenkinsJsonConverter {
    fn convert(&self, input: &str, options: &ConvertOptions) -> Result<Conversion, ConvertError> {
        let root = parse::parse(input)?;
        Ok(self.convert_tree(&root, options))
    }
}

/// Convert a Jenkins JSON trace with the built-in converters.
pub fn convert(json: &str, options: &ConvertOptions) -> Result<Conversion, ConvertError> {
    JenkinsJsonConverter::new().convert(json, options)
}

pub fn convert_to_yaml(json: &str, options: &ConvertOptions) -> Result<String, ConvertError> {
    codegen::to_yaml(&convert(json, options)?.pipeline)
}

pub fn convert_to_json(json: &str, options: &ConvertOptions) -> Result<String, ConvertError> {
    codegen::to_json(&convert(json, options)?.pipeline)
}
