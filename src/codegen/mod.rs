//! Codegen pass: lowered steps → pipeline document → YAML / JSON.
//!
//! Public API: `assemble(root, lowered, options) -> Pipeline`, plus
//! `to_yaml` and `to_json` for serialization.

mod emit;

pub use emit::{to_json, to_yaml};

use crate::config::ConvertOptions;
use crate::ir::{Pipeline, PipelineSpec, Stage, StageSpec};
use crate::lower::Lowered;
use crate::lower::sanitize::sanitize_name;
use crate::parse::SpanNode;

pub const PIPELINE_VERSION: u32 = 1;
pub const PIPELINE_KIND: &str = "pipeline";
pub const STAGE_ID: &str = "build";
pub const STAGE_TYPE: &str = "ci";
pub const DEFAULT_PIPELINE_NAME: &str = "default";

/// Wrap the lowered steps into a single-stage pipeline document.
pub fn assemble(root: &SpanNode, lowered: Lowered, options: &ConvertOptions) -> Pipeline {
    let stage = Stage {
        id: STAGE_ID.into(),
        name: STAGE_ID.into(),
        stage_type: STAGE_TYPE.into(),
        spec: StageSpec {
            clone: lowered.clone,
            steps: lowered.steps,
        },
    };

    Pipeline {
        version: PIPELINE_VERSION,
        kind: PIPELINE_KIND.into(),
        name: pipeline_name(root, options),
        spec: PipelineSpec {
            stages: vec![stage],
            repository: lowered.repository,
        },
    }
}

/// The configured name, else the sanitized root label, else `default`.
fn pipeline_name(root: &SpanNode, options: &ConvertOptions) -> String {
    if let Some(name) = options.pipeline_name.as_deref().filter(|n| !n.trim().is_empty()) {
        return name.to_string();
    }
    let label = root.label();
    if label.trim().is_empty() {
        DEFAULT_PIPELINE_NAME.to_string()
    } else {
        sanitize_name(label)
    }
}
