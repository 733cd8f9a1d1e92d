//! Lowering phase: span tree → ordered steps.
//!
//! Walks the parsed trace with a scoped context, dispatching each span to a
//! wrapper handler or a step converter, then sorts and merges the root
//! buffer. Non-fatal findings are collected as diagnostics.

pub mod context;
pub mod merge;
pub mod sanitize;
pub mod tools;
pub mod walker;

use crate::config::ConvertOptions;
use crate::error::Diagnostic;
use crate::ir::{CloneSpec, Repository, Step};
use crate::parse::SpanNode;
use crate::steps::Registry;

use context::StepContext;
use walker::Walker;

/// The converted steps of one trace plus what the assembler needs besides.
#[derive(Debug)]
pub struct Lowered {
    pub steps: Vec<Step>,
    pub clone: Option<CloneSpec>,
    pub repository: Option<Repository>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Lower a parsed span tree. Never fails: unusable spans degrade to
/// placeholders or are skipped, with a diagnostic.
pub fn lower(root: &SpanNode, options: &ConvertOptions, registry: &Registry) -> Lowered {
    let ctx = StepContext::root(options);
    let mut walker = Walker::new(registry, options.merge_steps);

    let result = walker.walk(root, &ctx);
    let steps = merge::finalize(result.entries, options.merge_steps);
    let diagnostics = walker.into_state().into_diagnostics();

    tracing::info!(
        steps = steps.len(),
        diagnostics = diagnostics.len(),
        "lowered span tree"
    );

    Lowered {
        steps,
        clone: result.clone,
        repository: result.repository,
        diagnostics,
    }
}
