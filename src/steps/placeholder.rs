//! Fallback for step types with no converter.

use crate::ir::{Shell, StepSpec};
use crate::lower::context::StepContext;
use crate::parse::SpanNode;

use super::{Converted, double_quote_escape, step_for};

/// A script step that documents the unsupported span: its type and its
/// parameters as comments, then an echo so the gap is visible in logs.
pub fn convert(node: &SpanNode, ctx: &StepContext) -> Converted {
    let step_type = node.step_type();
    let params = serde_json::to_string_pretty(&node.parameter_map)
        .unwrap_or_else(|_| "{}".to_string());

    let mut run = format!("# Unsupported step type: {}\n# Parameters:\n", step_type);
    for line in params.lines() {
        run.push_str("# ");
        run.push_str(line);
        run.push('\n');
    }
    run.push_str(&format!(
        "echo \"Unsupported step type: {}\"",
        double_quote_escape(step_type)
    ));

    Ok(vec![step_for(node, ctx, StepSpec::Script(ctx.script(Some(Shell::Sh), run)))])
}
