//! Converters for steps that become `script` steps.

use crate::ir::{Shell, Step, StepSpec};
use crate::lower::context::StepContext;
use crate::parse::SpanNode;

use super::{Converted, double_quote_escape, required, shell_quote, step_for};

/// Heredoc delimiter used by `writeFile`.
const HEREDOC_DELIMITER: &str = "JENKINS_EOF";

pub fn sh(node: &SpanNode, ctx: &StepContext) -> Converted {
    shell_step(node, ctx, Shell::Sh)
}

/// Windows batch runs through PowerShell; there is no cmd shell.
pub fn bat(node: &SpanNode, ctx: &StepContext) -> Converted {
    shell_step(node, ctx, Shell::Powershell)
}

pub fn pwsh(node: &SpanNode, ctx: &StepContext) -> Converted {
    shell_step(node, ctx, Shell::Pwsh)
}

pub fn powershell(node: &SpanNode, ctx: &StepContext) -> Converted {
    shell_step(node, ctx, Shell::Powershell)
}

/// The shell a shell step type runs in, or `None` for other step types.
pub fn shell_kind(step_type: &str) -> Option<Shell> {
    match step_type {
        "sh" => Some(Shell::Sh),
        "bat" | "powershell" => Some(Shell::Powershell),
        "pwsh" => Some(Shell::Pwsh),
        _ => None,
    }
}

/// The script of a shell step, from its parameters or its sidecar.
pub fn shell_script(node: &SpanNode) -> Option<String> {
    node.param("script")
        .as_text()
        .or_else(|| node.sidecar().get("script").as_text())
}

fn shell_step(node: &SpanNode, ctx: &StepContext, shell: Shell) -> Converted {
    let script = required(shell_script(node), "script")?;
    Ok(vec![run(node, ctx, shell, script)])
}

pub fn echo(node: &SpanNode, ctx: &StepContext) -> Converted {
    let message = node
        .param("message")
        .as_string()
        .or_else(|| node.sidecar().get("message").as_string())
        .unwrap_or_default();
    Ok(vec![run(node, ctx, Shell::Sh, format!("echo \"{}\"", double_quote_escape(&message)))])
}

pub fn sleep(node: &SpanNode, ctx: &StepContext) -> Converted {
    let time = node.param("time").as_f64().unwrap_or(0.0);
    let unit = node
        .param("unit")
        .as_text()
        .unwrap_or_else(|| "SECONDS".to_string());
    let seconds = to_seconds(time, &unit);
    Ok(vec![run(node, ctx, Shell::Sh, format!("sleep {}", seconds))])
}

fn to_seconds(time: f64, unit: &str) -> u64 {
    if !time.is_finite() || time <= 0.0 {
        return 0;
    }
    let factor = match unit.trim().to_ascii_uppercase().as_str() {
        "NANOSECONDS" => 1e-9,
        "MICROSECONDS" => 1e-6,
        "MILLISECONDS" => 1e-3,
        "MINUTES" => 60.0,
        "HOURS" => 3600.0,
        "DAYS" => 86_400.0,
        _ => 1.0,
    };
    (time * factor).ceil() as u64
}

pub fn write_file(node: &SpanNode, ctx: &StepContext) -> Converted {
    let file = required(node.param("file").as_text(), "file")?;
    let text = node.param("text").as_string().unwrap_or_default();
    let body = format!(
        "cat > {} <<'{delim}'\n{}\n{delim}",
        shell_quote(&file),
        text.trim_end_matches('\n'),
        delim = HEREDOC_DELIMITER,
    );
    Ok(vec![run(node, ctx, Shell::Sh, body)])
}

pub fn read_file(node: &SpanNode, ctx: &StepContext) -> Converted {
    file_command(node, ctx, "cat")
}

pub fn file_exists(node: &SpanNode, ctx: &StepContext) -> Converted {
    file_command(node, ctx, "test -e")
}

fn file_command(node: &SpanNode, ctx: &StepContext, command: &str) -> Converted {
    let file = required(node.param("file").as_text(), "file")?;
    Ok(vec![run(node, ctx, Shell::Sh, format!("{} {}", command, shell_quote(&file)))])
}

/// `deleteDir` and `cleanWs` both empty the working directory.
pub fn delete_dir(node: &SpanNode, ctx: &StepContext) -> Converted {
    Ok(vec![run(node, ctx, Shell::Sh, "find . -mindepth 1 -delete")])
}

pub fn error(node: &SpanNode, ctx: &StepContext) -> Converted {
    let message = node.param("message").as_string().unwrap_or_default();
    let body = format!("echo \"{}\" >&2\nexit 1", double_quote_escape(&message));
    Ok(vec![run(node, ctx, Shell::Sh, body)])
}

/// A script step with `node`'s identity running `body`.
pub fn run(node: &SpanNode, ctx: &StepContext, shell: Shell, body: impl Into<String>) -> Step {
    step_for(node, ctx, StepSpec::Script(ctx.script(Some(shell), body)))
}
