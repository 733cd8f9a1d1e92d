//! Step converters: one function per supported Jenkins step type.
//!
//! Converters are pure. They read a span and the scoped context and return
//! zero or more steps; they never touch conversion state. Missing or oddly
//! shaped parameters degrade to defaults. A converter skips the span only
//! when the parameter that gives the step its meaning is missing, and says
//! which one through `Skipped`; the walker reports it.
//!
//! SYNC NOTE: step types handled structurally by the walker (wrappers,
//! `stage`, tool wrappers) are not registered here; see
//! `lower::walker::classify`.

pub mod artifacts;
pub mod notify;
pub mod placeholder;
pub mod scm;
pub mod script;

use std::collections::HashMap;

use crate::ir::{Step, StepSpec};
use crate::lower::context::StepContext;
use crate::lower::sanitize::{sanitize_id, sanitize_name};
use crate::parse::SpanNode;

/// A span a converter produced nothing for.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no {missing}")]
pub struct Skipped {
    pub missing: &'static str,
}

pub type Converted = Result<Vec<Step>, Skipped>;

pub type ConvertFn = fn(&SpanNode, &StepContext) -> Converted;

#[derive(Clone, Copy)]
pub struct Converter {
    pub convert: ConvertFn,
    /// The span's `harness-attribute` sidecar carries the step's only
    /// usable parameters; without it the span is skipped.
    pub requires_sidecar: bool,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("requires_sidecar", &self.requires_sidecar)
            .finish_non_exhaustive()
    }
}

/// Step type → converter lookup, with a fallback for unknown types.
#[derive(Debug, Clone)]
pub struct Registry {
    converters: HashMap<&'static str, Converter>,
    fallback: ConvertFn,
}

impl Default for Registry {
    fn default() -> Self {
        Registry::builtin()
    }
}

impl Registry {
    /// A registry with no converters; every step becomes a placeholder.
    pub fn empty() -> Self {
        Registry {
            converters: HashMap::new(),
            fallback: placeholder::convert,
        }
    }

    pub fn builtin() -> Self {
        let mut registry = Registry::empty();

        // Shell and basic steps
        registry.register("sh", script::sh);
        registry.register("bat", script::bat);
        registry.register("pwsh", script::pwsh);
        registry.register("powershell", script::powershell);
        registry.register("echo", script::echo);
        registry.register("sleep", script::sleep);
        registry.register("writeFile", script::write_file);
        registry.register("readFile", script::read_file);
        registry.register("fileExists", script::file_exists);
        registry.register("deleteDir", script::delete_dir);
        registry.register("cleanWs", script::delete_dir);
        registry.register("error", script::error);

        // Source control
        registry.register("checkout", scm::checkout);
        registry.register("git", scm::checkout);

        // Artifacts and reports
        registry.register("archiveArtifacts", artifacts::archive_artifacts);
        registry.register("junit", artifacts::junit);
        registry.register("stash", artifacts::stash);
        registry.register("unstash", artifacts::unstash);
        registry.register_with_sidecar("s3Upload", artifacts::s3_upload);

        // Notifications
        registry.register("slackSend", notify::slack_send);
        registry.register("mail", notify::mail);
        registry.register("emailext", notify::mail);
        registry.register_with_sidecar("jiraSendBuildInfo", notify::jira_build_info);
        registry.register_with_sidecar("jiraSendDeploymentInfo", notify::jira_deployment_info);

        registry
    }

    pub fn register(&mut self, step_type: &'static str, convert: ConvertFn) {
        self.converters.insert(
            step_type,
            Converter {
                convert,
                requires_sidecar: false,
            },
        );
    }

    pub fn register_with_sidecar(&mut self, step_type: &'static str, convert: ConvertFn) {
        self.converters.insert(
            step_type,
            Converter {
                convert,
                requires_sidecar: true,
            },
        );
    }

    pub fn get(&self, step_type: &str) -> Option<Converter> {
        self.converters.get(step_type).copied()
    }

    /// Converter used for step types with no registration.
    pub fn fallback(&self) -> ConvertFn {
        self.fallback
    }

    pub fn set_fallback(&mut self, fallback: ConvertFn) {
        self.fallback = fallback;
    }

    /// Registered step types, sorted.
    pub fn step_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.converters.keys().copied().collect();
        types.sort_unstable();
        types
    }
}

/// `value`, or a skip naming what is missing.
pub(crate) fn required<T>(value: Option<T>, missing: &'static str) -> Result<T, Skipped> {
    value.ok_or(Skipped { missing })
}

/// A step carrying `node`'s identity and the context's timeout.
pub(crate) fn step_for(node: &SpanNode, ctx: &StepContext, spec: StepSpec) -> Step {
    Step {
        id: sanitize_id(node.label(), &node.span_id),
        name: sanitize_name(node.label()),
        spec,
        timeout: ctx.timeout.clone(),
    }
}

/// Quote `value` for a POSIX shell.
pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r#"'\''"#))
}

/// Escape `value` for use inside a double-quoted shell string.
pub(crate) fn double_quote_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registers_core_step_types() {
        let registry = Registry::builtin();
        for step_type in ["sh", "bat", "echo", "checkout", "junit", "slackSend"] {
            assert!(registry.get(step_type).is_some(), "{} missing", step_type);
        }
        assert!(registry.get("withEnv").is_none());
        assert!(registry.get("s3Upload").unwrap().requires_sidecar);
        assert!(!registry.get("sh").unwrap().requires_sidecar);
    }

    #[test]
    fn step_types_are_sorted() {
        let types = Registry::builtin().step_types();
        let mut sorted = types.clone();
        sorted.sort_unstable();
        assert_eq!(types, sorted);
    }

    #[test]
    fn quoting() {
        assert_eq!(shell_quote("it's"), r#"'it'\''s'"#);
        assert_eq!(double_quote_escape(r#"say "$HOME""#), r#"say \"\$HOME\""#);
    }
}
