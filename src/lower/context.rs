//! Context threaded through the tree walk.
//!
//! `StepContext` is scoped: wrapper spans derive a new context for their
//! subtree and the parent's is never touched, so a delta is invisible to
//! siblings. `ConversionState` is the only mutable state and belongs to a
//! single conversion.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::ConvertOptions;
use crate::error::Diagnostic;
use crate::ir::{ScriptSpec, Shell};
use crate::parse::SpanNode;

use super::tools::{DetectedTool, Tool};

/// Keys inside a `withCredentials` binding that name an injected variable.
const CREDENTIAL_VARIABLE_KEYS: [&str; 6] = [
    "variable",
    "usernameVariable",
    "passwordVariable",
    "keyFileVariable",
    "passphraseVariable",
    "tokenVariable",
];

// =============================================================================
// SCOPED CONTEXT
// =============================================================================

/// Container settings in effect for a subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Container {
    pub image: Option<String>,
    pub connector: Option<String>,
    pub entrypoint: Option<String>,
    pub args: Vec<String>,
    pub privileged: bool,
    pub network: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepContext {
    pub environment: BTreeMap<String, String>,
    pub container: Container,
    pub timeout: Option<String>,
}

impl StepContext {
    pub fn root(options: &ConvertOptions) -> Self {
        StepContext {
            container: Container {
                image: options.default_image.clone(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// A copy with `delta` layered over the current environment.
    pub fn with_env(&self, delta: BTreeMap<String, String>) -> Self {
        let mut next = self.clone();
        next.environment.extend(delta);
        next
    }

    pub fn with_container(&self, container: Container) -> Self {
        StepContext {
            container,
            ..self.clone()
        }
    }

    pub fn with_timeout(&self, timeout: Option<String>) -> Self {
        match timeout {
            Some(t) => StepContext {
                timeout: Some(t),
                ..self.clone()
            },
            None => self.clone(),
        }
    }

    /// A script payload running `run` inside this context's container.
    pub fn script(&self, shell: Option<Shell>, run: impl Into<String>) -> ScriptSpec {
        ScriptSpec {
            image: self.container.image.clone(),
            connector: self.container.connector.clone(),
            shell,
            envs: self.environment.clone(),
            entrypoint: self.container.entrypoint.clone(),
            args: self.container.args.clone(),
            privileged: self.container.privileged,
            network: self.container.network.clone(),
            run: run.into(),
        }
    }
}

/// The kinds of wrapper span that change the context for their subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Env,
    Credentials,
    DockerContainer,
    DockerRegistry,
    Timeout,
}

/// Derive the context for the children of a context-mutating wrapper.
pub fn scoped(scope: Scope, node: &SpanNode, ctx: &StepContext) -> StepContext {
    match scope {
        Scope::Env => ctx.with_env(env_overrides(node)),
        Scope::Credentials => ctx.with_env(credential_variables(node)),
        Scope::DockerContainer => ctx.with_container(docker_container(node, &ctx.container)),
        Scope::DockerRegistry => {
            let connector = node
                .params()
                .find("credentialsId")
                .as_text()
                .or_else(|| ctx.container.connector.clone());
            ctx.with_container(Container {
                connector,
                ..ctx.container.clone()
            })
        }
        Scope::Timeout => ctx.with_timeout(timeout_of(node)),
    }
}

/// `withEnv(['K=V', ...])`.
fn env_overrides(node: &SpanNode) -> BTreeMap<String, String> {
    let sidecar = node.sidecar();
    let mut overrides = node.param("overrides").as_string_list();
    if overrides.is_empty() {
        overrides = sidecar.get("overrides").as_string_list();
    }

    let mut env = BTreeMap::new();
    for entry in overrides {
        match entry.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                env.insert(key.trim().to_string(), value.to_string());
            }
            _ => tracing::debug!(entry = %entry, "withEnv entry without '=' ignored"),
        }
    }
    env
}

/// `withCredentials([...])`: every variable a binding declares resolves to a
/// pipeline variable of the same name.
fn credential_variables(node: &SpanNode) -> BTreeMap<String, String> {
    let sidecar = node.sidecar();
    let mut bindings = node.param("bindings");
    if bindings.is_absent() {
        bindings = sidecar.get("bindings");
    }

    let objects: Vec<_> = match bindings.as_map() {
        Some(single) => vec![single],
        None => bindings
            .as_list()
            .iter()
            .filter_map(|b| b.as_object())
            .collect(),
    };

    let mut env = BTreeMap::new();
    for binding in objects {
        for key in CREDENTIAL_VARIABLE_KEYS {
            if let Some(var) = binding.get(key).and_then(|v| v.as_str()) {
                let var = var.trim();
                if !var.is_empty() {
                    env.insert(var.to_string(), format!("<+pipeline.variables.{}>", var));
                }
            }
        }
    }
    env
}

/// `withDockerContainer(image: ..., args: ...)`. The registry connector of
/// an enclosing `withDockerRegistry` is kept.
fn docker_container(node: &SpanNode, parent: &Container) -> Container {
    let sidecar = node.sidecar();
    let image = node
        .param("image")
        .as_text()
        .or_else(|| sidecar.get("image").as_text());
    if image.is_none() {
        tracing::warn!(span = %node.span_id, "withDockerContainer without an image");
    }
    let args = node
        .param("args")
        .as_text()
        .or_else(|| sidecar.get("args").as_text())
        .unwrap_or_default();

    let mut container = parse_docker_args(&args);
    container.image = image.or_else(|| parent.image.clone());
    container.connector = parent.connector.clone();
    container
}

/// Split `docker run` style arguments into the flags the step schema
/// models directly and the remaining pass-through args. Splitting is on
/// whitespace; quoted arguments are not reassembled.
pub fn parse_docker_args(args: &str) -> Container {
    let mut container = Container::default();
    let mut tokens = args.split_whitespace();

    while let Some(token) = tokens.next() {
        let (flag, inline) = match token.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag, Some(value.to_string())),
            _ => (token, None),
        };
        match flag {
            "--privileged" => {
                container.privileged = inline.as_deref().map(|v| v != "false").unwrap_or(true);
            }
            "--network" | "--net" => {
                container.network = inline.or_else(|| tokens.next().map(str::to_string));
            }
            "--entrypoint" => {
                container.entrypoint = inline.or_else(|| tokens.next().map(str::to_string));
            }
            _ => container.args.push(token.to_string()),
        }
    }
    container
}

/// `timeout(time: 5, unit: 'MINUTES')`.
fn timeout_of(node: &SpanNode) -> Option<String> {
    let sidecar = node.sidecar();
    let time = node
        .param("time")
        .as_f64()
        .or_else(|| sidecar.get("time").as_f64())?;
    let unit = node
        .param("unit")
        .as_text()
        .or_else(|| sidecar.get("unit").as_text())
        .unwrap_or_else(|| "MINUTES".to_string());
    format_timeout(time, &unit)
}

/// Render a Jenkins time + `TimeUnit` as a duration string such as `10m`.
pub fn format_timeout(time: f64, unit: &str) -> Option<String> {
    if !time.is_finite() || time <= 0.0 {
        return None;
    }
    let (value, suffix) = match unit.trim().to_ascii_uppercase().as_str() {
        "NANOSECONDS" => (time / 1_000_000.0, "ms"),
        "MICROSECONDS" => (time / 1_000.0, "ms"),
        "MILLISECONDS" => (time, "ms"),
        "SECONDS" => (time, "s"),
        "HOURS" => (time, "h"),
        "DAYS" => (time, "d"),
        _ => (time, "m"),
    };
    Some(format!("{}{}", value.ceil() as u64, suffix))
}

// =============================================================================
// CONVERSION STATE
// =============================================================================

/// Mutable state for one conversion. Never shared between conversions.
#[derive(Debug, Default)]
pub struct ConversionState {
    processed_tools: BTreeSet<Tool>,
    detected_tools: BTreeMap<Tool, DetectedTool>,
    diagnostics: Vec<Diagnostic>,
}

impl ConversionState {
    pub fn is_tool_processed(&self, tool: Tool) -> bool {
        self.processed_tools.contains(&tool)
    }

    pub fn mark_tool_processed(&mut self, tool: Tool) {
        self.processed_tools.insert(tool);
    }

    /// Record a detected tool; the first detection of each tool wins.
    pub fn detect_tool(&mut self, detected: DetectedTool) {
        self.detected_tools.entry(detected.tool).or_insert(detected);
    }

    pub fn detected_tool(&self, tool: Tool) -> Option<&DetectedTool> {
        self.detected_tools.get(&tool)
    }

    pub fn warn(&mut self, code: &'static str, message: impl Into<String>, node: &SpanNode) {
        let message = message.into();
        tracing::warn!(code, span = %node.span_id, "{}", message);
        self.diagnostics.push(Diagnostic {
            code,
            message,
            span_id: (!node.span_id.is_empty()).then(|| node.span_id.clone()),
        });
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(value: serde_json::Value) -> SpanNode {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn env_delta_does_not_touch_parent() {
        let parent = StepContext::default().with_env(BTreeMap::from([("A".into(), "1".into())]));
        let wrapper = node(json!({
            "stepType": "withEnv",
            "parameterMap": { "overrides": ["B=2", "A=3", "broken"] }
        }));
        let child = scoped(Scope::Env, &wrapper, &parent);
        assert_eq!(child.environment.get("A").map(String::as_str), Some("3"));
        assert_eq!(child.environment.get("B").map(String::as_str), Some("2"));
        assert_eq!(parent.environment.get("A").map(String::as_str), Some("1"));
        assert!(!parent.environment.contains_key("B"));
    }

    #[test]
    fn credentials_bind_pipeline_variables() {
        let wrapper = node(json!({
            "stepType": "withCredentials",
            "parameterMap": { "bindings": [
                { "$class": "UsernamePasswordMultiBinding", "credentialsId": "c1",
                  "usernameVariable": "U", "passwordVariable": "P" }
            ]}
        }));
        let child = scoped(Scope::Credentials, &wrapper, &StepContext::default());
        assert_eq!(
            child.environment,
            BTreeMap::from([
                ("P".to_string(), "<+pipeline.variables.P>".to_string()),
                ("U".to_string(), "<+pipeline.variables.U>".to_string()),
            ])
        );
    }

    #[test]
    fn credentials_fall_back_to_sidecar() {
        let wrapper = node(json!({
            "stepType": "withCredentials",
            "attributes": {
                "harness-attribute": "{\"bindings\":[{\"variable\":\"TOKEN\"}]}"
            }
        }));
        let child = scoped(Scope::Credentials, &wrapper, &StepContext::default());
        assert_eq!(
            child.environment.get("TOKEN").map(String::as_str),
            Some("<+pipeline.variables.TOKEN>")
        );
    }

    #[test]
    fn docker_args_are_split_into_fields() {
        let c = parse_docker_args("-v /tmp:/tmp --privileged --network=host --entrypoint '' -u root");
        assert!(c.privileged);
        assert_eq!(c.network.as_deref(), Some("host"));
        assert_eq!(c.entrypoint.as_deref(), Some("''"));
        assert_eq!(c.args, vec!["-v", "/tmp:/tmp", "-u", "root"]);
    }

    #[test]
    fn docker_container_keeps_registry_connector() {
        let parent = Container {
            connector: Some("dockerhub".into()),
            ..Default::default()
        };
        let wrapper = node(json!({
            "stepType": "withDockerContainer",
            "parameterMap": { "image": "maven:3.9", "args": "--net bridge" }
        }));
        let ctx = StepContext {
            container: parent,
            ..Default::default()
        };
        let child = scoped(Scope::DockerContainer, &wrapper, &ctx);
        assert_eq!(child.container.image.as_deref(), Some("maven:3.9"));
        assert_eq!(child.container.connector.as_deref(), Some("dockerhub"));
        assert_eq!(child.container.network.as_deref(), Some("bridge"));
    }

    #[test]
    fn timeouts_render_with_unit_suffix() {
        assert_eq!(format_timeout(10.0, "MINUTES").as_deref(), Some("10m"));
        assert_eq!(format_timeout(30.0, "seconds").as_deref(), Some("30s"));
        assert_eq!(format_timeout(2.0, "HOURS").as_deref(), Some("2h"));
        assert_eq!(format_timeout(1500.0, "MICROSECONDS").as_deref(), Some("2ms"));
        assert_eq!(format_timeout(5.0, "whatever").as_deref(), Some("5m"));
        assert_eq!(format_timeout(0.0, "MINUTES"), None);
    }

    #[test]
    fn timeout_scope_without_time_keeps_parent() {
        let parent = StepContext::default().with_timeout(Some("5m".into()));
        let wrapper = node(json!({ "stepType": "timeout", "parameterMap": { "unit": "HOURS" } }));
        assert_eq!(scoped(Scope::Timeout, &wrapper, &parent).timeout.as_deref(), Some("5m"));
    }
}
