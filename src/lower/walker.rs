//! Recursive span-tree walk.
//!
//! Every level of the recursion collects `OrderedStep`s for its subtree and
//! returns them unsorted; the caller decides where the buffer is finalized.
//! Stage-level parallel branches are finalized individually before being
//! wrapped, and the root buffer is finalized by `lower`.
//!
//! SYNC NOTE: when a step type is added to `Registry::builtin`, check that
//! `classify` does not already route it elsewhere.

use crate::ir::{CloneSpec, OrderedStep, Repository, ScriptSpec, Shell, Step, StepList, StepSpec};
use crate::parse::{Sidecar, SpanNode};
use crate::steps::{ConvertFn, Converter, Registry, scm, script};

use super::context::{ConversionState, Scope, StepContext, parse_docker_args, scoped};
use super::merge;
use super::sanitize::{sanitize_id, sanitize_name};
use super::tools::{self, PendingTool, Tool};

/// Everything a subtree contributes: its steps, plus the clone settings and
/// repository of the first checkout inside it.
#[derive(Debug, Default)]
pub struct WalkResult {
    pub entries: Vec<OrderedStep>,
    pub clone: Option<CloneSpec>,
    pub repository: Option<Repository>,
}

impl WalkResult {
    fn push(&mut self, order: i64, step: Step) {
        self.entries.push(OrderedStep::new(order, step));
    }

    /// Append a child's result. Side-channel values already set are kept.
    fn absorb(&mut self, child: WalkResult) {
        self.entries.extend(child.entries);
        self.absorb_side_channels(child.clone, child.repository);
    }

    fn absorb_side_channels(&mut self, clone: Option<CloneSpec>, repository: Option<Repository>) {
        if self.clone.is_none() {
            self.clone = clone;
        }
        if self.repository.is_none() {
            self.repository = repository;
        }
    }
}

/// How a span is handled, decided from its step type alone.
#[derive(Debug, Clone, Copy)]
pub enum Dispatch {
    /// Groups children without producing a step.
    Passthrough,
    /// Changes the context for the subtree.
    Scope(Scope),
    Stage,
    ToolWrapper(Tool),
    /// Generic `wrap`; a tool wrapper only for some delegate classes.
    Wrap,
    ToolDeclaration,
    /// `withRun`: a background service for the rest of the subtree.
    Background,
    Checkout(Converter),
    Convert(Converter),
    Unknown,
}

pub fn classify(step_type: &str, registry: &Registry) -> Dispatch {
    match step_type {
        "" | "node" | "parallel" | "script" | "ws" | "dir" | "ansiColor" | "catchError"
        | "warnError" | "retry" | "timestamps" | "lock" | "container" | "withContext" => {
            Dispatch::Passthrough
        }
        "withEnv" => Dispatch::Scope(Scope::Env),
        "withCredentials" => Dispatch::Scope(Scope::Credentials),
        "withDockerContainer" => Dispatch::Scope(Scope::DockerContainer),
        "withDockerRegistry" => Dispatch::Scope(Scope::DockerRegistry),
        "timeout" => Dispatch::Scope(Scope::Timeout),
        "stage" => Dispatch::Stage,
        "withMaven" => Dispatch::ToolWrapper(Tool::Maven),
        "withGradle" => Dispatch::ToolWrapper(Tool::Gradle),
        "withAnt" => Dispatch::ToolWrapper(Tool::Ant),
        "withSonarQubeEnv" => Dispatch::ToolWrapper(Tool::SonarScanner),
        "nodejs" => Dispatch::ToolWrapper(Tool::NodeJs),
        "wrap" => Dispatch::Wrap,
        "tool" => Dispatch::ToolDeclaration,
        "withRun" => Dispatch::Background,
        other => match registry.get(other) {
            Some(converter) if matches!(other, "checkout" | "git") => Dispatch::Checkout(converter),
            Some(converter) => Dispatch::Convert(converter),
            None => Dispatch::Unknown,
        },
    }
}

/// Whether `node` is one branch of a parallel block.
fn is_parallel_marker(node: &SpanNode) -> bool {
    node.step_type() == "parallel" || node.span_name.starts_with("Parallel branch:")
}

pub struct Walker<'r> {
    registry: &'r Registry,
    merge_steps: bool,
    state: ConversionState,
    /// Tool wrappers enclosing the span being walked, innermost last.
    pending: Vec<PendingTool>,
}

impl<'r> Walker<'r> {
    pub fn new(registry: &'r Registry, merge_steps: bool) -> Self {
        Walker {
            registry,
            merge_steps,
            state: ConversionState::default(),
            pending: Vec::new(),
        }
    }

    pub fn into_state(self) -> ConversionState {
        self.state
    }

    pub fn walk(&mut self, node: &SpanNode, ctx: &StepContext) -> WalkResult {
        if node.is_structural() {
            return self.walk_children(node, ctx);
        }
        self.inspect(node);

        match classify(node.step_type(), self.registry) {
            Dispatch::Passthrough | Dispatch::ToolDeclaration => self.walk_children(node, ctx),
            Dispatch::Scope(scope) => {
                let inner = scoped(scope, node, ctx);
                self.walk_children(node, &inner)
            }
            Dispatch::Stage => self.walk_stage(node, ctx),
            Dispatch::ToolWrapper(tool) => self.walk_tool_wrapper(node, tool, ctx),
            Dispatch::Wrap => match tools::wrapped_tool(node) {
                Some(tool) => self.walk_tool_wrapper(node, tool, ctx),
                None => self.walk_children(node, ctx),
            },
            Dispatch::Background => self.walk_background(node, ctx),
            Dispatch::Checkout(converter) => {
                let mut result = self.convert_leaf(node, ctx, converter);
                if !result.entries.is_empty() {
                    result.absorb_side_channels(
                        Some(scm::clone_spec(node)),
                        scm::repository(node),
                    );
                }
                result
            }
            Dispatch::Convert(converter) => self.convert_leaf(node, ctx, converter),
            Dispatch::Unknown => {
                self.state.warn(
                    "W003",
                    format!("Unsupported step type '{}' converted to a placeholder", node.step_type()),
                    node,
                );
                let mut result = self.converted(node, ctx, self.registry.fallback());
                result.absorb(self.walk_children(node, ctx));
                result
            }
        }
    }

    fn walk_children(&mut self, node: &SpanNode, ctx: &StepContext) -> WalkResult {
        let mut result = WalkResult::default();
        for child in &node.children {
            let child_result = self.walk(child, ctx);
            result.absorb(child_result);
        }
        result
    }

    /// Per-span checks that only produce diagnostics or tool detections.
    fn inspect(&mut self, node: &SpanNode) {
        if let Sidecar::Malformed(reason) = node.sidecar() {
            self.state.warn(
                "W001",
                format!("Malformed harness-attribute on '{}' step: {}", node.step_type(), reason),
                node,
            );
        }
        if let Some(raw) = node.raw_step_id() {
            if node.direct_order_id().is_none() {
                self.state.warn(
                    "W004",
                    format!("Order id '{}' is not an integer; ordering as 0", raw),
                    node,
                );
            }
        }
        tools::detect(node, &mut self.state);
    }

    fn convert_leaf(&mut self, node: &SpanNode, ctx: &StepContext, converter: Converter) -> WalkResult {
        if converter.requires_sidecar && !node.sidecar().is_present() {
            self.state.warn(
                "W002",
                format!("'{}' step has no usable harness-attribute; skipped", node.step_type()),
                node,
            );
            return WalkResult::default();
        }
        if let Some(shell) = script::shell_kind(node.step_type()) {
            if let Some(result) = self.convert_tool_invocation(node, ctx, shell) {
                return result;
            }
        }
        self.converted(node, ctx, converter.convert)
    }

    /// Steps from one converter, or a `W005` diagnostic when it skipped the span.
    fn converted(&mut self, node: &SpanNode, ctx: &StepContext, convert: ConvertFn) -> WalkResult {
        let mut result = WalkResult::default();
        match convert(node, ctx) {
            Ok(steps) => {
                let order = node.order_id();
                for step in steps {
                    result.push(order, step);
                }
            }
            Err(skipped) => self.state.warn(
                "W005",
                format!("'{}' step has {}; skipped", node.step_type(), skipped),
                node,
            ),
        }
        result
    }

    /// Split a shell step invoking a pending tool into the tool's plugin
    /// step, with script steps for the rest of its script on either side.
    /// All of them keep the shell span's order id and context.
    fn convert_tool_invocation(
        &mut self,
        node: &SpanNode,
        ctx: &StepContext,
        shell: Shell,
    ) -> Option<WalkResult> {
        let text = script::shell_script(node)?;
        let (pending, invocation) = self
            .pending
            .iter()
            .rev()
            .filter(|p| !self.state.is_tool_processed(p.tool))
            .find_map(|p| p.tool.match_script(&text).map(|found| (p.clone(), found)))?;
        let tool = pending.tool;
        tracing::debug!(%tool, span = %node.span_id, "shell step converted to tool step");

        let mut result = WalkResult::default();
        let order = node.order_id();
        let has_before = !invocation.before.is_empty();
        if has_before {
            result.push(order, script::run(node, ctx, shell, invocation.before));
        }
        result.entries.push(tools::synthesize(
            &pending,
            node,
            invocation.arguments,
            ctx,
            self.state.detected_tool(tool),
        ));
        if !invocation.after.is_empty() {
            let mut step = script::run(node, ctx, shell, invocation.after);
            if has_before {
                let label = format!("{} after {}", node.label(), tool.label());
                step.id = sanitize_id(&label, &node.span_id);
            }
            result.push(order, step);
        }
        self.state.mark_tool_processed(tool);
        Some(result)
    }

    /// A stage with several children, some of them parallel branches,
    /// becomes one parallel step. Any other stage is flattened.
    fn walk_stage(&mut self, node: &SpanNode, ctx: &StepContext) -> WalkResult {
        let parallel = node.children.len() > 1 && node.children.iter().any(is_parallel_marker);
        if !parallel {
            return self.walk_children(node, ctx);
        }

        let mut result = WalkResult::default();
        let mut branches = Vec::new();
        for child in &node.children {
            let branch = self.walk(child, ctx);
            result.absorb_side_channels(branch.clone, branch.repository);

            let mut steps = merge::finalize(branch.entries, self.merge_steps);
            let step = match steps.len() {
                0 => continue,
                1 => steps.remove(0),
                _ => Step {
                    id: sanitize_id(child.label(), &child.span_id),
                    name: sanitize_name(child.label()),
                    spec: StepSpec::Group(StepList { steps }),
                    timeout: None,
                },
            };
            branches.push(OrderedStep::new(child.order_id(), step));
        }

        if branches.is_empty() {
            return result;
        }
        tracing::debug!(stage = node.label(), branches = branches.len(), "parallel stage");
        let step = Step {
            id: sanitize_id(node.label(), &node.span_id),
            name: sanitize_name(node.label()),
            spec: StepSpec::Parallel(StepList {
                steps: merge::sort(branches),
            }),
            timeout: ctx.timeout.clone(),
        };
        result.push(node.order_id(), step);
        result
    }

    /// The wrapper stays pending while its subtree is walked; the first
    /// shell step below it invoking the tool becomes the tool's step, in
    /// whatever branch and context that shell sits.
    fn walk_tool_wrapper(&mut self, node: &SpanNode, tool: Tool, ctx: &StepContext) -> WalkResult {
        // Declarations anywhere below the wrapper count, not only those
        // already visited.
        for descendant in node.descendants() {
            tools::detect(descendant, &mut self.state);
        }
        if self.state.is_tool_processed(tool) {
            tracing::debug!(%tool, span = %node.span_id, "tool already converted; wrapper passes through");
            return self.walk_children(node, ctx);
        }

        self.pending.push(PendingTool::new(tool, node));
        let result = self.walk_children(node, ctx);
        self.pending.pop();
        if !self.state.is_tool_processed(tool) {
            tracing::debug!(%tool, span = %node.span_id, "no tool invocation found under wrapper");
        }
        result
    }

    /// `withRun` starts a service container alongside its body.
    fn walk_background(&mut self, node: &SpanNode, ctx: &StepContext) -> WalkResult {
        let mut result = WalkResult::default();
        let sidecar = node.sidecar();
        let image = node
            .param("image")
            .as_text()
            .or_else(|| sidecar.get("image").as_text());

        let args = node.param("args").as_text().unwrap_or_default();
        let container = parse_docker_args(&args);
        let spec = ScriptSpec {
            image: image.or_else(|| ctx.container.image.clone()),
            connector: ctx.container.connector.clone(),
            envs: ctx.environment.clone(),
            entrypoint: container.entrypoint,
            args: container.args,
            privileged: container.privileged,
            network: container.network,
            run: node.param("command").as_text().unwrap_or_default(),
            ..Default::default()
        };
        let step = Step {
            id: sanitize_id(node.label(), &node.span_id),
            name: sanitize_name(node.label()),
            spec: StepSpec::Background(spec),
            timeout: None,
        };
        result.push(node.order_id(), step);
        result.absorb(self.walk_children(node, ctx));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(value: serde_json::Value) -> SpanNode {
        serde_json::from_value(value).unwrap()
    }

    fn sh(id: &str, order: i64, script: &str) -> serde_json::Value {
        json!({
            "stepType": "sh", "spanId": id, "name": "sh",
            "attributes": { "step.id": order.to_string() },
            "parameterMap": { "script": script }
        })
    }

    fn walk(root: &SpanNode) -> (WalkResult, ConversionState) {
        let registry = Registry::builtin();
        let mut walker = Walker::new(&registry, true);
        let result = walker.walk(root, &StepContext::default());
        (result, walker.into_state())
    }

    #[test]
    fn classify_routes_structural_and_registered_types() {
        let registry = Registry::builtin();
        assert!(matches!(classify("node", &registry), Dispatch::Passthrough));
        assert!(matches!(classify("withEnv", &registry), Dispatch::Scope(Scope::Env)));
        assert!(matches!(classify("git", &registry), Dispatch::Checkout(_)));
        assert!(matches!(classify("sh", &registry), Dispatch::Convert(_)));
        assert!(matches!(classify("fooBar", &registry), Dispatch::Unknown));
    }

    #[test]
    fn structural_nodes_produce_no_steps() {
        let root = node(json!({ "name": "root", "children": [sh("s1", 1, "ls")] }));
        let (result, _) = walk(&root);
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].order, 1);
    }

    #[test]
    fn unknown_type_becomes_placeholder_with_diagnostic() {
        let root = node(json!({
            "stepType": "fooBar", "spanId": "u1",
            "attributes": { "step.id": "4" },
            "children": [sh("s1", 5, "ls")]
        }));
        let (result, state) = walk(&root);
        assert_eq!(result.entries.len(), 2);
        assert!(result.entries[0].step.as_script().unwrap().run.contains("fooBar"));
        assert_eq!(state.diagnostics()[0].code, "W003");
    }

    #[test]
    fn unparsable_order_id_is_reported() {
        let root = node(json!({
            "stepType": "sh", "spanId": "x",
            "attributes": { "step.id": "abc" },
            "parameterMap": { "script": "ls" }
        }));
        let (result, state) = walk(&root);
        assert_eq!(result.entries[0].order, 0);
        assert_eq!(state.diagnostics()[0].code, "W004");
    }

    #[test]
    fn stage_without_parallel_children_flattens() {
        let root = node(json!({
            "stepType": "stage", "name": "Build", "spanId": "st",
            "attributes": { "step.id": "2" },
            "children": [sh("a", 3, "make"), sh("b", 4, "make test")]
        }));
        let (result, _) = walk(&root);
        assert_eq!(result.entries.len(), 2);
        assert!(result.entries.iter().all(|e| e.step.as_script().is_some()));
    }

    #[test]
    fn checkout_sets_repository_and_clone_once() {
        let git = |id: &str, url: &str, order: &str| {
            json!({
                "stepType": "git", "spanId": id,
                "attributes": { "step.id": order },
                "parameterMap": { "url": url }
            })
        };
        let root = node(json!({
            "children": [git("g1", "https://a/one.git", "1"), git("g2", "https://a/two.git", "2")]
        }));
        let (result, _) = walk(&root);
        assert_eq!(result.entries.len(), 2);
        assert_eq!(result.repository.unwrap().url, "https://a/one.git");
        assert!(result.clone.unwrap().disabled);
    }

    #[test]
    fn converter_skip_is_reported() {
        let root = node(json!({
            "children": [
                { "stepType": "sh", "spanId": "s0", "attributes": { "step.id": "1" }, "parameterMap": {} },
                sh("s1", 2, "ls")
            ]
        }));
        let (result, state) = walk(&root);
        assert_eq!(result.entries.len(), 1);
        assert_eq!(state.diagnostics()[0].code, "W005");
        assert_eq!(state.diagnostics()[0].message, "'sh' step has no script; skipped");
        assert_eq!(state.diagnostics()[0].span_id.as_deref(), Some("s0"));
    }

    #[test]
    fn tool_wrapper_without_invocation_leaves_shells_alone() {
        let root = node(json!({
            "stepType": "withMaven", "spanId": "m1",
            "attributes": { "step.id": "1" },
            "children": [sh("s1", 2, "make all")]
        }));
        let (result, state) = walk(&root);
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].step.as_script().unwrap().run, "make all");
        assert!(!state.is_tool_processed(Tool::Maven));
    }

    #[test]
    fn with_run_emits_background_before_body() {
        let root = node(json!({
            "stepType": "withRun", "spanId": "bg",
            "attributes": { "step.id": "1" },
            "parameterMap": { "image": "postgres:16", "args": "-e POSTGRES_PASSWORD=x" },
            "children": [sh("s", 2, "psql -c 'select 1'")]
        }));
        let (result, _) = walk(&root);
        let steps = merge::finalize(result.entries, true);
        let StepSpec::Background(bg) = &steps[0].spec else {
            panic!("expected background step");
        };
        assert_eq!(bg.image.as_deref(), Some("postgres:16"));
        assert_eq!(bg.args, vec!["-e", "POSTGRES_PASSWORD=x"]);
        assert!(steps[1].as_script().is_some());
    }
}
