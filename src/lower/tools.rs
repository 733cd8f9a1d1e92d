//! Build-tool detection and tool-wrapper step synthesis.
//!
//! A tool wrapper (`withMaven`, `withGradle`, ...) stays pending while its
//! subtree is walked. The first shell step beneath it whose script invokes
//! the tool is split: the invocation becomes a plugin step and the rest of
//! the script is kept as script steps around it. Each tool is synthesized
//! at most once per conversion.

use serde_json::Value;

use crate::ir::{OrderedStep, PluginSpec, Step, StepSpec};
use crate::parse::{Param, SpanNode};

use super::context::{ConversionState, StepContext};
use super::sanitize::{sanitize_id, sanitize_name};

/// Tokens that end one command and start the next on a script line.
const SEQUENCE_SEPARATORS: [&str; 2] = ["&&", ";"];
/// Tokens that tie a command to its neighbours; such a command is not split out.
const PIPE_OPERATORS: [&str; 3] = ["|", "||", "&"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tool {
    Maven,
    Gradle,
    Ant,
    SonarScanner,
    NodeJs,
}

impl Tool {
    /// Identify a tool from a free-form name such as `maven-3.9` or `NodeJS 20`.
    pub fn from_name(name: &str) -> Option<Tool> {
        let lower = name.trim().to_ascii_lowercase();
        if lower.contains("maven") || lower.starts_with("mvn") {
            Some(Tool::Maven)
        } else if lower.contains("gradle") {
            Some(Tool::Gradle)
        } else if lower.contains("sonar") {
            Some(Tool::SonarScanner)
        } else if lower.contains("node") {
            Some(Tool::NodeJs)
        } else if lower.starts_with("ant")
            || lower.split(|c: char| !c.is_ascii_alphanumeric()).any(|w| w == "ant")
        {
            Some(Tool::Ant)
        } else {
            None
        }
    }

    /// Identify the tool behind a generic `wrap` step from its delegate class.
    pub fn from_wrapper_class(class: &str) -> Option<Tool> {
        if class.contains("Sonar") {
            Some(Tool::SonarScanner)
        } else if class.contains("NodeJS") || class.contains("Nodejs") {
            Some(Tool::NodeJs)
        } else if class.contains("Ant") {
            Some(Tool::Ant)
        } else {
            None
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tool::Maven => "Maven",
            Tool::Gradle => "Gradle",
            Tool::Ant => "Ant",
            Tool::SonarScanner => "SonarQube Scan",
            Tool::NodeJs => "Node.js",
        }
    }

    pub fn plugin_image(&self) -> &'static str {
        match self {
            Tool::Maven => "plugins/maven",
            Tool::Gradle => "plugins/gradle",
            Tool::Ant => "plugins/ant",
            Tool::SonarScanner => "plugins/sonarqube-scanner",
            Tool::NodeJs => "plugins/node",
        }
    }

    /// The `with` key holding the arguments given to the tool command.
    fn arguments_key(&self) -> &'static str {
        match self {
            Tool::Maven => "goals",
            Tool::Gradle => "tasks",
            Tool::Ant => "targets",
            Tool::SonarScanner => "args",
            Tool::NodeJs => "command",
        }
    }

    fn commands(&self) -> &'static [&'static str] {
        match self {
            Tool::Maven => &["mvn", "mvnw", "mvn.cmd"],
            Tool::Gradle => &["gradle", "gradlew", "gradlew.bat"],
            Tool::Ant => &["ant"],
            Tool::SonarScanner => &["sonar-scanner", "sonar-scanner.bat"],
            Tool::NodeJs => &["npm", "npx", "yarn", "pnpm", "node"],
        }
    }

    /// Wrapper parameters naming the tool installation to use.
    fn installation_keys(&self) -> &'static [&'static str] {
        match self {
            Tool::Maven => &["maven", "mavenInstallation"],
            Tool::Gradle => &["gradle", "gradleInstallation"],
            Tool::Ant => &["installation", "antInstallation"],
            Tool::SonarScanner => &["installationName", "credentialsId"],
            Tool::NodeJs => &["nodeJSInstallationName", "installationName"],
        }
    }

    fn is_command(&self, token: &str) -> bool {
        let base = token.rsplit(['/', '\\']).next().unwrap_or(token);
        self.commands().contains(&base)
    }

    /// Split `script` around its first command invoking the tool.
    ///
    /// Only a command starting a line, or following `&&` or `;`, counts. A
    /// command joined by a pipe or run in the background is left in the
    /// script. A Maven `sonar:sonar` goal also counts as a SonarQube
    /// invocation, with the whole Maven command as its arguments.
    pub fn match_script(&self, script: &str) -> Option<ToolInvocation> {
        let lines: Vec<&str> = script.lines().collect();
        for (index, line) in lines.iter().enumerate() {
            let tokens = tokenize(line);
            for (start, end) in segments(&tokens) {
                let command = &tokens[start..end];
                if command.iter().any(|t| PIPE_OPERATORS.contains(&t.as_str())) {
                    continue;
                }
                let Some(arguments) = self.arguments(command) else {
                    continue;
                };

                // The separator before `start` and after `end` is dropped.
                let mut before: Vec<String> = lines[..index].iter().map(|l| l.to_string()).collect();
                if start > 1 {
                    before.push(tokens[..start - 1].join(" "));
                }
                let mut after = Vec::new();
                if end + 1 < tokens.len() {
                    after.push(tokens[end + 1..].join(" "));
                }
                after.extend(lines[index + 1..].iter().map(|l| l.to_string()));

                return Some(ToolInvocation {
                    before: join_lines(before),
                    arguments,
                    after: join_lines(after),
                });
            }
        }
        None
    }

    fn arguments(&self, command: &[String]) -> Option<String> {
        let first = command.first()?;
        if self.is_command(first) {
            return Some(command[1..].join(" "));
        }
        if *self == Tool::SonarScanner
            && Tool::Maven.is_command(first)
            && command.iter().any(|t| t.starts_with("sonar:"))
        {
            return Some(command.join(" "));
        }
        None
    }
}

/// One tool command found in a shell script, with the script text around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub before: String,
    pub arguments: String,
    pub after: String,
}

/// Whitespace tokens, with a trailing `;` split into its own token.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for token in line.split_whitespace() {
        match token.strip_suffix(';') {
            Some(rest) if !rest.is_empty() => {
                tokens.push(rest.to_string());
                tokens.push(";".to_string());
            }
            _ => tokens.push(token.to_string()),
        }
    }
    tokens
}

/// `(start, end)` token ranges of the commands on a line, split on `&&` and `;`.
fn segments(tokens: &[String]) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        if SEQUENCE_SEPARATORS.contains(&token.as_str()) {
            ranges.push((start, i));
            start = i + 1;
        }
    }
    ranges.push((start, tokens.len()));
    ranges.retain(|(start, end)| start < end);
    ranges
}

fn join_lines(lines: Vec<String>) -> String {
    let text = lines.join("\n");
    if text.trim().is_empty() { String::new() } else { text }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A tool declared in a trace, with whatever version details it carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedTool {
    pub tool: Tool,
    pub name: Option<String>,
    pub version: Option<String>,
}

// =============================================================================
// DETECTION
// =============================================================================

/// Record any tool declaration carried by `node`: a `tool` key anywhere in
/// its sidecar, or the parameters of a `tool` step.
pub fn detect(node: &SpanNode, state: &mut ConversionState) {
    let sidecar = node.sidecar();
    for detected in declarations(sidecar.root().find("tool")) {
        tracing::debug!(tool = %detected.tool, span = %node.span_id, "tool detected in sidecar");
        state.detect_tool(detected);
    }
    if node.step_type() == "tool" {
        for detected in declarations(node.params()) {
            tracing::debug!(tool = %detected.tool, span = %node.span_id, "tool step detected");
            state.detect_tool(detected);
        }
    }
}

fn declarations(value: Param<'_>) -> Vec<DetectedTool> {
    if let Some(name) = value.as_text() {
        return Tool::from_name(&name)
            .map(|tool| DetectedTool {
                tool,
                name: Some(name),
                version: None,
            })
            .into_iter()
            .collect();
    }
    if value.as_map().is_some() {
        let name = value.get("name").as_text();
        let tool = value
            .get("type")
            .as_text()
            .and_then(|t| Tool::from_name(&t))
            .or_else(|| name.as_deref().and_then(Tool::from_name));
        return tool
            .map(|tool| DetectedTool {
                tool,
                name,
                version: value.get("version").as_text(),
            })
            .into_iter()
            .collect();
    }
    value
        .as_list()
        .iter()
        .flat_map(|item| declarations(Param::new(Some(item))))
        .collect()
}

/// The tool behind a generic `wrap` step, if any.
pub fn wrapped_tool(node: &SpanNode) -> Option<Tool> {
    ["$class", "delegate", "symbol"]
        .into_iter()
        .filter_map(|key| node.params().find(key).as_text())
        .find_map(|class| Tool::from_wrapper_class(&class))
}

// =============================================================================
// SYNTHESIS
// =============================================================================

/// A tool wrapper whose subtree is being walked and whose tool has not been
/// synthesized yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTool {
    pub tool: Tool,
    /// Installation named by the wrapper's own parameters.
    pub installation: Option<String>,
}

impl PendingTool {
    pub fn new(tool: Tool, wrapper: &SpanNode) -> Self {
        let installation = tool
            .installation_keys()
            .iter()
            .find_map(|key| wrapper.param(key).as_text());
        PendingTool { tool, installation }
    }
}

/// Build the plugin step replacing `shell`'s tool invocation. The step
/// takes the shell span's order id and identity.
pub fn synthesize(
    pending: &PendingTool,
    shell: &SpanNode,
    arguments: String,
    ctx: &StepContext,
    detected: Option<&DetectedTool>,
) -> OrderedStep {
    let tool = pending.tool;
    let installation = pending
        .installation
        .clone()
        .or_else(|| detected.and_then(|d| d.name.clone()));

    let mut plugin = PluginSpec::new(tool.plugin_image())
        .with(tool.arguments_key(), arguments)
        .with_opt("installation", installation)
        .with_opt("version", detected.and_then(|d| d.version.clone()));
    plugin.connector = ctx.container.connector.clone();
    plugin.envs = ctx.environment.clone();
    if let Some(image) = &ctx.container.image {
        plugin = plugin.with("container_image", Value::String(image.clone()));
    }

    let step = Step {
        id: sanitize_id(tool.label(), &shell.span_id),
        name: sanitize_name(tool.label()),
        spec: StepSpec::Plugin(plugin),
        timeout: ctx.timeout.clone(),
    };
    OrderedStep::new(shell.order_id(), step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(value: serde_json::Value) -> SpanNode {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn names_map_to_tools() {
        assert_eq!(Tool::from_name("apache-maven-3.9"), Some(Tool::Maven));
        assert_eq!(Tool::from_name("Gradle 8"), Some(Tool::Gradle));
        assert_eq!(Tool::from_name("NodeJS 20"), Some(Tool::NodeJs));
        assert_eq!(Tool::from_name("ant-1.10"), Some(Tool::Ant));
        assert_eq!(Tool::from_name("SonarQube Scanner"), Some(Tool::SonarScanner));
        assert_eq!(Tool::from_name("giant"), None);
        assert_eq!(Tool::from_name("jdk17"), None);
    }

    fn invocation(before: &str, arguments: &str, after: &str) -> ToolInvocation {
        ToolInvocation {
            before: before.into(),
            arguments: arguments.into(),
            after: after.into(),
        }
    }

    #[test]
    fn script_match_keeps_surrounding_lines() {
        let script = "set -e\n./mvnw -B clean package\nmvn deploy";
        assert_eq!(
            Tool::Maven.match_script(script),
            Some(invocation("set -e", "-B clean package", "mvn deploy"))
        );
        assert_eq!(Tool::Gradle.match_script(script), None);
        assert_eq!(Tool::NodeJs.match_script("npm ci"), Some(invocation("", "ci", "")));
    }

    #[test]
    fn script_match_splits_sequenced_commands() {
        assert_eq!(
            Tool::Maven.match_script("mvn clean && mvn deploy"),
            Some(invocation("", "clean", "mvn deploy"))
        );
        assert_eq!(
            Tool::Maven.match_script("cd app; mvn package; cp target/app.jar /out"),
            Some(invocation("cd app", "package", "cp target/app.jar /out"))
        );
    }

    #[test]
    fn piped_or_prefixed_commands_are_not_split() {
        assert_eq!(Tool::Maven.match_script("mvn test | tee build.log"), None);
        assert_eq!(Tool::Maven.match_script("MAVEN_OPTS=-Xmx1g mvn test"), None);
        assert_eq!(
            Tool::Maven.match_script("mvn test | tee build.log\nmvn verify"),
            Some(invocation("mvn test | tee build.log", "verify", ""))
        );
    }

    #[test]
    fn maven_sonar_goal_counts_as_scan() {
        assert_eq!(
            Tool::SonarScanner.match_script("mvn sonar:sonar -Dx=1"),
            Some(invocation("", "mvn sonar:sonar -Dx=1", ""))
        );
    }

    #[test]
    fn detection_reads_sidecar_tool_objects_and_strings() {
        let mut state = ConversionState::default();
        let with_object = node(json!({
            "stepType": "sh",
            "attributes": { "harness-attribute":
                "{\"env\":{\"tool\":{\"type\":\"maven\",\"name\":\"M3\",\"version\":\"3.9.6\"}}}" }
        }));
        detect(&with_object, &mut state);
        let maven = state.detected_tool(Tool::Maven).unwrap();
        assert_eq!(maven.name.as_deref(), Some("M3"));
        assert_eq!(maven.version.as_deref(), Some("3.9.6"));

        let with_string = node(json!({
            "stepType": "sh",
            "attributes": { "harness-attribute": "{\"tool\":\"gradle-8.5\"}" }
        }));
        detect(&with_string, &mut state);
        assert!(state.detected_tool(Tool::Gradle).is_some());
    }

    #[test]
    fn tool_step_parameters_are_detected() {
        let mut state = ConversionState::default();
        let decl = node(json!({
            "stepType": "tool",
            "attributes": { "step.id": "3" },
            "parameterMap": { "name": "node-20", "type": "nodejs" }
        }));
        detect(&decl, &mut state);
        assert_eq!(
            state.detected_tool(Tool::NodeJs).and_then(|d| d.name.as_deref()),
            Some("node-20")
        );
    }

    #[test]
    fn wrap_delegate_class_selects_tool() {
        let wrap = node(json!({
            "stepType": "wrap",
            "parameterMap": { "delegate": { "$class": "SonarBuildWrapper" } }
        }));
        assert_eq!(wrapped_tool(&wrap), Some(Tool::SonarScanner));

        let plain = node(json!({
            "stepType": "wrap",
            "parameterMap": { "delegate": { "$class": "TimestamperBuildWrapper" } }
        }));
        assert_eq!(wrapped_tool(&plain), None);
    }

    #[test]
    fn pending_tool_reads_wrapper_installation() {
        let wrapper = node(json!({
            "stepType": "withGradle",
            "parameterMap": { "gradleInstallation": "G8" }
        }));
        let pending = PendingTool::new(Tool::Gradle, &wrapper);
        assert_eq!(pending.installation.as_deref(), Some("G8"));
        assert_eq!(PendingTool::new(Tool::Maven, &wrapper).installation, None);
    }

    #[test]
    fn synthesized_step_uses_shell_identity() {
        let wrapper = node(json!({
            "stepType": "withMaven",
            "parameterMap": { "maven": "M3" },
            "children": [{
                "stepType": "sh", "spanId": "abcdef12",
                "attributes": { "step.id": "7" },
                "parameterMap": { "script": "mvn -B package" }
            }]
        }));
        let shell = &wrapper.children[0];
        let detected = DetectedTool {
            tool: Tool::Maven,
            name: None,
            version: Some("3.9.6".into()),
        };
        let ordered = synthesize(
            &PendingTool::new(Tool::Maven, &wrapper),
            shell,
            "-B package".into(),
            &StepContext::default(),
            Some(&detected),
        );
        assert_eq!(ordered.order, 7);
        assert_eq!(ordered.step.id, "Mavenabcdef");
        let StepSpec::Plugin(plugin) = &ordered.step.spec else {
            panic!("expected plugin step");
        };
        assert_eq!(plugin.image, "plugins/maven");
        assert_eq!(plugin.settings["goals"], json!("-B package"));
        assert_eq!(plugin.settings["installation"], json!("M3"));
        assert_eq!(plugin.settings["version"], json!("3.9.6"));
    }
}
