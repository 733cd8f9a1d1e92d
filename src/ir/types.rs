//! Output model: the unified pipeline document.
//!
//! The walker produces `Step`s bottom-up; the assembler wraps them into a
//! single CI stage inside a `Pipeline`. Field names and the `type`/`spec`
//! layout follow the target YAML schema, so these types serialize directly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// TOP-LEVEL DOCUMENT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub version: u32,
    pub kind: String,
    pub name: String,
    pub spec: PipelineSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub stages: Vec<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<Repository>,
}

/// The repository the trace checked out, when a checkout step was seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector: Option<String>,
}

// =============================================================================
// STAGE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub stage_type: String,
    pub spec: StageSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone: Option<CloneSpec>,
    pub steps: Vec<Step>,
}

/// Stage-level clone behaviour. Checkout spans become explicit clone steps,
/// so the implicit clone is disabled whenever one was converted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneSpec {
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
}

// =============================================================================
// STEPS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub spec: StepSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

/// Step payload, serialized as `type: <variant>` plus `spec: {...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "spec", rename_all = "lowercase")]
pub enum StepSpec {
    Script(ScriptSpec),
    Plugin(PluginSpec),
    Group(StepList),
    Parallel(StepList),
    Background(ScriptSpec),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepType {
    Script,
    Plugin,
    Group,
    Parallel,
    Background,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Script => "script",
            StepType::Plugin => "plugin",
            StepType::Group => "group",
            StepType::Parallel => "parallel",
            StepType::Background => "background",
        }
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Step {
    pub fn step_type(&self) -> StepType {
        match &self.spec {
            StepSpec::Script(_) => StepType::Script,
            StepSpec::Plugin(_) => StepType::Plugin,
            StepSpec::Group(_) => StepType::Group,
            StepSpec::Parallel(_) => StepType::Parallel,
            StepSpec::Background(_) => StepType::Background,
        }
    }

    pub fn as_script(&self) -> Option<&ScriptSpec> {
        match &self.spec {
            StepSpec::Script(script) => Some(script),
            _ => None,
        }
    }

    /// Nested steps of a group or parallel step.
    pub fn children(&self) -> &[Step] {
        match &self.spec {
            StepSpec::Group(list) | StepSpec::Parallel(list) => &list.steps,
            _ => &[],
        }
    }
}

/// Shell command execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<Shell>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub envs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub privileged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    pub run: String,
}

impl ScriptSpec {
    /// Two scripts can share one step when everything but the body matches.
    pub fn same_runtime(&self, other: &ScriptSpec) -> bool {
        self.image == other.image
            && self.connector == other.connector
            && self.shell == other.shell
            && self.envs == other.envs
            && self.entrypoint == other.entrypoint
            && self.args == other.args
            && self.privileged == other.privileged
            && self.network == other.network
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shell {
    Sh,
    Bash,
    Powershell,
    Pwsh,
    Python,
}

/// A containerized plugin invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginSpec {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector: Option<String>,
    #[serde(default, rename = "with", skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub envs: BTreeMap<String, String>,
}

impl PluginSpec {
    pub fn new(image: impl Into<String>) -> Self {
        PluginSpec {
            image: image.into(),
            ..Default::default()
        }
    }

    /// Add a `with` entry; blank strings and nulls are skipped.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        let keep = match &value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            Value::Array(items) => !items.is_empty(),
            _ => true,
        };
        if keep {
            self.settings.insert(key.to_string(), value);
        }
        self
    }

    /// Add a `with` entry only when a value is present.
    pub fn with_opt<V: Into<Value>>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with(key, v),
            None => self,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepList {
    pub steps: Vec<Step>,
}

// =============================================================================
// ORDERING
// =============================================================================

/// A step paired with the order id recovered from the span that produced it.
/// Lives only inside one recursion level's buffer; discarded after sorting.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedStep {
    pub order: i64,
    pub step: Step,
}

impl OrderedStep {
    pub fn new(order: i64, step: Step) -> Self {
        OrderedStep { order, step }
    }
}
