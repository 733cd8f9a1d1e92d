//! Rust types for the Jenkins trace export.
//!
//! One `SpanNode` per captured step invocation. Everything is optional on the
//! wire: a `null` or missing key reads as the empty value, so a single odd
//! span never aborts a whole conversion.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::params::{Param, Sidecar};

/// Attribute carrying the JSON-encoded parameter sidecar.
pub const HARNESS_ATTRIBUTE: &str = "harness-attribute";
/// Attribute keys holding the numeric order id, in lookup order.
pub const STEP_ID_KEYS: [&str; 2] = ["step.id", "jenkins.pipeline.step.id"];
/// Attribute holding the step type when `stepType` is not set on the span.
pub const STEP_TYPE_KEY: &str = "jenkins.pipeline.step.type";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanNode {
    #[serde(default, deserialize_with = "null_as_default")]
    pub step_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub span_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub trace_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parent_span_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parent: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub span_name: String,
    #[serde(default, alias = "attributesMap", deserialize_with = "lenient_string_map")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parameter_map: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub children: Vec<SpanNode>,
}

impl SpanNode {
    /// The step-type discriminator. Open-ended; unknown values are legal.
    pub fn step_type(&self) -> &str {
        if !self.step_type.is_empty() {
            return &self.step_type;
        }
        self.attributes
            .get(STEP_TYPE_KEY)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Label used for generated ids and display names.
    pub fn label(&self) -> &str {
        [self.name.as_str(), self.span_name.as_str(), self.step_type()]
            .into_iter()
            .find(|s| !s.trim().is_empty())
            .unwrap_or("")
    }

    /// A node without attributes only groups its children.
    pub fn is_structural(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn param(&self, key: &str) -> Param<'_> {
        Param::new(self.parameter_map.get(key))
    }

    /// The whole parameter map as a value, for converters that search it.
    pub fn params(&self) -> Param<'_> {
        Param::object(&self.parameter_map)
    }

    pub fn sidecar(&self) -> Sidecar {
        Sidecar::read(self.attributes.get(HARNESS_ATTRIBUTE).map(String::as_str))
    }

    /// Raw order id attribute, if the span carries one at all.
    pub fn raw_step_id(&self) -> Option<&str> {
        STEP_ID_KEYS
            .iter()
            .find_map(|key| self.attributes.get(*key))
            .map(String::as_str)
    }

    /// The order id stored directly on this span.
    pub fn direct_order_id(&self) -> Option<i64> {
        self.raw_step_id().and_then(|raw| raw.trim().parse().ok())
    }

    /// Whether `other` marks the same named stage or parallel branch as `self`.
    fn is_marker_for(&self, other: &SpanNode) -> bool {
        if self.name.is_empty() {
            return false;
        }
        let stage_span = format!("Stage: {}", self.name);
        let branch_span = format!("Parallel branch: {}", self.name);
        other.span_name == stage_span
            || other.span_name == branch_span
            || (other.step_type() == "stage" && other.name == self.name)
    }

    /// Recover the order id used to sort this node among its siblings.
    ///
    /// Stage-like nodes without a direct id search their descendants
    /// depth-first for a marker span with the same name; the first match wins
    /// even if duplicate stage names exist deeper in the tree. Nodes with no
    /// recoverable id order as `0`.
    pub fn order_id(&self) -> i64 {
        if let Some(id) = self.direct_order_id() {
            return id;
        }
        if matches!(self.step_type(), "stage" | "parallel") {
            if let Some(id) = self.find_marker_id(self) {
                return id;
            }
        }
        0
    }

    fn find_marker_id(&self, group: &SpanNode) -> Option<i64> {
        for child in &self.children {
            if group.is_marker_for(child) {
                if let Some(id) = child.direct_order_id() {
                    return Some(id);
                }
            }
            if let Some(id) = child.find_marker_id(group) {
                return Some(id);
            }
        }
        None
    }

    /// Pre-order iterator over this node's descendants (excluding itself).
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a SpanNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a SpanNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Attributes are documented as string→string, but exporters occasionally
/// emit numbers or booleans. Scalars are stringified; nested values are
/// kept as their JSON text.
fn lenient_string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::Null => return None,
                Value::String(s) => s,
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                other => other.to_string(),
            };
            Some((key, text))
        })
        .collect())
}
