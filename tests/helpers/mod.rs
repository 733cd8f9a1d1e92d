#![allow(dead_code)]

use converter::ir::*;
use converter::{Conversion, ConvertOptions};
use serde_json::{Value, json};

// =============================================================================
// Span builders
// =============================================================================

/// A span with an order id and no parameters.
pub fn span(step_type: &str, span_id: &str, order: i64) -> Value {
    json!({
        "stepType": step_type,
        "name": step_type,
        "spanId": span_id,
        "attributes": { "jenkins.pipeline.step.id": order.to_string() },
    })
}

pub fn sh(span_id: &str, order: i64, script: &str) -> Value {
    let mut node = span("sh", span_id, order);
    node["name"] = json!("Shell Script");
    node["parameterMap"] = json!({ "script": script });
    node
}

pub fn echo(span_id: &str, order: i64, message: &str) -> Value {
    let mut node = span("echo", span_id, order);
    node["parameterMap"] = json!({ "message": message });
    node
}

/// A wrapper span with parameters and children.
pub fn wrapper(step_type: &str, span_id: &str, order: i64, params: Value, children: Vec<Value>) -> Value {
    let mut node = span(step_type, span_id, order);
    node["parameterMap"] = params;
    node["children"] = Value::Array(children);
    node
}

pub fn stage(name: &str, span_id: &str, order: i64, children: Vec<Value>) -> Value {
    let mut node = wrapper("stage", span_id, order, json!({}), children);
    node["name"] = json!(name);
    node["spanName"] = json!(format!("Stage: {}", name));
    node
}

pub fn branch(name: &str, span_id: &str, order: i64, children: Vec<Value>) -> Value {
    let mut node = wrapper("parallel", span_id, order, json!({}), children);
    node["name"] = json!(name);
    node["spanName"] = json!(format!("Parallel branch: {}", name));
    node
}

/// A structural root span (no attributes) named `name`.
pub fn root(name: &str, children: Vec<Value>) -> Value {
    json!({ "name": name, "spanId": "root0000", "children": children })
}

// =============================================================================
// Conversion helpers
// =============================================================================

pub fn convert(tree: &Value) -> Conversion {
    convert_with(tree, &ConvertOptions::default())
}

pub fn convert_with(tree: &Value, options: &ConvertOptions) -> Conversion {
    converter::convert(&tree.to_string(), options).expect("conversion succeeds")
}

pub fn steps(conversion: &Conversion) -> &[Step] {
    &conversion.pipeline.spec.stages[0].spec.steps
}

pub fn script(step: &Step) -> &ScriptSpec {
    step.as_script()
        .unwrap_or_else(|| panic!("step '{}' is {}, not script", step.id, step.step_type()))
}

pub fn plugin(step: &Step) -> &PluginSpec {
    match &step.spec {
        StepSpec::Plugin(p) => p,
        _ => panic!("step '{}' is {}, not plugin", step.id, step.step_type()),
    }
}

pub fn diagnostic_codes(conversion: &Conversion) -> Vec<&'static str> {
    conversion.diagnostics.iter().map(|d| d.code).collect()
}
