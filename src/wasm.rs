//! WASM entry points for browser use.

use wasm_bindgen::prelude::*;

use crate::config::ConvertOptions;
use crate::convert::{JenkinsJsonConverter, SourceConverter};
use crate::error::{ConvertError, Diagnostic};

/// Full conversion: parse → lower → assemble → YAML.
/// `options_json` may be empty. Returns a JSON object with either `yaml`
/// and `diagnostics` (success) or `errors` (failure).
#[wasm_bindgen]
pub fn convert_pipeline(json: &str, options_json: &str) -> JsValue {
    let result = convert_pipeline_inner(json, options_json);
    serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
}

/// Names of the step types with a dedicated converter.
#[wasm_bindgen]
pub fn supported_step_types() -> JsValue {
    let types = JenkinsJsonConverter::new().registry().step_types();
    serde_wasm_bindgen::to_value(&types).unwrap_or(JsValue::NULL)
}

fn convert_pipeline_inner(json: &str, options_json: &str) -> ConvertResult {
    let options = if options_json.trim().is_empty() {
        ConvertOptions::default()
    } else {
        match ConvertOptions::from_json(options_json) {
            Ok(o) => o,
            Err(e) => return ConvertResult::errors(e),
        }
    };

    let conversion = match JenkinsJsonConverter::new().convert(json, &options) {
        Ok(c) => c,
        Err(e) => return ConvertResult::errors(e),
    };

    match crate::codegen::to_yaml(&conversion.pipeline) {
        Ok(yaml) => ConvertResult::Success {
            yaml,
            diagnostics: conversion.diagnostics.into_iter().map(DiagnosticDto::from).collect(),
        },
        Err(e) => ConvertResult::errors(e),
    }
}

// ---------------------------------------------------------------------------
// DTOs for serialization to JS
// ---------------------------------------------------------------------------

#[derive(serde::Serialize)]
struct ErrorDto {
    code: String,
    phase: String,
    message: String,
}

impl From<ConvertError> for ErrorDto {
    fn from(e: ConvertError) -> Self {
        ErrorDto {
            code: e.code,
            phase: e.phase.to_string(),
            message: e.message,
        }
    }
}

#[derive(serde::Serialize)]
struct DiagnosticDto {
    code: String,
    message: String,
    span_id: Option<String>,
}

impl From<Diagnostic> for DiagnosticDto {
    fn from(d: Diagnostic) -> Self {
        DiagnosticDto {
            code: d.code.to_string(),
            message: d.message,
            span_id: d.span_id,
        }
    }
}

#[derive(serde::Serialize)]
#[serde(tag = "status")]
enum ConvertResult {
    #[serde(rename = "success")]
    Success {
        yaml: String,
        diagnostics: Vec<DiagnosticDto>,
    },
    #[serde(rename = "errors")]
    Errors { errors: Vec<ErrorDto> },
}

impl ConvertResult {
    fn errors(e: ConvertError) -> Self {
        ConvertResult::Errors {
            errors: vec![ErrorDto::from(e)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_success_carries_yaml() {
        let json = r#"{"name":"demo","children":[{"stepType":"sh","spanId":"aa11bb22",
            "attributes":{"step.id":"1"},"parameterMap":{"script":"ls"}}]}"#;
        match convert_pipeline_inner(json, "") {
            ConvertResult::Success { yaml, diagnostics } => {
                assert!(yaml.contains("run: ls"));
                assert!(diagnostics.is_empty());
            }
            ConvertResult::Errors { .. } => panic!("expected success"),
        }
    }

    #[test]
    fn inner_reports_parse_and_option_errors() {
        let ConvertResult::Errors { errors } = convert_pipeline_inner("{", "") else {
            panic!("expected errors");
        };
        assert_eq!(errors[0].code, "P001");

        let ConvertResult::Errors { errors } = convert_pipeline_inner("{}", r#"{"mergeSteps":"yes"}"#) else {
            panic!("expected errors");
        };
        assert_eq!(errors[0].code, "P002");
    }
}
