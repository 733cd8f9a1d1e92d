//! Unified converter error type used across all phases.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Parse,
    Serialize,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Parse => write!(f, "Parse"),
            Phase::Serialize => write!(f, "Serialize"),
        }
    }
}

/// A fatal conversion error. There is no partial output once one of these
/// is returned. Lowering itself never fails; only reading the input and
/// writing the output can.
#[derive(Debug, Clone, Error)]
#[error("[{phase}:{code}] {message}")]
pub struct ConvertError {
    pub code: String,
    pub phase: Phase,
    pub message: String,
}

impl ConvertError {
    pub fn parse(code: &str, message: impl Into<String>) -> Self {
        ConvertError {
            code: code.into(),
            phase: Phase::Parse,
            message: message.into(),
        }
    }

    pub fn serialize(code: &str, message: impl Into<String>) -> Self {
        ConvertError {
            code: code.into(),
            phase: Phase::Serialize,
            message: message.into(),
        }
    }
}

/// A non-fatal finding recorded while walking the span tree. The affected
/// node degrades to default values (or is skipped) and the walk continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: &'static str,
    pub message: String,
    pub span_id: Option<String>,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.span_id {
            Some(id) => write!(f, "[{}] {} (span '{}')", self.code, self.message, id),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}
