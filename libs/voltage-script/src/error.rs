//! Error types for voltage-script

use thiserror::Error;

/// Script compilation and configuration errors
///
/// Evaluation never fails: numeric and structural problems at runtime are
/// folded to 0 by the evaluator. Only compile-time problems surface here.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScriptError {
    #[error("Integration '{name}' not defined in script '{script}'")]
    UnresolvedIntegration { script: String, name: String },

    #[error("Script '{script}': {kind} index {value} exceeds maximum {max}")]
    PayloadOverflow {
        script: String,
        kind: &'static str,
        value: usize,
        max: usize,
    },

    #[error("Script '{script}': unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar {
        script: String,
        ch: char,
        offset: usize,
    },

    #[error("Script '{script}': malformed number at offset {offset}")]
    InvalidNumber { script: String, offset: usize },

    #[error("Script '{script}': integration name missing at offset {offset}")]
    EmptyIntegrationName { script: String, offset: usize },

    #[error("Script '{script}': unbalanced parentheses")]
    UnbalancedParens { script: String },

    #[error("Script '{script}': nesting depth {depth} exceeds maximum {max}")]
    NestingTooDeep {
        script: String,
        depth: usize,
        max: usize,
    },

    #[error("Script '{script}': integration chain depth {depth} exceeds maximum {max}")]
    IntegrationTooDeep {
        script: String,
        depth: usize,
        max: usize,
    },

    #[error("Registry of {len} scripts is referenced by compiled scripts and cannot be reordered")]
    RegistryReferenced { len: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ScriptError {
    pub fn unresolved(script: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnresolvedIntegration {
            script: script.into(),
            name: name.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Name of the script the error was raised for, if any
    pub fn script_name(&self) -> Option<&str> {
        match self {
            Self::UnresolvedIntegration { script, .. }
            | Self::PayloadOverflow { script, .. }
            | Self::UnexpectedChar { script, .. }
            | Self::InvalidNumber { script, .. }
            | Self::EmptyIntegrationName { script, .. }
            | Self::UnbalancedParens { script }
            | Self::NestingTooDeep { script, .. }
            | Self::IntegrationTooDeep { script, .. } => Some(script),
            Self::RegistryReferenced { .. } | Self::Config(_) | Self::Serialization(_) => None,
        }
    }
}

impl From<figment::Error> for ScriptError {
    fn from(err: figment::Error) -> Self {
        ScriptError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ScriptError {
    fn from(err: serde_json::Error) -> Self {
        ScriptError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for ScriptError {
    fn from(err: serde_yaml::Error) -> Self {
        ScriptError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScriptError>;
