//! Error taxonomy for the sitescope engine.
//!
//! Every failure mode maps to exactly one variant family so the CLI can
//! translate errors to exit codes and the library surface can emit a
//! structured envelope. The engine never panics across an API boundary;
//! invariant breaches become [`EngineError::Internal`] with a correlation id.

use crate::issue::IssueStatus;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine-wide error type with explicit failure families.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Bad input from the caller: malformed URL, unknown option, invalid JSON.
    #[error("usage error: {message}")]
    Usage { message: String },

    /// A named entity (project, snapshot, plugin, issue) does not exist.
    #[error("{resource} not found: {name}")]
    NotFound { resource: String, name: String },

    /// Configuration rejected by validation.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        message: String,
        field: Option<String>,
    },

    /// An illegal issue state transition was requested.
    #[error("invalid transition: {from:?} -> {to:?}")]
    InvalidTransition { from: IssueStatus, to: IssueStatus },

    /// Filesystem or lock failure. On-disk state stays consistent.
    #[error("resource error: {message}")]
    Resource {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Network failure outside the per-URL crawl error recording.
    #[error("network error: {message}")]
    Network { message: String },

    /// Cooperative cancellation observed.
    #[error("cancelled: {operation}")]
    Cancelled { operation: String },

    /// Invariant breach. Carries a correlation id for log cross-reference.
    #[error("internal error [{correlation_id}]: {message}")]
    Internal {
        message: String,
        correlation_id: Uuid,
    },
}

impl EngineError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            name: name.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            field: None,
        }
    }

    pub fn invalid_config_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource {
            message: message.into(),
            source: None,
        }
    }

    pub fn resource_io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Resource {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Stable kind tag used by the error envelope and exit-code mapping.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Usage { .. } => "usage",
            Self::NotFound { .. } => "not_found",
            Self::InvalidConfig { .. } => "invalid_config",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Resource { .. } => "resource",
            Self::Network { .. } => "network",
            Self::Cancelled { .. } => "cancelled",
            Self::Internal { .. } => "internal",
        }
    }

    /// Structured envelope for the library and RPC surfaces.
    pub fn envelope(&self) -> ErrorEnvelope {
        let mut context = BTreeMap::new();
        match self {
            Self::NotFound { resource, name } => {
                context.insert("resource".to_string(), resource.clone());
                context.insert("name".to_string(), name.clone());
            }
            Self::InvalidConfig {
                field: Some(field), ..
            } => {
                context.insert("field".to_string(), field.clone());
            }
            Self::InvalidTransition { from, to } => {
                context.insert("from".to_string(), from.as_str().to_string());
                context.insert("to".to_string(), to.as_str().to_string());
            }
            Self::Internal { correlation_id, .. } => {
                context.insert("correlation_id".to_string(), correlation_id.to_string());
            }
            _ => {}
        }
        ErrorEnvelope {
            kind: self.kind().to_string(),
            message: self.to_string(),
            context: if context.is_empty() {
                None
            } else {
                Some(context)
            },
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Resource {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Usage {
            message: format!("invalid JSON: {err}"),
        }
    }
}

impl From<url::ParseError> for EngineError {
    fn from(err: url::ParseError) -> Self {
        Self::Usage {
            message: format!("invalid URL: {err}"),
        }
    }
}

/// Wire form of an error for library and RPC consumers.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorEnvelope {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<BTreeMap<String, String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_kind_and_context() {
        let err = EngineError::not_found("project", "missing-slug");
        let env = err.envelope();
        assert_eq!(env.kind, "not_found");
        let ctx = env.context.expect("context present");
        assert_eq!(ctx.get("name").map(String::as_str), Some("missing-slug"));
    }

    #[test]
    fn internal_errors_get_distinct_correlation_ids() {
        let a = EngineError::internal("boom");
        let b = EngineError::internal("boom");
        match (a, b) {
            (
                EngineError::Internal {
                    correlation_id: ia, ..
                },
                EngineError::Internal {
                    correlation_id: ib, ..
                },
            ) => assert_ne!(ia, ib),
            _ => unreachable!(),
        }
    }

    #[test]
    fn io_errors_become_resource_errors() {
        let err: EngineError = std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into();
        assert_eq!(err.kind(), "resource");
    }
}
