use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type. Spec-load and trace-load variants are fatal and
/// surface before verification starts; `Checker` is constructed at the
/// collector boundary but never escapes `verify_task` -- it is converted
/// into an `inconclusive` decision log entry instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("task load failed: {0}")]
    TaskLoad(String),

    #[error("node '{node}' references unknown node '{referenced}'")]
    UnresolvedNodeRef { node: String, referenced: String },

    #[error("graph contains a cycle")]
    CycleDetected,

    #[error("unknown condition type '{0}'")]
    UnknownConditionType(String),

    #[error("trace load failed: {0}")]
    TraceLoad(String),

    #[error("checker failed on node '{node}': {message}")]
    Checker { node: String, message: String },

    #[error("llm transport error: {0}")]
    LlmTransport(String),

    #[error("llm protocol error: {0}")]
    LlmProtocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn task_load(message: impl Into<String>) -> Self {
        Error::TaskLoad(message.into())
    }

    pub fn unresolved_node_ref(node: impl Into<String>, referenced: impl Into<String>) -> Self {
        Error::UnresolvedNodeRef {
            node: node.into(),
            referenced: referenced.into(),
        }
    }

    pub fn checker(node: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Checker {
            node: node.into(),
            message: message.into(),
        }
    }

    pub fn trace_load(message: impl Into<String>) -> Self {
        Error::TraceLoad(message.into())
    }
}
