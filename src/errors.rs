use thiserror::Error;

pub type Result<T> = std::result::Result<T, SandboxError>;

/// Why the sanitizer refused a snippet. Surfaced verbatim to the caller so the
/// collaborator driving the AI can decide to regenerate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("disallowed-import: '{0}'")]
    DisallowedImport(String),

    #[error("disallowed-call: '{0}'")]
    DisallowedCall(String),

    #[error("syntax-error: {0}")]
    SyntaxError(String),
}

impl RejectReason {
    /// Stable reason code for transport layers that key on it.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::DisallowedImport(_) => "disallowed-import",
            RejectReason::DisallowedCall(_) => "disallowed-call",
            RejectReason::SyntaxError(_) => "syntax-error",
        }
    }
}

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("snippet rejected: {0}")]
    Rejected(#[from] RejectReason),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("execution timeout exceeded")]
    Timeout,

    #[error("snippet produced no recognized result binding")]
    NoResult,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SandboxError {
    /// Shorthand used by table operations and the interpreter when the
    /// snippet did something semantically wrong (unknown column, bad
    /// argument, arity mismatch). Never used for host-side failures.
    pub(crate) fn exec(msg: impl Into<String>) -> Self {
        SandboxError::Execution(msg.into())
    }
}
