//! The pluggable isolation boundary.
//!
//! An [`ExecutionEngine`] takes a sanitized snippet plus the copied dataset
//! bindings and returns the post-execution scope. The shipped engine runs a
//! restricted interpreter in-process; a hard boundary (a separate worker
//! process with OS resource limits) can implement the same trait without the
//! rest of the pipeline noticing.

use crate::config::ExecutionOptions;
use crate::errors::Result;
use crate::sanitizer::SanitizedSnippet;
use crate::scope::Scope;
use crate::table::Table;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What an engine offers and how strong its isolation is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineCapabilities {
    /// Engine name for logs and UIs.
    pub name: String,
    /// True when snippets run inside the host process (soft sandbox).
    pub in_process: bool,
    /// Security level (0-10, 10 being strongest isolation).
    pub security_level: u8,
}

#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Pre-flight checks that don't run the snippet, e.g. rejecting dataset
    /// identifiers that would shadow a capability.
    async fn validate(
        &self,
        snippet: &SanitizedSnippet,
        bindings: &[(String, Table)],
        options: &ExecutionOptions,
    ) -> Result<()>;

    /// Run one snippet against one freshly built scope and return that scope.
    /// The bindings are already copies; the engine may consume them.
    async fn execute(
        &self,
        snippet: &SanitizedSnippet,
        bindings: Vec<(String, Table)>,
        options: &ExecutionOptions,
    ) -> Result<Scope>;

    /// Describe this engine.
    fn capabilities(&self) -> EngineCapabilities;
}
