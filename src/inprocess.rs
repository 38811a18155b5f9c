//! The default engine: a restricted interpreter in the host process.
//!
//! Execution happens on a blocking task so the async caller stays
//! responsive. Two clocks bound it: the interpreter checks a cooperative
//! deadline at statement and call boundaries, and a wall-clock watchdog
//! around the task catches anything the checkpoints miss. When the watchdog
//! fires the task is abandoned and its scope dropped with it, so no partial
//! side effects survive beyond any chart file already rendered.
//!
//! This is a soft sandbox: containment comes from the interpreter exposing
//! no filesystem, process, network, or reflection surface at all, not from
//! OS-level isolation.

use crate::chart::ChartService;
use crate::config::ExecutionOptions;
use crate::engine::{EngineCapabilities, ExecutionEngine};
use crate::errors::{Result, SandboxError};
use crate::interp;
use crate::sanitizer::SanitizedSnippet;
use crate::scope::Scope;
use crate::table::Table;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Slack added to the watchdog so the cooperative deadline normally wins and
/// produces the more precise error.
const WATCHDOG_GRACE: Duration = Duration::from_millis(100);

pub struct InProcessEngine {
    charts: Arc<ChartService>,
}

impl InProcessEngine {
    pub fn new(charts: ChartService) -> InProcessEngine {
        InProcessEngine {
            charts: Arc::new(charts),
        }
    }

    /// Directory chart files are confined to.
    pub fn chart_root(&self) -> &Path {
        self.charts.root()
    }
}

#[async_trait]
impl ExecutionEngine for InProcessEngine {
    async fn validate(
        &self,
        _snippet: &SanitizedSnippet,
        bindings: &[(String, Table)],
        _options: &ExecutionOptions,
    ) -> Result<()> {
        for (name, _) in bindings {
            if interp::CAPABILITY_NAMES.contains(&name.as_str()) {
                return Err(SandboxError::InvalidDataset(format!(
                    "dataset identifier '{name}' shadows a sandbox capability"
                )));
            }
        }
        Ok(())
    }

    async fn execute(
        &self,
        snippet: &SanitizedSnippet,
        bindings: Vec<(String, Table)>,
        options: &ExecutionOptions,
    ) -> Result<Scope> {
        self.validate(snippet, &bindings, options).await?;

        let deadline = Instant::now() + options.timeout;
        let program = snippet.program.clone();
        let charts = Arc::clone(&self.charts);
        debug!(datasets = bindings.len(), timeout = ?options.timeout, "executing snippet");

        let task = tokio::task::spawn_blocking(move || {
            let scope = Scope::for_query(bindings);
            interp::run(&program, scope, deadline, &charts)
        });

        match tokio::time::timeout(options.timeout + WATCHDOG_GRACE, task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) => Err(SandboxError::Execution(format!(
                "execution task aborted: {join_error}"
            ))),
            Err(_) => {
                warn!(timeout = ?options.timeout, "watchdog expired, abandoning scope");
                Err(SandboxError::Timeout)
            }
        }
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            name: "In-process restricted interpreter".to_string(),
            in_process: true,
            security_level: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SnippetPolicy;
    use crate::sanitizer::Sanitizer;
    use crate::scope::Value;
    use crate::table::Cell;

    fn engine(dir: &Path) -> InProcessEngine {
        InProcessEngine::new(ChartService::new(dir).unwrap())
    }

    fn sanitized(code: &str) -> SanitizedSnippet {
        Sanitizer::new(SnippetPolicy::default()).sanitize(code).unwrap()
    }

    fn dataset() -> (String, Table) {
        let table = Table::from_rows(
            vec!["v".into()],
            vec![vec![Cell::Int(10)], vec![Cell::Int(20)]],
        )
        .unwrap();
        ("numbers".to_string(), table)
    }

    #[tokio::test]
    async fn executes_a_scalar_snippet() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let scope = engine
            .execute(
                &sanitized("result_value = numbers['v'].sum()"),
                vec![dataset()],
                &ExecutionOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(scope.get("result_value"), Some(&Value::Int(30)));
    }

    #[tokio::test]
    async fn zero_timeout_reports_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let options = ExecutionOptions {
            timeout: Duration::ZERO,
            ..ExecutionOptions::default()
        };
        let err = engine
            .execute(&sanitized("result_value = 1"), vec![dataset()], &options)
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Timeout));
    }

    #[tokio::test]
    async fn engine_survives_a_timed_out_query() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let options = ExecutionOptions {
            timeout: Duration::ZERO,
            ..ExecutionOptions::default()
        };
        let _ = engine
            .execute(&sanitized("result_value = 1"), vec![dataset()], &options)
            .await;
        let scope = engine
            .execute(
                &sanitized("result_value = 2 + 2"),
                vec![dataset()],
                &ExecutionOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(scope.get("result_value"), Some(&Value::Int(4)));
    }

    #[tokio::test]
    async fn shadowing_dataset_identifier_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let (_, table) = dataset();
        let err = engine
            .execute(
                &sanitized("result_value = 1"),
                vec![("join".to_string(), table)],
                &ExecutionOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::InvalidDataset(_)));
    }
}
