//! Sandboxed execution of AI-generated analysis snippets over uploaded
//! tabular datasets.
//!
//! The pipeline turns one untrusted snippet into one classified result:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  DatasetRegistry      uploaded sheets, one session            │
//! │        │  resolve_bindings() → canonical identifiers          │
//! │        ▼                                                      │
//! │  Sanitizer            structural gate over the parsed snippet │
//! │        │  SanitizedSnippet (only the gate can mint one)       │
//! │        ▼                                                      │
//! │  ExecutionEngine      fresh scope, capability allow-list,     │
//! │        │              cooperative deadline + watchdog         │
//! │        ▼                                                      │
//! │  classify()           result_df > result_value > chart        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Containment is by construction: the snippet dialect has no loops and no
//! function definitions, the scope holds nothing but copied dataset bindings
//! and the snippet's own assignments, and the only reachable operations are
//! the sanctioned tabular capabilities plus one path-confined chart writer.
//! This is still a soft sandbox; see [`engine::ExecutionEngine`] for the
//! seam where a process-isolated worker can plug in.
//!
//! # Example
//!
//! ```rust,no_run
//! use tabsandbox::{
//!     create_default_sandbox, ClassifiedResult, SheetSource, Table,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut sandbox = create_default_sandbox()?;
//!     let table = Table::from_delimited("Name,Salary\nAda,120000\nLin,90000\n")?;
//!     sandbox
//!         .registry_mut()
//!         .insert(SheetSource::new("data", "Employees"), table);
//!
//!     let result = sandbox
//!         .run_query("result_value = data_employees['Salary'].mean()")
//!         .await?;
//!     assert!(matches!(result, ClassifiedResult::Scalar { .. }));
//!     Ok(())
//! }
//! ```

pub mod chart;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod errors;
pub mod inprocess;
pub mod interp;
pub mod lang;
pub mod registry;
pub mod sandbox;
pub mod sanitizer;
pub mod scope;
pub mod table;

pub use chart::{ChartKind, ChartRenderer, ChartService, ChartSpec, SpecFileRenderer};
pub use classifier::{classify, ClassifiedResult, SCALAR_BINDING, TABULAR_BINDING};
pub use config::{ExecutionOptions, ModulePolicy, ResourceLimits, SnippetPolicy};
pub use engine::{EngineCapabilities, ExecutionEngine};
pub use errors::{RejectReason, Result, SandboxError};
pub use inprocess::InProcessEngine;
pub use registry::{DatasetRegistry, SheetSource};
pub use sandbox::{
    create_default_sandbox, create_sandbox_with_options, AnalysisSandbox, SandboxOptions,
};
pub use sanitizer::{Sanitizer, SanitizedSnippet};
pub use scope::{Scope, Value};
pub use table::{Cell, Column, Table};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sandbox_with_data() -> (tempfile::TempDir, AnalysisSandbox) {
        let dir = tempfile::tempdir().unwrap();
        let mut sandbox = AnalysisSandbox::new(
            SandboxOptions::default().with_chart_dir(dir.path().join("charts")),
        )
        .unwrap();
        let employees = Table::from_delimited(
            "Name,Department,Salary\nAda,Engineering,120000\nGrace,Engineering,135000\nLin,HR,90000\n",
        )
        .unwrap();
        sandbox
            .registry_mut()
            .insert(SheetSource::new("data", "Employees"), employees);
        (dir, sandbox)
    }

    #[tokio::test]
    async fn scalar_convention_classifies_to_scalar() {
        let (_dir, sandbox) = sandbox_with_data();
        let result = sandbox.run_query("result_value = 2 + 2").await.unwrap();
        assert_eq!(
            result,
            ClassifiedResult::Scalar {
                value: serde_json::json!(4)
            }
        );
    }

    #[tokio::test]
    async fn tabular_always_beats_scalar() {
        let (_dir, sandbox) = sandbox_with_data();
        let result = sandbox
            .run_query("result_df = data_employees.head(2)\nresult_value = 7")
            .await
            .unwrap();
        assert!(matches!(result, ClassifiedResult::Tabular { .. }));
    }

    #[tokio::test]
    async fn denylisted_imports_rejected_before_execution() {
        let (_dir, sandbox) = sandbox_with_data();
        for code in ["import os", "import  os as o", "from os import system"] {
            match sandbox.run_query(code).await.unwrap_err() {
                SandboxError::Rejected(RejectReason::DisallowedImport(module)) => {
                    assert_eq!(module, "os")
                }
                other => panic!("unexpected: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn queries_cannot_corrupt_the_registry() {
        let (_dir, sandbox) = sandbox_with_data();
        // Rebind the dataset to a mutated copy and return it.
        let result = sandbox
            .run_query(
                "data_employees = data_employees.with_column('Salary', 0)\nresult_df = data_employees",
            )
            .await
            .unwrap();
        match result {
            ClassifiedResult::Tabular { rows, .. } => assert_eq!(rows[0][2], Cell::Int(0)),
            other => panic!("unexpected: {other:?}"),
        }

        // An independent query still sees the canonical data.
        let result = sandbox
            .run_query("result_value = data_employees['Salary'].mean()")
            .await
            .unwrap();
        assert_eq!(
            result,
            ClassifiedResult::Scalar {
                value: serde_json::json!(115_000.0)
            }
        );
    }

    #[tokio::test]
    async fn timed_out_query_leaves_the_registry_usable() {
        let (_dir, sandbox) = sandbox_with_data();
        let strict = ExecutionOptions {
            timeout: Duration::ZERO,
            ..ExecutionOptions::default()
        };
        let err = sandbox
            .run_query_with_options("result_value = 1", &strict)
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Timeout));

        let result = sandbox.run_query("result_value = 2 + 2").await.unwrap();
        assert!(matches!(result, ClassifiedResult::Scalar { .. }));
    }

    #[tokio::test]
    async fn unrecognized_output_is_no_result() {
        let (_dir, sandbox) = sandbox_with_data();
        let err = sandbox.run_query("x = 1").await.unwrap_err();
        assert!(matches!(err, SandboxError::NoResult));
    }

    #[tokio::test]
    async fn chart_queries_return_a_confined_path() {
        let (dir, sandbox) = sandbox_with_data();
        let result = sandbox
            .run_query("save_chart('Salary by name', 'bar', data_employees, x='Name', y='Salary')")
            .await
            .unwrap();
        match result {
            ClassifiedResult::ChartRef { path } => {
                assert!(!path.contains('/'));
                assert!(dir.path().join("charts").join(&path).exists());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn schemas_echo_identifiers_and_columns() {
        let (_dir, sandbox) = sandbox_with_data();
        let schemas = sandbox.schemas().unwrap();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].0, "data_employees");
        assert_eq!(
            schemas[0].1,
            vec![
                "Name".to_string(),
                "Department".to_string(),
                "Salary".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn execution_failures_carry_the_snippet_message() {
        let (_dir, sandbox) = sandbox_with_data();
        let err = sandbox
            .run_query("result_value = data_employees['salary'].mean()")
            .await
            .unwrap_err();
        match err {
            SandboxError::Execution(msg) => assert!(msg.contains("unknown column 'salary'")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
