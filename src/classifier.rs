//! Turns a post-execution scope into a transport-safe result.
//!
//! Exactly one convention wins per execution, checked in a fixed order:
//! a `result_df` binding (tabular), then a `result_value` binding (scalar),
//! then a chart rendered during the run. The order is the tie-break: a
//! snippet that binds both `result_df` and `result_value` classifies as
//! tabular, deterministically.
//!
//! Scalars are coerced to strict-JSON primitives. `NaN` and the infinities
//! have no JSON representation and normalize to `null`; everything else
//! passes through unchanged.

use crate::config::ExecutionOptions;
use crate::errors::{Result, SandboxError};
use crate::scope::{Scope, Value};
use crate::table::{self, Cell};
use serde::Serialize;
use tracing::debug;

/// Binding the classifier reads first: the tabular result.
pub const TABULAR_BINDING: &str = "result_df";
/// Binding read second: the scalar result.
pub const SCALAR_BINDING: &str = "result_value";

/// The typed result handed to the transport layer. Its contract ends here;
/// JSON/HTTP encoding belongs to the caller.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClassifiedResult {
    Tabular {
        columns: Vec<String>,
        rows: Vec<Vec<Cell>>,
    },
    Scalar {
        value: serde_json::Value,
    },
    ChartRef {
        path: String,
    },
}

impl ClassifiedResult {
    /// Comma-delimited text with a header row, for tabular results.
    pub fn to_delimited(&self) -> Option<String> {
        match self {
            ClassifiedResult::Tabular { columns, rows } => {
                Some(table::encode_delimited(columns, rows))
            }
            _ => None,
        }
    }
}

/// Inspect the scope for the recognized output conventions.
pub fn classify(scope: &Scope, options: &ExecutionOptions) -> Result<ClassifiedResult> {
    if let Some(value) = scope.get(TABULAR_BINDING) {
        let result = match value {
            Value::Table(t) => {
                let capped = t.head(options.max_result_rows);
                ClassifiedResult::Tabular {
                    columns: capped.columns().to_vec(),
                    rows: capped.rows().to_vec(),
                }
            }
            Value::Column(c) => ClassifiedResult::Tabular {
                columns: vec![c.name.clone()],
                rows: c
                    .cells
                    .iter()
                    .take(options.max_result_rows)
                    .map(|cell| vec![cell.clone()])
                    .collect(),
            },
            other => {
                return Err(SandboxError::exec(format!(
                    "'{TABULAR_BINDING}' is bound to {}, expected a table or column",
                    other.type_name()
                )))
            }
        };
        debug!("classified as tabular");
        return Ok(result);
    }

    if let Some(value) = scope.get(SCALAR_BINDING) {
        let value = scalar_json(value)?;
        debug!("classified as scalar");
        return Ok(ClassifiedResult::Scalar { value });
    }

    if let Some(path) = scope.charts().last() {
        debug!(chart = %path, "classified as chart reference");
        return Ok(ClassifiedResult::ChartRef { path: path.clone() });
    }

    Err(SandboxError::NoResult)
}

fn scalar_json(value: &Value) -> Result<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => match serde_json::Number::from_f64(*f) {
            Some(n) => serde_json::Value::Number(n),
            // NaN and the infinities normalize to null.
            None => serde_json::Value::Null,
        },
        Value::Str(s) => serde_json::Value::String(s.clone()),
        other => {
            return Err(SandboxError::exec(format!(
                "'{SCALAR_BINDING}' is bound to {}, expected a number or string",
                other.type_name()
            )))
        }
    })
}
