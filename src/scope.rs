//! The execution scope: the exact set of names one snippet can see.
//!
//! A scope is assembled fresh for every query from the resolver's bindings
//! (each dataset cloned, so nothing the snippet does reaches the registry's
//! canonical copy), grows only through the snippet's own assignments, and is
//! discarded after classification. The sanctioned capabilities are not stored
//! here (the interpreter resolves them by name at call sites), so the scope
//! holds datasets and snippet-defined values, nothing else.

use crate::table::{Cell, Column, Table};
use std::collections::HashMap;

/// A runtime value inside the sandbox.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Table(Table),
    Column(Column),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "None",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Table(_) => "table",
            Value::Column(_) => "column",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Table(t) => t.row_count() > 0,
            Value::Column(c) => !c.is_empty(),
        }
    }

    /// Scalar view of this value, if it fits in a cell.
    pub fn as_cell(&self) -> Option<Cell> {
        match self {
            Value::Null => Some(Cell::Null),
            Value::Bool(b) => Some(Cell::Bool(*b)),
            Value::Int(i) => Some(Cell::Int(*i)),
            Value::Float(f) => Some(Cell::Float(*f)),
            Value::Str(s) => Some(Cell::Str(s.clone())),
            _ => None,
        }
    }
}

impl From<Cell> for Value {
    fn from(cell: Cell) -> Value {
        match cell {
            Cell::Null => Value::Null,
            Cell::Bool(b) => Value::Bool(b),
            Cell::Int(i) => Value::Int(i),
            Cell::Float(f) => Value::Float(f),
            Cell::Str(s) => Value::Str(s),
        }
    }
}

/// Name bindings plus the record of charts the snippet saved. One per query,
/// never shared, never pooled.
#[derive(Debug, Default)]
pub struct Scope {
    bindings: HashMap<String, Value>,
    charts: Vec<String>,
}

impl Scope {
    /// Build a scope for one query from already-copied dataset bindings.
    /// Callers clone out of the registry before this point (copy-on-bind),
    /// so nothing the snippet does can reach the canonical tables.
    pub fn for_query(bindings: Vec<(String, Table)>) -> Scope {
        let bindings = bindings
            .into_iter()
            .map(|(name, table)| (name, Value::Table(table)))
            .collect();
        Scope {
            bindings,
            charts: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    /// Relative paths of charts rendered during this query, in save order.
    pub fn charts(&self) -> &[String] {
        &self.charts
    }

    pub(crate) fn record_chart(&mut self, path: String) {
        self.charts.push(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;

    #[test]
    fn for_query_clones_tables() {
        let table = Table::from_rows(
            vec!["a".into()],
            vec![vec![Cell::Int(1)], vec![Cell::Int(2)]],
        )
        .unwrap();
        let scope = Scope::for_query(vec![("t".to_string(), table.clone())]);
        match scope.get("t") {
            Some(Value::Table(bound)) => assert_eq!(bound, &table),
            other => panic!("unexpected binding: {other:?}"),
        }
    }

    #[test]
    fn truthiness_follows_emptiness() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Str(String::new()).truthy());
        assert!(Value::Int(-1).truthy());
        assert!(!Value::List(vec![]).truthy());
    }
}
