//! The dataset registry and the name resolver over it.
//!
//! One registry holds the datasets of one upload session. The resolver
//! derives a canonical, code-safe identifier for every dataset from its file
//! stem and sheet name, so generated snippets can reference them without
//! ambiguity. Resolution is a pure function of the registry contents;
//! running it twice yields the same mapping, which the prompt-building
//! collaborator relies on.

use crate::errors::{Result, SandboxError};
use crate::table::Table;
use std::collections::HashSet;
use tracing::info;

/// Where a dataset came from: the uploaded file's stem and the sheet inside
/// it. Kept for identifier derivation and user display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetSource {
    pub file_stem: String,
    pub sheet_name: String,
}

impl SheetSource {
    pub fn new(file_stem: impl Into<String>, sheet_name: impl Into<String>) -> SheetSource {
        SheetSource {
            file_stem: file_stem.into(),
            sheet_name: sheet_name.into(),
        }
    }
}

/// Datasets of one upload session, in upload order. The upload flow is the
/// only writer; everything else reads.
#[derive(Debug, Default)]
pub struct DatasetRegistry {
    entries: Vec<(SheetSource, Table)>,
}

impl DatasetRegistry {
    pub fn new() -> DatasetRegistry {
        DatasetRegistry::default()
    }

    pub fn insert(&mut self, source: SheetSource, table: Table) {
        info!(
            file = %source.file_stem,
            sheet = %source.sheet_name,
            rows = table.row_count(),
            "dataset registered"
        );
        self.entries.push((source, table));
    }

    /// Swap in a new upload session. In-flight queries already hold cloned
    /// bindings and are unaffected.
    pub fn replace_all(&mut self, entries: Vec<(SheetSource, Table)>) {
        info!(datasets = entries.len(), "registry session replaced");
        self.entries = entries;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical identifier → dataset, in upload order. Every identifier is a
    /// valid bare identifier token and unique within the session; a dataset
    /// whose title normalizes to nothing fails resolution rather than being
    /// dropped.
    pub fn resolve_bindings(&self) -> Result<Vec<(String, &Table)>> {
        let mut taken: HashSet<String> = HashSet::new();
        let mut bindings = Vec::with_capacity(self.entries.len());
        for (source, table) in &self.entries {
            let base = canonical_identifier(source).ok_or_else(|| {
                SandboxError::InvalidDataset(format!(
                    "dataset from file '{}', sheet '{}' has no derivable name",
                    source.file_stem, source.sheet_name
                ))
            })?;
            let mut candidate = base.clone();
            let mut suffix = 2;
            while !taken.insert(candidate.clone()) {
                candidate = format!("{base}_{suffix}");
                suffix += 1;
            }
            bindings.push((candidate, table));
        }
        Ok(bindings)
    }

    /// Identifier → column names, for the prompt builder to interpolate.
    pub fn schemas(&self) -> Result<Vec<(String, Vec<String>)>> {
        Ok(self
            .resolve_bindings()?
            .into_iter()
            .map(|(name, table)| (name, table.columns().to_vec()))
            .collect())
    }
}

/// `<file-stem>_<sheet-name>`, lower-cased, every non-alphanumeric run
/// collapsed to one underscore. Returns `None` when nothing survives
/// normalization. A leading digit gets a `ds_` prefix so the result is a
/// valid bare identifier.
fn canonical_identifier(source: &SheetSource) -> Option<String> {
    let mut parts = Vec::new();
    for raw in [&source.file_stem, &source.sheet_name] {
        let normalized = normalize(raw);
        if !normalized.is_empty() {
            parts.push(normalized);
        }
    }
    if parts.is_empty() {
        return None;
    }
    let joined = parts.join("_");
    if joined.starts_with(|c: char| c.is_ascii_digit()) {
        Some(format!("ds_{joined}"))
    } else {
        Some(joined)
    }
}

fn normalize(raw: &str) -> String {
    let mut out = String::new();
    let mut last_underscore = true;
    for c in raw.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_underscore = false;
        } else if !last_underscore {
            out.push('_');
            last_underscore = true;
        }
    }
    out.trim_end_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Cell;

    fn tiny(label: &str) -> Table {
        Table::from_rows(
            vec!["v".into()],
            vec![vec![Cell::Str(label.to_string())]],
        )
        .unwrap()
    }

    #[test]
    fn identifiers_are_code_safe() {
        let mut registry = DatasetRegistry::new();
        registry.insert(SheetSource::new("Q1 Report!", "Sales & Returns"), tiny("a"));
        let bindings = registry.resolve_bindings().unwrap();
        assert_eq!(bindings[0].0, "q1_report_sales_returns");
    }

    #[test]
    fn leading_digit_gets_prefix() {
        let mut registry = DatasetRegistry::new();
        registry.insert(SheetSource::new("2024", "Sales"), tiny("a"));
        let bindings = registry.resolve_bindings().unwrap();
        assert_eq!(bindings[0].0, "ds_2024_sales");
    }

    #[test]
    fn collisions_get_numeric_suffixes() {
        let mut registry = DatasetRegistry::new();
        registry.insert(SheetSource::new("data", "Sheet 1"), tiny("a"));
        registry.insert(SheetSource::new("data", "Sheet-1"), tiny("b"));
        registry.insert(SheetSource::new("data", "sheet_1"), tiny("c"));
        let bindings = registry.resolve_bindings().unwrap();
        let names: Vec<&str> = bindings.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["data_sheet_1", "data_sheet_1_2", "data_sheet_1_3"]);
    }

    #[test]
    fn resolution_is_deterministic() {
        let mut registry = DatasetRegistry::new();
        registry.insert(SheetSource::new("data", "Employees"), tiny("a"));
        registry.insert(SheetSource::new("data", "Projects"), tiny("b"));
        let first: Vec<String> = registry
            .resolve_bindings()
            .unwrap()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        let second: Vec<String> = registry
            .resolve_bindings()
            .unwrap()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn unnameable_dataset_is_an_error_not_a_drop() {
        let mut registry = DatasetRegistry::new();
        registry.insert(SheetSource::new("data", "Employees"), tiny("a"));
        registry.insert(SheetSource::new("", "!!!"), tiny("b"));
        match registry.resolve_bindings() {
            Err(SandboxError::InvalidDataset(msg)) => assert!(msg.contains("no derivable name")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn schemas_expose_column_names() {
        let mut registry = DatasetRegistry::new();
        registry.insert(SheetSource::new("data", "Employees"), tiny("a"));
        let schemas = registry.schemas().unwrap();
        assert_eq!(schemas[0].0, "data_employees");
        assert_eq!(schemas[0].1, vec!["v".to_string()]);
    }
}
