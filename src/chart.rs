//! Chart output: the one sanctioned side effect of a snippet.
//!
//! The sandbox's `save_chart` capability builds a [`ChartSpec`] and hands it
//! to a [`ChartRenderer`] that writes exactly one file under a fixed,
//! pre-created directory. File names are derived from a sanitized stem plus a
//! random tag, so they cannot traverse out of the chart root and never
//! collide across queries. The drawing library itself stays an external
//! collaborator: the default renderer persists the spec as JSON for whatever
//! front end draws it.

use crate::errors::Result;
use crate::table::Cell;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Line,
    Scatter,
    Histogram,
}

impl ChartKind {
    pub fn parse(kind: &str) -> Result<ChartKind> {
        Ok(match kind {
            "bar" => ChartKind::Bar,
            "line" => ChartKind::Line,
            "scatter" => ChartKind::Scatter,
            "histogram" => ChartKind::Histogram,
            other => {
                return Err(crate::errors::SandboxError::exec(format!(
                    "unknown chart kind '{other}' (expected bar, line, scatter, histogram)"
                )))
            }
        })
    }
}

/// Everything a renderer needs to draw one chart.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    /// Column plotted on the x axis, when the kind has one.
    pub x: Option<String>,
    /// Column plotted on the y axis, when the kind has one.
    pub y: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// Pluggable rendering seam. Implementations must write a single file at
/// `dest` and nothing else.
pub trait ChartRenderer: Send + Sync {
    fn render(&self, spec: &ChartSpec, dest: &Path) -> Result<()>;

    /// File extension the renderer produces.
    fn extension(&self) -> &'static str {
        "json"
    }
}

/// Default renderer: persists the spec as pretty-printed JSON.
pub struct SpecFileRenderer;

impl ChartRenderer for SpecFileRenderer {
    fn render(&self, spec: &ChartSpec, dest: &Path) -> Result<()> {
        let file = File::create(dest)?;
        serde_json::to_writer_pretty(file, spec)?;
        Ok(())
    }
}

/// Owns the chart root directory and the renderer behind it.
pub struct ChartService {
    root: PathBuf,
    renderer: Box<dyn ChartRenderer>,
}

impl ChartService {
    /// Create the service with the default spec-file renderer, creating the
    /// root directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<ChartService> {
        Self::with_renderer(root, Box::new(SpecFileRenderer))
    }

    pub fn with_renderer(
        root: impl Into<PathBuf>,
        renderer: Box<dyn ChartRenderer>,
    ) -> Result<ChartService> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(ChartService { root, renderer })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Render one chart under the root and return its relative file name.
    pub fn save(&self, name: &str, spec: &ChartSpec) -> Result<String> {
        let file_name = confined_file_name(name, self.renderer.extension());
        let dest = self.root.join(&file_name);
        self.renderer.render(spec, &dest)?;
        info!(chart = %file_name, kind = ?spec.kind, "chart rendered");
        Ok(file_name)
    }
}

/// Sanitized stem plus random tag. Only `[a-z0-9-]` survives, so the result
/// can never name a path outside the chart root.
fn confined_file_name(name: &str, extension: &str) -> String {
    let mut stem = String::new();
    let mut last_dash = true;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            stem.push(c);
            last_dash = false;
        } else if !last_dash {
            stem.push('-');
            last_dash = true;
        }
    }
    let stem = stem.trim_end_matches('-');
    let stem = if stem.is_empty() { "chart" } else { stem };
    let tag = Uuid::new_v4().simple().to_string();
    format!("{stem}-{}.{extension}", &tag[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ChartSpec {
        ChartSpec {
            kind: ChartKind::Bar,
            title: "Headcount per department".into(),
            x: Some("Department".into()),
            y: Some("Headcount".into()),
            columns: vec!["Department".into(), "Headcount".into()],
            rows: vec![vec![Cell::Str("HR".into()), Cell::Int(4)]],
        }
    }

    #[test]
    fn saves_spec_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let service = ChartService::new(dir.path()).unwrap();
        let file_name = service.save("headcount per department", &spec()).unwrap();
        let written = dir.path().join(&file_name);
        assert!(written.exists());
        let text = std::fs::read_to_string(written).unwrap();
        assert!(text.contains("\"bar\""));
        assert!(file_name.starts_with("headcount-per-department-"));
    }

    #[test]
    fn traversal_attempts_stay_confined() {
        let dir = tempfile::tempdir().unwrap();
        let service = ChartService::new(dir.path()).unwrap();
        let file_name = service.save("../../etc/passwd", &spec()).unwrap();
        assert!(!file_name.contains('/'));
        assert!(!file_name.contains(".."));
        assert!(dir.path().join(&file_name).exists());
    }

    #[test]
    fn repeated_saves_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let service = ChartService::new(dir.path()).unwrap();
        let a = service.save("salary", &spec()).unwrap();
        let b = service.save("salary", &spec()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn unknown_kind_is_an_execution_error() {
        assert!(ChartKind::parse("pie").is_err());
    }
}
