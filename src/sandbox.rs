//! The facade wiring the pipeline together: registry in, classified result
//! out. One call to [`AnalysisSandbox::run_query`] performs resolve →
//! sanitize → execute → classify for a single snippet, building and
//! discarding one execution scope along the way.

use crate::chart::{ChartRenderer, ChartService};
use crate::classifier::{classify, ClassifiedResult};
use crate::config::{ExecutionOptions, ResourceLimits, SnippetPolicy};
use crate::engine::{EngineCapabilities, ExecutionEngine};
use crate::errors::Result;
use crate::inprocess::InProcessEngine;
use crate::registry::DatasetRegistry;
use crate::sanitizer::Sanitizer;
use crate::table::Table;
use std::path::PathBuf;
use tracing::info;

/// Options for creating a sandbox.
pub struct SandboxOptions {
    /// Fixed, pre-created directory chart files are confined to.
    pub chart_dir: PathBuf,
    /// Static policy for the sanitizer.
    pub policy: SnippetPolicy,
    /// Default per-query resource bounds.
    pub limits: ResourceLimits,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            chart_dir: std::env::temp_dir().join("tabsandbox-charts"),
            policy: SnippetPolicy::default(),
            limits: ResourceLimits::default(),
        }
    }
}

impl SandboxOptions {
    pub fn with_chart_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.chart_dir = dir.into();
        self
    }

    pub fn with_policy(mut self, policy: SnippetPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Registry, sanitizer, and engine for one upload session.
pub struct AnalysisSandbox {
    registry: DatasetRegistry,
    sanitizer: Sanitizer,
    engine: Box<dyn ExecutionEngine>,
    defaults: ExecutionOptions,
}

impl AnalysisSandbox {
    /// Create a sandbox backed by the in-process engine and the default
    /// spec-file chart renderer.
    pub fn new(options: SandboxOptions) -> Result<AnalysisSandbox> {
        let charts = ChartService::new(&options.chart_dir)?;
        Ok(Self::assemble(options, Box::new(InProcessEngine::new(charts))))
    }

    /// Create a sandbox with a custom chart renderer behind the default
    /// engine.
    pub fn with_chart_renderer(
        options: SandboxOptions,
        renderer: Box<dyn ChartRenderer>,
    ) -> Result<AnalysisSandbox> {
        let charts = ChartService::with_renderer(&options.chart_dir, renderer)?;
        Ok(Self::assemble(options, Box::new(InProcessEngine::new(charts))))
    }

    /// Create a sandbox around an explicit engine, e.g. an out-of-process
    /// worker implementing [`ExecutionEngine`].
    pub fn with_engine(
        options: SandboxOptions,
        engine: Box<dyn ExecutionEngine>,
    ) -> AnalysisSandbox {
        Self::assemble(options, engine)
    }

    fn assemble(options: SandboxOptions, engine: Box<dyn ExecutionEngine>) -> AnalysisSandbox {
        AnalysisSandbox {
            registry: DatasetRegistry::new(),
            sanitizer: Sanitizer::new(options.policy),
            engine,
            defaults: ExecutionOptions::from(&options.limits),
        }
    }

    /// The upload flow writes datasets through this.
    pub fn registry_mut(&mut self) -> &mut DatasetRegistry {
        &mut self.registry
    }

    pub fn registry(&self) -> &DatasetRegistry {
        &self.registry
    }

    pub fn capabilities(&self) -> EngineCapabilities {
        self.engine.capabilities()
    }

    /// Identifier → column names, for prompt construction and user display.
    pub fn schemas(&self) -> Result<Vec<(String, Vec<String>)>> {
        self.registry.schemas()
    }

    /// Run one snippet with the sandbox's default options.
    pub async fn run_query(&self, code: &str) -> Result<ClassifiedResult> {
        let defaults = self.defaults.clone();
        self.run_query_with_options(code, &defaults).await
    }

    /// Run one snippet with caller-supplied options (per-query timeout).
    pub async fn run_query_with_options(
        &self,
        code: &str,
        options: &ExecutionOptions,
    ) -> Result<ClassifiedResult> {
        info!(bytes = code.len(), "query received");

        let bindings: Vec<(String, Table)> = self
            .registry
            .resolve_bindings()?
            .into_iter()
            // Copy-on-bind: the snippet gets its own tables, the registry
            // keeps the canonical ones.
            .map(|(name, table)| (name, table.clone()))
            .collect();

        let snippet = self.sanitizer.sanitize(code)?;
        let scope = self.engine.execute(&snippet, bindings, options).await?;
        let result = classify(&scope, options)?;
        info!(kind = result_kind(&result), "query classified");
        Ok(result)
    }
}

fn result_kind(result: &ClassifiedResult) -> &'static str {
    match result {
        ClassifiedResult::Tabular { .. } => "tabular",
        ClassifiedResult::Scalar { .. } => "scalar",
        ClassifiedResult::ChartRef { .. } => "chart",
    }
}

/// Create a sandbox with custom options.
pub fn create_sandbox_with_options(options: SandboxOptions) -> Result<AnalysisSandbox> {
    AnalysisSandbox::new(options)
}

/// Create a sandbox with defaults.
pub fn create_default_sandbox() -> Result<AnalysisSandbox> {
    AnalysisSandbox::new(SandboxOptions::default())
}
