use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Module policy applied to import statements found in a snippet.
///
/// The sandbox itself exposes no importable modules, so this gate is about
/// the *quality* of the rejection: a denylisted module is refused with a
/// named reason before execution, instead of failing opaquely at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModulePolicy {
    /// Block specific modules, allow the rest past the gate.
    Denylist(HashSet<String>),
    /// Only the listed modules pass the gate. An empty allowlist rejects
    /// every import.
    Allowlist(HashSet<String>),
    /// Allowlist with an additional denylist for fine-tuning.
    Both {
        allowlist: HashSet<String>,
        denylist: HashSet<String>,
    },
}

impl Default for ModulePolicy {
    fn default() -> Self {
        ModulePolicy::Denylist(Self::default_denylist())
    }
}

impl ModulePolicy {
    /// Modules with process, filesystem, or network reach.
    pub fn default_denylist() -> HashSet<String> {
        [
            "os",
            "sys",
            "subprocess",
            "multiprocessing",
            "socket",
            "urllib",
            "requests",
            "http",
            "ftplib",
            "ctypes",
            "shutil",
            "pathlib",
            "io",
            "pickle",
            "importlib",
            "builtins",
            "pty",
            "fcntl",
            "resource",
            "tempfile",
            "webbrowser",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// Check whether an import of `module` may pass the gate.
    /// Only the root segment matters: `os.path` is judged as `os`.
    pub fn is_allowed(&self, module: &str) -> bool {
        let root = module.split('.').next().unwrap_or(module);

        match self {
            ModulePolicy::Denylist(denylist) => !denylist.contains(root),
            ModulePolicy::Allowlist(allowlist) => allowlist.contains(root),
            ModulePolicy::Both {
                allowlist,
                denylist,
            } => allowlist.contains(root) && !denylist.contains(root),
        }
    }
}

/// Static policy the sanitizer enforces on a parsed snippet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnippetPolicy {
    /// Import gate.
    pub modules: ModulePolicy,
    /// Function and method names that must never be called
    /// (dynamic evaluation, file handles, interpreter introspection).
    pub denied_calls: HashSet<String>,
}

impl Default for SnippetPolicy {
    fn default() -> Self {
        Self {
            modules: ModulePolicy::default(),
            denied_calls: Self::default_denied_calls(),
        }
    }
}

impl SnippetPolicy {
    pub fn default_denied_calls() -> HashSet<String> {
        [
            "eval",
            "exec",
            "compile",
            "open",
            "input",
            "breakpoint",
            "__import__",
            "getattr",
            "setattr",
            "delattr",
            "globals",
            "locals",
            "vars",
            "dir",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// Strictest profile: every import is rejected outright.
    pub fn strict() -> Self {
        Self {
            modules: ModulePolicy::Allowlist(HashSet::new()),
            denied_calls: Self::default_denied_calls(),
        }
    }
}

/// Resource bounds for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Wall-clock bound for snippet execution.
    pub timeout: Duration,
    /// Row cap applied to tabular results before they go on the wire.
    pub max_result_rows: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_result_rows: 100,
        }
    }
}

/// Per-query execution options handed to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOptions {
    /// Wall-clock timeout; exceeding it abandons the scope.
    pub timeout: Duration,
    /// Row cap for classified tabular payloads.
    pub max_result_rows: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        let limits = ResourceLimits::default();
        Self {
            timeout: limits.timeout,
            max_result_rows: limits.max_result_rows,
        }
    }
}

impl From<&ResourceLimits> for ExecutionOptions {
    fn from(limits: &ResourceLimits) -> Self {
        Self {
            timeout: limits.timeout,
            max_result_rows: limits.max_result_rows,
        }
    }
}
