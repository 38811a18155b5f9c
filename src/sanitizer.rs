//! Static gate every snippet must pass before the executor will touch it.
//!
//! The primary check walks the parsed program: import statements are judged
//! against the module policy, call sites against the denied-call list, and
//! any dunder name or attribute is refused as interpreter-introspection
//! surface. A substring screen over the raw text runs afterwards as a second
//! layer only; it is never the sole gate, so aliasing or whitespace tricks
//! that fool text matching still meet the structural check first.

use crate::config::SnippetPolicy;
use crate::errors::{RejectReason, Result};
use crate::lang::{self, Expr, Program, Stmt};
use tracing::{debug, warn};

/// Proof that a snippet passed sanitization in this request. The executor
/// only accepts this type, and nothing else constructs it.
#[derive(Debug, Clone)]
pub struct SanitizedSnippet {
    pub(crate) program: Program,
    source: String,
}

impl SanitizedSnippet {
    /// The cleaned source text that was approved.
    pub fn source(&self) -> &str {
        &self.source
    }
}

pub struct Sanitizer {
    policy: SnippetPolicy,
}

impl Sanitizer {
    pub fn new(policy: SnippetPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SnippetPolicy {
        &self.policy
    }

    /// Accept or reject a snippet wholesale. Any disallowed construct rejects
    /// the whole snippet; there is no partial acceptance.
    pub fn sanitize(&self, code: &str) -> Result<SanitizedSnippet> {
        let source = strip_markdown_fences(code);
        let program = match lang::parse(&source) {
            Ok(program) => program,
            Err(e) => {
                warn!(error = %e, "snippet failed to parse");
                return Err(RejectReason::SyntaxError(e.to_string()).into());
            }
        };

        if let Some(reason) = self
            .check_imports(&program)
            .or_else(|| self.check_expressions(&program))
            .or_else(|| screen_raw_text(&source))
        {
            warn!(reason = %reason, "snippet rejected");
            return Err(reason.into());
        }

        debug!(statements = program.stmts.len(), "snippet accepted");
        Ok(SanitizedSnippet { program, source })
    }

    fn check_imports(&self, program: &Program) -> Option<RejectReason> {
        for stmt in &program.stmts {
            let module = match stmt {
                Stmt::Import { module, .. } => module,
                Stmt::FromImport { module, .. } => module,
                _ => continue,
            };
            if !self.policy.modules.is_allowed(module) {
                return Some(RejectReason::DisallowedImport(module.clone()));
            }
        }
        None
    }

    fn check_expressions(&self, program: &Program) -> Option<RejectReason> {
        let mut violation: Option<RejectReason> = None;
        program.walk_exprs(&mut |expr| {
            if violation.is_some() {
                return;
            }
            match expr {
                Expr::Call { func, .. } => match func.as_ref() {
                    Expr::Name(name) if self.policy.denied_calls.contains(name) => {
                        violation = Some(RejectReason::DisallowedCall(name.clone()));
                    }
                    Expr::Attr { name, .. } if self.policy.denied_calls.contains(name) => {
                        violation = Some(RejectReason::DisallowedCall(name.clone()));
                    }
                    _ => {}
                },
                Expr::Attr { name, .. } if name.starts_with("__") => {
                    violation = Some(RejectReason::DisallowedCall(name.clone()));
                }
                Expr::Name(name) if name.starts_with("__") => {
                    violation = Some(RejectReason::DisallowedCall(name.clone()));
                }
                _ => {}
            }
        });
        violation
    }
}

/// Drop markdown code fences the model tends to wrap its reply in.
pub fn strip_markdown_fences(code: &str) -> String {
    code.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Defense-in-depth text screen, run after the structural pass. Overcautious
/// on purpose: a hit anywhere in the text, string literals included, rejects
/// the snippet.
fn screen_raw_text(source: &str) -> Option<RejectReason> {
    const IMPORT_PATTERNS: [&str; 2] = ["subprocess", "socket."];
    const CALL_PATTERNS: [&str; 6] = ["__", "os.system", "open(", "eval(", "exec(", "compile("];

    for pattern in IMPORT_PATTERNS {
        if source.contains(pattern) {
            return Some(RejectReason::DisallowedImport(pattern.to_string()));
        }
    }
    for pattern in CALL_PATTERNS {
        if source.contains(pattern) {
            return Some(RejectReason::DisallowedCall(pattern.to_string()));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SandboxError;

    fn sanitizer() -> Sanitizer {
        Sanitizer::new(SnippetPolicy::default())
    }

    fn reject_code(code: &str) -> &'static str {
        match sanitizer().sanitize(code).unwrap_err() {
            SandboxError::Rejected(reason) => reason.code(),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn denylisted_import_rejected_in_every_form() {
        assert_eq!(reject_code("import os"), "disallowed-import");
        assert_eq!(reject_code("import  os as o"), "disallowed-import");
        assert_eq!(reject_code("from os import system"), "disallowed-import");
        assert_eq!(reject_code("from os.path import join"), "disallowed-import");
        assert_eq!(reject_code("import os\nresult_value = 1"), "disallowed-import");
    }

    #[test]
    fn denied_calls_rejected() {
        assert_eq!(reject_code("eval('1 + 1')"), "disallowed-call");
        assert_eq!(reject_code("x = open('data.txt')"), "disallowed-call");
        assert_eq!(reject_code("t.getattr('rows')"), "disallowed-call");
    }

    #[test]
    fn dunder_access_rejected() {
        assert_eq!(reject_code("x = t.__class__"), "disallowed-call");
        assert_eq!(reject_code("__builtins__"), "disallowed-call");
    }

    #[test]
    fn syntax_error_surfaces_as_reason() {
        assert_eq!(reject_code("x = (1 +"), "syntax-error");
    }

    #[test]
    fn screen_catches_patterns_hidden_in_strings() {
        assert_eq!(reject_code("x = 'please eval(this)'"), "disallowed-call");
    }

    #[test]
    fn plain_analysis_snippet_accepted() {
        let snippet = sanitizer()
            .sanitize("result_df = employees.filter('Department', '==', 'HR')")
            .unwrap();
        assert_eq!(snippet.program.stmts.len(), 1);
    }

    #[test]
    fn markdown_fences_stripped_before_parsing() {
        let code = "```python\nresult_value = 2 + 2\n```";
        let snippet = sanitizer().sanitize(code).unwrap();
        assert_eq!(snippet.source(), "result_value = 2 + 2");
    }

    #[test]
    fn non_denylisted_import_passes_gate() {
        // The gate lets it through; the sandbox itself has no modules, so
        // execution reports the missing module instead.
        assert!(sanitizer().sanitize("import math").is_ok());
    }

    #[test]
    fn strict_policy_rejects_all_imports() {
        let strict = Sanitizer::new(SnippetPolicy::strict());
        match strict.sanitize("import math").unwrap_err() {
            SandboxError::Rejected(RejectReason::DisallowedImport(m)) => assert_eq!(m, "math"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
