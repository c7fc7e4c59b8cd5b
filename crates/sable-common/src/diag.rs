use crate::codes;
use crate::span::Span;

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A compiler diagnostic, identified by its stable numeric code.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: u16,
    pub severity: Severity,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn new(code: u16, span: Span, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: codes::severity(code),
            message: message.into(),
            span,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{} {:03}: {} [{}]", prefix, self.code, self.message, self.span)
    }
}

/// Collector for diagnostics during compilation.
///
/// The sink carries an error flag that the driver resets between statements.
/// With `one_error_per_stmt` enabled, only the first error inside a single
/// statement is recorded, so a malformed expression doesn't cascade; the
/// flag reset guarantees the *next* statement reports normally either way.
#[derive(Debug, Default)]
pub struct ReportSink {
    diagnostics: Vec<Diagnostic>,
    error_flag: bool,
    one_error_per_stmt: bool,
    total_errors: usize,
}

impl ReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_one_error_per_stmt(&mut self, value: bool) {
        self.one_error_per_stmt = value;
    }

    /// Report a diagnostic by code; severity comes from the code registry.
    pub fn report(&mut self, code: u16, span: Span, message: impl Into<String>) {
        let diag = Diagnostic::new(code, span, message);
        if diag.is_error() {
            if self.error_flag && self.one_error_per_stmt {
                return;
            }
            self.error_flag = true;
            self.total_errors += 1;
        }
        self.diagnostics.push(diag);
    }

    pub fn reset_error_flag(&mut self) {
        self.error_flag = false;
    }

    pub fn error_count(&self) -> usize {
        self.total_errors
    }

    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    /// Snapshot the error count; pair with [`ReportSink::ok_since`].
    pub fn mark(&self) -> usize {
        self.total_errors
    }

    /// Whether no errors were reported since the given mark.
    pub fn ok_since(&self, mark: usize) -> bool {
        self.total_errors == mark
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}
