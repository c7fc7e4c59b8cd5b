//! Shared infrastructure for the Sable compiler: source spans, diagnostics,
//! and the stable numeric diagnostic-code registry.

pub mod codes;
pub mod diag;
pub mod span;

pub use diag::{Diagnostic, ReportSink, Severity};
pub use span::{FileId, Pos, Span};
