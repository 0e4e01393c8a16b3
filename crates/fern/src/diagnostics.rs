//! Diagnostic sink for recoverable runtime faults.
//!
//! No `log`/`tracing` dependency: the VM is monomorphized over a
//! `DiagnosticSink` trait with `Noop`/`Stderr`/`Collect` implementations.
//! Every recoverable runtime fault (type mismatch, out-of-bounds index,
//! reactive cycle, division by zero) is reported as it happens, without
//! halting the VM.

use std::fmt;

use crate::error::RunError;

/// A recoverable fault observed during execution, reported once at the
/// point it was recovered from.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub error: RunError,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "runtime warning: {}", self.error)
    }
}

/// Receives diagnostics as the VM recovers from non-fatal faults.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Production default: recoverable faults are silently recovered with
/// their sentinel value and nothing is reported.
#[derive(Debug, Default)]
pub struct NoopDiagnostics;

impl DiagnosticSink for NoopDiagnostics {
    fn report(&mut self, _diagnostic: Diagnostic) {}
}

/// CLI default: every recoverable fault is written to stderr as it happens.
#[derive(Debug, Default)]
pub struct StderrDiagnostics;

impl DiagnosticSink for StderrDiagnostics {
    fn report(&mut self, diagnostic: Diagnostic) {
        eprintln!("{diagnostic}");
    }
}

/// Test-friendly sink that buffers diagnostics for later assertions instead
/// of printing them.
#[derive(Debug, Default)]
pub struct CollectDiagnostics {
    pub collected: Vec<Diagnostic>,
}

impl DiagnosticSink for CollectDiagnostics {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.collected.push(diagnostic);
    }
}
