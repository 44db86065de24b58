//! Test helpers for tablelint.
//!
//! The engine consumes linearized IR that a frontend normally produces;
//! tests build it by hand. [`IrBuilder`] keeps that bearable: it wraps
//! an arena and an interner, assigns one source line per statement (and
//! one column per expression within it), and offers compact constructors
//! for every expression and item shape, including a whole
//! `if`/`elseif`/`else` construct with its jump bookkeeping.

mod build;

pub use build::IrBuilder;

use std::sync::Arc;

use tablelint_core::Analyzer;
use tablelint_ir::diagnostics::{CollectingWarningSink, Warning, WarningCode};
use tablelint_ir::item::LineScope;
use tablelint_ir::string_interner::StringInterner;

/// Run the engine over one line scope and return its warnings, already
/// ordered the way the sink receives them.
pub fn analyze(line: &LineScope<'_>, interner: &Arc<StringInterner>) -> Vec<Warning> {
    let sink = CollectingWarningSink::new();
    Analyzer::new(interner.clone()).analyze_line(line, &sink);
    sink.take()
}

/// The numeric codes of `warnings`, in order.
pub fn codes(warnings: &[Warning]) -> Vec<&'static str> {
    warnings.iter().map(|w| w.code.as_str()).collect()
}

/// Find a warning by code and rendered field name.
pub fn find<'w>(
    warnings: &'w [Warning],
    code: WarningCode,
    field: &str,
) -> Option<&'w Warning> {
    warnings
        .iter()
        .find(|w| w.code == code && w.field.to_string() == field)
}

/// Assert that exactly the given `(code, field)` pairs were reported, in
/// order.
#[track_caller]
pub fn assert_warnings(warnings: &[Warning], expected: &[(WarningCode, &str)]) {
    let actual: Vec<(WarningCode, String)> = warnings
        .iter()
        .map(|w| (w.code, w.field.to_string()))
        .collect();
    let expected: Vec<(WarningCode, String)> = expected
        .iter()
        .map(|(c, f)| (*c, f.to_string()))
        .collect();
    assert_eq!(
        actual, expected,
        "warning mismatch; full records: {warnings:#?}"
    );
}
