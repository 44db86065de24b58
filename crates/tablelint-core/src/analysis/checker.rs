//! The per-function driver and the public entry point.
//!
//! A [`Checker`] walks one line scope's items exactly once, dispatching
//! by item tag. All mutable analysis state lives on the checker and dies
//! with it; nothing carries over between functions except the shared
//! interner and catalogue held by the [`Analyzer`].
//!
//! Warnings buffer on the checker and flush to the sink — ordered by
//! `(line, column, code)` — only when the function completes; a give-up
//! (goto/label) discards the buffer.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use tablelint_ir::item::{Item, LineScope};
use tablelint_ir::string_interner::StringInterner;
use tablelint_ir::{Warning, WarningSink};

use super::builtins::StdCatalog;
use super::external::ExternalRefs;
use super::scope::{MergeSlot, Scope};
use super::state::TableSet;
use super::walker::Pos;

/// Shared configuration for analyzing any number of functions.
pub struct Analyzer {
    interner: Arc<StringInterner>,
    catalog: StdCatalog,
}

impl Analyzer {
    /// Analyzer with the full standard-library catalogue.
    pub fn new(interner: Arc<StringInterner>) -> Self {
        let catalog = StdCatalog::max(&interner);
        Analyzer { interner, catalog }
    }

    /// Analyzer with a caller-provided catalogue (a trimmed or extended
    /// standard set).
    pub fn with_catalog(interner: Arc<StringInterner>, catalog: StdCatalog) -> Self {
        Analyzer { interner, catalog }
    }

    pub fn interner(&self) -> &Arc<StringInterner> {
        &self.interner
    }

    /// Analyze one function (or the file-level chunk).
    pub fn analyze_line(&self, line: &LineScope<'_>, sink: &dyn WarningSink) {
        let checker = Checker::new(&self.interner, &self.catalog, line);
        checker.run(sink);
    }

    /// Analyze a batch of line scopes. Order between functions does not
    /// affect results; no state is shared across them.
    pub fn analyze_all(&self, lines: &[&LineScope<'_>], sink: &dyn WarningSink) {
        for line in lines {
            self.analyze_line(line, sink);
        }
    }
}

/// Mutable state of one function analysis.
pub(crate) struct Checker<'a, 'i> {
    pub(crate) interner: &'i StringInterner,
    pub(crate) catalog: &'i StdCatalog,
    pub(crate) line: &'i LineScope<'a>,
    pub(crate) tables: TableSet,
    pub(crate) scopes: Vec<Scope>,
    pub(crate) merge_slots: FxHashMap<usize, MergeSlot>,
    pub(crate) external: ExternalRefs,
    pub(crate) warnings: Vec<Warning>,
    pub(crate) gave_up: bool,
}

impl<'a, 'i> Checker<'a, 'i> {
    pub(crate) fn new(
        interner: &'i StringInterner,
        catalog: &'i StdCatalog,
        line: &'i LineScope<'a>,
    ) -> Self {
        Checker {
            interner,
            catalog,
            line,
            tables: TableSet::new(),
            scopes: Vec::new(),
            merge_slots: FxHashMap::default(),
            external: ExternalRefs::seed(line),
            warnings: Vec::new(),
            gave_up: false,
        }
    }

    pub(crate) fn run(mut self, sink: &dyn WarningSink) {
        tracing::debug!(items = self.line.items.len(), "analyzing line scope");
        self.scopes.push(Scope::root());

        let count = self.line.items.len();
        for index in 0..count {
            if self.gave_up {
                break;
            }
            self.process_item(index);
            if !self.gave_up {
                // Sibling branches merge once the item just before their
                // join has run.
                self.run_pending_merge(index + 1);
            }
        }

        if self.gave_up {
            // Partial state would misreport; nothing from this function
            // is emitted.
            return;
        }

        let root = self.scopes.pop().expect("root scope present");
        if !self.scopes.is_empty() {
            panic!(
                "linearizer contract violation: {} scope(s) left open at end of function",
                self.scopes.len()
            );
        }
        self.flush_scope_locals(&root);
        for id in self.tables.live_ids() {
            self.dispose_record(id);
        }

        self.warnings.sort_by(|a, b| a.position().cmp(&b.position()));
        for warning in self.warnings.drain(..) {
            sink.report(warning);
        }
    }

    fn process_item(&mut self, index: usize) {
        let line = self.line;
        match &line.items[index] {
            Item::Local {
                lhs, rhs, closures, ..
            } => {
                // Closures defined by this statement can run at any later
                // call site; account for them before transferring.
                self.external.fold_all(closures);
                self.transfer_assign(lhs, rhs, true);
            }
            Item::Set {
                lhs, rhs, closures, ..
            } => {
                self.external.fold_all(closures);
                self.transfer_assign(lhs, rhs, false);
            }
            Item::Eval { expr, closures, .. } => {
                self.external.fold_all(closures);
                self.walk_expr(expr, Pos::Normal);
            }
            Item::Noop {
                kind,
                scope_end,
                is_else,
                span,
            } => self.control(*kind, *scope_end, *is_else, *span),
            Item::Jump { to } => self.note_jump(*to),
            Item::Cjump { .. } => {}
        }
    }
}
