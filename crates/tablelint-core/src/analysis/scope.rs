//! Lexical scopes, branch merging, and loop handling.
//!
//! The driver sees block structure only through `Noop` open/close
//! markers and `Jump`/`Cjump` items. This module keeps the scope stack,
//! snapshots table state on every block entry, and implements the three
//! exit disciplines:
//!
//! - `do` blocks flow their state outward (only their locals die);
//! - `if`/`elseif`/`else` branches stash their state in a merge slot
//!   keyed by the join index and are intersected once the driver reaches
//!   it;
//! - loops restore the pre-loop state and summarize the body's activity
//!   into whole-table markers — one pass, no fixed point; the
//!   loop-external rule in the built-in models is the only other way
//!   loops influence tracking.
//!
//! `goto`/`label` are beyond a single linear pass: the function is
//! abandoned and its buffered warnings are thrown away.

use tablelint_ir::item::BlockKind;
use tablelint_ir::span::Span;
use tablelint_ir::string_interner::StringId;

use super::checker::Checker;
use super::state::{Marker, RecordId, TableSet};

/// What kind of block a scope models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Root,
    Do,
    Branch { is_else: bool },
    Loop,
}

impl ScopeKind {
    /// Scopes whose body may not run (or may re-run): their snapshots
    /// participate in the overwrite-suppression policy.
    pub fn is_branching(self) -> bool {
        matches!(self, ScopeKind::Branch { .. } | ScopeKind::Loop)
    }
}

/// A local declared in a scope, remembering the record its name hid.
#[derive(Debug, Clone)]
pub struct ScopeLocal {
    pub name: StringId,
    pub shadowed: Option<RecordId>,
}

/// One entry of the scope stack.
#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    /// Locals declared here, in declaration order.
    pub locals: Vec<ScopeLocal>,
    /// Table state at entry. `None` only for the root scope.
    pub saved: Option<TableSet>,
    /// An unconditional `return` was seen in this scope's body.
    pub definitely_returns: bool,
    /// For branch scopes: the join index their closing jump targets.
    pub pending_join: Option<usize>,
}

impl Scope {
    pub fn root() -> Self {
        Scope {
            kind: ScopeKind::Root,
            locals: Vec::new(),
            saved: None,
            definitely_returns: false,
            pending_join: None,
        }
    }
}

/// Collected sibling branches waiting for their join index.
#[derive(Debug, Default)]
pub struct MergeSlot {
    pub has_else: bool,
    pub normal: Vec<TableSet>,
    pub returning: Vec<TableSet>,
    /// Scope-stack depth when the first branch was recorded; used to
    /// purge slots that belong to a discarded loop body.
    pub depth: usize,
}

impl<'a, 'i> Checker<'a, 'i> {
    /// Dispatch a `Noop` marker.
    pub(crate) fn control(&mut self, kind: BlockKind, scope_end: bool, is_else: bool, span: Span) {
        match kind {
            BlockKind::Do => {
                if scope_end {
                    self.close_do();
                } else {
                    self.open_scope(ScopeKind::Do);
                }
            }
            BlockKind::If => {
                if scope_end {
                    self.close_branch();
                } else {
                    self.open_scope(ScopeKind::Branch { is_else });
                }
            }
            BlockKind::While | BlockKind::Fornum | BlockKind::Forin | BlockKind::Repeat => {
                if scope_end {
                    self.close_loop(span);
                } else {
                    self.open_scope(ScopeKind::Loop);
                }
            }
            BlockKind::Label | BlockKind::Goto => {
                tracing::debug!(line = span.line, "goto/label encountered; giving up on function");
                self.gave_up = true;
            }
            BlockKind::Return => {
                self.innermost_mut().definitely_returns = true;
            }
        }
    }

    fn open_scope(&mut self, kind: ScopeKind) {
        let saved = self.tables.clone();
        self.scopes.push(Scope {
            kind,
            locals: Vec::new(),
            saved: Some(saved),
            definitely_returns: false,
            pending_join: None,
        });
    }

    pub(crate) fn innermost_mut(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("scope stack is never empty")
    }

    /// A `Jump` inside an open branch is that branch's exit to the join.
    pub(crate) fn note_jump(&mut self, to: usize) {
        if let Some(scope) = self.scopes.last_mut() {
            if matches!(scope.kind, ScopeKind::Branch { .. }) {
                scope.pending_join = Some(to);
            }
        }
    }

    fn close_do(&mut self) {
        let scope = self.pop_scope(ScopeKind::Do);
        self.flush_scope_locals(&scope);
        if scope.definitely_returns {
            self.innermost_mut().definitely_returns = true;
        }
        // Mutations made inside the block flow onward; only the block's
        // own locals ended.
    }

    fn close_branch(&mut self) {
        let scope = self.pop_scope(ScopeKind::Branch { is_else: false });
        let is_else = matches!(scope.kind, ScopeKind::Branch { is_else: true });
        self.flush_scope_locals(&scope);

        let saved = scope.saved.expect("branch scope always snapshots");
        let snapshot = std::mem::replace(&mut self.tables, saved);

        let join = scope.pending_join.unwrap_or_else(|| {
            panic!("linearizer contract violation: if-branch closed without a jump to its join")
        });
        let depth = self.scopes.len();
        let slot = self
            .merge_slots
            .entry(join)
            .or_insert_with(|| MergeSlot {
                depth,
                ..MergeSlot::default()
            });
        slot.has_else |= is_else;
        if scope.definitely_returns {
            slot.returning.push(snapshot);
        } else {
            slot.normal.push(snapshot);
        }
    }

    fn close_loop(&mut self, span: Span) {
        let scope = self.pop_scope(ScopeKind::Loop);
        // One conservative pass: per-key facts from the body do not
        // survive (iteration could rearrange them), but the body's
        // activity cannot be forgotten either: a loop that wrote a
        // table may have set any key, and a loop that read one observed
        // its values.
        let body_state = std::mem::replace(
            &mut self.tables,
            scope.saved.expect("loop scope always snapshots"),
        );
        for id in self.tables.live_ids() {
            let Some(after) = body_state.record(id) else {
                // The body wiped it on some iteration; stay silent about
                // it from here on.
                self.wipe_record(id);
                continue;
            };
            let before = self.tables.record(id).expect("live id");
            let wrote = after.set_keys != before.set_keys
                || after.maybe_set_keys != before.maybe_set_keys
                || after.set_all != before.set_all;
            let read = after.accessed_keys != before.accessed_keys
                || after.accessed_all != before.accessed_all;
            if !(wrote || read) {
                continue;
            }
            let record = self.tables.record_mut(id).expect("live id");
            if wrote {
                record.set_all = Some(Marker::at(span));
            }
            if read {
                record.accessed_all = Some(Marker::at(span));
            }
        }
        let depth = self.scopes.len();
        self.merge_slots.retain(|_, slot| slot.depth <= depth);
    }

    fn pop_scope(&mut self, expected: ScopeKind) -> Scope {
        let scope = self
            .scopes
            .pop()
            .unwrap_or_else(|| panic!("linearizer contract violation: scope_end with no open scope"));
        let kind_matches = match expected {
            ScopeKind::Branch { .. } => matches!(scope.kind, ScopeKind::Branch { .. }),
            other => scope.kind == other,
        };
        if !kind_matches {
            panic!(
                "linearizer contract violation: scope_end kind mismatch (open: {:?})",
                scope.kind
            );
        }
        scope
    }

    /// End every local the scope declared, newest first, restoring any
    /// binding it shadowed.
    pub(crate) fn flush_scope_locals(&mut self, scope: &Scope) {
        for local in scope.locals.iter().rev() {
            self.end_variable(local.name);
            if let Some(record) = local.shadowed {
                self.tables.rebind(local.name, record);
            }
        }
    }

    /// Execute the merge for a join index the driver just reached.
    pub(crate) fn run_pending_merge(&mut self, join: usize) {
        if let Some(slot) = self.merge_slots.remove(&join) {
            self.merge_branches(slot);
        }
    }

    fn merge_branches(&mut self, slot: MergeSlot) {
        let pre = self.tables.clone();

        let merged = if slot.has_else && slot.normal.len() == 1 {
            // The construct is total and only one arm falls through:
            // its state is the state.
            slot.normal.into_iter().next().expect("checked length")
        } else if slot.has_else && slot.normal.is_empty() {
            // Every arm returns; nothing past the join is reachable on a
            // path through the construct.
            self.innermost_mut().definitely_returns = true;
            pre.clone()
        } else {
            let mut participants = slot.normal;
            if !slot.has_else {
                // No else: falling over the construct is a path of its
                // own.
                participants.push(pre.clone());
            }
            TableSet::merge(&participants)
        };

        self.tables = merged;
        for snapshot in &slot.returning {
            self.tables.absorb_accesses(snapshot);
        }
        self.warn_sets_lost_across_branches(&pre);
    }

    /// A key that was definitely set before the construct but is set on
    /// no surviving path afterwards was overwritten everywhere: warn on
    /// the pre-branch value.
    fn warn_sets_lost_across_branches(&mut self, pre: &TableSet) {
        for name in pre.bound_names() {
            let Some(id) = pre.lookup(name) else { continue };
            let Some(pre_record) = pre.record(id) else { continue };
            if pre_record
                .aliases
                .iter()
                .min()
                .is_some_and(|first| *first != name)
            {
                // Visit each record once, through its smallest alias.
                continue;
            }
            let Some(merged_record) = self.tables.by_name(name).cloned() else {
                continue;
            };
            let mut entries: Vec<_> = pre_record.set_keys.values().cloned().collect();
            entries.sort_by_key(|e| (e.span.line, e.span.column));
            for entry in &entries {
                if merged_record.set_keys.contains_key(&entry.key)
                    || merged_record.maybe_set_keys.contains_key(&entry.key)
                {
                    continue;
                }
                self.warn_unused_set_in(id, &merged_record, entry);
            }
        }
    }
}
