//! Statement transfer.
//!
//! `Local` and `Set` items share one transfer function: right-hand sides
//! evaluate first (accesses, escapes, call effects, alias discovery),
//! then targets apply left to right. `local` additionally registers its
//! names in the current scope, hiding (not killing) any tracked
//! binding it shadows.

use tablelint_ir::ast::{Expr, ExprKind, VarRef};
use tablelint_ir::string_interner::StringId;

use super::checker::Checker;
use super::keys::{normalize_key, CoerceNumerics, FieldKey, KeyForm};
use super::scope::ScopeLocal;
use super::state::{Marker, RecordId};
use super::walker::Pos;

impl<'a, 'i> Checker<'a, 'i> {
    pub(crate) fn transfer_assign(
        &mut self,
        lhs: &[&'a Expr<'a>],
        rhs: &[&'a Expr<'a>],
        is_local: bool,
    ) {
        // A bare tracked identifier lining up with a plain name target
        // is an alias, not an escape: `local y = x` shares the record.
        let mut alias_source: Vec<Option<StringId>> = vec![None; lhs.len()];
        for (index, target) in lhs.iter().enumerate() {
            let Some(target_var) = target.as_id() else {
                continue;
            };
            if !target_var.is_local() {
                continue;
            }
            let Some(value) = rhs.get(index) else {
                continue;
            };
            if let Some(source) = value.as_id() {
                if source.is_local() && self.tables.lookup(source.name).is_some() {
                    alias_source[index] = Some(source.name);
                }
            }
        }

        for (index, value) in rhs.iter().enumerate() {
            if alias_source.get(index).copied().flatten().is_some() {
                continue;
            }
            self.walk_expr(value, Pos::Normal);
        }

        // Re-resolve after the walk: a later rhs may have wiped an
        // earlier alias source.
        let alias_record: Vec<Option<RecordId>> = alias_source
            .iter()
            .map(|source| source.and_then(|name| self.tables.lookup(name)))
            .collect();

        for (index, target) in lhs.iter().enumerate() {
            match target.kind {
                ExprKind::Index { base, key } => {
                    self.assign_into_index(base, key, rhs, index);
                }
                ExprKind::Id(var) => {
                    self.assign_into_name(var, rhs, index, is_local, alias_record[index]);
                }
                _ => panic!(
                    "linearizer contract violation: assignment target must be a name or an index"
                ),
            }
        }
    }

    fn assign_into_index(
        &mut self,
        base: &'a Expr<'a>,
        key: &'a Expr<'a>,
        rhs: &[&'a Expr<'a>],
        index: usize,
    ) {
        // The key expression is evaluated first; reads inside it (including
        // reads of other tracked tables) count as accesses, not sets.
        self.walk_expr(key, Pos::Normal);
        let value_is_nil = effective_value_is_nil(rhs, index);
        match base.as_id() {
            Some(var) if var.is_local() => {
                if let Some(id) = self.tables.lookup(var.name) {
                    self.assign_field(id, var.name, key, value_is_nil, false);
                }
            }
            Some(_) => {}
            None => self.walk_expr(base, Pos::Normal),
        }
    }

    fn assign_into_name(
        &mut self,
        var: VarRef,
        rhs: &[&'a Expr<'a>],
        index: usize,
        is_local: bool,
        alias_record: Option<RecordId>,
    ) {
        if is_local {
            let shadowed = self.tables.lookup(var.name).map(|id| {
                self.tables.shadow(var.name);
                id
            });
            self.innermost_mut().locals.push(ScopeLocal {
                name: var.name,
                shadowed,
            });
        } else {
            if !var.is_local() {
                // Assigning to a global: the rhs was walked (and any bare
                // tracked table escaped there); globals are never tracked.
                return;
            }
            if let Some(current) = self.tables.lookup(var.name) {
                if alias_record != Some(current) {
                    self.end_variable(var.name);
                }
            }
        }

        if let Some(source) = alias_record {
            self.tables.add_alias(source, var.name);
            return;
        }

        if let Some(value) = rhs.get(index) {
            if let ExprKind::Table { entries } = value.kind {
                self.init_table_literal(var.name, entries);
            }
        }
    }

    /// Set one field through a key expression.
    pub(crate) fn assign_field(
        &mut self,
        id: RecordId,
        owner: StringId,
        key_expr: &Expr<'a>,
        value_is_nil: bool,
        in_init: bool,
    ) {
        match normalize_key(key_expr, self.interner, CoerceNumerics::No) {
            KeyForm::Constant(key) => {
                self.install_set(id, owner, key, key_expr.span, value_is_nil, in_init);
            }
            KeyForm::Variable => {
                // Writing nil through an unknown key removes an unknown
                // key, a no-op for an abstract table.
                if !value_is_nil {
                    if let Some(record) = self.tables.record_mut(id) {
                        record.set_all = Some(Marker::at(key_expr.span));
                    }
                }
            }
        }
    }

    /// Create a record for `name` from a table constructor.
    fn init_table_literal(&mut self, name: StringId, entries: &'a [tablelint_ir::TableEntry<'a>]) {
        let depth = self.scopes.len();
        let id = self.tables.create(name, depth);
        let mut position: i64 = 0;
        for entry in entries {
            match entry {
                tablelint_ir::TableEntry::Pair { key, value } => {
                    self.assign_field(id, name, key, value.is_nil(), true);
                }
                tablelint_ir::TableEntry::Positional(value) => {
                    if value.is_multi_value() {
                        // `...` or a call expands to an unknown number of
                        // positional values; everything after it would be
                        // absorbed by the expansion anyway.
                        if let Some(record) = self.tables.record_mut(id) {
                            record.set_all = Some(Marker::at(value.span));
                        }
                        break;
                    }
                    position += 1;
                    if !value.is_nil() {
                        self.install_set(
                            id,
                            name,
                            FieldKey::number(position as f64),
                            value.span,
                            false,
                            true,
                        );
                    }
                }
            }
        }
    }
}

/// Nil-ness of the value flowing into target `index`. A short rhs list
/// pads with nil, unless the final expression is a call or vararg;
/// those may expand, and their extra values are of unknown shape.
fn effective_value_is_nil(rhs: &[&Expr<'_>], index: usize) -> bool {
    if let Some(value) = rhs.get(index) {
        return value.is_nil();
    }
    match rhs.last() {
        Some(last) if last.is_multi_value() => false,
        _ => true,
    }
}
