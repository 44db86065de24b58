//! Expression walking.
//!
//! The walker records field reads (`t[k]`), whole-table escapes (a
//! tracked table flowing somewhere the analysis cannot see), and call
//! side effects. It never descends into `Function` literals — closure
//! bodies are separate line scopes, and their influence arrives through
//! the upvalue metadata folded by the external tracker.
//!
//! A bare tracked identifier in value position is an escape and wipes
//! its record, except in the positions that only *carry* the table:
//! table-literal children, short-circuit operands, alias-source
//! right-hand sides, and the first argument of a modeled built-in.

use tablelint_ir::ast::{Expr, ExprKind};
use tablelint_ir::string_interner::StringId;

use super::checker::Checker;
use super::keys::{normalize_key, CoerceNumerics, KeyForm};
use super::scope::ScopeKind;
use super::state::{Marker, RecordId};

/// Where an expression appears, for the escape rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pos {
    /// A bare tracked identifier here escapes.
    Normal,
    /// A bare tracked identifier here stays alive (literal children,
    /// short-circuit operands).
    Protected,
}

impl<'a, 'i> Checker<'a, 'i> {
    pub(crate) fn walk_expr(&mut self, expr: &Expr<'a>, pos: Pos) {
        match expr.kind {
            ExprKind::Number(_)
            | ExprKind::Str(_)
            | ExprKind::Nil
            | ExprKind::True
            | ExprKind::False
            | ExprKind::Dots
            | ExprKind::Function => {}

            ExprKind::Id(var) => {
                if pos == Pos::Normal && var.is_local() {
                    if let Some(id) = self.tables.lookup(var.name) {
                        tracing::debug!(line = expr.span.line, "tracked table escapes");
                        self.wipe_record(id);
                    }
                }
            }

            ExprKind::Paren(inner) => self.walk_expr(inner, pos),

            ExprKind::Index { base, key } => {
                self.walk_expr(key, Pos::Normal);
                match base.as_id() {
                    Some(var) if var.is_local() => {
                        if let Some(id) = self.tables.lookup(var.name) {
                            self.access_field(id, var.name, key);
                        }
                    }
                    Some(_) => {}
                    None => self.walk_expr(base, Pos::Normal),
                }
            }

            ExprKind::Table { entries } => {
                for entry in entries {
                    match entry {
                        tablelint_ir::TableEntry::Positional(value) => {
                            self.walk_expr(value, Pos::Protected);
                        }
                        tablelint_ir::TableEntry::Pair { key, value } => {
                            self.walk_expr(key, Pos::Protected);
                            self.walk_expr(value, Pos::Protected);
                        }
                    }
                }
            }

            ExprKind::Binary { op, lhs, rhs } => {
                // `and`/`or` select an operand rather than consuming it;
                // the table is still reachable through the result.
                let child_pos = if op.is_short_circuit() {
                    Pos::Protected
                } else {
                    Pos::Normal
                };
                self.walk_expr(lhs, child_pos);
                self.walk_expr(rhs, child_pos);
            }

            ExprKind::Unary { operand, .. } => self.walk_expr(operand, Pos::Normal),

            ExprKind::Call { callee, args } => self.walk_call(expr, callee, args),

            ExprKind::Invoke { receiver, args, .. } => self.walk_invoke(expr, receiver, args),
        }
    }

    /// Record a field read, with the undefined-read check.
    pub(crate) fn access_field(&mut self, id: RecordId, name: StringId, key_expr: &Expr<'a>) {
        let loop_external = self.record_is_loop_external(id);
        match normalize_key(key_expr, self.interner, CoerceNumerics::No) {
            KeyForm::Variable => {
                let Some(record) = self.tables.record(id) else {
                    return;
                };
                let undefined = record.set_all.is_none() && !record.has_non_nil_entries();
                if undefined && !loop_external {
                    let warning = self.undefined_read_warning(name, None, key_expr.span);
                    self.warnings.push(warning);
                }
                let record = self.tables.record_mut(id).expect("record vanished");
                record.accessed_all = Some(Marker::at(key_expr.span));
            }
            KeyForm::Constant(key) => {
                let Some(record) = self.tables.record(id) else {
                    return;
                };
                let undefined = match record.set_keys.get(&key) {
                    None => {
                        !record.maybe_set_keys.contains_key(&key) && record.set_all.is_none()
                    }
                    Some(entry) => {
                        // A nil value reads as undefined unless some
                        // whole-table write may have replaced it since.
                        entry.is_nil
                            && !record
                                .set_all
                                .as_ref()
                                .is_some_and(|m| m.span.line >= entry.span.line)
                    }
                };
                if undefined && !loop_external {
                    let warning = self.undefined_read_warning(name, Some(key), key_expr.span);
                    self.warnings.push(warning);
                }
                self.note_field_access(id, key, key_expr.span);
            }
        }
    }

    /// Inside a loop the table predates, a single linear pass cannot see
    /// writes from earlier iterations; undefined-read checks are off.
    pub(crate) fn record_is_loop_external(&self, id: RecordId) -> bool {
        let Some(record) = self.tables.record(id) else {
            return false;
        };
        self.scopes
            .iter()
            .skip(record.created_depth)
            .any(|scope| scope.kind == ScopeKind::Loop)
    }

    fn walk_call(&mut self, call: &Expr<'a>, callee: &Expr<'a>, args: &[&'a Expr<'a>]) {
        let classified = self.classify_callee(callee);

        if let Some(super::builtins::Callee::Model(model)) = classified {
            let tracked = args
                .first()
                .and_then(|a| a.as_id())
                .filter(|v| v.is_local())
                .and_then(|v| self.tables.lookup(v.name).map(|id| (id, v.name)));
            if let Some((id, name)) = tracked {
                for arg in &args[1..] {
                    self.walk_expr(arg, Pos::Normal);
                }
                self.apply_builtin(model, call.span, id, name, args);
                return;
            }
        }

        self.walk_expr(callee, Pos::Normal);
        for arg in args {
            self.walk_expr(arg, Pos::Normal);
        }
        if classified.is_none() {
            // Unknown code ran; anything a closure can reach may have
            // changed.
            self.invalidate_after_call(call.span);
        }
    }

    fn walk_invoke(&mut self, call: &Expr<'a>, receiver: &Expr<'a>, args: &[&'a Expr<'a>]) {
        // The receiver is passed by reference: the method may read or
        // write any field, but the table itself stays tracked.
        match receiver.as_id() {
            Some(var) if var.is_local() && self.tables.lookup(var.name).is_some() => {
                let id = self.tables.lookup(var.name).expect("checked above");
                let record = self.tables.record_mut(id).expect("bound name had no record");
                record.set_all = Some(Marker::at(call.span));
                record.accessed_all = Some(Marker::at(call.span));
            }
            _ => self.walk_expr(receiver, Pos::Normal),
        }
        for arg in args {
            self.walk_expr(arg, Pos::Normal);
        }
        self.invalidate_after_call(call.span);
    }
}
