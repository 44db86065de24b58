//! Standard-library knowledge.
//!
//! Two layers:
//!
//! - a handful of **models** — transfer functions for the table
//!   manipulators (`table.insert`/`remove`/`sort`/`concat`) and the
//!   iteration primitives (`pairs`/`ipairs`/`next`/`type`) that keep
//!   per-key precision across the most common table code;
//! - a **pure set** — standard functions that cannot reach into a
//!   tracked table behind the caller's back, so a call to them skips the
//!   external-reference invalidation. Functions that run arbitrary
//!   callbacks (`pcall`, `xpcall`, `table.sort` comparators aside) or
//!   mutate tables (`rawset`, `setmetatable`) are deliberately absent,
//!   as is `io.lines`.
//!
//! Detection is by the textual qualified name of a *global* callee
//! root. A local named `table` does not dispatch (its binding says
//! Local), but a runtime reassignment of the global `table` is not
//! detected; the catalogue assumes the standard globals mean what they
//! usually mean.

use rustc_hash::{FxHashMap, FxHashSet};

use tablelint_ir::ast::{Expr, ExprKind};
use tablelint_ir::span::Span;
use tablelint_ir::string_interner::{StringId, StringInterner};

use super::checker::Checker;
use super::keys::{normalize_key, CoerceNumerics, FieldKey, KeyForm};
use super::state::{Marker, RecordId, SetEntry};

/// The table built-ins with dedicated transfer functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinModel {
    Insert,
    Remove,
    Sort,
    Concat,
    Pairs,
    Ipairs,
    Next,
    Type,
}

/// Result of classifying a callee against the catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callee {
    Model(BuiltinModel),
    /// Known side-effect-free on tracked state.
    Pure,
}

/// The standard-library name catalogue.
pub struct StdCatalog {
    pure: FxHashSet<StringId>,
    models: FxHashMap<StringId, BuiltinModel>,
}

impl StdCatalog {
    /// The full ("max") standard-library catalogue.
    pub fn max(interner: &StringInterner) -> Self {
        let mut pure = FxHashSet::default();
        let mut models = FxHashMap::default();

        for (name, model) in [
            ("table.insert", BuiltinModel::Insert),
            ("table.remove", BuiltinModel::Remove),
            ("table.sort", BuiltinModel::Sort),
            ("table.concat", BuiltinModel::Concat),
            ("pairs", BuiltinModel::Pairs),
            ("ipairs", BuiltinModel::Ipairs),
            ("next", BuiltinModel::Next),
            ("type", BuiltinModel::Type),
        ] {
            models.insert(interner.get_or_intern(name), model);
        }

        for name in [
            // introspection and conversion
            "type",
            "tostring",
            "tonumber",
            "select",
            "rawget",
            "rawequal",
            "rawlen",
            "unpack",
            "assert",
            "error",
            "print",
            // math
            "math.abs",
            "math.ceil",
            "math.floor",
            "math.max",
            "math.min",
            "math.sqrt",
            "math.sin",
            "math.cos",
            "math.tan",
            "math.exp",
            "math.log",
            "math.fmod",
            "math.modf",
            "math.random",
            "math.tointeger",
            // string
            "string.sub",
            "string.len",
            "string.byte",
            "string.char",
            "string.rep",
            "string.reverse",
            "string.format",
            "string.upper",
            "string.lower",
            "string.find",
            "string.match",
            "string.gmatch",
            "string.gsub",
            // os and io, minus io.lines (its iterator state escapes)
            "os.time",
            "os.clock",
            "os.date",
            "os.getenv",
            "io.write",
            "io.read",
            "io.open",
            "io.close",
            "io.flush",
        ] {
            pure.insert(interner.get_or_intern(name));
        }

        StdCatalog { pure, models }
    }

    pub fn is_pure(&self, qualified: StringId) -> bool {
        self.pure.contains(&qualified)
    }

    pub fn model(&self, qualified: StringId) -> Option<BuiltinModel> {
        self.models.get(&qualified).copied()
    }

    fn classify(&self, qualified: StringId) -> Option<Callee> {
        if let Some(model) = self.model(qualified) {
            return Some(Callee::Model(model));
        }
        self.is_pure(qualified).then_some(Callee::Pure)
    }
}

impl<'a, 'i> Checker<'a, 'i> {
    /// Classify a callee expression against the catalogue: a global
    /// identifier, or a string-keyed index into one.
    pub(crate) fn classify_callee(&self, callee: &Expr<'a>) -> Option<Callee> {
        let qualified = match callee.kind {
            ExprKind::Id(var) if !var.is_local() => self.interner.resolve(var.name),
            ExprKind::Index { base, key } => {
                let root = base.as_id().filter(|v| !v.is_local())?;
                let ExprKind::Str(field) = key.kind else {
                    return None;
                };
                format!(
                    "{}.{}",
                    self.interner.resolve(root.name),
                    self.interner.resolve(field)
                )
            }
            _ => return None,
        };
        let id = self.interner.get(&qualified)?;
        self.catalog.classify(id)
    }

    /// Apply a built-in model to a tracked table passed as the first
    /// argument. Remaining arguments were already walked.
    pub(crate) fn apply_builtin(
        &mut self,
        model: BuiltinModel,
        span: Span,
        id: RecordId,
        name: StringId,
        args: &[&'a Expr<'a>],
    ) {
        match model {
            // Sorting a gap-free array permutes values between keys the
            // analysis already considers set; the key set is unchanged.
            BuiltinModel::Sort | BuiltinModel::Type => {}

            BuiltinModel::Next => {
                if let Some(record) = self.tables.record_mut(id) {
                    record.accessed_all = Some(Marker::at(span));
                }
            }

            BuiltinModel::Concat | BuiltinModel::Pairs | BuiltinModel::Ipairs => {
                self.apply_iteration(model, span, id);
            }

            BuiltinModel::Insert => self.apply_insert(span, id, name, args),
            BuiltinModel::Remove => self.apply_remove(span, id, name, args),
        }
    }

    /// `table.concat`, `pairs`, `ipairs`: reads of every key the model
    /// iterates. Imprecise tables collapse to a whole-table read.
    fn apply_iteration(&mut self, model: BuiltinModel, span: Span, id: RecordId) {
        let loop_external = self.record_is_loop_external(id);
        let Some(record) = self.tables.record(id) else {
            return;
        };
        if record.set_all.is_some() || loop_external {
            let record = self.tables.record_mut(id).expect("record vanished");
            record.accessed_all = Some(Marker::at(span));
            return;
        }
        let keys: Vec<FieldKey> = match model {
            BuiltinModel::Concat => record
                .set_keys
                .iter()
                .filter(|(k, e)| k.is_numeric() && !e.is_nil)
                .map(|(k, _)| *k)
                .collect(),
            BuiltinModel::Ipairs => record
                .set_keys
                .iter()
                .filter(|(k, e)| k.is_numeric() && !e.is_nil)
                .map(|(k, _)| *k)
                .chain(
                    record
                        .maybe_set_keys
                        .keys()
                        .filter(|k| k.is_numeric())
                        .copied(),
                )
                .collect(),
            BuiltinModel::Pairs => record
                .set_keys
                .keys()
                .chain(record.maybe_set_keys.keys())
                .copied()
                .collect(),
            _ => unreachable!("iteration models only"),
        };
        for key in keys {
            self.note_field_access(id, key, span);
        }
    }

    fn apply_insert(&mut self, span: Span, id: RecordId, name: StringId, args: &[&'a Expr<'a>]) {
        let loop_external = self.record_is_loop_external(id);
        let Some(record) = self.tables.record(id) else {
            return;
        };
        let imprecise =
            record.set_all.is_some() || !record.maybe_set_keys.is_empty() || loop_external;
        if imprecise || args.len() < 2 || args.len() > 3 {
            let record = self.tables.record_mut(id).expect("record vanished");
            record.set_all = Some(Marker::at(span));
            return;
        }

        if args.len() == 2 {
            // Append: the next free array slot after the known values.
            let position = record.numeric_non_nil_count() as f64 + 1.0;
            let value = args[1];
            self.install_set(
                id,
                name,
                FieldKey::number(position),
                value.span,
                value.is_nil(),
                false,
            );
            return;
        }

        let index = args[1];
        let value = args[2];
        match normalize_key(index, self.interner, CoerceNumerics::Positional) {
            KeyForm::Constant(key) => {
                self.install_set(id, name, key, index.span, value.is_nil(), false);
            }
            KeyForm::Variable => {
                if !value.is_nil() {
                    let record = self.tables.record_mut(id).expect("record vanished");
                    record.set_all = Some(Marker::at(index.span));
                }
            }
        }
    }

    fn apply_remove(&mut self, span: Span, id: RecordId, name: StringId, args: &[&'a Expr<'a>]) {
        let index_form = args
            .get(1)
            .map(|n| normalize_key(n, self.interner, CoerceNumerics::Positional));
        let index_key = match index_form {
            Some(KeyForm::Constant(key)) => Some(key),
            Some(KeyForm::Variable) => {
                // Removing an unknown position may rewrite and read the
                // whole array part.
                if let Some(record) = self.tables.record_mut(id) {
                    record.set_all = Some(Marker::at(span));
                    record.accessed_all = Some(Marker::at(span));
                }
                return;
            }
            None => None,
        };
        let index_int = index_key.map(|k| k.as_integer());
        if let Some(None) = index_int {
            // Constant but not an integer position: a runtime error at
            // worst, an unknown rewrite at best.
            if let Some(record) = self.tables.record_mut(id) {
                record.set_all = Some(Marker::at(span));
                record.accessed_all = Some(Marker::at(span));
            }
            return;
        }
        let index_int = index_int.flatten();

        let loop_external = self.record_is_loop_external(id);
        let Some(record) = self.tables.record(id) else {
            return;
        };
        let imprecise =
            record.set_all.is_some() || !record.maybe_set_keys.is_empty() || loop_external;
        let length = record.max_integer_key();

        if imprecise {
            {
                let record = self.tables.record_mut(id).expect("record vanished");
                record.set_all = Some(Marker::at(span));
                if index_key.is_none() {
                    record.accessed_all = Some(Marker::at(span));
                }
            }
            if let Some(key) = index_key {
                self.note_field_access(id, key, span);
            }
            return;
        }

        let position = index_int.unwrap_or(if length == 0 { 1 } else { length });
        let index_span = args.get(1).map(|a| a.span).unwrap_or(span);
        self.note_field_access(id, FieldKey::number(position as f64), index_span);
        if length == 0 || position > length {
            return;
        }

        // Shift the tail down one slot, observing each value the runtime
        // reads and evicting each value it overwrites.
        for slot in position..length {
            let this_key = FieldKey::number(slot as f64);
            let next_key = FieldKey::number((slot + 1) as f64);
            let evicted = self
                .tables
                .record(id)
                .and_then(|r| r.set_keys.get(&this_key))
                .cloned();
            if let Some(old) = &evicted {
                self.warn_unused_set(id, old);
            }
            let next_is_nil = self
                .tables
                .record(id)
                .and_then(|r| r.set_keys.get(&next_key))
                .map_or(true, |e| e.is_nil);
            if let Some(record) = self.tables.record_mut(id) {
                record.accessed_keys.remove(&this_key);
                record.set_keys.insert(
                    this_key,
                    SetEntry {
                        owner: name,
                        key: this_key,
                        span,
                        is_nil: next_is_nil,
                    },
                );
            }
            self.note_field_access(id, next_key, span);
        }

        let last_key = FieldKey::number(length as f64);
        let evicted = self
            .tables
            .record(id)
            .and_then(|r| r.set_keys.get(&last_key))
            .cloned();
        if let Some(old) = &evicted {
            self.warn_unused_set(id, old);
        }
        if let Some(record) = self.tables.record_mut(id) {
            record.accessed_keys.remove(&last_key);
            record.set_keys.insert(
                last_key,
                SetEntry {
                    owner: name,
                    key: last_key,
                    span,
                    is_nil: true,
                },
            );
        }
    }
}
