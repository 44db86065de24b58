//! External reference tracking.
//!
//! A tracked table stops being private to this function's straight-line
//! text once a nested closure can reach it. The frontend classifies each
//! closure's upvalues into accessed/set/mutated; this module folds those
//! triples into per-function name sets as the closures appear, so that a
//! later call — which may invoke any closure defined so far — can
//! invalidate exactly the tables it might touch.
//!
//! Parameters are in the accessed and mutated sets from the start: a
//! caller handed them in and may hold other references.

use rustc_hash::FxHashSet;

use tablelint_ir::item::{ClosureScope, LineScope};
use tablelint_ir::span::Span;
use tablelint_ir::string_interner::StringId;

use super::checker::Checker;
use super::state::Marker;

/// Name sets describing which locals the outside world can observe.
#[derive(Debug, Default)]
pub struct ExternalRefs {
    pub accessed: FxHashSet<StringId>,
    pub set: FxHashSet<StringId>,
    pub mutated: FxHashSet<StringId>,
}

impl ExternalRefs {
    /// Seed from the function's own header: parameters, and any upvalue
    /// this function assigns in an enclosing scope.
    pub fn seed(line: &LineScope<'_>) -> Self {
        let mut refs = ExternalRefs::default();
        for &param in &line.parameters {
            refs.accessed.insert(param);
            refs.mutated.insert(param);
        }
        for &name in &line.set_upvalues {
            refs.accessed.insert(name);
            refs.set.insert(name);
            refs.mutated.insert(name);
        }
        refs
    }

    /// Fold one closure's upvalue triples, recursively: a closure nested
    /// inside a closure still reaches this function's locals.
    pub fn fold(&mut self, closure: &ClosureScope) {
        self.accessed.extend(closure.accessed_upvalues.iter().copied());
        self.set.extend(closure.set_upvalues.iter().copied());
        self.mutated.extend(closure.mutated_upvalues.iter().copied());
        for child in &closure.children {
            self.fold(child);
        }
    }

    pub fn fold_all(&mut self, closures: &[ClosureScope]) {
        for closure in closures {
            self.fold(closure);
        }
    }
}

impl<'a, 'i> Checker<'a, 'i> {
    /// A call into unknown code ran: every tracked table the outside
    /// world can reach may have been read or rewritten. Markers only:
    /// the record stays tracked, since later field operations on it are
    /// still meaningful.
    pub(crate) fn invalidate_after_call(&mut self, span: Span) {
        for name in self.tables.bound_names() {
            let externally_read = self.external.accessed.contains(&name);
            let externally_written = externally_read
                || self.external.mutated.contains(&name)
                || self.external.set.contains(&name);
            if !externally_written {
                continue;
            }
            let Some(id) = self.tables.lookup(name) else {
                continue;
            };
            let Some(record) = self.tables.record_mut(id) else {
                continue;
            };
            record.set_all = Some(Marker::at(span));
            if externally_read {
                record.accessed_all = Some(Marker::at(span));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablelint_ir::string_interner::StringInterner;

    #[test]
    fn test_seed_marks_parameters() {
        let interner = StringInterner::new();
        let p = interner.get_or_intern("p");
        let mut line = LineScope::new(Vec::new(), Span::dummy());
        line.parameters.push(p);

        let refs = ExternalRefs::seed(&line);
        assert!(refs.accessed.contains(&p));
        assert!(refs.mutated.contains(&p));
        assert!(!refs.set.contains(&p));
    }

    #[test]
    fn test_seed_marks_set_upvalues_fully() {
        let interner = StringInterner::new();
        let u = interner.get_or_intern("u");
        let mut line = LineScope::new(Vec::new(), Span::dummy());
        line.set_upvalues.push(u);

        let refs = ExternalRefs::seed(&line);
        assert!(refs.accessed.contains(&u));
        assert!(refs.set.contains(&u));
        assert!(refs.mutated.contains(&u));
    }

    #[test]
    fn test_fold_recurses_into_children() {
        let interner = StringInterner::new();
        let t = interner.get_or_intern("t");
        let inner = ClosureScope {
            accessed_upvalues: vec![t],
            ..ClosureScope::default()
        };
        let outer = ClosureScope {
            children: vec![inner],
            ..ClosureScope::default()
        };

        let mut refs = ExternalRefs::default();
        refs.fold(&outer);
        assert!(refs.accessed.contains(&t));
    }
}
