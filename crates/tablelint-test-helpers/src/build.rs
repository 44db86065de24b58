//! Hand construction of linear IR.

use std::cell::Cell;
use std::sync::Arc;

use tablelint_ir::arena::Arena;
use tablelint_ir::ast::{BinOp, Expr, ExprKind, TableEntry, UnOp, VarRef};
use tablelint_ir::item::{BlockKind, ClosureScope, Item, LineScope};
use tablelint_ir::span::Span;
use tablelint_ir::string_interner::{StringId, StringInterner};

/// Builds expressions and items against an arena, assigning source
/// positions as it goes: every item constructor finishes the current
/// line, and every expression gets the next column on it.
pub struct IrBuilder<'a> {
    arena: &'a Arena,
    interner: Arc<StringInterner>,
    line: Cell<u32>,
    column: Cell<u32>,
    offset: Cell<u32>,
}

impl<'a> IrBuilder<'a> {
    pub fn new(arena: &'a Arena) -> Self {
        Self::with_interner(arena, Arc::new(StringInterner::new()))
    }

    pub fn with_interner(arena: &'a Arena, interner: Arc<StringInterner>) -> Self {
        IrBuilder {
            arena,
            interner,
            line: Cell::new(1),
            column: Cell::new(1),
            offset: Cell::new(0),
        }
    }

    pub fn interner(&self) -> Arc<StringInterner> {
        self.interner.clone()
    }

    pub fn intern(&self, text: &str) -> StringId {
        self.interner.get_or_intern(text)
    }

    /// Continue on an explicit line (for several-statements-per-line
    /// cases).
    pub fn at_line(&self, line: u32) {
        self.line.set(line);
        self.column.set(1);
    }

    pub fn current_line(&self) -> u32 {
        self.line.get()
    }

    fn next_span(&self) -> Span {
        let column = self.column.get();
        self.column.set(column + 1);
        let start = self.offset.get();
        self.offset.set(start + 2);
        Span::new(start, start + 1, self.line.get(), column)
    }

    fn finish_statement(&self) -> Span {
        let span = self.next_span();
        self.line.set(self.line.get() + 1);
        self.column.set(1);
        span
    }

    fn expr(&self, kind: ExprKind<'a>) -> &'a Expr<'a> {
        self.arena.alloc(Expr {
            kind,
            span: self.next_span(),
        })
    }

    // Expressions

    pub fn num(&self, value: f64) -> &'a Expr<'a> {
        self.expr(ExprKind::Number(value))
    }

    pub fn str_(&self, text: &str) -> &'a Expr<'a> {
        let id = self.intern(text);
        self.expr(ExprKind::Str(id))
    }

    pub fn nil(&self) -> &'a Expr<'a> {
        self.expr(ExprKind::Nil)
    }

    pub fn true_(&self) -> &'a Expr<'a> {
        self.expr(ExprKind::True)
    }

    pub fn dots(&self) -> &'a Expr<'a> {
        self.expr(ExprKind::Dots)
    }

    pub fn func(&self) -> &'a Expr<'a> {
        self.expr(ExprKind::Function)
    }

    /// A local-variable reference.
    pub fn name(&self, name: &str) -> &'a Expr<'a> {
        let id = self.intern(name);
        self.expr(ExprKind::Id(VarRef::local(id)))
    }

    /// A global-variable reference.
    pub fn global(&self, name: &str) -> &'a Expr<'a> {
        let id = self.intern(name);
        self.expr(ExprKind::Id(VarRef::global(id)))
    }

    pub fn index(&self, base: &'a Expr<'a>, key: &'a Expr<'a>) -> &'a Expr<'a> {
        self.expr(ExprKind::Index { base, key })
    }

    /// `base.field`: an index with a string-literal key.
    pub fn field(&self, base: &'a Expr<'a>, name: &str) -> &'a Expr<'a> {
        let key = self.str_(name);
        self.index(base, key)
    }

    pub fn pos(&self, value: &'a Expr<'a>) -> TableEntry<'a> {
        TableEntry::Positional(value)
    }

    pub fn pair(&self, key: &'a Expr<'a>, value: &'a Expr<'a>) -> TableEntry<'a> {
        TableEntry::Pair { key, value }
    }

    pub fn table(&self, entries: &[TableEntry<'a>]) -> &'a Expr<'a> {
        let entries = self.arena.alloc_slice(entries);
        self.expr(ExprKind::Table { entries })
    }

    pub fn call(&self, callee: &'a Expr<'a>, args: &[&'a Expr<'a>]) -> &'a Expr<'a> {
        let args = self.arena.alloc_slice(args);
        self.expr(ExprKind::Call { callee, args })
    }

    /// `receiver:method(args)`
    pub fn invoke(
        &self,
        receiver: &'a Expr<'a>,
        method: &str,
        args: &[&'a Expr<'a>],
    ) -> &'a Expr<'a> {
        let method = self.intern(method);
        let args = self.arena.alloc_slice(args);
        self.expr(ExprKind::Invoke {
            receiver,
            method,
            args,
        })
    }

    pub fn binary(&self, op: BinOp, lhs: &'a Expr<'a>, rhs: &'a Expr<'a>) -> &'a Expr<'a> {
        self.expr(ExprKind::Binary { op, lhs, rhs })
    }

    pub fn and_(&self, lhs: &'a Expr<'a>, rhs: &'a Expr<'a>) -> &'a Expr<'a> {
        self.binary(BinOp::And, lhs, rhs)
    }

    pub fn or_(&self, lhs: &'a Expr<'a>, rhs: &'a Expr<'a>) -> &'a Expr<'a> {
        self.binary(BinOp::Or, lhs, rhs)
    }

    pub fn len(&self, operand: &'a Expr<'a>) -> &'a Expr<'a> {
        self.expr(ExprKind::Unary {
            op: UnOp::Len,
            operand,
        })
    }

    pub fn paren(&self, inner: &'a Expr<'a>) -> &'a Expr<'a> {
        self.expr(ExprKind::Paren(inner))
    }

    // Items

    pub fn local_(&self, lhs: &[&'a Expr<'a>], rhs: &[&'a Expr<'a>]) -> Item<'a> {
        self.local_with_closures(lhs, rhs, Vec::new())
    }

    pub fn local_with_closures(
        &self,
        lhs: &[&'a Expr<'a>],
        rhs: &[&'a Expr<'a>],
        closures: Vec<ClosureScope>,
    ) -> Item<'a> {
        Item::Local {
            lhs: lhs.to_vec(),
            rhs: rhs.to_vec(),
            closures,
            span: self.finish_statement(),
        }
    }

    pub fn set(&self, lhs: &[&'a Expr<'a>], rhs: &[&'a Expr<'a>]) -> Item<'a> {
        self.set_with_closures(lhs, rhs, Vec::new())
    }

    pub fn set_with_closures(
        &self,
        lhs: &[&'a Expr<'a>],
        rhs: &[&'a Expr<'a>],
        closures: Vec<ClosureScope>,
    ) -> Item<'a> {
        Item::Set {
            lhs: lhs.to_vec(),
            rhs: rhs.to_vec(),
            closures,
            span: self.finish_statement(),
        }
    }

    pub fn eval(&self, expr: &'a Expr<'a>) -> Item<'a> {
        self.eval_with_closures(expr, Vec::new())
    }

    pub fn eval_with_closures(&self, expr: &'a Expr<'a>, closures: Vec<ClosureScope>) -> Item<'a> {
        Item::Eval {
            expr,
            closures,
            span: self.finish_statement(),
        }
    }

    fn noop(&self, kind: BlockKind, scope_end: bool, is_else: bool) -> Item<'a> {
        Item::Noop {
            kind,
            scope_end,
            is_else,
            span: self.finish_statement(),
        }
    }

    pub fn open(&self, kind: BlockKind) -> Item<'a> {
        self.noop(kind, false, false)
    }

    pub fn close(&self, kind: BlockKind) -> Item<'a> {
        self.noop(kind, true, false)
    }

    pub fn if_open(&self) -> Item<'a> {
        self.noop(BlockKind::If, false, false)
    }

    pub fn else_open(&self) -> Item<'a> {
        self.noop(BlockKind::If, false, true)
    }

    pub fn if_close(&self) -> Item<'a> {
        self.noop(BlockKind::If, true, false)
    }

    pub fn ret(&self) -> Item<'a> {
        self.noop(BlockKind::Return, false, false)
    }

    pub fn label(&self) -> Item<'a> {
        self.noop(BlockKind::Label, false, false)
    }

    pub fn goto_(&self) -> Item<'a> {
        self.noop(BlockKind::Goto, false, false)
    }

    pub fn jump(&self, to: usize) -> Item<'a> {
        Item::Jump { to }
    }

    pub fn cjump(&self, to: usize) -> Item<'a> {
        Item::Cjump { to }
    }

    /// Assemble a full `if`/`elseif`/`else` construct whose first item
    /// will sit at `start`.
    ///
    /// Each conditional branch expands to
    /// `Eval(cond); Cjump(next); If-open; body…; Jump(join); If-close`,
    /// the else branch to `Else-open; body…; Jump(join); If-close`, with
    /// `join` one past the construct, the layout the engine's merge
    /// logic expects from the linearizer.
    pub fn if_stmt(
        &self,
        start: usize,
        branches: Vec<(&'a Expr<'a>, Vec<Item<'a>>)>,
        else_body: Option<Vec<Item<'a>>>,
    ) -> Vec<Item<'a>> {
        assert!(!branches.is_empty(), "if needs at least one branch");
        let branch_len = |body: &Vec<Item<'a>>| body.len() + 5;
        let else_len = |body: &Vec<Item<'a>>| body.len() + 3;

        let mut total = 0usize;
        for (_, body) in &branches {
            total += branch_len(body);
        }
        if let Some(body) = &else_body {
            total += else_len(body);
        }
        let join = start + total;

        let mut items = Vec::with_capacity(total);
        let branch_count = branches.len();
        let mut cursor = start;
        for (branch_index, (cond, body)) in branches.into_iter().enumerate() {
            let this_len = branch_len(&body);
            let last_conditional = branch_index + 1 == branch_count;
            // Condition false: fall to the next branch, or past
            // everything when nothing follows.
            let on_false = if last_conditional && else_body.is_none() {
                join
            } else {
                cursor + this_len
            };
            items.push(self.eval(cond));
            items.push(self.cjump(on_false));
            items.push(self.if_open());
            items.extend(body);
            items.push(self.jump(join));
            items.push(self.if_close());
            cursor += this_len;
        }
        if let Some(body) = else_body {
            items.push(self.else_open());
            items.extend(body);
            items.push(self.jump(join));
            items.push(self.if_close());
        }
        debug_assert_eq!(start + items.len(), join);
        items
    }

    /// Wrap items into a line scope.
    pub fn line_scope(&self, items: Vec<Item<'a>>) -> LineScope<'a> {
        LineScope::new(items, Span::new(0, self.offset.get(), 1, 1))
    }

    /// A closure triple for attaching to an item.
    pub fn closure(
        &self,
        accessed: &[&str],
        set: &[&str],
        mutated: &[&str],
    ) -> ClosureScope {
        ClosureScope {
            accessed_upvalues: accessed.iter().map(|n| self.intern(n)).collect(),
            set_upvalues: set.iter().map(|n| self.intern(n)).collect(),
            mutated_upvalues: mutated.iter().map(|n| self.intern(n)).collect(),
            children: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_advance_per_statement() {
        let arena = Arena::new();
        let b = IrBuilder::new(&arena);
        let x = b.name("x");
        let first = b.local_(&[x], &[]);
        let y = b.name("y");
        let second = b.local_(&[y], &[]);
        match (first, second) {
            (Item::Local { span: s1, .. }, Item::Local { span: s2, .. }) => {
                assert_eq!(s1.line, 1);
                assert_eq!(s2.line, 2);
            }
            _ => unreachable!(),
        }
        assert_eq!(x.span.line, 1);
        assert_eq!(y.span.line, 2);
    }

    #[test]
    fn test_columns_distinguish_expressions() {
        let arena = Arena::new();
        let b = IrBuilder::new(&arena);
        let a = b.name("a");
        let c = b.name("c");
        assert_eq!(a.span.line, c.span.line);
        assert!(a.span.column < c.span.column);
    }

    #[test]
    fn test_if_stmt_layout() {
        let arena = Arena::new();
        let b = IrBuilder::new(&arena);
        let cond = b.global("cond");
        let body = vec![b.eval(b.global("f"))];
        let items = b.if_stmt(0, vec![(cond, body)], None);
        assert_eq!(items.len(), 6);
        // Eval, Cjump(join), If-open, body, Jump(join), If-close
        assert!(matches!(items[1], Item::Cjump { to: 6 }));
        assert!(matches!(items[4], Item::Jump { to: 6 }));
        assert!(matches!(
            items[5],
            Item::Noop {
                kind: BlockKind::If,
                scope_end: true,
                ..
            }
        ));
    }

    #[test]
    fn test_if_else_layout() {
        let arena = Arena::new();
        let b = IrBuilder::new(&arena);
        let cond = b.global("cond");
        let then_body = vec![b.eval(b.global("f"))];
        let else_body = vec![b.eval(b.global("g"))];
        let items = b.if_stmt(2, vec![(cond, then_body)], Some(else_body));
        assert_eq!(items.len(), 10);
        let join = 2 + 10;
        // Condition false jumps to the else opener.
        assert!(matches!(items[1], Item::Cjump { to } if to == 2 + 6));
        assert!(matches!(items[4], Item::Jump { to } if to == join));
        assert!(matches!(
            items[6],
            Item::Noop {
                kind: BlockKind::If,
                scope_end: false,
                is_else: true,
                ..
            }
        ));
        assert!(matches!(items[8], Item::Jump { to } if to == join));
    }
}
