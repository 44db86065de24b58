//! The linear item IR.
//!
//! A frontend linearizes each function (and the file-level chunk) into
//! an ordered item sequence. Control flow is reduced to `Jump`/`Cjump`
//! plus `Noop` markers that open and close lexical blocks; everything
//! that evaluates expressions is a `Local`, `Set`, or `Eval`.
//!
//! Contract with the linearizer (tests in this workspace are written
//! against it, and the engine panics on violations rather than guessing):
//!
//! - Items are 0-indexed; `Jump`/`Cjump::to` index the same sequence and
//!   may equal `items.len()` (jump past the end).
//! - `Cjump` carries no expression. The condition is evaluated by an
//!   `Eval` emitted immediately before it.
//! - `return e1, e2` is lowered to `Eval(e1); Eval(e2); Noop(Return)`.
//! - Every `if`/`elseif`/`else` branch body ends with a `Jump` to the
//!   join index (one past the construct) immediately before the branch's
//!   closing `Noop { kind: If, scope_end: true }`.
//! - An item that contains function literals carries one
//!   [`ClosureScope`] per literal, in source order.

use crate::ast::Expr;
use crate::span::Span;
use crate::string_interner::StringId;

/// Which syntactic block a `Noop` item opens or closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Do,
    If,
    While,
    Fornum,
    Forin,
    Repeat,
    Label,
    Goto,
    Return,
}

impl BlockKind {
    /// Blocks whose bodies may execute repeatedly.
    pub fn is_loop(self) -> bool {
        matches!(
            self,
            BlockKind::While | BlockKind::Fornum | BlockKind::Forin | BlockKind::Repeat
        )
    }
}

/// Upvalue metadata for one function literal: which variables of the
/// enclosing function(s) the closure reads, assigns, or mutates through.
/// Nested literals report recursively via `children`.
#[derive(Debug, Clone, Default)]
pub struct ClosureScope {
    pub accessed_upvalues: Vec<StringId>,
    pub set_upvalues: Vec<StringId>,
    pub mutated_upvalues: Vec<StringId>,
    pub children: Vec<ClosureScope>,
}

/// One item of the linear IR.
#[derive(Debug, Clone)]
pub enum Item<'a> {
    /// `local lhs... = rhs...`
    Local {
        lhs: Vec<&'a Expr<'a>>,
        rhs: Vec<&'a Expr<'a>>,
        closures: Vec<ClosureScope>,
        span: Span,
    },
    /// `lhs... = rhs...`
    Set {
        lhs: Vec<&'a Expr<'a>>,
        rhs: Vec<&'a Expr<'a>>,
        closures: Vec<ClosureScope>,
        span: Span,
    },
    /// An expression evaluated for effect (calls, conditions, returned
    /// values).
    Eval {
        expr: &'a Expr<'a>,
        closures: Vec<ClosureScope>,
        span: Span,
    },
    /// A block boundary or other control marker carrying no evaluation.
    Noop {
        kind: BlockKind,
        scope_end: bool,
        /// Set on the opener of a final `else` branch.
        is_else: bool,
        span: Span,
    },
    /// Unconditional jump.
    Jump { to: usize },
    /// Conditional jump; the condition was evaluated by the preceding
    /// `Eval`.
    Cjump { to: usize },
}

impl<'a> Item<'a> {
    /// Closure metadata attached to this item, if any.
    pub fn closures(&self) -> &[ClosureScope] {
        match self {
            Item::Local { closures, .. }
            | Item::Set { closures, .. }
            | Item::Eval { closures, .. } => closures,
            _ => &[],
        }
    }
}

/// A linearized function (or file-level chunk): the unit the engine
/// analyzes. Nested function bodies are separate `LineScope`s; only
/// their upvalue triples surface here, attached to the items that
/// contain the literals.
#[derive(Debug, Default)]
pub struct LineScope<'a> {
    pub items: Vec<Item<'a>>,
    /// Parameter names, in declaration order.
    pub parameters: Vec<StringId>,
    /// Variables of *enclosing* functions that this scope assigns.
    pub set_upvalues: Vec<StringId>,
    /// Source span of the whole function.
    pub span: Span,
}

impl<'a> LineScope<'a> {
    pub fn new(items: Vec<Item<'a>>, span: Span) -> Self {
        LineScope {
            items,
            parameters: Vec::new(),
            set_upvalues: Vec::new(),
            span,
        }
    }
}
