//! Input data model for the tablelint analysis engine.
//!
//! The engine in `tablelint-core` does not lex, parse, or linearize Lua
//! source. An external frontend produces the values defined here:
//!
//! - [`ast`] — arena-allocated expression trees with resolved variable
//!   bindings.
//! - [`item`] — the per-function linear item sequence (`Local`, `Set`,
//!   `Eval`, `Noop`, `Jump`, `Cjump`) plus lexical-scope and upvalue
//!   metadata.
//! - [`diagnostics`] — the warning records the engine emits and the sink
//!   abstraction it emits them through.
//!
//! Supporting infrastructure lives alongside: [`span`] source ranges,
//! the shared [`string_interner`], and the [`arena`] allocator that owns
//! every expression node.

pub mod arena;
pub mod ast;
pub mod diagnostics;
pub mod item;
pub mod span;
pub mod string_interner;

pub use arena::Arena;
pub use ast::{Binding, BinOp, Expr, ExprKind, TableEntry, UnOp, VarRef};
pub use diagnostics::{
    CollectingWarningSink, FieldRepr, Warning, WarningCode, WarningSink,
};
pub use item::{BlockKind, ClosureScope, Item, LineScope};
pub use span::Span;
pub use string_interner::{StringId, StringInterner};
