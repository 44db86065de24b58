//! The per-function dataflow engine.
//!
//! One [`checker::Checker`] is built per analyzed line scope and walks
//! its items exactly once. The modules form a small dependency chain:
//!
//! ```text
//! keys (pure)
//!  └─> state (table records, §-style transitions, warning policy)
//!       ├─> builtins (stdlib catalogue + table.* / pairs models)
//!       ├─> walker   (expression traversal: accesses + escapes)
//!       ├─> transfer (Local/Set/Eval statements)
//!       ├─> scope    (lexical scopes, branch merging, loops, give-up)
//!       └─> external (closure/parameter reference tracking)
//!            └─> checker (driver + public Analyzer)
//! ```
//!
//! All engine state uses `StringId` names, `Span` copies, and slot ids —
//! never `&'arena` references — so the abstract state is decoupled from
//! the IR arena's lifetime.

pub mod builtins;
pub mod checker;
pub mod external;
pub mod keys;
pub mod scope;
pub mod state;
pub mod transfer;
pub mod walker;

pub use builtins::StdCatalog;
pub use checker::Analyzer;
pub use keys::FieldKey;
