//! Key canonicalization.
//!
//! Table state is keyed by [`FieldKey`]: the canonical form of a
//! constant key expression. Numeric keys compare by value (`t[1]` and
//! `t[1.0]` are the same slot, `-0.0` folds onto `0.0`); string keys
//! compare by interned id (`t["1"]` and `t[1]` stay distinct, as they do
//! at runtime). Anything non-constant has no canonical form and is
//! represented by the whole-table markers instead.
//!
//! `table.insert`/`table.remove` coerce numeric-string positions to
//! numbers before indexing; [`CoerceNumerics::Positional`] reproduces
//! that.

use std::hash::{Hash, Hasher};

use tablelint_ir::ast::{Expr, ExprKind};
use tablelint_ir::diagnostics::FieldRepr;
use tablelint_ir::string_interner::StringInterner;

/// Canonical identity of a constant table key.
#[derive(Debug, Clone, Copy)]
pub enum FieldKey {
    Number(f64),
    Str(tablelint_ir::StringId),
}

impl FieldKey {
    /// Numeric key with `-0.0` canonicalized.
    pub fn number(n: f64) -> Self {
        FieldKey::Number(if n == 0.0 { 0.0 } else { n })
    }

    /// The key's value when it is an integral number.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldKey::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldKey::Number(_))
    }

    /// Rendering for warning records.
    pub fn repr(&self, interner: &StringInterner) -> FieldRepr {
        match self {
            FieldKey::Number(n) => FieldRepr::Number(*n),
            FieldKey::Str(id) => FieldRepr::Str(interner.resolve(*id)),
        }
    }
}

impl PartialEq for FieldKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldKey::Number(a), FieldKey::Number(b)) => a.to_bits() == b.to_bits(),
            (FieldKey::Str(a), FieldKey::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for FieldKey {}

impl Hash for FieldKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            FieldKey::Number(n) => {
                state.write_u8(0);
                state.write_u64(n.to_bits());
            }
            FieldKey::Str(id) => {
                state.write_u8(1);
                id.hash(state);
            }
        }
    }
}

/// Whether numeric-string keys coerce to numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoerceNumerics {
    /// Ordinary indexing: `t["1"]` is a string key.
    No,
    /// `table.insert` / `table.remove` positions: `"1"` means slot 1.
    Positional,
}

/// Result of normalizing a key expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyForm {
    Constant(FieldKey),
    /// Not a compile-time constant; tracked through whole-table markers.
    Variable,
}

/// Canonicalize a key expression.
pub fn normalize_key(
    expr: &Expr<'_>,
    interner: &StringInterner,
    coerce: CoerceNumerics,
) -> KeyForm {
    match expr.kind {
        ExprKind::Number(n) => KeyForm::Constant(FieldKey::number(n)),
        ExprKind::Str(id) => {
            if coerce == CoerceNumerics::Positional {
                if let Some(n) = parse_lua_number(&interner.resolve(id)) {
                    return KeyForm::Constant(FieldKey::number(n));
                }
            }
            KeyForm::Constant(FieldKey::Str(id))
        }
        ExprKind::Paren(inner) => normalize_key(inner, interner, coerce),
        _ => KeyForm::Variable,
    }
}

/// Numeric interpretation of a string, the way Lua's coercion reads it.
/// Returns `None` for anything that is not a finite number.
fn parse_lua_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value = if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()? as f64
    } else {
        trimmed.parse::<f64>().ok()?
    };
    value.is_finite().then_some(value)
}
