//! The type rules.
//!
//! Conversions are asymmetric: in a relation the integer side converts to the
//! other side's type, while in an assignment the destination type wins.

use super::{symbol::ValueType, token::TokenKind};

/// A representation change applied to a scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Coercion {
    Identity,
    IntToFloat,
    /// Non-zero test.
    IntToBool,
    BoolToInt,
    FloatToInt,
}

impl Coercion {
    /// The coercion turning `from` into `to` when the destination wins.
    pub const fn assign(to: ValueType, from: ValueType) -> Option<Coercion> {
        use ValueType::*;
        Some(match (to, from) {
            (Int, Int) | (Float, Float) | (Bool, Bool) | (String, String) => Coercion::Identity,
            (Int, Bool) => Coercion::BoolToInt,
            (Int, Float) => Coercion::FloatToInt,
            (Float, Int) => Coercion::IntToFloat,
            (Bool, Int) => Coercion::IntToBool,
            _ => return None,
        })
    }

    /// The coercion of an `if` or `for` condition to bool.
    pub const fn condition(ty: ValueType) -> Option<Coercion> {
        match ty {
            ValueType::Bool => Some(Coercion::Identity),
            ValueType::Int => Some(Coercion::IntToBool),
            _ => None,
        }
    }
}

/// How the two operands of a binary operator are brought to a common type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operands {
    pub lhs: Coercion,
    pub rhs: Coercion,
    /// The operand type after coercion.
    pub ty: ValueType,
}

impl Operands {
    const fn same(ty: ValueType) -> Self {
        Operands {
            lhs: Coercion::Identity,
            rhs: Coercion::Identity,
            ty,
        }
    }

    const fn convert_lhs(lhs: Coercion, ty: ValueType) -> Self {
        Operands {
            lhs,
            rhs: Coercion::Identity,
            ty,
        }
    }

    const fn convert_rhs(rhs: Coercion, ty: ValueType) -> Self {
        Operands {
            lhs: Coercion::Identity,
            rhs,
            ty,
        }
    }

    /// The result type of the operator applied to these operands.
    pub const fn result(self, op: TokenKind) -> ValueType {
        if is_relational(op) {
            ValueType::Bool
        } else {
            self.ty
        }
    }
}

pub const fn is_relational(op: TokenKind) -> bool {
    matches!(
        op,
        TokenKind::Lt
            | TokenKind::LtEq
            | TokenKind::Gt
            | TokenKind::GtEq
            | TokenKind::Eq
            | TokenKind::NotEq
    )
}

pub const fn is_arithmetic(op: TokenKind) -> bool {
    matches!(
        op,
        TokenKind::Add | TokenKind::Sub | TokenKind::Mul | TokenKind::Div
    )
}

pub const fn is_logical(op: TokenKind) -> bool {
    matches!(op, TokenKind::And | TokenKind::Or)
}

/// Checks the operand types of a binary operator.
pub const fn binary(op: TokenKind, lhs: ValueType, rhs: ValueType) -> Option<Operands> {
    if is_relational(op) {
        relational(op, lhs, rhs)
    } else if is_arithmetic(op) {
        arithmetic(lhs, rhs)
    } else if is_logical(op) {
        logical(lhs, rhs)
    } else {
        None
    }
}

const fn relational(op: TokenKind, lhs: ValueType, rhs: ValueType) -> Option<Operands> {
    use ValueType::*;
    Some(match (lhs, rhs) {
        (Int, Int) | (Float, Float) | (Bool, Bool) => Operands::same(lhs),
        (Int, Bool) => Operands::convert_lhs(Coercion::IntToBool, Bool),
        (Bool, Int) => Operands::convert_rhs(Coercion::IntToBool, Bool),
        (Int, Float) => Operands::convert_lhs(Coercion::IntToFloat, Float),
        (Float, Int) => Operands::convert_rhs(Coercion::IntToFloat, Float),
        (String, String) if matches!(op, TokenKind::Eq | TokenKind::NotEq) => {
            Operands::same(String)
        }
        _ => return None,
    })
}

const fn arithmetic(lhs: ValueType, rhs: ValueType) -> Option<Operands> {
    use ValueType::*;
    Some(match (lhs, rhs) {
        (Int, Int) | (Float, Float) => Operands::same(lhs),
        (Int, Float) => Operands::convert_lhs(Coercion::IntToFloat, Float),
        (Float, Int) => Operands::convert_rhs(Coercion::IntToFloat, Float),
        _ => return None,
    })
}

const fn logical(lhs: ValueType, rhs: ValueType) -> Option<Operands> {
    use ValueType::*;
    match (lhs, rhs) {
        (Int, Int) | (Bool, Bool) => Some(Operands::same(lhs)),
        _ => None,
    }
}
