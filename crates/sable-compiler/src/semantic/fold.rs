//! Constant folding.
//!
//! The per-operator arithmetic lives in pure functions with pinned-down
//! integer semantics: 32-bit two's-complement, wrapping on overflow except
//! for the two division hazards, arithmetic `>>`, logical `>>>`, and `<<`
//! promised to behave modulo 2^32.

use thiserror::Error;

use crate::ast::nodes::{BinOp, LogicalOp, UnaryOp};
use crate::semantic::value::cell;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FoldError {
    #[error("division by zero")]
    DivByZero,
    #[error("integer overflow on division")]
    Overflow,
}

/// Fold an arithmetic, bitwise, or comparison operator over two constants.
/// Assignment operators never reach this function.
pub fn fold_binary(op: BinOp, left: cell, right: cell) -> Result<cell, FoldError> {
    debug_assert!(!op.is_assign());
    let v = match op {
        BinOp::Mul => left.wrapping_mul(right),
        BinOp::Div | BinOp::Mod => {
            if right == 0 {
                return Err(FoldError::DivByZero);
            }
            if left == cell::MIN && right == -1 {
                return Err(FoldError::Overflow);
            }
            if op == BinOp::Div {
                left.wrapping_div(right)
            } else {
                left.wrapping_rem(right)
            }
        }
        BinOp::Add => left.wrapping_add(right),
        BinOp::Sub => left.wrapping_sub(right),
        BinOp::Shl => left.wrapping_shl(right as u32),
        BinOp::Shr => left.wrapping_shr(right as u32),
        BinOp::ShrU => (left as u32).wrapping_shr(right as u32) as cell,
        BinOp::BitAnd => left & right,
        BinOp::BitXor => left ^ right,
        BinOp::BitOr => left | right,
        BinOp::Eq => (left == right) as cell,
        BinOp::Ne => (left != right) as cell,
        BinOp::Lt => (left < right) as cell,
        BinOp::Le => (left <= right) as cell,
        BinOp::Gt => (left > right) as cell,
        BinOp::Ge => (left >= right) as cell,
        _ => unreachable!("assignment operator in constant fold"),
    };
    Ok(v)
}

/// Fold a unary operator over an integer constant. Float negation is
/// tag-aware and handled by the expression checker.
pub fn fold_unary(op: UnaryOp, v: cell) -> cell {
    match op {
        UnaryOp::Invert => !v,
        UnaryOp::Not => (v == 0) as cell,
        UnaryOp::Neg => v.wrapping_neg(),
    }
}

pub fn fold_logical(op: LogicalOp, left: cell, right: cell) -> cell {
    match op {
        LogicalOp::And => (left != 0 && right != 0) as cell,
        LogicalOp::Or => (left != 0 || right != 0) as cell,
    }
}

/// Negate a float stored as IEEE-754 bits in a cell.
pub fn negate_float_cell(v: cell) -> cell {
    (-f32::from_bits(v as u32)).to_bits() as cell
}

use sable_common::codes;

use crate::ast::nodes::{Expr, ExprKind};
use crate::semantic::analyzer::Analyzer;
use crate::semantic::value::{Ident, Tag, Value};

impl<'a> Analyzer<'a> {
    /// Evaluate an already-checked expression as a compile-time constant,
    /// caching the result in its value descriptor.
    pub(crate) fn eval_const(&mut self, expr: &mut Expr) -> Option<(cell, Tag)> {
        if expr.val.ident != Ident::Constant && !self.fold_to_constant(expr) {
            return None;
        }
        debug_assert_eq!(expr.val.ident, Ident::Constant);
        Some((expr.val.constval, expr.val.tag))
    }

    /// Both operand types must be native integers or enums; user operators
    /// and non-foldable tags make an expression opaque.
    fn binary_foldable(&self, tag: Tag) -> bool {
        tag == Tag::INT || self.cc.types.get(tag).is_enum()
    }

    fn fold_to_constant(&mut self, expr: &mut Expr) -> bool {
        let pos = expr.pos;
        let folded: Option<Value> = match &mut expr.kind {
            ExprKind::Symbol { sym } => {
                let s = &self.cc.symbols[*sym];
                (s.ident == Ident::Constant).then(|| Value::constant(s.addr, s.tag))
            }
            ExprKind::Unary { op, expr: inner } => {
                let op = *op;
                let float_tag = self.cc.types.tag_float();
                self.eval_const(inner).map(|(v, tag)| {
                    let out = if op == UnaryOp::Neg && tag == float_tag {
                        negate_float_cell(v)
                    } else {
                        fold_unary(op, v)
                    };
                    let out_tag = if op == UnaryOp::Not {
                        self.cc.types.tag_bool()
                    } else {
                        tag
                    };
                    Value::constant(out, out_tag)
                })
            }
            ExprKind::Binary(b) => {
                if b.op.is_assign() || b.userop.is_some() {
                    return false;
                }
                let Some(oper) = b.op.oper() else { return false };
                let Some((lv, lt)) = self.eval_const(&mut b.left) else {
                    return false;
                };
                let Some((rv, _)) = self.eval_const(&mut b.right) else {
                    return false;
                };
                let rt = b.right.val.tag;
                if !self.binary_foldable(lt) || !self.binary_foldable(rt) {
                    return false;
                }
                match fold_binary(oper, lv, rv) {
                    Ok(v) => {
                        let tag = if b.op.yields_bool() {
                            self.cc.types.tag_bool()
                        } else {
                            lt
                        };
                        Some(Value::constant(v, tag))
                    }
                    Err(FoldError::DivByZero) => {
                        self.report(codes::DIVIDE_BY_ZERO, pos, "division by zero");
                        None
                    }
                    Err(FoldError::Overflow) => {
                        self.report(codes::INTEGER_OVERFLOW, pos, "integer overflow on division");
                        None
                    }
                }
            }
            ExprKind::Ternary {
                first,
                second,
                third,
            } => {
                // All three operands must fold.
                let Some((cond, _)) = self.eval_const(first) else {
                    return false;
                };
                let Some((lv, lt)) = self.eval_const(second) else {
                    return false;
                };
                let Some((rv, rt)) = self.eval_const(third) else {
                    return false;
                };
                let (v, tag) = if cond != 0 { (lv, lt) } else { (rv, rt) };
                Some(Value::constant(v, tag))
            }
            ExprKind::ChainedCompare { first, ops } => {
                if ops.iter().any(|op| op.userop.is_some()) {
                    return false;
                }
                let Some((mut left, _)) = self.eval_const(first) else {
                    return false;
                };
                let mut result = true;
                for link in ops.iter_mut() {
                    let Some((right, _)) = self.eval_const(&mut link.expr) else {
                        return false;
                    };
                    let v = fold_binary(link.op, left, right)
                        .expect("comparisons cannot fail to fold");
                    result &= v != 0;
                    left = right;
                }
                Some(Value::constant(result as cell, self.cc.types.tag_bool()))
            }
            _ => None,
        };

        match folded {
            Some(val) => {
                expr.val = val;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_wraps() {
        assert_eq!(fold_binary(BinOp::Add, cell::MAX, 1), Ok(cell::MIN));
        assert_eq!(fold_binary(BinOp::Mul, 0x4000_0000, 4), Ok(0));
        assert_eq!(fold_binary(BinOp::Sub, cell::MIN, 1), Ok(cell::MAX));
    }

    #[test]
    fn division_hazards() {
        assert_eq!(fold_binary(BinOp::Div, 1, 0), Err(FoldError::DivByZero));
        assert_eq!(fold_binary(BinOp::Mod, 1, 0), Err(FoldError::DivByZero));
        assert_eq!(fold_binary(BinOp::Div, cell::MIN, -1), Err(FoldError::Overflow));
        assert_eq!(fold_binary(BinOp::Mod, cell::MIN, -1), Err(FoldError::Overflow));
        assert_eq!(fold_binary(BinOp::Div, 7, 2), Ok(3));
        assert_eq!(fold_binary(BinOp::Mod, -7, 2), Ok(-1));
    }

    #[test]
    fn shifts() {
        assert_eq!(fold_binary(BinOp::Shl, 1, 4), Ok(16));
        // Arithmetic right shift keeps the sign.
        assert_eq!(fold_binary(BinOp::Shr, -8, 1), Ok(-4));
        // Logical right shift does not.
        assert_eq!(fold_binary(BinOp::ShrU, -8, 1), Ok(0x7FFF_FFFC));
    }

    #[test]
    fn comparisons_yield_cells() {
        assert_eq!(fold_binary(BinOp::Lt, 1, 2), Ok(1));
        assert_eq!(fold_binary(BinOp::Ge, 1, 2), Ok(0));
        assert_eq!(fold_binary(BinOp::Eq, 3, 3), Ok(1));
    }

    #[test]
    fn unary_ops() {
        assert_eq!(fold_unary(UnaryOp::Invert, 0), -1);
        assert_eq!(fold_unary(UnaryOp::Not, 0), 1);
        assert_eq!(fold_unary(UnaryOp::Not, 5), 0);
        assert_eq!(fold_unary(UnaryOp::Neg, 5), -5);
        assert_eq!(fold_unary(UnaryOp::Neg, cell::MIN), cell::MIN);
    }

    #[test]
    fn logical_ops() {
        assert_eq!(fold_logical(LogicalOp::And, 2, 3), 1);
        assert_eq!(fold_logical(LogicalOp::And, 2, 0), 0);
        assert_eq!(fold_logical(LogicalOp::Or, 0, 0), 0);
        assert_eq!(fold_logical(LogicalOp::Or, 0, 9), 1);
    }

    #[test]
    fn float_negation_flips_sign_bit() {
        let bits = 1.5f32.to_bits() as cell;
        let neg = negate_float_cell(bits);
        assert_eq!(f32::from_bits(neg as u32), -1.5);
    }
}
