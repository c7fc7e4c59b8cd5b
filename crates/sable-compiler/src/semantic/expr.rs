//! The expression checker.
//!
//! Every arm assigns a value descriptor, may rewrite the node to insert
//! r-value loads or user-operator calls, and may set the l-value bit. The
//! rewrites happen in place so the code generator sees a fully resolved
//! tree.

use sable_common::codes;
use sable_common::span::Span;

use crate::ast::nodes::{
    AnalysisState, BinOp, BinaryExpr, CallExpr, ComputedArg, Expr, ExprKind, FieldAccessExpr,
    FieldAccessKind, SizeofSuffix, UnaryOp, UserOp,
};
use crate::semantic::analyzer::Analyzer;
use crate::semantic::fold::{self, FoldError};
use crate::semantic::operators::{MATCH_COERCE, MATCH_DEDUCE, MATCH_SILENT};
use crate::semantic::scope::ScopeKind;
use crate::semantic::symbols::{ArgInfo, SymbolData, SymbolId, USAGE_READ, USAGE_WRITTEN};
use crate::semantic::value::{cell, Ident, Tag, Value};

/// Hard cap on call arguments; the VM's call frame encodes the count in a
/// single byte alongside flags.
const MAX_CALL_ARGUMENTS: usize = 127;

/// Cells needed to hold a packed string of `chars` characters.
pub(crate) fn char_array_cells(chars: cell) -> cell {
    (chars + 3) / 4
}

impl<'a> Analyzer<'a> {
    pub(crate) fn check_expr(&mut self, expr: &mut Expr) -> bool {
        match &expr.kind {
            ExprKind::Const { .. } => self.check_const(expr),
            ExprKind::StringLit { .. } => self.check_string(expr),
            ExprKind::ArrayLit(_) => self.check_array_lit(expr),
            ExprKind::Null => self.check_null(expr),
            ExprKind::Symbol { .. } => self.check_symbol_expr(expr, false),
            ExprKind::This { .. } => self.check_this(expr),
            ExprKind::Unary { .. } => self.check_unary(expr),
            ExprKind::IncDec(_) => self.check_incdec(expr),
            ExprKind::Binary(_) => self.check_binary(expr),
            ExprKind::Logical { .. } => self.check_logical(expr),
            ExprKind::ChainedCompare { .. } => self.check_chained_compare(expr),
            ExprKind::Ternary { .. } => self.check_ternary(expr),
            ExprKind::Cast { .. } => self.check_cast(expr),
            ExprKind::Index { .. } => self.check_index(expr),
            ExprKind::FieldAccess(_) => self.check_field_access_expr(expr, false),
            ExprKind::Call(_) => self.check_call(expr),
            ExprKind::Sizeof(_) => self.check_sizeof(expr),
            ExprKind::Comma { .. } => self.check_comma(expr),
            ExprKind::NewArray { .. } => {
                // Free-floating ref-array temporaries are not supported.
                self.report(
                    codes::REFARRAY_NOT_ALLOWED,
                    expr.pos,
                    "new-array expressions are only valid as array initializers",
                );
                false
            }
            ExprKind::StructInit { .. } => {
                self.report(
                    codes::INVALID_EXPRESSION,
                    expr.pos,
                    "named-field initializers are only valid on struct declarations",
                );
                false
            }
            // Synthetic nodes are inserted fully analyzed.
            ExprKind::Rvalue(_) | ExprKind::CallUserOp { .. } | ExprKind::DefaultArg { .. } => true,
        }
    }

    // ====================================================================
    // Rewriting helpers
    // ====================================================================

    /// Replace an l-value expression with a synthetic load of its value.
    pub(crate) fn rvalue(&mut self, expr: &mut Expr) {
        debug_assert!(expr.lvalue);
        let mut val = expr.val;
        if val.ident == Ident::Accessor {
            if let Some(m) = val.accessor {
                if let Some(getter) = self.cc.types.method(m).getter {
                    self.cc.symbols.mark_usage(getter, USAGE_READ);
                }
            }
            val.ident = Ident::Expression;
        }
        let pos = expr.pos;
        let inner = std::mem::replace(expr, Expr::new(ExprKind::Null, pos));
        *expr = Expr {
            kind: ExprKind::Rvalue(Box::new(inner)),
            pos,
            val,
            lvalue: false,
            can_alloc_heap: false,
            tree_has_heap_allocs: false,
        };
    }

    /// Replace an expression with a call to a user-defined operator taking
    /// it as operand. User operators never take l-values.
    pub(crate) fn wrap_userop(&mut self, expr: &mut Expr, op: UserOp) {
        if expr.lvalue {
            self.rvalue(expr);
        }
        let pos = expr.pos;
        let inner = std::mem::replace(expr, Expr::new(ExprKind::Null, pos));
        *expr = Expr {
            kind: ExprKind::CallUserOp {
                op,
                expr: Box::new(inner),
            },
            pos,
            val: Value::new(Ident::Expression, op.tag),
            lvalue: false,
            can_alloc_heap: false,
            tree_has_heap_allocs: false,
        };
    }

    // ====================================================================
    // Boolean test positions
    // ====================================================================

    /// Entry point for any expression used as a boolean condition.
    ///
    /// Rejects array values, rewrites through a user-defined `!` as
    /// `!userop(x)` (the emitter folds the double negation back out), and
    /// warns on constant conditions.
    pub(crate) fn analyze_for_test(&mut self, expr: &mut Expr) -> bool {
        if !self.check_expr(expr) {
            return false;
        }
        let val = expr.val;
        if val.ident.is_array_kind() {
            match val.sym {
                Some(sym) => {
                    let name = self.cc.symbols[sym].name.clone();
                    self.report(
                        codes::ARRAY_NOT_INDEXED,
                        expr.pos,
                        format!("array `{name}` must be indexed"),
                    );
                }
                None => self.report(codes::INVALID_EXPRESSION, expr.pos, "invalid expression"),
            }
            return false;
        }

        let bool_tag = self.cc.types.tag_bool();
        if val.tag != Tag::INT && val.tag != bool_tag {
            if let Some(userop) = self.find_userop("!", val.tag, Tag::INT, 1) {
                if expr.lvalue {
                    self.rvalue(expr);
                }
                self.wrap_userop(expr, userop);
                let pos = expr.pos;
                let inner = std::mem::replace(expr, Expr::new(ExprKind::Null, pos));
                *expr = Expr {
                    kind: ExprKind::Unary {
                        op: UnaryOp::Not,
                        expr: Box::new(inner),
                    },
                    pos,
                    val: Value::new(Ident::Expression, bool_tag),
                    lvalue: false,
                    can_alloc_heap: false,
                    tree_has_heap_allocs: false,
                };
                return true;
            }
        }

        if val.ident == Ident::Constant {
            if val.constval != 0 {
                self.report(codes::ALWAYS_TRUE, expr.pos, "condition is always true");
            } else {
                self.report(codes::ALWAYS_FALSE, expr.pos, "condition is always false");
            }
        }

        if expr.lvalue {
            self.rvalue(expr);
        }
        true
    }

    // ====================================================================
    // Leaves
    // ====================================================================

    fn check_const(&mut self, expr: &mut Expr) -> bool {
        let ExprKind::Const { value, tag } = expr.kind else {
            unreachable!()
        };
        expr.val = Value::constant(value, tag);
        true
    }

    fn check_null(&mut self, expr: &mut Expr) -> bool {
        expr.val = Value::constant(0, self.cc.types.tag_null());
        true
    }

    fn check_string(&mut self, expr: &mut Expr) -> bool {
        let ExprKind::StringLit { text } = &expr.kind else {
            unreachable!()
        };
        let mut val = Value::new(Ident::Array, self.cc.types.tag_string());
        // Literal strings encode their size negatively, terminator included.
        val.constval = -((text.chars().count() as cell) + 1);
        expr.val = val;
        true
    }

    fn check_array_lit(&mut self, expr: &mut Expr) -> bool {
        let ExprKind::ArrayLit(exprs) = &mut expr.kind else {
            unreachable!()
        };
        let mut last_tag: Option<Tag> = None;
        let count = exprs.len() as cell;
        let mut failed = None;
        for elem in exprs.iter_mut() {
            if !self.check_expr(elem) {
                return false;
            }
            if elem.val.ident != Ident::Constant {
                failed = Some(elem.pos);
                break;
            }
            match last_tag {
                None => last_tag = Some(elem.val.tag),
                Some(prev) => {
                    self.match_tag(prev, elem.val.tag, 0, elem.pos);
                }
            }
        }
        if let Some(at) = failed {
            self.report(codes::NOT_CONSTANT, at, "must be a constant expression");
            return false;
        }
        let mut val = Value::new(Ident::Array, last_tag.unwrap_or(Tag::INT));
        val.constval = count;
        expr.val = val;
        true
    }

    fn check_this(&mut self, expr: &mut Expr) -> bool {
        let ExprKind::This { sym } = expr.kind else {
            unreachable!()
        };
        let s = &self.cc.symbols[sym];
        debug_assert!(matches!(s.ident, Ident::RefArray | Ident::Variable));
        let mut val = Value::new(s.ident, s.tag);
        val.sym = Some(sym);
        expr.lvalue = s.ident != Ident::RefArray;
        expr.val = val;
        true
    }

    /// Check a symbol reference. Methodmap and enum-struct names are only
    /// permitted when the caller explicitly allows type references, as in
    /// `X.Y` where `X` is a type.
    pub(crate) fn check_symbol_expr(&mut self, expr: &mut Expr, allow_types: bool) -> bool {
        let ExprKind::Symbol { sym } = expr.kind else {
            unreachable!()
        };
        let pos = expr.pos;
        let (name, s_ident, s_tag, s_enumroot, s_addr, s_vclass, s_defined, s_native, s_child) = {
            let s = &self.cc.symbols[sym];
            (
                s.name.clone(),
                s.ident,
                s.tag,
                s.enumroot,
                s.addr,
                s.vclass,
                s.defined,
                s.native,
                s.child,
            )
        };
        let mut val = Value::new(s_ident, s_tag);
        val.sym = Some(sym);

        // Don't expose the tag of old enum roots.
        if s_enumroot
            && s_ident == Ident::Constant
            && !self.cc.types.get(s_tag).is_enum_struct()
        {
            val.tag = Tag::INT;
            self.report(
                codes::TYPE_AS_VALUE,
                pos,
                format!("enumeration `{name}` has no usable value"),
            );
        }

        if s_ident == Ident::Constant {
            val.constval = s_addr;
        }

        if s_vclass == ScopeKind::Global && s_ident != Ident::Function && !s_defined {
            self.report(
                codes::UNDEFINED_SYMBOL,
                pos,
                format!("undefined symbol `{name}`"),
            );
            return false;
        }

        if s_ident == Ident::Function {
            if s_native {
                self.report(
                    codes::INVALID_FUNCTION_REFERENCE,
                    pos,
                    "native functions can only be called directly",
                );
                return false;
            }
            if s_child.is_some() {
                self.report(
                    codes::ARRAY_RETURN_REFERENCE,
                    pos,
                    "cannot take a reference to an array-returning function",
                );
                return false;
            }
            if !s_defined {
                self.report(
                    codes::FUNCTION_NOT_DEFINED,
                    pos,
                    format!("function `{name}` is not implemented"),
                );
                return false;
            }
            // A bare function reference becomes a callable closure. Direct
            // invocations never come through here; mark the indirect use.
            let fe_tag = self.cc.types.function_type_for(&name);
            val.ident = Ident::Expression;
            val.tag = fe_tag;
            self.cc.symbols[sym].callback = true;
        }

        match self.cc.symbols[sym].ident {
            Ident::Variable | Ident::Reference => expr.lvalue = true,
            Ident::Array | Ident::RefArray | Ident::Function | Ident::Constant => {}
            Ident::Methodmap | Ident::EnumStruct => {
                if !allow_types {
                    self.report(
                        codes::TYPE_AS_VALUE,
                        pos,
                        format!("type `{name}` cannot be used as a value"),
                    );
                    return false;
                }
            }
            _ => debug_assert!(false, "unexpected symbol ident"),
        }
        expr.val = val;
        true
    }

    // ====================================================================
    // Operators
    // ====================================================================

    fn check_unary(&mut self, expr: &mut Expr) -> bool {
        let pos = expr.pos;
        let ExprKind::Unary { op, expr: inner } = &mut expr.kind else {
            unreachable!()
        };
        let op = *op;
        if !self.check_expr(inner) {
            return false;
        }
        if inner.lvalue {
            self.rvalue(inner);
        }
        let mut out = inner.val;

        match op {
            UnaryOp::Invert => {
                // Bit inversion only makes sense on integral cells.
                if out.tag != Tag::INT && !self.cc.types.get(out.tag).is_enum() {
                    self.match_tag(Tag::INT, out.tag, MATCH_COERCE, pos);
                }
                if out.ident == Ident::Constant {
                    out.constval = !out.constval;
                }
            }
            UnaryOp::Not => {
                if let Some(userop) = self.find_userop("!", out.tag, Tag::INT, 1) {
                    self.wrap_userop(inner, userop);
                    out = inner.val;
                } else if out.ident == Ident::Constant {
                    out.constval = (out.constval == 0) as cell;
                }
                out.tag = self.cc.types.tag_bool();
            }
            UnaryOp::Neg => {
                if out.ident == Ident::Constant && out.tag == self.cc.types.tag_float() {
                    out.constval = fold::negate_float_cell(out.constval);
                } else if let Some(userop) = self.find_userop("-", out.tag, Tag::INT, 1) {
                    self.wrap_userop(inner, userop);
                    out = inner.val;
                } else if out.ident == Ident::Constant {
                    out.constval = out.constval.wrapping_neg();
                }
            }
        }

        if out.ident != Ident::Constant {
            out.ident = Ident::Expression;
        }
        expr.val = out;
        true
    }

    fn check_incdec(&mut self, expr: &mut Expr) -> bool {
        let pos = expr.pos;
        let ExprKind::IncDec(inc) = &mut expr.kind else {
            unreachable!()
        };
        if !self.check_expr(&mut inc.expr) {
            return false;
        }
        if !inc.expr.lvalue {
            self.report(codes::NOT_LVALUE, pos, "must be an l-value");
            return false;
        }
        let val = inc.expr.val;
        if val.ident != Ident::Accessor {
            let sym = val.sym.expect("l-values carry their symbol");
            if self.cc.symbols[sym].is_const {
                self.report(codes::NOT_LVALUE, pos, "cannot modify a constant");
                return false;
            }
        } else {
            let m = val.accessor.expect("accessor values carry their method");
            let (name, getter, setter) = {
                let method = self.cc.types.method(m);
                (method.name.clone(), method.getter, method.setter)
            };
            let Some(setter) = setter else {
                self.report(
                    codes::PROPERTY_HAS_NO_SETTER,
                    pos,
                    format!("property `{name}` has no setter"),
                );
                return false;
            };
            let Some(getter) = getter else {
                self.report(
                    codes::PROPERTY_HAS_NO_GETTER,
                    pos,
                    format!("property `{name}` has no getter"),
                );
                return false;
            };
            self.cc.symbols.mark_usage(getter, USAGE_READ);
            self.cc.symbols.mark_usage(setter, USAGE_READ);
        }

        let token = inc.op.token();
        inc.userop = self.find_userop(token, val.tag, Tag::INT, 1);
        expr.val = Value::new(Ident::Expression, val.tag);
        true
    }

    fn check_binary(&mut self, expr: &mut Expr) -> bool {
        let pos = expr.pos;
        let ExprKind::Binary(b) = &mut expr.kind else {
            unreachable!()
        };
        if !self.check_expr(&mut b.left) || !self.check_expr(&mut b.right) {
            return false;
        }

        let op = b.op;
        if op.is_assign() {
            // Mark the left-hand side as written as soon as possible.
            if let Some(sym) = b.left.val.sym {
                self.cc.symbols.mark_usage(sym, USAGE_WRITTEN);
                let s = &self.cc.symbols[sym];
                // Writes through an out-parameter are visible to the caller.
                if s.vclass == ScopeKind::Argument
                    && matches!(s.ident, Ident::Reference | Ident::RefArray)
                {
                    self.cc.symbols.mark_usage(sym, USAGE_READ);
                }
                // Track the last write so the never-read warning points at it.
                self.cc.symbols[sym].pos = pos;
            } else if let Some(m) = b.left.val.accessor {
                let (name, getter, setter) = {
                    let method = self.cc.types.method(m);
                    (method.name.clone(), method.getter, method.setter)
                };
                let Some(setter) = setter else {
                    self.report(
                        codes::PROPERTY_HAS_NO_SETTER,
                        pos,
                        format!("property `{name}` has no setter"),
                    );
                    return false;
                };
                self.cc.symbols.mark_usage(setter, USAGE_READ);
                if let Some(getter) = getter {
                    if op != BinOp::Assign {
                        self.cc.symbols.mark_usage(getter, USAGE_READ);
                    }
                }
            }

            if !self.check_assignment_lhs(b, pos) {
                return false;
            }
        } else if b.left.lvalue {
            self.rvalue(&mut b.left);
        }

        // The RHS is always loaded. This happens after LHS validation so
        // assignment checking sees the original view of the right side.
        if b.right.lvalue {
            self.rvalue(&mut b.right);
        }

        let left_val = b.left.val;
        let right_val = b.right.val;
        let oper = op.oper();

        if oper.is_some() {
            if left_val.ident.is_array_kind() {
                let name = self.value_name(&left_val);
                self.report(
                    codes::ARRAY_NOT_INDEXED,
                    pos,
                    format!("array `{name}` must be indexed"),
                );
                return false;
            }
            if right_val.ident.is_array_kind() {
                let name = self.value_name(&right_val);
                self.report(
                    codes::ARRAY_NOT_INDEXED,
                    pos,
                    format!("array `{name}` must be indexed"),
                );
                return false;
            }
        }

        // The assignment operator is overloaded separately.
        if op.is_assign() && !self.check_assignment_rhs(b, pos) {
            return false;
        }

        let mut val = Value::new(Ident::Expression, left_val.tag);
        if let Some(assignop) = b.assignop {
            val.tag = assignop.tag;
        }

        if let Some(oper) = oper {
            if let Some(userop) = self.find_userop(oper.token(), left_val.tag, right_val.tag, 2) {
                val.tag = userop.tag;
                b.userop = Some(userop);
            } else if left_val.ident == Ident::Constant && right_val.ident == Ident::Constant {
                self.match_tag(left_val.tag, right_val.tag, 0, pos);
                match fold::fold_binary(oper, left_val.constval, right_val.constval) {
                    Ok(folded) => {
                        val.ident = Ident::Constant;
                        val.constval = folded;
                    }
                    Err(FoldError::DivByZero) => {
                        self.report(codes::DIVIDE_BY_ZERO, pos, "division by zero")
                    }
                    Err(FoldError::Overflow) => {
                        self.report(codes::INTEGER_OVERFLOW, pos, "integer overflow on division")
                    }
                }
            } else {
                // For tag matching purposes the operand order is irrelevant.
                if !self.checkval_string(&left_val, &right_val) {
                    self.match_tag_commutative(left_val.tag, right_val.tag, MATCH_DEDUCE, pos);
                }
            }

            if op.yields_bool() {
                val.tag = self.cc.types.tag_bool();
            }
        }

        expr.val = val;
        true
    }

    fn check_assignment_lhs(&mut self, b: &mut BinaryExpr, pos: Span) -> bool {
        let left_ident = b.left.val.ident;
        if left_ident == Ident::ArrayChar {
            // Assigning into a packed character cell is permitted.
            return true;
        }

        if left_ident.is_array_kind() {
            // Whole-array assignment is permitted, with restrictions.
            if b.op.oper().is_some() {
                self.report(
                    codes::ARRAY_ASSIGN_MUST_BE_SIMPLE,
                    pos,
                    "array assignment must be simple assignment",
                );
                return false;
            }
            let Some(sym) = b.left.val.sym else {
                self.report(
                    codes::REFARRAY_NOT_ALLOWED,
                    pos,
                    "cannot assign to an unnamed array",
                );
                return false;
            };
            let name = self.cc.symbols[sym].name.clone();
            let mut iter = Some(sym);
            while let Some(id) = iter {
                if self.cc.symbols[id].array.length == 0 {
                    self.report(
                        codes::UNKNOWN_ARRAY_SIZE,
                        pos,
                        format!("unknown array size for `{name}`"),
                    );
                    return false;
                }
                iter = self.cc.symbols[id].child;
            }
            return true;
        }

        if !b.left.lvalue {
            self.report(codes::NOT_LVALUE, pos, "must be an l-value");
            return false;
        }

        let left_val = b.left.val;
        debug_assert!(left_val.sym.is_some() || left_val.accessor.is_some());

        // "const" values may not be modified, except by their initializer.
        if !b.initializer {
            if let Some(sym) = left_val.sym {
                if self.cc.symbols[sym].is_const {
                    self.report(codes::NOT_LVALUE, pos, "cannot modify a constant");
                    return false;
                }
            }
        }
        true
    }

    fn check_assignment_rhs(&mut self, b: &mut BinaryExpr, pos: Span) -> bool {
        let left_val = b.left.val;
        let right_val = b.right.val;

        if left_val.ident == Ident::Variable {
            // Warn whenever both sides resolve to the same variable, even
            // through an r-value load.
            if right_val.ident == Ident::Variable && right_val.sym == left_val.sym {
                let name = self.value_name(&left_val);
                self.report(
                    codes::SELF_ASSIGNMENT,
                    pos,
                    format!("assignment of `{name}` to itself"),
                );
            }
        }

        let oper = b.op.oper();
        // An array element counts as a sub-array when it is an enum-indexed
        // slot wider than one cell and the right side is an array.
        let leftarray = left_val.ident.is_array_kind()
            || (matches!(left_val.ident, Ident::ArrayCell | Ident::ArrayChar)
                && left_val.constval > 1
                && left_val
                    .sym
                    .is_some_and(|s| self.cc.symbols[s].array.level == 0)
                && oper.is_none()
                && right_val.ident.is_array_kind());

        if leftarray {
            if !right_val.ident.is_array_kind() {
                self.report(codes::ARRAY_SIZE_MISMATCH, pos, "array sizes must match");
                return false;
            }

            let left_sym = left_val.sym.expect("array assignment target has a symbol");
            let left_length = self.cc.symbols[left_sym].array.length;
            let left_idxtag = self.cc.symbols[left_sym].idx_tag;

            let mut exact_match = true;
            let mut right_length;
            let mut right_idxtag = Tag::INT;
            if let Some(right_sym) = right_val.sym {
                // Multi-dimensional arrays are rejected outright; sub-array
                // assignment is not validated further.
                if self.cc.symbols[right_sym].array.level > 0 {
                    self.report(
                        codes::ARRAY_ASSIGN_MUST_BE_SIMPLE,
                        pos,
                        "array assignment must be simple assignment",
                    );
                    return false;
                }
                right_length = if right_val.constval == 0 {
                    self.cc.symbols[right_sym].array.length
                } else {
                    right_val.constval
                };
                right_idxtag = self.cc.symbols[right_sym].idx_tag;
                if right_idxtag == Tag::INT && left_idxtag == Tag::INT {
                    exact_match = false;
                }
            } else {
                right_length = right_val.constval; // literal array
                if right_length < 0 {
                    // A literal string may be shorter than the destination,
                    // provided the destination has no index tag.
                    right_length = -right_length;
                    if left_idxtag == Tag::INT {
                        exact_match = false;
                    }
                }
            }

            if self.cc.symbols[left_sym].array.level != 0 {
                self.report(
                    codes::ARRAY_SIZE_MISMATCH,
                    pos,
                    "array dimensions must match",
                );
                return false;
            }
            if left_length < right_length
                || (exact_match && left_length > right_length)
                || right_length == 0
            {
                self.report(codes::ARRAY_SIZE_MISMATCH, pos, "array sizes must match");
                return false;
            }
            if left_val.ident != Ident::ArrayCell
                && !self.match_tag(left_idxtag, right_idxtag, MATCH_COERCE | MATCH_SILENT, pos)
            {
                let name = match right_val.sym {
                    Some(s) => self.cc.symbols[s].name.clone(),
                    None => self.cc.symbols[left_sym].name.clone(),
                };
                self.report(
                    codes::INDEX_TAG_MISMATCH,
                    pos,
                    format!("index tag mismatch on `{name}`"),
                );
            }

            b.array_copy_length = right_length;
            if self.cc.symbols[left_sym].tag == self.cc.types.tag_string() {
                b.array_copy_length = char_array_cells(b.array_copy_length);
            }
        } else {
            if right_val.ident.is_array_kind() {
                self.report(
                    codes::MUST_ASSIGN_TO_ARRAY,
                    pos,
                    "an array value must be assigned to an array",
                );
                return false;
            }
            // The userop result tag propagates through the caller.
            b.assignop = self.find_userop("=", left_val.tag, right_val.tag, 2);
        }

        if oper.is_none() && !self.checkval_string(&left_val, &right_val) {
            let string_tag = self.cc.types.tag_string();
            if leftarray
                && ((left_val.tag == string_tag) != (right_val.tag == string_tag))
            {
                let want = self.type_name(left_val.tag);
                let got = self.type_name(right_val.tag);
                self.report(
                    codes::STRING_ASSIGN_MISMATCH,
                    pos,
                    format!("cannot assign `{got}` array to `{want}` array"),
                );
                return false;
            }
            self.match_tag(left_val.tag, right_val.tag, MATCH_COERCE, pos);
        }
        true
    }

    fn check_logical(&mut self, expr: &mut Expr) -> bool {
        let pos = expr.pos;
        let ExprKind::Logical { op, left, right } = &mut expr.kind else {
            unreachable!()
        };
        let op = *op;
        if !self.check_expr(left) || !self.check_expr(right) {
            return false;
        }
        if left.lvalue {
            self.rvalue(left);
        }
        if right.lvalue {
            self.rvalue(right);
        }
        for side in [&*left, &*right] {
            if side.val.ident.is_array_kind() {
                let name = self.value_name(&side.val);
                self.report(
                    codes::ARRAY_NOT_INDEXED,
                    pos,
                    format!("array `{name}` must be indexed"),
                );
                return false;
            }
        }

        let left_val = left.val;
        let right_val = right.val;
        let mut val = Value::new(Ident::Expression, self.cc.types.tag_bool());
        if left_val.ident == Ident::Constant && right_val.ident == Ident::Constant {
            val.ident = Ident::Constant;
            val.constval = fold::fold_logical(op, left_val.constval, right_val.constval);
        }
        expr.val = val;
        true
    }

    fn check_chained_compare(&mut self, expr: &mut Expr) -> bool {
        let ExprKind::ChainedCompare { first, ops } = &mut expr.kind else {
            unreachable!()
        };
        if !self.check_expr(first) {
            return false;
        }
        if first.lvalue {
            self.rvalue(first);
        }
        for link in ops.iter_mut() {
            if !self.check_expr(&mut link.expr) {
                return false;
            }
            if link.expr.lvalue {
                self.rvalue(&mut link.expr);
            }
        }

        let mut all_const = first.val.ident == Ident::Constant;
        let mut const_result = true;
        let mut left_val = first.val;
        let bool_tag = self.cc.types.tag_bool();

        for link in ops.iter_mut() {
            let right_val = link.expr.val;
            for (v, at) in [(&left_val, link.pos), (&right_val, link.expr.pos)] {
                if v.ident.is_array_kind() {
                    let name = self.value_name(v);
                    self.report(
                        codes::ARRAY_NOT_INDEXED,
                        at,
                        format!("array `{name}` must be indexed"),
                    );
                    return false;
                }
            }

            if let Some(userop) =
                self.find_userop(link.op.token(), left_val.tag, right_val.tag, 2)
            {
                if userop.tag != bool_tag {
                    self.report(
                        codes::COMPARE_OP_MUST_RETURN_BOOL,
                        link.pos,
                        format!("user-defined `{}` must return bool", link.op.token()),
                    );
                    return false;
                }
                link.userop = Some(userop);
            } else if !self.checkval_string(&left_val, &right_val) {
                self.match_tag_commutative(left_val.tag, right_val.tag, MATCH_DEDUCE, link.pos);
            }

            if right_val.ident != Ident::Constant || link.userop.is_some() {
                all_const = false;
            }
            if all_const {
                let folded = fold::fold_binary(link.op, left_val.constval, right_val.constval)
                    .expect("comparisons cannot fail to fold");
                const_result &= folded != 0;
            }

            left_val = right_val;
        }

        let mut val = Value::new(Ident::Expression, bool_tag);
        if all_const {
            val.ident = Ident::Constant;
            val.constval = const_result as cell;
        }
        expr.val = val;
        true
    }

    fn check_ternary(&mut self, expr: &mut Expr) -> bool {
        let pos = expr.pos;
        let ExprKind::Ternary {
            first,
            second,
            third,
        } = &mut expr.kind
        else {
            unreachable!()
        };
        if !self.check_expr(first) || !self.check_expr(second) || !self.check_expr(third) {
            return false;
        }

        if first.lvalue {
            self.rvalue(first);
        } else if first.val.ident == Ident::Constant {
            let code = if first.val.constval != 0 {
                codes::ALWAYS_TRUE
            } else {
                codes::ALWAYS_FALSE
            };
            let text = if code == codes::ALWAYS_TRUE {
                "condition is always true"
            } else {
                "condition is always false"
            };
            self.report(code, first.pos, text);
        }
        if second.lvalue {
            self.rvalue(second);
        }
        if third.lvalue {
            self.rvalue(third);
        }

        let left = second.val;
        let right = third.val;
        let left_array = left.ident.is_array_kind();
        let right_array = right.ident.is_array_kind();
        if left_array != right_array {
            let scalar_side = if left_array { &right } else { &left };
            let name = self.value_name(scalar_side);
            self.report(
                codes::ARRAY_NOT_INDEXED,
                pos,
                format!("both branches must be arrays (`{name}` is not)"),
            );
            return false;
        }

        if !self.match_tag_commutative(left.tag, right.tag, 0, pos) {
            return false;
        }

        // If both sides are arrays the larger one is chosen, so the copy
        // out of the result can never overflow. Literal strings carry a
        // negative size, which flips the comparison.
        let mut val = left;
        if left_array && right_array && val.constval < 0 && val.constval > right.constval {
            val = right;
        }

        if val.ident == Ident::Array {
            val.ident = Ident::RefArray;
        } else if val.ident != Ident::RefArray {
            val.ident = Ident::Expression;
        }
        expr.val = val;
        true
    }

    fn check_cast(&mut self, expr: &mut Expr) -> bool {
        let pos = expr.pos;
        let ExprKind::Cast { tag, expr: inner } = &mut expr.kind else {
            unreachable!()
        };
        let target = *tag;
        if target == self.cc.types.tag_void() {
            self.report(codes::VOID_NOT_ALLOWED, pos, "cannot cast to void");
            return false;
        }
        if !self.check_expr(inner) {
            return false;
        }

        let mut val = inner.val;
        let lvalue = inner.lvalue;

        let src_is_object = self.cc.types.get(val.tag).is_object();
        let dst_is_object = self.cc.types.get(target).is_object();
        let src_is_function = self.cc.types.get(val.tag).is_function();
        let dst_is_function = self.cc.types.get(target).is_function();
        if src_is_object || dst_is_object {
            self.match_tag(target, val.tag, MATCH_COERCE, pos);
        } else if src_is_function != dst_is_function {
            self.report(
                codes::FUNCTION_CAST,
                pos,
                "cast between function and non-function types",
            );
        } else if src_is_function && dst_is_function {
            self.match_tag(target, val.tag, MATCH_COERCE, pos);
        } else if val
            .sym
            .is_some_and(|s| self.cc.symbols[s].tag == self.cc.types.tag_void())
        {
            self.report(codes::CAST_OF_VOID_VALUE, pos, "cannot cast a void value");
        } else if self.cc.types.get(target).is_enum_struct() {
            let name = self.type_name(target);
            self.report(
                codes::CAST_TO_ENUM_STRUCT,
                pos,
                format!("cannot cast to enum struct `{name}`"),
            );
        }

        val.tag = target;
        expr.val = val;
        expr.lvalue = lvalue;
        true
    }

    fn check_comma(&mut self, expr: &mut Expr) -> bool {
        let ExprKind::Comma {
            exprs,
            has_side_effects,
        } = &mut expr.kind
        else {
            unreachable!()
        };
        debug_assert!(!exprs.is_empty());
        let mut any_effects = false;
        for e in exprs.iter_mut() {
            if !self.check_expr(e) {
                return false;
            }
            any_effects |= e.has_side_effects();
        }
        *has_side_effects = any_effects;

        let multi = exprs.len() > 1;
        let last = exprs.last_mut().expect("comma has at least one operand");
        if multi && last.lvalue {
            self.rvalue(last);
        }
        let mut val = last.val;
        let lvalue = last.lvalue;
        // A constant result would let the emitter skip the side-effecting
        // operands entirely.
        if multi && val.ident == Ident::Constant {
            val.ident = Ident::Expression;
        }
        expr.val = val;
        expr.lvalue = lvalue;
        true
    }

    // ====================================================================
    // Indexing and member access
    // ====================================================================

    fn check_index(&mut self, expr: &mut Expr) -> bool {
        let ExprKind::Index { base, index } = &mut expr.kind else {
            unreachable!()
        };
        if !self.check_expr(base) || !self.check_expr(index) {
            return false;
        }
        if base.lvalue && base.val.ident == Ident::Accessor {
            self.rvalue(base);
        }
        if index.lvalue {
            self.rvalue(index);
        }

        let base_val = base.val;
        let base_pos = base.pos;
        let index_pos = index.pos;
        let Some(base_sym) = base_val.sym else {
            self.report(codes::INVALID_EXPRESSION, base_pos, "invalid expression");
            return false;
        };
        let (b_ident, b_name, b_enumroot, b_idx_tag, b_tag, b_length, b_level, b_child) = {
            let s = &self.cc.symbols[base_sym];
            (
                s.ident,
                s.name.clone(),
                s.enumroot,
                s.idx_tag,
                s.tag,
                s.array.length,
                s.array.level,
                s.child,
            )
        };
        if !b_ident.is_array_kind() {
            self.report(
                codes::INVALID_SUBSCRIPT,
                base_pos,
                format!("`{b_name}` cannot be indexed"),
            );
            return false;
        }

        if b_enumroot && !self.match_tag(b_idx_tag, index.val.tag, MATCH_COERCE, index_pos) {
            return false;
        }

        let index_val = index.val;
        if index_val.ident.is_array_kind() {
            let name = self.value_name(&index_val);
            self.report(
                codes::ARRAY_NOT_INDEXED,
                index_pos,
                format!("array `{name}` must be indexed"),
            );
            return false;
        }

        if self.cc.types.get(b_idx_tag).is_enum_struct() {
            self.report(
                codes::ENUM_STRUCT_ARRAY_INDEX,
                base_pos,
                "enum-struct arrays cannot be indexed directly",
            );
            return false;
        }

        let idx_tag = index_val.tag;
        if !self.is_valid_index_tag(idx_tag) {
            let name = self.type_name(idx_tag);
            self.report(
                codes::INVALID_INDEX_TAG,
                index_pos,
                format!("`{name}` is not a valid index tag"),
            );
            return false;
        }

        if index_val.ident == Ident::Constant {
            let iv = index_val.constval;
            if iv < 0 || (b_length != 0 && b_length <= iv) {
                self.report(
                    codes::INDEX_OUT_OF_BOUNDS,
                    index_pos,
                    format!("index out of bounds for `{b_name}`"),
                );
                return false;
            }
        }

        let mut out = base_val;
        if b_level > 0 {
            // Intermediate arrays are not l-values.
            out.ident = Ident::RefArray;
            out.sym = b_child;
            debug_assert!(out.sym.is_some());
            expr.val = out;
            return true;
        }

        out.ident = if b_tag == self.cc.types.tag_string() {
            Ident::ArrayChar
        } else {
            Ident::ArrayCell
        };
        out.tag = b_tag;
        out.constval = 0;
        expr.val = out;
        expr.lvalue = true;
        true
    }

    pub(crate) fn check_field_access_expr(&mut self, expr: &mut Expr, from_call: bool) -> bool {
        let pos = expr.pos;
        let (val, lvalue) = {
            let ExprKind::FieldAccess(fa) = &mut expr.kind else {
                unreachable!()
            };
            let base_ok = if matches!(fa.base.kind, ExprKind::Symbol { .. }) {
                self.check_symbol_expr(&mut fa.base, true)
            } else {
                self.check_expr(&mut fa.base)
            };
            if !base_ok {
                return false;
            }

            let result = if fa.access == FieldAccessKind::DoubleColon {
                self.static_field_access(fa, pos).map(|v| (v, false))
            } else {
                self.dot_field_access(fa, pos, from_call)
            };
            match result {
                Some(pair) => pair,
                None => return false,
            }
        };
        expr.val = val;
        expr.lvalue = lvalue;
        true
    }

    fn dot_field_access(
        &mut self,
        fa: &mut FieldAccessExpr,
        pos: Span,
        from_call: bool,
    ) -> Option<(Value, bool)> {
        let base_val = fa.base.val;
        match base_val.ident {
            Ident::Array | Ident::RefArray => {
                if let Some(base_sym) = base_val.sym {
                    let (level, idx_tag) = {
                        let s = &self.cc.symbols[base_sym];
                        (s.array.level, s.idx_tag)
                    };
                    if level == 0 {
                        if let Some(root) = self.cc.types.get(idx_tag).as_enum_struct() {
                            return self.enum_struct_field_access(fa, idx_tag, root, from_call, pos);
                        }
                    }
                }
                let name = fa.name.clone();
                self.report(
                    codes::NOT_A_MEMBER,
                    pos,
                    format!("`{name}` is not a member of an array"),
                );
                None
            }
            Ident::Function => {
                self.report(
                    codes::FIELD_ACCESS_ON_FUNCTION,
                    pos,
                    "functions have no members",
                );
                None
            }
            Ident::Methodmap => {
                // Static access through the type name.
                let base_sym = base_val.sym?;
                let SymbolData::Methodmap(map) = self.cc.symbols[base_sym].data else {
                    self.report(codes::NOT_A_METHODMAP, pos, "not a methodmap");
                    return None;
                };
                let map_name = self.cc.types.methodmap(map).name.clone();
                let Some(mid) = self.cc.types.find_method(map, &fa.name) else {
                    let field = fa.name.clone();
                    self.report(
                        codes::MEMBER_NOT_FOUND,
                        pos,
                        format!("`{map_name}` has no member `{field}`"),
                    );
                    return None;
                };
                fa.method = Some(mid);
                let (is_static, target, name) = {
                    let m = self.cc.types.method(mid);
                    (m.is_static, m.target, m.name.clone())
                };
                if !is_static {
                    self.report(
                        codes::INSTANCE_METHOD_ON_TYPE,
                        pos,
                        format!("method `{name}` requires an instance of `{map_name}`"),
                    );
                    return None;
                }
                let mut val = Value::new(Ident::Function, self.cc.symbols[target].tag);
                val.sym = Some(target);
                self.cc.symbols.mark_usage(target, USAGE_READ);
                Some((val, false))
            }
            _ => {
                let Some(map) = self.cc.types.get(base_val.tag).as_methodmap() else {
                    let name = self.type_name(base_val.tag);
                    self.report(
                        codes::NOT_A_METHODMAP,
                        pos,
                        format!("`{name}` has no members"),
                    );
                    return None;
                };
                let map_name = self.cc.types.methodmap(map).name.clone();
                let Some(mid) = self.cc.types.find_method(map, &fa.name) else {
                    let field = fa.name.clone();
                    self.report(
                        codes::MEMBER_NOT_FOUND,
                        pos,
                        format!("`{map_name}` has no member `{field}`"),
                    );
                    return None;
                };
                fa.method = Some(mid);
                let (is_property, is_static, target, name, property_tag) = {
                    let m = self.cc.types.method(mid);
                    (
                        m.is_property(),
                        m.is_static,
                        m.target,
                        m.name.clone(),
                        m.property_tag,
                    )
                };

                if is_property {
                    // The only case needing a load of the base address;
                    // plain method access only consults the type.
                    if fa.base.lvalue {
                        self.rvalue(&mut fa.base);
                    }
                    let mut val =
                        Value::new(Ident::Accessor, property_tag.unwrap_or(Tag::INT));
                    val.accessor = Some(mid);
                    return Some((val, true));
                }

                if is_static {
                    self.report(
                        codes::STATIC_METHOD_ON_INSTANCE,
                        pos,
                        format!("static method `{name}` cannot be called on an instance"),
                    );
                    return None;
                }

                let mut val = Value::new(Ident::Function, self.cc.symbols[target].tag);
                val.sym = Some(target);
                self.cc.symbols.mark_usage(target, USAGE_READ);
                Some((val, false))
            }
        }
    }

    fn enum_struct_field_access(
        &mut self,
        fa: &mut FieldAccessExpr,
        es_tag: Tag,
        root: SymbolId,
        from_call: bool,
        pos: Span,
    ) -> Option<(Value, bool)> {
        // Enum structs are always arrays, so the base is never an l-value.
        debug_assert!(!fa.base.lvalue);

        let Some(field) = self.find_enum_struct_field(root, &fa.name) else {
            let type_name = self.type_name(es_tag);
            let field_name = fa.name.clone();
            self.report(
                codes::MEMBER_NOT_FOUND,
                pos,
                format!("`{type_name}` has no member `{field_name}`"),
            );
            return None;
        };

        if self.cc.symbols[field].ident == Ident::Function {
            if !from_call {
                self.report(
                    codes::INVALID_FUNCTION_REFERENCE,
                    pos,
                    "methods can only be called",
                );
                return None;
            }
            fa.field = Some(field);
            let mut val = Value::new(Ident::Function, self.cc.symbols[field].tag);
            val.sym = Some(field);
            self.cc.symbols.mark_usage(field, USAGE_READ);
            return Some((val, false));
        }
        debug_assert_eq!(self.cc.symbols[field].parent, Some(root));

        // Synthesize a child symbol representing the selected field of this
        // particular variable.
        let var = fa.base.val.sym.expect("enum-struct bases carry a symbol");
        let field_tag = self.cc.symbols[field].idx_tag;
        let (field_addr, field_length) = {
            let f = &self.cc.symbols[field];
            (f.addr, f.array.length)
        };
        let vclass = self.cc.symbols[var].vclass;
        let string_tag = self.cc.types.tag_string();
        let field_is_enum_struct = self.cc.types.get(field_tag).is_enum_struct();

        let mut child = crate::semantic::symbols::Symbol::new(
            &fa.name,
            Ident::ArrayCell,
            vclass,
            Tag::INT,
        );
        child.addr = field_addr;
        child.parent = Some(root);
        child.defined = true;

        let mut val = Value::new(Ident::ArrayCell, Tag::INT);
        if field_is_enum_struct {
            val.tag = Tag::INT;
            child.tag = Tag::INT;
            child.idx_tag = field_tag;
        } else {
            val.tag = field_tag;
            child.tag = field_tag;
            child.idx_tag = Tag::INT;
        }

        let lvalue;
        if field_length > 0 {
            child.array.length = field_length;
            child.array.level = 0;
            child.ident = Ident::RefArray;
            val.constval = field_length;
            lvalue = false;
        } else {
            child.ident = if child.tag == string_tag {
                Ident::ArrayChar
            } else {
                Ident::ArrayCell
            };
            val.constval = 0;
            lvalue = true;
        }
        val.ident = child.ident;

        let child_id = self.cc.symbols.alloc(child);
        match &mut self.cc.symbols[var].data {
            SymbolData::EnumStructVar(children) => children.push(child_id),
            data @ SymbolData::None => *data = SymbolData::EnumStructVar(vec![child_id]),
            _ => {}
        }
        fa.field = Some(child_id);
        val.sym = Some(child_id);
        Some((val, lvalue))
    }

    /// `Type::field` yields the field's compile-time offset as a constant.
    fn static_field_access(&mut self, fa: &mut FieldAccessExpr, pos: Span) -> Option<Value> {
        let base_val = fa.base.val;
        if base_val.ident != Ident::EnumStruct {
            self.report(
                codes::STATIC_ACCESS_INVALID,
                pos,
                "`::` requires an enum-struct type",
            );
            return None;
        }
        let Some(root) = self.cc.types.get(base_val.tag).as_enum_struct() else {
            self.report(
                codes::STATIC_ACCESS_INVALID,
                pos,
                "`::` requires an enum-struct type",
            );
            return None;
        };
        let Some(field) = self.find_enum_struct_field(root, &fa.name) else {
            let type_name = self.type_name(base_val.tag);
            let field_name = fa.name.clone();
            self.report(
                codes::MEMBER_NOT_FOUND,
                pos,
                format!("`{type_name}` has no member `{field_name}`"),
            );
            return None;
        };
        debug_assert_eq!(self.cc.symbols[field].parent, Some(root));
        Some(Value::constant(self.cc.symbols[field].addr, Tag::INT))
    }

    pub(crate) fn find_enum_struct_field(&self, root: SymbolId, name: &str) -> Option<SymbolId> {
        let data = self.cc.symbols[root].enum_struct_data()?;
        data.fields
            .iter()
            .chain(data.methods.iter())
            .copied()
            .find(|&id| self.cc.symbols[id].name == name)
    }

    // ====================================================================
    // Calls
    // ====================================================================

    fn check_call(&mut self, expr: &mut Expr) -> bool {
        let pos = expr.pos;
        let (val, allocs_heap) = {
            let ExprKind::Call(call) = &mut expr.kind else {
                unreachable!()
            };
            match self.check_call_inner(call, pos) {
                Some(pair) => pair,
                None => return false,
            }
        };
        expr.val = val;
        if allocs_heap {
            self.needs_heap_alloc(expr);
        }
        true
    }

    fn check_call_inner(&mut self, call: &mut CallExpr, pos: Span) -> Option<(Value, bool)> {
        // The call target is not checked as an expression; binding does
        // whatever analysis it needs.
        let (sym, implicit_this) = if call.is_new {
            (self.bind_new_target(&mut call.target)?, None)
        } else {
            self.bind_call_target(call, pos)?
        };
        call.sym = Some(sym);

        // If the callee returns an array of as-yet-unknown size, its body
        // must be analyzed first. A cycle here is unresolvable.
        if let Some(node) = self.cc.symbols[sym].function().node {
            let needs_size = !self.funcs[node.0 as usize].ret.dims.is_empty()
                && self.cc.symbols[sym].child.is_none();
            if needs_size {
                let in_progress = self.funcs[node.0 as usize].state == AnalysisState::InProgress;
                if in_progress || !self.check_function(node) {
                    self.report(
                        codes::RECURSIVE_ANALYSIS,
                        pos,
                        "recursive analysis of array-returning function",
                    );
                    return None;
                }
            }
        }

        self.cc.symbols.mark_usage(sym, USAGE_READ);

        let mut val = Value::new(Ident::Expression, self.cc.symbols[sym].tag);
        let array_return = self.cc.symbols[sym].child;
        if let Some(sub) = array_return {
            val.ident = Ident::RefArray;
            val.sym = Some(sub);
        }

        if self.cc.symbols[sym].deprecated {
            let name = self.cc.symbols[sym].name.clone();
            let note = self.cc.symbols[sym]
                .documentation
                .clone()
                .unwrap_or_default();
            self.report(
                codes::DEPRECATED,
                pos,
                format!("`{name}` is deprecated: {note}"),
            );
        }

        let arglist: Vec<ArgInfo> = self.cc.symbols[sym].function().args.clone();
        let has_this = implicit_this.is_some();

        let mut nargs: usize = 0;
        let mut argidx: usize = 0;
        if let Some(this_expr) = implicit_this {
            if arglist.is_empty() {
                self.report(codes::ARGUMENT_COUNT_MISMATCH, pos, "argument count mismatch");
                return None;
            }
            if !self.check_argument(call, &arglist, 0, Some(this_expr), 0, true) {
                return None;
            }
            nargs += 1;
            argidx += 1;
        }

        let mut namedparams = false;
        let args = std::mem::take(&mut call.args);
        for param in args {
            let argpos;
            if let Some(name) = &param.name {
                namedparams = true;
                let Some(found) = arglist.iter().position(|a| &a.name == name) else {
                    self.report(
                        codes::UNDEFINED_SYMBOL,
                        pos,
                        format!("no argument named `{name}`"),
                    );
                    break;
                };
                argpos = found;
                argidx = found;
            } else {
                if namedparams {
                    self.report(
                        codes::POSITIONAL_AFTER_NAMED,
                        pos,
                        "positional parameters must precede named parameters",
                    );
                    return None;
                }
                argpos = nargs;
            }

            if argpos >= MAX_CALL_ARGUMENTS {
                self.report(codes::TOO_MANY_ARGUMENTS, pos, "too many function arguments");
                return None;
            }
            if argpos < call.argv.len() && call.argv[argpos].expr.is_some() {
                self.report(codes::ARGUMENT_ALREADY_SET, pos, "argument is set twice");
                return None;
            }
            if argidx >= arglist.len() {
                self.report(codes::ARGUMENT_COUNT_MISMATCH, pos, "argument count mismatch");
                return None;
            }

            let mut pexpr = param.expr;
            if let Some(e) = &mut pexpr {
                if !self.check_expr(e) {
                    return None;
                }
            }
            if !self.check_argument(call, &arglist, argidx, pexpr, argpos, has_this) {
                return None;
            }
            debug_assert!(call.argv[argpos].expr.is_some());
            nargs += 1;

            // Don't iterate past a variadic terminator.
            if arglist[argidx].ident != Ident::VarArgs {
                argidx += 1;
            }
        }

        if self.cx.func.is_none() {
            self.report(
                codes::INVALID_STATEMENT,
                pos,
                "function calls are only valid inside functions",
            );
            return None;
        }

        // Fill in defaults for missing arguments.
        for idx in 0..arglist.len() {
            if arglist[idx].ident == Ident::VarArgs {
                break;
            }
            if idx >= call.argv.len() || call.argv[idx].expr.is_none() {
                if !self.check_argument(call, &arglist, idx, None, idx, has_this) {
                    return None;
                }
            }

            // A default value with a foreign tag goes through the
            // assignment coercion operator, like any other assignment.
            let is_default = matches!(
                call.argv[idx].expr,
                Some(Expr {
                    kind: ExprKind::DefaultArg { .. },
                    ..
                })
            );
            if is_default && arglist[idx].ident == Ident::Variable {
                if let Some(def) = &arglist[idx].default {
                    if let Some(userop) = self.find_userop("=", def.tag, arglist[idx].tag, 2) {
                        let e = call.argv[idx].expr.as_mut().expect("default just placed");
                        self.wrap_userop(e, userop);
                    }
                }
            }
        }

        Some((val, array_return.is_some()))
    }

    fn bind_call_target(
        &mut self,
        call: &mut CallExpr,
        pos: Span,
    ) -> Option<(SymbolId, Option<Expr>)> {
        match &call.target.kind {
            ExprKind::FieldAccess(_) => {
                if !self.check_field_access_expr(&mut call.target, true) {
                    return None;
                }
                let val = call.target.val;
                if val.ident != Ident::Function {
                    self.report(codes::INVALID_EXPRESSION, pos, "invalid function call");
                    return None;
                }
                // `::` is offsetof and can never produce a function.
                let ExprKind::FieldAccess(fa) = &mut call.target.kind else {
                    unreachable!()
                };
                debug_assert_eq!(fa.access, FieldAccessKind::Dot);

                if let Some(mid) = fa.method {
                    let (is_ctor, map) = {
                        let m = self.cc.types.method(mid);
                        (m.is_ctor, m.map)
                    };
                    if is_ctor {
                        let name = self.cc.types.methodmap(map).name.clone();
                        self.report(
                            codes::CTOR_CALLED_AS_METHOD,
                            pos,
                            format!("constructor of `{name}` cannot be called as a method"),
                        );
                        return None;
                    }
                }

                if fa.base.lvalue {
                    self.rvalue(&mut fa.base);
                }
                let needs_this = fa.field.is_some()
                    || fa
                        .method
                        .is_some_and(|m| !self.cc.types.method(m).is_static);
                let this_expr = needs_this.then(|| {
                    std::mem::replace(&mut fa.base, Expr::new(ExprKind::Null, pos))
                });
                Some((val.sym?, this_expr))
            }
            ExprKind::Symbol { sym } => {
                let sym = *sym;
                let s = &self.cc.symbols[sym];
                let name = s.name.clone();
                if !call.is_new && s.ident == Ident::Methodmap {
                    if let SymbolData::Methodmap(map) = s.data {
                        let (ctor, needs_new, map_name) = {
                            let m = self.cc.types.methodmap(map);
                            (m.ctor, m.must_construct_with_new, m.name.clone())
                        };
                        let Some(ctor) = ctor else {
                            self.report(
                                codes::NO_CONSTRUCTOR,
                                pos,
                                format!("methodmap `{map_name}` has no constructor"),
                            );
                            return None;
                        };
                        if needs_new {
                            self.report(
                                codes::MUST_CONSTRUCT_WITH_NEW,
                                pos,
                                format!("`{map_name}` must be constructed with `new`"),
                            );
                            return None;
                        }
                        return Some((self.cc.types.method(ctor).target, None));
                    }
                }
                if s.ident != Ident::Function {
                    self.report(
                        codes::INVALID_FUNCTION_REFERENCE,
                        pos,
                        format!("`{name}` is not a function"),
                    );
                    return None;
                }
                if !s.defined {
                    self.report(
                        codes::FUNCTION_NOT_DEFINED,
                        pos,
                        format!("function `{name}` is not implemented"),
                    );
                    return None;
                }
                Some((sym, None))
            }
            _ => {
                self.report(codes::INVALID_EXPRESSION, pos, "invalid function call");
                None
            }
        }
    }

    fn bind_new_target(&mut self, target: &mut Expr) -> Option<SymbolId> {
        let pos = target.pos;
        match &target.kind {
            ExprKind::Symbol { sym } => {
                let sym = *sym;
                let s = &self.cc.symbols[sym];
                let name = s.name.clone();
                if s.ident != Ident::Methodmap {
                    self.report(
                        codes::INVALID_NEW_TARGET,
                        pos,
                        format!("`{name}` cannot be constructed with `new`"),
                    );
                    return None;
                }
                let SymbolData::Methodmap(map) = s.data else {
                    self.report(codes::NOT_A_METHODMAP, pos, "not a methodmap");
                    return None;
                };
                let (ctor, needs_new, map_name) = {
                    let m = self.cc.types.methodmap(map);
                    (m.ctor, m.must_construct_with_new, m.name.clone())
                };
                if !needs_new {
                    self.report(
                        codes::CANNOT_USE_NEW,
                        pos,
                        format!("`{map_name}` cannot be constructed with `new`"),
                    );
                    return None;
                }
                let Some(ctor) = ctor else {
                    self.report(
                        codes::NO_CONSTRUCTOR,
                        pos,
                        format!("methodmap `{map_name}` has no constructor"),
                    );
                    return None;
                };
                Some(self.cc.types.method(ctor).target)
            }
            _ => {
                self.report(codes::INVALID_NEW_TARGET, pos, "invalid `new` target");
                None
            }
        }
    }

    /// Type-check one argument and store it into `argv[pos]`. A `None`
    /// param means the argument was omitted and falls back to its default.
    fn check_argument(
        &mut self,
        call: &mut CallExpr,
        arglist: &[ArgInfo],
        arg_index: usize,
        param: Option<Expr>,
        pos: usize,
        has_this: bool,
    ) -> bool {
        while pos >= call.argv.len() {
            call.argv.push(ComputedArg::default());
        }
        let visual_pos = if has_this { pos } else { pos + 1 };
        let arg = &arglist[arg_index];

        let Some(mut param) = param else {
            if arg.ident == Ident::VarArgs {
                self.report(
                    codes::ARGUMENT_COUNT_MISMATCH,
                    call.target.pos,
                    "argument count mismatch",
                );
                return false;
            }
            let Some(def) = &arg.default else {
                self.report(
                    codes::NO_DEFAULT_VALUE,
                    call.target.pos,
                    format!("argument {visual_pos} has no default value"),
                );
                return false;
            };
            // Emission of the default value happens in the code generator.
            let mut placeholder = Expr::new(ExprKind::DefaultArg { arg_index }, call.target.pos);
            if arg.ident == Ident::Reference
                || (arg.ident == Ident::RefArray && !arg.is_const && def.array.is_some())
            {
                self.needs_heap_alloc(&mut placeholder);
            }
            call.argv[pos] = ComputedArg {
                expr: Some(placeholder),
                arg_index,
            };
            return true;
        };

        let param_pos = param.pos;
        let handling_this = has_this && pos == 0;

        if param.val.ident == Ident::Accessor {
            let m = param.val.accessor.expect("accessor values carry their method");
            if self.cc.types.method(m).getter.is_none() {
                let name = self.cc.types.method(m).name.clone();
                self.report(
                    codes::PROPERTY_HAS_NO_GETTER,
                    param_pos,
                    format!("property `{name}` has no getter"),
                );
                return false;
            }
            // Accessors always pass through an r-value load.
            self.rvalue(&mut param);
        }

        let lvalue = param.lvalue;
        match arg.ident {
            Ident::VarArgs => {
                debug_assert!(!handling_this);
                // Variadic arguments always pass by reference; anything not
                // already addressable gets a heap temporary.
                match param.val.ident {
                    Ident::Variable | Ident::Reference => {
                        let sym = param.val.sym.expect("variables carry their symbol");
                        if self.cc.symbols[sym].is_const && !arg.is_const {
                            if !lvalue {
                                self.report(codes::NOT_LVALUE, param_pos, "must be an l-value");
                                return false;
                            }
                            self.needs_heap_alloc(&mut param);
                        } else if !lvalue {
                            self.needs_heap_alloc(&mut param);
                        }
                    }
                    Ident::Constant | Ident::Expression => {
                        self.needs_heap_alloc(&mut param);
                    }
                    _ => {}
                }
                if !self.checktag_string(arg.tag, &param.val) {
                    self.checktag(arg.tag, param.val.tag, param_pos);
                }
            }
            Ident::Variable => {
                if matches!(
                    param.val.ident,
                    Ident::Function | Ident::Array | Ident::RefArray
                ) {
                    self.report(
                        codes::ARG_TYPE_MISMATCH,
                        param_pos,
                        format!("argument {visual_pos} type mismatch"),
                    );
                    return false;
                }
                if lvalue {
                    self.rvalue(&mut param);
                }
                // User operators never transform `this`.
                if !handling_this {
                    if let Some(userop) = self.find_userop("=", arg.tag, param.val.tag, 2) {
                        self.wrap_userop(&mut param, userop);
                    }
                }
                if !self.checktag_string(arg.tag, &param.val) {
                    self.checktag(arg.tag, param.val.tag, param_pos);
                }
            }
            Ident::Reference => {
                debug_assert!(!handling_this);
                // A packed character cell is not addressable.
                if !lvalue || param.val.ident == Ident::ArrayChar {
                    self.report(
                        codes::ARG_TYPE_MISMATCH,
                        param_pos,
                        format!("argument {visual_pos} type mismatch"),
                    );
                    return false;
                }
                if param
                    .val
                    .sym
                    .is_some_and(|s| self.cc.symbols[s].is_const)
                    && !arg.is_const
                {
                    self.report(
                        codes::ARG_TYPE_MISMATCH,
                        param_pos,
                        format!("argument {visual_pos} type mismatch"),
                    );
                    return false;
                }
                self.checktag(arg.tag, param.val.tag, param_pos);
            }
            Ident::RefArray => {
                if !matches!(
                    param.val.ident,
                    Ident::Array | Ident::RefArray | Ident::ArrayCell | Ident::ArrayChar
                ) {
                    self.report(
                        codes::ARG_TYPE_MISMATCH,
                        param_pos,
                        format!("argument {visual_pos} type mismatch"),
                    );
                    return false;
                }
                if param
                    .val
                    .sym
                    .is_some_and(|s| self.cc.symbols[s].is_const)
                    && !arg.is_const
                {
                    self.report(
                        codes::ARG_TYPE_MISMATCH,
                        param_pos,
                        format!("argument {visual_pos} type mismatch"),
                    );
                    return false;
                }
                if !self.check_refarray_shape(arg, &param, param_pos) {
                    return false;
                }
                self.checktag(arg.tag, param.val.tag, param_pos);
                let string_tag = self.cc.types.tag_string();
                if (arg.tag == string_tag) != (param.val.tag == string_tag) {
                    let want = self.type_name(arg.tag);
                    let got = self.type_name(param.val.tag);
                    self.report(
                        codes::STRING_ARG_MISMATCH,
                        param_pos,
                        format!("cannot pass `{got}` array as `{want}` array"),
                    );
                    return false;
                }
            }
            _ => debug_assert!(false, "invalid formal argument kind"),
        }

        call.argv[pos] = ComputedArg {
            expr: Some(param),
            arg_index,
        };
        true
    }

    /// Dimension counts and sizes must line up, with declared 0 sizes as
    /// wildcards.
    fn check_refarray_shape(&mut self, arg: &ArgInfo, param: &Expr, pos: Span) -> bool {
        let val = &param.val;
        // A literal array always has one dimension, and so does an indexed
        // cell passed onward.
        if val.sym.is_none() || matches!(val.ident, Ident::ArrayCell | Ident::ArrayChar) {
            if arg.dims.len() != 1 {
                self.report(
                    codes::ARRAY_DIMENSION_MISMATCH,
                    pos,
                    "array dimensions must match",
                );
                return false;
            }
            if arg.dims[0] != 0 {
                debug_assert!(arg.dims[0] > 0);
                if val.constval == 0 {
                    self.report(codes::ARRAY_SIZE_MISMATCH, pos, "array sizes must match");
                    return false;
                }
                let matches_size = if val.ident == Ident::ArrayCell {
                    arg.dims[0] == val.constval
                } else if val.constval > 0 {
                    arg.dims[0] == val.constval
                } else {
                    // Literal strings may be shorter than the formal.
                    arg.dims[0] >= -val.constval
                };
                if !matches_size {
                    self.report(codes::ARRAY_SIZE_MISMATCH, pos, "array sizes must match");
                    return false;
                }
            }
            return true;
        }

        let mut sym = val.sym.expect("checked above");
        if self.cc.symbols[sym].array.level as usize + 1 != arg.dims.len() {
            self.report(
                codes::ARRAY_DIMENSION_MISMATCH,
                pos,
                "array dimensions must match",
            );
            return false;
        }
        let mut level = 0;
        while self.cc.symbols[sym].array.level > 0 {
            if arg.dims[level] != 0 && self.cc.symbols[sym].array.length != arg.dims[level] {
                self.report(codes::ARRAY_SIZE_MISMATCH, pos, "array sizes must match");
                return false;
            }
            sym = self.cc.symbols[sym].child.expect("levels imply children");
            level += 1;
        }
        if arg.dims[level] != 0 && self.cc.symbols[sym].array.length != arg.dims[level] {
            self.report(codes::ARRAY_SIZE_MISMATCH, pos, "array sizes must match");
            return false;
        }

        let sym_idx_tag = self.cc.symbols[sym].idx_tag;
        if !self.match_tag(arg.idx_tag, sym_idx_tag, MATCH_SILENT, pos) {
            // enum-struct arrays may decay to any[].
            let decays = arg.tag == self.cc.types.tag_any()
                && self.cc.types.get(sym_idx_tag).is_enum_struct();
            if !decays {
                let name = self.cc.symbols[sym].name.clone();
                self.report(
                    codes::INDEX_TAG_MISMATCH,
                    pos,
                    format!("index tag mismatch on `{name}`"),
                );
            }
        }
        true
    }

    // ====================================================================
    // sizeof
    // ====================================================================

    fn check_sizeof(&mut self, expr: &mut Expr) -> bool {
        let pos = expr.pos;
        let ExprKind::Sizeof(sz) = &expr.kind else {
            unreachable!()
        };
        let sym = sz.sym;
        let name = sz.name.clone();
        let levels = sz.array_levels;
        let suffix = sz.suffix.clone();

        self.cc.symbols.mark_usage(sym, USAGE_READ);

        let s_ident = self.cc.symbols[sym].ident;
        if s_ident == Ident::Constant {
            self.report(
                codes::SYMBOL_HAS_NO_SIZE,
                pos,
                format!("constant `{name}` has no size"),
            );
            return false;
        }
        if s_ident == Ident::Function {
            self.report(
                codes::FUNCTION_HAS_NO_SIZE,
                pos,
                format!("function `{name}` has no size"),
            );
            return false;
        }
        if !self.cc.symbols[sym].defined {
            self.report(
                codes::UNDEFINED_SYMBOL,
                pos,
                format!("undefined symbol `{name}`"),
            );
            return false;
        }

        let mut val = Value::constant(1, Tag::INT);

        if matches!(s_ident, Ident::Array | Ident::RefArray | Ident::EnumStruct) {
            let s_idx_tag = self.cc.symbols[sym].idx_tag;
            let mut subsym = Some(sym);
            for _ in 0..levels {
                if s_ident == Ident::EnumStruct || self.cc.types.get(s_idx_tag).is_enum_struct() {
                    self.report(
                        codes::SIZEOF_INDEX_ENUM_STRUCT,
                        pos,
                        format!("cannot index enum struct `{name}` in sizeof"),
                    );
                    return false;
                }
                subsym = subsym.and_then(|id| self.cc.symbols[id].child);
            }

            let enum_type: Option<Tag> = match &suffix {
                SizeofSuffix::StaticField(_) => {
                    let Some(sub) = subsym else {
                        self.report(
                            codes::INVALID_SUBSCRIPT,
                            pos,
                            format!("invalid subscript on `{name}`"),
                        );
                        return false;
                    };
                    if self.cc.symbols[sub].ident != Ident::EnumStruct {
                        self.report(
                            codes::STATIC_FIELD_NOT_ENUM_STRUCT,
                            pos,
                            format!("`{name}` is not an enum struct"),
                        );
                        return false;
                    }
                    Some(self.cc.symbols[sub].tag)
                }
                SizeofSuffix::Field(_) => {
                    let Some(sub) = subsym else {
                        self.report(
                            codes::INVALID_SUBSCRIPT,
                            pos,
                            format!("invalid subscript on `{name}`"),
                        );
                        return false;
                    };
                    let t = self.cc.symbols[sub].idx_tag;
                    if !self.cc.types.get(t).is_enum_struct() {
                        self.report(
                            codes::INVALID_NEW_TARGET,
                            pos,
                            format!("`{name}` has no enum-struct fields"),
                        );
                        return false;
                    }
                    Some(t)
                }
                SizeofSuffix::None => None,
            };

            if let Some(es_tag) = enum_type {
                let root = self
                    .cc
                    .types
                    .get(es_tag)
                    .as_enum_struct()
                    .expect("checked above");
                let field_name = match &suffix {
                    SizeofSuffix::Field(f) | SizeofSuffix::StaticField(f) => f.clone(),
                    SizeofSuffix::None => unreachable!(),
                };
                let Some(field) = self.find_enum_struct_field(root, &field_name) else {
                    let type_name = self.type_name(es_tag);
                    self.report(
                        codes::MEMBER_NOT_FOUND,
                        pos,
                        format!("`{type_name}` has no member `{field_name}`"),
                    );
                    return false;
                };
                let size = self.cc.symbols[field].array.length;
                if size > 0 {
                    val.constval = size;
                }
                expr.val = val;
                return true;
            }

            if s_ident == Ident::EnumStruct {
                val.constval = self.cc.symbols[sym].addr;
                expr.val = val;
                return true;
            }

            let s_level = self.cc.symbols[sym].array.level;
            if levels as i32 > s_level as i32 + 1 {
                self.report(
                    codes::INVALID_SUBSCRIPT,
                    pos,
                    format!("invalid subscript on `{name}`"),
                );
                return false;
            }
            if levels as i32 != s_level as i32 + 1 {
                let mut iter = sym;
                for _ in 0..levels {
                    iter = self.cc.symbols[iter].child.expect("level counted above");
                }
                if self.cc.symbols[iter].array.length == 0 {
                    self.report(
                        codes::SIZEOF_INDETERMINATE,
                        pos,
                        format!("indeterminate array size for `{name}`"),
                    );
                    return false;
                }
                val.constval = self.cc.symbols[iter].array.length;
            }
            // Addressing the innermost cells yields 1.
        }

        expr.val = val;
        true
    }

    // ====================================================================
    // Array initializer routing
    // ====================================================================

    /// `new`-array expressions are only admissible as array initializers;
    /// everything else checks normally.
    pub(crate) fn check_expr_for_array_initializer(&mut self, expr: &mut Expr) -> bool {
        match &expr.kind {
            ExprKind::NewArray { .. } => self.check_new_array_initializer(expr),
            _ => self.check_expr(expr),
        }
    }

    fn check_new_array_initializer(&mut self, expr: &mut Expr) -> bool {
        let tag = {
            let ExprKind::NewArray { tag, dims } = &mut expr.kind else {
                unreachable!()
            };
            let tag = *tag;
            for dim in dims.iter_mut() {
                if !self.check_expr(dim) {
                    return false;
                }
                if dim.lvalue {
                    self.rvalue(dim);
                }
                let v = dim.val;
                if !self.is_valid_index_tag(v.tag) {
                    let name = self.type_name(v.tag);
                    self.report(
                        codes::INVALID_INDEX_TAG,
                        dim.pos,
                        format!("`{name}` is not a valid array size tag"),
                    );
                    return false;
                }
                if v.ident == Ident::Constant && v.constval <= 0 {
                    self.report(codes::INVALID_ARRAY_SIZE, dim.pos, "invalid array size");
                    return false;
                }
            }
            tag
        };
        expr.val = Value::new(Ident::RefArray, tag);
        true
    }

    pub(crate) fn value_name(&self, val: &Value) -> String {
        match val.sym {
            Some(sym) => self.cc.symbols[sym].name.clone(),
            None => "-unknown-".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::nodes::{FunctionId, StmtKind};
    use crate::semantic::symbols::DefaultArg;
    use crate::semantic::testutil::*;

    fn body_stmt(unit: &TestUnit, fid: FunctionId, i: usize) -> &crate::ast::nodes::Stmt {
        let body = unit.tree.functions[fid.0 as usize].body.as_ref().unwrap();
        let StmtKind::Block(b) = &body.kind else {
            panic!("function bodies are blocks")
        };
        &b.stmts[i]
    }

    #[test]
    fn binary_constant_folding() {
        // 1 + 2 * 3 folds to 7 with tag int.
        let mut unit = TestUnit::new();
        unit.with_analyzer(|a| {
            let mut e = bin(BinOp::Add, int(1), bin(BinOp::Mul, int(2), int(3)));
            assert!(a.check_expr(&mut e));
            assert_eq!(e.val.ident, Ident::Constant);
            assert_eq!(e.val.constval, 7);
            assert_eq!(e.val.tag, Tag::INT);
        });
        assert!(unit.codes().is_empty());
    }

    #[test]
    fn comparison_folds_to_bool() {
        let mut unit = TestUnit::new();
        let bool_tag = unit.bool_tag();
        unit.with_analyzer(|a| {
            let mut e = bin(BinOp::Lt, int(1), int(2));
            assert!(a.check_expr(&mut e));
            assert_eq!(e.val.ident, Ident::Constant);
            assert_eq!(e.val.constval, 1);
            assert_eq!(e.val.tag, bool_tag);
        });
    }

    #[test]
    fn division_by_zero_reported() {
        let mut unit = TestUnit::new();
        unit.with_analyzer(|a| {
            let mut e = bin(BinOp::Div, int(1), int(0));
            assert!(a.check_expr(&mut e));
            assert_ne!(e.val.ident, Ident::Constant);
        });
        assert_eq!(unit.error_codes(), vec![codes::DIVIDE_BY_ZERO]);
    }

    #[test]
    fn unary_fold_and_bool_result() {
        let mut unit = TestUnit::new();
        let bool_tag = unit.bool_tag();
        unit.with_analyzer(|a| {
            let mut e = unary(UnaryOp::Not, int(0));
            assert!(a.check_expr(&mut e));
            assert_eq!(e.val.constval, 1);
            assert_eq!(e.val.tag, bool_tag);

            let mut e = unary(UnaryOp::Invert, int(0));
            assert!(a.check_expr(&mut e));
            assert_eq!(e.val.constval, -1);

            let mut e = unary(UnaryOp::Neg, int(5));
            assert!(a.check_expr(&mut e));
            assert_eq!(e.val.constval, -5);
        });
    }

    #[test]
    fn float_negation_is_bitwise() {
        let mut unit = TestUnit::new();
        let float = unit.float_tag();
        unit.with_analyzer(|a| {
            let bits = 2.5f32.to_bits() as cell;
            let mut e = unary(UnaryOp::Neg, tagged(bits, float));
            assert!(a.check_expr(&mut e));
            assert_eq!(f32::from_bits(e.val.constval as u32), -2.5);
            assert_eq!(e.val.tag, float);
        });
    }

    #[test]
    fn string_literal_encodes_negative_length() {
        let mut unit = TestUnit::new();
        let string_tag = unit.string_tag();
        unit.with_analyzer(|a| {
            let mut e = string("hello");
            assert!(a.check_expr(&mut e));
            assert_eq!(e.val.ident, Ident::Array);
            assert_eq!(e.val.constval, -6);
            assert_eq!(e.val.tag, string_tag);
        });
    }

    #[test]
    fn lvalue_feeds_operator_through_rvalue_load() {
        let mut unit = TestUnit::new();
        let x = unit.global_var("x", Tag::INT);
        unit.with_analyzer(|a| {
            let mut e = bin(BinOp::Add, sym(x), int(1));
            assert!(a.check_expr(&mut e));
            let ExprKind::Binary(b) = &e.kind else {
                panic!()
            };
            assert!(matches!(b.left.kind, ExprKind::Rvalue(_)));
            assert_eq!(e.val.ident, Ident::Expression);
        });
    }

    #[test]
    fn lvalue_bit_matches_ident_kind() {
        let mut unit = TestUnit::new();
        let x = unit.global_var("x", Tag::INT);
        let scope = unit.scope();
        let arr = unit.local_array(scope, "arr", Tag::INT, &[4]);
        unit.with_analyzer(|a| {
            let mut e = sym(x);
            assert!(a.check_expr(&mut e));
            assert!(e.lvalue);
            assert!(e.val.ident.is_lvalue_kind());

            let mut e = sym(arr);
            assert!(a.check_expr(&mut e));
            assert!(!e.lvalue);

            let mut e = index(sym(arr), int(2));
            assert!(a.check_expr(&mut e));
            assert!(e.lvalue);
            assert_eq!(e.val.ident, Ident::ArrayCell);
        });
    }

    #[test]
    fn constant_index_bounds_checked() {
        let mut unit = TestUnit::new();
        let scope = unit.scope();
        let arr = unit.local_array(scope, "arr", Tag::INT, &[3]);
        unit.with_analyzer(|a| {
            let mut e = index(sym(arr), int(5));
            assert!(!a.check_expr(&mut e));
        });
        assert_eq!(unit.error_codes(), vec![codes::INDEX_OUT_OF_BOUNDS]);
    }

    #[test]
    fn indexing_a_scalar_is_invalid() {
        let mut unit = TestUnit::new();
        let x = unit.global_var("x", Tag::INT);
        unit.with_analyzer(|a| {
            let mut e = index(sym(x), int(0));
            assert!(!a.check_expr(&mut e));
        });
        assert_eq!(unit.error_codes(), vec![codes::INVALID_SUBSCRIPT]);
    }

    #[test]
    fn array_operand_in_arithmetic() {
        let mut unit = TestUnit::new();
        let scope = unit.scope();
        let arr = unit.local_array(scope, "arr", Tag::INT, &[3]);
        unit.with_analyzer(|a| {
            let mut e = bin(BinOp::Add, sym(arr), int(1));
            assert!(!a.check_expr(&mut e));
        });
        assert_eq!(unit.error_codes(), vec![codes::ARRAY_NOT_INDEXED]);
    }

    #[test]
    fn logical_folds_and_yields_bool() {
        let mut unit = TestUnit::new();
        let bool_tag = unit.bool_tag();
        unit.with_analyzer(|a| {
            let mut e = Expr::new(
                ExprKind::Logical {
                    op: crate::ast::nodes::LogicalOp::And,
                    left: Box::new(int(2)),
                    right: Box::new(int(3)),
                },
                Span::dummy(),
            );
            assert!(a.check_expr(&mut e));
            assert_eq!(e.val.ident, Ident::Constant);
            assert_eq!(e.val.constval, 1);
            assert_eq!(e.val.tag, bool_tag);
        });
    }

    #[test]
    fn chained_compare_folds_when_all_constant() {
        let mut unit = TestUnit::new();
        unit.with_analyzer(|a| {
            let mut e = Expr::new(
                ExprKind::ChainedCompare {
                    first: Box::new(int(1)),
                    ops: vec![
                        crate::ast::nodes::CompareLink {
                            op: BinOp::Lt,
                            pos: Span::dummy(),
                            expr: int(2),
                            userop: None,
                        },
                        crate::ast::nodes::CompareLink {
                            op: BinOp::Lt,
                            pos: Span::dummy(),
                            expr: int(3),
                            userop: None,
                        },
                    ],
                },
                Span::dummy(),
            );
            assert!(a.check_expr(&mut e));
            assert_eq!(e.val.ident, Ident::Constant);
            assert_eq!(e.val.constval, 1);
        });
    }

    #[test]
    fn ternary_picks_larger_literal_string() {
        let mut unit = TestUnit::new();
        let x = unit.global_var("x", Tag::INT);
        unit.with_analyzer(|a| {
            let mut e = ternary(sym(x), string("hi"), string("longer"));
            assert!(a.check_expr(&mut e));
            assert_eq!(e.val.ident, Ident::RefArray);
            assert_eq!(e.val.constval, -7);
        });
        assert!(unit.error_codes().is_empty());
    }

    #[test]
    fn ternary_constant_condition_warns() {
        let mut unit = TestUnit::new();
        unit.with_analyzer(|a| {
            let mut e = ternary(int(1), int(2), int(3));
            assert!(a.check_expr(&mut e));
        });
        assert_eq!(unit.warning_codes(), vec![codes::ALWAYS_TRUE]);
    }

    #[test]
    fn ternary_mixed_array_and_scalar_fails() {
        let mut unit = TestUnit::new();
        let x = unit.global_var("x", Tag::INT);
        unit.with_analyzer(|a| {
            let mut e = ternary(sym(x), string("hi"), int(3));
            assert!(!a.check_expr(&mut e));
        });
        assert_eq!(unit.error_codes(), vec![codes::ARRAY_NOT_INDEXED]);
    }

    #[test]
    fn binary_userop_resolves_and_sets_tag() {
        let mut unit = TestUnit::new();
        let float = unit.float_tag();
        let op = unit.declare_operator("+", &[float, float], float);
        unit.with_analyzer(|a| {
            let mut e = bin(BinOp::Add, tagged(0, float), tagged(0, float));
            assert!(a.check_expr(&mut e));
            assert_eq!(e.val.tag, float);
            let ExprKind::Binary(b) = &e.kind else {
                panic!()
            };
            assert_eq!(b.userop.map(|u| u.sym), Some(op));
        });
        assert!(unit.codes().is_empty());
    }

    #[test]
    fn not_userop_rewrites_operand() {
        let mut unit = TestUnit::new();
        let float = unit.float_tag();
        let bool_tag = unit.bool_tag();
        unit.declare_operator("!", &[float], bool_tag);
        unit.with_analyzer(|a| {
            let mut e = unary(UnaryOp::Not, tagged(0, float));
            assert!(a.check_expr(&mut e));
            assert_eq!(e.val.tag, bool_tag);
            let ExprKind::Unary { expr: inner, .. } = &e.kind else {
                panic!()
            };
            assert!(matches!(inner.kind, ExprKind::CallUserOp { .. }));
        });
    }

    #[test]
    fn test_position_warns_on_constant_condition() {
        let mut unit = TestUnit::new();
        unit.with_analyzer(|a| {
            let mut e = int(1);
            assert!(a.analyze_for_test(&mut e));
        });
        assert_eq!(unit.warning_codes(), vec![codes::ALWAYS_TRUE]);

        let mut unit = TestUnit::new();
        unit.with_analyzer(|a| {
            let mut e = int(0);
            assert!(a.analyze_for_test(&mut e));
        });
        assert_eq!(unit.warning_codes(), vec![codes::ALWAYS_FALSE]);
    }

    #[test]
    fn test_position_rejects_arrays() {
        let mut unit = TestUnit::new();
        let scope = unit.scope();
        let arr = unit.local_array(scope, "arr", Tag::INT, &[3]);
        unit.with_analyzer(|a| {
            let mut e = sym(arr);
            assert!(!a.analyze_for_test(&mut e));
        });
        assert_eq!(unit.error_codes(), vec![codes::ARRAY_NOT_INDEXED]);
    }

    #[test]
    fn test_position_uses_negation_userop() {
        let mut unit = TestUnit::new();
        let float = unit.float_tag();
        let bool_tag = unit.bool_tag();
        unit.declare_operator("!", &[float], bool_tag);
        let f = unit.global_var("f", float);
        unit.with_analyzer(|a| {
            let mut e = sym(f);
            assert!(a.analyze_for_test(&mut e));
            // Rewritten to !userop(f); the emitter folds the double negation.
            let ExprKind::Unary { op, expr: inner } = &e.kind else {
                panic!("expected negation wrapper, got {:?}", e.kind)
            };
            assert_eq!(*op, UnaryOp::Not);
            assert!(matches!(inner.kind, ExprKind::CallUserOp { .. }));
            assert_eq!(e.val.tag, bool_tag);
        });
        assert!(unit.codes().is_empty());
    }

    #[test]
    fn cast_to_void_is_invalid() {
        let mut unit = TestUnit::new();
        let void = unit.void_tag();
        unit.with_analyzer(|a| {
            let mut e = Expr::new(
                ExprKind::Cast {
                    tag: void,
                    expr: Box::new(int(1)),
                },
                Span::dummy(),
            );
            assert!(!a.check_expr(&mut e));
        });
        assert_eq!(unit.error_codes(), vec![codes::VOID_NOT_ALLOWED]);
    }

    #[test]
    fn cast_retags_and_keeps_lvalue() {
        let mut unit = TestUnit::new();
        let float = unit.float_tag();
        let x = unit.global_var("x", Tag::INT);
        unit.with_analyzer(|a| {
            let mut e = Expr::new(
                ExprKind::Cast {
                    tag: float,
                    expr: Box::new(sym(x)),
                },
                Span::dummy(),
            );
            assert!(a.check_expr(&mut e));
            assert_eq!(e.val.tag, float);
            assert!(e.lvalue);
        });
    }

    #[test]
    fn comma_takes_last_value_and_demotes_constants() {
        let mut unit = TestUnit::new();
        let x = unit.global_var("x", Tag::INT);
        unit.with_analyzer(|a| {
            let mut e = Expr::new(
                ExprKind::Comma {
                    exprs: vec![assign(sym(x), int(1)), int(7)],
                    has_side_effects: false,
                },
                Span::dummy(),
            );
            assert!(a.check_expr(&mut e));
            // The constant is demoted so the emitter still runs the
            // side-effecting operand.
            assert_eq!(e.val.ident, Ident::Expression);
            assert_eq!(e.val.tag, Tag::INT);
            let ExprKind::Comma {
                has_side_effects, ..
            } = &e.kind
            else {
                panic!()
            };
            assert!(*has_side_effects);
        });
    }

    #[test]
    fn sizeof_reports_array_length() {
        let mut unit = TestUnit::new();
        let scope = unit.scope();
        let arr = unit.local_array(scope, "arr", Tag::INT, &[8]);
        unit.with_analyzer(|a| {
            let mut e = Expr::new(
                ExprKind::Sizeof(Box::new(crate::ast::nodes::SizeofExpr {
                    sym: arr,
                    name: "arr".into(),
                    array_levels: 0,
                    suffix: crate::ast::nodes::SizeofSuffix::None,
                })),
                Span::dummy(),
            );
            assert!(a.check_expr(&mut e));
            assert_eq!(e.val.ident, Ident::Constant);
            assert_eq!(e.val.constval, 8);
        });
    }

    #[test]
    fn sizeof_scalar_is_one_and_constants_rejected() {
        let mut unit = TestUnit::new();
        let x = unit.global_var("x", Tag::INT);
        let k = unit.constant("k", 3, Tag::INT);
        unit.with_analyzer(|a| {
            let mut e = Expr::new(
                ExprKind::Sizeof(Box::new(crate::ast::nodes::SizeofExpr {
                    sym: x,
                    name: "x".into(),
                    array_levels: 0,
                    suffix: crate::ast::nodes::SizeofSuffix::None,
                })),
                Span::dummy(),
            );
            assert!(a.check_expr(&mut e));
            assert_eq!(e.val.constval, 1);

            let mut e = Expr::new(
                ExprKind::Sizeof(Box::new(crate::ast::nodes::SizeofExpr {
                    sym: k,
                    name: "k".into(),
                    array_levels: 0,
                    suffix: crate::ast::nodes::SizeofSuffix::None,
                })),
                Span::dummy(),
            );
            assert!(!a.check_expr(&mut e));
        });
        assert_eq!(unit.error_codes(), vec![codes::SYMBOL_HAS_NO_SIZE]);
    }

    #[test]
    fn new_array_outside_initializer_is_gated() {
        let mut unit = TestUnit::new();
        unit.with_analyzer(|a| {
            let mut e = Expr::new(
                ExprKind::NewArray {
                    tag: Tag::INT,
                    dims: vec![int(4)],
                },
                Span::dummy(),
            );
            assert!(!a.check_expr(&mut e));
        });
        assert_eq!(unit.error_codes(), vec![codes::REFARRAY_NOT_ALLOWED]);
    }

    // ================================================================
    // Calls
    // ================================================================

    #[test]
    fn call_fills_missing_arguments_with_defaults() {
        let mut unit = TestUnit::new();
        let mut b = ArgInfo::scalar("b", Tag::INT);
        b.default = Some(DefaultArg {
            tag: Tag::INT,
            val: Some(5),
            array: None,
            sym: None,
        });
        let args = vec![ArgInfo::scalar("a", Tag::INT), b];
        let (f, _) = unit.func(
            FuncSpec::new("helper", Tag::INT).args(args),
            None,
            Some(vec![ret(Some(int(0)))]),
        );
        let (_main, main_fid) = unit.public_main(vec![expr_stmt(call(sym(f), vec![int(1)]))]);
        assert!(unit.analyze());

        let stmt = body_stmt(&unit, main_fid, 0);
        let StmtKind::Expr(e) = &stmt.kind else {
            panic!()
        };
        let ExprKind::Call(call_expr) = &e.kind else {
            panic!()
        };
        // Every non-vararg formal has an argv entry: the user expression or
        // a default placeholder matched to the formal.
        assert_eq!(call_expr.argv.len(), 2);
        assert!(call_expr.argv[0].expr.is_some());
        let default = call_expr.argv[1].expr.as_ref().unwrap();
        assert!(matches!(default.kind, ExprKind::DefaultArg { arg_index: 1 }));
        assert_eq!(call_expr.argv[1].arg_index, 1);
    }

    #[test]
    fn call_missing_argument_without_default() {
        let mut unit = TestUnit::new();
        let args = vec![ArgInfo::scalar("a", Tag::INT)];
        let (f, _) = unit.func(
            FuncSpec::new("helper", Tag::INT).args(args),
            None,
            Some(vec![ret(Some(int(0)))]),
        );
        unit.public_main(vec![expr_stmt(call(sym(f), vec![]))]);
        assert!(!unit.analyze());
        assert!(unit.error_codes().contains(&codes::NO_DEFAULT_VALUE));
    }

    #[test]
    fn call_with_too_many_arguments() {
        let mut unit = TestUnit::new();
        let (f, _) = unit.func(
            FuncSpec::new("helper", Tag::INT),
            None,
            Some(vec![ret(Some(int(0)))]),
        );
        unit.public_main(vec![expr_stmt(call(sym(f), vec![int(1)]))]);
        assert!(!unit.analyze());
        assert!(unit
            .error_codes()
            .contains(&codes::ARGUMENT_COUNT_MISMATCH));
    }

    #[test]
    fn named_argument_resolution_and_duplicates() {
        let mut unit = TestUnit::new();
        let mut b = ArgInfo::scalar("b", Tag::INT);
        b.default = Some(DefaultArg {
            tag: Tag::INT,
            val: Some(0),
            array: None,
            sym: None,
        });
        let args = vec![ArgInfo::scalar("a", Tag::INT), b];
        let (f, _) = unit.func(
            FuncSpec::new("helper", Tag::INT).args(args),
            None,
            Some(vec![ret(Some(int(0)))]),
        );
        unit.public_main(vec![expr_stmt(call_named(
            sym(f),
            vec![(None, int(1)), (Some("a"), int(2))],
        ))]);
        assert!(!unit.analyze());
        assert!(unit.error_codes().contains(&codes::ARGUMENT_ALREADY_SET));
    }

    #[test]
    fn named_argument_unknown_name() {
        let mut unit = TestUnit::new();
        let args = vec![ArgInfo::scalar("a", Tag::INT)];
        let (f, _) = unit.func(
            FuncSpec::new("helper", Tag::INT).args(args),
            None,
            Some(vec![ret(Some(int(0)))]),
        );
        unit.public_main(vec![expr_stmt(call_named(
            sym(f),
            vec![(Some("nope"), int(2))],
        ))]);
        assert!(!unit.analyze());
        assert!(unit.error_codes().contains(&codes::UNDEFINED_SYMBOL));
    }

    #[test]
    fn reference_argument_requires_mutable_lvalue() {
        let mut unit = TestUnit::new();
        let mut arg = ArgInfo::scalar("out", Tag::INT);
        arg.ident = Ident::Reference;
        let (f, _) = unit.func(
            FuncSpec::new("helper", Tag::INT).args(vec![arg]),
            None,
            Some(vec![ret(Some(int(0)))]),
        );
        unit.public_main(vec![expr_stmt(call(sym(f), vec![int(3)]))]);
        assert!(!unit.analyze());
        assert!(unit.error_codes().contains(&codes::ARG_TYPE_MISMATCH));
    }

    #[test]
    fn variadic_constant_argument_takes_heap_ownership() {
        let mut unit = TestUnit::new();
        let any = unit.cc.types.tag_any();
        let mut rest = ArgInfo::scalar("...", any);
        rest.ident = Ident::VarArgs;
        let mut spec = FuncSpec::new("emit", unit.void_tag());
        spec.args = vec![rest];
        spec.is_native = true;
        let (f, _) = unit.func(spec, None, None);
        let (_, main_fid) = unit.public_main(vec![expr_stmt(call(sym(f), vec![int(3)]))]);
        assert!(unit.analyze());

        // The constant needed a heap temporary; the enclosing block claimed
        // ownership, and nothing is left pending.
        let body = unit.tree.functions[main_fid.0 as usize].body.as_ref().unwrap();
        assert!(body.tree_has_heap_allocs);
        let stmt = body_stmt(&unit, main_fid, 0);
        let StmtKind::Expr(e) = &stmt.kind else {
            panic!()
        };
        let ExprKind::Call(c) = &e.kind else {
            panic!()
        };
        assert!(c.argv[0].expr.as_ref().unwrap().can_alloc_heap);
    }

    #[test]
    fn string_array_argument_mismatch() {
        let mut unit = TestUnit::new();
        let string_tag = unit.string_tag();
        let mut arg = ArgInfo::scalar("buf", string_tag);
        arg.ident = Ident::RefArray;
        arg.dims = vec![0];
        let (f, _) = unit.func(
            FuncSpec::new("helper", Tag::INT).args(vec![arg]),
            None,
            Some(vec![ret(Some(int(0)))]),
        );
        let scope = unit.scope();
        let arr = unit.local_array(scope, "nums", Tag::INT, &[4]);
        unit.public_main(vec![expr_stmt(call(sym(f), vec![sym(arr)]))]);
        assert!(!unit.analyze());
        assert!(unit.error_codes().contains(&codes::STRING_ARG_MISMATCH));
    }

    #[test]
    fn refarray_shape_wildcards_and_mismatches() {
        let mut unit = TestUnit::new();
        let mut arg = ArgInfo::scalar("grid", Tag::INT);
        arg.ident = Ident::RefArray;
        arg.dims = vec![0, 8];
        let (f, _) = unit.func(
            FuncSpec::new("helper", Tag::INT).args(vec![arg.clone()]),
            None,
            Some(vec![ret(Some(int(0)))]),
        );
        let scope = unit.scope();
        let good = {
            let id = unit.cc.symbols.new_array_variable(
                "good",
                0,
                Ident::Array,
                ScopeKind::Local,
                Tag::INT,
                &[4, 8],
                Tag::INT,
            );
            unit.cc.scopes.add(scope, "good", id).unwrap();
            id
        };
        unit.public_main(vec![expr_stmt(call(sym(f), vec![sym(good)]))]);
        assert!(unit.analyze());
        assert!(unit.error_codes().is_empty());

        // Mismatched inner dimension.
        let mut unit = TestUnit::new();
        let (f, _) = unit.func(
            FuncSpec::new("helper", Tag::INT).args(vec![arg]),
            None,
            Some(vec![ret(Some(int(0)))]),
        );
        let scope = unit.scope();
        let bad = unit.cc.symbols.new_array_variable(
            "bad",
            0,
            Ident::Array,
            ScopeKind::Local,
            Tag::INT,
            &[4, 9],
            Tag::INT,
        );
        unit.cc.scopes.add(scope, "bad", bad).unwrap();
        unit.public_main(vec![expr_stmt(call(sym(f), vec![sym(bad)]))]);
        assert!(!unit.analyze());
        assert!(unit.error_codes().contains(&codes::ARRAY_SIZE_MISMATCH));
    }

    #[test]
    fn bare_function_reference_becomes_callback() {
        let mut unit = TestUnit::new();
        let (f, _) = unit.func(
            FuncSpec::new("handler", Tag::INT),
            None,
            Some(vec![ret(Some(int(0)))]),
        );
        let cb = unit.global_var("cb", Tag::INT);
        unit.public_main(vec![expr_stmt(assign(sym(cb), sym(f)))]);
        assert!(unit.analyze());
        // The reference resolved to a closure with the synthesized
        // function tag, and marked the target as a callback.
        assert!(unit.cc.symbols[f].callback);
        assert!(unit.cc.types.find("::handler").is_some());
    }
}
