//! Usage marking and heap-allocation ownership.
//!
//! After a statement checks successfully, a walk over its expressions
//! propagates READ bits to the symbols that are actually consumed. The
//! left side of an assignment is written, not used; that asymmetry is what
//! makes the "assigned but never read" diagnostic possible.
//!
//! Heap tracking is a single pending bit: expressions that may allocate a
//! heap temporary set it, and the nearest enclosing statement that brackets
//! ownership claims it on exit.

use crate::ast::nodes::{Expr, ExprKind, Stmt, StmtKind};
use crate::semantic::analyzer::Analyzer;
use crate::semantic::symbols::USAGE_READ;

impl<'a> Analyzer<'a> {
    // ====================================================================
    // Heap ownership
    // ====================================================================

    /// Note that this expression may allocate a heap temporary when it is
    /// emitted. Some enclosing statement must claim the allocation.
    pub(crate) fn needs_heap_alloc(&mut self, expr: &mut Expr) {
        expr.can_alloc_heap = true;
        self.pending_heap = true;
    }

    pub(crate) fn assign_heap_ownership_stmt(&mut self, stmt: &mut Stmt) {
        if self.pending_heap {
            stmt.tree_has_heap_allocs = true;
            self.pending_heap = false;
        }
    }

    pub(crate) fn assign_heap_ownership_expr(&mut self, expr: &mut Expr) {
        if self.pending_heap {
            expr.tree_has_heap_allocs = true;
            self.pending_heap = false;
        }
    }

    // ====================================================================
    // Usage marking
    // ====================================================================

    /// Mark the ultimate symbol source of this expression's value as read.
    fn mark_expr_used(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Symbol { sym } | ExprKind::This { sym } => {
                self.cc.symbols.mark_usage(*sym, USAGE_READ);
            }
            ExprKind::Call(call) => {
                if let Some(sym) = call.sym {
                    self.cc.symbols[sym].retvalue_used = true;
                }
            }
            ExprKind::Rvalue(inner) | ExprKind::CallUserOp { expr: inner, .. } => {
                self.mark_expr_used(inner);
            }
            ExprKind::Comma { exprs, .. } => {
                if let Some(last) = exprs.last() {
                    self.mark_expr_used(last);
                }
            }
            _ => {}
        }
    }

    pub(crate) fn mark_and_process(&mut self, expr: &Expr) {
        self.process_expr_uses(expr);
        self.mark_expr_used(expr);
    }

    /// Walk sub-expressions, marking the ones whose values are consumed.
    pub(crate) fn process_expr_uses(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Const { .. }
            | ExprKind::StringLit { .. }
            | ExprKind::Null
            | ExprKind::Symbol { .. }
            | ExprKind::This { .. }
            | ExprKind::Sizeof(_)
            | ExprKind::DefaultArg { .. } => {}
            ExprKind::ArrayLit(exprs) | ExprKind::NewArray { dims: exprs, .. } => {
                for e in exprs {
                    self.mark_and_process(e);
                }
            }
            ExprKind::Unary { expr: inner, .. }
            | ExprKind::Cast { expr: inner, .. }
            | ExprKind::Rvalue(inner)
            | ExprKind::CallUserOp { expr: inner, .. } => {
                self.mark_and_process(inner);
            }
            ExprKind::IncDec(inc) => self.mark_and_process(&inc.expr),
            ExprKind::Binary(b) => {
                // Assignment targets are written, not used, even for
                // read-modify-write operators.
                if b.op.is_assign() {
                    self.process_expr_uses(&b.left);
                } else {
                    self.mark_and_process(&b.left);
                }
                self.mark_and_process(&b.right);
            }
            ExprKind::Logical { left, right, .. } => {
                self.mark_and_process(left);
                self.mark_and_process(right);
            }
            ExprKind::ChainedCompare { first, ops } => {
                self.mark_and_process(first);
                for link in ops {
                    self.mark_and_process(&link.expr);
                }
            }
            ExprKind::Ternary {
                first,
                second,
                third,
            } => {
                self.mark_and_process(first);
                self.mark_and_process(second);
                self.mark_and_process(third);
            }
            ExprKind::Index { base, index } => {
                self.mark_and_process(base);
                self.mark_and_process(index);
            }
            ExprKind::FieldAccess(fa) => self.mark_and_process(&fa.base),
            ExprKind::Call(call) => {
                for arg in &call.argv {
                    if let Some(e) = &arg.expr {
                        self.mark_and_process(e);
                    }
                }
            }
            ExprKind::Comma { exprs, .. } => {
                for e in exprs {
                    self.process_expr_uses(e);
                }
            }
            ExprKind::StructInit { fields } => {
                for field in fields {
                    self.mark_and_process(&field.value);
                }
            }
        }
    }

    /// Like [`Self::process_expr_uses`] but for expressions whose result is
    /// discarded; the branches of a ternary and comma operands don't count
    /// as uses of their final values.
    fn process_discard_uses(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Ternary {
                first,
                second,
                third,
            } => {
                self.mark_and_process(first);
                self.process_expr_uses(second);
                self.process_expr_uses(third);
            }
            ExprKind::Comma { exprs, .. } => {
                for e in exprs {
                    self.process_expr_uses(e);
                }
            }
            _ => self.process_expr_uses(expr),
        }
    }

    /// Statement-level walk, run once per checked statement.
    pub(crate) fn process_stmt_uses(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::VarDecl(decl) => {
                if let Some(Expr {
                    kind: ExprKind::Binary(b),
                    ..
                }) = &decl.init
                {
                    self.mark_and_process(&b.right);
                }
            }
            StmtKind::Expr(expr) => self.process_discard_uses(expr),
            StmtKind::Block(block) => {
                for s in &block.stmts {
                    self.process_stmt_uses(s);
                }
            }
            StmtKind::StmtList(stmts) => {
                for s in stmts {
                    self.process_stmt_uses(s);
                }
            }
            StmtKind::If(ifs) => {
                self.mark_and_process(&ifs.cond);
                self.process_stmt_uses(&ifs.on_true);
                if let Some(on_false) = &ifs.on_false {
                    self.process_stmt_uses(on_false);
                }
            }
            StmtKind::Loop(lp) => {
                self.mark_and_process(&lp.cond);
                self.process_stmt_uses(&lp.body);
            }
            StmtKind::For(fs) => {
                if let Some(init) = &fs.init {
                    self.process_stmt_uses(init);
                }
                if let Some(cond) = &fs.cond {
                    self.mark_and_process(cond);
                }
                if let Some(advance) = &fs.advance {
                    self.process_expr_uses(advance);
                }
                self.process_stmt_uses(&fs.body);
            }
            StmtKind::Switch(sw) => {
                self.mark_and_process(&sw.expr);
                for case in &sw.cases {
                    for label in &case.labels {
                        self.mark_and_process(label);
                    }
                    self.process_stmt_uses(&case.body);
                }
                if let Some(default_case) = &sw.default_case {
                    self.process_stmt_uses(default_case);
                }
            }
            StmtKind::Return(ret) => {
                if let Some(expr) = &ret.expr {
                    self.mark_and_process(expr);
                }
            }
            StmtKind::Exit(expr) | StmtKind::Assert(expr) => self.mark_and_process(expr),
            StmtKind::StaticAssert { expr, .. } => self.mark_and_process(expr),
            StmtKind::Delete(del) => {
                self.mark_and_process(&del.expr);
                if let Some(map) = del.map {
                    if let Some(dtor) = self.cc.types.methodmap(map).dtor {
                        let target = self.cc.types.method(dtor).target;
                        self.cc.symbols.mark_usage(target, USAGE_READ);
                    }
                }
            }
            StmtKind::FunctionDecl(fid) => self.process_function_uses(*fid),
            StmtKind::EnumStructDecl { methods, .. } => {
                for fid in methods.clone() {
                    self.process_function_uses(fid);
                }
            }
            StmtKind::MethodmapDecl(decl) => {
                let mut fids: Vec<_> = Vec::new();
                for prop in &decl.properties {
                    fids.extend(prop.getter);
                    fids.extend(prop.setter);
                }
                fids.extend(decl.methods.iter().copied());
                for fid in fids {
                    self.process_function_uses(fid);
                }
            }
            StmtKind::Break
            | StmtKind::Continue
            | StmtKind::PragmaUnused(_)
            | StmtKind::ChangeScope(_)
            | StmtKind::TypeDecl => {}
        }
    }

    fn process_function_uses(&mut self, fid: crate::ast::nodes::FunctionId) {
        // The body lives in the pool; take it out for the walk so the
        // borrows stay disjoint.
        let Some(body) = self.funcs[fid.0 as usize].body.take() else {
            return;
        };
        self.process_stmt_uses(&body);
        self.funcs[fid.0 as usize].body = Some(body);
    }
}
