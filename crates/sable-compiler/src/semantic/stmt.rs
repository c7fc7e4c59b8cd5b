//! The statement checker: flow-type propagation, reachability, loops,
//! switches, returns, and declaration statements.

use std::collections::HashSet;

use sable_common::codes;
use sable_common::span::Span;

use crate::ast::nodes::{
    ArrayReturn, Expr, ExprKind, LoopKind, ReturnStmt, Stmt, StmtKind, StructInitField,
    VarDeclStmt,
};
use crate::semantic::analyzer::Analyzer;
use crate::semantic::operators::MATCH_COERCE;
use crate::semantic::scope::{ScopeId, ScopeKind};
use crate::semantic::symbols::{SymbolId, USAGE_READ, USAGE_WRITTEN};
use crate::semantic::types::PstructId;
use crate::semantic::value::{cell, FlowType, Ident, Tag};

impl<'a> Analyzer<'a> {
    pub(crate) fn check_stmt_default(&mut self, stmt: &mut Stmt) -> bool {
        self.check_stmt(stmt, false)
    }

    /// Check one statement. When `owns_heap` is set (or the statement is a
    /// variable declaration), any heap allocation pending when the check
    /// finishes is assigned to this node, and the previous pending state is
    /// restored.
    pub(crate) fn check_stmt(&mut self, stmt: &mut Stmt, owns_heap: bool) -> bool {
        let owns_heap = owns_heap || matches!(stmt.kind, StmtKind::VarDecl(_));
        let saved = owns_heap.then(|| std::mem::replace(&mut self.pending_heap, false));
        let ok = self.check_stmt_inner(stmt);
        if let Some(prev) = saved {
            self.assign_heap_ownership_stmt(stmt);
            self.pending_heap = prev;
        }
        ok
    }

    fn check_stmt_inner(&mut self, stmt: &mut Stmt) -> bool {
        match &stmt.kind {
            StmtKind::ChangeScope(scope) => {
                let scope = *scope;
                self.check_change_scope(scope)
            }
            StmtKind::VarDecl(_) => self.check_var_decl(stmt),
            // Checked even without side effects; the warning is separate.
            StmtKind::Expr(_) => self.check_expr_stmt(stmt),
            StmtKind::Exit(_) => self.check_exit_stmt(stmt),
            StmtKind::Block(_) => self.check_block_stmt(stmt),
            StmtKind::StmtList(_) => self.check_stmt_list_stmt(stmt),
            StmtKind::Assert(_) => self.check_assert_stmt(stmt),
            StmtKind::If(_) => self.check_if_stmt(stmt),
            StmtKind::Delete(_) => self.check_delete_stmt(stmt),
            StmtKind::Loop(_) => self.check_loop_stmt(stmt),
            StmtKind::For(_) => self.check_for_stmt(stmt),
            StmtKind::Switch(_) => self.check_switch_stmt(stmt),
            StmtKind::FunctionDecl(fid) => {
                let fid = *fid;
                self.check_function(fid)
            }
            StmtKind::EnumStructDecl { .. } => self.check_enum_struct_decl(stmt),
            StmtKind::MethodmapDecl(_) => self.check_methodmap_decl(stmt),
            StmtKind::Return(_) => self.check_return_stmt(stmt),
            StmtKind::PragmaUnused(_) => self.check_pragma_unused(stmt),
            StmtKind::StaticAssert { .. } => self.check_static_assert(stmt),
            StmtKind::Break | StmtKind::Continue => self.check_loop_control(stmt),
            StmtKind::TypeDecl => true,
        }
    }

    /// Check a statement sequence, resetting the error flag between
    /// statements so one bad statement doesn't suppress the next. Usage
    /// marking runs per statement, so scope-exit checks observe the READ
    /// bits of everything the scope's statements consumed. Returns the
    /// combined result and the list's flow type.
    pub(crate) fn check_stmt_seq(&mut self, stmts: &mut [Stmt]) -> (bool, FlowType) {
        let mut ok = true;
        let mut flow = FlowType::None;
        for stmt in stmts.iter_mut() {
            self.cc.reports.reset_error_flag();
            let stmt_ok = self.check_stmt_default(stmt);
            ok &= stmt_ok;
            if stmt.flow != FlowType::None && flow == FlowType::None {
                flow = stmt.flow;
            }
            if stmt_ok {
                self.process_stmt_uses(stmt);
            }
        }
        (ok, flow)
    }

    fn check_stmt_list_stmt(&mut self, stmt: &mut Stmt) -> bool {
        let (ok, flow) = {
            let StmtKind::StmtList(stmts) = &mut stmt.kind else {
                unreachable!()
            };
            self.check_stmt_seq(stmts)
        };
        stmt.flow = flow;
        ok
    }

    fn check_block_stmt(&mut self, stmt: &mut Stmt) -> bool {
        let saved_heap = std::mem::replace(&mut self.pending_heap, false);
        let flow = {
            let StmtKind::Block(block) = &mut stmt.kind else {
                unreachable!()
            };
            let saved_scope = block
                .scope
                .map(|s| std::mem::replace(&mut self.cx.scope, s));

            let mut ok = true;
            let mut flow = FlowType::None;
            for s in block.stmts.iter_mut() {
                self.cc.reports.reset_error_flag();
                if ok
                    && !self.cx.warned_unreachable
                    && (self.cx.always_returns || flow != FlowType::None)
                {
                    self.report(codes::UNREACHABLE_CODE, s.pos, "unreachable code");
                    self.cx.warned_unreachable = true;
                }
                let stmt_ok = self.check_stmt_default(s);
                ok &= stmt_ok;
                if s.flow != FlowType::None && flow == FlowType::None {
                    flow = s.flow;
                }
                if stmt_ok {
                    self.process_stmt_uses(s);
                }
            }

            if let Some(scope) = block.scope {
                self.test_symbols(scope, true);
            }
            if let Some(prev) = saved_scope {
                self.cx.scope = prev;
            }
            flow
        };
        stmt.flow = flow;
        // Blocks always take heap ownership.
        self.assign_heap_ownership_stmt(stmt);
        self.pending_heap = saved_heap;
        true
    }

    // ====================================================================
    // Declarations
    // ====================================================================

    fn check_var_decl(&mut self, stmt: &mut Stmt) -> bool {
        let pos = stmt.pos;
        let StmtKind::VarDecl(decl) = &mut stmt.kind else {
            unreachable!()
        };
        let sym = decl.sym;

        // Constants are checked at bind time.
        if self.cc.symbols[sym].ident == Ident::Constant {
            return true;
        }

        let sym_tag = self.cc.symbols[sym].tag;
        if let Some(ps) = self.cc.types.get(sym_tag).as_struct() {
            return self.check_pstruct_decl(decl, ps, pos);
        }

        if matches!(decl.type_info.ident, Some(Ident::Array) | Some(Ident::RefArray)) {
            if !self.check_array_decl(decl) {
                return false;
            }
            let s = &self.cc.symbols[sym];
            if s.vclass == ScopeKind::Local && s.ident == Ident::RefArray {
                self.pending_heap = true;
            }
            return true;
        }

        debug_assert!(matches!(
            decl.type_info.ident,
            None | Some(Ident::Variable) | Some(Ident::Reference)
        ));

        // The initializer is a synthesized assignment, so checking it runs
        // the full assignment machinery.
        if let Some(init) = &mut decl.init {
            if !self.check_expr(init) {
                return false;
            }
        }

        let vclass = self.cc.symbols[sym].vclass;
        if decl.init.is_some() && vclass != ScopeKind::Local {
            let rhs = match &mut decl.init {
                Some(Expr {
                    kind: ExprKind::Binary(b),
                    ..
                }) => &mut b.right,
                _ => return true,
            };
            if self.eval_const(rhs).is_none() {
                // Argument defaults may name a global symbol.
                if vclass == ScopeKind::Argument && matches!(rhs.kind, ExprKind::Symbol { .. }) {
                    return true;
                }
                self.report(codes::NOT_CONSTANT, rhs.pos, "must be a constant expression");
            }
        }
        true
    }

    fn check_pstruct_decl(&mut self, decl: &mut VarDeclStmt, ps: PstructId, pos: Span) -> bool {
        let sym = decl.sym;
        let Some(init) = &mut decl.init else {
            return true;
        };
        let ExprKind::Binary(b) = &mut init.kind else {
            return true;
        };
        let ExprKind::StructInit { fields } = &mut b.right.kind else {
            debug_assert!(false, "struct declarations parse to named-field initializers");
            return false;
        };

        let field_count = self.cc.types.pstruct(ps).fields.len();
        let mut visited = vec![false; field_count];

        // Do as much checking as possible before bailing out.
        let mut ok = true;
        for field in fields.iter_mut() {
            ok &= self.check_pstruct_arg(sym, ps, field, &mut visited);
        }
        if !ok {
            return false;
        }

        // Unfilled string fields default to empty strings.
        for (index, seen) in visited.iter().enumerate() {
            if *seen {
                continue;
            }
            let (name, ident, tag) = {
                let f = &self.cc.types.pstruct(ps).fields[index];
                (f.name.clone(), f.ident, f.tag)
            };
            if ident == Ident::RefArray {
                debug_assert_eq!(tag, self.cc.types.tag_string());
                fields.push(StructInitField {
                    name,
                    value: Expr::new(
                        ExprKind::StringLit {
                            text: String::new(),
                        },
                        pos,
                    ),
                    pos,
                });
            }
        }
        true
    }

    fn check_pstruct_arg(
        &mut self,
        decl_sym: SymbolId,
        ps: PstructId,
        field: &mut StructInitField,
        visited: &mut [bool],
    ) -> bool {
        let decl_name = self.cc.symbols[decl_sym].name.clone();
        let Some((index, f_ident, f_tag)) = self
            .cc
            .types
            .pstruct(ps)
            .field(&field.name)
            .map(|(i, f)| (i, f.ident, f.tag))
        else {
            self.report(
                codes::NOT_A_MEMBER,
                field.pos,
                format!("`{}` is not a member of struct `{decl_name}`", field.name),
            );
            return false;
        };

        if visited[index] {
            self.report(
                codes::DUPLICATE_FIELD_INIT,
                field.value.pos,
                format!("field `{}` is initialized twice", field.name),
            );
        }
        visited[index] = true;

        match &field.value.kind {
            ExprKind::StringLit { .. } => {
                if f_ident != Ident::RefArray {
                    self.report(
                        codes::ARRAY_DIMENSION_MISMATCH,
                        field.value.pos,
                        format!("field `{}` is not a string field", field.name),
                    );
                    return false;
                }
                let string_tag = self.cc.types.tag_string();
                if f_tag != string_tag {
                    let want = self.type_name(f_tag);
                    self.report(
                        codes::TAG_MISMATCH,
                        field.value.pos,
                        format!("tag mismatch (expected `{want}`, got `String`)"),
                    );
                }
                true
            }
            ExprKind::Const { value, tag } => {
                if f_ident != Ident::Variable {
                    self.report(
                        codes::ARRAY_ASSIGN_MUST_BE_SIMPLE,
                        field.value.pos,
                        format!("field `{}` cannot take a scalar value", field.name),
                    );
                    return false;
                }
                // Tag checks were historically missing here, so constants 0
                // and 1 still coerce to bool without complaint.
                let bool_tag = self.cc.types.tag_bool();
                let exempt =
                    f_tag == bool_tag && *tag == Tag::INT && (*value == 0 || *value == 1);
                if !exempt {
                    let pos = field.value.pos;
                    let tag = *tag;
                    self.match_tag(f_tag, tag, MATCH_COERCE, pos);
                }
                true
            }
            ExprKind::Symbol { sym } => {
                let sym = *sym;
                let (s_ident, s_tag, s_level) = {
                    let s = &self.cc.symbols[sym];
                    (s.ident, s.tag, s.array.level)
                };
                let pos = field.value.pos;
                match f_ident {
                    Ident::Variable => {
                        if s_ident != Ident::Variable {
                            self.report(
                                codes::INVALID_FIELD_INIT,
                                pos,
                                "invalid field initializer",
                            );
                            return false;
                        }
                        self.match_tag(f_tag, s_tag, MATCH_COERCE, pos);
                    }
                    Ident::RefArray => {
                        if s_ident != Ident::Array || s_level != 0 {
                            self.report(
                                codes::INVALID_FIELD_INIT,
                                pos,
                                "invalid field initializer",
                            );
                            return false;
                        }
                    }
                    _ => {
                        self.report(codes::INVALID_FIELD_INIT, pos, "invalid field initializer");
                        return false;
                    }
                }
                self.cc.symbols.add_reference(decl_sym, sym);
                true
            }
            _ => {
                self.report(
                    codes::INVALID_FIELD_INIT,
                    field.value.pos,
                    "invalid field initializer",
                );
                false
            }
        }
    }

    /// Validate an array declaration's initializer against the declared
    /// shape, inferring unsized dimensions from the literal.
    fn check_array_decl(&mut self, decl: &mut VarDeclStmt) -> bool {
        let sym = decl.sym;
        let Some(init) = &mut decl.init else {
            return true;
        };
        let ExprKind::Binary(b) = &mut init.kind else {
            return true;
        };
        match &b.right.kind {
            ExprKind::NewArray { .. } => {
                let rhs = &mut b.right;
                self.check_expr_for_array_initializer(rhs)
            }
            _ => self.check_array_initializer(sym, &mut b.right),
        }
    }

    fn check_array_initializer(&mut self, sym: SymbolId, rhs: &mut Expr) -> bool {
        let (s_tag, s_length, s_level, s_child) = {
            let s = &self.cc.symbols[sym];
            (s.tag, s.array.length, s.array.level, s.child)
        };
        let string_tag = self.cc.types.tag_string();
        match &mut rhs.kind {
            ExprKind::StringLit { text } if s_level == 0 => {
                let needed = text.chars().count() as cell + 1;
                if s_tag != string_tag {
                    let want = self.type_name(s_tag);
                    self.report(
                        codes::STRING_ASSIGN_MISMATCH,
                        rhs.pos,
                        format!("cannot initialize `{want}` array with a string"),
                    );
                    return false;
                }
                if s_length != 0 && needed > s_length {
                    self.report(
                        codes::ARRAY_SIZE_MISMATCH,
                        rhs.pos,
                        "initializer does not fit the array",
                    );
                    return false;
                }
                if s_length == 0 {
                    self.cc.symbols[sym].array.length = needed;
                }
                let mut val = crate::semantic::value::Value::new(Ident::Array, string_tag);
                val.constval = -needed;
                rhs.val = val;
                true
            }
            ExprKind::ArrayLit(_) if s_level == 0 => {
                if !self.check_expr(rhs) {
                    return false;
                }
                let count = rhs.val.constval;
                let pos = rhs.pos;
                self.match_tag(s_tag, rhs.val.tag, MATCH_COERCE, pos);
                if s_length != 0 && count != s_length {
                    self.report(
                        codes::ARRAY_SIZE_MISMATCH,
                        pos,
                        "initializer does not fit the array",
                    );
                    return false;
                }
                if s_length == 0 {
                    self.cc.symbols[sym].array.length = count;
                }
                true
            }
            ExprKind::ArrayLit(rows) => {
                // Multi-dimensional: each row checks against the child.
                let count = rows.len() as cell;
                if s_length != 0 && count != s_length {
                    self.report(
                        codes::ARRAY_SIZE_MISMATCH,
                        rhs.pos,
                        "initializer does not fit the array",
                    );
                    return false;
                }
                if s_length == 0 {
                    self.cc.symbols[sym].array.length = count;
                }
                let child = s_child.expect("multi-dimensional arrays have child symbols");
                let mut ok = true;
                for row in rows.iter_mut() {
                    ok &= self.check_array_initializer(child, row);
                }
                ok
            }
            _ => {
                self.report(
                    codes::INVALID_EXPRESSION,
                    rhs.pos,
                    "invalid array initializer",
                );
                false
            }
        }
    }

    // ====================================================================
    // Simple statements
    // ====================================================================

    fn check_expr_stmt(&mut self, stmt: &mut Stmt) -> bool {
        let StmtKind::Expr(expr) = &mut stmt.kind else {
            unreachable!()
        };
        if !self.check_expr(expr) {
            return false;
        }
        if !expr.has_side_effects() {
            self.report(codes::NO_EFFECT, expr.pos, "expression has no effect");
        }
        true
    }

    fn check_assert_stmt(&mut self, stmt: &mut Stmt) -> bool {
        let StmtKind::Assert(expr) = &mut stmt.kind else {
            unreachable!()
        };
        self.analyze_for_test(expr)
    }

    fn check_exit_stmt(&mut self, stmt: &mut Stmt) -> bool {
        let pos = stmt.pos;
        let StmtKind::Exit(expr) = &mut stmt.kind else {
            unreachable!()
        };
        if !self.check_expr(expr) {
            return false;
        }
        if expr.lvalue {
            self.rvalue(expr);
        }
        match expr.val.ident {
            Ident::Expression
            | Ident::Reference
            | Ident::Variable
            | Ident::Constant
            | Ident::ArrayChar
            | Ident::ArrayCell => {
                let tag = expr.val.tag;
                self.match_tag(Tag::INT, tag, MATCH_COERCE, pos);
                true
            }
            _ => {
                self.report(codes::NOT_A_SCALAR, pos, "exit value must be a scalar");
                false
            }
        }
    }

    fn check_static_assert(&mut self, stmt: &mut Stmt) -> bool {
        let StmtKind::StaticAssert { expr, text } = &mut stmt.kind else {
            unreachable!()
        };
        let text = text.clone();
        if !self.check_expr(expr) {
            return false;
        }
        let Some((value, _)) = self.eval_const(expr) else {
            self.report(codes::NOT_CONSTANT, expr.pos, "must be a constant expression");
            return false;
        };
        if value != 0 {
            return true;
        }
        let message = match text {
            Some(t) => format!("static assertion failed: {t}"),
            None => "static assertion failed".to_string(),
        };
        self.report(codes::STATIC_ASSERT_FAILED, expr.pos, message);
        false
    }

    fn check_delete_stmt(&mut self, stmt: &mut Stmt) -> bool {
        let pos = stmt.pos;
        let StmtKind::Delete(del) = &mut stmt.kind else {
            unreachable!()
        };
        if !self.check_expr(&mut del.expr) {
            return false;
        }
        let v = del.expr.val;
        match v.ident {
            Ident::Function => {
                self.report(codes::DELETE_KIND_INVALID, pos, "cannot delete functions");
                return false;
            }
            Ident::Array | Ident::RefArray | Ident::ArrayCell | Ident::ArrayChar => {
                let whole_array = v.sym.map_or(true, |s| self.cc.symbols[s].array.level > 0);
                if whole_array {
                    self.report(codes::DELETE_KIND_INVALID, pos, "cannot delete arrays");
                    return false;
                }
            }
            _ => {}
        }
        if v.tag == Tag::INT {
            self.report(codes::DELETE_KIND_INVALID, pos, "cannot delete integers");
            return false;
        }

        let Some(map) = self.cc.types.get(v.tag).as_methodmap() else {
            let name = self.type_name(v.tag);
            self.report(
                codes::NO_DESTRUCTOR,
                pos,
                format!("type `{name}` cannot be deleted"),
            );
            return false;
        };
        let Some(dtor_map) = self.cc.types.find_dtor_map(map) else {
            let name = self.cc.types.methodmap(map).name.clone();
            self.report(
                codes::NO_DESTRUCTOR,
                pos,
                format!("methodmap `{name}` has no destructor"),
            );
            return false;
        };
        del.map = Some(dtor_map);
        true
    }

    fn check_pragma_unused(&mut self, stmt: &mut Stmt) -> bool {
        let StmtKind::PragmaUnused(syms) = &stmt.kind else {
            unreachable!()
        };
        for &sym in syms {
            self.cc.symbols.mark_usage(sym, USAGE_READ);
            if matches!(
                self.cc.symbols[sym].ident,
                Ident::Variable | Ident::Reference | Ident::Array | Ident::RefArray
            ) {
                self.cc.symbols.mark_usage(sym, USAGE_WRITTEN);
            }
        }
        true
    }

    fn check_change_scope(&mut self, scope: ScopeId) -> bool {
        debug_assert!(self
            .cc
            .scopes
            .get(self.cx.scope)
            .is_global_or_file_static());
        self.cx.scope = scope;
        self.static_scopes.insert(scope);
        true
    }

    fn check_loop_control(&mut self, stmt: &mut Stmt) -> bool {
        match stmt.kind {
            StmtKind::Break => {
                self.cx.loop_has_break = true;
                stmt.flow = FlowType::Break;
            }
            StmtKind::Continue => {
                self.cx.loop_has_continue = true;
                stmt.flow = FlowType::Continue;
            }
            _ => unreachable!(),
        }
        true
    }

    // ====================================================================
    // Control flow
    // ====================================================================

    fn check_if_stmt(&mut self, stmt: &mut Stmt) -> bool {
        let flow = {
            let StmtKind::If(ifs) = &mut stmt.kind else {
                unreachable!()
            };
            // Unlike loop conditions, constant conditions don't adjust the
            // flow analysis here; they're far rarer in real code.
            let _ = self.analyze_for_test(&mut ifs.cond);

            let mut always_returns: Option<bool> = None;

            let saved = self.begin_flow();
            let true_ok = self.check_stmt(&mut ifs.on_true, true);
            self.end_flow(saved, &mut always_returns);
            if !true_ok {
                return false;
            }

            let saved = self.begin_flow();
            let false_ok = match &mut ifs.on_false {
                Some(on_false) => self.check_stmt(on_false, true),
                None => true,
            };
            self.end_flow(saved, &mut always_returns);
            if !false_ok {
                return false;
            }

            let flow = match &ifs.on_false {
                Some(on_false) => {
                    let a = ifs.on_true.flow;
                    let b = on_false.flow;
                    if a == b {
                        a
                    } else if a != FlowType::None && b != FlowType::None {
                        FlowType::Mixed
                    } else {
                        FlowType::None
                    }
                }
                None => FlowType::None,
            };

            if always_returns == Some(true) {
                self.cx.always_returns = true;
            }
            flow
        };
        stmt.flow = flow;
        true
    }

    fn check_loop_stmt(&mut self, stmt: &mut Stmt) -> bool {
        let flow = {
            let StmtKind::Loop(lp) = &mut stmt.kind else {
                unreachable!()
            };
            let _ = self.analyze_for_test(&mut lp.cond);

            let constval: Option<cell> =
                (lp.cond.val.ident == Ident::Constant).then(|| lp.cond.val.constval);

            let mut always_returns: Option<bool> = None;
            let saved_flow = self.begin_flow();
            let saved_break = std::mem::replace(&mut self.cx.loop_has_break, false);
            let saved_return = std::mem::replace(&mut self.cx.loop_has_return, false);

            let body_ok = self.check_stmt(&mut lp.body, true);

            let has_break = self.cx.loop_has_break;
            let has_return = self.cx.loop_has_return;
            self.cx.loop_has_break = saved_break;
            self.cx.loop_has_return = saved_return;
            self.end_flow(saved_flow, &mut always_returns);
            if !body_ok {
                return false;
            }

            lp.never_taken = constval == Some(0);
            lp.always_taken = matches!(constval, Some(c) if c != 0);

            let mut flow = FlowType::None;
            if lp.never_taken && lp.kind == LoopKind::While {
                // Never entered; the return status is untouched.
            } else if (lp.kind == LoopKind::DoWhile || lp.always_taken) && !has_break {
                if lp.always_taken && has_return {
                    self.cx.always_returns = true;
                }
                // The body ends in a return and nothing can break out.
                if lp.body.flow == FlowType::Return {
                    flow = FlowType::Return;
                }
            }
            flow
        };
        stmt.flow = flow;
        true
    }

    fn check_for_stmt(&mut self, stmt: &mut Stmt) -> bool {
        let (ok, flow) = {
            let StmtKind::For(fs) = &mut stmt.kind else {
                unreachable!()
            };
            let mut ok = true;
            if let Some(init) = &mut fs.init {
                ok &= self.check_stmt_default(init);
            }
            if let Some(cond) = &mut fs.cond {
                ok &= self.analyze_for_test(cond);
            }
            if let Some(advance) = &mut fs.advance {
                // The advance owns any heap allocations it creates.
                let saved = std::mem::replace(&mut self.pending_heap, false);
                if self.check_expr(advance) {
                    self.assign_heap_ownership_expr(advance);
                } else {
                    ok = false;
                }
                self.pending_heap = saved;
            }

            let constval: Option<cell> = fs
                .cond
                .as_ref()
                .filter(|c| c.val.ident == Ident::Constant)
                .map(|c| c.val.constval);

            let mut always_returns: Option<bool> = None;
            let saved_flow = self.begin_flow();
            let saved_break = std::mem::replace(&mut self.cx.loop_has_break, false);
            let saved_continue = std::mem::replace(&mut self.cx.loop_has_continue, false);
            let saved_return = std::mem::replace(&mut self.cx.loop_has_return, false);

            ok &= self.check_stmt(&mut fs.body, true);

            let has_break = self.cx.loop_has_break;
            let has_return = self.cx.loop_has_return;
            fs.has_continue = self.cx.loop_has_continue;
            self.cx.loop_has_break = saved_break;
            self.cx.loop_has_continue = saved_continue;
            self.cx.loop_has_return = saved_return;
            self.end_flow(saved_flow, &mut always_returns);

            fs.never_taken = constval == Some(0);
            fs.always_taken = fs.cond.is_none() || matches!(constval, Some(c) if c != 0);

            // A body that falls through continues implicitly, and so does
            // any loop whose condition can fail.
            if fs.body.flow != FlowType::Break && fs.body.flow != FlowType::Return {
                fs.has_continue = true;
            }
            if !fs.always_taken {
                fs.has_continue = true;
            }

            let mut flow = FlowType::None;
            if fs.never_taken {
                // Never entered; the return status is untouched.
            } else if fs.always_taken && !has_break {
                if has_return {
                    self.cx.always_returns = true;
                }
                if fs.body.flow == FlowType::Return {
                    flow = FlowType::Return;
                }
            }

            if let Some(scope) = fs.scope {
                // Mark the loop head's uses before the scope check, so a
                // counter declared in the init and read by the condition is
                // not reported unused.
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
                self.test_symbols(scope, true);
            }
            (ok, flow)
        };
        stmt.flow = flow;
        ok
    }

    fn check_switch_stmt(&mut self, stmt: &mut Stmt) -> bool {
        let flow = {
            let StmtKind::Switch(sw) = &mut stmt.kind else {
                unreachable!()
            };
            let tag_ok = self.check_expr(&mut sw.expr);
            let scrutinee = sw.expr.val;
            if tag_ok && scrutinee.ident.is_array_kind() {
                let name = self.value_name(&scrutinee);
                self.report(
                    codes::ARRAY_NOT_INDEXED,
                    sw.expr.pos,
                    format!("array `{name}` must be indexed"),
                );
            }
            if sw.expr.lvalue {
                self.rvalue(&mut sw.expr);
            }

            let mut always_returns: Option<bool> = None;
            let mut flow: Option<FlowType> = None;

            fn update_flow(flow: &mut Option<FlowType>, other: FlowType) {
                match flow {
                    Some(f) => {
                        if *f == FlowType::None || other == FlowType::None {
                            *f = FlowType::None;
                        } else if *f != other {
                            *f = FlowType::Mixed;
                        }
                    }
                    None => *flow = Some(other),
                }
            }

            let mut case_values: HashSet<cell> = HashSet::new();
            for case in sw.cases.iter_mut() {
                for label in case.labels.iter_mut() {
                    if !self.check_expr(label) {
                        continue;
                    }
                    let Some((value, tag)) = self.eval_const(label) else {
                        self.report(
                            codes::NOT_CONSTANT,
                            label.pos,
                            "case labels must be constant expressions",
                        );
                        continue;
                    };
                    if tag_ok {
                        let pos = label.pos;
                        self.match_tag(scrutinee.tag, tag, MATCH_COERCE, pos);
                    }
                    if !case_values.insert(value) {
                        self.report(
                            codes::DUPLICATE_CASE,
                            label.pos,
                            format!("duplicate case label `{value}`"),
                        );
                    }
                }

                let saved = self.begin_flow();
                let case_ok = self.check_stmt_default(&mut case.body);
                self.end_flow(saved, &mut always_returns);
                if case_ok {
                    update_flow(&mut flow, case.body.flow);
                }
            }

            match &mut sw.default_case {
                Some(default_case) => {
                    let saved = self.begin_flow();
                    let default_ok = self.check_stmt_default(default_case);
                    self.end_flow(saved, &mut always_returns);
                    if default_ok {
                        update_flow(&mut flow, default_case.flow);
                    }
                }
                None => {
                    // No default: the switch can fall through untouched.
                    always_returns = Some(false);
                    update_flow(&mut flow, FlowType::None);
                }
            }

            if always_returns == Some(true) {
                self.cx.always_returns = true;
            }
            flow.unwrap_or(FlowType::None)
        };
        stmt.flow = flow;
        true
    }

    // ====================================================================
    // Returns
    // ====================================================================

    fn check_return_stmt(&mut self, stmt: &mut Stmt) -> bool {
        let pos = stmt.pos;
        self.cx.always_returns = true;
        self.cx.loop_has_return = true;
        stmt.flow = FlowType::Return;

        let Some(func) = self.cx.func else {
            self.report(
                codes::INVALID_STATEMENT,
                pos,
                "return is only valid inside a function",
            );
            return false;
        };

        let StmtKind::Return(ret) = &mut stmt.kind else {
            unreachable!()
        };

        if ret.expr.is_none() {
            let void_tag = self.cc.types.tag_void();
            if self.cc.symbols[func].must_return_value(void_tag) {
                self.report_function_return_error(func);
            }
            if self.cx.void_return.is_none() {
                self.cx.void_return = Some(pos);
            }
            return true;
        }

        if let Some(other) = self.cx.void_return {
            if !self.cx.warned_mixed_returns {
                self.report(
                    codes::MIXED_RETURN_STYLES,
                    other,
                    "function uses both `return;` and `return <value>;`",
                );
                self.report(
                    codes::MIXED_RETURN_STYLES,
                    pos,
                    "function uses both `return;` and `return <value>;`",
                );
                self.cx.warned_mixed_returns = true;
            }
        }

        let expr = ret.expr.as_mut().expect("checked above");
        if !self.check_expr(expr) {
            return false;
        }
        if expr.lvalue {
            self.rvalue(expr);
        }

        if self.cc.symbols[func].tag == self.cc.types.tag_void() {
            self.report(
                codes::RETURN_VALUE_IN_VOID,
                pos,
                "void function may not return a value",
            );
            return false;
        }

        let v = expr.val;
        if v.ident == Ident::Array && v.sym.is_none() {
            // Returning a literal string is not supported.
            self.report(
                codes::SYMBOL_HAS_NO_SIZE,
                pos,
                "cannot return a literal array",
            );
            return false;
        }

        let sub = self.cc.symbols[func].child;
        debug_assert!(sub.map_or(true, |s| self.cc.symbols[s].ident == Ident::RefArray));
        if self.cx.returns_value {
            // An earlier return statement exists in this function.
            let retarray = v.ident.is_array_kind();
            if (sub.is_none() && retarray) || (sub.is_some() && !retarray) {
                self.report(
                    codes::MIXED_ARRAY_RETURN,
                    pos,
                    "cannot mix `return <array>;` and `return <value>;`",
                );
                return false;
            }
            if retarray && self.cc.symbols[func].is_public {
                let name = self.cc.symbols[func].name.clone();
                self.report(
                    codes::PUBLIC_ARRAY_RETURN,
                    pos,
                    format!("public function `{name}` may not return an array"),
                );
                return false;
            }
        } else {
            self.cx.returns_value = true;
        }

        if !self.matchtag_string(v.ident, v.tag) {
            let func_tag = self.cc.symbols[func].tag;
            self.match_tag(func_tag, v.tag, MATCH_COERCE, pos);
        }

        if v.ident.is_array_kind() && !self.check_array_return(ret, func, pos) {
            return false;
        }
        true
    }

    /// All return statements in a function must agree on array dimensions
    /// and sizes. The first array return clones its symbol into a hidden
    /// parameter slot attached to the function.
    fn check_array_return(&mut self, ret: &mut ReturnStmt, func: SymbolId, pos: Span) -> bool {
        let sym = ret
            .expr
            .as_ref()
            .and_then(|e| e.val.sym)
            .expect("array returns carry a symbol");

        let mut array = ArrayReturn::default();

        if let Some(sub_head) = self.cc.symbols[func].child {
            // An array shape is attached already; this return must match it
            // exactly.
            let level = self.cc.symbols[sym].array.level;
            if self.cc.symbols[sub_head].array.level != level {
                self.report(
                    codes::ARRAY_DIMENSION_MISMATCH,
                    pos,
                    "array dimensions must match",
                );
                return false;
            }
            let mut cur_sym = sym;
            let mut cur_sub = sub_head;
            for i in 0..=level {
                let dim = self.cc.symbols[cur_sub].array.length;
                array.dims.push(dim);
                if self.cc.symbols[cur_sym].array.length != dim {
                    self.report(codes::ARRAY_SIZE_MISMATCH, pos, "array sizes must match");
                    return false;
                }
                if i != level {
                    cur_sym = self.cc.symbols[cur_sym].child.expect("levels imply children");
                    cur_sub = self.cc.symbols[cur_sub].child.expect("levels imply children");
                }
            }
            if self.cc.symbols[cur_sub].array.length == 0 {
                self.report(
                    codes::INDETERMINATE_ARRAY_RETURN,
                    pos,
                    "indeterminate array size in return",
                );
                return false;
            }
        } else {
            // First array return: clone the returned shape beneath the
            // function as its hidden return parameter.
            let mut cur = sym;
            let level = self.cc.symbols[cur].array.level;
            let mut enum_struct_tag = Tag::INT;
            for i in 0..=level {
                let length = self.cc.symbols[cur].array.length;
                array.dims.push(length);
                if self.cc.symbols[cur].idx_tag != Tag::INT {
                    enum_struct_tag = self.cc.symbols[cur].idx_tag;
                }
                if length <= 0 {
                    let name = self.cc.symbols[sym].name.clone();
                    self.report(
                        codes::UNKNOWN_ARRAY_SIZE,
                        pos,
                        format!("unknown array size for `{name}`"),
                    );
                    return false;
                }
                if i != level {
                    cur = self.cc.symbols[cur].child.expect("levels imply children");
                }
            }
            array.tag = self.cc.symbols[cur].tag;

            // The hidden parameter sits after the frame header and the
            // declared arguments:
            //   base + 0            previous frame
            //   base + 1 cell       return address
            //   base + 2 cells      argument count
            //   base + 3 cells      first argument
            //   base + (n+3) cells  hidden array return address
            let argcount = self.cc.symbols[func].function().args.len() as cell;
            let func_name = self.cc.symbols[func].name.clone();
            let func_tag = self.cc.symbols[func].tag;
            let sub = self.cc.symbols.new_array_variable(
                &func_name,
                (argcount + 3) * 4,
                Ident::RefArray,
                ScopeKind::Global,
                func_tag,
                &array.dims,
                enum_struct_tag,
            );
            self.cc.symbols[sub].parent = Some(func);
            self.cc.symbols[func].child = Some(sub);
        }

        let node = self.cx.func_node.expect("array returns occur inside functions");
        let declared_dims = self.funcs[node.0 as usize].ret.dims.len();
        if declared_dims == 0 {
            let name = self.funcs[node.0 as usize].name.clone();
            self.report(
                codes::ARRAY_RETURN_UNDECLARED,
                pos,
                format!("function `{name}` returns an array without declaring one"),
            );
        } else if declared_dims != array.dims.len() {
            self.report(
                codes::RETURN_DIMENSION_MISMATCH,
                pos,
                "returned array does not match the declared dimensions",
            );
        }

        let sub = self.cc.symbols[func].child.expect("attached above");
        array.tag = self.cc.symbols[sub].tag;
        ret.array = Some(array);
        true
    }

    // ====================================================================
    // Member containers
    // ====================================================================

    fn check_enum_struct_decl(&mut self, stmt: &mut Stmt) -> bool {
        let StmtKind::EnumStructDecl { methods, .. } = &stmt.kind else {
            unreachable!()
        };
        let methods = methods.clone();
        let mut ok = true;
        for fid in methods {
            ok &= self.check_function(fid);
        }
        ok
    }

    fn check_methodmap_decl(&mut self, stmt: &mut Stmt) -> bool {
        let StmtKind::MethodmapDecl(decl) = &stmt.kind else {
            unreachable!()
        };
        let properties: Vec<_> = decl
            .properties
            .iter()
            .map(|p| (p.getter, p.setter))
            .collect();
        let methods = decl.methods.clone();

        let mut ok = true;
        for (getter, setter) in properties {
            if let Some(g) = getter {
                ok &= self.check_function(g);
            }
            if let Some(s) = setter {
                ok &= self.check_function(s);
            }
        }
        for fid in methods {
            ok &= self.check_function(fid);
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::nodes::{BinOp, DeleteStmt, FunctionId};
    use crate::semantic::testutil::*;
    use crate::semantic::types::{MethodmapMethod, Pstruct, PstructField};
    use crate::semantic::value::Value;

    fn body_stmt(unit: &TestUnit, fid: FunctionId, i: usize) -> &Stmt {
        let body = unit.tree.functions[fid.0 as usize].body.as_ref().unwrap();
        let StmtKind::Block(b) = &body.kind else {
            panic!("function bodies are blocks")
        };
        &b.stmts[i]
    }

    #[test]
    fn global_initializer_folds_to_constant() {
        // int x = 1 + 2 * 3; folds to 7 with no errors.
        let mut unit = TestUnit::new();
        let x = unit.global_var("x", Tag::INT);
        let decl = var_decl(&unit, x, Some(bin(BinOp::Add, int(1), bin(BinOp::Mul, int(2), int(3)))));
        unit.tree.top.push(decl);
        unit.public_main(vec![]);
        assert!(unit.analyze());
        assert!(unit.error_codes().is_empty());

        let StmtKind::VarDecl(d) = &unit.tree.top[0].kind else {
            panic!()
        };
        let rhs = d.init_rhs().unwrap();
        assert_eq!(rhs.val.ident, Ident::Constant);
        assert_eq!(rhs.val.constval, 7);
        assert_eq!(rhs.val.tag, Tag::INT);
    }

    #[test]
    fn non_constant_global_initializer_is_rejected() {
        let mut unit = TestUnit::new();
        let other = unit.global_var("other", Tag::INT);
        let x = unit.global_var("x", Tag::INT);
        let decl = var_decl(&unit, x, Some(sym(other)));
        unit.tree.top.push(decl);
        unit.public_main(vec![]);
        assert!(!unit.analyze());
        assert!(unit.error_codes().contains(&codes::NOT_CONSTANT));
    }

    #[test]
    fn duplicate_case_labels_are_rejected() {
        // switch (c) { case 1: ...; case 1: ...; }
        let mut unit = TestUnit::new();
        let c = unit.global_var("c", Tag::INT);
        let x = unit.global_var("x", Tag::INT);
        let body = vec![switch_stmt(
            sym(c),
            vec![
                (vec![int(1)], expr_stmt(assign(sym(x), int(1)))),
                (vec![int(1)], expr_stmt(assign(sym(x), int(2)))),
            ],
            None,
        )];
        unit.public_main(body);
        assert!(!unit.analyze());
        assert!(unit.error_codes().contains(&codes::DUPLICATE_CASE));
    }

    #[test]
    fn switch_case_labels_must_be_constant() {
        let mut unit = TestUnit::new();
        let c = unit.global_var("c", Tag::INT);
        let v = unit.global_var("v", Tag::INT);
        let body = vec![switch_stmt(
            sym(c),
            vec![(vec![sym(v)], expr_stmt(assign(sym(c), int(1))))],
            None,
        )];
        unit.public_main(body);
        assert!(!unit.analyze());
        assert!(unit.error_codes().contains(&codes::NOT_CONSTANT));
    }

    #[test]
    fn switch_flow_merges_across_branches() {
        // Every case returns and a default exists: the switch returns.
        let mut unit = TestUnit::new();
        let c = unit.global_var("c", Tag::INT);
        let body = vec![switch_stmt(
            sym(c),
            vec![(vec![int(1)], ret(Some(int(1))))],
            Some(ret(Some(int(2)))),
        )];
        let (_, fid) = unit.func(FuncSpec::public("pick", Tag::INT), None, Some(body));
        assert!(unit.analyze());
        assert_eq!(body_stmt(&unit, fid, 0).flow, FlowType::Return);
    }

    #[test]
    fn default_less_switch_does_not_return() {
        let mut unit = TestUnit::new();
        let c = unit.global_var("c", Tag::INT);
        let body = vec![switch_stmt(sym(c), vec![(vec![int(1)], ret(Some(int(1))))], None)];
        let (_, fid) = unit.func(FuncSpec::public("pick", Tag::INT), None, Some(body));
        assert!(unit.analyze());
        assert_eq!(body_stmt(&unit, fid, 0).flow, FlowType::None);
        // A synthetic return was appended for the fall-through path.
        let body = unit.tree.functions[fid.0 as usize].body.as_ref().unwrap();
        assert_eq!(body.flow, FlowType::Return);
    }

    #[test]
    fn mismatched_array_sizes_cannot_be_assigned() {
        // int a[3]; int b[4]; a = b;
        let mut unit = TestUnit::new();
        let scope = unit.scope();
        let a = unit.local_array(scope, "a", Tag::INT, &[3]);
        let b = unit.local_array(scope, "b", Tag::INT, &[4]);
        unit.public_main(vec![block(
            vec![expr_stmt(assign(sym(a), sym(b)))],
            Some(scope),
        )]);
        assert!(!unit.analyze());
        assert!(unit.error_codes().contains(&codes::ARRAY_SIZE_MISMATCH));
    }

    #[test]
    fn matching_array_assignment_records_copy_length() {
        let mut unit = TestUnit::new();
        let scope = unit.scope();
        let a = unit.local_array(scope, "a", Tag::INT, &[3]);
        let b = unit.local_array(scope, "b", Tag::INT, &[3]);
        let (_, fid) = unit.public_main(vec![block(
            vec![expr_stmt(assign(sym(a), sym(b)))],
            Some(scope),
        )]);
        assert!(unit.analyze());
        assert!(unit.error_codes().is_empty());

        let outer = body_stmt(&unit, fid, 0);
        let StmtKind::Block(inner) = &outer.kind else {
            panic!()
        };
        let StmtKind::Expr(e) = &inner.stmts[0].kind else {
            panic!()
        };
        let ExprKind::Binary(bx) = &e.kind else {
            panic!()
        };
        assert_eq!(bx.array_copy_length, 3);
    }

    #[test]
    fn self_assignment_warns() {
        let mut unit = TestUnit::new();
        let x = unit.global_var("x", Tag::INT);
        unit.public_main(vec![expr_stmt(assign(sym(x), sym(x)))]);
        assert!(unit.analyze());
        assert!(unit.warning_codes().contains(&codes::SELF_ASSIGNMENT));
    }

    #[test]
    fn assignment_to_constant_fails() {
        let mut unit = TestUnit::new();
        let scope = unit.scope();
        let c = unit.local(scope, "c", Tag::INT);
        unit.cc.symbols[c].is_const = true;
        unit.public_main(vec![block(
            vec![expr_stmt(assign(sym(c), int(1)))],
            Some(scope),
        )]);
        assert!(!unit.analyze());
        assert!(unit.error_codes().contains(&codes::NOT_LVALUE));
    }

    #[test]
    fn unreachable_code_after_return() {
        let mut unit = TestUnit::new();
        let x = unit.global_var("x", Tag::INT);
        let body = vec![ret(Some(int(1))), expr_stmt(assign(sym(x), int(2)))];
        unit.func(FuncSpec::public("f", Tag::INT), None, Some(body));
        assert!(unit.analyze());
        assert!(unit.warning_codes().contains(&codes::UNREACHABLE_CODE));
    }

    #[test]
    fn expression_without_effect_warns() {
        let mut unit = TestUnit::new();
        let x = unit.global_var("x", Tag::INT);
        unit.public_main(vec![expr_stmt(bin(BinOp::Add, sym(x), int(1)))]);
        assert!(unit.analyze());
        assert!(unit.warning_codes().contains(&codes::NO_EFFECT));
    }

    #[test]
    fn while_loop_flow_and_condition_warnings() {
        // while (1) { return 1; } makes the function always return.
        let mut unit = TestUnit::new();
        let body = vec![while_stmt(int(1), block(vec![ret(Some(int(1)))], None))];
        let (f, fid) = unit.func(FuncSpec::public("spin", Tag::INT), None, Some(body));
        assert!(unit.analyze());
        assert!(unit.warning_codes().contains(&codes::ALWAYS_TRUE));
        assert_eq!(body_stmt(&unit, fid, 0).flow, FlowType::Return);
        assert!(unit.cc.symbols[f].always_returns);
        // No synthetic return was needed.
        let body = unit.tree.functions[fid.0 as usize].body.as_ref().unwrap();
        let StmtKind::Block(b) = &body.kind else {
            panic!()
        };
        assert_eq!(b.stmts.len(), 1);
    }

    #[test]
    fn never_taken_while_keeps_flow() {
        let mut unit = TestUnit::new();
        let x = unit.global_var("x", Tag::INT);
        let body = vec![
            while_stmt(int(0), block(vec![ret(Some(int(1)))], None)),
            expr_stmt(assign(sym(x), int(2))),
            ret(Some(int(0))),
        ];
        let (_, fid) = unit.func(FuncSpec::public("f", Tag::INT), None, Some(body));
        assert!(unit.analyze());
        assert!(unit.warning_codes().contains(&codes::ALWAYS_FALSE));
        // The loop body's return does not leak out of a never-taken loop,
        // so the assignment below is reachable and unwarned.
        assert!(!unit.warning_codes().contains(&codes::UNREACHABLE_CODE));
        assert_eq!(body_stmt(&unit, fid, 0).flow, FlowType::None);
    }

    #[test]
    fn break_suppresses_loop_return_propagation() {
        let mut unit = TestUnit::new();
        let c = unit.global_var("c", Tag::INT);
        let loop_body = block(
            vec![
                if_stmt(sym(c), Stmt::new(StmtKind::Break, Span::dummy()), None),
                ret(Some(int(1))),
            ],
            None,
        );
        let body = vec![while_stmt(int(1), loop_body), ret(Some(int(0)))];
        let (_, fid) = unit.func(FuncSpec::public("f", Tag::INT), None, Some(body));
        assert!(unit.analyze());
        assert_eq!(body_stmt(&unit, fid, 0).flow, FlowType::None);
    }

    #[test]
    fn if_with_both_arms_returning_merges_flow() {
        let mut unit = TestUnit::new();
        let c = unit.global_var("c", Tag::INT);
        let body = vec![if_stmt(sym(c), ret(Some(int(1))), Some(ret(Some(int(2)))))];
        let (f, fid) = unit.func(FuncSpec::public("f", Tag::INT), None, Some(body));
        assert!(unit.analyze());
        assert_eq!(body_stmt(&unit, fid, 0).flow, FlowType::Return);
        assert!(unit.cc.symbols[f].always_returns);
    }

    #[test]
    fn for_loop_continue_inference() {
        let mut unit = TestUnit::new();
        let i = unit.global_var("i", Tag::INT);
        let for_stmt = Stmt::new(
            StmtKind::For(Box::new(crate::ast::nodes::ForStmt {
                init: None,
                cond: Some(bin(BinOp::Lt, sym(i), int(10))),
                advance: Some(Expr::new(
                    ExprKind::IncDec(Box::new(crate::ast::nodes::IncDecExpr {
                        op: crate::ast::nodes::IncDecOp::Inc,
                        prefix: false,
                        expr: sym(i),
                        userop: None,
                    })),
                    Span::dummy(),
                )),
                body: block(vec![], None),
                scope: None,
                has_continue: false,
                never_taken: false,
                always_taken: false,
            })),
            Span::dummy(),
        );
        let (_, fid) = unit.public_main(vec![for_stmt]);
        assert!(unit.analyze());
        let StmtKind::For(fs) = &body_stmt(&unit, fid, 0).kind else {
            panic!()
        };
        // Non-constant condition implies an implicit continue.
        assert!(fs.has_continue);
        assert!(!fs.always_taken);
    }

    #[test]
    fn exit_coerces_to_int_and_rejects_arrays() {
        let mut unit = TestUnit::new();
        unit.public_main(vec![Stmt::new(StmtKind::Exit(int(0)), Span::dummy())]);
        assert!(unit.analyze());
        assert!(unit.error_codes().is_empty());

        let mut unit = TestUnit::new();
        let scope = unit.scope();
        let arr = unit.local_array(scope, "arr", Tag::INT, &[2]);
        unit.public_main(vec![block(
            vec![Stmt::new(StmtKind::Exit(sym(arr)), Span::dummy())],
            Some(scope),
        )]);
        assert!(!unit.analyze());
        assert!(unit.error_codes().contains(&codes::NOT_A_SCALAR));
    }

    #[test]
    fn static_assert_requires_constant_truth() {
        let mut unit = TestUnit::new();
        unit.public_main(vec![Stmt::new(
            StmtKind::StaticAssert {
                expr: bin(BinOp::Eq, int(4), int(4)),
                text: None,
            },
            Span::dummy(),
        )]);
        assert!(unit.analyze());

        let mut unit = TestUnit::new();
        unit.public_main(vec![Stmt::new(
            StmtKind::StaticAssert {
                expr: bin(BinOp::Eq, int(4), int(5)),
                text: Some("size must match".into()),
            },
            Span::dummy(),
        )]);
        assert!(!unit.analyze());
        assert!(unit.error_codes().contains(&codes::STATIC_ASSERT_FAILED));
    }

    #[test]
    fn delete_resolves_destructor_through_chain() {
        let mut unit = TestUnit::new();
        let (base, _base_tag) = unit.declare_methodmap("Resource", None);
        // The destructor lives on the base; the derived map inherits it.
        let dtor_target = {
            let mut s = crate::semantic::symbols::Symbol::new(
                "Resource.~Resource",
                Ident::Function,
                ScopeKind::Global,
                Tag::INT,
            );
            s.defined = true;
            s.data = crate::semantic::symbols::SymbolData::Function(Default::default());
            unit.cc.symbols.alloc(s)
        };
        let dtor = unit.cc.types.add_method(MethodmapMethod {
            name: "~Resource".into(),
            map: base,
            target: dtor_target,
            getter: None,
            setter: None,
            is_static: false,
            is_ctor: false,
            property_tag: None,
        });
        unit.cc.types.methodmap_mut(base).dtor = Some(dtor);
        let (_, derived_tag) = unit.declare_methodmap("File", Some(base));

        let scope = unit.scope();
        let h = unit.local(scope, "h", derived_tag);
        let del = Stmt::new(
            StmtKind::Delete(Box::new(DeleteStmt {
                expr: sym(h),
                map: None,
            })),
            Span::dummy(),
        );
        let (_, fid) = unit.public_main(vec![block(vec![del], Some(scope))]);
        assert!(unit.analyze());

        let outer = body_stmt(&unit, fid, 0);
        let StmtKind::Block(b) = &outer.kind else {
            panic!()
        };
        let StmtKind::Delete(d) = &b.stmts[0].kind else {
            panic!()
        };
        assert_eq!(d.map, Some(base));
    }

    #[test]
    fn delete_rejects_integers() {
        let mut unit = TestUnit::new();
        let x = unit.global_var("x", Tag::INT);
        let del = Stmt::new(
            StmtKind::Delete(Box::new(DeleteStmt {
                expr: sym(x),
                map: None,
            })),
            Span::dummy(),
        );
        unit.public_main(vec![del]);
        assert!(!unit.analyze());
        assert!(unit.error_codes().contains(&codes::DELETE_KIND_INVALID));
    }

    #[test]
    fn pstruct_init_checks_fields_and_fills_string_defaults() {
        let mut unit = TestUnit::new();
        let string_tag = unit.string_tag();
        let ps_tag = unit
            .cc
            .types
            .define_pstruct(
                "PluginInfo",
                Pstruct {
                    name: "PluginInfo".into(),
                    fields: vec![
                        PstructField {
                            name: "name".into(),
                            ident: Ident::RefArray,
                            tag: string_tag,
                        },
                        PstructField {
                            name: "version".into(),
                            ident: Ident::RefArray,
                            tag: string_tag,
                        },
                    ],
                },
            )
            .unwrap();
        let info = unit.global_var("myinfo", ps_tag);
        let init = Expr::new(
            ExprKind::StructInit {
                fields: vec![StructInitField {
                    name: "name".into(),
                    value: string("sample"),
                    pos: Span::dummy(),
                }],
            },
            Span::dummy(),
        );
        let decl = var_decl(&unit, info, Some(init));
        unit.tree.top.push(decl);
        unit.public_main(vec![]);
        assert!(unit.analyze());
        assert!(unit.error_codes().is_empty());

        // The unfilled string field got an empty-string default.
        let StmtKind::VarDecl(d) = &unit.tree.top[0].kind else {
            panic!()
        };
        let Some(Expr {
            kind: ExprKind::Binary(b),
            ..
        }) = &d.init
        else {
            panic!()
        };
        let ExprKind::StructInit { fields } = &b.right.kind else {
            panic!()
        };
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].name, "version");
        assert!(matches!(
            &fields[1].value.kind,
            ExprKind::StringLit { text } if text.is_empty()
        ));
    }

    #[test]
    fn pstruct_unknown_and_duplicate_fields() {
        let mut unit = TestUnit::new();
        let string_tag = unit.string_tag();
        let ps_tag = unit
            .cc
            .types
            .define_pstruct(
                "PluginInfo",
                Pstruct {
                    name: "PluginInfo".into(),
                    fields: vec![PstructField {
                        name: "name".into(),
                        ident: Ident::RefArray,
                        tag: string_tag,
                    }],
                },
            )
            .unwrap();
        let info = unit.global_var("myinfo", ps_tag);
        let init = Expr::new(
            ExprKind::StructInit {
                fields: vec![
                    StructInitField {
                        name: "name".into(),
                        value: string("a"),
                        pos: Span::dummy(),
                    },
                    StructInitField {
                        name: "name".into(),
                        value: string("b"),
                        pos: Span::dummy(),
                    },
                    StructInitField {
                        name: "author".into(),
                        value: string("c"),
                        pos: Span::dummy(),
                    },
                ],
            },
            Span::dummy(),
        );
        let decl = var_decl(&unit, info, Some(init));
        unit.tree.top.push(decl);
        unit.public_main(vec![]);
        assert!(!unit.analyze());
        assert!(unit.warning_codes().contains(&codes::DUPLICATE_FIELD_INIT));
        assert!(unit.error_codes().contains(&codes::NOT_A_MEMBER));
    }

    #[test]
    fn string_initializer_must_fit_declared_array() {
        let mut unit = TestUnit::new();
        let string_tag = unit.string_tag();
        let scope = unit.scope();
        let buf = unit.local_array(scope, "buf", string_tag, &[4]);
        let decl = var_decl(&unit, buf, Some(string("too long")));
        unit.public_main(vec![block(vec![decl], Some(scope))]);
        assert!(!unit.analyze());
        assert!(unit.error_codes().contains(&codes::ARRAY_SIZE_MISMATCH));
    }

    #[test]
    fn analysis_continues_after_a_bad_statement() {
        let mut unit = TestUnit::new();
        let x = unit.global_var("x", Tag::INT);
        let scope = unit.scope();
        let arr = unit.local_array(scope, "arr", Tag::INT, &[2]);
        // First statement is invalid; the duplicate-case error in the
        // second statement must still surface.
        let body = vec![
            expr_stmt(index(sym(x), int(0))),
            switch_stmt(
                sym(x),
                vec![
                    (vec![int(1)], expr_stmt(assign(sym(x), int(1)))),
                    (vec![int(1)], expr_stmt(assign(sym(x), int(2)))),
                ],
                None,
            ),
            expr_stmt(assign(index(sym(arr), int(0)), int(1))),
        ];
        unit.public_main(vec![block(body, Some(scope))]);
        assert!(!unit.analyze());
        assert!(unit.error_codes().contains(&codes::INVALID_SUBSCRIPT));
        assert!(unit.error_codes().contains(&codes::DUPLICATE_CASE));
    }

    #[test]
    fn value_descriptor_defaults_to_error_recovery_constant() {
        let v = Value::error();
        assert_eq!(v.ident, Ident::Constant);
        assert_eq!(v.constval, 0);
        assert_eq!(v.tag, Tag::INT);
    }

    #[test]
    fn if_condition_goes_through_test_analysis() {
        let mut unit = TestUnit::new();
        let x = unit.global_var("x", Tag::INT);
        unit.public_main(vec![if_stmt(int(3), expr_stmt(assign(sym(x), int(1))), None)]);
        assert!(unit.analyze());
        assert!(unit.warning_codes().contains(&codes::ALWAYS_TRUE));
    }
}
