//! Per-function analysis: memoized with a three-state flag so recursive
//! return-size inference terminates, run under a fresh function context,
//! with synthetic returns appended for bodies that can fall off the end.

use log::debug;
use sable_common::codes;

use crate::ast::nodes::{AnalysisState, FunctionId, ReturnStmt, Stmt, StmtKind};
use crate::semantic::analyzer::Analyzer;
use crate::semantic::symbols::SymbolId;
use crate::semantic::value::{FlowType, Tag};

impl<'a> Analyzer<'a> {
    /// Analyze a function once; later calls return the memoized verdict.
    /// Callers must treat an in-progress state as a cycle before calling.
    pub(crate) fn check_function(&mut self, fid: FunctionId) -> bool {
        match self.funcs[fid.0 as usize].state {
            AnalysisState::Done(ok) => return ok,
            AnalysisState::InProgress => {
                debug_assert!(false, "re-entry is reported by the caller");
                return false;
            }
            AnalysisState::NotStarted => {}
        }

        self.funcs[fid.0 as usize].state = AnalysisState::InProgress;
        let ok = self.check_function_impl(fid);
        self.funcs[fid.0 as usize].state = AnalysisState::Done(ok);
        ok
    }

    fn check_function_impl(&mut self, fid: FunctionId) -> bool {
        let (sym, name, pos, end_pos) = {
            let f = &self.funcs[fid.0 as usize];
            (f.sym, f.name.clone(), f.pos, f.end_pos)
        };
        debug!("analyzing function `{name}`");

        // Fresh per-function context; the scope starts at the argument
        // scope when the parser made one.
        let mut cx = self.cx.for_function(sym, fid);
        if let Some(scope) = self.funcs[fid.0 as usize].scope {
            cx.scope = scope;
        }
        let saved_cx = std::mem::replace(&mut self.cx, cx);
        let ok = self.check_function_body(fid, sym, name, pos);
        self.cx = saved_cx;
        ok
    }

    fn check_function_body(
        &mut self,
        fid: FunctionId,
        sym: SymbolId,
        name: String,
        pos: sable_common::span::Span,
    ) -> bool {
        // Declaration-level checks.
        let (ret_tag, ret_dims, operator, is_public, is_forward, is_native, has_body) = {
            let f = &self.funcs[fid.0 as usize];
            (
                f.ret.tag,
                f.ret.dims.len(),
                f.operator.clone(),
                f.is_public,
                f.is_forward,
                f.is_native,
                f.body.is_some(),
            )
        };

        if ret_tag == self.cc.types.tag_void() && ret_dims > 0 {
            self.report(codes::VOID_ARRAY, pos, "void arrays are not allowed");
        }
        if let Some(op) = operator {
            self.check_operator_decl(&op, ret_tag, pos);
        }
        if (is_public || is_forward) && ret_dims > 0 {
            self.report(
                codes::FORWARD_ARRAY_RETURN,
                pos,
                "public and forward functions may not return arrays",
            );
        }
        if self.cc.symbols[sym].native {
            if ret_dims > 0 {
                self.report(
                    codes::NATIVE_ARRAY_RETURN,
                    pos,
                    "native functions may not return arrays",
                );
                return false;
            }
            return true;
        }
        if !has_body {
            if is_native || is_forward {
                return true;
            }
            self.report(
                codes::INVALID_STATEMENT,
                pos,
                format!("function `{name}` has no body"),
            );
            return false;
        }

        if self.cc.symbols[sym].deprecated && !self.cc.symbols[sym].stock {
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

        // Take the body out of the pool so a recursive analysis triggered
        // by a call inside it cannot alias it; re-entry is caught by the
        // in-progress state.
        let mut body = self.funcs[fid.0 as usize]
            .body
            .take()
            .expect("checked above");
        self.check_stmt(&mut body, true);
        self.funcs[fid.0 as usize].body = Some(body);

        self.cc.symbols[sym].returns_value = self.cx.returns_value;
        self.cc.symbols[sym].always_returns = self.cx.always_returns;

        if !self.cx.returns_value {
            let f = &self.funcs[fid.0 as usize];
            if self.cc.symbols[sym].tag == self.cc.types.tag_void()
                && self.cc.symbols[sym].function().forward
                && f.ret.tag == Tag::INT
                && !f.ret.is_new
            {
                // Legacy idiom:
                //    forward void X();
                //    public X()
                // The old-style decl inherits the forward's void return.
                let void_tag = self.cc.types.tag_void();
                self.funcs[fid.0 as usize].ret.tag = void_tag;
            }
        }

        // A public implementation must match its forward's return tag.
        if self.cc.symbols[sym].function().forward && self.funcs[fid.0 as usize].is_public {
            let sym_tag = self.cc.symbols[sym].tag;
            let decl_tag = self.funcs[fid.0 as usize].ret.tag;
            if sym_tag != decl_tag {
                let want = self.type_name(sym_tag);
                let got = self.type_name(decl_tag);
                self.report(
                    codes::FORWARD_TAG_MISMATCH,
                    pos,
                    format!("return tag `{got}` does not match forward declaration (`{want}`)"),
                );
            }
        }

        // Member functions check their argument usage immediately. Global
        // functions wait for the post-pass, which knows what ended up being
        // used as a callback.
        if self.cc.symbols[sym].parent.is_some() {
            self.check_function_return_usage(fid);
            if let Some(scope) = self.funcs[fid.0 as usize].scope {
                self.test_symbols(scope, true);
            }
        }

        if self.cc.symbols[sym].is_public {
            self.cc.publics.insert(sym);
        }
        true
    }

    /// If the body doesn't return on every path, append a synthetic bare
    /// return so the code generator always sees a terminator, and report
    /// the missing value when one was promised.
    pub(crate) fn check_function_return_usage(&mut self, fid: FunctionId) {
        let sym = self.funcs[fid.0 as usize].sym;
        if self.cc.symbols[sym].returns_value && self.cc.symbols[sym].always_returns {
            return;
        }

        let void_tag = self.cc.types.tag_void();
        if self.cc.symbols[sym].must_return_value(void_tag) {
            self.report_function_return_error(sym);
        }

        let end_pos = self.funcs[fid.0 as usize].end_pos;
        let Some(body) = &mut self.funcs[fid.0 as usize].body else {
            return;
        };
        // The parser guarantees a block body for any defined function.
        let StmtKind::Block(block) = &mut body.kind else {
            debug_assert!(false, "function bodies are blocks");
            return;
        };
        let mut ret = Stmt::new(
            StmtKind::Return(Box::new(ReturnStmt {
                expr: None,
                array: None,
            })),
            end_pos,
        );
        ret.flow = FlowType::Return;
        block.stmts.push(ret);
        body.flow = FlowType::Return;
    }

    /// The severity of a missing return value depends on how the function
    /// was declared and whether anyone consumes the result.
    pub(crate) fn report_function_return_error(&mut self, sym: SymbolId) {
        let (name, pos, tag, parent, retvalue_used) = {
            let s = &self.cc.symbols[sym];
            (s.name.clone(), s.pos, s.tag, s.parent, s.retvalue_used)
        };
        if parent.is_some() {
            // Member functions get no compatibility leniency.
            self.report(
                codes::MUST_RETURN_VALUE,
                pos,
                format!("function `{name}` must return a value"),
            );
            return;
        }
        if tag == Tag::INT {
            self.report(
                codes::SHOULD_RETURN_VALUE,
                pos,
                format!("function `{name}` should return a value"),
            );
        } else if self.cc.types.get(tag).is_enum()
            || tag == self.cc.types.tag_bool()
            || tag == self.cc.types.tag_float()
            || !retvalue_used
        {
            self.report(
                codes::MISSING_RETURN_VALUE,
                pos,
                format!("function `{name}` does not always return a value"),
            );
        } else {
            self.report(
                codes::MUST_RETURN_VALUE,
                pos,
                format!("function `{name}` must return a value"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use sable_common::codes;

    use crate::ast::nodes::StmtKind;
    use crate::semantic::testutil::*;
    use crate::semantic::value::{Ident, Tag};

    #[test]
    fn void_function_may_not_return_a_value() {
        // void f() { return 1; }
        let mut unit = TestUnit::new();
        let void = unit.void_tag();
        unit.func(
            FuncSpec::public("f", void),
            None,
            Some(vec![ret(Some(int(1)))]),
        );
        assert!(!unit.analyze());
        assert!(unit.error_codes().contains(&codes::RETURN_VALUE_IN_VOID));
    }

    #[test]
    fn missing_return_synthesizes_terminator() {
        // int f() { if (c) return 1; } gets a synthetic bare return and a
        // should-return warning.
        let mut unit = TestUnit::new();
        let c = unit.global_var("c", Tag::INT);
        let (f, fid) = unit.func(
            FuncSpec::public("f", Tag::INT),
            None,
            Some(vec![if_stmt(sym(c), ret(Some(int(1))), None)]),
        );
        assert!(unit.analyze());
        assert!(unit.warning_codes().contains(&codes::SHOULD_RETURN_VALUE));

        assert!(unit.cc.symbols[f].returns_value);
        assert!(!unit.cc.symbols[f].always_returns);

        let body = unit.tree.functions[fid.0 as usize].body.as_ref().unwrap();
        assert_eq!(body.flow, crate::semantic::value::FlowType::Return);
        let StmtKind::Block(block) = &body.kind else {
            panic!()
        };
        let last = block.stmts.last().unwrap();
        let StmtKind::Return(r) = &last.kind else {
            panic!("expected synthetic return, got {:?}", last.kind)
        };
        assert!(r.expr.is_none());
    }

    #[test]
    fn always_returning_body_needs_no_synthesis() {
        let mut unit = TestUnit::new();
        let (f, fid) = unit.func(
            FuncSpec::public("f", Tag::INT),
            None,
            Some(vec![ret(Some(int(7)))]),
        );
        assert!(unit.analyze());
        assert!(unit.cc.symbols[f].always_returns);
        let body = unit.tree.functions[fid.0 as usize].body.as_ref().unwrap();
        let StmtKind::Block(block) = &body.kind else {
            panic!()
        };
        assert_eq!(block.stmts.len(), 1);
    }

    #[test]
    fn mixed_return_styles_warn_once() {
        let mut unit = TestUnit::new();
        let c = unit.global_var("c", Tag::INT);
        let body = vec![
            if_stmt(sym(c), ret(None), None),
            ret(Some(int(1))),
            if_stmt(sym(c), ret(Some(int(2))), None),
        ];
        unit.func(FuncSpec::public("f", Tag::INT), None, Some(body));
        assert!(unit.analyze());
        let mixed: Vec<_> = unit
            .warning_codes()
            .into_iter()
            .filter(|&c| c == codes::MIXED_RETURN_STYLES)
            .collect();
        // Reported at both sites, once; the latch stops repeats.
        assert_eq!(mixed.len(), 2);
    }

    #[test]
    fn recursive_array_return_inference_is_an_error() {
        // An array-returning function whose size inference re-enters
        // itself cannot be resolved.
        let mut unit = TestUnit::new();
        let (f, fid) = unit.func_decl(FuncSpec::public("f", Tag::INT).ret_dims(&[3]));
        let scope = unit.scope();
        let arr = unit.local_array(scope, "arr", Tag::INT, &[3]);
        unit.set_body(
            fid,
            Some(scope),
            vec![expr_stmt(call(sym(f), vec![])), ret(Some(sym(arr)))],
        );
        assert!(!unit.analyze());
        assert!(unit.error_codes().contains(&codes::RECURSIVE_ANALYSIS));
    }

    #[test]
    fn array_return_attaches_hidden_parameter() {
        let mut unit = TestUnit::new();
        let (f, fid) = unit.func_decl(FuncSpec::new("make", Tag::INT).ret_dims(&[3]));
        let scope = unit.scope();
        let arr = unit.local_array(scope, "arr", Tag::INT, &[3]);
        unit.set_body(fid, Some(scope), vec![ret(Some(sym(arr)))]);

        // Calling it forces the inference, and the result is a ref-array.
        let sink = unit.global_var("sink", Tag::INT);
        let (_, main_fid) = unit.public_main(vec![expr_stmt(assign(
            sym(sink),
            index(call(sym(f), vec![]), int(0)),
        ))]);
        let _ = main_fid;
        assert!(unit.analyze());
        assert!(unit.error_codes().is_empty());

        let sub = unit.cc.symbols[f].child.expect("hidden return parameter");
        let s = &unit.cc.symbols[sub];
        assert_eq!(s.ident, Ident::RefArray);
        assert_eq!(s.array.length, 3);
        // No declared arguments: slot sits right after the frame header.
        assert_eq!(s.addr, 3 * 4);
        assert_eq!(s.parent, Some(f));
    }

    #[test]
    fn array_returns_must_agree_in_size() {
        let mut unit = TestUnit::new();
        let c = unit.global_var("c", Tag::INT);
        let (_, fid) = unit.func_decl(FuncSpec::public("make", Tag::INT).ret_dims(&[3]));
        let scope = unit.scope();
        let small = unit.local_array(scope, "small", Tag::INT, &[3]);
        let big = unit.local_array(scope, "big", Tag::INT, &[5]);
        unit.set_body(
            fid,
            Some(scope),
            vec![
                if_stmt(sym(c), ret(Some(sym(small))), None),
                ret(Some(sym(big))),
            ],
        );
        assert!(!unit.analyze());
        assert!(unit.error_codes().contains(&codes::ARRAY_SIZE_MISMATCH));
    }

    #[test]
    fn mixing_array_and_value_returns_fails() {
        let mut unit = TestUnit::new();
        let c = unit.global_var("c", Tag::INT);
        let (_, fid) = unit.func_decl(FuncSpec::public("make", Tag::INT).ret_dims(&[3]));
        let scope = unit.scope();
        let arr = unit.local_array(scope, "arr", Tag::INT, &[3]);
        unit.set_body(
            fid,
            Some(scope),
            vec![if_stmt(sym(c), ret(Some(sym(arr))), None), ret(Some(int(1)))],
        );
        assert!(!unit.analyze());
        assert!(unit.error_codes().contains(&codes::MIXED_ARRAY_RETURN));
    }

    #[test]
    fn forward_and_public_return_tags_must_match() {
        let mut unit = TestUnit::new();
        let float = unit.float_tag();
        let mut spec = FuncSpec::public("on_start", float);
        spec.is_forward = true;
        let (_, fid) = unit.func_decl(spec);
        unit.set_body(fid, None, vec![ret(Some(tagged(0, float)))]);
        // The implementation was parsed with an int return type.
        unit.tree.functions[fid.0 as usize].ret.tag = Tag::INT;
        assert!(!unit.analyze());
        assert!(unit.error_codes().contains(&codes::FORWARD_TAG_MISMATCH));
    }

    #[test]
    fn legacy_forward_void_retargets_old_style_decl() {
        // forward void X(); public X() { } compiles with X's effective
        // return type switched to void.
        let mut unit = TestUnit::new();
        let void = unit.void_tag();
        let mut spec = FuncSpec::public("X", void);
        spec.is_forward = true;
        spec.explicit_return_type = false;
        let (_, fid) = unit.func_decl(spec);
        unit.set_body(fid, None, vec![]);
        // The old-style implementation carries no return type of its own.
        unit.tree.functions[fid.0 as usize].ret.tag = Tag::INT;
        unit.tree.functions[fid.0 as usize].ret.is_new = false;
        assert!(unit.analyze());
        assert!(unit.error_codes().is_empty());
        assert_eq!(unit.tree.functions[fid.0 as usize].ret.tag, void);
    }

    #[test]
    fn native_functions_may_not_return_arrays() {
        let mut unit = TestUnit::new();
        let mut spec = FuncSpec::new("fetch", Tag::INT).ret_dims(&[4]);
        spec.is_native = true;
        unit.func(spec, None, None);
        unit.public_main(vec![]);
        assert!(!unit.analyze());
        assert!(unit.error_codes().contains(&codes::NATIVE_ARRAY_RETURN));
    }

    #[test]
    fn defined_function_requires_a_body() {
        let mut unit = TestUnit::new();
        unit.func_decl(FuncSpec::new("ghost", Tag::INT));
        unit.public_main(vec![]);
        assert!(!unit.analyze());
        assert!(unit.error_codes().contains(&codes::INVALID_STATEMENT));
    }

    #[test]
    fn analysis_is_memoized_per_function() {
        let mut unit = TestUnit::new();
        let (f, fid) = unit.func(
            FuncSpec::new("helper", Tag::INT),
            None,
            Some(vec![ret(Some(int(1)))]),
        );
        // Called twice; the second call reuses the memoized result.
        unit.public_main(vec![
            expr_stmt(call(sym(f), vec![])),
            expr_stmt(call(sym(f), vec![])),
        ]);
        assert!(unit.analyze());
        assert_eq!(
            unit.tree.functions[fid.0 as usize].state,
            crate::ast::nodes::AnalysisState::Done(true)
        );
    }
}
