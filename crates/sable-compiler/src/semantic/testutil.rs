//! Builders for analysis tests: a small world (context + tree) plus free
//! functions for assembling expression and statement nodes, standing in
//! for the parser.

use indexmap::IndexSet;
use sable_common::span::Span;

use crate::ast::nodes::{
    AnalysisState, BinOp, BinaryExpr, BlockStmt, CallArg, CallExpr, Expr, ExprKind, FunctionDef,
    FunctionId, IfStmt, LoopKind, LoopStmt, ParseTree, ReturnStmt, Stmt, StmtKind, SwitchCase,
    SwitchStmt, TypeInfo, UnaryOp,
};
use crate::semantic::analyzer::{Analyzer, CompileContext, FuncContext};
use crate::semantic::operators::operator_name;
use crate::semantic::scope::{ScopeId, ScopeKind};
use crate::semantic::symbols::{
    ArgInfo, FunctionData, Symbol, SymbolData, SymbolId,
};
use crate::semantic::types::{Methodmap, MethodmapId};
use crate::semantic::value::{cell, Ident, Tag};

pub(crate) struct TestUnit {
    pub cc: CompileContext,
    pub tree: ParseTree,
}

/// Declaration shape for a test function.
pub(crate) struct FuncSpec {
    pub name: String,
    pub tag: Tag,
    pub args: Vec<ArgInfo>,
    pub ret_dims: Vec<cell>,
    pub is_public: bool,
    pub is_native: bool,
    pub is_forward: bool,
    pub explicit_return_type: bool,
}

impl FuncSpec {
    pub fn new(name: &str, tag: Tag) -> Self {
        Self {
            name: name.to_string(),
            tag,
            args: Vec::new(),
            ret_dims: Vec::new(),
            is_public: false,
            is_native: false,
            is_forward: false,
            explicit_return_type: true,
        }
    }

    pub fn public(name: &str, tag: Tag) -> Self {
        Self {
            is_public: true,
            ..Self::new(name, tag)
        }
    }

    pub fn args(mut self, args: Vec<ArgInfo>) -> Self {
        self.args = args;
        self
    }

    pub fn ret_dims(mut self, dims: &[cell]) -> Self {
        self.ret_dims = dims.to_vec();
        self
    }
}

impl TestUnit {
    pub fn new() -> Self {
        Self {
            cc: CompileContext::new(),
            tree: ParseTree::default(),
        }
    }

    pub fn bool_tag(&self) -> Tag {
        self.cc.types.tag_bool()
    }

    pub fn float_tag(&self) -> Tag {
        self.cc.types.tag_float()
    }

    pub fn string_tag(&self) -> Tag {
        self.cc.types.tag_string()
    }

    pub fn void_tag(&self) -> Tag {
        self.cc.types.tag_void()
    }

    // ====================================================================
    // Symbols
    // ====================================================================

    /// A local scope hanging off the global scope, for function bodies.
    pub fn scope(&mut self) -> ScopeId {
        self.cc.scopes.alloc(Some(self.cc.globals), ScopeKind::Local, None)
    }

    pub fn global_var(&mut self, name: &str, tag: Tag) -> SymbolId {
        let mut sym = Symbol::new(name, Ident::Variable, ScopeKind::Global, tag);
        sym.defined = true;
        let id = self.cc.symbols.alloc(sym);
        let globals = self.cc.globals;
        self.cc.scopes.add(globals, name, id).unwrap();
        id
    }

    pub fn local(&mut self, scope: ScopeId, name: &str, tag: Tag) -> SymbolId {
        let mut sym = Symbol::new(name, Ident::Variable, ScopeKind::Local, tag);
        sym.defined = true;
        let id = self.cc.symbols.alloc(sym);
        self.cc.scopes.add(scope, name, id).unwrap();
        id
    }

    pub fn local_array(&mut self, scope: ScopeId, name: &str, tag: Tag, dims: &[cell]) -> SymbolId {
        let id = self.cc.symbols.new_array_variable(
            name,
            0,
            Ident::Array,
            ScopeKind::Local,
            tag,
            dims,
            Tag::INT,
        );
        self.cc.scopes.add(scope, name, id).unwrap();
        id
    }

    pub fn constant(&mut self, name: &str, value: cell, tag: Tag) -> SymbolId {
        let mut sym = Symbol::new(name, Ident::Constant, ScopeKind::Global, tag);
        sym.defined = true;
        sym.addr = value;
        let id = self.cc.symbols.alloc(sym);
        let globals = self.cc.globals;
        self.cc.scopes.add(globals, name, id).unwrap();
        id
    }

    pub fn declare_operator(&mut self, token: &str, tags: &[Tag], ret: Tag) -> SymbolId {
        let name = operator_name(token, tags);
        let mut sym = Symbol::new(&name, Ident::Function, ScopeKind::Global, ret);
        sym.defined = true;
        sym.is_operator = true;
        sym.stock = true;
        sym.data = SymbolData::Function(FunctionData::default());
        let id = self.cc.symbols.alloc(sym);
        let globals = self.cc.globals;
        self.cc.scopes.add(globals, &name, id).unwrap();
        id
    }

    pub fn declare_methodmap(
        &mut self,
        name: &str,
        parent: Option<MethodmapId>,
    ) -> (MethodmapId, Tag) {
        let (id, tag) = self
            .cc
            .types
            .define_methodmap(Methodmap {
                name: name.to_string(),
                tag: Tag::INT,
                parent,
                ctor: None,
                dtor: None,
                must_construct_with_new: false,
                methods: Vec::new(),
            })
            .unwrap();
        let mut sym = Symbol::new(name, Ident::Methodmap, ScopeKind::Global, tag);
        sym.defined = true;
        sym.data = SymbolData::Methodmap(id);
        let sym_id = self.cc.symbols.alloc(sym);
        let globals = self.cc.globals;
        self.cc.scopes.add(globals, name, sym_id).unwrap();
        (id, tag)
    }

    // ====================================================================
    // Functions
    // ====================================================================

    /// Declare a function and append its declaration statement to the
    /// translation unit. `body` statements are wrapped into a block that
    /// owns `scope`.
    pub fn func(
        &mut self,
        spec: FuncSpec,
        scope: Option<ScopeId>,
        body: Option<Vec<Stmt>>,
    ) -> (SymbolId, FunctionId) {
        let (sym_id, fid) = self.func_decl(spec);
        if let Some(stmts) = body {
            self.set_body(fid, scope, stmts);
        }
        (sym_id, fid)
    }

    /// Declare a bodiless function, so tests can build a body that refers
    /// to the function's own symbol before attaching it.
    pub fn func_decl(&mut self, spec: FuncSpec) -> (SymbolId, FunctionId) {
        let mut sym = Symbol::new(&spec.name, Ident::Function, ScopeKind::Global, spec.tag);
        sym.defined = spec.is_native;
        sym.is_public = spec.is_public;
        sym.native = spec.is_native;
        sym.explicit_return_type = spec.explicit_return_type;
        sym.data = SymbolData::Function(FunctionData {
            args: spec.args.clone(),
            node: None,
            forward: spec.is_forward,
        });
        let sym_id = self.cc.symbols.alloc(sym);
        let globals = self.cc.globals;
        self.cc.scopes.add(globals, &spec.name, sym_id).unwrap();
        self.cc.functions.insert(sym_id);

        let fid = FunctionId(self.tree.functions.len() as u32);
        self.cc.symbols[sym_id].function_mut().node = Some(fid);

        self.tree.functions.push(FunctionDef {
            sym: sym_id,
            name: spec.name.clone(),
            pos: Span::dummy(),
            end_pos: Span::dummy(),
            ret: TypeInfo {
                ident: Some(Ident::Variable),
                tag: spec.tag,
                dims: spec.ret_dims.clone(),
                idx_tags: Vec::new(),
                is_const: false,
                is_new: spec.explicit_return_type,
            },
            body: None,
            scope: None,
            is_public: spec.is_public,
            is_forward: spec.is_forward,
            is_native: spec.is_native,
            is_stock: false,
            operator: None,
            state: AnalysisState::NotStarted,
        });
        self.tree
            .top
            .push(Stmt::new(StmtKind::FunctionDecl(fid), Span::dummy()));
        (sym_id, fid)
    }

    /// Attach a block body to a previously declared function.
    pub fn set_body(&mut self, fid: FunctionId, scope: Option<ScopeId>, stmts: Vec<Stmt>) {
        let sym = self.tree.functions[fid.0 as usize].sym;
        self.cc.symbols[sym].defined = true;
        self.tree.functions[fid.0 as usize].body = Some(Stmt::new(
            StmtKind::Block(Box::new(BlockStmt { stmts, scope })),
            Span::dummy(),
        ));
    }

    /// A `public void main()` wrapping the given statements, so the unit
    /// has an entry point.
    pub fn public_main(&mut self, body: Vec<Stmt>) -> (SymbolId, FunctionId) {
        let void = self.void_tag();
        self.func(FuncSpec::public("main", void), None, Some(body))
    }

    // ====================================================================
    // Driving
    // ====================================================================

    pub fn analyze(&mut self) -> bool {
        crate::semantic::analyze(&mut self.cc, &mut self.tree)
    }

    /// Run a closure against a fresh analyzer over this unit's world.
    pub fn with_analyzer<R>(&mut self, f: impl FnOnce(&mut Analyzer) -> R) -> R {
        let mut analyzer = Analyzer {
            cx: FuncContext::top_level(self.cc.globals),
            cc: &mut self.cc,
            funcs: &mut self.tree.functions,
            pending_heap: false,
            static_scopes: IndexSet::new(),
        };
        f(&mut analyzer)
    }

    /// All diagnostic codes, in emission order.
    pub fn codes(&self) -> Vec<u16> {
        self.cc
            .reports
            .diagnostics()
            .iter()
            .map(|d| d.code)
            .collect()
    }

    pub fn error_codes(&self) -> Vec<u16> {
        self.cc
            .reports
            .diagnostics()
            .iter()
            .filter(|d| d.is_error())
            .map(|d| d.code)
            .collect()
    }

    pub fn warning_codes(&self) -> Vec<u16> {
        self.cc
            .reports
            .diagnostics()
            .iter()
            .filter(|d| !d.is_error())
            .map(|d| d.code)
            .collect()
    }
}

// ========================================================================
// Expression builders
// ========================================================================

pub(crate) fn int(value: cell) -> Expr {
    Expr::new(ExprKind::Const { value, tag: Tag::INT }, Span::dummy())
}

pub(crate) fn tagged(value: cell, tag: Tag) -> Expr {
    Expr::new(ExprKind::Const { value, tag }, Span::dummy())
}

pub(crate) fn string(text: &str) -> Expr {
    Expr::new(
        ExprKind::StringLit {
            text: text.to_string(),
        },
        Span::dummy(),
    )
}

pub(crate) fn sym(id: SymbolId) -> Expr {
    Expr::new(ExprKind::Symbol { sym: id }, Span::dummy())
}

pub(crate) fn bin(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::new(
        ExprKind::Binary(Box::new(BinaryExpr::new(op, left, right))),
        Span::dummy(),
    )
}

pub(crate) fn assign(left: Expr, right: Expr) -> Expr {
    bin(BinOp::Assign, left, right)
}

pub(crate) fn unary(op: UnaryOp, inner: Expr) -> Expr {
    Expr::new(
        ExprKind::Unary {
            op,
            expr: Box::new(inner),
        },
        Span::dummy(),
    )
}

pub(crate) fn index(base: Expr, idx: Expr) -> Expr {
    Expr::new(
        ExprKind::Index {
            base: Box::new(base),
            index: Box::new(idx),
        },
        Span::dummy(),
    )
}

pub(crate) fn call(target: Expr, args: Vec<Expr>) -> Expr {
    Expr::new(
        ExprKind::Call(Box::new(CallExpr {
            target,
            is_new: false,
            args: args
                .into_iter()
                .map(|e| CallArg {
                    name: None,
                    expr: Some(e),
                })
                .collect(),
            sym: None,
            argv: Vec::new(),
        })),
        Span::dummy(),
    )
}

/// Call with a mix of positional (`None`) and named arguments.
pub(crate) fn call_named(target: Expr, args: Vec<(Option<&str>, Expr)>) -> Expr {
    Expr::new(
        ExprKind::Call(Box::new(CallExpr {
            target,
            is_new: false,
            args: args
                .into_iter()
                .map(|(name, e)| CallArg {
                    name: name.map(str::to_string),
                    expr: Some(e),
                })
                .collect(),
            sym: None,
            argv: Vec::new(),
        })),
        Span::dummy(),
    )
}

pub(crate) fn ternary(cond: Expr, second: Expr, third: Expr) -> Expr {
    Expr::new(
        ExprKind::Ternary {
            first: Box::new(cond),
            second: Box::new(second),
            third: Box::new(third),
        },
        Span::dummy(),
    )
}

// ========================================================================
// Statement builders
// ========================================================================

pub(crate) fn expr_stmt(expr: Expr) -> Stmt {
    Stmt::new(StmtKind::Expr(expr), Span::dummy())
}

pub(crate) fn ret(expr: Option<Expr>) -> Stmt {
    Stmt::new(
        StmtKind::Return(Box::new(ReturnStmt { expr, array: None })),
        Span::dummy(),
    )
}

pub(crate) fn block(stmts: Vec<Stmt>, scope: Option<ScopeId>) -> Stmt {
    Stmt::new(
        StmtKind::Block(Box::new(BlockStmt { stmts, scope })),
        Span::dummy(),
    )
}

pub(crate) fn if_stmt(cond: Expr, on_true: Stmt, on_false: Option<Stmt>) -> Stmt {
    Stmt::new(
        StmtKind::If(Box::new(IfStmt {
            cond,
            on_true,
            on_false,
        })),
        Span::dummy(),
    )
}

pub(crate) fn while_stmt(cond: Expr, body: Stmt) -> Stmt {
    Stmt::new(
        StmtKind::Loop(Box::new(LoopStmt {
            kind: LoopKind::While,
            cond,
            body,
            never_taken: false,
            always_taken: false,
        })),
        Span::dummy(),
    )
}

pub(crate) fn switch_stmt(expr: Expr, cases: Vec<(Vec<Expr>, Stmt)>, default: Option<Stmt>) -> Stmt {
    Stmt::new(
        StmtKind::Switch(Box::new(SwitchStmt {
            expr,
            cases: cases
                .into_iter()
                .map(|(labels, body)| SwitchCase { labels, body })
                .collect(),
            default_case: default,
        })),
        Span::dummy(),
    )
}

/// Build the declaration statement for an already-created variable symbol,
/// wrapping the initializer as `<name> = <expr>` the way the parser does.
pub(crate) fn var_decl(unit: &TestUnit, symbol: SymbolId, init: Option<Expr>) -> Stmt {
    let s = &unit.cc.symbols[symbol];
    let name = s.name.clone();
    let is_array = s.ident.is_array_kind();
    let type_info = TypeInfo {
        ident: Some(s.ident),
        tag: s.tag,
        dims: if is_array {
            vec![s.array.length]
        } else {
            Vec::new()
        },
        idx_tags: Vec::new(),
        is_const: s.is_const,
        is_new: true,
    };
    let init = init.map(|rhs| {
        let mut assignment = BinaryExpr::new(BinOp::Assign, sym(symbol), rhs);
        assignment.initializer = true;
        Expr::new(ExprKind::Binary(Box::new(assignment)), Span::dummy())
    });
    Stmt::new(
        StmtKind::VarDecl(Box::new(crate::ast::nodes::VarDeclStmt {
            sym: symbol,
            name,
            type_info,
            init,
        })),
        Span::dummy(),
    )
}
