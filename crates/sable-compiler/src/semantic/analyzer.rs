//! The analysis driver: context types, the `Analyzer`, and the post-pass
//! over scopes for unused symbols and entry-point detection.

use indexmap::IndexSet;
use log::debug;
use sable_common::codes;
use sable_common::diag::ReportSink;
use sable_common::span::Span;

use crate::ast::nodes::{FunctionDef, FunctionId, ParseTree, Stmt};
use crate::semantic::scope::{ScopeId, ScopeKind, ScopeTree};
use crate::semantic::symbols::{SymbolId, SymbolPool};
use crate::semantic::types::TypeRegistry;
use crate::semantic::value::{FlowType, Ident, Tag};

/// Name that marks a function as an entry point even without `public`.
pub const MAIN_FUNCTION: &str = "main";

/// Process-wide compilation state, populated by the parser and consumed by
/// analysis and code generation.
#[derive(Debug)]
pub struct CompileContext {
    pub types: TypeRegistry,
    pub symbols: SymbolPool,
    pub scopes: ScopeTree,
    pub globals: ScopeId,
    /// Every function symbol seen.
    pub functions: IndexSet<SymbolId>,
    /// Entry points, collected during analysis.
    pub publics: IndexSet<SymbolId>,
    pub reports: ReportSink,
    /// Set by fatal conditions; analysis unwinds without further mutation.
    pub must_abort: bool,
}

impl CompileContext {
    pub fn new() -> Self {
        let mut scopes = ScopeTree::new();
        let globals = scopes.alloc(None, ScopeKind::Global, None);
        Self {
            types: TypeRegistry::new(),
            symbols: SymbolPool::new(),
            scopes,
            globals,
            functions: IndexSet::new(),
            publics: IndexSet::new(),
            reports: ReportSink::new(),
            must_abort: false,
        }
    }
}

impl Default for CompileContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-function analysis state, saved and restored on function entry.
///
/// Every bracketed change (loop flags, flow collection, the pending heap
/// bit) is an explicit save-and-restore on these fields, so all exit paths
/// restore correctly.
#[derive(Debug, Clone)]
pub(crate) struct FuncContext {
    pub func: Option<SymbolId>,
    pub func_node: Option<FunctionId>,
    pub scope: ScopeId,
    pub always_returns: bool,
    pub returns_value: bool,
    /// Position of the first bare `return;`, for the mixed-returns report.
    pub void_return: Option<Span>,
    pub warned_mixed_returns: bool,
    pub warned_unreachable: bool,
    pub loop_has_break: bool,
    pub loop_has_continue: bool,
    pub loop_has_return: bool,
}

impl FuncContext {
    pub fn top_level(scope: ScopeId) -> Self {
        Self {
            func: None,
            func_node: None,
            scope,
            always_returns: false,
            returns_value: false,
            void_return: None,
            warned_mixed_returns: false,
            warned_unreachable: false,
            loop_has_break: false,
            loop_has_continue: false,
            loop_has_return: false,
        }
    }

    pub fn for_function(&self, func: SymbolId, node: FunctionId) -> Self {
        Self {
            func: Some(func),
            func_node: Some(node),
            ..Self::top_level(self.scope)
        }
    }
}

/// The semantic analyzer. One instance walks one translation unit.
pub struct Analyzer<'a> {
    pub(crate) cc: &'a mut CompileContext,
    pub(crate) funcs: &'a mut Vec<FunctionDef>,
    pub(crate) cx: FuncContext,
    /// An unowned heap allocation is pending from a checked expression.
    pub(crate) pending_heap: bool,
    /// File-static scopes seen while splicing, for the unused-symbol scan.
    pub(crate) static_scopes: IndexSet<ScopeId>,
}

/// Analyze a translation unit in place. Returns false if any error was
/// reported or no entry point exists.
pub fn analyze(cc: &mut CompileContext, tree: &mut ParseTree) -> bool {
    let mut top = std::mem::take(&mut tree.top);
    let mut analyzer = Analyzer {
        cx: FuncContext::top_level(cc.globals),
        cc,
        funcs: &mut tree.functions,
        pending_heap: false,
        static_scopes: IndexSet::new(),
    };
    let ok = analyzer.run(&mut top);
    tree.top = top;
    ok
}

impl<'a> Analyzer<'a> {
    pub(crate) fn report(&mut self, code: u16, span: Span, message: impl Into<String>) {
        self.cc.reports.report(code, span, message);
    }

    pub(crate) fn type_name(&self, tag: Tag) -> String {
        self.cc.types.pretty_name(tag).to_string()
    }

    fn run(&mut self, top: &mut Vec<Stmt>) -> bool {
        debug!("semantic analysis: {} top-level statements", top.len());
        let mark = self.cc.reports.mark();

        let mut ok = true;
        let mut list_flow = FlowType::None;
        for stmt in top.iter_mut() {
            self.cc.reports.reset_error_flag();
            let stmt_ok = self.check_stmt_default(stmt);
            ok &= stmt_ok;
            if stmt.flow != FlowType::None && list_flow == FlowType::None {
                list_flow = stmt.flow;
            }
            if stmt_ok {
                self.process_stmt_uses(stmt);
            }
        }

        if !ok || !self.cc.reports.ok_since(mark) {
            return false;
        }

        // This inserts missing return statements at the global scope, so it
        // cannot be skipped even when no entry point was found.
        let mut has_public = false;
        let statics: Vec<ScopeId> = self.static_scopes.iter().copied().collect();
        for scope in statics {
            has_public |= self.test_symbols(scope, false);
        }
        has_public |= self.test_symbols(self.cc.globals, false);

        if !has_public {
            self.report(
                codes::NO_ENTRY_POINT,
                Span::dummy(),
                "no entry point (no public functions)",
            );
            self.cc.must_abort = true;
            return false;
        }
        debug!("entry point present; {} public(s)", self.cc.publics.len());

        // All heap allocations must have been assigned an owner.
        debug_assert!(!self.pending_heap);
        self.cc.reports.ok_since(mark)
    }

    /// Test every symbol in a scope for usage. Returns whether an entry
    /// point was found (only meaningful for global/file-static scopes).
    pub(crate) fn test_symbols(&mut self, scope: ScopeId, testconst: bool) -> bool {
        let mut entry = false;
        for sym in self.cc.scopes.symbols(scope, &self.cc.symbols) {
            entry |= self.test_symbol(sym, testconst);
        }
        entry
    }

    fn test_symbol(&mut self, id: SymbolId, testconst: bool) -> bool {
        let sym = &self.cc.symbols[id];
        let mut entry = false;
        match sym.ident {
            Ident::Function => {
                if sym.is_public || sym.name == MAIN_FUNCTION {
                    entry = true;
                }
                if !sym.is_read() && !(sym.native || sym.stock || sym.is_public) && sym.defined {
                    let name = sym.name.clone();
                    let pos = sym.pos;
                    self.report(
                        codes::UNUSED_SYMBOL,
                        pos,
                        format!("symbol `{name}` is never used"),
                    );
                    return entry;
                }

                // Functions may be used as callbacks, in which case their
                // arguments are exempt from the unused check. That isn't
                // known until the whole unit has been analyzed, which is
                // now, so the per-function checks run here.
                let node = sym.function().node;
                let callback = sym.callback;
                if let Some(fid) = node {
                    if self.funcs[fid.0 as usize].body.is_some() {
                        self.check_function_return_usage(fid);
                        let scope = self.funcs[fid.0 as usize].scope;
                        if let Some(scope) = scope {
                            if !callback {
                                self.test_symbols(scope, true);
                            }
                        }
                    }
                }
            }
            Ident::Constant => {
                if testconst && !sym.is_read() {
                    let name = sym.name.clone();
                    let pos = sym.pos;
                    self.report(
                        codes::UNUSED_SYMBOL,
                        pos,
                        format!("symbol `{name}` is never used"),
                    );
                }
            }
            Ident::Methodmap | Ident::EnumStruct => {
                // Type names carry no usage obligations.
            }
            _ => {
                // A variable. Children of hierarchical data are exempt.
                if sym.parent.is_some() {
                    return entry;
                }
                let name = sym.name.clone();
                let pos = sym.pos;
                if !sym.stock && !sym.is_public && sym.usage == 0 {
                    self.report(
                        codes::UNUSED_SYMBOL,
                        pos,
                        format!("symbol `{name}` is never used"),
                    );
                } else if !sym.stock && !sym.is_public && !sym.is_read() {
                    self.report(
                        codes::ASSIGNED_NEVER_READ,
                        pos,
                        format!("value assigned to `{name}` is never read"),
                    );
                }
            }
        }
        entry
    }

    // ====================================================================
    // Flow collection
    //
    // Branch checks run under an "always returns" collector: the flag is
    // cleared before the branch and the branch's result is AND-merged into
    // the collector on exit, then the flag is restored.
    // ====================================================================

    pub(crate) fn begin_flow(&mut self) -> bool {
        std::mem::replace(&mut self.cx.always_returns, false)
    }

    pub(crate) fn end_flow(&mut self, saved: bool, out: &mut Option<bool>) {
        let branch = self.cx.always_returns;
        *out = Some(out.map_or(branch, |prev| prev && branch));
        self.cx.always_returns = saved;
    }
}
