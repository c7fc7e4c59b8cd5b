use sable_common::span::Span;

use crate::semantic::scope::ScopeId;
use crate::semantic::symbols::{ArgInfo, SymbolId};
use crate::semantic::types::{MethodId, MethodmapId};
use crate::semantic::value::{cell, FlowType, Ident, Tag, Value};

// ============================================================================
// Parse tree (top level)
// ============================================================================

/// A fully parsed translation unit, handed to semantic analysis.
///
/// Function bodies live in the side pool so a call expression can trigger
/// analysis of its callee (for return-array size inference) without aliasing
/// the statement tree that is currently being walked.
#[derive(Debug, Default)]
pub struct ParseTree {
    pub top: Vec<Stmt>,
    pub functions: Vec<FunctionDef>,
}

impl ParseTree {
    pub fn function(&self, id: FunctionId) -> &FunctionDef {
        &self.functions[id.0 as usize]
    }
}

/// Index of a function definition in [`ParseTree::functions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub u32);

/// Memoization state of per-function analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalysisState {
    #[default]
    NotStarted,
    InProgress,
    Done(bool),
}

/// A function definition (or bodiless native/forward declaration).
#[derive(Debug)]
pub struct FunctionDef {
    pub sym: SymbolId,
    pub name: String,
    pub pos: Span,
    /// Position of the closing brace; synthetic returns are placed here.
    pub end_pos: Span,
    /// Declared return type.
    pub ret: TypeInfo,
    pub body: Option<Stmt>,
    /// The argument scope, if the parser created one.
    pub scope: Option<ScopeId>,
    pub is_public: bool,
    pub is_forward: bool,
    pub is_native: bool,
    pub is_stock: bool,
    /// Operator token when this function is a user-defined operator.
    pub operator: Option<String>,
    pub state: AnalysisState,
}

/// Declared type of a variable, argument, or function return.
#[derive(Debug, Clone, Default)]
pub struct TypeInfo {
    pub ident: Option<Ident>,
    pub tag: Tag,
    /// Declared dimension sizes, outermost first; 0 means unsized.
    pub dims: Vec<cell>,
    /// Index tags per dimension (the last entry doubles as the enum-struct
    /// tag for enum-struct arrays). Empty when untagged.
    pub idx_tags: Vec<Tag>,
    pub is_const: bool,
    /// Whether this is a new-style declaration with an explicit type.
    pub is_new: bool,
}

impl TypeInfo {
    pub fn numdim(&self) -> usize {
        self.dims.len()
    }

    pub fn enum_struct_tag(&self) -> Tag {
        self.idx_tags.last().copied().unwrap_or(Tag::INT)
    }
}

// ============================================================================
// Statements
// ============================================================================

/// A statement node with its analysis annotations.
#[derive(Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Span,
    pub flow: FlowType,
    /// Set when this node owns heap allocations made by its descendants.
    pub tree_has_heap_allocs: bool,
}

impl Stmt {
    pub fn new(kind: StmtKind, pos: Span) -> Self {
        Self {
            kind,
            pos,
            flow: FlowType::None,
            tree_has_heap_allocs: false,
        }
    }
}

#[derive(Debug)]
pub enum StmtKind {
    VarDecl(Box<VarDeclStmt>),
    Expr(Expr),
    Block(Box<BlockStmt>),
    /// A statement sequence without its own scope (spliced includes, case
    /// bodies produced by the parser).
    StmtList(Vec<Stmt>),
    If(Box<IfStmt>),
    Loop(Box<LoopStmt>),
    For(Box<ForStmt>),
    Switch(Box<SwitchStmt>),
    Return(Box<ReturnStmt>),
    Break,
    Continue,
    Delete(Box<DeleteStmt>),
    Exit(Expr),
    Assert(Expr),
    StaticAssert { expr: Expr, text: Option<String> },
    FunctionDecl(FunctionId),
    EnumStructDecl { sym: SymbolId, methods: Vec<FunctionId> },
    MethodmapDecl(Box<MethodmapDeclStmt>),
    PragmaUnused(Vec<SymbolId>),
    /// Splices a file-static scope into the top-level walk.
    ChangeScope(ScopeId),
    /// Enum, typedef, typeset and pstruct declarations need no checking.
    TypeDecl,
}

#[derive(Debug)]
pub struct VarDeclStmt {
    pub sym: SymbolId,
    pub name: String,
    pub type_info: TypeInfo,
    /// The initializer, pre-wrapped by the parser as `<name> = <expr>` so
    /// declaration checking can reuse assignment checking wholesale.
    pub init: Option<Expr>,
}

impl VarDeclStmt {
    /// The right-hand side of the wrapped initializer.
    pub fn init_rhs(&self) -> Option<&Expr> {
        match &self.init {
            Some(Expr {
                kind: ExprKind::Binary(b),
                ..
            }) => Some(&b.right),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct BlockStmt {
    pub stmts: Vec<Stmt>,
    pub scope: Option<ScopeId>,
}

#[derive(Debug)]
pub struct IfStmt {
    pub cond: Expr,
    pub on_true: Stmt,
    pub on_false: Option<Stmt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    While,
    DoWhile,
}

#[derive(Debug)]
pub struct LoopStmt {
    pub kind: LoopKind,
    pub cond: Expr,
    pub body: Stmt,
    pub never_taken: bool,
    pub always_taken: bool,
}

#[derive(Debug)]
pub struct ForStmt {
    pub init: Option<Stmt>,
    pub cond: Option<Expr>,
    pub advance: Option<Expr>,
    pub body: Stmt,
    pub scope: Option<ScopeId>,
    pub has_continue: bool,
    pub never_taken: bool,
    pub always_taken: bool,
}

#[derive(Debug)]
pub struct SwitchStmt {
    pub expr: Expr,
    pub cases: Vec<SwitchCase>,
    pub default_case: Option<Stmt>,
}

#[derive(Debug)]
pub struct SwitchCase {
    pub labels: Vec<Expr>,
    pub body: Stmt,
}

#[derive(Debug)]
pub struct ReturnStmt {
    pub expr: Option<Expr>,
    /// Shape of the returned array, filled in for array returns so the
    /// emitter can copy through the hidden return parameter.
    pub array: Option<ArrayReturn>,
}

#[derive(Debug, Clone, Default)]
pub struct ArrayReturn {
    pub dims: Vec<cell>,
    pub tag: Tag,
}

#[derive(Debug)]
pub struct DeleteStmt {
    pub expr: Expr,
    /// The methodmap whose destructor runs, chosen by walking the
    /// inheritance chain.
    pub map: Option<MethodmapId>,
}

#[derive(Debug)]
pub struct MethodmapDeclStmt {
    pub map: MethodmapId,
    pub properties: Vec<PropertyDecl>,
    pub methods: Vec<FunctionId>,
}

#[derive(Debug)]
pub struct PropertyDecl {
    pub getter: Option<FunctionId>,
    pub setter: Option<FunctionId>,
}

// ============================================================================
// Expressions
// ============================================================================

/// An expression node with its analysis annotations.
#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Span,
    pub val: Value,
    pub lvalue: bool,
    /// This expression may allocate a heap temporary when emitted.
    pub can_alloc_heap: bool,
    /// This node owns heap allocations made by its descendants (set only on
    /// expressions that bracket ownership, like a for-loop advance).
    pub tree_has_heap_allocs: bool,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Span) -> Self {
        Self {
            kind,
            pos,
            val: Value::default(),
            lvalue: false,
            can_alloc_heap: false,
            tree_has_heap_allocs: false,
        }
    }

    /// Whether emitting this expression has an observable side effect.
    /// Drives the "expression has no effect" warning.
    pub fn has_side_effects(&self) -> bool {
        match &self.kind {
            ExprKind::Const { .. }
            | ExprKind::StringLit { .. }
            | ExprKind::Null
            | ExprKind::Symbol { .. }
            | ExprKind::This { .. }
            | ExprKind::Sizeof(_)
            | ExprKind::DefaultArg { .. } => false,
            ExprKind::ArrayLit(exprs) => exprs.iter().any(Expr::has_side_effects),
            ExprKind::Unary { expr, .. } => expr.has_side_effects(),
            ExprKind::IncDec { .. } => true,
            ExprKind::Binary(b) => {
                b.op.is_assign()
                    || b.userop.is_some()
                    || b.left.has_side_effects()
                    || b.right.has_side_effects()
            }
            ExprKind::Logical { left, right, .. } => {
                left.has_side_effects() || right.has_side_effects()
            }
            ExprKind::ChainedCompare { first, ops } => {
                first.has_side_effects()
                    || ops
                        .iter()
                        .any(|op| op.userop.is_some() || op.expr.has_side_effects())
            }
            ExprKind::Ternary {
                first,
                second,
                third,
            } => {
                first.has_side_effects() || second.has_side_effects() || third.has_side_effects()
            }
            ExprKind::Cast { expr, .. } => expr.has_side_effects(),
            ExprKind::Index { base, index } => base.has_side_effects() || index.has_side_effects(),
            ExprKind::FieldAccess(fa) => {
                fa.base.has_side_effects() || self.val.ident == Ident::Accessor
            }
            ExprKind::Call(_) | ExprKind::CallUserOp { .. } | ExprKind::NewArray { .. } => true,
            ExprKind::Comma {
                exprs,
                has_side_effects,
            } => *has_side_effects || exprs.iter().any(Expr::has_side_effects),
            ExprKind::StructInit { .. } => false,
            ExprKind::Rvalue(expr) => expr.has_side_effects(),
        }
    }
}

#[derive(Debug)]
pub enum ExprKind {
    /// A numeric, boolean or character literal carrying its tag.
    Const { value: cell, tag: Tag },
    StringLit { text: String },
    ArrayLit(Vec<Expr>),
    Null,
    Symbol { sym: SymbolId },
    This { sym: SymbolId },
    Unary { op: UnaryOp, expr: Box<Expr> },
    IncDec(Box<IncDecExpr>),
    Binary(Box<BinaryExpr>),
    Logical { op: LogicalOp, left: Box<Expr>, right: Box<Expr> },
    ChainedCompare { first: Box<Expr>, ops: Vec<CompareLink> },
    Ternary { first: Box<Expr>, second: Box<Expr>, third: Box<Expr> },
    Cast { tag: Tag, expr: Box<Expr> },
    Index { base: Box<Expr>, index: Box<Expr> },
    FieldAccess(Box<FieldAccessExpr>),
    Call(Box<CallExpr>),
    NewArray { tag: Tag, dims: Vec<Expr> },
    Sizeof(Box<SizeofExpr>),
    Comma { exprs: Vec<Expr>, has_side_effects: bool },
    /// Named-field initializer for a pseudo-struct declaration.
    StructInit { fields: Vec<StructInitField> },

    // Synthetic nodes inserted during analysis.
    /// Loads the value out of an l-value.
    Rvalue(Box<Expr>),
    /// Calls a user-defined operator in place of the built-in one.
    CallUserOp { op: UserOp, expr: Box<Expr> },
    /// Placeholder emitting a formal argument's default value.
    DefaultArg { arg_index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `-`
    Neg,
    /// `~`
    Invert,
}

impl UnaryOp {
    pub fn token(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
            UnaryOp::Invert => "~",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug)]
pub struct IncDecExpr {
    pub op: IncDecOp,
    pub prefix: bool,
    pub expr: Expr,
    pub userop: Option<UserOp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncDecOp {
    Inc,
    Dec,
}

impl IncDecOp {
    pub fn token(self) -> &'static str {
        match self {
            IncDecOp::Inc => "++",
            IncDecOp::Dec => "--",
        }
    }
}

/// Binary operator tokens, including the compound assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Assign,
    AssignAdd,
    AssignSub,
    AssignMul,
    AssignDiv,
    AssignMod,
    AssignShl,
    AssignShr,
    AssignShrU,
    AssignAnd,
    AssignXor,
    AssignOr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    ShrU,
    BitAnd,
    BitXor,
    BitOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn is_assign(self) -> bool {
        matches!(
            self,
            BinOp::Assign
                | BinOp::AssignAdd
                | BinOp::AssignSub
                | BinOp::AssignMul
                | BinOp::AssignDiv
                | BinOp::AssignMod
                | BinOp::AssignShl
                | BinOp::AssignShr
                | BinOp::AssignShrU
                | BinOp::AssignAnd
                | BinOp::AssignXor
                | BinOp::AssignOr
        )
    }

    /// The underlying arithmetic operator of a compound assignment, the
    /// operator itself for plain arithmetic/comparison, and `None` for
    /// simple assignment.
    pub fn oper(self) -> Option<BinOp> {
        match self {
            BinOp::Assign => None,
            BinOp::AssignAdd => Some(BinOp::Add),
            BinOp::AssignSub => Some(BinOp::Sub),
            BinOp::AssignMul => Some(BinOp::Mul),
            BinOp::AssignDiv => Some(BinOp::Div),
            BinOp::AssignMod => Some(BinOp::Mod),
            BinOp::AssignShl => Some(BinOp::Shl),
            BinOp::AssignShr => Some(BinOp::Shr),
            BinOp::AssignShrU => Some(BinOp::ShrU),
            BinOp::AssignAnd => Some(BinOp::BitAnd),
            BinOp::AssignXor => Some(BinOp::BitXor),
            BinOp::AssignOr => Some(BinOp::BitOr),
            other => Some(other),
        }
    }

    /// Relational operators that can chain (`a < b < c`).
    pub fn is_relational(self) -> bool {
        matches!(self, BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
    }

    /// Operators whose result is a boolean.
    pub fn yields_bool(self) -> bool {
        self.is_relational() || matches!(self, BinOp::Eq | BinOp::Ne)
    }

    /// Operators where a user-operator lookup may try swapped operands.
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Mul | BinOp::BitAnd | BinOp::BitXor | BinOp::BitOr
                | BinOp::Eq | BinOp::Ne
        )
    }

    pub fn token(self) -> &'static str {
        match self {
            BinOp::Assign => "=",
            BinOp::AssignAdd => "+=",
            BinOp::AssignSub => "-=",
            BinOp::AssignMul => "*=",
            BinOp::AssignDiv => "/=",
            BinOp::AssignMod => "%=",
            BinOp::AssignShl => "<<=",
            BinOp::AssignShr => ">>=",
            BinOp::AssignShrU => ">>>=",
            BinOp::AssignAnd => "&=",
            BinOp::AssignXor => "^=",
            BinOp::AssignOr => "|=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::ShrU => ">>>",
            BinOp::BitAnd => "&",
            BinOp::BitXor => "^",
            BinOp::BitOr => "|",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }
}

/// A resolved user-defined operator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserOp {
    pub sym: SymbolId,
    /// Result tag (the operator function's return tag).
    pub tag: Tag,
    /// The operands were swapped to match the declaration.
    pub swapped: bool,
}

#[derive(Debug)]
pub struct BinaryExpr {
    pub op: BinOp,
    pub left: Expr,
    pub right: Expr,
    /// User operator replacing the built-in arithmetic/comparison.
    pub userop: Option<UserOp>,
    /// User operator coercing the right-hand side of an assignment.
    pub assignop: Option<UserOp>,
    /// Cells to copy for array assignment; 0 when not an array copy.
    pub array_copy_length: cell,
    /// This assignment was synthesized from a variable initializer.
    pub initializer: bool,
}

impl BinaryExpr {
    pub fn new(op: BinOp, left: Expr, right: Expr) -> Self {
        Self {
            op,
            left,
            right,
            userop: None,
            assignop: None,
            array_copy_length: 0,
            initializer: false,
        }
    }
}

/// One link of a chained relational comparison.
#[derive(Debug)]
pub struct CompareLink {
    pub op: BinOp,
    pub pos: Span,
    pub expr: Expr,
    pub userop: Option<UserOp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldAccessKind {
    /// `base.field`
    Dot,
    /// `Type::field`, the compile-time offset operator.
    DoubleColon,
}

#[derive(Debug)]
pub struct FieldAccessExpr {
    pub base: Expr,
    pub name: String,
    pub access: FieldAccessKind,
    /// Resolved methodmap method or property.
    pub method: Option<MethodId>,
    /// Resolved enum-struct field (a synthesized child symbol).
    pub field: Option<SymbolId>,
}

#[derive(Debug)]
pub struct CallExpr {
    pub target: Expr,
    /// This call was written with `new`.
    pub is_new: bool,
    /// Arguments as written; drained into `argv` during checking.
    pub args: Vec<CallArg>,
    /// The resolved callee.
    pub sym: Option<SymbolId>,
    /// Checked arguments in formal order. Entries are either the checked
    /// user expression or a `DefaultArg` placeholder.
    pub argv: Vec<ComputedArg>,
}

/// An argument as written: positional, or named via `.name = expr`.
#[derive(Debug)]
pub struct CallArg {
    pub name: Option<String>,
    pub expr: Option<Expr>,
}

#[derive(Debug, Default)]
pub struct ComputedArg {
    pub expr: Option<Expr>,
    /// Index of the matching formal in the callee's argument list.
    pub arg_index: usize,
}

#[derive(Debug)]
pub struct SizeofExpr {
    pub sym: SymbolId,
    pub name: String,
    /// Number of `[]` index levels applied before the suffix.
    pub array_levels: u32,
    pub suffix: SizeofSuffix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizeofSuffix {
    None,
    /// `sizeof x.field`
    Field(String),
    /// `sizeof X::field`
    StaticField(String),
}

#[derive(Debug)]
pub struct StructInitField {
    pub name: String,
    pub value: Expr,
    pub pos: Span,
}

/// Formal-argument metadata lives in the symbol pool; re-exported here so
/// AST consumers see one surface.
pub type FunctionArgs = Vec<ArgInfo>;
