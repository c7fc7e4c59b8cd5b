//! The symbol model: one pool of symbols addressed by id, so the cyclic
//! symbol graph (function to callee, enum-struct to field, array to element)
//! needs no ownership gymnastics.

use sable_common::span::{FileId, Span};

use crate::ast::nodes::FunctionId;
use crate::semantic::scope::ScopeKind;
use crate::semantic::types::MethodmapId;
use crate::semantic::value::{cell, Ident, Tag};

/// Index of a symbol in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

/// Usage bits. Assignment marks WRITTEN only; every actual read marks READ.
/// The distinction drives the unused-variable diagnostics.
pub const USAGE_READ: u8 = 0x1;
pub const USAGE_WRITTEN: u8 = 0x2;
pub const USAGE_LIVE: u8 = 0x4;

/// Array shape attached to array symbols: length of this level plus the
/// number of dimensions below it. Sub-levels hang off `Symbol::child`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayDims {
    pub length: cell,
    pub level: i16,
}

/// Kind-specific payload of a symbol.
#[derive(Debug, Default)]
pub enum SymbolData {
    #[default]
    None,
    Function(FunctionData),
    EnumStruct(EnumStructData),
    /// Per-variable synthesized children for enum-struct field access.
    EnumStructVar(Vec<SymbolId>),
    Methodmap(MethodmapId),
}

#[derive(Debug, Default)]
pub struct FunctionData {
    pub args: Vec<ArgInfo>,
    /// The definition node in the parse tree's function pool.
    pub node: Option<FunctionId>,
    /// A forward declaration exists for this function.
    pub forward: bool,
}

#[derive(Debug, Default)]
pub struct EnumStructData {
    pub fields: Vec<SymbolId>,
    pub methods: Vec<SymbolId>,
}

/// A formal function argument.
#[derive(Debug, Clone)]
pub struct ArgInfo {
    pub name: String,
    /// `Variable`, `Reference`, `RefArray`, or `VarArgs`.
    pub ident: Ident,
    pub tag: Tag,
    /// Declared dimension sizes for ref-array arguments; 0 is a wildcard.
    pub dims: Vec<cell>,
    /// Index tag of the innermost dimension (enum-struct tag for
    /// enum-struct arrays); `Tag::INT` when untagged.
    pub idx_tag: Tag,
    pub is_const: bool,
    pub default: Option<DefaultArg>,
}

impl ArgInfo {
    pub fn scalar(name: &str, tag: Tag) -> Self {
        Self {
            name: name.to_string(),
            ident: Ident::Variable,
            tag,
            dims: Vec::new(),
            idx_tag: Tag::INT,
            is_const: false,
            default: None,
        }
    }
}

/// A formal argument's default value.
#[derive(Debug, Clone)]
pub struct DefaultArg {
    pub tag: Tag,
    pub val: Option<cell>,
    /// Default array payload for ref-array arguments (size in cells; the
    /// emitter owns the contents).
    pub array: Option<cell>,
    /// A global symbol used as the default.
    pub sym: Option<SymbolId>,
}

/// A named declaration.
#[derive(Debug)]
pub struct Symbol {
    pub name: String,
    pub ident: Ident,
    /// Storage class.
    pub vclass: ScopeKind,
    pub tag: Tag,
    /// Address, offset, or constant value depending on `ident`. For an
    /// enum-struct root this is the total size in cells.
    pub addr: cell,
    pub array: ArrayDims,
    /// Index tag for enum-indexed arrays; doubles as the enum-struct tag of
    /// enum-struct array symbols. `Tag::INT` when untagged.
    pub idx_tag: Tag,
    pub file: Option<FileId>,
    pub pos: Span,
    pub usage: u8,

    pub defined: bool,
    pub is_const: bool,
    pub stock: bool,
    pub is_public: bool,
    pub is_static: bool,
    pub native: bool,
    pub is_operator: bool,
    pub deprecated: bool,
    /// The function is (also) invoked indirectly, as a callback.
    pub callback: bool,
    pub returns_value: bool,
    pub always_returns: bool,
    pub retvalue_used: bool,
    pub explicit_return_type: bool,
    pub enumroot: bool,
    pub enumfield: bool,

    /// Deprecation notice or doc string.
    pub documentation: Option<String>,

    /// Next symbol in a scope chain (argument scopes allow redeclaration).
    pub next: Option<SymbolId>,
    pub parent: Option<SymbolId>,
    /// Array element symbol, or a function's hidden array-return symbol.
    pub child: Option<SymbolId>,

    pub data: SymbolData,

    refers_to: Vec<SymbolId>,
    referred_from_count: usize,
}

impl Symbol {
    pub fn new(name: &str, ident: Ident, vclass: ScopeKind, tag: Tag) -> Self {
        Self {
            name: name.to_string(),
            ident,
            vclass,
            tag,
            addr: 0,
            array: ArrayDims::default(),
            idx_tag: Tag::INT,
            file: None,
            pos: Span::dummy(),
            usage: 0,
            defined: false,
            is_const: false,
            stock: false,
            is_public: false,
            is_static: false,
            native: false,
            is_operator: false,
            deprecated: false,
            callback: false,
            returns_value: false,
            always_returns: false,
            retvalue_used: false,
            explicit_return_type: false,
            enumroot: false,
            enumfield: false,
            documentation: None,
            next: None,
            parent: None,
            child: None,
            data: SymbolData::None,
            refers_to: Vec::new(),
            referred_from_count: 0,
        }
    }

    pub fn is_read(&self) -> bool {
        self.usage & USAGE_READ != 0
    }

    pub fn is_written(&self) -> bool {
        self.usage & USAGE_WRITTEN != 0
    }

    pub fn is_unreferenced(&self) -> bool {
        self.referred_from_count == 0
    }

    pub fn refers_to(&self) -> &[SymbolId] {
        &self.refers_to
    }

    pub fn function(&self) -> &FunctionData {
        match &self.data {
            SymbolData::Function(f) => f,
            _ => panic!("symbol `{}` is not a function", self.name),
        }
    }

    pub fn function_mut(&mut self) -> &mut FunctionData {
        match &mut self.data {
            SymbolData::Function(f) => f,
            _ => panic!("symbol `{}` is not a function", self.name),
        }
    }

    pub fn enum_struct_data(&self) -> Option<&EnumStructData> {
        match &self.data {
            SymbolData::EnumStruct(d) => Some(d),
            _ => None,
        }
    }

    /// Whether the final formal argument is a variadic pack.
    pub fn is_variadic(&self) -> bool {
        self.function()
            .args
            .last()
            .is_some_and(|a| a.ident == Ident::VarArgs)
    }

    /// A bare `return;` in this function warrants a missing-value report.
    pub fn must_return_value(&self, void_tag: Tag) -> bool {
        self.explicit_return_type && self.tag != void_tag
    }
}

/// The symbol arena.
#[derive(Debug, Default)]
pub struct SymbolPool {
    syms: Vec<Symbol>,
}

impl SymbolPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, sym: Symbol) -> SymbolId {
        let id = SymbolId(self.syms.len() as u32);
        self.syms.push(sym);
        id
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.syms[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.syms[id.0 as usize]
    }

    /// OR usage bits into a symbol.
    pub fn mark_usage(&mut self, id: SymbolId, bits: u8) {
        self.syms[id.0 as usize].usage |= bits;
    }

    /// Record that `from` refers to `to`, with the reverse count bumped for
    /// dead-code detection.
    pub fn add_reference(&mut self, from: SymbolId, to: SymbolId) {
        if from == to || self.syms[from.0 as usize].refers_to.contains(&to) {
            return;
        }
        self.syms[from.0 as usize].refers_to.push(to);
        self.syms[to.0 as usize].referred_from_count += 1;
    }

    /// Build an array symbol with one child symbol per inner dimension.
    pub fn new_array_variable(
        &mut self,
        name: &str,
        addr: cell,
        ident: Ident,
        vclass: ScopeKind,
        tag: Tag,
        dims: &[cell],
        enum_struct_tag: Tag,
    ) -> SymbolId {
        debug_assert!(!dims.is_empty());
        // Innermost level first, so each level can link to its child.
        let mut child: Option<SymbolId> = None;
        let mut built = None;
        for (levels_below, &length) in dims.iter().rev().enumerate() {
            let mut sym = Symbol::new(name, ident, vclass, tag);
            sym.addr = addr;
            sym.array = ArrayDims {
                length,
                level: levels_below as i16,
            };
            sym.idx_tag = enum_struct_tag;
            sym.defined = true;
            sym.child = child;
            let id = self.alloc(sym);
            child = Some(id);
            built = Some(id);
        }
        built.expect("dims is non-empty")
    }

    pub fn len(&self) -> usize {
        self.syms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.syms.is_empty()
    }
}

impl std::ops::Index<SymbolId> for SymbolPool {
    type Output = Symbol;

    fn index(&self, id: SymbolId) -> &Symbol {
        self.get(id)
    }
}

impl std::ops::IndexMut<SymbolId> for SymbolPool {
    fn index_mut(&mut self, id: SymbolId) -> &mut Symbol {
        self.get_mut(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_bits() {
        let mut pool = SymbolPool::new();
        let id = pool.alloc(Symbol::new("x", Ident::Variable, ScopeKind::Local, Tag::INT));
        assert!(!pool[id].is_read());
        pool.mark_usage(id, USAGE_WRITTEN);
        assert!(pool[id].is_written());
        assert!(!pool[id].is_read());
        pool.mark_usage(id, USAGE_READ);
        assert!(pool[id].is_read());
    }

    #[test]
    fn references_are_deduplicated() {
        let mut pool = SymbolPool::new();
        let a = pool.alloc(Symbol::new("a", Ident::Variable, ScopeKind::Global, Tag::INT));
        let b = pool.alloc(Symbol::new("b", Ident::Variable, ScopeKind::Global, Tag::INT));
        pool.add_reference(a, b);
        pool.add_reference(a, b);
        assert_eq!(pool[a].refers_to(), &[b]);
        assert!(!pool[b].is_unreferenced());
        assert!(pool[a].is_unreferenced());
    }

    #[test]
    fn array_variable_builds_child_chain() {
        let mut pool = SymbolPool::new();
        let id = pool.new_array_variable(
            "grid",
            0,
            Ident::RefArray,
            ScopeKind::Global,
            Tag::INT,
            &[4, 8],
            Tag::INT,
        );
        let outer = &pool[id];
        assert_eq!(outer.array.length, 4);
        assert_eq!(outer.array.level, 1);
        let inner = &pool[outer.child.unwrap()];
        assert_eq!(inner.array.length, 8);
        assert_eq!(inner.array.level, 0);
        assert!(inner.child.is_none());
    }
}
