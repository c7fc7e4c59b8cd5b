//! The value descriptor attached to every checked expression.

use crate::semantic::symbols::SymbolId;
use crate::semantic::types::MethodId;

/// A VM cell. All Sable scalars are 32-bit two's-complement cells; floats
/// are IEEE-754 bits stored in a cell.
#[allow(non_camel_case_types)]
pub type cell = i32;

/// Integer handle identifying a type in the registry. Tags are dense from
/// zero and stable across passes; tag 0 is the implicit integer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tag(pub u32);

impl Tag {
    /// The implicit integer type.
    pub const INT: Tag = Tag(0);
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value category of a symbol or expression result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ident {
    /// A compile-time constant.
    Constant,
    /// A scalar variable, addressable directly.
    Variable,
    /// A scalar passed by reference.
    Reference,
    /// A fixed array, address known at compile time.
    Array,
    /// An array accessed through a reference (argument, heap temporary).
    RefArray,
    /// A single cell of an array, address computed at runtime.
    ArrayCell,
    /// A single packed character of a string array.
    ArrayChar,
    /// A methodmap property reached through a getter/setter pair.
    Accessor,
    /// The result of an expression; exists only on the stack.
    Expression,
    /// A function.
    Function,
    /// Variadic argument pack marker (formal arguments only).
    VarArgs,
    /// A methodmap type name.
    Methodmap,
    /// An enum-struct type name.
    EnumStruct,
}

impl Ident {
    /// Only these categories can appear on the left of an assignment.
    pub fn is_lvalue_kind(self) -> bool {
        matches!(
            self,
            Ident::Variable
                | Ident::Reference
                | Ident::ArrayCell
                | Ident::ArrayChar
                | Ident::Accessor
        )
    }

    pub fn is_array_kind(self) -> bool {
        matches!(self, Ident::Array | Ident::RefArray)
    }
}

/// The descriptor assigned to every expression node after checking.
///
/// `constval` holds the value for constants. For literal arrays it holds
/// the element count; literal strings encode their size *negatively*,
/// including the terminator, so assignment checking can tell them apart
/// from fixed-size arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Value {
    pub ident: Ident,
    pub tag: Tag,
    pub sym: Option<SymbolId>,
    pub constval: cell,
    pub accessor: Option<MethodId>,
}

impl Value {
    pub fn new(ident: Ident, tag: Tag) -> Self {
        Self {
            ident,
            tag,
            sym: None,
            constval: 0,
            accessor: None,
        }
    }

    pub fn constant(value: cell, tag: Tag) -> Self {
        Self {
            constval: value,
            ..Self::new(Ident::Constant, tag)
        }
    }

    /// The recovery value used after an undefined-reference error: constant
    /// zero, so downstream checks keep running without cascading.
    pub fn error() -> Self {
        Self::constant(0, Tag::INT)
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::error()
    }
}

/// Terminator class of a statement, used for reachability and
/// return-completeness analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowType {
    #[default]
    None,
    Break,
    Continue,
    Return,
    Mixed,
}
