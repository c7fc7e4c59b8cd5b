//! The Sable compiler's semantic analysis core.
//!
//! Sable is a statically-typed, C-like scripting language used to author
//! server-side game-mode logic. The compiler pipeline is lexing, parsing,
//! semantic analysis, code generation, bytecode assembly. This crate is the
//! semantic pass: given a parsed [`ast::ParseTree`] and a populated symbol
//! world, it enforces the language's typing and usage rules, resolves
//! user-defined operators, tracks control flow and heap ownership, and
//! rewrites the tree so code generation is purely mechanical.

pub mod ast;
pub mod semantic;
