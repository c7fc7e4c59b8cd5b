//! The scope tree: nested lookup over symbol chains.
//!
//! Scopes live in a flat arena and link to their parents by index. Symbol
//! maps are insertion-ordered so the unused-symbol report is deterministic.

use indexmap::IndexMap;
use sable_common::span::FileId;

use crate::semantic::symbols::{SymbolId, SymbolPool};

/// Index of a scope in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

/// Storage/scope class. Doubles as a symbol's storage class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Local,
    Static,
    Argument,
    /// Analysis-only; enum fields are never stored.
    EnumField,
    FileStatic,
}

#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    parent: Option<ScopeId>,
    /// File this scope is static to, for file-static scopes.
    pub file: Option<FileId>,
    /// Head of the symbol chain per name.
    symbols: IndexMap<String, SymbolId>,
}

impl Scope {
    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    pub fn is_global_or_file_static(&self) -> bool {
        matches!(self.kind, ScopeKind::Global | ScopeKind::FileStatic)
    }

    pub fn is_local_or_argument(&self) -> bool {
        matches!(self.kind, ScopeKind::Local | ScopeKind::Argument)
    }
}

#[derive(Debug, Default)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, parent: Option<ScopeId>, kind: ScopeKind, file: Option<FileId>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            kind,
            parent,
            file,
            symbols: IndexMap::new(),
        });
        id
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    /// Find a name in this scope only.
    pub fn find_in(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        self.get(scope).symbols.get(name).copied()
    }

    /// Find a name walking up the parent chain; returns the symbol and the
    /// scope it was found in.
    pub fn find(&self, from: ScopeId, name: &str) -> Option<(SymbolId, ScopeId)> {
        let mut iter = Some(from);
        while let Some(id) = iter {
            if let Some(sym) = self.find_in(id, name) {
                return Some((sym, id));
            }
            iter = self.get(id).parent;
        }
        None
    }

    /// Add a symbol, rejecting redefinition in the same scope.
    /// On conflict, returns the existing symbol.
    pub fn add(&mut self, scope: ScopeId, name: &str, sym: SymbolId) -> Result<(), SymbolId> {
        let map = &mut self.scopes[scope.0 as usize].symbols;
        if let Some(&existing) = map.get(name) {
            return Err(existing);
        }
        map.insert(name.to_string(), sym);
        Ok(())
    }

    /// Add a symbol, linking duplicates into a chain instead of rejecting.
    pub fn add_chain(&mut self, scope: ScopeId, pool: &mut SymbolPool, name: &str, sym: SymbolId) {
        let map = &mut self.scopes[scope.0 as usize].symbols;
        match map.get(name) {
            None => {
                map.insert(name.to_string(), sym);
            }
            Some(&head) => {
                let mut iter = head;
                while let Some(next) = pool[iter].next {
                    iter = next;
                }
                pool[iter].next = Some(sym);
            }
        }
    }

    /// Heads of every symbol chain, in declaration order.
    pub fn chain_heads(&self, scope: ScopeId) -> impl Iterator<Item = SymbolId> + '_ {
        self.get(scope).symbols.values().copied()
    }

    /// Every symbol in the scope, following chains, in declaration order.
    pub fn symbols(&self, scope: ScopeId, pool: &SymbolPool) -> Vec<SymbolId> {
        let mut out = Vec::new();
        for head in self.chain_heads(scope) {
            let mut iter = Some(head);
            while let Some(id) = iter {
                out.push(id);
                iter = pool[id].next;
            }
        }
        out
    }
}
