//! The semantic analyzer: the scope chain and symbol resolution.
//!
//! Only two scopes are ever consulted when resolving a name: the current scope and
//! the global scope. Scopes in between (those of enclosing procedures) are not
//! searched.

use index_vec::IndexVec;
use log::debug;

use super::{
    scope::{Scope, ScopeId},
    symbol::{Symbol, ValueType},
    token::TokenKind,
};

/// The name under which the enclosing procedure is stored in its own scope.
/// No identifier can spell it.
pub const CURRENT_PROCEDURE: &str = "$current_procedure";

/// The runtime routine called when an index is out of bounds.
pub const BOUNDS_TRAP: &str = "_outofboundserror";

/// Signatures of the runtime library: name, parameter types, return type.
pub const BUILTINS: [(&str, &[ValueType], ValueType); 10] = [
    ("getbool", &[], ValueType::Bool),
    ("getinteger", &[], ValueType::Int),
    ("getfloat", &[], ValueType::Float),
    ("getstring", &[], ValueType::String),
    ("putbool", &[ValueType::Bool], ValueType::Bool),
    ("putinteger", &[ValueType::Int], ValueType::Bool),
    ("putfloat", &[ValueType::Float], ValueType::Bool),
    ("putstring", &[ValueType::String], ValueType::Bool),
    ("sqrt", &[ValueType::Int], ValueType::Float),
    (BOUNDS_TRAP, &[], ValueType::Void),
];

fn global_scope_id() -> ScopeId {
    ScopeId::from_usize(0)
}

/// Owns every live scope of one compilation.
#[derive(Debug, Clone)]
pub struct SemanticAnalyzer {
    scopes: IndexVec<ScopeId, Scope>,
    current: ScopeId,
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticAnalyzer {
    /// Creates the analyzer with a global scope holding the reserved words.
    pub fn new() -> Self {
        let mut global = Scope::new(None);
        for kind in TokenKind::KEYWORDS {
            let mut symbol = Symbol::keyword(kind);
            if matches!(kind, TokenKind::True | TokenKind::False) {
                symbol.ty = ValueType::Bool;
            }
            global.insert(kind.name(), symbol);
        }
        let mut scopes = IndexVec::new();
        let current = scopes.push(global);
        SemanticAnalyzer { scopes, current }
    }

    /// The parameter and return symbols of the runtime library.
    pub fn builtin_symbols() -> impl Iterator<Item = Symbol> {
        BUILTINS.into_iter().map(|(name, params, ret)| {
            let params = params
                .iter()
                .map(|ty| Symbol::variable("value", *ty, text_size::TextRange::default()))
                .collect();
            let mut symbol = Symbol::procedure(name, ret, params, text_size::TextRange::default());
            symbol.is_global = true;
            symbol
        })
    }

    pub fn global(&self) -> &Scope {
        &self.scopes[global_scope_id()]
    }

    pub fn current(&self) -> &Scope {
        &self.scopes[self.current]
    }

    pub fn current_mut(&mut self) -> &mut Scope {
        &mut self.scopes[self.current]
    }

    pub fn is_global_scope(&self) -> bool {
        self.current == global_scope_id()
    }

    /// Number of live scopes, including the global one.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Enters a new scope whose parent is the current one.
    pub fn push_scope(&mut self) {
        self.current = self.scopes.push(Scope::new(Some(self.current)));
        debug!("push scope {:?}", self.current);
    }

    /// Leaves the current scope, dropping its symbols. Does nothing in the global scope.
    pub fn pop_scope(&mut self) {
        let Some(parent) = self.current().parent else {
            return;
        };
        debug!("pop scope {:?}:\n{}", self.current, self.current());
        self.scopes.truncate(self.current.index());
        self.current = parent;
    }

    /// Inserts into the global or the current scope.
    pub fn declare(&mut self, name: &str, symbol: Symbol, is_global: bool) {
        let scope = if is_global { global_scope_id() } else { self.current };
        self.scopes[scope].insert(name, symbol);
    }

    /// Looks in the current scope, then in the global scope.
    pub fn resolve_local_then_global(&self, name: &str) -> Option<&Symbol> {
        self.current()
            .lookup(name)
            .or_else(|| self.global().lookup(name))
    }

    pub fn resolve_local_then_global_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        let scope = if self.current().contains(name) {
            self.current
        } else {
            global_scope_id()
        };
        self.scopes[scope].lookup_mut(name)
    }

    /// Looks in exactly one of the global and the current scope.
    pub fn resolve_scoped(&self, name: &str, is_global: bool) -> Option<&Symbol> {
        if is_global {
            self.global().lookup(name)
        } else {
            self.current().lookup(name)
        }
    }

    pub fn exists_local_then_global(&self, name: &str) -> bool {
        self.current().contains(name) || self.global().contains(name)
    }

    pub fn exists_scoped(&self, name: &str, is_global: bool) -> bool {
        if is_global {
            self.global().contains(name)
        } else {
            self.current().contains(name)
        }
    }

    /// Records `procedure` as the procedure whose body is being parsed.
    pub fn set_current_procedure(&mut self, procedure: Symbol) {
        let current = self.current;
        self.scopes[current].insert(CURRENT_PROCEDURE, procedure);
    }

    /// The enclosing procedure, or a symbol of type `Unknown` outside of procedures.
    pub fn get_current_procedure(&self) -> Symbol {
        self.current()
            .lookup(CURRENT_PROCEDURE)
            .cloned()
            .unwrap_or_default()
    }

    /// Logs the global scope.
    pub fn dump_global(&self) {
        debug!("global scope:\n{}", self.global());
    }
}
