//! The scope table.

use std::fmt;

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

use super::symbol::Symbol;

index_vec::define_index_type! {
    pub struct ScopeId = u32;
}

/// A mapping from names to symbols, chained to the enclosing scope.
///
/// Iteration follows insertion order, so table dumps are deterministic.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub table: IndexMap<compact_str::CompactString, Symbol, FxBuildHasher>,
    /// `None` only for the global scope.
    pub parent: Option<ScopeId>,
}

impl Scope {
    pub fn new(parent: Option<ScopeId>) -> Self {
        Scope {
            table: IndexMap::default(),
            parent,
        }
    }

    /// Inserts `symbol`, replacing any symbol with the same name.
    pub fn insert(&mut self, name: &str, symbol: Symbol) {
        self.table.insert(name.into(), symbol);
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.table.get(name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.table.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for symbol in self.table.values() {
            writeln!(f, "  {symbol}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use text_size::TextRange;

    use super::*;
    use crate::compiler::symbol::ValueType;

    #[test]
    fn test_insert_overwrites() {
        let mut scope = Scope::new(None);
        scope.insert("x", Symbol::variable("x", ValueType::Int, TextRange::default()));
        scope.insert("x", Symbol::variable("x", ValueType::Float, TextRange::default()));
        assert_eq!(scope.len(), 1);
        assert_eq!(scope.lookup("x").map(|s| s.ty), Some(ValueType::Float));
        assert!(scope.contains("x"));
        assert!(!scope.contains("y"));
        assert!(scope.lookup("y").is_none());
    }

    #[test]
    fn test_dump_keeps_insertion_order() {
        let mut scope = Scope::new(None);
        for name in ["zeta", "alpha", "mid"] {
            scope.insert(name, Symbol::variable(name, ValueType::Bool, TextRange::default()));
        }
        let dump = scope.to_string();
        let names: Vec<&str> = dump
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
    }
}
