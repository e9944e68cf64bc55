//! Lexically scoped symbol resolution with free-variable capture.

use std::collections::HashMap;

/// How an identifier is loaded at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    /// Top-level binding, loaded from the globals vector.
    Global,
    /// Binding inside the current function, loaded from the frame's slots.
    Local,
    /// Entry in the host builtin registry.
    Builtin,
    /// Captured from an enclosing function, loaded from the closure.
    Free,
    /// The name a function literal was bound to, loaded as the current closure.
    Function,
}

/// A resolved name.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

/// One frame in the scope chain.
///
/// `free_symbols` records, for each captured name, the symbol the *enclosing*
/// scope must load to populate this scope's capture vector.
#[derive(Debug, Default)]
pub struct SymbolTable {
    store: HashMap<String, Symbol>,
    pub num_definitions: usize,
    pub free_symbols: Vec<Symbol>,
    outer: Option<Box<SymbolTable>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a child frame enclosing `outer`.
    pub fn enclosed(outer: SymbolTable) -> Self {
        Self {
            outer: Some(Box::new(outer)),
            ..Self::default()
        }
    }

    pub fn is_global(&self) -> bool {
        self.outer.is_none()
    }

    /// Pop this frame, returning the enclosing one.
    pub fn into_outer(self) -> Option<SymbolTable> {
        self.outer.map(|outer| *outer)
    }

    /// Define a name in this frame. Globals at the root, locals elsewhere.
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.is_global() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
        };
        self.num_definitions += 1;
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Register a builtin at its registry index. Never counts against the
    /// local definition count.
    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Register the self-reference name of a function literal.
    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Function,
            index: 0,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        let symbol = Symbol {
            name: original.name.clone(),
            scope: SymbolScope::Free,
            index: self.free_symbols.len(),
        };
        self.free_symbols.push(original);
        self.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }

    /// Resolve a name, walking outward through the scope chain.
    ///
    /// A name found in an outer frame with Local, Free, or Function scope is
    /// promoted to a Free symbol in every frame between its definition and
    /// the lookup site, so each closure in the chain captures it from its
    /// parent. Global and Builtin symbols pass through unchanged. Resolution
    /// is idempotent: once promoted, the name hits this frame's store.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }

        let outer = self.outer.as_mut()?;
        let symbol = outer.resolve(name)?;

        match symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin => Some(symbol),
            SymbolScope::Local | SymbolScope::Free | SymbolScope::Function => {
                Some(self.define_free(symbol))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_resolve_globals() {
        let mut global = SymbolTable::new();
        let a = global.define("a");
        let b = global.define("b");

        assert_eq!(
            a,
            Symbol {
                name: "a".to_string(),
                scope: SymbolScope::Global,
                index: 0
            }
        );
        assert_eq!(
            b,
            Symbol {
                name: "b".to_string(),
                scope: SymbolScope::Global,
                index: 1
            }
        );
        assert_eq!(global.resolve("a"), Some(a));
        assert_eq!(global.resolve("b"), Some(b));
        assert_eq!(global.resolve("c"), None);
    }

    #[test]
    fn test_resolve_local_shadows_global() {
        let mut global = SymbolTable::new();
        global.define("a");

        let mut local = SymbolTable::enclosed(global);
        local.define("a");

        let resolved = local.resolve("a").unwrap();
        assert_eq!(resolved.scope, SymbolScope::Local);
        assert_eq!(resolved.index, 0);
    }

    #[test]
    fn test_resolve_global_through_nested_scopes() {
        let mut global = SymbolTable::new();
        global.define("a");

        let first = SymbolTable::enclosed(global);
        let mut second = SymbolTable::enclosed(first);

        let resolved = second.resolve("a").unwrap();
        assert_eq!(resolved.scope, SymbolScope::Global);
        assert!(second.free_symbols.is_empty());
    }

    #[test]
    fn test_free_promotion_through_intermediate_scopes() {
        let mut global = SymbolTable::new();
        global.define("a");

        let mut outer = SymbolTable::enclosed(global);
        outer.define("b");

        let inner = SymbolTable::enclosed(outer);
        let mut innermost = SymbolTable::enclosed(inner);

        let resolved = innermost.resolve("b").unwrap();
        assert_eq!(resolved.scope, SymbolScope::Free);
        assert_eq!(resolved.index, 0);

        // The innermost frame anchors on the intermediate frame's Free
        // symbol; the intermediate frame anchors on the original Local.
        assert_eq!(innermost.free_symbols.len(), 1);
        assert_eq!(innermost.free_symbols[0].scope, SymbolScope::Free);

        let inner = innermost.into_outer().unwrap();
        assert_eq!(inner.free_symbols.len(), 1);
        assert_eq!(inner.free_symbols[0].scope, SymbolScope::Local);
        assert_eq!(inner.free_symbols[0].name, "b");
    }

    #[test]
    fn test_resolution_is_idempotent_after_promotion() {
        let mut outer = SymbolTable::enclosed(SymbolTable::new());
        outer.define("x");

        let mut inner = SymbolTable::enclosed(outer);
        let first = inner.resolve("x").unwrap();
        let second = inner.resolve("x").unwrap();

        assert_eq!(first, second);
        assert_eq!(inner.free_symbols.len(), 1);
    }

    #[test]
    fn test_define_builtin_resolves_everywhere() {
        let mut global = SymbolTable::new();
        global.define_builtin(0, "len");
        assert_eq!(global.num_definitions, 0);

        let mut nested = SymbolTable::enclosed(SymbolTable::enclosed(global));
        let resolved = nested.resolve("len").unwrap();
        assert_eq!(resolved.scope, SymbolScope::Builtin);
        assert_eq!(resolved.index, 0);
        assert!(nested.free_symbols.is_empty());
    }

    #[test]
    fn test_function_name_resolves_to_current_closure() {
        let mut table = SymbolTable::enclosed(SymbolTable::new());
        table.define_function_name("f");

        let resolved = table.resolve("f").unwrap();
        assert_eq!(resolved.scope, SymbolScope::Function);
        assert_eq!(resolved.index, 0);
    }

    #[test]
    fn test_function_name_is_captured_across_frames() {
        let mut outer = SymbolTable::enclosed(SymbolTable::new());
        outer.define_function_name("f");

        let mut inner = SymbolTable::enclosed(outer);
        let resolved = inner.resolve("f").unwrap();

        // Crossing a function boundary the self-reference becomes a capture,
        // anchored on the enclosing frame's Function symbol.
        assert_eq!(resolved.scope, SymbolScope::Free);
        assert_eq!(inner.free_symbols[0].scope, SymbolScope::Function);
    }

    #[test]
    fn test_shadowing_after_promotion_keeps_indices_dense() {
        let mut outer = SymbolTable::enclosed(SymbolTable::new());
        outer.define("a");
        outer.define("b");

        let mut inner = SymbolTable::enclosed(outer);
        inner.resolve("a").unwrap();
        inner.resolve("b").unwrap();

        assert_eq!(inner.free_symbols.len(), 2);
        let a = inner.resolve("a").unwrap();
        let b = inner.resolve("b").unwrap();
        assert_eq!(a.index, 0);
        assert_eq!(b.index, 1);
    }
}
