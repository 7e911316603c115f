use std::collections::HashMap;

/// Value types tracked by the analyzer
///
/// Integers and floats are both `Number`: arithmetic freely mixes them and
/// division produces a float regardless, so separating them here would only
/// reject programs that run fine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    /// Integer or floating-point number
    Number,
    /// String
    Text,
    /// Boolean
    Boolean,
    /// Not statically known (scan results, unresolved names)
    Unknown,
}

impl Type {
    /// Human-readable name used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Type::Number => "number",
            Type::Text => "string",
            Type::Boolean => "boolean",
            Type::Unknown => "unknown",
        }
    }
}

/// A declared variable
#[derive(Debug, Clone)]
pub struct Symbol {
    /// Best-known type of the variable
    pub ty: Type,
    /// Line of the declaration
    pub declared_line: usize,
    /// Whether the variable was ever read
    pub used: bool,
}

/// Lexical scope stack
///
/// The bottom scope is the global scope and is never popped. Inner scopes
/// may shadow outer names; redeclaring within the same scope is the caller's
/// error to report.
pub struct ScopeStack {
    scopes: Vec<HashMap<String, Symbol>>,
}

impl ScopeStack {
    /// Creates a stack holding only the global scope
    pub fn new() -> Self {
        ScopeStack {
            scopes: vec![HashMap::new()],
        }
    }

    /// Enters a new innermost scope
    pub fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Leaves the innermost scope, returning its symbols for unused-variable
    /// reporting
    pub fn pop(&mut self) -> Vec<(String, Symbol)> {
        if self.scopes.len() > 1 {
            self.scopes
                .pop()
                .map(|scope| scope.into_iter().collect())
                .unwrap_or_default()
        } else {
            Vec::new()
        }
    }

    /// Symbols of the global scope, for end-of-program unused reporting
    pub fn globals(&self) -> impl Iterator<Item = (&String, &Symbol)> {
        self.scopes[0].iter()
    }

    /// Declares a name in the innermost scope
    ///
    /// Returns `false` when the name already exists in that scope.
    pub fn declare(&mut self, name: &str, ty: Type, line: usize) -> bool {
        let scope = self.scopes.last_mut().expect("global scope always present");
        if scope.contains_key(name) {
            return false;
        }
        scope.insert(
            name.to_string(),
            Symbol {
                ty,
                declared_line: line,
                used: false,
            },
        );
        true
    }

    /// Looks up a name, innermost scope first
    pub fn resolve(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Looks up a name mutably, innermost scope first
    pub fn resolve_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_and_resolve() {
        let mut scopes = ScopeStack::new();
        assert!(scopes.declare("x", Type::Number, 1));
        assert_eq!(scopes.resolve("x").unwrap().ty, Type::Number);
        assert!(scopes.resolve("y").is_none());
    }

    #[test]
    fn test_same_scope_redeclare_rejected() {
        let mut scopes = ScopeStack::new();
        assert!(scopes.declare("x", Type::Number, 1));
        assert!(!scopes.declare("x", Type::Text, 2));
    }

    #[test]
    fn test_shadowing_in_inner_scope() {
        let mut scopes = ScopeStack::new();
        scopes.declare("x", Type::Number, 1);
        scopes.push();
        assert!(scopes.declare("x", Type::Text, 2));
        assert_eq!(scopes.resolve("x").unwrap().ty, Type::Text);
        scopes.pop();
        assert_eq!(scopes.resolve("x").unwrap().ty, Type::Number);
    }

    #[test]
    fn test_pop_returns_scope_symbols() {
        let mut scopes = ScopeStack::new();
        scopes.push();
        scopes.declare("tmp", Type::Number, 3);
        let popped = scopes.pop();
        assert_eq!(popped.len(), 1);
        assert_eq!(popped[0].0, "tmp");
    }
}
