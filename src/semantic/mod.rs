//! Semantic analysis: scope, type, and control-flow checks

mod analyzer;
mod symbols;

pub use analyzer::{Analyzer, Diagnostic, Severity};
pub use symbols::{ScopeStack, Symbol, Type};
