//! Syntax analysis: tokens to AST with error recovery

pub mod ast;
mod descent;

pub use ast::{AssignOp, BinaryOp, Expr, ExprKind, Program, Stmt, StmtKind, UnaryOp};
pub use descent::{Parser, SyntaxError};
