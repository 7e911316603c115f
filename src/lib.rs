//! # rlcc - An Optimizing Source-to-Source Compiler
//!
//! Compiles a small imperative language to sandboxed Python through a full
//! classic pipeline, with an optimization stage whose pass selection is
//! driven by a pluggable scoring policy.
//!
//! ```text
//! Source → Scanner → Tokens → Parser → AST → Analyzer → TAC → Optimizer → Python → Sandbox
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rlcc::Compiler;
//!
//! let data = Compiler::new().compile("let x = 2 + 3;\nprint(x);");
//!
//! assert!(data.success);
//! assert_eq!(data.intermediate_code[0], "t1 = 2 + 3");
//! assert!(data.python_code.is_some());
//! ```
//!
//! Execution is async because the generated program runs in a subprocess
//! under a deadline:
//!
//! ```rust,no_run
//! use rlcc::Compiler;
//!
//! # async fn demo() {
//! let data = Compiler::new()
//!     .compile_and_execute("print(40 + 2);", "")
//!     .await;
//! assert_eq!(data.output, "42\n");
//! # }
//! ```
//!
//! ## Main Components
//!
//! - [`Scanner`] - Tokenizes source text, failing fast on lexical errors
//! - [`Parser`] - Recursive descent with panic-mode error recovery
//! - [`Analyzer`] - Scope, type, and control-flow diagnostics
//! - [`IrGenerator`] - Lowers the AST to three-address code
//! - [`Optimizer`] - Pass library with policy-scored greedy selection
//! - [`PythonGenerator`] - Rebuilds structured Python from the TAC
//! - [`Sandbox`] - Subprocess execution with timeout and output caps
//! - [`Compiler`] - The whole pipeline behind one entry point
//!
//! Every stage's artifacts end up in [`CompilationData`], which serializes
//! to the JSON response contract.

/// Version of the compiler
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod codegen;
pub mod error;
pub mod exec;
pub mod ir;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod pipeline;
pub mod semantic;

// Re-export main types
pub use codegen::PythonGenerator;
pub use error::{Error, Result};
pub use exec::{ExecOutcome, Sandbox, SandboxLimits};
pub use ir::{Instruction, IrGenerator, Opcode, Operand};
pub use lexer::{Scanner, Token, TokenKind};
pub use optimizer::{OptimizationRecord, Optimizer, ScoringPolicy, StaticCostPolicy};
pub use parser::{Expr, ExprKind, Parser, Program, Stmt, StmtKind, SyntaxError};
pub use pipeline::{CompilationData, CompileRequest, CompileResponse, Compiler, Stage};
pub use semantic::{Analyzer, Diagnostic, Severity};
