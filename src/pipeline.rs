//! The compilation pipeline and its request/response contract
//!
//! Stages run in a fixed order: scan, parse, analyze, lower, optimize,
//! generate, and optionally execute. Each stage's artifacts accumulate in
//! [`CompilationData`] so a caller sees everything the pipeline produced up
//! to the point where it stopped.

use crate::codegen::PythonGenerator;
use crate::error::{Error, Result};
use crate::exec::{Sandbox, SandboxLimits};
use crate::ir::IrGenerator;
use crate::lexer::Scanner;
use crate::optimizer::{Optimizer, ScoringPolicy};
use crate::parser::{Parser, Program};
use crate::semantic::Analyzer;
use serde::{Deserialize, Serialize};

/// The furthest stage that completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Lexing,
    Parsing,
    SemanticAnalysis,
    Lowering,
    Optimization,
    CodeGeneration,
    Execution,
}

/// Everything one compilation produced
///
/// Serializes to the response contract: token and AST dumps, diagnostics,
/// both TAC listings, the optimization log, the target program, and the
/// execution result when one was requested.
#[derive(Debug, Clone, Serialize)]
pub struct CompilationData {
    /// Token stream, `{type, value, line, column}` each
    pub tokens: Vec<crate::lexer::Token>,
    /// AST as a tree of tagged nodes
    pub ast: Option<Program>,
    /// Semantic diagnostics, errors and warnings, rendered as strings
    pub semantic_errors: Vec<String>,
    /// TAC before optimization, one instruction per line
    pub intermediate_code: Vec<String>,
    /// TAC after optimization
    pub optimized_code: Vec<String>,
    /// One entry per applied rewrite
    pub optimization_log: Vec<String>,
    /// Generated target program
    pub python_code: Option<String>,
    /// Captured stdout of the executed program
    pub output: String,
    /// Fatal errors: lexical, syntactic, generation, or execution
    pub errors: Vec<String>,
    /// True when every requested stage completed cleanly
    pub success: bool,
    /// Execution wall-clock time in seconds, zero if nothing ran
    pub execution_time: f64,
    /// Furthest stage that completed
    pub stage: Stage,
}

impl CompilationData {
    fn empty() -> Self {
        CompilationData {
            tokens: Vec::new(),
            ast: None,
            semantic_errors: Vec::new(),
            intermediate_code: Vec::new(),
            optimized_code: Vec::new(),
            optimization_log: Vec::new(),
            python_code: None,
            output: String::new(),
            errors: Vec::new(),
            success: false,
            execution_time: 0.0,
            stage: Stage::Lexing,
        }
    }

    /// Serializes the result to the JSON wire form
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A compilation request as received on the wire
#[derive(Debug, Clone, Deserialize)]
pub struct CompileRequest {
    /// Source program
    pub source_code: String,
    /// Stdin contents for execution, empty when absent
    #[serde(default)]
    pub input_data: String,
}

/// The wire response envelope
///
/// `data` is present whenever the request itself could be processed, even
/// if the submitted program failed; `error` is reserved for requests the
/// pipeline could not act on at all.
#[derive(Debug, Clone, Serialize)]
pub struct CompileResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<CompilationData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompileResponse {
    pub fn ok(data: CompilationData) -> Self {
        CompileResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        CompileResponse {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Serializes the envelope to the JSON wire form
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// The whole pipeline, front end through sandbox
pub struct Compiler {
    optimizer: Optimizer,
    sandbox: Sandbox,
}

impl Compiler {
    /// A compiler with the default scoring policy and sandbox limits
    pub fn new() -> Self {
        Compiler {
            optimizer: Optimizer::new(),
            sandbox: Sandbox::new(),
        }
    }

    /// A compiler whose pass selection is driven by a custom policy
    pub fn with_policy(policy: Box<dyn ScoringPolicy>) -> Self {
        Compiler {
            optimizer: Optimizer::with_policy(policy),
            sandbox: Sandbox::new(),
        }
    }

    /// Replaces the sandbox limits for subsequent executions
    pub fn sandbox_limits(mut self, limits: SandboxLimits) -> Self {
        self.sandbox = Sandbox::with_limits(limits);
        self
    }

    /// Runs every stage up to code generation
    ///
    /// Never returns `Err` for problems in the source program; those are
    /// reported inside the result. The pipeline stops at the first stage
    /// whose errors make later stages meaningless.
    pub fn compile(&self, source: &str) -> CompilationData {
        let mut data = CompilationData::empty();

        if source.trim().is_empty() {
            data.errors.push(Error::EmptySource.to_string());
            return data;
        }

        // Lexing fails fast; nothing downstream can run without tokens.
        let mut scanner = Scanner::new(source);
        let tokens = match scanner.scan_tokens() {
            Ok(tokens) => tokens,
            Err(error) => {
                tracing::debug!(%error, "lexing failed");
                data.errors.push(error.to_string());
                return data;
            }
        };
        data.tokens = tokens.clone();
        data.stage = Stage::Lexing;

        let (program, syntax_errors) = Parser::new(tokens).parse();
        for error in &syntax_errors {
            data.errors.push(error.to_string());
        }
        data.ast = Some(program.clone());
        data.stage = Stage::Parsing;

        let diagnostics = Analyzer::new().analyze(&program);
        let has_semantic_errors = diagnostics.iter().any(|d| d.is_error());
        data.semantic_errors = diagnostics.iter().map(|d| d.to_string()).collect();
        data.stage = Stage::SemanticAnalysis;

        if !syntax_errors.is_empty() || has_semantic_errors {
            tracing::debug!(
                syntax = syntax_errors.len(),
                semantic = data.semantic_errors.len(),
                "stopping before lowering"
            );
            return data;
        }

        let code = IrGenerator::new().generate(&program);
        data.intermediate_code = code.iter().map(|i| i.to_string()).collect();
        data.stage = Stage::Lowering;

        let (optimized, records) = self.optimizer.optimize(code);
        data.optimized_code = optimized.iter().map(|i| i.to_string()).collect();
        data.optimization_log = records.iter().map(|r| r.to_string()).collect();
        data.stage = Stage::Optimization;

        match PythonGenerator::new(&optimized).generate() {
            Ok(python) => {
                data.python_code = Some(python);
                data.stage = Stage::CodeGeneration;
                data.success = true;
            }
            Err(error) => {
                tracing::warn!(%error, "code generation refused");
                data.errors.push(error.to_string());
            }
        }

        data
    }

    /// Compiles and, when compilation succeeds, runs the program
    pub async fn compile_and_execute(&self, source: &str, input: &str) -> CompilationData {
        let mut data = self.compile(source);
        if !data.success {
            return data;
        }
        let Some(python) = data.python_code.clone() else {
            return data;
        };

        let outcome = self.sandbox.run(&python, input).await;
        data.output = outcome.stdout;
        data.execution_time = outcome.duration.as_secs_f64();
        data.stage = Stage::Execution;
        data.success = outcome.success;

        if outcome.timed_out {
            data.errors.push("Execution timed out".to_string());
        } else if !outcome.success && !outcome.stderr.is_empty() {
            data.errors.push(outcome.stderr.trim_end().to_string());
        }

        data
    }

    /// Serves one wire request end to end
    pub async fn handle_request(&self, request: CompileRequest) -> CompileResponse {
        let data = self
            .compile_and_execute(&request.source_code, &request.input_data)
            .await;
        CompileResponse::ok(data)
    }

    /// Serves one JSON request body, producing the JSON response envelope
    pub async fn handle_json(&self, body: &str) -> Result<String> {
        let response = match serde_json::from_str::<CompileRequest>(body) {
            Ok(request) => self.handle_request(request).await,
            Err(error) => CompileResponse::failure(format!("invalid request: {}", error)),
        };
        response.to_json()
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_compile() {
        let data = Compiler::new().compile("let x = 2 + 3;\nprint(x);");
        assert!(data.success, "{:?}", data.errors);
        assert_eq!(data.stage, Stage::CodeGeneration);
        assert!(!data.tokens.is_empty());
        assert!(data.ast.is_some());
        assert!(!data.intermediate_code.is_empty());
        assert!(data.python_code.is_some());
    }

    #[test]
    fn test_empty_source() {
        let data = Compiler::new().compile("   \n  ");
        assert!(!data.success);
        assert_eq!(data.errors, vec!["No source code provided"]);
    }

    #[test]
    fn test_lex_error_stops_early() {
        let data = Compiler::new().compile("let x = 1 # 2;");
        assert!(!data.success);
        assert!(data.tokens.is_empty());
        assert!(data.ast.is_none());
        assert!(data.errors[0].contains("Lex error"));
    }

    #[test]
    fn test_syntax_errors_block_lowering() {
        let data = Compiler::new().compile("let = 1;\nprint(2);");
        assert!(!data.success);
        assert!(data.ast.is_some());
        assert!(data.intermediate_code.is_empty());
        assert!(data.errors.iter().any(|e| e.contains("Syntax error")));
    }

    #[test]
    fn test_semantic_errors_block_lowering() {
        let data = Compiler::new().compile("print(missing);");
        assert!(!data.success);
        assert_eq!(data.stage, Stage::SemanticAnalysis);
        assert!(data.intermediate_code.is_empty());
        assert!(data
            .semantic_errors
            .iter()
            .any(|e| e.contains("before declaration")));
    }

    #[test]
    fn test_optimization_log_populated() {
        let data = Compiler::new().compile("let x = 2 * 3;\nprint(x);");
        assert!(data.success);
        assert!(!data.optimization_log.is_empty());
        assert!(data.optimized_code.len() <= data.intermediate_code.len());
    }

    #[test]
    fn test_json_round_trip_request() {
        let request: CompileRequest =
            serde_json::from_str(r#"{"source_code": "print(1);"}"#).unwrap();
        assert_eq!(request.source_code, "print(1);");
        assert_eq!(request.input_data, "");
    }

    #[test]
    fn test_fold_and_simplify_shrinks_program() {
        let data = Compiler::new().compile("let x = 2 + 3;\nlet y = x * 1;\nprint(y);");
        assert!(data.success, "{:?}", data.errors);
        assert!(data.optimized_code.len() < data.intermediate_code.len());
        assert_eq!(data.optimized_code, vec!["y = 5", "PRINT y"]);
    }

    #[test]
    fn test_response_serializes() {
        let data = Compiler::new().compile("let x = 1;\nprint(x);");
        let json = data.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["success"], true);
        assert!(value["tokens"].is_array());
        assert!(value["intermediate_code"].is_array());
    }

    #[tokio::test]
    async fn test_malformed_request_gets_error_envelope() {
        let json = Compiler::new().handle_json("{not json").await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["success"], false);
        assert!(value["error"].as_str().unwrap().contains("invalid request"));
        assert!(value.get("data").is_none());
    }

    #[tokio::test]
    async fn test_request_envelope_carries_data() {
        let json = Compiler::new()
            .handle_json(r#"{"source_code": "print(1);", "input_data": ""}"#)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["success"], true);
        assert!(value["data"]["tokens"].is_array());
        assert!(value.get("error").is_none());
    }

    #[tokio::test]
    async fn test_compile_and_execute() {
        let data = Compiler::new()
            .compile_and_execute("let x = 20 + 22;\nprint(x);", "")
            .await;
        if data.errors.iter().any(|e| e.contains("failed to start")) {
            return;
        }
        assert!(data.success, "{:?}", data.errors);
        assert_eq!(data.output, "42\n");
        assert!(data.execution_time > 0.0);
    }

    #[tokio::test]
    async fn test_execute_with_input() {
        let data = Compiler::new()
            .compile_and_execute("let x = 0;\nscan(x);\nprint(x + 1);", "41\n")
            .await;
        if data.errors.iter().any(|e| e.contains("failed to start")) {
            return;
        }
        assert!(data.success, "{:?}", data.errors);
        assert_eq!(data.output, "42\n");
    }
}
