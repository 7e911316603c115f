use super::symbols::{ScopeStack, Type};
use crate::parser::{AssignOp, BinaryOp, Expr, ExprKind, Program, Stmt, StmtKind, UnaryOp};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Diagnostic severity
///
/// Only errors block code generation; warnings are reported and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    /// The program is rejected
    Error,
    /// The program is suspicious but accepted
    Warning,
}

/// A semantic diagnostic with source position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    /// Error or warning
    pub severity: Severity,
    /// Description of the problem
    pub message: String,
    /// Line of the offending construct (1-indexed)
    pub line: usize,
    /// Column of the offending construct (1-indexed)
    pub column: usize,
}

impl Diagnostic {
    /// True when this diagnostic blocks code generation
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self.severity {
            Severity::Error => "Semantic error",
            Severity::Warning => "Warning",
        };
        write!(
            f,
            "{} at line {}, column {}: {}",
            label, self.line, self.column, self.message
        )
    }
}

/// Semantic analyzer: scope, type, and control-flow checks over the AST
///
/// Walks the whole tree and collects every diagnostic rather than stopping
/// at the first, deduplicating repeats at the same position. Parser error
/// placeholders are skipped silently; the syntax error was already reported.
pub struct Analyzer {
    scopes: ScopeStack,
    /// Declared functions, name to arity
    functions: HashMap<String, usize>,
    diagnostics: Vec<Diagnostic>,
    seen: HashSet<(usize, usize, String)>,
    loop_depth: usize,
    function_depth: usize,
}

impl Analyzer {
    pub fn new() -> Self {
        Analyzer {
            scopes: ScopeStack::new(),
            functions: HashMap::new(),
            diagnostics: Vec::new(),
            seen: HashSet::new(),
            loop_depth: 0,
            function_depth: 0,
        }
    }

    /// Analyzes a program and returns all diagnostics found
    pub fn analyze(mut self, program: &Program) -> Vec<Diagnostic> {
        // Collect function signatures first so calls may precede declarations.
        for stmt in &program.statements {
            if let StmtKind::FunctionDecl {
                ref name,
                ref params,
                ..
            } = stmt.kind
            {
                if self.functions.contains_key(name) {
                    self.error(
                        format!("Function '{}' is declared more than once", name),
                        stmt.line,
                        stmt.column,
                    );
                } else {
                    self.functions.insert(name.clone(), params.len());
                }
            }
        }

        for stmt in &program.statements {
            self.check_stmt(stmt, true);
        }

        let unused: Vec<(String, usize)> = self
            .scopes
            .globals()
            .filter(|(name, symbol)| !symbol.used && !name.starts_with('_'))
            .map(|(name, symbol)| (name.clone(), symbol.declared_line))
            .collect();
        for (name, line) in unused {
            self.warn(format!("Variable '{}' is never used", name), line, 1);
        }

        self.diagnostics
    }

    fn check_stmt(&mut self, stmt: &Stmt, top_level: bool) {
        match stmt.kind {
            StmtKind::Let {
                ref name,
                ref value,
            } => {
                let ty = self.check_expr(value);
                if !self.scopes.declare(name, ty, stmt.line) {
                    self.error(
                        format!("Variable '{}' is already declared in this scope", name),
                        stmt.line,
                        stmt.column,
                    );
                }
            }

            StmtKind::Assign {
                ref target,
                op,
                ref value,
            } => {
                let value_ty = self.check_expr(value);
                let target_ty = match self.scopes.resolve(target) {
                    Some(symbol) => symbol.ty,
                    None => {
                        self.error(
                            format!("Variable '{}' is used before declaration", target),
                            stmt.line,
                            stmt.column,
                        );
                        return;
                    }
                };

                match op {
                    AssignOp::Assign => {
                        if let Some(symbol) = self.scopes.resolve_mut(target) {
                            symbol.ty = value_ty;
                        }
                    }
                    AssignOp::AddAssign => {
                        // Same rules as binary +.
                        if !compatible_add(target_ty, value_ty) {
                            self.error(
                                format!(
                                    "Cannot apply '+=' to {} and {}",
                                    target_ty.name(),
                                    value_ty.name()
                                ),
                                stmt.line,
                                stmt.column,
                            );
                        }
                    }
                    AssignOp::SubAssign => {
                        if !is_numeric(target_ty) || !is_numeric(value_ty) {
                            self.error(
                                format!(
                                    "Cannot apply '-=' to {} and {}",
                                    target_ty.name(),
                                    value_ty.name()
                                ),
                                stmt.line,
                                stmt.column,
                            );
                        }
                    }
                }
            }

            StmtKind::Print { ref expression } => {
                self.check_expr(expression);
            }

            StmtKind::Scan { ref target } => match self.scopes.resolve_mut(target) {
                Some(symbol) => {
                    // scan always produces a number (int, float, or 0).
                    symbol.ty = Type::Number;
                }
                None => {
                    self.error(
                        format!("Variable '{}' is used before declaration", target),
                        stmt.line,
                        stmt.column,
                    );
                }
            },

            StmtKind::If {
                ref condition,
                ref then_branch,
                ref else_branch,
            } => {
                self.check_condition(condition);
                self.check_block(then_branch);
                if let Some(else_branch) = else_branch {
                    self.check_block(else_branch);
                }
            }

            StmtKind::While {
                ref condition,
                ref body,
            } => {
                self.check_condition(condition);
                self.loop_depth += 1;
                self.check_block(body);
                self.loop_depth -= 1;
            }

            StmtKind::For {
                ref init,
                ref condition,
                ref step,
                ref body,
            } => {
                // The initializer's variable is scoped to the loop.
                self.scopes.push();
                self.check_stmt(init, false);
                self.check_condition(condition);
                self.check_stmt(step, false);
                self.loop_depth += 1;
                for stmt in body {
                    self.check_stmt(stmt, false);
                }
                self.loop_depth -= 1;
                let popped = self.scopes.pop();
                self.report_unused(popped);
            }

            StmtKind::Break => {
                if self.loop_depth == 0 {
                    self.error("'break' outside of a loop", stmt.line, stmt.column);
                }
            }

            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    self.error("'continue' outside of a loop", stmt.line, stmt.column);
                }
            }

            StmtKind::FunctionDecl {
                ref name,
                ref params,
                ref body,
            } => {
                if !top_level {
                    self.error(
                        format!("Function '{}' must be declared at the top level", name),
                        stmt.line,
                        stmt.column,
                    );
                }
                self.scopes.push();
                for param in params {
                    if !self.scopes.declare(param, Type::Unknown, stmt.line) {
                        self.error(
                            format!("Duplicate parameter '{}'", param),
                            stmt.line,
                            stmt.column,
                        );
                    }
                }
                // Parameters count as used: they are part of the signature.
                for param in params {
                    if let Some(symbol) = self.scopes.resolve_mut(param) {
                        symbol.used = true;
                    }
                }
                let saved_loops = self.loop_depth;
                self.loop_depth = 0;
                self.function_depth += 1;
                for stmt in body {
                    self.check_stmt(stmt, false);
                }
                self.function_depth -= 1;
                self.loop_depth = saved_loops;
                let popped = self.scopes.pop();
                self.report_unused(popped);
            }

            StmtKind::Return { ref value } => {
                if self.function_depth == 0 {
                    self.error("'return' outside of a function", stmt.line, stmt.column);
                }
                if let Some(value) = value {
                    self.check_expr(value);
                }
            }

            StmtKind::Expression { ref expression } => {
                self.check_expr(expression);
            }

            StmtKind::Block { ref statements } => {
                self.check_block(statements);
            }

            // Already reported as a syntax error.
            StmtKind::Error { .. } => {}
        }
    }

    fn check_block(&mut self, statements: &[Stmt]) {
        self.scopes.push();
        for stmt in statements {
            self.check_stmt(stmt, false);
        }
        let popped = self.scopes.pop();
        self.report_unused(popped);
    }

    /// Conditions follow truthiness, but a string condition is always a bug
    fn check_condition(&mut self, condition: &Expr) {
        let ty = self.check_expr(condition);
        if ty == Type::Text {
            self.error(
                "Condition must be a boolean or number, not a string",
                condition.line,
                condition.column,
            );
        }
    }

    fn check_expr(&mut self, expr: &Expr) -> Type {
        match expr.kind {
            ExprKind::IntLiteral { .. } | ExprKind::FloatLiteral { .. } => Type::Number,
            ExprKind::StringLiteral { .. } => Type::Text,
            ExprKind::BoolLiteral { .. } => Type::Boolean,

            ExprKind::Identifier { ref name } => match self.scopes.resolve_mut(name) {
                Some(symbol) => {
                    symbol.used = true;
                    symbol.ty
                }
                None => {
                    self.error(
                        format!("Variable '{}' is used before declaration", name),
                        expr.line,
                        expr.column,
                    );
                    Type::Unknown
                }
            },

            ExprKind::BinaryOp {
                op,
                ref left,
                ref right,
            } => {
                let lt = self.check_expr(left);
                let rt = self.check_expr(right);
                self.check_binary(op, lt, rt, expr)
            }

            ExprKind::UnaryOp { op, ref operand } => {
                let ty = self.check_expr(operand);
                match op {
                    UnaryOp::Neg => {
                        if !is_numeric(ty) {
                            self.error(
                                format!("Cannot negate a {}", ty.name()),
                                expr.line,
                                expr.column,
                            );
                        }
                        Type::Number
                    }
                    UnaryOp::Not => {
                        if ty == Type::Text {
                            self.error("Cannot apply '!' to a string", expr.line, expr.column);
                        }
                        Type::Boolean
                    }
                }
            }

            ExprKind::Call { ref name, ref args } => {
                for arg in args {
                    self.check_expr(arg);
                }
                match self.functions.get(name) {
                    Some(&arity) => {
                        if args.len() != arity {
                            self.error(
                                format!(
                                    "Function '{}' takes {} argument(s), got {}",
                                    name,
                                    arity,
                                    args.len()
                                ),
                                expr.line,
                                expr.column,
                            );
                        }
                    }
                    None => {
                        self.error(
                            format!("Call to undeclared function '{}'", name),
                            expr.line,
                            expr.column,
                        );
                    }
                }
                Type::Unknown
            }
        }
    }

    fn check_binary(&mut self, op: BinaryOp, lt: Type, rt: Type, expr: &Expr) -> Type {
        match op {
            BinaryOp::Add => {
                if compatible_add(lt, rt) {
                    if lt == Type::Text || rt == Type::Text {
                        Type::Text
                    } else if lt == Type::Unknown || rt == Type::Unknown {
                        Type::Unknown
                    } else {
                        Type::Number
                    }
                } else {
                    self.error(
                        format!("Cannot add {} and {}", lt.name(), rt.name()),
                        expr.line,
                        expr.column,
                    );
                    Type::Unknown
                }
            }

            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                if !is_numeric(lt) || !is_numeric(rt) {
                    self.error(
                        format!(
                            "Operator '{}' requires numbers, got {} and {}",
                            op,
                            lt.name(),
                            rt.name()
                        ),
                        expr.line,
                        expr.column,
                    );
                }
                Type::Number
            }

            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => {
                let comparable = (is_numeric(lt) && is_numeric(rt))
                    || (lt == Type::Text && rt == Type::Text)
                    || lt == Type::Unknown
                    || rt == Type::Unknown;
                if !comparable {
                    self.error(
                        format!("Cannot compare {} with {}", lt.name(), rt.name()),
                        expr.line,
                        expr.column,
                    );
                }
                Type::Boolean
            }

            // Equality across types is well-defined (always unequal).
            BinaryOp::Eq | BinaryOp::NotEq => Type::Boolean,

            BinaryOp::And | BinaryOp::Or => {
                if lt == Type::Text || rt == Type::Text {
                    self.error(
                        format!("Operator '{}' does not apply to strings", op),
                        expr.line,
                        expr.column,
                    );
                }
                Type::Boolean
            }
        }
    }

    fn report_unused(&mut self, popped: Vec<(String, super::symbols::Symbol)>) {
        for (name, symbol) in popped {
            if !symbol.used && !name.starts_with('_') {
                self.warn(
                    format!("Variable '{}' is never used", name),
                    symbol.declared_line,
                    1,
                );
            }
        }
    }

    fn error(&mut self, message: impl Into<String>, line: usize, column: usize) {
        self.push_diagnostic(Severity::Error, message.into(), line, column);
    }

    fn warn(&mut self, message: impl Into<String>, line: usize, column: usize) {
        self.push_diagnostic(Severity::Warning, message.into(), line, column);
    }

    fn push_diagnostic(&mut self, severity: Severity, message: String, line: usize, column: usize) {
        if self.seen.insert((line, column, message.clone())) {
            self.diagnostics.push(Diagnostic {
                severity,
                message,
                line,
                column,
            });
        }
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn is_numeric(ty: Type) -> bool {
    matches!(ty, Type::Number | Type::Unknown)
}

fn compatible_add(lt: Type, rt: Type) -> bool {
    match (lt, rt) {
        (Type::Number, Type::Number) | (Type::Text, Type::Text) => true,
        (Type::Unknown, _) | (_, Type::Unknown) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Scanner;
    use crate::parser::Parser;

    fn analyze(source: &str) -> Vec<Diagnostic> {
        let mut scanner = Scanner::new(source);
        let tokens = scanner.scan_tokens().unwrap();
        let (program, errors) = Parser::new(tokens).parse();
        assert!(errors.is_empty(), "unexpected syntax errors: {:?}", errors);
        Analyzer::new().analyze(&program)
    }

    fn errors(source: &str) -> Vec<Diagnostic> {
        analyze(source).into_iter().filter(|d| d.is_error()).collect()
    }

    #[test]
    fn test_clean_program() {
        let diags = errors("let x = 1;\nprint(x);");
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn test_use_before_declaration() {
        let diags = errors("print(y);");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("before declaration"));
        assert_eq!(diags[0].line, 1);
    }

    #[test]
    fn test_same_scope_redeclaration() {
        let diags = errors("let x = 1;\nlet x = 2;\nprint(x);");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("already declared"));
    }

    #[test]
    fn test_shadowing_allowed() {
        let diags = errors("let x = 1;\n{ let x = 2; print(x); }\nprint(x);");
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn test_type_mismatch_add() {
        let diags = errors("let x = 1 + \"a\";\nprint(x);");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("Cannot add"));
    }

    #[test]
    fn test_break_outside_loop() {
        let diags = errors("break;");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("break"));
    }

    #[test]
    fn test_return_outside_function() {
        let diags = errors("return 1;");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("return"));
    }

    #[test]
    fn test_break_inside_loop_ok() {
        let diags = errors("let i = 0;\nwhile (i < 10) { break; }");
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn test_call_arity_checked() {
        let diags = errors("fn f(a, b) { return a + b; }\nprint(f(1));");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("takes 2 argument"));
    }

    #[test]
    fn test_unknown_function() {
        let diags = errors("print(g(1));");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("undeclared function"));
    }

    #[test]
    fn test_unused_variable_warning() {
        let diags = analyze("let x = 1;");
        assert!(diags.iter().any(|d| !d.is_error() && d.message.contains("never used")));
        assert!(diags.iter().all(|d| !d.is_error()));
    }

    #[test]
    fn test_scan_makes_number() {
        let diags = errors("let x = 0;\nscan(x);\nlet y = x + 1;\nprint(y);");
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn test_duplicate_diagnostics_collapsed() {
        // The same undeclared use reported once, not per mention in one spot.
        let diags = errors("print(q + q);");
        let about_q: Vec<_> = diags
            .iter()
            .filter(|d| d.message.contains("'q'"))
            .collect();
        assert_eq!(about_q.len(), 2); // two positions, one each
    }
}
