use super::tac::{Instruction, Opcode, Operand};
use crate::parser::{AssignOp, BinaryOp, Expr, ExprKind, Program, Stmt, StmtKind, UnaryOp};
use std::collections::HashMap;

/// Loop being lowered, for `break` and `continue` targets
struct LoopContext {
    /// Jump target for the next iteration
    start_label: String,
    /// Jump target past the loop
    end_label: String,
    /// For-loop step, re-lowered before every jump back to the start
    step: Option<Stmt>,
}

/// Lowers the AST to three-address code
///
/// Temps are `t1, t2, ...` and labels `L1, L2, ...`, both numbered from one
/// across the whole program. Shadowed variables are renamed on the way down
/// because the flat instruction list has no scopes of its own.
pub struct IrGenerator {
    code: Vec<Instruction>,
    temp_count: usize,
    label_count: usize,
    loops: Vec<LoopContext>,
    /// Scope stack mapping source names to unique lowered names
    scopes: Vec<HashMap<String, String>>,
    name_counts: HashMap<String, usize>,
}

impl IrGenerator {
    pub fn new() -> Self {
        IrGenerator {
            code: Vec::new(),
            temp_count: 0,
            label_count: 0,
            loops: Vec::new(),
            scopes: vec![HashMap::new()],
            name_counts: HashMap::new(),
        }
    }

    /// Lowers a program to a flat instruction list
    ///
    /// Function regions come first, then top-level code, so every definition
    /// precedes every possible call site.
    pub fn generate(mut self, program: &Program) -> Vec<Instruction> {
        for stmt in &program.statements {
            if matches!(stmt.kind, StmtKind::FunctionDecl { .. }) {
                self.lower_stmt(stmt);
            }
        }
        for stmt in &program.statements {
            if !matches!(stmt.kind, StmtKind::FunctionDecl { .. }) {
                self.lower_stmt(stmt);
            }
        }
        self.code
    }

    fn lower_stmt(&mut self, stmt: &Stmt) {
        let line = stmt.line;
        match stmt.kind {
            StmtKind::Let {
                ref name,
                ref value,
            } => {
                let value = self.lower_expr(value);
                let unique = self.declare(name);
                self.emit(Instruction::assign(Operand::Var(unique), value, line));
            }

            StmtKind::Assign {
                ref target,
                op,
                ref value,
            } => {
                let value = self.lower_expr(value);
                let target = Operand::Var(self.resolve(target));
                match op {
                    AssignOp::Assign => {
                        self.emit(Instruction::assign(target, value, line));
                    }
                    AssignOp::AddAssign => {
                        self.emit(Instruction::binary(
                            Opcode::Add,
                            target.clone(),
                            target,
                            value,
                            line,
                        ));
                    }
                    AssignOp::SubAssign => {
                        self.emit(Instruction::binary(
                            Opcode::Sub,
                            target.clone(),
                            target,
                            value,
                            line,
                        ));
                    }
                }
            }

            StmtKind::Print { ref expression } => {
                let value = self.lower_expr(expression);
                self.emit(Instruction::print(value, line));
            }

            StmtKind::Scan { ref target } => {
                let target = Operand::Var(self.resolve(target));
                self.emit(Instruction::scan(target, line));
            }

            StmtKind::If {
                ref condition,
                ref then_branch,
                ref else_branch,
            } => {
                let cond = self.lower_expr(condition);
                match else_branch {
                    None => {
                        let end = self.new_label();
                        self.emit(Instruction::if_false(cond, &end, line));
                        self.lower_block(then_branch);
                        self.emit(Instruction::label(&end, line));
                    }
                    Some(else_branch) => {
                        let else_label = self.new_label();
                        let end = self.new_label();
                        self.emit(Instruction::if_false(cond, &else_label, line));
                        self.lower_block(then_branch);
                        self.emit(Instruction::goto(&end, line));
                        self.emit(Instruction::label(&else_label, line));
                        self.lower_block(else_branch);
                        self.emit(Instruction::label(&end, line));
                    }
                }
            }

            StmtKind::While {
                ref condition,
                ref body,
            } => {
                let start = self.new_label();
                let end = self.new_label();
                self.emit(Instruction::label(&start, line));
                let cond = self.lower_expr(condition);
                self.emit(Instruction::if_false(cond, &end, line));

                self.loops.push(LoopContext {
                    start_label: start.clone(),
                    end_label: end.clone(),
                    step: None,
                });
                self.lower_block(body);
                self.loops.pop();

                self.emit(Instruction::goto(&start, line));
                self.emit(Instruction::label(&end, line));
            }

            StmtKind::For {
                ref init,
                ref condition,
                ref step,
                ref body,
            } => {
                self.scopes.push(HashMap::new());
                self.lower_stmt(init);

                let start = self.new_label();
                let end = self.new_label();
                self.emit(Instruction::label(&start, line));
                let cond = self.lower_expr(condition);
                self.emit(Instruction::if_false(cond, &end, line));

                self.loops.push(LoopContext {
                    start_label: start.clone(),
                    end_label: end.clone(),
                    step: Some((**step).clone()),
                });
                for stmt in body {
                    self.lower_stmt(stmt);
                }
                self.loops.pop();

                self.lower_stmt(step);
                self.emit(Instruction::goto(&start, line));
                self.emit(Instruction::label(&end, line));
                self.scopes.pop();
            }

            StmtKind::Break => {
                if let Some(end) = self.loops.last().map(|l| l.end_label.clone()) {
                    self.emit(Instruction::goto(&end, line));
                }
            }

            StmtKind::Continue => {
                // For-loops run their step before jumping back.
                let context = self
                    .loops
                    .last()
                    .map(|l| (l.start_label.clone(), l.step.clone()));
                if let Some((start, step)) = context {
                    if let Some(step) = step {
                        self.lower_stmt(&step);
                    }
                    self.emit(Instruction::goto(&start, line));
                }
            }

            StmtKind::FunctionDecl {
                ref name,
                ref params,
                ref body,
            } => {
                self.emit(Instruction::func(name, line));
                self.scopes.push(HashMap::new());
                for param in params {
                    let unique = self.declare(param);
                    self.emit(Instruction::param(&unique, line));
                }
                let saved_loops = std::mem::take(&mut self.loops);
                for stmt in body {
                    self.lower_stmt(stmt);
                }
                self.loops = saved_loops;
                self.scopes.pop();
                self.emit(Instruction::end_func(line));
            }

            StmtKind::Return { ref value } => {
                let value = value.as_ref().map(|v| self.lower_expr(v));
                self.emit(Instruction::ret(value, line));
            }

            StmtKind::Expression { ref expression } => {
                // Result of a bare call statement is discarded.
                self.lower_expr(expression);
            }

            StmtKind::Block { ref statements } => {
                self.lower_block(statements);
            }

            // Never reaches lowering: syntax errors block code generation.
            StmtKind::Error { .. } => {}
        }
    }

    fn lower_block(&mut self, statements: &[Stmt]) {
        self.scopes.push(HashMap::new());
        for stmt in statements {
            self.lower_stmt(stmt);
        }
        self.scopes.pop();
    }

    fn lower_expr(&mut self, expr: &Expr) -> Operand {
        let line = expr.line;
        match expr.kind {
            ExprKind::IntLiteral { value } => Operand::Int(value),
            ExprKind::FloatLiteral { value } => Operand::Float(value),
            ExprKind::StringLiteral { ref value } => Operand::Str(value.clone()),
            ExprKind::BoolLiteral { value } => Operand::Bool(value),
            ExprKind::Identifier { ref name } => Operand::Var(self.resolve(name)),

            ExprKind::BinaryOp {
                op: BinaryOp::And,
                ref left,
                ref right,
            } => self.lower_and(left, right, line),

            ExprKind::BinaryOp {
                op: BinaryOp::Or,
                ref left,
                ref right,
            } => self.lower_or(left, right, line),

            ExprKind::BinaryOp {
                op,
                ref left,
                ref right,
            } => {
                let a = self.lower_expr(left);
                let b = self.lower_expr(right);
                let dest = self.new_temp();
                self.emit(Instruction::binary(
                    binary_opcode(op),
                    dest.clone(),
                    a,
                    b,
                    line,
                ));
                dest
            }

            ExprKind::UnaryOp { op, ref operand } => {
                let a = self.lower_expr(operand);
                let dest = self.new_temp();
                let opcode = match op {
                    UnaryOp::Neg => Opcode::Neg,
                    UnaryOp::Not => Opcode::Not,
                };
                self.emit(Instruction::unary(opcode, dest.clone(), a, line));
                dest
            }

            ExprKind::Call { ref name, ref args } => {
                let staged: Vec<Operand> = args.iter().map(|arg| self.lower_expr(arg)).collect();
                for value in staged {
                    self.emit(Instruction::arg(value, line));
                }
                let dest = self.new_temp();
                self.emit(Instruction::call(dest.clone(), name, args.len(), line));
                dest
            }
        }
    }

    /// `a && b`: skip the right side when the left is already false
    fn lower_and(&mut self, left: &Expr, right: &Expr, line: usize) -> Operand {
        let a = self.lower_expr(left);
        let result = self.new_temp();
        let end = self.new_label();

        self.emit(Instruction::assign(result.clone(), a.clone(), line));
        self.emit(Instruction::if_false(a, &end, line));
        let b = self.lower_expr(right);
        self.emit(Instruction::assign(result.clone(), b, line));
        self.emit(Instruction::label(&end, line));

        result
    }

    /// `a || b`: skip the right side when the left is already true
    fn lower_or(&mut self, left: &Expr, right: &Expr, line: usize) -> Operand {
        let a = self.lower_expr(left);
        let result = self.new_temp();
        let negated = self.new_temp();
        let end = self.new_label();

        self.emit(Instruction::assign(result.clone(), a.clone(), line));
        self.emit(Instruction::unary(Opcode::Not, negated.clone(), a, line));
        self.emit(Instruction::if_false(negated, &end, line));
        let b = self.lower_expr(right);
        self.emit(Instruction::assign(result.clone(), b, line));
        self.emit(Instruction::label(&end, line));

        result
    }

    fn emit(&mut self, instruction: Instruction) {
        self.code.push(instruction);
    }

    fn new_temp(&mut self) -> Operand {
        self.temp_count += 1;
        Operand::Temp(format!("t{}", self.temp_count))
    }

    fn new_label(&mut self) -> String {
        self.label_count += 1;
        format!("L{}", self.label_count)
    }

    /// Binds a declared name in the current scope, renaming shadowed ones
    fn declare(&mut self, name: &str) -> String {
        let count = self.name_counts.entry(name.to_string()).or_insert(0);
        *count += 1;
        let unique = if *count == 1 {
            name.to_string()
        } else {
            format!("{}_{}", name, *count - 1)
        };
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), unique.clone());
        }
        unique
    }

    fn resolve(&self, name: &str) -> String {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

impl Default for IrGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn binary_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Add,
        BinaryOp::Sub => Opcode::Sub,
        BinaryOp::Mul => Opcode::Mul,
        BinaryOp::Div => Opcode::Div,
        BinaryOp::Mod => Opcode::Mod,
        BinaryOp::Eq => Opcode::Eq,
        BinaryOp::NotEq => Opcode::Ne,
        BinaryOp::Lt => Opcode::Lt,
        BinaryOp::Gt => Opcode::Gt,
        BinaryOp::LtEq => Opcode::Le,
        BinaryOp::GtEq => Opcode::Ge,
        // Short-circuit operators are lowered to jumps, never to opcodes.
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit ops lower to jumps"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Scanner;
    use crate::parser::Parser;

    fn lower(source: &str) -> Vec<Instruction> {
        let mut scanner = Scanner::new(source);
        let tokens = scanner.scan_tokens().unwrap();
        let (program, errors) = Parser::new(tokens).parse();
        assert!(errors.is_empty(), "unexpected syntax errors: {:?}", errors);
        IrGenerator::new().generate(&program)
    }

    fn text(code: &[Instruction]) -> Vec<String> {
        code.iter().map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_simple_expression() {
        let code = lower("let x = 2 + 3;\nprint(x);");
        assert_eq!(text(&code), vec!["t1 = 2 + 3", "x = t1", "PRINT x"]);
    }

    #[test]
    fn test_while_shape() {
        let code = lower("let i = 0;\nwhile (i < 3) { i += 1; }");
        let lines = text(&code);
        assert_eq!(
            lines,
            vec![
                "i = 0",
                "L1:",
                "t1 = i < 3",
                "IF_FALSE t1 GOTO L2",
                "i = i + 1",
                "GOTO L1",
                "L2:",
            ]
        );
    }

    #[test]
    fn test_if_else_shape() {
        let code = lower("let x = 1;\nif (x > 0) { print(1); } else { print(2); }");
        let lines = text(&code);
        assert_eq!(
            lines,
            vec![
                "x = 1",
                "t1 = x > 0",
                "IF_FALSE t1 GOTO L1",
                "PRINT 1",
                "GOTO L2",
                "L1:",
                "PRINT 2",
                "L2:",
            ]
        );
    }

    #[test]
    fn test_for_desugars_to_while() {
        let code = lower("for (let i = 0; i < 2; i += 1) { print(i); }");
        let lines = text(&code);
        assert_eq!(
            lines,
            vec![
                "i = 0",
                "L1:",
                "t1 = i < 2",
                "IF_FALSE t1 GOTO L2",
                "PRINT i",
                "i = i + 1",
                "GOTO L1",
                "L2:",
            ]
        );
    }

    #[test]
    fn test_continue_in_for_runs_step() {
        let code = lower(
            "for (let i = 0; i < 5; i += 1) { if (i == 2) { continue; } print(i); }",
        );
        let lines = text(&code);
        // The continue path must include the step before jumping back.
        let continue_goto = lines
            .iter()
            .position(|l| l == "GOTO L1")
            .expect("continue jump");
        assert_eq!(lines[continue_goto - 1], "i = i + 1");
    }

    #[test]
    fn test_break_targets_loop_end() {
        let code = lower("while (true) { break; }");
        let lines = text(&code);
        assert!(lines.contains(&"GOTO L2".to_string()), "{:?}", lines);
        assert_eq!(lines.last().unwrap(), "L2:");
    }

    #[test]
    fn test_short_circuit_and() {
        let code = lower("let a = true;\nlet b = false;\nlet c = a && b;\nprint(c);");
        let lines = text(&code);
        // Right side is guarded by a jump, not evaluated unconditionally.
        assert!(lines.iter().any(|l| l.starts_with("IF_FALSE")), "{:?}", lines);
        assert!(!lines.iter().any(|l| l.contains("&&")));
    }

    #[test]
    fn test_function_region_and_call() {
        let code = lower("fn add(a, b) { return a + b; }\nprint(add(1, 2));");
        let lines = text(&code);
        assert_eq!(lines[0], "FUNC add");
        assert_eq!(lines[1], "PARAM a");
        assert_eq!(lines[2], "PARAM b");
        assert!(lines.contains(&"ENDFUNC".to_string()));
        assert!(lines.contains(&"ARG 1".to_string()));
        assert!(lines.contains(&"ARG 2".to_string()));
        assert!(lines.iter().any(|l| l.ends_with("= CALL add, 2")));
    }

    #[test]
    fn test_shadowed_variable_renamed() {
        let code = lower("let x = 1;\n{ let x = 2; print(x); }\nprint(x);");
        let lines = text(&code);
        assert!(lines.contains(&"x = 1".to_string()));
        assert!(lines.contains(&"x_1 = 2".to_string()));
        assert!(lines.contains(&"PRINT x_1".to_string()));
        assert_eq!(lines.last().unwrap(), "PRINT x");
    }

    #[test]
    fn test_functions_lowered_before_main() {
        let code = lower("print(later(1));\nfn later(n) { return n; }");
        let lines = text(&code);
        assert_eq!(lines[0], "FUNC later");
    }
}
