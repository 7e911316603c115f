use super::ast::{AssignOp, BinaryOp, Expr, ExprKind, Program, Stmt, StmtKind, UnaryOp};
use crate::lexer::{Token, TokenKind};
use serde::Serialize;
use std::fmt;

/// A recoverable syntax error
///
/// Collected rather than returned as `Err`: the parser records the error,
/// resynchronizes, and keeps going so one run can report several independent
/// problems. Code generation is refused while any of these remain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyntaxError {
    /// Error description
    pub message: String,
    /// Line of the offending token (1-indexed)
    pub line: usize,
    /// Column of the offending token (1-indexed)
    pub column: usize,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Syntax error at line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

/// Upper bound on collected syntax errors before the parser gives up
///
/// Past this density the input is garbage and further recovery only
/// produces noise; the remaining input is wrapped in one error node.
const MAX_SYNTAX_ERRORS: usize = 50;

/// Binding powers for binary operators, low to high
///
/// | level | operators          | associativity |
/// |-------|--------------------|---------------|
/// | 1     | `\|\|`             | left          |
/// | 2     | `&&`               | left          |
/// | 3     | `==` `!=`          | left          |
/// | 4     | `<` `>` `<=` `>=`  | left          |
/// | 5     | `+` `-`            | left          |
/// | 6     | `*` `/` `%`        | left          |
fn binary_op(kind: &TokenKind) -> Option<(u8, BinaryOp)> {
    match kind {
        TokenKind::Or => Some((1, BinaryOp::Or)),
        TokenKind::And => Some((2, BinaryOp::And)),
        TokenKind::Eq => Some((3, BinaryOp::Eq)),
        TokenKind::NotEq => Some((3, BinaryOp::NotEq)),
        TokenKind::Lt => Some((4, BinaryOp::Lt)),
        TokenKind::Gt => Some((4, BinaryOp::Gt)),
        TokenKind::LtEq => Some((4, BinaryOp::LtEq)),
        TokenKind::GtEq => Some((4, BinaryOp::GtEq)),
        TokenKind::Plus => Some((5, BinaryOp::Add)),
        TokenKind::Minus => Some((5, BinaryOp::Sub)),
        TokenKind::Star => Some((6, BinaryOp::Mul)),
        TokenKind::Slash => Some((6, BinaryOp::Div)),
        TokenKind::Percent => Some((6, BinaryOp::Mod)),
        _ => None,
    }
}

/// Recursive descent parser with precedence climbing for expressions
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    errors: Vec<SyntaxError>,
}

type ParseResult<T> = std::result::Result<T, SyntaxError>;

impl Parser {
    /// Creates a new parser over a token sequence
    ///
    /// The sequence is expected to end with an EOF token, as produced by
    /// [`crate::lexer::Scanner::scan_tokens`].
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.is_empty() {
            tokens.push(Token::new(TokenKind::Eof, String::new(), 1, 1));
        }
        Parser {
            tokens,
            current: 0,
            errors: Vec::new(),
        }
    }

    /// Parses the tokens into a best-effort AST plus collected syntax errors
    pub fn parse(mut self) -> (Program, Vec<SyntaxError>) {
        let mut statements = Vec::new();
        self.skip_newlines();

        while !self.is_at_end() {
            if self.errors.len() >= MAX_SYNTAX_ERRORS {
                let token = self.peek().clone();
                statements.push(Stmt::new(
                    StmtKind::Error {
                        message: "Too many syntax errors, giving up".to_string(),
                    },
                    token.line,
                    token.column,
                ));
                break;
            }

            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(error) => {
                    let placeholder = Stmt::new(
                        StmtKind::Error {
                            message: error.message.clone(),
                        },
                        error.line,
                        error.column,
                    );
                    self.errors.push(error);
                    statements.push(placeholder);
                    self.synchronize();
                }
            }
            self.skip_newlines();
        }

        (Program { statements }, self.errors)
    }

    /// Skip tokens up to a likely statement boundary after an error
    ///
    /// Stops just past a `;`, or right before a `}` or a statement keyword.
    fn synchronize(&mut self) {
        while !self.is_at_end() {
            if self.check(&TokenKind::Semicolon) {
                self.advance();
                return;
            }
            match self.peek().kind {
                TokenKind::RightBrace
                | TokenKind::Let
                | TokenKind::Print
                | TokenKind::Scan
                | TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Fn
                | TokenKind::Return => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        self.skip_newlines();
        let token = self.peek().clone();

        match token.kind {
            TokenKind::Let => self.parse_let(true),
            TokenKind::Print => self.parse_print(),
            TokenKind::Scan => self.parse_scan(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Fn => self.parse_function(),
            TokenKind::Return => self.parse_return(),
            TokenKind::LeftBrace => {
                let statements = self.parse_block()?;
                Ok(Stmt::new(
                    StmtKind::Block { statements },
                    token.line,
                    token.column,
                ))
            }
            TokenKind::Break => {
                self.advance();
                self.expect_semicolon()?;
                Ok(Stmt::new(StmtKind::Break, token.line, token.column))
            }
            TokenKind::Continue => {
                self.advance();
                self.expect_semicolon()?;
                Ok(Stmt::new(StmtKind::Continue, token.line, token.column))
            }
            TokenKind::Identifier(_) => {
                if self.peek_next().kind == TokenKind::LeftParen {
                    self.parse_call_statement()
                } else {
                    self.parse_assignment(true)
                }
            }
            _ => Err(self.syntax_error(format!("Unexpected token {}", token.kind))),
        }
    }

    fn parse_let(&mut self, consume_semi: bool) -> ParseResult<Stmt> {
        let token = self.peek().clone();
        self.consume(TokenKind::Let)?;
        let name = self.consume_identifier("variable name after 'let'")?;
        self.consume(TokenKind::Assign)?;
        let value = self.parse_expression(0)?;
        if consume_semi {
            self.expect_semicolon()?;
        }
        Ok(Stmt::new(
            StmtKind::Let { name, value },
            token.line,
            token.column,
        ))
    }

    fn parse_assignment(&mut self, consume_semi: bool) -> ParseResult<Stmt> {
        let token = self.peek().clone();
        let target = self.consume_identifier("assignment target")?;

        let op = match self.peek().kind {
            TokenKind::Assign => AssignOp::Assign,
            TokenKind::PlusAssign => AssignOp::AddAssign,
            TokenKind::MinusAssign => AssignOp::SubAssign,
            _ => {
                return Err(self.syntax_error(format!(
                    "Expected assignment operator after '{}'",
                    target
                )));
            }
        };
        self.advance();

        let value = self.parse_expression(0)?;
        if consume_semi {
            self.expect_semicolon()?;
        }
        Ok(Stmt::new(
            StmtKind::Assign { target, op, value },
            token.line,
            token.column,
        ))
    }

    fn parse_print(&mut self) -> ParseResult<Stmt> {
        let token = self.peek().clone();
        self.consume(TokenKind::Print)?;
        self.consume(TokenKind::LeftParen)?;
        let expression = self.parse_expression(0)?;
        self.consume(TokenKind::RightParen)?;
        self.expect_semicolon()?;
        Ok(Stmt::new(
            StmtKind::Print { expression },
            token.line,
            token.column,
        ))
    }

    fn parse_scan(&mut self) -> ParseResult<Stmt> {
        let token = self.peek().clone();
        self.consume(TokenKind::Scan)?;
        self.consume(TokenKind::LeftParen)?;
        let target = self.consume_identifier("variable name in scan(...)")?;
        self.consume(TokenKind::RightParen)?;
        self.expect_semicolon()?;
        Ok(Stmt::new(
            StmtKind::Scan { target },
            token.line,
            token.column,
        ))
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        let token = self.peek().clone();
        self.consume(TokenKind::If)?;
        self.consume(TokenKind::LeftParen)?;
        let condition = self.parse_expression(0)?;
        self.consume(TokenKind::RightParen)?;
        let then_branch = self.parse_block()?;

        let mut else_branch = None;
        self.skip_newlines();
        if self.check(&TokenKind::Else) {
            self.advance();
            self.skip_newlines();
            if self.check(&TokenKind::If) {
                // `else if` chains nest as a single-statement else branch
                else_branch = Some(vec![self.parse_if()?]);
            } else {
                else_branch = Some(self.parse_block()?);
            }
        }

        Ok(Stmt::new(
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
            token.line,
            token.column,
        ))
    }

    fn parse_while(&mut self) -> ParseResult<Stmt> {
        let token = self.peek().clone();
        self.consume(TokenKind::While)?;
        self.consume(TokenKind::LeftParen)?;
        let condition = self.parse_expression(0)?;
        self.consume(TokenKind::RightParen)?;
        let body = self.parse_block()?;
        Ok(Stmt::new(
            StmtKind::While { condition, body },
            token.line,
            token.column,
        ))
    }

    fn parse_for(&mut self) -> ParseResult<Stmt> {
        let token = self.peek().clone();
        self.consume(TokenKind::For)?;
        self.consume(TokenKind::LeftParen)?;

        let init = if self.check(&TokenKind::Let) {
            self.parse_let(true)?
        } else {
            self.parse_assignment(true)?
        };

        let condition = self.parse_expression(0)?;
        self.consume(TokenKind::Semicolon)?;

        let step = self.parse_assignment(false)?;
        self.consume(TokenKind::RightParen)?;

        let body = self.parse_block()?;
        Ok(Stmt::new(
            StmtKind::For {
                init: Box::new(init),
                condition,
                step: Box::new(step),
                body,
            },
            token.line,
            token.column,
        ))
    }

    fn parse_function(&mut self) -> ParseResult<Stmt> {
        let token = self.peek().clone();
        self.consume(TokenKind::Fn)?;
        let name = self.consume_identifier("function name after 'fn'")?;
        self.consume(TokenKind::LeftParen)?;

        let mut params = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                params.push(self.consume_identifier("parameter name")?);
                if !self.check(&TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.consume(TokenKind::RightParen)?;

        let body = self.parse_block()?;
        Ok(Stmt::new(
            StmtKind::FunctionDecl { name, params, body },
            token.line,
            token.column,
        ))
    }

    fn parse_return(&mut self) -> ParseResult<Stmt> {
        let token = self.peek().clone();
        self.consume(TokenKind::Return)?;

        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression(0)?)
        };
        self.expect_semicolon()?;
        Ok(Stmt::new(
            StmtKind::Return { value },
            token.line,
            token.column,
        ))
    }

    fn parse_call_statement(&mut self) -> ParseResult<Stmt> {
        let token = self.peek().clone();
        let expression = self.parse_expression(0)?;
        if !matches!(expression.kind, ExprKind::Call { .. }) {
            return Err(self.syntax_error("Only calls may be used as expression statements"));
        }
        self.expect_semicolon()?;
        Ok(Stmt::new(
            StmtKind::Expression { expression },
            token.line,
            token.column,
        ))
    }

    fn parse_block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.skip_newlines();
        self.consume(TokenKind::LeftBrace)?;
        self.skip_newlines();

        let mut statements = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            statements.push(self.parse_statement()?);
            self.skip_newlines();
        }

        self.consume(TokenKind::RightBrace)?;
        Ok(statements)
    }

    /// Precedence climbing over the operator table in [`binary_op`]
    ///
    /// All binary operators are left-associative, so the recursive call uses
    /// `level + 1` as its minimum binding power.
    fn parse_expression(&mut self, min_level: u8) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;

        while let Some((level, op)) = binary_op(&self.peek().kind) {
            if level < min_level {
                break;
            }
            self.advance();
            let right = self.parse_expression(level + 1)?;
            let (line, column) = (left.line, left.column);
            left = Expr::new(
                ExprKind::BinaryOp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                line,
                column,
            );
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let token = self.peek().clone();
        let op = match token.kind {
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            _ => None,
        };

        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::new(
                ExprKind::UnaryOp {
                    op,
                    operand: Box::new(operand),
                },
                token.line,
                token.column,
            ));
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let token = self.peek().clone();

        match token.kind {
            TokenKind::Integer(value) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::IntLiteral { value },
                    token.line,
                    token.column,
                ))
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::FloatLiteral { value },
                    token.line,
                    token.column,
                ))
            }
            TokenKind::Str(ref value) => {
                let value = value.clone();
                self.advance();
                Ok(Expr::new(
                    ExprKind::StringLiteral { value },
                    token.line,
                    token.column,
                ))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::BoolLiteral { value: true },
                    token.line,
                    token.column,
                ))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::BoolLiteral { value: false },
                    token.line,
                    token.column,
                ))
            }
            TokenKind::Identifier(ref name) => {
                let name = name.clone();
                self.advance();
                if self.check(&TokenKind::LeftParen) {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(&TokenKind::RightParen) {
                        loop {
                            args.push(self.parse_expression(0)?);
                            if !self.check(&TokenKind::Comma) {
                                break;
                            }
                            self.advance();
                        }
                    }
                    self.consume(TokenKind::RightParen)?;
                    Ok(Expr::new(
                        ExprKind::Call { name, args },
                        token.line,
                        token.column,
                    ))
                } else {
                    Ok(Expr::new(
                        ExprKind::Identifier { name },
                        token.line,
                        token.column,
                    ))
                }
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_expression(0)?;
                self.consume(TokenKind::RightParen)?;
                Ok(expr)
            }
            _ => Err(self.syntax_error(format!("Unexpected token {} in expression", token.kind))),
        }
    }

    // Token stream helpers

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn peek_next(&self) -> &Token {
        &self.tokens[(self.current + 1).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.current < self.tokens.len().saturating_sub(1) {
            self.current += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn skip_newlines(&mut self) {
        while self.check(&TokenKind::Newline) {
            self.advance();
        }
    }

    fn consume(&mut self, kind: TokenKind) -> ParseResult<()> {
        self.skip_newlines();
        if self.check(&kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.syntax_error(format!(
                "Expected {}, got {}",
                kind.type_name(),
                self.peek().kind
            )))
        }
    }

    fn expect_semicolon(&mut self) -> ParseResult<()> {
        if self.check(&TokenKind::Semicolon) {
            self.advance();
            Ok(())
        } else {
            Err(self.syntax_error(format!(
                "Expected ';' after statement, got {}",
                self.peek().kind
            )))
        }
    }

    fn consume_identifier(&mut self, what: &str) -> ParseResult<String> {
        self.skip_newlines();
        if let TokenKind::Identifier(ref name) = self.peek().kind {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.syntax_error(format!("Expected {}, got {}", what, self.peek().kind)))
        }
    }

    fn syntax_error(&self, message: impl Into<String>) -> SyntaxError {
        let token = self.peek();
        SyntaxError {
            message: message.into(),
            line: token.line,
            column: token.column,
        }
    }
}
