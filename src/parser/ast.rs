use serde::Serialize;
use std::fmt;

/// Complete program
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    /// Top-level statements, including function declarations
    pub statements: Vec<Stmt>,
}

/// A statement with its source position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stmt {
    /// What kind of statement this is
    #[serde(flatten)]
    pub kind: StmtKind,
    /// Line where the statement starts (1-indexed)
    pub line: usize,
    /// Column where the statement starts (1-indexed)
    pub column: usize,
}

impl Stmt {
    /// Creates a statement at a source position
    pub fn new(kind: StmtKind, line: usize, column: usize) -> Self {
        Stmt { kind, line, column }
    }
}

/// Statements
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum StmtKind {
    /// Variable declaration: `let x = expr;`
    Let {
        /// Name being declared
        name: String,
        /// Initializer expression
        value: Expr,
    },

    /// Assignment to a declared variable: `x = expr;`, `x += expr;`
    Assign {
        /// Assignment target
        target: String,
        /// Plain or compound assignment operator
        op: AssignOp,
        /// Right-hand side expression
        value: Expr,
    },

    /// Print statement: `print(expr);`
    Print {
        /// Expression whose value is written to output
        expression: Expr,
    },

    /// Scan statement: `scan(x);` reads one input line into `x`
    Scan {
        /// Variable receiving the value
        target: String,
    },

    /// If statement with optional else branch
    If {
        /// Condition expression
        condition: Expr,
        /// Statements executed when the condition holds
        then_branch: Vec<Stmt>,
        /// Statements executed otherwise
        else_branch: Option<Vec<Stmt>>,
    },

    /// While loop
    While {
        /// Loop condition
        condition: Expr,
        /// Loop body
        body: Vec<Stmt>,
    },

    /// C-style for loop: `for (init; cond; step) { ... }`
    For {
        /// Initializer (a `let` or assignment)
        init: Box<Stmt>,
        /// Loop condition
        condition: Expr,
        /// Step statement (an assignment)
        step: Box<Stmt>,
        /// Loop body
        body: Vec<Stmt>,
    },

    /// Break out of the innermost loop
    Break,

    /// Continue with the next iteration of the innermost loop
    Continue,

    /// Function declaration: `fn name(a, b) { ... }`
    FunctionDecl {
        /// Function name
        name: String,
        /// Parameter names
        params: Vec<String>,
        /// Function body
        body: Vec<Stmt>,
    },

    /// Return from the enclosing function
    Return {
        /// Optional return value
        value: Option<Expr>,
    },

    /// Bare call statement: `name(args);`
    Expression {
        /// The call expression
        expression: Expr,
    },

    /// Bare block, introduces a scope
    Block {
        /// Statements in the block
        statements: Vec<Stmt>,
    },

    /// Placeholder for a region the parser could not understand
    ///
    /// Produced by error recovery so the rest of the tree stays usable;
    /// code generation is refused while any of these remain.
    Error {
        /// The recorded syntax error message
        message: String,
    },
}

/// Assignment operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssignOp {
    /// `=`
    Assign,
    /// `+=`
    AddAssign,
    /// `-=`
    SubAssign,
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            AssignOp::Assign => "=",
            AssignOp::AddAssign => "+=",
            AssignOp::SubAssign => "-=",
        };
        write!(f, "{}", s)
    }
}

/// An expression with its source position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expr {
    /// What kind of expression this is
    #[serde(flatten)]
    pub kind: ExprKind,
    /// Line where the expression starts (1-indexed)
    pub line: usize,
    /// Column where the expression starts (1-indexed)
    pub column: usize,
}

impl Expr {
    /// Creates an expression at a source position
    pub fn new(kind: ExprKind, line: usize, column: usize) -> Self {
        Expr { kind, line, column }
    }
}

/// Expressions
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ExprKind {
    /// Integer literal
    IntLiteral {
        /// Literal value
        value: i64,
    },
    /// Floating-point literal
    FloatLiteral {
        /// Literal value
        value: f64,
    },
    /// String literal
    StringLiteral {
        /// Literal value with escapes resolved
        value: String,
    },
    /// Boolean literal
    BoolLiteral {
        /// Literal value
        value: bool,
    },
    /// Variable reference
    Identifier {
        /// Variable name
        name: String,
    },
    /// Binary operation
    BinaryOp {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Unary operation
    UnaryOp {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expr>,
    },
    /// Function call
    Call {
        /// Callee name
        name: String,
        /// Argument expressions
        args: Vec<Expr>,
    },
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    /// Addition (also string concatenation)
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
    /// Division (always yields a float, like the target language)
    Div,
    /// Modulo
    Mod,
    /// Equality
    Eq,
    /// Inequality
    NotEq,
    /// Less than
    Lt,
    /// Greater than
    Gt,
    /// Less than or equal
    LtEq,
    /// Greater than or equal
    GtEq,
    /// Short-circuit logical AND
    And,
    /// Short-circuit logical OR
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::LtEq => "<=",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{}", s)
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    /// Arithmetic negation
    Neg,
    /// Logical NOT
    Not,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        };
        write!(f, "{}", s)
    }
}
