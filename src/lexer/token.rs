use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// A single token from the source code
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The type of token
    pub kind: TokenKind,
    /// Original text of the token
    pub lexeme: String,
    /// Line number where token appears (1-indexed)
    pub line: usize,
    /// Column number where token starts (1-indexed)
    pub column: usize,
}

impl Token {
    /// Creates a new token with the given properties
    pub fn new(kind: TokenKind, lexeme: String, line: usize, column: usize) -> Self {
        Token {
            kind,
            lexeme,
            line,
            column,
        }
    }
}

/// All possible token types in the source language
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    /// Integer literal
    Integer(i64),
    /// Floating-point literal
    Float(f64),
    /// String literal (escapes already resolved)
    Str(String),
    /// Boolean true literal
    True,
    /// Boolean false literal
    False,

    /// Identifier
    Identifier(String),

    // Keywords
    /// LET keyword (variable declaration)
    Let,
    /// PRINT keyword
    Print,
    /// SCAN keyword
    Scan,
    /// IF keyword
    If,
    /// ELSE keyword
    Else,
    /// WHILE keyword
    While,
    /// FOR keyword
    For,
    /// BREAK keyword
    Break,
    /// CONTINUE keyword
    Continue,
    /// FN keyword (function declaration)
    Fn,
    /// RETURN keyword
    Return,

    // Operators
    /// Plus operator (+)
    Plus,
    /// Minus operator (-)
    Minus,
    /// Star operator (*)
    Star,
    /// Slash operator (/)
    Slash,
    /// Percent operator (%)
    Percent,
    /// Assignment operator (=)
    Assign,
    /// Plus-assign operator (+=)
    PlusAssign,
    /// Minus-assign operator (-=)
    MinusAssign,
    /// Equality operator (==)
    Eq,
    /// Inequality operator (!=)
    NotEq,
    /// Less than operator (<)
    Lt,
    /// Greater than operator (>)
    Gt,
    /// Less than or equal operator (<=)
    LtEq,
    /// Greater than or equal operator (>=)
    GtEq,
    /// Logical AND operator (&&)
    And,
    /// Logical OR operator (||)
    Or,
    /// Logical NOT operator (!)
    Not,

    // Delimiters
    /// Left parenthesis (
    LeftParen,
    /// Right parenthesis )
    RightParen,
    /// Left brace {
    LeftBrace,
    /// Right brace }
    RightBrace,
    /// Comma delimiter
    Comma,
    /// Semicolon delimiter
    Semicolon,
    /// Newline delimiter
    Newline,

    // Special
    /// End of input marker
    Eof,
}

impl TokenKind {
    /// Keyword lookup for a scanned word, `None` for plain identifiers
    pub fn keyword(s: &str) -> Option<TokenKind> {
        match s {
            "let" => Some(TokenKind::Let),
            "print" => Some(TokenKind::Print),
            "scan" => Some(TokenKind::Scan),
            "if" => Some(TokenKind::If),
            "else" => Some(TokenKind::Else),
            "while" => Some(TokenKind::While),
            "for" => Some(TokenKind::For),
            "break" => Some(TokenKind::Break),
            "continue" => Some(TokenKind::Continue),
            "fn" => Some(TokenKind::Fn),
            "return" => Some(TokenKind::Return),
            "true" => Some(TokenKind::True),
            "false" => Some(TokenKind::False),
            _ => None,
        }
    }

    /// Check if token is a keyword
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Let
                | TokenKind::Print
                | TokenKind::Scan
                | TokenKind::If
                | TokenKind::Else
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Fn
                | TokenKind::Return
        )
    }

    /// Wire name of this token type, as reported to the caller
    pub fn type_name(&self) -> &'static str {
        match self {
            TokenKind::Integer(_) | TokenKind::Float(_) => "NUMBER",
            TokenKind::Str(_) => "STRING",
            TokenKind::True => "TRUE",
            TokenKind::False => "FALSE",
            TokenKind::Identifier(_) => "IDENTIFIER",
            TokenKind::Let => "LET",
            TokenKind::Print => "PRINT",
            TokenKind::Scan => "SCAN",
            TokenKind::If => "IF",
            TokenKind::Else => "ELSE",
            TokenKind::While => "WHILE",
            TokenKind::For => "FOR",
            TokenKind::Break => "BREAK",
            TokenKind::Continue => "CONTINUE",
            TokenKind::Fn => "FN",
            TokenKind::Return => "RETURN",
            TokenKind::Plus => "PLUS",
            TokenKind::Minus => "MINUS",
            TokenKind::Star => "MULTIPLY",
            TokenKind::Slash => "DIVIDE",
            TokenKind::Percent => "MODULO",
            TokenKind::Assign => "ASSIGN",
            TokenKind::PlusAssign => "PLUS_ASSIGN",
            TokenKind::MinusAssign => "MINUS_ASSIGN",
            TokenKind::Eq => "EQUAL",
            TokenKind::NotEq => "NOT_EQUAL",
            TokenKind::Lt => "LESS",
            TokenKind::Gt => "GREATER",
            TokenKind::LtEq => "LESS_EQUAL",
            TokenKind::GtEq => "GREATER_EQUAL",
            TokenKind::And => "AND",
            TokenKind::Or => "OR",
            TokenKind::Not => "NOT",
            TokenKind::LeftParen => "LPAREN",
            TokenKind::RightParen => "RPAREN",
            TokenKind::LeftBrace => "LBRACE",
            TokenKind::RightBrace => "RBRACE",
            TokenKind::Comma => "COMMA",
            TokenKind::Semicolon => "SEMICOLON",
            TokenKind::Newline => "NEWLINE",
            TokenKind::Eof => "EOF",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TokenKind::Integer(n) => write!(f, "{}", n),
            TokenKind::Float(fl) => write!(f, "{}", fl),
            TokenKind::Str(s) => write!(f, "\"{}\"", s),
            TokenKind::Identifier(id) => write!(f, "{}", id),
            other => write!(f, "{}", other.type_name()),
        }
    }
}

// The caller-facing contract is `{type, value, line, column}`, with a
// NEWLINE token's value being the line break itself.
impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Token", 4)?;
        state.serialize_field("type", self.kind.type_name())?;
        match self.kind {
            TokenKind::Newline => state.serialize_field("value", "\n")?,
            _ => state.serialize_field("value", &self.lexeme)?,
        }
        state.serialize_field("line", &self.line)?;
        state.serialize_field("column", &self.column)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_lookup() {
        assert_eq!(TokenKind::keyword("while"), Some(TokenKind::While));
        assert_eq!(TokenKind::keyword("let"), Some(TokenKind::Let));
        assert_eq!(TokenKind::keyword("not_a_keyword"), None);
    }

    #[test]
    fn test_is_keyword() {
        assert!(TokenKind::If.is_keyword());
        assert!(TokenKind::Fn.is_keyword());
        assert!(!TokenKind::Integer(42).is_keyword());
        assert!(!TokenKind::Identifier("test".to_string()).is_keyword());
    }

    #[test]
    fn test_token_wire_format() {
        let token = Token::new(TokenKind::Integer(7), "7".to_string(), 2, 5);
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["type"], "NUMBER");
        assert_eq!(json["value"], "7");
        assert_eq!(json["line"], 2);
        assert_eq!(json["column"], 5);
    }

    #[test]
    fn test_newline_value_is_line_break() {
        let token = Token::new(TokenKind::Newline, "\n".to_string(), 1, 9);
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["type"], "NEWLINE");
        assert_eq!(json["value"], "\n");
    }
}
