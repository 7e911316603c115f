//! Lexical analysis: source text to tokens

mod scanner;
mod token;

pub use scanner::Scanner;
pub use token::{Token, TokenKind};
