//! Splits command lines into words.
//!
//! Quotes are not interpreted here: a quote character is ordinary word input.
//! Only `echo` strips quotes.

use std::fmt;

use crate::core::parser::{self, grammar::TokensParser};
use crate::core::variable_expansion;
use crate::errors::Result;

#[derive(Clone, Debug, PartialEq)]
pub enum Token<'a> {
    Word(&'a str),
    /// `|`
    Pipe,
    /// `<`
    Less,
    /// `>`
    Great,
    /// `>>`
    DoubleGreat,
    /// A lone `&`
    Ampersand,
}

impl<'a> fmt::Display for Token<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Token::Word(word) => write!(f, "{}", word),
            Token::Pipe => write!(f, "|"),
            Token::Less => write!(f, "<"),
            Token::Great => write!(f, ">"),
            Token::DoubleGreat => write!(f, ">>"),
            Token::Ampersand => write!(f, "&"),
        }
    }
}

/// Splits `line` into words and the `|`, `<`, `>`, `>>` operators. Operators
/// need no surrounding whitespace. A lone `&` is its own token.
pub fn lex(line: &str) -> Result<Vec<Token<'_>>> {
    TokensParser::new()
        .parse(line)
        .map_err(|e| parser::syntax_error(line, e))
}

/// Splits `line` on whitespace and expands the variables in each word. An
/// empty vector means there is no command.
pub fn tokenize(line: &str) -> Result<Vec<String>> {
    line.split_whitespace()
        .map(variable_expansion::expand)
        .collect()
}

/// Expands the variables in each word, producing an argument vector.
pub fn expand_words<S: AsRef<str>>(words: &[S]) -> Result<Vec<String>> {
    words
        .iter()
        .map(|word| variable_expansion::expand(word.as_ref()))
        .collect()
}
