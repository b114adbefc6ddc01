//! Token definitions for the assembly language.
//!
//! The grammar is line-oriented, so the lexer runs on one line at a time
//! and the parser tracks line numbers itself.

use logos::{Lexer, Logos};

fn label_callback<'a>(lex: &mut Lexer<'a, Token<'a>>) -> &'a str {
    let slice = lex.slice();
    &slice[..slice.len() - 1]
}

fn number_callback<'a>(
    lex: &mut Lexer<'a, Token<'a>>,
) -> Result<i64, std::num::ParseIntError> {
    lex.slice().parse()
}

fn char_callback<'a>(lex: &mut Lexer<'a, Token<'a>>) -> Result<char, ()> {
    // slice is the quoted literal, e.g. 'q'
    lex.slice().chars().nth(1).ok_or(())
}

#[derive(Logos, Debug, PartialEq, Clone)]
pub enum Token<'a> {
    #[error]
    #[regex(r"[ \t\r\f]+", logos::skip)]
    #[regex(r";[^\n]*", logos::skip)]
    Error,

    /// A label definition: an identifier with a trailing colon.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*:", label_callback)]
    Label(&'a str),

    /// A bare identifier: mnemonic, register name, keyword or label
    /// reference. Classified by the parser and the translator.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", Lexer::slice)]
    Symbol(&'a str),

    /// A decimal integer literal. Range-checked to `i32` by the parser.
    #[regex(r"-?[0-9]+", number_callback)]
    Number(i64),

    /// A character literal: one codepoint in single quotes.
    #[regex(r"'[^'\n]'", char_callback)]
    Char(char),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        Token::lexer(input).collect()
    }

    #[test]
    fn lexes_instruction_line() {
        assert_eq!(
            lex("add r1 r0 1 ; comment"),
            vec![
                Token::Symbol("add"),
                Token::Symbol("r1"),
                Token::Symbol("r0"),
                Token::Number(1),
            ],
        );
    }

    #[test]
    fn lexes_label_and_char_literal() {
        assert_eq!(
            lex("greeting: 'h' ' '"),
            vec![Token::Label("greeting"), Token::Char('h'), Token::Char(' ')],
        );
    }

    #[test]
    fn negative_numbers_and_unterminated_literals() {
        assert_eq!(lex("-42"), vec![Token::Number(-42)]);
        assert!(lex("'h").contains(&Token::Error));
    }
}
