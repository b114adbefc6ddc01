//! Parser for the assembly language.
//!
//! Transforms source text into a flat sequence of [`SourceTerm`]s:
//! section markers, label definitions, data declarations and
//! instructions. Operands stay unclassified ([`RawOperand`]) until the
//! translator resolves registers, labels and immediates.

use logos::Logos;

use crate::error::TranslateError;
use crate::isa::Opcode;

use super::token::Token;

/// An instruction operand as written in the source: either a bare
/// identifier (register name or label reference) or an immediate value.
/// Character literals are already reduced to their codepoint.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOperand {
    Symbol(String),
    Immediate(i32),
}

/// One syntactic element of the source program.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    SectionText,
    SectionData,
    Label(String),
    /// `word <value>`: one initialised data cell.
    Word(i32),
    /// `int <index> <target>`: an interrupt vector table entry.
    Vector { index: i32, target: RawOperand },
    Instr { opcode: Opcode, operands: Vec<RawOperand> },
}

/// A term together with its 1-based source line, for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTerm {
    pub line: usize,
    pub term: Term,
}

fn parse_error(line: usize, msg: impl Into<String>) -> TranslateError {
    TranslateError::Parse { line, msg: msg.into() }
}

fn to_i32(line: usize, value: i64) -> Result<i32, TranslateError> {
    i32::try_from(value)
        .map_err(|_| parse_error(line, format!("numeric literal {} out of range", value)))
}

fn operand(line: usize, token: &Token) -> Result<RawOperand, TranslateError> {
    match token {
        Token::Symbol(name) => Ok(RawOperand::Symbol(name.to_string())),
        Token::Number(value) => Ok(RawOperand::Immediate(to_i32(line, *value)?)),
        Token::Char(ch) => Ok(RawOperand::Immediate(*ch as i32)),
        Token::Label(name) => Err(parse_error(line, format!("unexpected label `{}:`", name))),
        Token::Error => unreachable!("error tokens are rejected before operand parsing"),
    }
}

/// Parse an entire assembly program into terms.
pub fn parse(source: &str) -> Result<Vec<SourceTerm>, TranslateError> {
    let mut terms = Vec::new();
    let mut in_section = false;

    for (index, raw_line) in source.lines().enumerate() {
        let line = index + 1;

        let mut tokens = Vec::new();
        for (token, span) in Token::lexer(raw_line).spanned() {
            if token == Token::Error {
                return Err(parse_error(
                    line,
                    format!("malformed token `{}`", &raw_line[span]),
                ));
            }
            tokens.push(token);
        }

        if tokens.is_empty() {
            continue;
        }

        let indented = raw_line.starts_with(|c: char| c.is_whitespace());

        if !indented {
            // Only section markers may start at column 0.
            match tokens.as_slice() {
                [Token::Symbol("section"), Token::Symbol("text")] => {
                    terms.push(SourceTerm { line, term: Term::SectionText });
                    in_section = true;
                }
                [Token::Symbol("section"), Token::Symbol("data")] => {
                    terms.push(SourceTerm { line, term: Term::SectionData });
                    in_section = true;
                }
                [Token::Symbol("section"), ..] => {
                    return Err(parse_error(line, "unknown section name"));
                }
                _ => {
                    return Err(parse_error(
                        line,
                        "content must be indented under a section marker",
                    ));
                }
            }
            continue;
        }

        if !in_section {
            return Err(parse_error(line, "no active section"));
        }

        let term = match tokens.as_slice() {
            [Token::Label(name)] => Term::Label(name.to_string()),
            [Token::Label(name), ..] => {
                return Err(parse_error(
                    line,
                    format!("label `{}:` must stand alone on its line", name),
                ));
            }

            [Token::Symbol("word"), value] => match value {
                Token::Number(value) => Term::Word(to_i32(line, *value)?),
                Token::Char(ch) => Term::Word(*ch as i32),
                _ => return Err(parse_error(line, "`word` takes an integer or a character")),
            },
            [Token::Symbol("word"), ..] => {
                return Err(parse_error(line, "`word` declaration takes exactly one value"));
            }

            [Token::Symbol("int"), Token::Number(index), target] => Term::Vector {
                index: to_i32(line, *index)?,
                target: operand(line, target)?,
            },
            [Token::Symbol("int"), ..] => {
                return Err(parse_error(
                    line,
                    "interrupt vector declaration takes an index and a target address",
                ));
            }

            [Token::Symbol(mnemonic), rest @ ..] => {
                let opcode = Opcode::from_mnemonic(mnemonic)
                    .ok_or_else(|| parse_error(line, format!("unknown mnemonic `{}`", mnemonic)))?;

                let operands = rest
                    .iter()
                    .map(|token| operand(line, token))
                    .collect::<Result<Vec<_>, _>>()?;

                Term::Instr { opcode, operands }
            }

            _ => return Err(parse_error(line, "expected a label, declaration or instruction")),
        };

        terms.push(SourceTerm { line, term });
    }

    Ok(terms)
}
