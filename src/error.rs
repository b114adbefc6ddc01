//! Error types for the translator and the simulator.
//!
//! Translation errors are structural and always fatal; each carries the
//! 1-based source line and a description naming the offending term.
//! Simulator errors abort the run; normal termination is reported through
//! [`StopReason`](crate::control::StopReason) instead.

use thiserror::Error;

/// Errors reported while translating assembly source into an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    /// Malformed syntax: bad tokens, wrong structure, numeric overflow,
    /// unknown mnemonics, content outside a section.
    #[error("line {line}: {msg}")]
    Parse { line: usize, msg: String },

    /// Structurally valid instruction with the wrong operand shape for
    /// its opcode.
    #[error("line {line}: {msg}")]
    Shape { line: usize, msg: String },

    /// Undefined or duplicate label.
    #[error("line {line}: {msg}")]
    Link { line: usize, msg: String },
}

impl TranslateError {
    pub fn line(&self) -> usize {
        match self {
            TranslateError::Parse { line, .. }
            | TranslateError::Shape { line, .. }
            | TranslateError::Link { line, .. } => *line,
        }
    }
}

/// Fatal simulation errors. The control unit stops and the harness
/// reports the error; nothing is recovered locally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    /// Division or remainder by zero in the ALU.
    #[error("arithmetic error: division by zero")]
    Arith,

    /// Code or data memory access outside the valid range.
    #[error("memory error: address {addr} out of range")]
    Memory { addr: i64 },

    /// `in` with an empty input latch, a non-codepoint output value, or
    /// a malformed artifact.
    #[error("i/o error: {0}")]
    Io(String),
}
