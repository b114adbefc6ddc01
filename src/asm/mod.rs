//! Assembly-language front end: token definitions and the line-oriented
//! parser producing the term stream consumed by the translator.

pub mod parser;
pub mod token;

pub use parser::{parse, RawOperand, SourceTerm, Term};
