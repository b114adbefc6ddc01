//! A crate for working with an educational CISC-style register machine:
//! a small assembler and a tick-accurate, interrupt-driven simulator.
//!
//! The machine has a Harvard memory organisation (separate code and data
//! memories), a hardwired control unit, a single two-input ALU, a small
//! register file (`r0..r4`, `sp`, `pc`) and one port-mapped input device
//! delivering characters through maskable interrupts.
//!
//! This crate provides the functionality to:
//! - Translate assembly source into a JSON machine-code artifact,
//!   resolving labels, interrupt vectors and immediate encodings.
//! - Execute an artifact against a timed input schedule, with exact
//!   per-instruction tick accounting and an execution journal.
//!
//! # Example
//! ```
//! use cism::{control, translator};
//! use slog::{o, Discard, Logger};
//!
//! // Print "hi" and stop.
//! let source = "section text\n    out 'h'\n    out 'i'\n    halt\n";
//!
//! // Translate the source into a machine-code artifact.
//! let program = translator::translate(source).unwrap();
//!
//! // Run it with an empty input schedule.
//! let summary = control::simulate(&program, Vec::new(), Logger::root(Discard, o!()))
//!     .expect("an error occurred while simulating the program");
//!
//! assert_eq!(summary.output, "hi");
//! assert_eq!(summary.instr_counter, 2);
//! ```
//!
//! # Executables
//!
//! ## `translator`
//!
//! Compiles an assembly file into a machine-code artifact:
//!
//! ```text
//! translator program.asm program.bin
//! ```
//!
//! ## `machine`
//!
//! Runs an artifact against an input schedule and prints the output
//! buffer followed by the instruction and tick totals:
//!
//! ```text
//! machine program.bin input.json
//! hello world
//! instr_counter: 56 ticks: 100
//! ```

pub mod asm;
pub mod control;
pub mod datapath;
pub mod error;
pub mod event;
pub mod isa;
pub mod translator;

pub use control::{simulate, ControlUnit, StopReason, Summary};
pub use error::{SimError, TranslateError};
pub use isa::Program;
pub use translator::translate;
