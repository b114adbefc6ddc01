//! Translation from assembly source to the machine-code artifact.
//!
//! The pipeline is a deterministic, total function of the source text:
//! tokenise, allocate labels and data cells with a two-counter walk,
//! validate operand shapes against the arity table, resolve label
//! references into immediates, and emit the code and data vectors.
//! Forward references need no fixpoint iteration: the allocation walk
//! binds every label before any reference is resolved.

use std::collections::HashMap;

use crate::asm::{self, RawOperand, SourceTerm, Term};
use crate::error::TranslateError;
use crate::isa::{
    Instruction, Opcode, Operand, OperandType, Program, Register, INTERRUPT_VECTORS,
};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Text,
    Data,
}

/// An operand after register names and label references are classified.
enum Resolved {
    Register(Register),
    Immediate(i32),
}

struct Translator {
    labels: HashMap<String, i32>,
    words: Vec<i32>,
    /// Recorded vector-table writes: (line, cell index, target).
    vectors: Vec<(usize, i32, RawOperand)>,
    code: Vec<Instruction>,
}

/// Translate an assembly program into a machine-code artifact.
pub fn translate(source: &str) -> Result<Program, TranslateError> {
    let terms = asm::parse(source)?;

    let mut translator = Translator {
        labels: HashMap::new(),
        words: Vec::new(),
        vectors: Vec::new(),
        code: Vec::new(),
    };

    translator.allocate(&terms)?;
    translator.emit_code(&terms)?;
    let data = translator.emit_data()?;

    Ok(Program { code: translator.code, data })
}

impl Translator {
    /// First walk: bind labels and lay out data cells.
    ///
    /// Text labels bind to the index of the next instruction to be
    /// emitted; data labels to the address of the next cell to be
    /// allocated. Vector declarations overwrite reserved cells and do
    /// not advance the allocation counter.
    fn allocate(&mut self, terms: &[SourceTerm]) -> Result<(), TranslateError> {
        let mut section = None;
        let mut text_addr: i32 = 0;
        let mut data_addr: i32 = INTERRUPT_VECTORS as i32;

        for SourceTerm { line, term } in terms {
            let line = *line;

            match term {
                Term::SectionText => section = Some(Section::Text),
                Term::SectionData => section = Some(Section::Data),

                Term::Label(name) => {
                    if Register::from_name(name).is_some() {
                        return Err(TranslateError::Link {
                            line,
                            msg: format!("label `{}` shadows a register name", name),
                        });
                    }

                    let addr = match section {
                        Some(Section::Text) => text_addr,
                        Some(Section::Data) => data_addr,
                        None => unreachable!("parser rejects content outside sections"),
                    };

                    if self.labels.insert(name.clone(), addr).is_some() {
                        return Err(TranslateError::Link {
                            line,
                            msg: format!("duplicate label `{}`", name),
                        });
                    }
                }

                Term::Word(value) => {
                    if section != Some(Section::Data) {
                        return Err(TranslateError::Parse {
                            line,
                            msg: "`word` declarations are only valid in section data".to_string(),
                        });
                    }

                    self.words.push(*value);
                    data_addr += 1;
                }

                Term::Vector { index, target } => {
                    if section != Some(Section::Data) {
                        return Err(TranslateError::Parse {
                            line,
                            msg: "interrupt vectors are only valid in section data".to_string(),
                        });
                    }

                    self.vectors.push((line, *index, target.clone()));
                }

                Term::Instr { .. } => {
                    if section != Some(Section::Text) {
                        return Err(TranslateError::Parse {
                            line,
                            msg: "instructions are only valid in section text".to_string(),
                        });
                    }

                    text_addr += 1;
                }
            }
        }

        Ok(())
    }

    /// Second walk: shape-check every instruction and resolve operands.
    fn emit_code(&mut self, terms: &[SourceTerm]) -> Result<(), TranslateError> {
        let mut in_text = false;

        for SourceTerm { line, term } in terms {
            match term {
                Term::SectionText => in_text = true,
                Term::SectionData => in_text = false,
                Term::Instr { opcode, operands } if in_text => {
                    let instruction = self.build_instruction(*line, *opcode, operands)?;
                    self.code.push(instruction);
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn build_instruction(
        &self,
        line: usize,
        opcode: Opcode,
        operands: &[RawOperand],
    ) -> Result<Instruction, TranslateError> {
        let arity = opcode.arity();
        let expected = arity.out as usize + arity.arg1 as usize + arity.arg2 as usize;

        if operands.len() != expected {
            return Err(TranslateError::Shape {
                line,
                msg: format!("`{}` takes exactly {} operand(s)", opcode, expected),
            });
        }

        let mut operands = operands.iter();
        let mut instruction = Instruction::nullary(opcode);

        if arity.out {
            let term = operands.next().unwrap();
            match self.resolve(line, term)? {
                Resolved::Register(reg) if reg.is_writable() => instruction.out = Some(reg),
                Resolved::Register(reg) => {
                    return Err(TranslateError::Shape {
                        line,
                        msg: format!("`{}` is not a writable output register", reg),
                    });
                }
                Resolved::Immediate(_) => {
                    return Err(TranslateError::Shape {
                        line,
                        msg: "output must be a writable register".to_string(),
                    });
                }
            }
        }

        if arity.arg1 {
            let term = operands.next().unwrap();
            match self.resolve(line, term)? {
                Resolved::Register(reg) => instruction.arg1 = Some(reg),
                Resolved::Immediate(_) => {
                    return Err(TranslateError::Shape {
                        line,
                        msg: "constants can only be second arguments".to_string(),
                    });
                }
            }
        }

        if arity.arg2 {
            let term = operands.next().unwrap();
            match self.resolve(line, term)? {
                Resolved::Register(reg) => {
                    instruction.arg2 = Some(Operand::Register(reg));
                    instruction.arg2_type = Some(OperandType::Register);
                }
                Resolved::Immediate(value) => {
                    instruction.arg2 = Some(Operand::Immediate(value));
                    instruction.arg2_type = Some(OperandType::Const);
                }
            }
        }

        Ok(instruction)
    }

    /// Classify a raw operand: register names first, then bound labels
    /// (which become immediates), then literal immediates.
    fn resolve(&self, line: usize, operand: &RawOperand) -> Result<Resolved, TranslateError> {
        match operand {
            RawOperand::Symbol(name) => {
                if let Some(reg) = Register::from_name(name) {
                    return Ok(Resolved::Register(reg));
                }

                match self.labels.get(name) {
                    Some(addr) => Ok(Resolved::Immediate(*addr)),
                    None => Err(TranslateError::Link {
                        line,
                        msg: format!("undefined label `{}`", name),
                    }),
                }
            }
            RawOperand::Immediate(value) => Ok(Resolved::Immediate(*value)),
        }
    }

    /// Lay out the data vector: reserved vector cells, overwritten by the
    /// recorded vector writes, followed by the `word` cells in order.
    fn emit_data(&mut self) -> Result<Vec<i32>, TranslateError> {
        let mut data = vec![0; INTERRUPT_VECTORS];

        for (line, index, target) in &self.vectors {
            let line = *line;

            if !(0..INTERRUPT_VECTORS as i32).contains(index) {
                return Err(TranslateError::Shape {
                    line,
                    msg: format!(
                        "interrupt vector index must be below {}",
                        INTERRUPT_VECTORS
                    ),
                });
            }

            let addr = match self.resolve(line, target)? {
                Resolved::Immediate(addr) if addr >= 0 => addr,
                Resolved::Immediate(_) => {
                    return Err(TranslateError::Shape {
                        line,
                        msg: "interrupt vector target must be a non-negative address".to_string(),
                    });
                }
                Resolved::Register(_) => {
                    return Err(TranslateError::Shape {
                        line,
                        msg: "interrupt vector target must be an address or a label".to_string(),
                    });
                }
            };

            data[*index as usize] = addr;
        }

        data.extend(&self.words);
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_counter_walk_binds_labels() {
        let program = translate(
            "section data\n    first:\n    word 7\n    second:\n    word 9\n\
             section text\n    start:\n    ld r1 first\n    ld r2 second\n    jmp start\n    halt\n",
        )
        .unwrap();

        // Data labels bind past the vector table; text labels to
        // instruction indices.
        assert_eq!(program.data, vec![0, 7, 9]);
        assert_eq!(program.code[0].arg2, Some(Operand::Immediate(1)));
        assert_eq!(program.code[1].arg2, Some(Operand::Immediate(2)));
        assert_eq!(program.code[2].arg2, Some(Operand::Immediate(0)));
    }

    #[test]
    fn vector_declaration_does_not_advance_allocation() {
        let program = translate(
            "section data\n    int 0 isr\n    value:\n    word 42\n\
             section text\n    isr:\n    iret\n    halt\n",
        )
        .unwrap();

        assert_eq!(program.data, vec![0, 42]);
        // `value` still binds to cell 1 even though the vector line
        // precedes it.
        assert_eq!(
            translate(
                "section data\n    int 0 2\n    value:\n    word 42\n\
                 section text\n    ld r1 value\n    halt\n",
            )
            .unwrap()
            .code[0]
                .arg2,
            Some(Operand::Immediate(1)),
        );
    }

    #[test]
    fn duplicate_label_across_sections_is_a_link_error() {
        let err = translate(
            "section data\n    thing:\n    word 1\nsection text\n    thing:\n    halt\n",
        )
        .unwrap_err();

        assert!(matches!(err, TranslateError::Link { .. }));
    }

    #[test]
    fn undefined_label_is_a_link_error() {
        let err = translate("section text\n    jmp foo\n").unwrap_err();
        assert!(matches!(err, TranslateError::Link { .. }));
    }

    #[test]
    fn const_output_is_a_shape_error() {
        let err = translate("section text\n    add 5 r1 r2\n").unwrap_err();
        assert!(matches!(err, TranslateError::Shape { .. }));
    }

    #[test]
    fn r0_and_pc_are_rejected_as_outputs() {
        let err = translate("section text\n    add r0 r1 r2\n").unwrap_err();
        assert!(matches!(err, TranslateError::Shape { .. }));

        let err = translate("section text\n    ld pc 0\n").unwrap_err();
        assert!(matches!(err, TranslateError::Shape { .. }));
    }

    #[test]
    fn const_arg1_is_a_shape_error() {
        let err = translate("section text\n    sv 3 4\n").unwrap_err();
        assert!(matches!(err, TranslateError::Shape { .. }));
    }

    #[test]
    fn wrong_operand_count_is_a_shape_error() {
        let err = translate("section text\n    add r1 r2\n").unwrap_err();
        assert!(matches!(err, TranslateError::Shape { .. }));

        let err = translate("section text\n    iret r1\n").unwrap_err();
        assert!(matches!(err, TranslateError::Shape { .. }));
    }

    #[test]
    fn word_in_text_section_is_rejected() {
        let err = translate("section text\n    word 3\n").unwrap_err();
        assert!(matches!(err, TranslateError::Parse { .. }));
    }

    #[test]
    fn vector_index_out_of_range_is_rejected() {
        let err = translate("section data\n    int 1 0\nsection text\n    halt\n").unwrap_err();
        assert!(matches!(err, TranslateError::Shape { .. }));
    }

    #[test]
    fn register_arg2_keeps_register_tag() {
        let program = translate("section text\n    sv r1 sp\n    halt\n").unwrap();

        assert_eq!(program.code[0].arg2, Some(Operand::Register(Register::Sp)));
        assert_eq!(program.code[0].arg2_type, Some(OperandType::Register));
    }

    #[test]
    fn emitted_artifacts_pass_shape_validation() {
        let source = concat!(
            "section data\n",
            "    int 0 isr\n",
            "    value:\n",
            "    word 11\n",
            "section text\n",
            "    start:\n",
            "    ld r1 value\n",
            "    cmp r2 r1 11\n",
            "    je r2 done\n",
            "    sti\n",
            "    in r3\n",
            "    out r3\n",
            "    sv r3 value\n",
            "    cli\n",
            "    isr:\n",
            "    iret\n",
            "    done:\n",
            "    jmp start\n",
            "    halt\n",
        );

        let program = translate(source).unwrap();

        program.validate().unwrap();
    }

    #[test]
    fn json_roundtrip_preserves_the_artifact() {
        let program =
            translate("section text\n    out 'x'\n    add r1 r0 -3\n    halt\n").unwrap();

        let parsed = Program::from_json(&program.to_json()).unwrap();
        assert_eq!(parsed, program);
    }
}
