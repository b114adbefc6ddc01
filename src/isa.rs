//! Types describing the instruction set and the machine-code artifact.
//!
//! Both the translator and the simulator consult the same operand-arity
//! table ([`Opcode::arity`]), so a program that translates cleanly is
//! guaranteed to decode cleanly.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of cells reserved at the bottom of data memory for the
/// interrupt vector table. The machine has a single input device.
pub const INTERRUPT_VECTORS: usize = 1;

/// Instructions of the processor, plus the `int` pseudo-op which may
/// only appear in `section data` and is never emitted into code memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Opcode {
    Add,
    Sub,
    Div,
    Mod,
    Mul,
    Cmp,

    Je,
    Jne,
    Jmp,

    Out,
    In,

    Ld,
    Sv,

    Iret,
    Sti,
    Cli,

    Halt,

    /// Interrupt vector declaration. Data section only.
    Int,
}

impl Opcode {
    pub fn from_mnemonic(s: &str) -> Option<Opcode> {
        let op = match s {
            "add" => Opcode::Add,
            "sub" => Opcode::Sub,
            "div" => Opcode::Div,
            "mod" => Opcode::Mod,
            "mul" => Opcode::Mul,
            "cmp" => Opcode::Cmp,
            "je" => Opcode::Je,
            "jne" => Opcode::Jne,
            "jmp" => Opcode::Jmp,
            "out" => Opcode::Out,
            "in" => Opcode::In,
            "ld" => Opcode::Ld,
            "sv" => Opcode::Sv,
            "iret" => Opcode::Iret,
            "sti" => Opcode::Sti,
            "cli" => Opcode::Cli,
            "halt" => Opcode::Halt,
            "int" => Opcode::Int,
            _ => return None,
        };

        Some(op)
    }

    /// Operand slots this opcode requires. The table is the single
    /// source of truth for both translation and artifact validation.
    pub fn arity(self) -> Arity {
        use Opcode::*;

        match self {
            Add | Sub | Div | Mod | Mul | Cmp => Arity { out: true, arg1: true, arg2: true },
            Je | Jne => Arity { out: false, arg1: true, arg2: true },
            Jmp | Out => Arity { out: false, arg1: false, arg2: true },
            Ld => Arity { out: true, arg1: false, arg2: true },
            Sv => Arity { out: false, arg1: true, arg2: true },
            In => Arity { out: true, arg1: false, arg2: false },
            Iret | Sti | Cli | Halt | Int => Arity { out: false, arg1: false, arg2: false },
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Div => "div",
            Opcode::Mod => "mod",
            Opcode::Mul => "mul",
            Opcode::Cmp => "cmp",
            Opcode::Je => "je",
            Opcode::Jne => "jne",
            Opcode::Jmp => "jmp",
            Opcode::Out => "out",
            Opcode::In => "in",
            Opcode::Ld => "ld",
            Opcode::Sv => "sv",
            Opcode::Iret => "iret",
            Opcode::Sti => "sti",
            Opcode::Cli => "cli",
            Opcode::Halt => "halt",
            Opcode::Int => "int",
        };

        write!(f, "{}", name)
    }
}

/// Operand slots demanded by an opcode. `out` additionally requires a
/// writable register; `arg1` any register; `arg2` a register or an
/// immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub out: bool,
    pub arg1: bool,
    pub arg2: bool,
}

/// Registers of the machine.
///
/// `r0` reads as zero and ignores writes. `pc` is written only by
/// control-unit driven paths (jumps, `iret`, the fetch increment) and is
/// never a valid `out` operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Register {
    R0,
    R1,
    R2,
    R3,
    R4,
    Sp,
    Pc,
}

impl Register {
    pub fn from_name(s: &str) -> Option<Register> {
        let reg = match s {
            "r0" => Register::R0,
            "r1" => Register::R1,
            "r2" => Register::R2,
            "r3" => Register::R3,
            "r4" => Register::R4,
            "sp" => Register::Sp,
            "pc" => Register::Pc,
            _ => return None,
        };

        Some(reg)
    }

    pub fn index(self) -> usize {
        match self {
            Register::R0 => 0,
            Register::R1 => 1,
            Register::R2 => 2,
            Register::R3 => 3,
            Register::R4 => 4,
            Register::Sp => 5,
            Register::Pc => 6,
        }
    }

    /// True for registers that may appear in an instruction's `out` slot.
    pub fn is_writable(self) -> bool {
        !matches!(self, Register::R0 | Register::Pc)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Register::R0 => "r0",
            Register::R1 => "r1",
            Register::R2 => "r2",
            Register::R3 => "r3",
            Register::R4 => "r4",
            Register::Sp => "sp",
            Register::Pc => "pc",
        };

        write!(f, "{}", name)
    }
}

/// Tag recorded in the artifact for the `arg2` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperandType {
    Register,
    Const,
}

/// The `arg2` operand: either a register or an immediate encoded in the
/// instruction. Serialized untagged, so registers appear as strings and
/// immediates as numbers; `arg2_type` carries the discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Register(Register),
    Immediate(i32),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operand::Register(reg) => write!(f, "{}", reg),
            Operand::Immediate(value) => write!(f, "{}", value),
        }
    }
}

/// A single decoded instruction. Fields that the opcode's arity does not
/// use are `None` and omitted from the JSON artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub out: Option<Register>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub arg1: Option<Register>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub arg2: Option<Operand>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub arg2_type: Option<OperandType>,
}

impl Instruction {
    pub fn nullary(opcode: Opcode) -> Instruction {
        Instruction {
            opcode,
            out: None,
            arg1: None,
            arg2: None,
            arg2_type: None,
        }
    }

    /// Check the present fields against the arity table.
    ///
    /// Used to reject hand-crafted artifacts before simulation; programs
    /// produced by the translator always pass.
    pub fn check_shape(&self) -> Result<(), String> {
        if self.opcode == Opcode::Int {
            return Err("`int` is a data-section pseudo-op, not an instruction".to_string());
        }

        let arity = self.opcode.arity();

        if arity.out != self.out.is_some() {
            return Err(format!("`{}`: invalid `out` operand", self.opcode));
        }

        if arity.arg1 != self.arg1.is_some() {
            return Err(format!("`{}`: invalid `arg1` operand", self.opcode));
        }

        if arity.arg2 != self.arg2.is_some() || arity.arg2 != self.arg2_type.is_some() {
            return Err(format!("`{}`: invalid `arg2` operand", self.opcode));
        }

        if let Some(out) = self.out {
            if !out.is_writable() {
                return Err(format!("`{}`: `{}` is not a writable register", self.opcode, out));
            }
        }

        match (self.arg2, self.arg2_type) {
            (Some(Operand::Register(_)), Some(OperandType::Const))
            | (Some(Operand::Immediate(_)), Some(OperandType::Register)) => {
                Err(format!("`{}`: `arg2` does not match `arg2_type`", self.opcode))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.opcode)?;

        if let Some(out) = self.out {
            write!(f, " {}", out)?;
        }

        if let Some(arg1) = self.arg1 {
            write!(f, " {}", arg1)?;
        }

        if let Some(arg2) = self.arg2 {
            write!(f, " {}", arg2)?;
        }

        Ok(())
    }
}

/// The machine-code artifact: code memory and initialised data memory.
///
/// `data[0 .. INTERRUPT_VECTORS]` is the interrupt vector table, followed
/// by the `word` declarations in source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub code: Vec<Instruction>,
    pub data: Vec<i32>,
}

impl Program {
    /// Parse an artifact from its JSON representation.
    pub fn from_json(json: &str) -> Result<Program, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Render the artifact as pretty-printed JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("artifact serialization cannot fail")
    }

    /// Validate every instruction against the arity table.
    pub fn validate(&self) -> Result<(), String> {
        for (addr, instruction) in self.code.iter().enumerate() {
            instruction
                .check_shape()
                .map_err(|err| format!("instruction {}: {}", addr, err))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unused_operand_fields_are_omitted() {
        let json = serde_json::to_string(&Instruction::nullary(Opcode::Iret)).unwrap();
        assert_eq!(json, r#"{"opcode":"iret"}"#);
    }

    #[test]
    fn arg2_register_roundtrips_as_string() {
        let instruction = Instruction {
            opcode: Opcode::Jmp,
            out: None,
            arg1: None,
            arg2: Some(Operand::Register(Register::Sp)),
            arg2_type: Some(OperandType::Register),
        };

        let json = serde_json::to_string(&instruction).unwrap();
        assert_eq!(json, r#"{"opcode":"jmp","arg2":"sp","arg2_type":"register"}"#);

        let parsed: Instruction = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, instruction);
    }

    #[test]
    fn arg2_immediate_roundtrips_as_number() {
        let instruction = Instruction {
            opcode: Opcode::Out,
            out: None,
            arg1: None,
            arg2: Some(Operand::Immediate(104)),
            arg2_type: Some(OperandType::Const),
        };

        let parsed: Instruction =
            serde_json::from_str(&serde_json::to_string(&instruction).unwrap()).unwrap();
        assert_eq!(parsed.arg2, Some(Operand::Immediate(104)));
    }

    #[test]
    fn shape_check_rejects_mismatched_tag() {
        let instruction = Instruction {
            opcode: Opcode::Jmp,
            out: None,
            arg1: None,
            arg2: Some(Operand::Immediate(3)),
            arg2_type: Some(OperandType::Register),
        };

        assert!(instruction.check_shape().is_err());
    }

    #[test]
    fn shape_check_rejects_unwritable_out() {
        let instruction = Instruction {
            opcode: Opcode::Ld,
            out: Some(Register::Pc),
            arg1: None,
            arg2: Some(Operand::Immediate(1)),
            arg2_type: Some(OperandType::Const),
        };

        assert!(instruction.check_shape().is_err());
    }
}
