//! The hardwired control unit and the simulation driver.
//!
//! Each call to [`ControlUnit::step`] runs one instruction cycle: poll
//! the interrupt flag line, fetch, decode, drive the datapath through
//! the signal sequence of the decoded opcode, and account ticks. The
//! driver ([`ControlUnit::run`]) is a bounded reduction over step
//! results; termination is a [`StopReason`], never an exception-like
//! control flow.

use std::fmt;

use slog::{debug, o, Discard, Logger};

use crate::datapath::{AluOp, DataPath, InputSchedule};
use crate::error::SimError;
use crate::event::{Event, EventDispatcher, EventListener, JournalEntry};
use crate::isa::{Instruction, Opcode, Operand, Program, Register};

/// Upper bound on simulated ticks, guarding tests against
/// nontermination.
pub const DEFAULT_TICK_BUDGET: u64 = 1_000_000;

/// Why the main loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The program executed `halt`.
    Halt,
    /// Interrupts are armed, no handler is active and the input schedule
    /// is empty: the machine has processed its entire input stream.
    InputExhausted,
    /// The tick budget was exceeded.
    BudgetExceeded,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StopReason::Halt => write!(f, "halt"),
            StopReason::InputExhausted => write!(f, "input exhausted"),
            StopReason::BudgetExceeded => write!(f, "tick budget exceeded"),
        }
    }
}

/// Result of a completed simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub output: String,
    pub instr_counter: u64,
    pub ticks: u64,
    pub stop: StopReason,
}

/// The control unit: program counter management, interrupt handling and
/// the tick counter, driving an exclusively-owned [`DataPath`].
pub struct ControlUnit {
    program: Vec<Instruction>,
    data_path: DataPath,
    tick: u64,
    instr_counter: u64,
    interrupts_enabled: bool,
    in_interrupt: bool,
    tick_budget: u64,
    logger: Logger,
    events: EventDispatcher,
}

impl ControlUnit {
    pub fn new(program: Vec<Instruction>, data_path: DataPath) -> ControlUnit {
        ControlUnit::with_logger(program, data_path, Logger::root(Discard, o!()))
    }

    pub fn with_logger(
        program: Vec<Instruction>,
        data_path: DataPath,
        logger: Logger,
    ) -> ControlUnit {
        ControlUnit {
            program,
            data_path,
            tick: 0,
            instr_counter: 0,
            interrupts_enabled: false,
            in_interrupt: false,
            tick_budget: DEFAULT_TICK_BUDGET,
            logger,
            events: EventDispatcher::new(),
        }
    }

    pub fn with_tick_budget(mut self, budget: u64) -> ControlUnit {
        self.tick_budget = budget;
        self
    }

    /// Register an observer for journal and interrupt events.
    pub fn add_listener<L: EventListener + 'static>(&mut self, listener: L) {
        self.events.add_listener(listener);
    }

    pub fn data_path(&self) -> &DataPath {
        &self.data_path
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn instr_counter(&self) -> u64 {
        self.instr_counter
    }

    fn tick(&mut self) {
        self.tick += 1;
    }

    /// Run one instruction cycle.
    ///
    /// Returns `Some` when the machine reached a stop condition, `None`
    /// when execution continues. Fatal errors propagate as `Err`.
    pub fn step(&mut self) -> Result<Option<StopReason>, SimError> {
        if self.tick >= self.tick_budget {
            return Ok(Some(StopReason::BudgetExceeded));
        }

        // The cycle about to run occupies tick `tick + 1` onward; the
        // flag line is sampled against that tick.
        if self.in_interrupt {
            // No queueing and no pending bit: inputs arriving while a
            // handler is active are dropped.
            while let Some(ch) = self.data_path.due_input(self.tick + 1) {
                self.data_path.discard_input();
                debug!(self.logger, "input dropped during handler"; "char" => %ch);
                self.events.dispatch(Event::InterruptDropped { ch });
            }
        } else if self.interrupts_enabled {
            if self.data_path.input_exhausted() {
                return Ok(Some(StopReason::InputExhausted));
            }

            if self.data_path.due_input(self.tick + 1).is_some() {
                self.enter_interrupt()?;
            }
        }

        let pc = self.data_path.register(Register::Pc);
        let instruction = usize::try_from(pc)
            .ok()
            .and_then(|addr| self.program.get(addr))
            .cloned()
            .ok_or(SimError::Memory { addr: pc as i64 })?;

        if instruction.opcode == Opcode::Halt {
            return Ok(Some(StopReason::Halt));
        }

        self.instr_counter += 1;
        self.execute(&instruction)?;
        self.journal(&instruction);

        Ok(None)
    }

    /// Drive the machine until it stops.
    pub fn run(&mut self) -> Result<Summary, SimError> {
        let stop = loop {
            if let Some(stop) = self.step()? {
                break stop;
            }
        };

        debug!(self.logger, "simulation stopped";
            "reason" => %stop,
            "instr_counter" => self.instr_counter,
            "ticks" => self.tick,
        );

        Ok(Summary {
            output: self.data_path.output().to_string(),
            instr_counter: self.instr_counter,
            ticks: self.tick,
            stop,
        })
    }

    /// The interrupt entry micro-sequence: push the return address,
    /// adjust the stack, load the handler address from the vector table
    /// and latch the delivered character for the next `in`.
    fn enter_interrupt(&mut self) -> Result<(), SimError> {
        let saved_pc = self.data_path.register(Register::Pc);
        let saved_sp = self.data_path.register(Register::Sp);

        // data_memory[sp] <- pc
        self.data_path.select_operands(Register::Sp, Register::Pc, Register::R1);
        self.data_path.latch_alu(None);
        self.data_path.execute_alu(AluOp::Left)?;
        self.data_path.write_memory()?;
        self.tick();

        // sp <- sp - 1
        self.data_path.select_operands(Register::Sp, Register::R0, Register::Sp);
        self.data_path.latch_alu(None);
        self.data_path.execute_alu(AluOp::Dec)?;
        self.data_path.latch_output();
        self.tick();

        // pc <- data_memory[vector 0]
        self.data_path.select_operands(Register::R0, Register::R0, Register::Pc);
        self.data_path.latch_alu(Some(0));
        self.data_path.execute_alu(AluOp::Right)?;
        self.data_path.read_memory()?;
        self.data_path.latch_output();
        self.tick();

        self.data_path.deliver_input();
        self.in_interrupt = true;
        self.interrupts_enabled = false;

        debug!(self.logger, "interrupt accepted";
            "tick" => self.tick,
            "saved_pc" => saved_pc,
            "handler" => self.data_path.register(Register::Pc),
        );
        self.events.dispatch(Event::InterruptEntered { saved_pc, sp: saved_sp });

        Ok(())
    }

    fn execute(&mut self, instruction: &Instruction) -> Result<(), SimError> {
        match instruction.opcode {
            Opcode::Add | Opcode::Sub | Opcode::Div | Opcode::Mod | Opcode::Mul | Opcode::Cmp => {
                let (Some(out), Some(arg1), Some(arg2)) =
                    (instruction.out, instruction.arg1, instruction.arg2)
                else {
                    return Err(malformed(instruction));
                };

                match arg2 {
                    Operand::Register(reg) => {
                        self.data_path.select_operands(arg1, reg, out);
                        self.data_path.latch_alu(None);
                    }
                    Operand::Immediate(value) => {
                        self.data_path.select_operands(arg1, Register::R0, out);
                        self.data_path.latch_alu(Some(value));
                    }
                }

                self.data_path.execute_alu(alu_op(instruction.opcode))?;
                self.data_path.latch_output();
                self.tick();
                self.data_path.step_pc();
            }

            Opcode::Je | Opcode::Jne | Opcode::Jmp => {
                let Some(arg2) = instruction.arg2 else {
                    return Err(malformed(instruction));
                };

                let mut taken = true;

                if instruction.opcode != Opcode::Jmp {
                    let Some(arg1) = instruction.arg1 else {
                        return Err(malformed(instruction));
                    };

                    self.data_path.select_operands(arg1, Register::R0, Register::R1);
                    self.data_path.latch_alu(None);
                    self.data_path.execute_alu(AluOp::Cmp)?;
                    self.tick();

                    let zero = self.data_path.zero_flag();
                    taken = if instruction.opcode == Opcode::Je { zero } else { !zero };
                }

                if taken {
                    match arg2 {
                        Operand::Immediate(target) => {
                            self.data_path.select_operands(
                                Register::R0,
                                Register::R0,
                                Register::Pc,
                            );
                            self.data_path.latch_alu(Some(target));
                        }
                        Operand::Register(reg) => {
                            self.data_path.select_operands(Register::R0, reg, Register::Pc);
                            self.data_path.latch_alu(None);
                        }
                    }

                    self.data_path.execute_alu(AluOp::Right)?;
                    self.data_path.latch_output();
                    self.tick();
                } else {
                    self.data_path.step_pc();
                }
            }

            Opcode::Ld => {
                let (Some(out), Some(arg2)) = (instruction.out, instruction.arg2) else {
                    return Err(malformed(instruction));
                };

                match arg2 {
                    Operand::Register(reg) => {
                        self.data_path.select_operands(reg, Register::R0, out);
                        self.data_path.latch_alu(None);
                        self.data_path.execute_alu(AluOp::Left)?;
                    }
                    Operand::Immediate(addr) => {
                        self.data_path.select_operands(Register::R0, Register::R0, out);
                        self.data_path.latch_alu(Some(addr));
                        self.data_path.execute_alu(AluOp::Right)?;
                    }
                }

                self.data_path.read_memory()?;
                self.data_path.latch_output();
                self.tick();
                self.data_path.step_pc();
            }

            Opcode::Sv => {
                let (Some(arg1), Some(arg2)) = (instruction.arg1, instruction.arg2) else {
                    return Err(malformed(instruction));
                };

                match arg2 {
                    Operand::Register(reg) => {
                        self.data_path.select_operands(reg, arg1, Register::R1);
                        self.data_path.latch_alu(None);
                        self.data_path.execute_alu(AluOp::Left)?;
                    }
                    Operand::Immediate(addr) => {
                        self.data_path.select_operands(Register::R0, arg1, Register::R1);
                        self.data_path.latch_alu(Some(addr));
                        self.data_path.execute_alu(AluOp::Right)?;
                    }
                }

                self.data_path.write_memory()?;
                self.tick();
                self.data_path.step_pc();
            }

            Opcode::Out => {
                let Some(arg2) = instruction.arg2 else {
                    return Err(malformed(instruction));
                };

                match arg2 {
                    Operand::Register(reg) => {
                        self.data_path.select_operands(Register::R0, reg, Register::R1);
                        self.data_path.latch_alu(None);
                    }
                    Operand::Immediate(value) => {
                        self.data_path.select_operands(Register::R0, Register::R0, Register::R1);
                        self.data_path.latch_alu(Some(value));
                    }
                }

                self.data_path.execute_alu(AluOp::Right)?;
                self.data_path.print_to_device()?;
                self.tick();
                self.data_path.step_pc();
            }

            Opcode::In => {
                let Some(out) = instruction.out else {
                    return Err(malformed(instruction));
                };

                self.data_path.select_operands(Register::R0, Register::R0, out);
                self.data_path.latch_alu(None);
                self.data_path.execute_alu(AluOp::Nop)?;
                self.data_path.input_from_device()?;
                self.data_path.latch_output();
                self.tick();
                self.data_path.step_pc();
            }

            Opcode::Sti | Opcode::Cli => {
                self.interrupts_enabled = instruction.opcode == Opcode::Sti;
                self.tick();
                self.data_path.step_pc();
            }

            Opcode::Iret => {
                // sp <- sp + 1
                self.data_path.select_operands(Register::Sp, Register::R0, Register::Sp);
                self.data_path.latch_alu(None);
                self.data_path.execute_alu(AluOp::Inc)?;
                self.data_path.latch_output();
                self.tick();

                // pc <- data_memory[sp]
                self.data_path.select_operands(Register::Sp, Register::R0, Register::Pc);
                self.data_path.latch_alu(None);
                self.data_path.execute_alu(AluOp::Left)?;
                self.data_path.read_memory()?;
                self.data_path.latch_output();
                self.tick();

                self.in_interrupt = false;
                self.interrupts_enabled = true;

                self.events.dispatch(Event::InterruptReturned {
                    restored_pc: self.data_path.register(Register::Pc),
                    sp: self.data_path.register(Register::Sp),
                });
            }

            Opcode::Halt | Opcode::Int => return Err(malformed(instruction)),
        }

        Ok(())
    }

    fn journal(&mut self, instruction: &Instruction) {
        let sp = self.data_path.register(Register::Sp);

        let entry = JournalEntry {
            instr_counter: self.instr_counter,
            tick: self.tick,
            pc: self.data_path.register(Register::Pc),
            registers: [
                self.data_path.register(Register::R0),
                self.data_path.register(Register::R1),
                self.data_path.register(Register::R2),
                self.data_path.register(Register::R3),
                self.data_path.register(Register::R4),
            ],
            sp,
            mem_at_sp: usize::try_from(sp)
                .ok()
                .and_then(|addr| self.data_path.memory().get(addr).copied())
                .unwrap_or(0),
            in_interrupt: self.in_interrupt,
            instruction: instruction.to_string(),
        };

        debug!(self.logger, "cycle";
            "instr" => entry.instr_counter,
            "tick" => entry.tick,
            "pc" => entry.pc,
            "r1" => entry.registers[1],
            "r2" => entry.registers[2],
            "r3" => entry.registers[3],
            "r4" => entry.registers[4],
            "sp" => entry.sp,
            "mem[sp]" => entry.mem_at_sp,
            "int" => entry.in_interrupt,
            "op" => %entry.instruction,
        );

        self.events.dispatch(Event::Cycle(entry));
    }
}

fn alu_op(opcode: Opcode) -> AluOp {
    match opcode {
        Opcode::Add => AluOp::Add,
        Opcode::Sub => AluOp::Sub,
        Opcode::Div => AluOp::Div,
        Opcode::Mod => AluOp::Mod,
        Opcode::Mul => AluOp::Mul,
        Opcode::Cmp => AluOp::Cmp,
        _ => AluOp::Nop,
    }
}

fn malformed(instruction: &Instruction) -> SimError {
    SimError::Io(format!("malformed instruction `{}`", instruction))
}

/// Validate an artifact, wire it to an input schedule and run it to
/// completion.
pub fn simulate(
    program: &Program,
    schedule: InputSchedule,
    logger: Logger,
) -> Result<Summary, SimError> {
    program.validate().map_err(SimError::Io)?;

    let data_path = DataPath::new(&program.data, schedule)?;
    let mut control_unit = ControlUnit::with_logger(program.code.clone(), data_path, logger);

    control_unit.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::translate;

    fn run(source: &str, schedule: InputSchedule) -> Summary {
        let program = translate(source).unwrap();
        simulate(&program, schedule, Logger::root(Discard, o!())).unwrap()
    }

    #[test]
    fn conditional_jumps_cost_an_extra_tick_when_taken() {
        let summary = run(
            concat!(
                "section text\n",
                "    start:\n",
                "    je r0 target\n",
                "    target:\n",
                "    je r1 miss\n",
                "    jne r0 miss\n",
                "    miss:\n",
                "    out 'x'\n",
                "    halt\n",
            ),
            Vec::new(),
        );

        // Both je's see a zero operand and are taken, skipping the jne:
        // je(2) + je(2) + out(1) = 3 instructions, 5 ticks.
        assert_eq!(summary.instr_counter, 3);
        assert_eq!(summary.ticks, 5);
        assert_eq!(summary.stop, StopReason::Halt);
    }

    #[test]
    fn jump_through_a_register_uses_its_value() {
        let summary = run(
            concat!(
                "section text\n",
                "    add r1 r0 3\n",
                "    jmp r1\n",
                "    out 'a'\n",
                "    out 'b'\n",
                "    halt\n",
            ),
            Vec::new(),
        );

        assert_eq!(summary.output, "b");
    }

    #[test]
    fn store_through_a_register_addresses_its_value() {
        let summary = run(
            concat!(
                "section data\n",
                "    cell:\n",
                "    word 0\n",
                "section text\n",
                "    add r1 r0 1\n",
                "    add r2 r0 74\n",
                "    sv r2 r1\n",
                "    ld r3 cell\n",
                "    out r3\n",
                "    halt\n",
            ),
            Vec::new(),
        );

        assert_eq!(summary.output, "J");
    }

    #[test]
    fn budget_guard_stops_a_spinning_program() {
        let program = translate("section text\n    spin:\n    jmp spin\n").unwrap();
        let data_path = DataPath::new(&program.data, Vec::new()).unwrap();
        let mut control_unit = ControlUnit::new(program.code, data_path).with_tick_budget(500);

        let summary = control_unit.run().unwrap();
        assert_eq!(summary.stop, StopReason::BudgetExceeded);
        assert_eq!(summary.ticks, 500);
    }

    #[test]
    fn fetch_past_the_program_is_a_memory_error() {
        let program = translate("section text\n    out 'x'\n").unwrap();
        let err = simulate(&program, Vec::new(), Logger::root(Discard, o!())).unwrap_err();

        assert_eq!(err, SimError::Memory { addr: 1 });
    }

    #[test]
    fn in_without_a_delivered_character_is_an_io_error() {
        let program = translate("section text\n    in r1\n    halt\n").unwrap();
        let err = simulate(&program, Vec::new(), Logger::root(Discard, o!())).unwrap_err();

        assert!(matches!(err, SimError::Io(_)));
    }

    #[test]
    fn division_by_zero_is_an_arith_error() {
        let program = translate("section text\n    div r1 r2 0\n    halt\n").unwrap();
        let err = simulate(&program, Vec::new(), Logger::root(Discard, o!())).unwrap_err();

        assert_eq!(err, SimError::Arith);
    }

    #[test]
    fn store_out_of_range_is_a_memory_error() {
        let program = translate("section text\n    sv r1 5000\n    halt\n").unwrap();
        let err = simulate(&program, Vec::new(), Logger::root(Discard, o!())).unwrap_err();

        assert_eq!(err, SimError::Memory { addr: 5000 });
    }
}
