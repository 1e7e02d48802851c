use log::{debug, warn};

use crate::breakpoints::{self, BreakpointHit, BreakpointKind, BreakpointSets};
use crate::error::Result;
use crate::exec::{self, Exec, SystemEffect};
use crate::interrupts::{Interrupt, InterruptController};
use crate::memory::Memory;
use crate::opcodes::{Instruction, decode, fetch_and_decode};
use crate::registers::Registers;

/// T-cycles spent per step while halted.
const HALT_IDLE_CYCLES: u64 = 4;
/// T-cycles spent entering an interrupt handler.
const INTERRUPT_DISPATCH_CYCLES: u64 = 20;

pub struct Cpu {
    pub regs: Registers,
    cycles: u64,
    interrupts: InterruptController,
    halted: bool,
    stopped: bool,
    /// HALT ran with IME clear, no EI in flight and an interrupt pending: the next
    /// opcode fetch does not advance PC.
    halt_bug: bool,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    /// A CPU in the DMG post-boot state.
    pub fn new() -> Self {
        Self::with_registers(Registers::power_on())
    }

    pub fn with_registers(regs: Registers) -> Self {
        Self {
            regs,
            cycles: 0,
            interrupts: InterruptController::default(),
            halted: false,
            stopped: false,
            halt_bug: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn ime(&self) -> bool {
        self.interrupts.ime()
    }

    pub fn set_ime(&mut self, value: bool) {
        self.interrupts.set_ime(value);
    }

    /// Total T-cycles executed since construction or reset.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Low 16 bits of the cycle counter.
    pub fn clock(&self) -> u16 {
        self.cycles as u16
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    pub fn stopped(&self) -> bool {
        self.stopped
    }

    /// Leave STOP mode, as a joypad press would.
    pub fn resume_from_stop(&mut self) {
        self.stopped = false;
    }

    pub fn request_interrupt<M: Memory + ?Sized>(&mut self, mem: &mut M, irq: Interrupt) {
        InterruptController::request(mem, irq);
    }

    pub fn debug_state(&self) -> String {
        format!(
            "AF:{:04X} BC:{:04X} DE:{:04X} HL:{:04X} PC:{:04X} SP:{:04X} CY:{}",
            self.regs.af(),
            self.regs.bc(),
            self.regs.de(),
            self.regs.hl(),
            self.regs.pc,
            self.regs.sp,
            self.cycles
        )
    }

    /// Decode the instruction at PC without side effects.
    pub fn current_instruction<M: Memory + ?Sized>(&self, mem: &M) -> Result<Instruction> {
        let pc = self.regs.pc;
        if self.halt_bug {
            let bytes = [
                mem.read_byte(pc),
                mem.read_byte(pc),
                mem.read_byte(pc.wrapping_add(1)),
            ];
            decode(bytes, pc)
        } else {
            fetch_and_decode(mem, pc)
        }
    }

    /// Execute one instruction, or idle one slot while halted.
    ///
    /// An invalid opcode leaves the CPU and memory untouched and returns the
    /// fault.
    pub fn step<M: Memory + ?Sized>(&mut self, mem: &mut M) -> Result<()> {
        if self.stopped {
            return Ok(());
        }

        if self.halted {
            self.cycles += HALT_IDLE_CYCLES;
            if InterruptController::pending(mem) != 0 {
                self.halted = false;
                self.service_interrupts(mem);
            }
            return Ok(());
        }

        let instr = self.current_instruction(mem).inspect_err(|e| {
            warn!("{e} ({})", self.debug_state());
        })?;

        #[cfg(feature = "cpu-trace")]
        log::trace!("{:04X}: {:<16} {}", instr.addr, instr.text(), self.debug_state());

        let mut next_pc = instr.next_addr();
        if self.halt_bug {
            self.halt_bug = false;
            next_pc = next_pc.wrapping_sub(1);
        }

        let descriptor = instr.descriptor;
        let (taken, effect) = {
            let mut ctx = Exec {
                regs: &mut self.regs,
                mem: &mut *mem,
                literal: instr.literal,
                next_pc,
                taken: false,
                effect: None,
            };
            exec::execute(&mut ctx, descriptor.op);
            next_pc = ctx.next_pc;
            (ctx.taken, ctx.effect)
        };

        self.regs.pc = next_pc;
        let cost = if taken {
            descriptor.alt_cycles
        } else {
            descriptor.cycles
        };
        self.cycles += cost as u64;

        if let Some(effect) = effect {
            self.apply_effect(mem, effect);
        }
        self.interrupts.instruction_retired();

        if !self.halted {
            self.service_interrupts(mem);
        }
        Ok(())
    }

    fn apply_effect<M: Memory + ?Sized>(&mut self, mem: &M, effect: SystemEffect) {
        match effect {
            SystemEffect::DisableInterrupts => self.interrupts.di(),
            SystemEffect::EnableInterrupts => self.interrupts.ei(),
            SystemEffect::ReturnFromInterrupt => self.interrupts.reti(),
            SystemEffect::Halt => {
                let pending = InterruptController::pending(mem) != 0;
                if !self.interrupts.ime() && pending && self.interrupts.enable_pending() {
                    // IME switches on when this step retires and the pending
                    // interrupt dispatches at once. The handler returns to HALT.
                    self.regs.pc = self.regs.pc.wrapping_sub(1);
                    debug!("HALT after EI at {:04X}", self.regs.pc);
                } else if !self.interrupts.ime() && pending {
                    debug!("halt bug at {:04X}", self.regs.pc);
                    self.halt_bug = true;
                } else if !pending {
                    debug!("HALT at {:04X}", self.regs.pc.wrapping_sub(1));
                    self.halted = true;
                }
            }
            SystemEffect::Stop => {
                debug!("STOP at {:04X}", self.regs.pc.wrapping_sub(2));
                self.stopped = true;
            }
        }
    }

    /// Enter the highest-priority pending handler if IME allows it.
    fn service_interrupts<M: Memory + ?Sized>(&mut self, mem: &mut M) {
        if !self.interrupts.ime() {
            return;
        }
        let Some(irq) = Interrupt::highest(InterruptController::pending(mem)) else {
            return;
        };

        self.interrupts.set_ime(false);
        InterruptController::acknowledge(mem, irq);

        let [lo, hi] = self.regs.pc.to_le_bytes();
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        mem.write_byte(self.regs.sp, hi);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        mem.write_byte(self.regs.sp, lo);

        debug!(
            "interrupt {irq:?}: {:04X} -> {:04X}",
            self.regs.pc,
            irq.vector()
        );
        self.regs.pc = irq.vector();
        self.cycles += INTERRUPT_DISPATCH_CYCLES;
    }

    /// Classify the instruction at PC against the debugger's breakpoints.
    pub fn check_breakpoints<M: Memory + ?Sized>(
        &self,
        mem: &M,
        sets: &BreakpointSets,
        ignore_breakpoints: bool,
    ) -> Result<BreakpointKind> {
        let instr = self.current_instruction(mem)?;
        breakpoints::check(sets, &instr, &self.regs, mem, ignore_breakpoints)
    }

    /// Step unless the next instruction trips a breakpoint, in which case
    /// nothing is executed and the hit is returned.
    pub fn step_with_breakpoints<M: Memory + ?Sized>(
        &mut self,
        mem: &mut M,
        sets: &BreakpointSets,
        ignore_breakpoints: bool,
    ) -> Result<Option<BreakpointHit>> {
        if !ignore_breakpoints && !self.halted && !self.stopped && !sets.is_empty() {
            let instr = self.current_instruction(mem)?;
            if let Some(hit) = sets.hit(&instr, &self.regs, mem)? {
                debug!("breakpoint {:?} at {:04X} (pc {:04X})", hit.kind, hit.addr, hit.pc);
                return Ok(Some(hit));
            }
        }
        self.step(mem)?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CpuError;
    use crate::interrupts::{IE_ADDR, IF_ADDR};
    use crate::memory::FlatMemory;

    fn cpu_at(pc: u16) -> Cpu {
        let mut regs = Registers::zeroed();
        regs.pc = pc;
        regs.sp = 0xFFFE;
        Cpu::with_registers(regs)
    }

    fn program(addr: u16, code: &[u8]) -> FlatMemory {
        let mut mem = FlatMemory::new();
        mem.load(addr, code);
        mem
    }

    #[test]
    fn conditional_jump_uses_alternate_cost_when_taken() {
        let mut mem = program(0x0100, &[0x20, 0x05, 0x20, 0x05]); // JR NZ,+5 twice
        let mut cpu = cpu_at(0x0100);
        cpu.step(&mut mem).unwrap();
        assert_eq!(cpu.regs.pc, 0x0107);
        assert_eq!(cpu.cycles(), 12);

        let mut cpu = cpu_at(0x0102);
        cpu.regs.set_f(crate::registers::FLAG_Z);
        cpu.step(&mut mem).unwrap();
        assert_eq!(cpu.regs.pc, 0x0104);
        assert_eq!(cpu.cycles(), 8);
    }

    #[test]
    fn invalid_opcode_does_not_mutate() {
        let mut mem = program(0x0200, &[0xDD]);
        let mut cpu = cpu_at(0x0200);
        let err = cpu.step(&mut mem).unwrap_err();
        assert_eq!(
            err,
            CpuError::InvalidInstruction {
                opcode: 0xDD,
                addr: 0x0200
            }
        );
        assert_eq!(cpu.regs.pc, 0x0200);
        assert_eq!(cpu.cycles(), 0);
    }

    #[test]
    fn ei_delays_by_one_instruction() {
        // EI; NOP; NOP with a pending timer interrupt.
        let mut mem = program(0x0100, &[0xFB, 0x00, 0x00]);
        mem.write_byte(IE_ADDR, 0x04);
        mem.write_byte(IF_ADDR, 0x04);
        let mut cpu = cpu_at(0x0100);

        cpu.step(&mut mem).unwrap();
        assert_eq!(cpu.regs.pc, 0x0101);
        assert!(!cpu.ime());

        cpu.step(&mut mem).unwrap();
        assert_eq!(cpu.regs.pc, 0x0050);
        assert_eq!(mem.read_word(cpu.regs.sp), 0x0102);
        assert_eq!(mem.read_byte(IF_ADDR) & 0x04, 0);
        assert!(!cpu.ime());
        assert_eq!(cpu.cycles(), 4 + 4 + 20);
    }

    #[test]
    fn halt_waits_for_interrupt() {
        let mut mem = program(0x0100, &[0x76, 0x00]);
        mem.write_byte(IE_ADDR, 0x01);
        let mut cpu = cpu_at(0x0100);
        cpu.set_ime(true);

        cpu.step(&mut mem).unwrap();
        assert!(cpu.halted());
        cpu.step(&mut mem).unwrap();
        assert!(cpu.halted());
        assert_eq!(cpu.cycles(), 8);

        cpu.request_interrupt(&mut mem, Interrupt::VBlank);
        cpu.step(&mut mem).unwrap();
        assert!(!cpu.halted());
        assert_eq!(cpu.regs.pc, 0x0040);
        assert_eq!(mem.read_word(cpu.regs.sp), 0x0101);
    }

    #[test]
    fn halt_bug_repeats_next_byte() {
        // HALT; INC A; with IME clear and VBlank already pending.
        let mut mem = program(0x0100, &[0x76, 0x3C, 0x00]);
        mem.write_byte(IE_ADDR, 0x01);
        mem.write_byte(IF_ADDR, 0x01);
        let mut cpu = cpu_at(0x0100);

        cpu.step(&mut mem).unwrap();
        assert!(!cpu.halted());
        cpu.step(&mut mem).unwrap();
        assert_eq!(cpu.regs.pc, 0x0101);
        cpu.step(&mut mem).unwrap();
        assert_eq!(cpu.regs.pc, 0x0102);
        assert_eq!(cpu.regs.a, 2);
    }

    #[test]
    fn stop_freezes_until_resumed() {
        let mut mem = program(0x0100, &[0x10, 0x00, 0x3C]);
        let mut cpu = cpu_at(0x0100);
        cpu.step(&mut mem).unwrap();
        assert!(cpu.stopped());
        let pc = cpu.regs.pc;
        cpu.step(&mut mem).unwrap();
        assert_eq!(cpu.regs.pc, pc);
        cpu.resume_from_stop();
        cpu.step(&mut mem).unwrap();
        assert_eq!(cpu.regs.a, 1);
    }

    #[test]
    fn breakpoint_blocks_execution() {
        let mut mem = program(0x0100, &[0xEA, 0x00, 0xC0]); // LD ($C000),A
        let mut cpu = cpu_at(0x0100);
        cpu.regs.a = 0x5A;
        let mut sets = BreakpointSets::default();
        sets.write.insert(0xC000);

        let hit = cpu.step_with_breakpoints(&mut mem, &sets, false).unwrap();
        assert_eq!(hit.map(|h| h.kind), Some(BreakpointKind::Write));
        assert_eq!(cpu.regs.pc, 0x0100);
        assert_eq!(mem.read_byte(0xC000), 0);

        let hit = cpu.step_with_breakpoints(&mut mem, &sets, true).unwrap();
        assert!(hit.is_none());
        assert_eq!(mem.read_byte(0xC000), 0x5A);
    }

    #[test]
    fn debug_state_matches_register_file() {
        let cpu = Cpu::new();
        assert_eq!(
            cpu.debug_state(),
            "AF:01B0 BC:0013 DE:00D8 HL:014D PC:0100 SP:FFFE CY:0"
        );
    }

    #[test]
    fn clock_wraps_at_16_bits() {
        let mut cpu = cpu_at(0);
        cpu.cycles = 0x1_0004;
        assert_eq!(cpu.clock(), 4);
    }
}
