//! Instruction semantics.
//!
//! Handlers see the register file, the memory collaborator and the decoded
//! literal. Control transfers are expressed by writing `next_pc`; handlers
//! never touch `regs.pc`. Anything that belongs to the CPU rather than the
//! register file (IME, HALT, STOP) is reported back as a [`SystemEffect`].

use crate::alu::{self, AluResult, ShiftOp};
use crate::memory::Memory;
use crate::opcodes::{Cond, Indirect, Op, R8, R16, R16Stack};
use crate::registers::{FLAG_C, FLAG_Z, Registers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SystemEffect {
    DisableInterrupts,
    EnableInterrupts,
    ReturnFromInterrupt,
    Halt,
    Stop,
}

pub(crate) struct Exec<'a, M: Memory + ?Sized> {
    pub regs: &'a mut Registers,
    pub mem: &'a mut M,
    pub literal: u16,
    /// Staged PC; initialized to the fall-through address.
    pub next_pc: u16,
    /// Set when a conditional branch is taken, selecting the alternate cost.
    pub taken: bool,
    pub effect: Option<SystemEffect>,
}

/// Read phase of a read-modify-write on memory.
///
/// Holds the byte loaded from memory until the write-back phase; it lives only
/// for the duration of one instruction.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TwoStage {
    addr: u16,
    pub value: u8,
}

impl TwoStage {
    pub fn read<M: Memory + ?Sized>(mem: &M, addr: u16) -> Self {
        Self {
            addr,
            value: mem.read_byte(addr),
        }
    }

    pub fn write_back<M: Memory + ?Sized>(self, mem: &mut M, value: u8) {
        mem.write_byte(self.addr, value);
    }
}

impl<M: Memory + ?Sized> Exec<'_, M> {
    #[inline]
    fn d8(&self) -> u8 {
        self.literal as u8
    }

    fn read_r8(&self, r: R8) -> u8 {
        match r {
            R8::B => self.regs.b,
            R8::C => self.regs.c,
            R8::D => self.regs.d,
            R8::E => self.regs.e,
            R8::H => self.regs.h,
            R8::L => self.regs.l,
            R8::HlInd => self.mem.read_byte(self.regs.hl()),
            R8::A => self.regs.a,
        }
    }

    fn write_r8(&mut self, r: R8, val: u8) {
        match r {
            R8::B => self.regs.b = val,
            R8::C => self.regs.c = val,
            R8::D => self.regs.d = val,
            R8::E => self.regs.e = val,
            R8::H => self.regs.h = val,
            R8::L => self.regs.l = val,
            R8::HlInd => {
                let addr = self.regs.hl();
                self.mem.write_byte(addr, val);
            }
            R8::A => self.regs.a = val,
        }
    }

    /// Read-modify-write of an 8-bit operand. Memory operands go through an
    /// explicit read phase and write-back phase.
    fn modify_r8(&mut self, r: R8, f: impl FnOnce(u8, u8) -> AluResult) {
        let flags = self.regs.f();
        let result = if r == R8::HlInd {
            let stage = TwoStage::read(&*self.mem, self.regs.hl());
            let result = f(stage.value, flags);
            stage.write_back(&mut *self.mem, result.value);
            result
        } else {
            let result = f(self.read_r8(r), flags);
            self.write_r8(r, result.value);
            result
        };
        self.regs.set_f(result.flags);
    }

    fn read_r16(&self, rr: R16) -> u16 {
        match rr {
            R16::Bc => self.regs.bc(),
            R16::De => self.regs.de(),
            R16::Hl => self.regs.hl(),
            R16::Sp => self.regs.sp,
        }
    }

    fn write_r16(&mut self, rr: R16, val: u16) {
        match rr {
            R16::Bc => self.regs.set_bc(val),
            R16::De => self.regs.set_de(val),
            R16::Hl => self.regs.set_hl(val),
            R16::Sp => self.regs.sp = val,
        }
    }

    /// Effective address of `(BC)`, `(DE)`, `(HL+)` or `(HL-)`, applying the
    /// HL post-increment/decrement.
    fn indirect_addr(&mut self, ind: Indirect) -> u16 {
        match ind {
            Indirect::Bc => self.regs.bc(),
            Indirect::De => self.regs.de(),
            Indirect::HlInc => {
                let hl = self.regs.hl();
                self.regs.set_hl(hl.wrapping_add(1));
                hl
            }
            Indirect::HlDec => {
                let hl = self.regs.hl();
                self.regs.set_hl(hl.wrapping_sub(1));
                hl
            }
        }
    }

    fn push(&mut self, val: u16) {
        let [lo, hi] = val.to_le_bytes();
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.mem.write_byte(self.regs.sp, hi);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.mem.write_byte(self.regs.sp, lo);
    }

    fn pop(&mut self) -> u16 {
        let lo = self.mem.read_byte(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(1);
        let hi = self.mem.read_byte(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(1);
        u16::from_le_bytes([lo, hi])
    }

    /// Evaluate a branch condition and record whether the branch is taken.
    fn branch(&mut self, cond: Option<Cond>) -> bool {
        let taken = cond.is_none_or(|cc| cc.holds(self.regs.f()));
        if cond.is_some() {
            self.taken = taken;
        }
        taken
    }

    fn accumulator(&mut self, result: AluResult) {
        self.regs.a = result.value;
        self.regs.set_f(result.flags);
    }
}

pub(crate) fn execute<M: Memory + ?Sized>(ctx: &mut Exec<'_, M>, op: Op) {
    match op {
        Op::Nop => {}
        Op::Stop => ctx.effect = Some(SystemEffect::Stop),
        Op::Halt => ctx.effect = Some(SystemEffect::Halt),
        Op::Di => ctx.effect = Some(SystemEffect::DisableInterrupts),
        Op::Ei => ctx.effect = Some(SystemEffect::EnableInterrupts),
        Op::StoreSp => {
            let addr = ctx.literal;
            let sp = ctx.regs.sp;
            ctx.mem.write_word(addr, sp);
        }
        Op::LdR16Imm(rr) => ctx.write_r16(rr, ctx.literal),
        Op::AddHl(rr) => {
            let (res, flags) = alu::add16(ctx.regs.hl(), ctx.read_r16(rr), ctx.regs.f());
            ctx.regs.set_hl(res);
            ctx.regs.set_f(flags);
        }
        Op::StoreA(ind) => {
            let addr = ctx.indirect_addr(ind);
            ctx.mem.write_byte(addr, ctx.regs.a);
        }
        Op::LoadA(ind) => {
            let addr = ctx.indirect_addr(ind);
            ctx.regs.a = ctx.mem.read_byte(addr);
        }
        Op::IncR16(rr) => ctx.write_r16(rr, ctx.read_r16(rr).wrapping_add(1)),
        Op::DecR16(rr) => ctx.write_r16(rr, ctx.read_r16(rr).wrapping_sub(1)),
        Op::IncR8(r) => ctx.modify_r8(r, alu::inc8),
        Op::DecR8(r) => ctx.modify_r8(r, alu::dec8),
        Op::LdR8Imm(r) => ctx.write_r8(r, ctx.d8()),
        Op::Rlca => ctx.accumulator(ShiftOp::Rlc.apply_accumulator(ctx.regs.a, ctx.regs.f())),
        Op::Rrca => ctx.accumulator(ShiftOp::Rrc.apply_accumulator(ctx.regs.a, ctx.regs.f())),
        Op::Rla => ctx.accumulator(ShiftOp::Rl.apply_accumulator(ctx.regs.a, ctx.regs.f())),
        Op::Rra => ctx.accumulator(ShiftOp::Rr.apply_accumulator(ctx.regs.a, ctx.regs.f())),
        Op::Daa => ctx.accumulator(alu::daa(ctx.regs.a, ctx.regs.f())),
        Op::Cpl => ctx.accumulator(alu::cpl(ctx.regs.a, ctx.regs.f())),
        Op::Scf => ctx.regs.set_f(alu::scf(ctx.regs.f())),
        Op::Ccf => ctx.regs.set_f(alu::ccf(ctx.regs.f())),
        Op::Jr(cond) => {
            if ctx.branch(cond) {
                let offset = ctx.d8() as i8 as u16;
                ctx.next_pc = ctx.next_pc.wrapping_add(offset);
            }
        }
        Op::LdR8R8 { dst, src } => {
            let val = ctx.read_r8(src);
            ctx.write_r8(dst, val);
        }
        Op::AluR8(op, r) => {
            let operand = ctx.read_r8(r);
            ctx.accumulator(op.apply(ctx.regs.a, operand, ctx.regs.f()));
        }
        Op::AluImm(op) => ctx.accumulator(op.apply(ctx.regs.a, ctx.d8(), ctx.regs.f())),
        Op::Ret(cond) => {
            if ctx.branch(cond) {
                ctx.next_pc = ctx.pop();
            }
        }
        Op::Reti => {
            ctx.next_pc = ctx.pop();
            ctx.effect = Some(SystemEffect::ReturnFromInterrupt);
        }
        Op::Pop(rr) => {
            let val = ctx.pop();
            match rr {
                R16Stack::Bc => ctx.regs.set_bc(val),
                R16Stack::De => ctx.regs.set_de(val),
                R16Stack::Hl => ctx.regs.set_hl(val),
                R16Stack::Af => ctx.regs.set_af(val),
            }
        }
        Op::Push(rr) => {
            let val = match rr {
                R16Stack::Bc => ctx.regs.bc(),
                R16Stack::De => ctx.regs.de(),
                R16Stack::Hl => ctx.regs.hl(),
                R16Stack::Af => ctx.regs.af(),
            };
            ctx.push(val);
        }
        Op::Jp(cond) => {
            if ctx.branch(cond) {
                ctx.next_pc = ctx.literal;
            }
        }
        Op::JpHl => ctx.next_pc = ctx.regs.hl(),
        Op::Call(cond) => {
            if ctx.branch(cond) {
                let ret = ctx.next_pc;
                ctx.push(ret);
                ctx.next_pc = ctx.literal;
            }
        }
        Op::Rst(vector) => {
            let ret = ctx.next_pc;
            ctx.push(ret);
            ctx.next_pc = vector as u16;
        }
        Op::StoreHighImm => {
            let addr = 0xFF00 | ctx.d8() as u16;
            ctx.mem.write_byte(addr, ctx.regs.a);
        }
        Op::LoadHighImm => {
            let addr = 0xFF00 | ctx.d8() as u16;
            ctx.regs.a = ctx.mem.read_byte(addr);
        }
        Op::StoreHighC => {
            let addr = 0xFF00 | ctx.regs.c as u16;
            ctx.mem.write_byte(addr, ctx.regs.a);
        }
        Op::LoadHighC => {
            let addr = 0xFF00 | ctx.regs.c as u16;
            ctx.regs.a = ctx.mem.read_byte(addr);
        }
        Op::StoreAbs => {
            let addr = ctx.literal;
            ctx.mem.write_byte(addr, ctx.regs.a);
        }
        Op::LoadAbs => ctx.regs.a = ctx.mem.read_byte(ctx.literal),
        Op::AddSp => {
            let (res, flags) = alu::add_sp(ctx.regs.sp, ctx.d8());
            ctx.regs.sp = res;
            ctx.regs.set_f(flags);
        }
        Op::LdHlSp => {
            let (res, flags) = alu::add_sp(ctx.regs.sp, ctx.d8());
            ctx.regs.set_hl(res);
            ctx.regs.set_f(flags);
        }
        Op::LdSpHl => ctx.regs.sp = ctx.regs.hl(),
        Op::Shift(shift, r) => ctx.modify_r8(r, |v, f| shift.apply(v, f)),
        Op::Bit(n, r) => {
            // Read phase only; BIT never writes its operand back.
            let value = if r == R8::HlInd {
                TwoStage::read(&*ctx.mem, ctx.regs.hl()).value
            } else {
                ctx.read_r8(r)
            };
            ctx.regs.set_f(alu::bit(n, value, ctx.regs.f()));
        }
        Op::Res(n, r) => ctx.modify_r8(r, |v, f| AluResult {
            value: v & !(1 << n),
            flags: f,
        }),
        Op::Set(n, r) => ctx.modify_r8(r, |v, f| AluResult {
            value: v | (1 << n),
            flags: f,
        }),
        // decode resolves CB through the CB table and rejects invalid slots.
        Op::Prefix | Op::Invalid(_) => unreachable!("{op:?} reached execution"),
    }
}

/// Whether the conditional form of `op` would branch with the given flags.
///
/// Used by the breakpoint evaluator, which must predict the path without
/// executing it.
pub(crate) fn would_branch(op: Op, flags: u8) -> bool {
    let cond = match op {
        Op::Jr(cond) | Op::Jp(cond) | Op::Call(cond) | Op::Ret(cond) => cond,
        _ => None,
    };
    cond.is_none_or(|cc| cc.holds(flags & (FLAG_Z | FLAG_C)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::FlatMemory;
    use crate::registers::{FLAG_H, FLAG_N};

    fn run(regs: &mut Registers, mem: &mut FlatMemory, op: Op, literal: u16) -> (u16, bool) {
        let next_pc = regs.pc.wrapping_add(op.length() as u16);
        let mut ctx = Exec {
            regs,
            mem,
            literal,
            next_pc,
            taken: false,
            effect: None,
        };
        execute(&mut ctx, op);
        (ctx.next_pc, ctx.taken)
    }

    #[test]
    fn ld_hl_inc_post_increments() {
        let mut regs = Registers::zeroed();
        let mut mem = FlatMemory::new();
        regs.set_hl(0xC0FF);
        regs.a = 0x42;
        run(&mut regs, &mut mem, Op::StoreA(Indirect::HlInc), 0);
        assert_eq!(mem.read_byte(0xC0FF), 0x42);
        assert_eq!(regs.hl(), 0xC100);
    }

    #[test]
    fn push_pop_round_trip_masks_f() {
        let mut regs = Registers::zeroed();
        let mut mem = FlatMemory::new();
        regs.sp = 0xD000;
        regs.set_bc(0x12FF);
        run(&mut regs, &mut mem, Op::Push(R16Stack::Bc), 0);
        assert_eq!(regs.sp, 0xCFFE);
        assert_eq!(mem.read_byte(0xCFFF), 0x12);
        assert_eq!(mem.read_byte(0xCFFE), 0xFF);
        run(&mut regs, &mut mem, Op::Pop(R16Stack::Af), 0);
        assert_eq!(regs.sp, 0xD000);
        assert_eq!(regs.af(), 0x12F0);
    }

    #[test]
    fn call_pushes_return_address() {
        let mut regs = Registers::zeroed();
        let mut mem = FlatMemory::new();
        regs.pc = 0x0200;
        regs.sp = 0xFFFE;
        let (next, taken) = run(&mut regs, &mut mem, Op::Call(None), 0x1234);
        assert_eq!(next, 0x1234);
        assert!(!taken);
        assert_eq!(mem.read_word(0xFFFC), 0x0203);
    }

    #[test]
    fn conditional_call_not_taken_leaves_stack() {
        let mut regs = Registers::zeroed();
        let mut mem = FlatMemory::new();
        regs.pc = 0x0200;
        regs.sp = 0xFFFE;
        regs.set_f(FLAG_Z);
        let (next, taken) = run(&mut regs, &mut mem, Op::Call(Some(Cond::Nz)), 0x1234);
        assert_eq!(next, 0x0203);
        assert!(!taken);
        assert_eq!(regs.sp, 0xFFFE);
    }

    #[test]
    fn res_and_set_leave_flags() {
        let mut regs = Registers::zeroed();
        let mut mem = FlatMemory::new();
        regs.set_f(FLAG_N | FLAG_H);
        regs.b = 0xFF;
        run(&mut regs, &mut mem, Op::Res(3, R8::B), 0);
        assert_eq!(regs.b, 0xF7);
        run(&mut regs, &mut mem, Op::Set(3, R8::B), 0);
        assert_eq!(regs.b, 0xFF);
        assert_eq!(regs.f(), FLAG_N | FLAG_H);
    }

    #[test]
    fn store_sp_writes_little_endian() {
        let mut regs = Registers::zeroed();
        let mut mem = FlatMemory::new();
        regs.sp = 0xABCD;
        run(&mut regs, &mut mem, Op::StoreSp, 0xC000);
        assert_eq!(mem.read_byte(0xC000), 0xCD);
        assert_eq!(mem.read_byte(0xC001), 0xAB);
    }

    #[test]
    fn would_branch_tracks_flags() {
        assert!(would_branch(Op::Jp(None), 0));
        assert!(would_branch(Op::Jr(Some(Cond::C)), FLAG_C));
        assert!(!would_branch(Op::Ret(Some(Cond::Nz)), FLAG_Z));
    }
}
