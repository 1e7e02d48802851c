//! Pre-execution breakpoint evaluation.
//!
//! The evaluator predicts the memory accesses and control transfer of the
//! instruction about to run and tests them against caller-owned address sets.
//! It only reads registers and memory, so a debugger may call it at any time
//! without disturbing emulation.

use std::collections::HashSet;

use crate::error::{CpuError, Result};
use crate::exec::would_branch;
use crate::memory::Memory;
use crate::opcodes::{Indirect, Instruction, Op, R8, opcode_table};
use crate::registers::Registers;

const CALL_OPCODE: u8 = 0xCD;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreakpointKind {
    #[default]
    None,
    Read,
    Write,
    Jump,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointHit {
    pub kind: BreakpointKind,
    pub addr: u16,
    pub pc: u16,
}

/// Address sets owned by the debugger. The core never mutates them.
#[derive(Debug, Default, Clone)]
pub struct BreakpointSets {
    pub read: HashSet<u16>,
    pub write: HashSet<u16>,
    pub jump: HashSet<u16>,
}

impl BreakpointSets {
    pub fn is_empty(&self) -> bool {
        self.read.is_empty() && self.write.is_empty() && self.jump.is_empty()
    }

    /// Classify `instr` against the sets; see [`check`].
    pub fn check<M: Memory + ?Sized>(
        &self,
        instr: &Instruction,
        regs: &Registers,
        mem: &M,
        ignore_breakpoints: bool,
    ) -> Result<BreakpointKind> {
        check(self, instr, regs, mem, ignore_breakpoints)
    }

    /// Like [`check`], but also reports the matching address.
    pub fn hit<M: Memory + ?Sized>(
        &self,
        instr: &Instruction,
        regs: &Registers,
        mem: &M,
    ) -> Result<Option<BreakpointHit>> {
        let accesses = accesses(instr, regs, mem, 0)?;
        Ok(self.first_hit(&accesses).map(|(kind, addr)| BreakpointHit {
            kind,
            addr,
            pc: instr.addr,
        }))
    }

    /// Accesses are tested in the order the instruction performs them:
    /// reads, then writes, then the control transfer.
    fn first_hit(&self, accesses: &Accesses) -> Option<(BreakpointKind, u16)> {
        let read = accesses
            .reads
            .iter()
            .flatten()
            .find(|addr| self.read.contains(addr))
            .map(|addr| (BreakpointKind::Read, *addr));
        let write = || {
            accesses
                .writes
                .iter()
                .flatten()
                .find(|addr| self.write.contains(addr))
                .map(|addr| (BreakpointKind::Write, *addr))
        };
        let jump = || {
            accesses
                .jump
                .filter(|addr| self.jump.contains(addr))
                .map(|addr| (BreakpointKind::Jump, addr))
        };
        read.or_else(write).or_else(jump)
    }
}

/// Classify the about-to-execute instruction.
///
/// Returns [`BreakpointKind::None`] when nothing matches or when
/// `ignore_breakpoints` is set. Invalid opcodes fault regardless.
pub fn check<M: Memory + ?Sized>(
    sets: &BreakpointSets,
    instr: &Instruction,
    regs: &Registers,
    mem: &M,
    ignore_breakpoints: bool,
) -> Result<BreakpointKind> {
    let accesses = accesses(instr, regs, mem, 0)?;
    if ignore_breakpoints {
        return Ok(BreakpointKind::None);
    }
    Ok(sets
        .first_hit(&accesses)
        .map_or(BreakpointKind::None, |(kind, _)| kind))
}

/// Effective addresses an instruction would touch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Accesses {
    pub reads: [Option<u16>; 2],
    pub writes: [Option<u16>; 2],
    pub jump: Option<u16>,
}

impl Accesses {
    fn read(addr: u16) -> Self {
        Self {
            reads: [Some(addr), None],
            ..Self::default()
        }
    }

    fn write(addr: u16) -> Self {
        Self {
            writes: [Some(addr), None],
            ..Self::default()
        }
    }

    fn read_write(addr: u16) -> Self {
        Self {
            reads: [Some(addr), None],
            writes: [Some(addr), None],
            jump: None,
        }
    }

    fn jump(addr: u16) -> Self {
        Self {
            jump: Some(addr),
            ..Self::default()
        }
    }

    fn stack_push(sp: u16) -> [Option<u16>; 2] {
        [Some(sp.wrapping_sub(1)), Some(sp.wrapping_sub(2))]
    }

    fn stack_pop(sp: u16) -> [Option<u16>; 2] {
        [Some(sp), Some(sp.wrapping_add(1))]
    }
}

fn r8_accesses(r: R8, regs: &Registers, write: bool) -> Accesses {
    match (r, write) {
        (R8::HlInd, false) => Accesses::read(regs.hl()),
        (R8::HlInd, true) => Accesses::write(regs.hl()),
        _ => Accesses::default(),
    }
}

fn indirect_addr(ind: Indirect, regs: &Registers) -> u16 {
    match ind {
        Indirect::Bc => regs.bc(),
        Indirect::De => regs.de(),
        Indirect::HlInc | Indirect::HlDec => regs.hl(),
    }
}

/// Predict the accesses of `instr` for the current register state.
///
/// `RST n` is evaluated as `CALL n`; `depth` bounds that recursion to one level.
pub fn accesses<M: Memory + ?Sized>(
    instr: &Instruction,
    regs: &Registers,
    mem: &M,
    depth: u8,
) -> Result<Accesses> {
    let literal = instr.literal;
    let flags = regs.f();
    let high = |offset: u8| 0xFF00 | offset as u16;

    let accesses = match instr.op() {
        Op::Invalid(opcode) => {
            return Err(CpuError::InvalidInstruction {
                opcode,
                addr: instr.addr,
            });
        }
        Op::Prefix => return Err(CpuError::OpcodeOutOfRange(instr.opcode())),
        Op::StoreA(ind) => Accesses::write(indirect_addr(ind, regs)),
        Op::LoadA(ind) => Accesses::read(indirect_addr(ind, regs)),
        Op::LdR8Imm(r) => r8_accesses(r, regs, true),
        Op::LdR8R8 { dst, src } => {
            let mut acc = r8_accesses(src, regs, false);
            acc.writes = r8_accesses(dst, regs, true).writes;
            acc
        }
        Op::AluR8(_, r) => r8_accesses(r, regs, false),
        Op::Bit(_, R8::HlInd) => Accesses::read(regs.hl()),
        Op::IncR8(R8::HlInd)
        | Op::DecR8(R8::HlInd)
        | Op::Shift(_, R8::HlInd)
        | Op::Res(_, R8::HlInd)
        | Op::Set(_, R8::HlInd) => Accesses::read_write(regs.hl()),
        Op::StoreSp => Accesses {
            writes: [Some(literal), Some(literal.wrapping_add(1))],
            ..Accesses::default()
        },
        Op::StoreHighImm => Accesses::write(high(literal as u8)),
        Op::LoadHighImm => Accesses::read(high(literal as u8)),
        Op::StoreHighC => Accesses::write(high(regs.c)),
        Op::LoadHighC => Accesses::read(high(regs.c)),
        Op::StoreAbs => Accesses::write(literal),
        Op::LoadAbs => Accesses::read(literal),
        Op::Push(_) => Accesses {
            writes: Accesses::stack_push(regs.sp),
            ..Accesses::default()
        },
        Op::Pop(_) => Accesses {
            reads: Accesses::stack_pop(regs.sp),
            ..Accesses::default()
        },
        op @ (Op::Jr(_) | Op::Jp(_)) => match instr.static_target() {
            Some(target) if would_branch(op, flags) => Accesses::jump(target),
            _ => Accesses::default(),
        },
        Op::JpHl => Accesses::jump(regs.hl()),
        op @ Op::Call(_) => {
            if would_branch(op, flags) {
                Accesses {
                    writes: Accesses::stack_push(regs.sp),
                    jump: Some(literal),
                    ..Accesses::default()
                }
            } else {
                Accesses::default()
            }
        }
        op @ (Op::Ret(_) | Op::Reti) => {
            if would_branch(op, flags) {
                Accesses {
                    reads: Accesses::stack_pop(regs.sp),
                    jump: Some(mem.read_word(regs.sp)),
                    ..Accesses::default()
                }
            } else {
                Accesses::default()
            }
        }
        Op::Rst(vector) if depth == 0 => {
            let call = Instruction {
                addr: instr.addr,
                descriptor: opcode_table().base(CALL_OPCODE),
                literal: vector as u16,
            };
            return accesses(&call, regs, mem, depth + 1);
        }
        _ => Accesses::default(),
    };
    Ok(accesses)
}
