//! The opcode descriptor table.
//!
//! Every one of the 256 base and 256 CB-prefixed opcodes is described exactly
//! once here: operation, length, timing, category and mnemonic. The execution
//! engine, the breakpoint evaluator and the disassembler all read from the same
//! table.

use std::fmt;
use std::sync::OnceLock;

use crate::alu::{AluOp, ShiftOp};
use crate::error::{CpuError, Result};
use crate::memory::Memory;
use crate::registers::{FLAG_C, FLAG_Z};

/// 8-bit operand slot, in encoding order. `HlInd` is the byte at (HL).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum R8 {
    B,
    C,
    D,
    E,
    H,
    L,
    HlInd,
    A,
}

impl R8 {
    pub const fn from_index(index: u8) -> Self {
        match index & 0x07 {
            0 => R8::B,
            1 => R8::C,
            2 => R8::D,
            3 => R8::E,
            4 => R8::H,
            5 => R8::L,
            6 => R8::HlInd,
            _ => R8::A,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            R8::B => "B",
            R8::C => "C",
            R8::D => "D",
            R8::E => "E",
            R8::H => "H",
            R8::L => "L",
            R8::HlInd => "(HL)",
            R8::A => "A",
        }
    }
}

/// 16-bit register pair as used by LD/INC/DEC/ADD HL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum R16 {
    Bc,
    De,
    Hl,
    Sp,
}

impl R16 {
    const fn from_index(index: u8) -> Self {
        match index & 0x03 {
            0 => R16::Bc,
            1 => R16::De,
            2 => R16::Hl,
            _ => R16::Sp,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            R16::Bc => "BC",
            R16::De => "DE",
            R16::Hl => "HL",
            R16::Sp => "SP",
        }
    }
}

/// 16-bit register pair as used by PUSH/POP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum R16Stack {
    Bc,
    De,
    Hl,
    Af,
}

impl R16Stack {
    const fn from_index(index: u8) -> Self {
        match index & 0x03 {
            0 => R16Stack::Bc,
            1 => R16Stack::De,
            2 => R16Stack::Hl,
            _ => R16Stack::Af,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            R16Stack::Bc => "BC",
            R16Stack::De => "DE",
            R16Stack::Hl => "HL",
            R16Stack::Af => "AF",
        }
    }
}

/// Address operand of `LD (rr),A` / `LD A,(rr)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indirect {
    Bc,
    De,
    HlInc,
    HlDec,
}

impl Indirect {
    const fn from_index(index: u8) -> Self {
        match index & 0x03 {
            0 => Indirect::Bc,
            1 => Indirect::De,
            2 => Indirect::HlInc,
            _ => Indirect::HlDec,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Indirect::Bc => "(BC)",
            Indirect::De => "(DE)",
            Indirect::HlInc => "(HL+)",
            Indirect::HlDec => "(HL-)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Nz,
    Z,
    Nc,
    C,
}

impl Cond {
    const fn from_index(index: u8) -> Self {
        match index & 0x03 {
            0 => Cond::Nz,
            1 => Cond::Z,
            2 => Cond::Nc,
            _ => Cond::C,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Cond::Nz => "NZ",
            Cond::Z => "Z",
            Cond::Nc => "NC",
            Cond::C => "C",
        }
    }

    /// Whether the condition holds for the given F register value.
    #[inline]
    pub fn holds(self, flags: u8) -> bool {
        match self {
            Cond::Nz => flags & FLAG_Z == 0,
            Cond::Z => flags & FLAG_Z != 0,
            Cond::Nc => flags & FLAG_C == 0,
            Cond::C => flags & FLAG_C != 0,
        }
    }
}

/// Decoded operation. `None` conditions mean the unconditional form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Nop,
    Stop,
    Halt,
    Di,
    Ei,
    /// LD (a16),SP
    StoreSp,
    LdR16Imm(R16),
    AddHl(R16),
    StoreA(Indirect),
    LoadA(Indirect),
    IncR16(R16),
    DecR16(R16),
    IncR8(R8),
    DecR8(R8),
    LdR8Imm(R8),
    Rlca,
    Rrca,
    Rla,
    Rra,
    Daa,
    Cpl,
    Scf,
    Ccf,
    Jr(Option<Cond>),
    LdR8R8 { dst: R8, src: R8 },
    AluR8(AluOp, R8),
    AluImm(AluOp),
    Ret(Option<Cond>),
    Reti,
    Pop(R16Stack),
    Push(R16Stack),
    Jp(Option<Cond>),
    JpHl,
    Call(Option<Cond>),
    Rst(u8),
    /// LDH (a8),A
    StoreHighImm,
    /// LDH A,(a8)
    LoadHighImm,
    /// LDH (C),A
    StoreHighC,
    /// LDH A,(C)
    LoadHighC,
    /// LD (a16),A
    StoreAbs,
    /// LD A,(a16)
    LoadAbs,
    AddSp,
    /// LD HL,SP+e8
    LdHlSp,
    LdSpHl,
    /// The 0xCB escape in the base table.
    Prefix,
    Shift(ShiftOp, R8),
    Bit(u8, R8),
    Res(u8, R8),
    Set(u8, R8),
    Invalid(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Normal,
    UnconditionalJump,
    ConditionalJump,
    UnconditionalCall,
    ConditionalCall,
    Restart,
    Return,
    ReturnFromInterrupt,
    TwoStageMemoryOp,
    Prefix,
    Invalid,
}

impl Op {
    pub fn category(&self) -> Category {
        match *self {
            Op::Jr(None) | Op::Jp(None) | Op::JpHl => Category::UnconditionalJump,
            Op::Jr(Some(_)) | Op::Jp(Some(_)) => Category::ConditionalJump,
            Op::Call(None) => Category::UnconditionalCall,
            Op::Call(Some(_)) => Category::ConditionalCall,
            Op::Rst(_) => Category::Restart,
            Op::Ret(_) => Category::Return,
            Op::Reti => Category::ReturnFromInterrupt,
            Op::IncR8(R8::HlInd)
            | Op::DecR8(R8::HlInd)
            | Op::Shift(_, R8::HlInd)
            | Op::Bit(_, R8::HlInd)
            | Op::Res(_, R8::HlInd)
            | Op::Set(_, R8::HlInd) => Category::TwoStageMemoryOp,
            Op::Prefix => Category::Prefix,
            Op::Invalid(_) => Category::Invalid,
            _ => Category::Normal,
        }
    }

    /// Instruction length in bytes, counting the CB prefix for CB opcodes.
    pub fn length(&self) -> u8 {
        match *self {
            Op::Stop
            | Op::LdR8Imm(_)
            | Op::Jr(_)
            | Op::AluImm(_)
            | Op::StoreHighImm
            | Op::LoadHighImm
            | Op::AddSp
            | Op::LdHlSp
            | Op::Shift(..)
            | Op::Bit(..)
            | Op::Res(..)
            | Op::Set(..) => 2,
            Op::StoreSp
            | Op::LdR16Imm(_)
            | Op::Jp(_)
            | Op::Call(_)
            | Op::StoreAbs
            | Op::LoadAbs => 3,
            _ => 1,
        }
    }

    /// Base cost and alternate (branch taken) cost in clock cycles.
    ///
    /// Unconditional instructions report the same value twice.
    pub fn timing(&self) -> (u8, u8) {
        let fixed = |c: u8| (c, c);
        match *self {
            Op::Nop | Op::Stop | Op::Halt | Op::Di | Op::Ei | Op::Prefix | Op::Invalid(_) => {
                fixed(4)
            }
            Op::Rlca | Op::Rrca | Op::Rla | Op::Rra | Op::Daa | Op::Cpl | Op::Scf | Op::Ccf => {
                fixed(4)
            }
            Op::StoreSp => fixed(20),
            Op::LdR16Imm(_) => fixed(12),
            Op::AddHl(_) | Op::IncR16(_) | Op::DecR16(_) => fixed(8),
            Op::StoreA(_) | Op::LoadA(_) => fixed(8),
            Op::IncR8(R8::HlInd) | Op::DecR8(R8::HlInd) => fixed(12),
            Op::IncR8(_) | Op::DecR8(_) => fixed(4),
            Op::LdR8Imm(R8::HlInd) => fixed(12),
            Op::LdR8Imm(_) => fixed(8),
            Op::Jr(None) => fixed(12),
            Op::Jr(Some(_)) => (8, 12),
            Op::LdR8R8 { dst, src } if dst == R8::HlInd || src == R8::HlInd => fixed(8),
            Op::LdR8R8 { .. } => fixed(4),
            Op::AluR8(_, R8::HlInd) => fixed(8),
            Op::AluR8(..) => fixed(4),
            Op::AluImm(_) => fixed(8),
            Op::Ret(None) | Op::Reti => fixed(16),
            Op::Ret(Some(_)) => (8, 20),
            Op::Pop(_) => fixed(12),
            Op::Push(_) => fixed(16),
            Op::Jp(None) => fixed(16),
            Op::Jp(Some(_)) => (12, 16),
            Op::JpHl => fixed(4),
            Op::Call(None) => fixed(24),
            Op::Call(Some(_)) => (12, 24),
            Op::Rst(_) => fixed(16),
            Op::StoreHighImm | Op::LoadHighImm => fixed(12),
            Op::StoreHighC | Op::LoadHighC => fixed(8),
            Op::StoreAbs | Op::LoadAbs => fixed(16),
            Op::AddSp => fixed(16),
            Op::LdHlSp => fixed(12),
            Op::LdSpHl => fixed(8),
            Op::Bit(_, R8::HlInd) => fixed(12),
            Op::Shift(_, R8::HlInd) | Op::Res(_, R8::HlInd) | Op::Set(_, R8::HlInd) => fixed(16),
            Op::Shift(..) | Op::Bit(..) | Op::Res(..) | Op::Set(..) => fixed(8),
        }
    }
}

/// Decode a base-table opcode using the x/y/z/p/q field split.
fn decode_base(op: u8) -> Op {
    let x = op >> 6;
    let y = (op >> 3) & 0x07;
    let z = op & 0x07;
    let p = y >> 1;
    let q = y & 0x01;

    match x {
        0 => match z {
            0 => match y {
                0 => Op::Nop,
                1 => Op::StoreSp,
                2 => Op::Stop,
                3 => Op::Jr(None),
                _ => Op::Jr(Some(Cond::from_index(y - 4))),
            },
            1 if q == 0 => Op::LdR16Imm(R16::from_index(p)),
            1 => Op::AddHl(R16::from_index(p)),
            2 if q == 0 => Op::StoreA(Indirect::from_index(p)),
            2 => Op::LoadA(Indirect::from_index(p)),
            3 if q == 0 => Op::IncR16(R16::from_index(p)),
            3 => Op::DecR16(R16::from_index(p)),
            4 => Op::IncR8(R8::from_index(y)),
            5 => Op::DecR8(R8::from_index(y)),
            6 => Op::LdR8Imm(R8::from_index(y)),
            _ => match y {
                0 => Op::Rlca,
                1 => Op::Rrca,
                2 => Op::Rla,
                3 => Op::Rra,
                4 => Op::Daa,
                5 => Op::Cpl,
                6 => Op::Scf,
                _ => Op::Ccf,
            },
        },
        1 if op == 0x76 => Op::Halt,
        1 => Op::LdR8R8 {
            dst: R8::from_index(y),
            src: R8::from_index(z),
        },
        2 => Op::AluR8(AluOp::from_index(y), R8::from_index(z)),
        _ => match z {
            0 => match y {
                0..=3 => Op::Ret(Some(Cond::from_index(y))),
                4 => Op::StoreHighImm,
                5 => Op::AddSp,
                6 => Op::LoadHighImm,
                _ => Op::LdHlSp,
            },
            1 if q == 0 => Op::Pop(R16Stack::from_index(p)),
            1 => match p {
                0 => Op::Ret(None),
                1 => Op::Reti,
                2 => Op::JpHl,
                _ => Op::LdSpHl,
            },
            2 => match y {
                0..=3 => Op::Jp(Some(Cond::from_index(y))),
                4 => Op::StoreHighC,
                5 => Op::StoreAbs,
                6 => Op::LoadHighC,
                _ => Op::LoadAbs,
            },
            3 => match y {
                0 => Op::Jp(None),
                1 => Op::Prefix,
                6 => Op::Di,
                7 => Op::Ei,
                _ => Op::Invalid(op),
            },
            4 => match y {
                0..=3 => Op::Call(Some(Cond::from_index(y))),
                _ => Op::Invalid(op),
            },
            5 if q == 0 => Op::Push(R16Stack::from_index(p)),
            5 if p == 0 => Op::Call(None),
            5 => Op::Invalid(op),
            6 => Op::AluImm(AluOp::from_index(y)),
            _ => Op::Rst(y * 8),
        },
    }
}

fn decode_cb(op: u8) -> Op {
    let y = (op >> 3) & 0x07;
    let r = R8::from_index(op);
    match op >> 6 {
        0 => Op::Shift(ShiftOp::from_index(y), r),
        1 => Op::Bit(y, r),
        2 => Op::Res(y, r),
        _ => Op::Set(y, r),
    }
}

/// How an operand is shown when rendering a mnemonic.
#[derive(Clone, Copy)]
enum Operand {
    /// Placeholder names such as `d8` and `a16`.
    Template,
    Value { literal: u16, addr: u16, length: u8 },
}

impl Operand {
    fn d8(self) -> String {
        match self {
            Operand::Template => "d8".to_string(),
            Operand::Value { literal, .. } => format!("${:02X}", literal as u8),
        }
    }

    fn d16(self) -> String {
        match self {
            Operand::Template => "d16".to_string(),
            Operand::Value { literal, .. } => format!("${literal:04X}"),
        }
    }

    fn a16(self) -> String {
        match self {
            Operand::Template => "a16".to_string(),
            Operand::Value { literal, .. } => format!("${literal:04X}"),
        }
    }

    fn a8(self) -> String {
        match self {
            Operand::Template => "a8".to_string(),
            Operand::Value { literal, .. } => format!("$FF{:02X}", literal as u8),
        }
    }

    fn e8(self) -> String {
        match self {
            Operand::Template => "e8".to_string(),
            Operand::Value { literal, .. } => format!("{}", literal as u8 as i8),
        }
    }

    /// Relative jumps are shown as their absolute destination.
    fn rel(self) -> String {
        match self {
            Operand::Template => "r8".to_string(),
            Operand::Value {
                literal,
                addr,
                length,
            } => {
                let dest = relative_target(addr, length, literal);
                format!("${dest:04X}")
            }
        }
    }
}

#[inline]
fn relative_target(addr: u16, length: u8, literal: u16) -> u16 {
    addr.wrapping_add(length as u16)
        .wrapping_add(literal as u8 as i8 as u16)
}

fn render(op: &Op, operand: Operand) -> String {
    match *op {
        Op::Nop => "NOP".to_string(),
        Op::Stop => "STOP".to_string(),
        Op::Halt => "HALT".to_string(),
        Op::Di => "DI".to_string(),
        Op::Ei => "EI".to_string(),
        Op::StoreSp => format!("LD ({}),SP", operand.a16()),
        Op::LdR16Imm(rr) => format!("LD {},{}", rr.name(), operand.d16()),
        Op::AddHl(rr) => format!("ADD HL,{}", rr.name()),
        Op::StoreA(ind) => format!("LD {},A", ind.name()),
        Op::LoadA(ind) => format!("LD A,{}", ind.name()),
        Op::IncR16(rr) => format!("INC {}", rr.name()),
        Op::DecR16(rr) => format!("DEC {}", rr.name()),
        Op::IncR8(r) => format!("INC {}", r.name()),
        Op::DecR8(r) => format!("DEC {}", r.name()),
        Op::LdR8Imm(r) => format!("LD {},{}", r.name(), operand.d8()),
        Op::Rlca => "RLCA".to_string(),
        Op::Rrca => "RRCA".to_string(),
        Op::Rla => "RLA".to_string(),
        Op::Rra => "RRA".to_string(),
        Op::Daa => "DAA".to_string(),
        Op::Cpl => "CPL".to_string(),
        Op::Scf => "SCF".to_string(),
        Op::Ccf => "CCF".to_string(),
        Op::Jr(None) => format!("JR {}", operand.rel()),
        Op::Jr(Some(cc)) => format!("JR {},{}", cc.name(), operand.rel()),
        Op::LdR8R8 { dst, src } => format!("LD {},{}", dst.name(), src.name()),
        Op::AluR8(alu, r) => format!("{} {}", alu.mnemonic(), r.name()),
        Op::AluImm(alu) => format!("{} {}", alu.mnemonic(), operand.d8()),
        Op::Ret(None) => "RET".to_string(),
        Op::Ret(Some(cc)) => format!("RET {}", cc.name()),
        Op::Reti => "RETI".to_string(),
        Op::Pop(rr) => format!("POP {}", rr.name()),
        Op::Push(rr) => format!("PUSH {}", rr.name()),
        Op::Jp(None) => format!("JP {}", operand.a16()),
        Op::Jp(Some(cc)) => format!("JP {},{}", cc.name(), operand.a16()),
        Op::JpHl => "JP (HL)".to_string(),
        Op::Call(None) => format!("CALL {}", operand.a16()),
        Op::Call(Some(cc)) => format!("CALL {},{}", cc.name(), operand.a16()),
        Op::Rst(vector) => format!("RST ${vector:02X}"),
        Op::StoreHighImm => format!("LDH ({}),A", operand.a8()),
        Op::LoadHighImm => format!("LDH A,({})", operand.a8()),
        Op::StoreHighC => "LDH (C),A".to_string(),
        Op::LoadHighC => "LDH A,(C)".to_string(),
        Op::StoreAbs => format!("LD ({}),A", operand.a16()),
        Op::LoadAbs => format!("LD A,({})", operand.a16()),
        Op::AddSp => format!("ADD SP,{}", operand.e8()),
        Op::LdHlSp => format!("LD HL,SP+{}", operand.e8()),
        Op::LdSpHl => "LD SP,HL".to_string(),
        Op::Prefix => "PREFIX CB".to_string(),
        Op::Shift(shift, r) => format!("{} {}", shift.mnemonic(), r.name()),
        Op::Bit(n, r) => format!("BIT {n},{}", r.name()),
        Op::Res(n, r) => format!("RES {n},{}", r.name()),
        Op::Set(n, r) => format!("SET {n},{}", r.name()),
        Op::Invalid(byte) => format!("DB ${byte:02X}"),
    }
}

/// Static description of one opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// 0x000-0x0FF for the base table, 0x100-0x1FF for CB-prefixed opcodes.
    pub opcode: u16,
    pub op: Op,
    /// Mnemonic with operand placeholders, e.g. `LD B,d8`.
    pub mnemonic: String,
    pub length: u8,
    pub cycles: u8,
    /// Cost when a conditional branch is taken; equal to `cycles` otherwise.
    pub alt_cycles: u8,
    pub category: Category,
}

impl Descriptor {
    fn new(opcode: u16, op: Op) -> Self {
        let (cycles, alt_cycles) = op.timing();
        Self {
            opcode,
            op,
            mnemonic: render(&op, Operand::Template),
            length: op.length(),
            cycles,
            alt_cycles,
            category: op.category(),
        }
    }

    pub fn is_cb(&self) -> bool {
        self.opcode & 0x100 != 0
    }
}

pub struct OpcodeTable {
    base: Vec<Descriptor>,
    cb: Vec<Descriptor>,
}

impl OpcodeTable {
    fn build() -> Self {
        let base = (0..=0xFFu8)
            .map(|op| Descriptor::new(op as u16, decode_base(op)))
            .collect();
        let cb = (0..=0xFFu8)
            .map(|op| Descriptor::new(0x100 | op as u16, decode_cb(op)))
            .collect();
        Self { base, cb }
    }

    #[inline]
    pub fn base(&self, opcode: u8) -> &Descriptor {
        &self.base[opcode as usize]
    }

    #[inline]
    pub fn cb(&self, opcode: u8) -> &Descriptor {
        &self.cb[opcode as usize]
    }

    /// Look up by 9-bit key (see [`Descriptor::opcode`]).
    pub fn get(&self, key: u16) -> Result<&Descriptor> {
        match key {
            0x000..=0x0FF => Ok(self.base(key as u8)),
            0x100..=0x1FF => Ok(self.cb(key as u8)),
            _ => Err(CpuError::OpcodeOutOfRange(key)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.base.iter().chain(self.cb.iter())
    }
}

static OPCODE_TABLE: OnceLock<OpcodeTable> = OnceLock::new();

/// The process-wide descriptor table, built on first use.
pub fn opcode_table() -> &'static OpcodeTable {
    OPCODE_TABLE.get_or_init(OpcodeTable::build)
}

/// Static control-flow shape of an instruction, used by the disassembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Falls through to the next instruction.
    Next,
    Jump(u16),
    ConditionalJump(u16),
    Call(u16),
    ConditionalCall(u16),
    Restart(u16),
    /// Successor is not statically known or execution does not continue.
    Stop,
}

/// One decoded instruction at a concrete address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub addr: u16,
    pub descriptor: &'static Descriptor,
    /// Zero-extended immediate following the opcode (0 when there is none).
    pub literal: u16,
}

impl Instruction {
    #[inline]
    pub fn op(&self) -> Op {
        self.descriptor.op
    }

    #[inline]
    pub fn opcode(&self) -> u16 {
        self.descriptor.opcode
    }

    #[inline]
    pub fn length(&self) -> u8 {
        self.descriptor.length
    }

    #[inline]
    pub fn category(&self) -> Category {
        self.descriptor.category
    }

    #[inline]
    pub fn next_addr(&self) -> u16 {
        self.addr.wrapping_add(self.descriptor.length as u16)
    }

    /// Destination of a direct jump, call or restart, if it is encoded in the
    /// instruction itself.
    pub fn static_target(&self) -> Option<u16> {
        match self.op() {
            Op::Jr(_) => Some(relative_target(self.addr, self.length(), self.literal)),
            Op::Jp(_) | Op::Call(_) => Some(self.literal),
            Op::Rst(vector) => Some(vector as u16),
            _ => None,
        }
    }

    pub fn flow(&self) -> Flow {
        let target = self.static_target();
        match (self.op(), target) {
            (Op::Ret(None) | Op::Reti | Op::JpHl | Op::Halt | Op::Stop, _) => Flow::Stop,
            (Op::Invalid(_), _) => Flow::Stop,
            (Op::Jr(None) | Op::Jp(None), Some(t)) => Flow::Jump(t),
            (Op::Jr(Some(_)) | Op::Jp(Some(_)), Some(t)) => Flow::ConditionalJump(t),
            (Op::Call(None), Some(t)) => Flow::Call(t),
            (Op::Call(Some(_)), Some(t)) => Flow::ConditionalCall(t),
            (Op::Rst(_), Some(t)) => Flow::Restart(t),
            _ => Flow::Next,
        }
    }

    /// Mnemonic with operands filled in, e.g. `JR NZ,$0150`.
    pub fn text(&self) -> String {
        render(
            &self.descriptor.op,
            Operand::Value {
                literal: self.literal,
                addr: self.addr,
                length: self.descriptor.length,
            },
        )
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// Decode the instruction whose bytes start at `bytes[0]`.
///
/// `bytes` must hold the opcode and the two bytes that follow it; unused
/// trailing bytes are ignored.
pub fn decode(bytes: [u8; 3], addr: u16) -> Result<Instruction> {
    let table = opcode_table();
    let descriptor = if bytes[0] == 0xCB {
        table.cb(bytes[1])
    } else {
        table.base(bytes[0])
    };

    if let Op::Invalid(opcode) = descriptor.op {
        return Err(CpuError::InvalidInstruction { opcode, addr });
    }

    let literal = match (descriptor.is_cb(), descriptor.length) {
        (true, _) => 0,
        (false, 2) => bytes[1] as u16,
        (false, 3) => u16::from_le_bytes([bytes[1], bytes[2]]),
        _ => 0,
    };

    Ok(Instruction {
        addr,
        descriptor,
        literal,
    })
}

/// Decode the instruction at `addr` without touching CPU state.
pub fn fetch_and_decode<M: Memory + ?Sized>(mem: &M, addr: u16) -> Result<Instruction> {
    let bytes = [
        mem.read_byte(addr),
        mem.read_byte(addr.wrapping_add(1)),
        mem.read_byte(addr.wrapping_add(2)),
    ];
    decode(bytes, addr)
}

/// Hex dump of `len` bytes starting at `addr`, space separated.
pub fn format_bytes<M: Memory + ?Sized>(mem: &M, addr: u16, len: u8) -> String {
    let mut s = String::with_capacity(len as usize * 3);
    for i in 0..len {
        if i > 0 {
            s.push(' ');
        }
        let b = mem.read_byte(addr.wrapping_add(i as u16));
        s.push_str(&format!("{b:02X}"));
    }
    s
}
