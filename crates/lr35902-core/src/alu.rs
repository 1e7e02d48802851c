//! Flag and arithmetic policy shared by every instruction handler.
//!
//! All routines are pure: they take operands plus the incoming F value and
//! return the result together with the complete new F value. Carries are always
//! derived from widened intermediates, never from the truncated byte.

use crate::registers::{FLAG_C, FLAG_H, FLAG_N, FLAG_Z};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluResult {
    pub value: u8,
    pub flags: u8,
}

#[inline]
fn z(value: u8) -> u8 {
    if value == 0 { FLAG_Z } else { 0 }
}

#[inline]
fn bit_flag(set: bool, mask: u8) -> u8 {
    if set { mask } else { 0 }
}

/// The eight accumulator operations selected by bits 3-5 of `ALU A,r`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}

impl AluOp {
    pub const fn from_index(index: u8) -> Self {
        match index & 0x07 {
            0 => AluOp::Add,
            1 => AluOp::Adc,
            2 => AluOp::Sub,
            3 => AluOp::Sbc,
            4 => AluOp::And,
            5 => AluOp::Xor,
            6 => AluOp::Or,
            _ => AluOp::Cp,
        }
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            AluOp::Add => "ADD",
            AluOp::Adc => "ADC",
            AluOp::Sub => "SUB",
            AluOp::Sbc => "SBC",
            AluOp::And => "AND",
            AluOp::Xor => "XOR",
            AluOp::Or => "OR",
            AluOp::Cp => "CP",
        }
    }

    /// Apply the operation to `a` and `operand`. For `Cp` the returned value is
    /// `a` unchanged.
    pub fn apply(self, a: u8, operand: u8, flags: u8) -> AluResult {
        let carry = flags & FLAG_C != 0;
        match self {
            AluOp::Add => add8(a, operand, false),
            AluOp::Adc => add8(a, operand, carry),
            AluOp::Sub => sub8(a, operand, false),
            AluOp::Sbc => sub8(a, operand, carry),
            AluOp::And => and8(a, operand),
            AluOp::Xor => xor8(a, operand),
            AluOp::Or => or8(a, operand),
            AluOp::Cp => AluResult {
                value: a,
                flags: sub8(a, operand, false).flags,
            },
        }
    }
}

pub fn add8(a: u8, b: u8, carry: bool) -> AluResult {
    let wide = a as u16 + b as u16 + carry as u16;
    let value = wide as u8;
    AluResult {
        value,
        flags: z(value)
            | bit_flag((a ^ b ^ value) & 0x10 != 0, FLAG_H)
            | bit_flag(wide > 0xFF, FLAG_C),
    }
}

pub fn sub8(a: u8, b: u8, carry: bool) -> AluResult {
    let wide = (a as u16)
        .wrapping_sub(b as u16)
        .wrapping_sub(carry as u16);
    let value = wide as u8;
    AluResult {
        value,
        flags: FLAG_N
            | z(value)
            | bit_flag((a ^ b ^ value) & 0x10 != 0, FLAG_H)
            | bit_flag(wide > 0xFF, FLAG_C),
    }
}

pub fn and8(a: u8, b: u8) -> AluResult {
    let value = a & b;
    AluResult {
        value,
        flags: z(value) | FLAG_H,
    }
}

pub fn or8(a: u8, b: u8) -> AluResult {
    let value = a | b;
    AluResult {
        value,
        flags: z(value),
    }
}

pub fn xor8(a: u8, b: u8) -> AluResult {
    let value = a ^ b;
    AluResult {
        value,
        flags: z(value),
    }
}

/// INC r: C is preserved.
pub fn inc8(value: u8, flags: u8) -> AluResult {
    let res = value.wrapping_add(1);
    AluResult {
        value: res,
        flags: (flags & FLAG_C) | z(res) | bit_flag(value & 0x0F == 0x0F, FLAG_H),
    }
}

/// DEC r: C is preserved.
pub fn dec8(value: u8, flags: u8) -> AluResult {
    let res = value.wrapping_sub(1);
    AluResult {
        value: res,
        flags: (flags & FLAG_C) | FLAG_N | z(res) | bit_flag(value & 0x0F == 0, FLAG_H),
    }
}

/// ADD HL,rr. Z is preserved, H is the carry out of bit 11.
pub fn add16(hl: u16, operand: u16, flags: u8) -> (u16, u8) {
    let wide = hl as u32 + operand as u32;
    let res = wide as u16;
    let f = (flags & FLAG_Z)
        | bit_flag((hl ^ operand ^ res) & 0x1000 != 0, FLAG_H)
        | bit_flag(wide > 0xFFFF, FLAG_C);
    (res, f)
}

/// SP plus a signed 8-bit offset (ADD SP,e and LD HL,SP+e).
///
/// H and C come from the unsigned low-byte addition; Z and N are cleared.
pub fn add_sp(sp: u16, offset: u8) -> (u16, u8) {
    let wide_offset = offset as i8 as i16 as u16;
    let res = sp.wrapping_add(wide_offset);
    let carries = sp ^ wide_offset ^ res;
    let f = bit_flag(carries & 0x010 != 0, FLAG_H) | bit_flag(carries & 0x100 != 0, FLAG_C);
    (res, f)
}

/// CB-prefixed rotate and shift family, selected by bits 3-5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Swap,
    Srl,
}

impl ShiftOp {
    pub const fn from_index(index: u8) -> Self {
        match index & 0x07 {
            0 => ShiftOp::Rlc,
            1 => ShiftOp::Rrc,
            2 => ShiftOp::Rl,
            3 => ShiftOp::Rr,
            4 => ShiftOp::Sla,
            5 => ShiftOp::Sra,
            6 => ShiftOp::Swap,
            _ => ShiftOp::Srl,
        }
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            ShiftOp::Rlc => "RLC",
            ShiftOp::Rrc => "RRC",
            ShiftOp::Rl => "RL",
            ShiftOp::Rr => "RR",
            ShiftOp::Sla => "SLA",
            ShiftOp::Sra => "SRA",
            ShiftOp::Swap => "SWAP",
            ShiftOp::Srl => "SRL",
        }
    }

    /// Returns the shifted value and the carry-out bit.
    pub fn shift(self, value: u8, carry_in: bool) -> (u8, bool) {
        match self {
            ShiftOp::Rlc => (value.rotate_left(1), value & 0x80 != 0),
            ShiftOp::Rrc => (value.rotate_right(1), value & 0x01 != 0),
            ShiftOp::Rl => ((value << 1) | carry_in as u8, value & 0x80 != 0),
            ShiftOp::Rr => ((value >> 1) | ((carry_in as u8) << 7), value & 0x01 != 0),
            ShiftOp::Sla => (value << 1, value & 0x80 != 0),
            ShiftOp::Sra => ((value >> 1) | (value & 0x80), value & 0x01 != 0),
            ShiftOp::Swap => (value.rotate_left(4), false),
            ShiftOp::Srl => (value >> 1, value & 0x01 != 0),
        }
    }

    /// CB form: Z from the result, N=H=0, C from the carry-out (always 0 for SWAP).
    pub fn apply(self, value: u8, flags: u8) -> AluResult {
        let (res, carry) = self.shift(value, flags & FLAG_C != 0);
        AluResult {
            value: res,
            flags: z(res) | bit_flag(carry, FLAG_C),
        }
    }

    /// RLCA/RRCA/RLA/RRA: like the CB form but Z is always cleared.
    pub fn apply_accumulator(self, value: u8, flags: u8) -> AluResult {
        let (res, carry) = self.shift(value, flags & FLAG_C != 0);
        AluResult {
            value: res,
            flags: bit_flag(carry, FLAG_C),
        }
    }
}

/// BIT n: Z is the complement of the tested bit, H=1, N=0, C preserved.
pub fn bit(n: u8, value: u8, flags: u8) -> u8 {
    (flags & FLAG_C) | FLAG_H | bit_flag(value & (1 << (n & 0x07)) == 0, FLAG_Z)
}

/// Decimal adjust after a packed-BCD add or subtract.
///
/// Add path: +0x06 when H is set or the low nibble exceeds 9, +0x60 when C is
/// set or A exceeds 0x99 (which also sets C). Subtract path: -0x06 on H, -0x60
/// on C. N is kept, H is always cleared, C is only ever set, never cleared.
pub fn daa(a: u8, flags: u8) -> AluResult {
    let subtract = flags & FLAG_N != 0;
    let half = flags & FLAG_H != 0;
    let mut carry = flags & FLAG_C != 0;
    let mut correction = 0u8;

    if half || (!subtract && a & 0x0F > 0x09) {
        correction |= 0x06;
    }
    if carry || (!subtract && a > 0x99) {
        correction |= 0x60;
        carry = true;
    }

    let value = if subtract {
        a.wrapping_sub(correction)
    } else {
        a.wrapping_add(correction)
    };

    AluResult {
        value,
        flags: z(value) | (flags & FLAG_N) | bit_flag(carry, FLAG_C),
    }
}

pub fn cpl(a: u8, flags: u8) -> AluResult {
    AluResult {
        value: !a,
        flags: (flags & (FLAG_Z | FLAG_C)) | FLAG_N | FLAG_H,
    }
}

pub fn scf(flags: u8) -> u8 {
    (flags & FLAG_Z) | FLAG_C
}

pub fn ccf(flags: u8) -> u8 {
    (flags & FLAG_Z) | ((flags & FLAG_C) ^ FLAG_C)
}
