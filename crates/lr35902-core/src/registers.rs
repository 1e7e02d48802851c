// CPU flag bits as documented in gbdev.io/pandocs/The_CPU_Flags.html
pub const FLAG_Z: u8 = 0x80; // Zero
pub const FLAG_N: u8 = 0x40; // Subtract
pub const FLAG_H: u8 = 0x20; // Half Carry
pub const FLAG_C: u8 = 0x10; // Carry

// Post-boot DMG (rev A/B/C) state from gbdev.io/pandocs/Power_Up_State.html
const BOOT_A: u8 = 0x01;
const BOOT_F: u8 = 0xB0;
const BOOT_BC: u16 = 0x0013;
const BOOT_DE: u16 = 0x00D8;
const BOOT_HL: u16 = 0x014D;
const BOOT_PC: u16 = 0x0100;
const BOOT_SP: u16 = 0xFFFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Z,
    N,
    H,
    C,
}

impl Flag {
    #[inline]
    pub const fn mask(self) -> u8 {
        match self {
            Flag::Z => FLAG_Z,
            Flag::N => FLAG_N,
            Flag::H => FLAG_H,
            Flag::C => FLAG_C,
        }
    }
}

/// The SM83 register file.
///
/// Pair accessors are views over the 8-bit registers; writing a pair stores the
/// high byte first and then the low byte. The low nibble of F is hard-wired to
/// zero and every flag accessor yields 0 or 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Registers {
    pub a: u8,
    f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub sp: u16,
    pub pc: u16,
}

impl Registers {
    /// Register contents right after the DMG boot ROM hands over to the cartridge.
    pub fn power_on() -> Self {
        let mut regs = Self::zeroed();
        regs.a = BOOT_A;
        regs.set_f(BOOT_F);
        regs.set_bc(BOOT_BC);
        regs.set_de(BOOT_DE);
        regs.set_hl(BOOT_HL);
        regs.pc = BOOT_PC;
        regs.sp = BOOT_SP;
        regs
    }

    pub const fn zeroed() -> Self {
        Self {
            a: 0,
            f: 0,
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            sp: 0,
            pc: 0,
        }
    }

    #[inline]
    pub fn f(&self) -> u8 {
        self.f
    }

    #[inline]
    pub fn set_f(&mut self, value: u8) {
        self.f = value & 0xF0;
    }

    #[inline]
    pub fn af(&self) -> u16 {
        u16::from_be_bytes([self.a, self.f])
    }

    #[inline]
    pub fn set_af(&mut self, value: u16) {
        let [a, f] = value.to_be_bytes();
        self.a = a;
        self.set_f(f);
    }

    #[inline]
    pub fn bc(&self) -> u16 {
        u16::from_be_bytes([self.b, self.c])
    }

    #[inline]
    pub fn set_bc(&mut self, value: u16) {
        let [b, c] = value.to_be_bytes();
        self.b = b;
        self.c = c;
    }

    #[inline]
    pub fn de(&self) -> u16 {
        u16::from_be_bytes([self.d, self.e])
    }

    #[inline]
    pub fn set_de(&mut self, value: u16) {
        let [d, e] = value.to_be_bytes();
        self.d = d;
        self.e = e;
    }

    #[inline]
    pub fn hl(&self) -> u16 {
        u16::from_be_bytes([self.h, self.l])
    }

    #[inline]
    pub fn set_hl(&mut self, value: u16) {
        let [h, l] = value.to_be_bytes();
        self.h = h;
        self.l = l;
    }

    #[inline]
    pub fn flag(&self, flag: Flag) -> bool {
        self.f & flag.mask() != 0
    }

    /// Flag value as a single bit (0 or 1), convenient for carry-in arithmetic.
    #[inline]
    pub fn flag_bit(&self, flag: Flag) -> u8 {
        self.flag(flag) as u8
    }

    #[inline]
    pub fn set_flag(&mut self, flag: Flag, value: bool) {
        if value {
            self.f |= flag.mask();
        } else {
            self.f &= !flag.mask();
        }
    }

    #[inline]
    pub fn fz(&self) -> u8 {
        self.flag_bit(Flag::Z)
    }

    #[inline]
    pub fn fn_(&self) -> u8 {
        self.flag_bit(Flag::N)
    }

    #[inline]
    pub fn fh(&self) -> u8 {
        self.flag_bit(Flag::H)
    }

    #[inline]
    pub fn fc(&self) -> u8 {
        self.flag_bit(Flag::C)
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::power_on()
    }
}
