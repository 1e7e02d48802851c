use crate::memory::Memory;

/// Interrupt flag register (IF).
pub const IF_ADDR: u16 = 0xFF0F;
/// Interrupt enable register (IE).
pub const IE_ADDR: u16 = 0xFFFF;

const INTERRUPT_MASK: u8 = 0x1F;

// Interrupt vectors (gbdev.io/pandocs/Interrupts.html)
const INTERRUPT_VBLANK: u16 = 0x40;
const INTERRUPT_STAT: u16 = 0x48;
const INTERRUPT_TIMER: u16 = 0x50;
const INTERRUPT_SERIAL: u16 = 0x58;
const INTERRUPT_JOYPAD: u16 = 0x60;

/// Interrupt sources in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    VBlank,
    LcdStat,
    Timer,
    Serial,
    Joypad,
}

impl Interrupt {
    pub const ALL: [Interrupt; 5] = [
        Interrupt::VBlank,
        Interrupt::LcdStat,
        Interrupt::Timer,
        Interrupt::Serial,
        Interrupt::Joypad,
    ];

    pub const fn bit(self) -> u8 {
        match self {
            Interrupt::VBlank => 0x01,
            Interrupt::LcdStat => 0x02,
            Interrupt::Timer => 0x04,
            Interrupt::Serial => 0x08,
            Interrupt::Joypad => 0x10,
        }
    }

    pub const fn vector(self) -> u16 {
        match self {
            Interrupt::VBlank => INTERRUPT_VBLANK,
            Interrupt::LcdStat => INTERRUPT_STAT,
            Interrupt::Timer => INTERRUPT_TIMER,
            Interrupt::Serial => INTERRUPT_SERIAL,
            Interrupt::Joypad => INTERRUPT_JOYPAD,
        }
    }

    /// Highest-priority source in an IE & IF mask.
    pub fn highest(pending: u8) -> Option<Interrupt> {
        Self::ALL.into_iter().find(|irq| pending & irq.bit() != 0)
    }
}

/// IME plus the one-instruction delay that follows EI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterruptController {
    ime: bool,
    enable_delay: u8,
}

impl InterruptController {
    pub fn ime(&self) -> bool {
        self.ime
    }

    /// Set IME directly, cancelling any EI still in flight.
    pub fn set_ime(&mut self, value: bool) {
        self.ime = value;
        self.enable_delay = 0;
    }

    /// True while an EI has executed but IME has not switched on yet.
    pub fn enable_pending(&self) -> bool {
        self.enable_delay > 0
    }

    pub(crate) fn di(&mut self) {
        self.set_ime(false);
    }

    /// EI takes effect after the instruction that follows it.
    pub(crate) fn ei(&mut self) {
        if !self.ime {
            self.enable_delay = 2;
        }
    }

    pub(crate) fn reti(&mut self) {
        self.set_ime(true);
    }

    /// Advance the EI delay by one retired instruction.
    pub(crate) fn instruction_retired(&mut self) {
        if self.enable_delay > 0 {
            self.enable_delay -= 1;
            if self.enable_delay == 0 {
                self.ime = true;
            }
        }
    }

    /// IE & IF, restricted to the five real sources.
    pub fn pending<M: Memory + ?Sized>(mem: &M) -> u8 {
        mem.read_byte(IE_ADDR) & mem.read_byte(IF_ADDR) & INTERRUPT_MASK
    }

    pub fn request<M: Memory + ?Sized>(mem: &mut M, irq: Interrupt) {
        let flags = mem.read_byte(IF_ADDR);
        mem.write_byte(IF_ADDR, flags | irq.bit());
    }

    pub(crate) fn acknowledge<M: Memory + ?Sized>(mem: &mut M, irq: Interrupt) {
        let flags = mem.read_byte(IF_ADDR);
        mem.write_byte(IF_ADDR, flags & !irq.bit());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::FlatMemory;

    #[test]
    fn vectors_match_hardware() {
        let vectors: Vec<u16> = Interrupt::ALL.iter().map(|i| i.vector()).collect();
        assert_eq!(vectors, [0x40, 0x48, 0x50, 0x58, 0x60]);
    }

    #[test]
    fn priority_is_lowest_bit_first() {
        assert_eq!(Interrupt::highest(0x14), Some(Interrupt::Timer));
        assert_eq!(Interrupt::highest(0x10), Some(Interrupt::Joypad));
        assert_eq!(Interrupt::highest(0x00), None);
    }

    #[test]
    fn ei_enables_after_following_instruction() {
        let mut ic = InterruptController::default();
        ic.ei();
        ic.instruction_retired(); // EI itself
        assert!(!ic.ime());
        assert!(ic.enable_pending());
        ic.instruction_retired(); // the instruction after EI
        assert!(ic.ime());
    }

    #[test]
    fn di_cancels_pending_ei() {
        let mut ic = InterruptController::default();
        ic.ei();
        ic.instruction_retired();
        ic.di();
        ic.instruction_retired();
        assert!(!ic.ime());
    }

    #[test]
    fn pending_masks_ie_with_if() {
        let mut mem = FlatMemory::new();
        mem.write_byte(IE_ADDR, 0x05);
        InterruptController::request(&mut mem, Interrupt::Timer);
        InterruptController::request(&mut mem, Interrupt::Serial);
        assert_eq!(InterruptController::pending(&mem), 0x04);
        InterruptController::acknowledge(&mut mem, Interrupt::Timer);
        assert_eq!(InterruptController::pending(&mem), 0x00);
        assert_eq!(mem.read_byte(IF_ADDR), 0x08);
    }
}
