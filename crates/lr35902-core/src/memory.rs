/// The 16-bit address space as seen by the CPU.
///
/// Banking, mirroring and I/O side effects are the implementor's business. Reads
/// take `&self` so the disassembler and breakpoint evaluator can inspect memory
/// without being able to change it.
pub trait Memory {
    fn read_byte(&self, addr: u16) -> u8;

    fn write_byte(&mut self, addr: u16, val: u8);

    /// Little-endian word write: low byte at `addr`, high byte at `addr + 1`.
    fn write_word(&mut self, addr: u16, val: u16) {
        let [lo, hi] = val.to_le_bytes();
        self.write_byte(addr, lo);
        self.write_byte(addr.wrapping_add(1), hi);
    }

    fn read_word(&self, addr: u16) -> u16 {
        let lo = self.read_byte(addr);
        let hi = self.read_byte(addr.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }
}

const ADDRESS_SPACE: usize = 0x1_0000;
const ROM_SIZE: usize = 0x8000;

/// Flat 64 KiB RAM with no memory-mapped behavior.
pub struct FlatMemory {
    bytes: Box<[u8; ADDRESS_SPACE]>,
    /// Writes below this address are dropped.
    rom_end: u16,
}

impl FlatMemory {
    pub fn new() -> Self {
        Self {
            bytes: Box::new([0; ADDRESS_SPACE]),
            rom_end: 0,
        }
    }

    /// Copy `data` to `addr`, wrapping at the top of the address space.
    pub fn load(&mut self, addr: u16, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.bytes[addr.wrapping_add(i as u16) as usize] = *byte;
        }
    }

    /// Build a memory image from a cartridge ROM dump mapped at 0x0000.
    ///
    /// Only the first 32 KiB are mapped and that region is read-only, so
    /// bank-switch writes are ignored rather than patching the code.
    pub fn from_rom(rom: &[u8]) -> Self {
        let mut mem = Self::new();
        let len = rom.len().min(ROM_SIZE);
        mem.bytes[..len].copy_from_slice(&rom[..len]);
        mem.rom_end = ROM_SIZE as u16;
        mem
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..]
    }
}

impl Default for FlatMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory for FlatMemory {
    #[inline]
    fn read_byte(&self, addr: u16) -> u8 {
        self.bytes[addr as usize]
    }

    #[inline]
    fn write_byte(&mut self, addr: u16, val: u8) {
        if addr >= self.rom_end {
            self.bytes[addr as usize] = val;
        }
    }
}
