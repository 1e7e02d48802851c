use once_cell::sync::OnceCell;
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};

use lr35902_core::{Cpu, FlatMemory, Memory, Registers};

static INIT: OnceCell<()> = OnceCell::new();

fn ensure_test_roms() {
    INIT.get_or_init(|| {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("test_roms");
        fs::create_dir_all(&dir).expect("failed to create test_roms directory");
        ensure_c_sp_test_rom_bundle(&dir);
    });
}

fn ensure_c_sp_test_rom_bundle(dir: &Path) {
    // ROM binaries are not checked in; fetch the bundle on demand.
    if dir.join("blargg").exists() {
        return;
    }

    let url = "https://github.com/c-sp/game-boy-test-roms/releases/download/v7.0/game-boy-test-roms-v7.0.zip";
    let resp = reqwest::blocking::get(url).expect("failed to download test roms");
    let status = resp.status();
    if !status.is_success() {
        panic!("failed to download test roms: {status}");
    }
    let bytes = resp.bytes().expect("failed to read rom bytes");
    let reader = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(reader).expect("failed to open zip archive");
    archive.extract(dir).expect("failed to extract test roms");
}

#[allow(dead_code)]
pub fn roms_dir() -> PathBuf {
    ensure_test_roms();
    Path::new(env!("CARGO_MANIFEST_DIR")).join("test_roms")
}

#[allow(dead_code)]
pub fn rom_path<P: AsRef<Path>>(relative: P) -> PathBuf {
    roms_dir().join(relative)
}

#[allow(dead_code)]
pub fn serial_contains_result(serial: &[u8], checked_up_to: &mut usize) -> bool {
    const PASSED: &[u8] = b"Passed";
    const FAILED: &[u8] = b"Failed";

    let max_marker_len = PASSED.len().max(FAILED.len());
    let lookbehind = max_marker_len.saturating_sub(1);
    let start = checked_up_to.saturating_sub(lookbehind).min(serial.len());
    let window = &serial[start..];

    let found = window.windows(PASSED.len()).any(|chunk| chunk == PASSED)
        || window.windows(FAILED.len()).any(|chunk| chunk == FAILED);

    *checked_up_to = serial.len();
    found
}

/// A memory image with `code` loaded at `addr`.
#[allow(dead_code)]
pub fn program(addr: u16, code: &[u8]) -> FlatMemory {
    let mut mem = FlatMemory::new();
    mem.load(addr, code);
    mem
}

/// A CPU with cleared registers, PC at `pc` and SP at the top of WRAM.
#[allow(dead_code)]
pub fn cpu_at(pc: u16) -> Cpu {
    let mut regs = Registers::zeroed();
    regs.pc = pc;
    regs.sp = 0xDFFE;
    Cpu::with_registers(regs)
}

/// Counts data accesses to one address.
#[allow(dead_code)]
pub struct CountingMemory {
    pub inner: FlatMemory,
    pub watched: u16,
    pub reads: Cell<u32>,
    pub writes: u32,
}

#[allow(dead_code)]
impl CountingMemory {
    pub fn new(inner: FlatMemory, watched: u16) -> Self {
        Self {
            inner,
            watched,
            reads: Cell::new(0),
            writes: 0,
        }
    }
}

impl Memory for CountingMemory {
    fn read_byte(&self, addr: u16) -> u8 {
        if addr == self.watched {
            self.reads.set(self.reads.get() + 1);
        }
        self.inner.read_byte(addr)
    }

    fn write_byte(&mut self, addr: u16, val: u8) {
        if addr == self.watched {
            self.writes += 1;
        }
        self.inner.write_byte(addr, val);
    }
}

/// DMG bus stand-in for ROM-only test cartridges: LY reads as 0x90 so VBlank
/// polling loops fall through.
#[allow(dead_code)]
pub struct RomBus {
    mem: FlatMemory,
}

#[allow(dead_code)]
impl RomBus {
    pub fn new(rom: &[u8]) -> Self {
        Self {
            mem: FlatMemory::from_rom(rom),
        }
    }
}

impl Memory for RomBus {
    fn read_byte(&self, addr: u16) -> u8 {
        match addr {
            0xFF44 => 0x90,
            _ => self.mem.read_byte(addr),
        }
    }

    fn write_byte(&mut self, addr: u16, val: u8) {
        self.mem.write_byte(addr, val);
    }
}
