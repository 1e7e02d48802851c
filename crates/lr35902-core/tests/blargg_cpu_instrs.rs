//! Blargg's `cpu_instrs` suite, reported over the serial port.
//!
//! Downloads the public test-ROM bundle on first use, so it is opt-in:
//! `cargo test -p lr35902-core -- --ignored`.

mod common;

use common::RomBus;
use lr35902_core::Cpu;
use lr35902_core::serial::SerialCapture;

const CYCLE_LIMIT: u64 = 400_000_000;

fn run_blargg(name: &str) {
    let path = common::rom_path(format!("blargg/cpu_instrs/individual/{name}.gb"));
    let rom = std::fs::read(&path).expect("rom not found");
    let mut mem = SerialCapture::new(RomBus::new(&rom));
    let mut cpu = Cpu::new();

    let mut checked = 0;
    while cpu.cycles() < CYCLE_LIMIT {
        cpu.step(&mut mem)
            .unwrap_or_else(|e| panic!("{name}: {e} ({})", cpu.debug_state()));
        if common::serial_contains_result(mem.output(), &mut checked) {
            break;
        }
    }

    let out = mem.output_lossy();
    assert!(out.contains("Passed"), "{name} failed:\n{out}");
}

// 02-interrupts needs a timer, which lives outside this crate.
macro_rules! blargg_tests {
    ($($test:ident => $rom:literal,)*) => {
        $(
            #[test]
            #[ignore]
            fn $test() {
                run_blargg($rom);
            }
        )*
    };
}

blargg_tests! {
    special_01 => "01-special",
    op_sp_hl_03 => "03-op sp,hl",
    op_r_imm_04 => "04-op r,imm",
    op_rp_05 => "05-op rp",
    ld_r_r_06 => "06-ld r,r",
    jr_jp_call_ret_rst_07 => "07-jr,jp,call,ret,rst",
    misc_instrs_08 => "08-misc instrs",
    op_r_r_09 => "09-op r,r",
    bit_ops_10 => "10-bit ops",
    op_a_hl_11 => "11-op a,(hl)",
}
