mod common;

use common::program;
use lr35902_core::Disassembler;
use lr35902_core::opcodes::Category;

#[test]
fn jp_to_halt_yields_two_instructions() {
    let mut mem = program(0x0100, &[0xC3, 0x50, 0x01]);
    mem.load(0x0150, &[0x76, 0x00, 0x00]);

    let out = Disassembler::new(&mem).disassemble(0x0100, true);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].addr, 0x0100);
    assert_eq!(out[0].category(), Category::UnconditionalJump);
    assert_eq!(out[1].addr, 0x0150);
    assert_eq!(out[1].text(), "HALT");
}

#[test]
fn unconditional_call_follows_target_only() {
    // CALL $0200 ; NOP      $0200: RET
    let mut mem = program(0x0100, &[0xCD, 0x00, 0x02, 0x00]);
    mem.load(0x0200, &[0xC9]);
    let addrs: Vec<u16> = Disassembler::new(&mem)
        .disassemble(0x0100, true)
        .iter()
        .map(|i| i.addr)
        .collect();
    assert_eq!(addrs, [0x0100, 0x0200]);
}

#[test]
fn conditional_call_in_permissive_mode() {
    // CALL NZ,$0200 ; RET      $0200: RETI
    let mut mem = program(0x0100, &[0xC4, 0x00, 0x02, 0xC9]);
    mem.load(0x0200, &[0xD9]);
    let dis = Disassembler::new(&mem);
    let permissive: Vec<u16> = dis.walk(0x0100, true).map(|i| i.addr).collect();
    let strict: Vec<u16> = dis.walk(0x0100, false).map(|i| i.addr).collect();
    assert_eq!(permissive.len(), 3);
    assert_eq!(strict, [0x0100, 0x0103]);
}

#[test]
fn jp_hl_stops_exploration() {
    let mem = program(0x0100, &[0xE9, 0x00, 0x00]);
    let out = Disassembler::new(&mem).disassemble(0x0100, true);
    assert_eq!(out.len(), 1);
}

#[test]
fn disassembly_does_not_need_a_cpu() {
    let mem = program(0x0000, &[0x3E, 0x01, 0xCB, 0x37, 0x18, 0xFA]);
    let text: Vec<String> = Disassembler::new(&mem)
        .disassemble(0x0000, false)
        .iter()
        .map(|i| i.to_string())
        .collect();
    assert_eq!(text, ["LD A,$01", "SWAP A", "JR $0000"]);
}
