//! Breakpoint evaluation and invalid-opcode faults as a debugger sees them.

mod common;

use common::{cpu_at, program};
use lr35902_core::{BreakpointKind, BreakpointSets, CpuError, Memory};

#[test]
fn write_breakpoint_does_not_mutate() {
    // LD (BC),A
    let mut mem = program(0x0100, &[0x02]);
    let mut cpu = cpu_at(0x0100);
    cpu.regs.a = 0x42;
    cpu.regs.set_bc(0xC123);
    let mut sets = BreakpointSets::default();
    sets.write.insert(0xC123);

    let regs_before = cpu.regs;
    let image_before = mem.as_slice().to_vec();

    let kind = cpu.check_breakpoints(&mem, &sets, false).unwrap();
    assert_eq!(kind, BreakpointKind::Write);
    assert_eq!(cpu.regs, regs_before);
    assert_eq!(mem.as_slice(), image_before.as_slice());
    assert_eq!(cpu.cycles(), 0);

    cpu.step(&mut mem).unwrap();
    assert_eq!(mem.read_byte(0xC123), 0x42);
}

#[test]
fn read_breakpoint_on_high_page() {
    // LDH A,($44)
    let mem = program(0x0100, &[0xF0, 0x44]);
    let cpu = cpu_at(0x0100);
    let mut sets = BreakpointSets::default();
    sets.read.insert(0xFF44);
    assert_eq!(
        cpu.check_breakpoints(&mem, &sets, false).unwrap(),
        BreakpointKind::Read
    );
}

#[test]
fn jump_breakpoint_on_rst_vector() {
    let mem = program(0x0100, &[0xC7]); // RST $00
    let cpu = cpu_at(0x0100);
    let mut sets = BreakpointSets::default();
    sets.jump.insert(0x0000);
    assert_eq!(
        cpu.check_breakpoints(&mem, &sets, false).unwrap(),
        BreakpointKind::Jump
    );
}

#[test]
fn invalid_opcode_faults_everywhere() {
    for addr in [0x0000u16, 0x0150, 0xC000, 0xFFFE] {
        let mut mem = program(addr, &[0xD3]);
        let mut cpu = cpu_at(addr);
        let expected = CpuError::InvalidInstruction { opcode: 0xD3, addr };

        let sets = BreakpointSets::default();
        assert_eq!(cpu.check_breakpoints(&mem, &sets, false), Err(expected.clone()));
        assert_eq!(cpu.check_breakpoints(&mem, &sets, true), Err(expected.clone()));
        assert_eq!(cpu.step(&mut mem), Err(expected.clone()));
        assert_eq!(
            cpu.step_with_breakpoints(&mut mem, &sets, false),
            Err(expected)
        );
        assert_eq!(cpu.regs.pc, addr);
    }
}

#[test]
fn all_undefined_slots_fault() {
    for opcode in [
        0xD3u8, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD,
    ] {
        let mut mem = program(0x0200, &[opcode]);
        let mut cpu = cpu_at(0x0200);
        assert!(matches!(
            cpu.step(&mut mem),
            Err(CpuError::InvalidInstruction { opcode: op, .. }) if op == opcode
        ));
    }
}
