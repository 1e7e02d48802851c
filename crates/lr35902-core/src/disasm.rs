//! Static reachability disassembly.
//!
//! Starting from an entry point, follows statically known control flow using
//! decode only. Nothing is executed and the CPU is never consulted, so a
//! disassembler can run against a memory image while emulation is paused
//! elsewhere.

use std::collections::HashSet;

use log::trace;

use crate::memory::Memory;
use crate::opcodes::{Flow, Instruction, fetch_and_decode, format_bytes};

pub struct Disassembler<'m, M: Memory + ?Sized> {
    mem: &'m M,
}

impl<'m, M: Memory + ?Sized> Disassembler<'m, M> {
    pub fn new(mem: &'m M) -> Self {
        Self { mem }
    }

    /// Lazily walk the code reachable from `start`, in discovery order.
    ///
    /// With `permissive` set, conditional jumps and calls are followed down
    /// both edges; otherwise only the fall-through is taken.
    pub fn walk(&self, start: u16, permissive: bool) -> Walk<'m, M> {
        Walk {
            mem: self.mem,
            permissive,
            work: vec![start],
            queued: HashSet::from([start]),
        }
    }

    /// Every instruction reachable from `start`, sorted by address.
    pub fn disassemble(&self, start: u16, permissive: bool) -> Vec<Instruction> {
        let mut out: Vec<Instruction> = self.walk(start, permissive).collect();
        out.sort_by_key(|instr| instr.addr);
        out
    }

    /// Debugger-style listing: `ADDR: BYTES  MNEMONIC`, one line per
    /// reachable instruction.
    pub fn listing(&self, start: u16, permissive: bool) -> String {
        let mut s = String::new();
        for instr in self.disassemble(start, permissive) {
            let bytes = format_bytes(self.mem, instr.addr, instr.length());
            s.push_str(&format!("{:04X}: {bytes:<9} {instr}\n", instr.addr));
        }
        s
    }
}

/// Worklist traversal state. Cloning it forks the walk.
pub struct Walk<'m, M: Memory + ?Sized> {
    mem: &'m M,
    permissive: bool,
    work: Vec<u16>,
    queued: HashSet<u16>,
}

impl<M: Memory + ?Sized> Clone for Walk<'_, M> {
    fn clone(&self) -> Self {
        Self {
            mem: self.mem,
            permissive: self.permissive,
            work: self.work.clone(),
            queued: self.queued.clone(),
        }
    }
}

impl<M: Memory + ?Sized> Walk<'_, M> {
    fn enqueue(&mut self, addr: u16) {
        if self.queued.insert(addr) {
            self.work.push(addr);
        }
    }

    fn successors(&mut self, instr: &Instruction) {
        let next = instr.next_addr();
        match instr.flow() {
            Flow::Next => self.enqueue(next),
            Flow::Jump(target) | Flow::Call(target) | Flow::Restart(target) => {
                self.enqueue(target)
            }
            Flow::ConditionalJump(target) | Flow::ConditionalCall(target) => {
                if self.permissive {
                    self.enqueue(target);
                }
                self.enqueue(next);
            }
            Flow::Stop => {}
        }
    }
}

impl<M: Memory + ?Sized> Iterator for Walk<'_, M> {
    type Item = Instruction;

    fn next(&mut self) -> Option<Instruction> {
        while let Some(addr) = self.work.pop() {
            match fetch_and_decode(self.mem, addr) {
                Ok(instr) => {
                    self.successors(&instr);
                    return Some(instr);
                }
                Err(e) => trace!("disasm: abandoning path at {addr:04X}: {e}"),
            }
        }
        None
    }
}
