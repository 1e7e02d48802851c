//! Instruction-execution core for the Game Boy's LR35902 (SM83) CPU.
//!
//! The crate decodes and executes instructions against a caller-supplied
//! [`memory::Memory`], reproducing register, flag, timing, interrupt and halt
//! behavior. It also offers a side-effect-free breakpoint evaluator and a
//! static reachability disassembler built on the same opcode table.
//! Video, audio and cartridge hardware live behind the memory interface.

/// Flag arithmetic shared by the 8-bit and 16-bit instruction groups.
pub mod alu;

/// Pre-execution breakpoint evaluation.
pub mod breakpoints;

/// The execution engine.
pub mod cpu;

/// Static reachability disassembly.
pub mod disasm;

pub mod error;

mod exec;

/// Interrupt sources, IE/IF access and the IME latch.
pub mod interrupts;

/// The memory collaborator interface.
pub mod memory;

/// Opcode descriptor table and instruction decoding.
pub mod opcodes;

/// Register file.
pub mod registers;

/// Serial transport interface and link capture.
pub mod serial;

pub use breakpoints::{BreakpointHit, BreakpointKind, BreakpointSets};
pub use cpu::Cpu;
pub use disasm::Disassembler;
pub use error::{CpuError, Result};
pub use memory::{FlatMemory, Memory};
pub use opcodes::{Instruction, opcode_table};
pub use registers::Registers;
