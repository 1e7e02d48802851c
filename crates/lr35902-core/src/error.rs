use thiserror::Error;

/// Faults raised by the instruction core.
///
/// None of these are recoverable hardware states: a front-end is expected to
/// stop emulation and report them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    /// One of the eleven opcode slots the SM83 leaves undefined.
    #[error("invalid instruction ${opcode:02X} at ${addr:04X}")]
    InvalidInstruction { opcode: u8, addr: u16 },
    /// A descriptor lookup outside the 512-entry opcode space.
    #[error("opcode key ${0:04X} is outside the base/CB opcode space")]
    OpcodeOutOfRange(u16),
    #[error("serial transport: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, CpuError>;
