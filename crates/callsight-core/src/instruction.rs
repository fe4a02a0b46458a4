//! Instruction representation.

use crate::Register;

/// A decoded instruction, reduced to what the call-site analysis needs:
/// its address, its category, and the registers it touches.
#[derive(Debug, Clone)]
pub struct Instruction {
    /// Virtual address of this instruction.
    pub address: u64,
    /// Size in bytes.
    pub size: usize,
    /// Mnemonic string (e.g., "mov", "call").
    pub mnemonic: String,
    /// High-level operation category.
    pub operation: Operation,
    /// Registers read by this instruction.
    pub reads: Vec<Register>,
    /// Registers written by this instruction.
    pub writes: Vec<Register>,
}

impl Instruction {
    /// Creates a new instruction with no register effects.
    pub fn new(address: u64, size: usize, mnemonic: impl Into<String>) -> Self {
        Self {
            address,
            size,
            mnemonic: mnemonic.into(),
            operation: Operation::Other,
            reads: Vec::new(),
            writes: Vec::new(),
        }
    }

    /// Sets the operation.
    pub fn with_operation(mut self, op: Operation) -> Self {
        self.operation = op;
        self
    }

    /// Sets the read registers.
    pub fn with_reads(mut self, reads: Vec<Register>) -> Self {
        self.reads = reads;
        self
    }

    /// Sets the written registers.
    pub fn with_writes(mut self, writes: Vec<Register>) -> Self {
        self.writes = writes;
        self
    }

    /// Returns the end address (address + size).
    pub fn end_address(&self) -> u64 {
        self.address + self.size as u64
    }
}

/// High-level operation categories.
///
/// Only the categories the analysis distinguishes are represented;
/// everything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Function call.
    Call,
    /// `syscall` instruction.
    Syscall,
    /// `sysenter` instruction.
    Sysenter,
    /// Function return.
    Return,
    /// Unconditional jump.
    Jump,
    /// Conditional jump.
    ConditionalJump,
    /// Anything else.
    Other,
}
