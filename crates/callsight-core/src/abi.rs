//! ABI register universe and calling-convention sets.
//!
//! An [`AbiProfile`] is an immutable value computed once per binary and
//! passed explicitly into every analysis step. It assigns each tracked
//! register a dense ABI index, and carries the three calling-convention
//! sets the call-site analysis works with:
//!
//! - parameter registers (what a caller may pass arguments in),
//! - return registers (what a callee hands back),
//! - not-killed registers (what survives across a call).

use std::collections::HashMap;

use crate::register::x86;
use crate::{Architecture, Error, Register, RegisterClass, RegisterSet};

/// Number of general purpose registers tracked on x86-64.
const X86_64_GPR_COUNT: u16 = 16;
/// Number of vector registers tracked on x86-64.
const X86_64_VECTOR_COUNT: u16 = 16;
/// How many vector registers can carry return values (xmm0, xmm1).
const X86_64_VECTOR_RETURN_SLOTS: u16 = 2;
/// How many vector registers can carry arguments (xmm0..xmm7).
const X86_64_VECTOR_PARAM_SLOTS: u16 = 8;

/// The register universe and calling-convention sets for one ABI.
#[derive(Debug)]
pub struct AbiProfile {
    architecture: Architecture,
    /// ABI index -> register, the universe in index order.
    registers: Vec<Register>,
    /// Register ID -> ABI index.
    index_by_id: HashMap<u16, usize>,
    param_regs: RegisterSet,
    return_regs: RegisterSet,
    not_killed_regs: RegisterSet,
}

impl AbiProfile {
    /// Builds the profile for an architecture.
    ///
    /// Only x86-64 System V is supported; other architectures are rejected
    /// with [`Error::UnsupportedAbi`].
    pub fn for_architecture(architecture: Architecture) -> Result<Self, Error> {
        match architecture {
            Architecture::X86_64 => Ok(Self::x86_64_sysv()),
            other => Err(Error::UnsupportedAbi(other)),
        }
    }

    /// x86-64 System V: 16 GPRs followed by 16 vector registers.
    fn x86_64_sysv() -> Self {
        let mut registers = Vec::new();
        for id in 0..X86_64_GPR_COUNT {
            registers.push(Register::new(RegisterClass::General, id, 64));
        }
        for n in 0..X86_64_VECTOR_COUNT {
            registers.push(Register::new(RegisterClass::Vector, x86::xmm(n), 128));
        }

        let index_by_id: HashMap<u16, usize> = registers
            .iter()
            .enumerate()
            .map(|(index, reg)| (reg.id, index))
            .collect();

        let width = registers.len();
        let gpr = |id: u16| index_by_id[&id];
        let vec_slot = |n: u16| index_by_id[&x86::xmm(n)];

        // Argument-passing registers. rax is included: variadic calls pass
        // the vector-register count in al.
        let mut param_regs = RegisterSet::from_indices(
            width,
            &[
                gpr(x86::RAX),
                gpr(x86::RDI),
                gpr(x86::RSI),
                gpr(x86::RDX),
                gpr(x86::RCX),
                gpr(x86::R8),
                gpr(x86::R9),
            ],
        );
        for n in 0..X86_64_VECTOR_PARAM_SLOTS {
            param_regs.insert(vec_slot(n));
        }

        let mut return_regs =
            RegisterSet::from_indices(width, &[gpr(x86::RAX), gpr(x86::RDX)]);
        for n in 0..X86_64_VECTOR_RETURN_SLOTS {
            return_regs.insert(vec_slot(n));
        }

        // Callee-saved registers plus the stack registers survive a call;
        // so do the callee's return registers.
        let callee_saved = RegisterSet::from_indices(
            width,
            &[
                gpr(x86::RBX),
                gpr(x86::RSP),
                gpr(x86::RBP),
                gpr(x86::R12),
                gpr(x86::R13),
                gpr(x86::R14),
                gpr(x86::R15),
            ],
        );
        let mut not_killed_regs = callee_saved;
        not_killed_regs.union_with(&return_regs);

        Self {
            architecture: Architecture::X86_64,
            registers,
            index_by_id,
            param_regs,
            return_regs,
            not_killed_regs,
        }
    }

    /// The architecture this profile describes.
    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// Width of the tracked register universe.
    pub fn universe_width(&self) -> usize {
        self.registers.len()
    }

    /// A fresh empty set over this universe.
    pub fn empty_set(&self) -> RegisterSet {
        RegisterSet::empty(self.universe_width())
    }

    /// The register at an ABI index.
    ///
    /// Panics if the index is outside the universe; indices only come from
    /// sets sized to it.
    pub fn register_at(&self, index: usize) -> Register {
        self.registers[index]
    }

    /// Canonical name of the register at an ABI index.
    pub fn register_name(&self, index: usize) -> &'static str {
        self.registers[index].name()
    }

    /// ABI index of exactly this register, without promotion.
    pub fn index_of(&self, reg: &Register) -> Option<usize> {
        self.index_by_id.get(&reg.id).copied()
    }

    /// ABI index of a register reference as an instruction exposes it.
    ///
    /// The register is first promoted to its widest ABI-visible alias; if
    /// the promoted form is tracked its index is used, otherwise the raw
    /// register's index, otherwise the register is outside the universe.
    pub fn abi_index(&self, reg: &Register) -> Option<usize> {
        let promoted = reg.promoted();
        self.index_of(&promoted).or_else(|| self.index_of(reg))
    }

    /// Argument-passing registers.
    pub fn param_regs(&self) -> &RegisterSet {
        &self.param_regs
    }

    /// Return-value registers.
    pub fn return_regs(&self) -> &RegisterSet {
        &self.return_regs
    }

    /// Registers that survive a call.
    pub fn not_killed_regs(&self) -> &RegisterSet {
        &self.not_killed_regs
    }
}
