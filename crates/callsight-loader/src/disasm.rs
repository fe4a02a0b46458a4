//! Instruction decoding via capstone.
//!
//! Decodes x86-64 code regions and reduces each instruction to the model
//! the analysis needs: its category, the registers it touches, and - for
//! control transfers - the static target when there is one.

use capstone::arch::x86::X86OperandType;
use capstone::arch::ArchOperand;
use capstone::prelude::*;
use capstone::Capstone;

use callsight_core::register::x86;
use callsight_core::{Instruction, Operation, Register, RegisterClass};

use crate::LoadError;

/// One decoded instruction plus the control-transfer target capstone could
/// resolve statically (None for indirect transfers and non-transfers).
#[derive(Debug)]
pub struct Decoded {
    /// The model instruction.
    pub inst: Instruction,
    /// Absolute branch/call target, when the operand is an immediate.
    pub target: Option<u64>,
}

/// A configured x86-64 decoder.
pub struct InstructionDecoder {
    cs: Capstone,
}

impl InstructionDecoder {
    /// Builds an x86-64 decoder with detail mode on (detail mode is what
    /// exposes per-instruction register access).
    pub fn new() -> Result<Self, LoadError> {
        let cs = Capstone::new()
            .x86()
            .mode(arch::x86::ArchMode::Mode64)
            .detail(true)
            .build()
            .map_err(LoadError::Disasm)?;
        Ok(Self { cs })
    }

    /// Decodes the bytes of one code region starting at `addr`.
    ///
    /// Decoding stops at the first undecodable byte; everything decoded up
    /// to that point is returned.
    pub fn decode(&self, bytes: &[u8], addr: u64) -> Result<Vec<Decoded>, LoadError> {
        let insns = self
            .cs
            .disasm_all(bytes, addr)
            .map_err(LoadError::Disasm)?;

        let mut decoded = Vec::with_capacity(insns.len());
        for insn in insns.iter() {
            let mnemonic = insn.mnemonic().unwrap_or("");
            let operation = classify_mnemonic(mnemonic);

            let mut reads = Vec::new();
            let mut writes = Vec::new();
            let mut target = None;

            if let Ok(detail) = self.cs.insn_detail(insn) {
                for &reg_id in detail.regs_read() {
                    self.push_reg(reg_id, &mut reads);
                }
                for &reg_id in detail.regs_write() {
                    self.push_reg(reg_id, &mut writes);
                }

                for op in detail.arch_detail().operands() {
                    if let ArchOperand::X86Operand(x86_op) = op {
                        match x86_op.op_type {
                            X86OperandType::Reg(reg_id) => {
                                self.push_reg(reg_id, &mut reads);
                            }
                            X86OperandType::Mem(mem) => {
                                self.push_reg(mem.base(), &mut reads);
                                self.push_reg(mem.index(), &mut reads);
                            }
                            X86OperandType::Imm(imm) => {
                                if is_transfer(operation) {
                                    target = Some(imm as u64);
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }

            let inst = Instruction::new(insn.address(), insn.bytes().len(), mnemonic)
                .with_operation(operation)
                .with_reads(reads)
                .with_writes(writes);
            decoded.push(Decoded { inst, target });
        }

        Ok(decoded)
    }

    /// Maps a capstone register, via its name, into the model; registers
    /// outside the modeled bank are dropped.
    fn push_reg(&self, reg_id: RegId, out: &mut Vec<Register>) {
        if reg_id == RegId(0) {
            return;
        }
        let Some(name) = self.cs.reg_name(reg_id) else {
            return;
        };
        if let Some(reg) = register_by_name(&name) {
            if !out.contains(&reg) {
                out.push(reg);
            }
        }
    }
}

fn is_transfer(operation: Operation) -> bool {
    matches!(
        operation,
        Operation::Call | Operation::Jump | Operation::ConditionalJump
    )
}

/// Classifies an instruction by mnemonic.
fn classify_mnemonic(mnemonic: &str) -> Operation {
    match mnemonic {
        "call" | "lcall" => Operation::Call,
        "syscall" => Operation::Syscall,
        "sysenter" => Operation::Sysenter,
        "ret" | "retq" | "retf" | "iret" | "iretq" => Operation::Return,
        "jmp" | "ljmp" => Operation::Jump,
        _ if mnemonic.starts_with('j') => Operation::ConditionalJump,
        _ => Operation::Other,
    }
}

/// Resolves a register name as capstone spells it into the model register.
///
/// Returns None for anything outside the tracked bank (rip, flags, and
/// segment registers are modeled but untracked; x87/MMX/control registers
/// are not modeled at all).
fn register_by_name(name: &str) -> Option<Register> {
    let gpr = |id: u16, size: u16| Some(Register::new(RegisterClass::General, id, size));

    if let Some(rest) = name
        .strip_prefix("xmm")
        .or_else(|| name.strip_prefix("ymm"))
        .or_else(|| name.strip_prefix("zmm"))
    {
        let n: u16 = rest.parse().ok()?;
        if n >= 16 {
            return None;
        }
        let size = match &name[..1] {
            "x" => 128,
            "y" => 256,
            _ => 512,
        };
        return Some(Register::new(RegisterClass::Vector, x86::xmm(n), size));
    }

    match name {
        "rax" => gpr(x86::RAX, 64),
        "rcx" => gpr(x86::RCX, 64),
        "rdx" => gpr(x86::RDX, 64),
        "rbx" => gpr(x86::RBX, 64),
        "rsp" => gpr(x86::RSP, 64),
        "rbp" => gpr(x86::RBP, 64),
        "rsi" => gpr(x86::RSI, 64),
        "rdi" => gpr(x86::RDI, 64),
        "r8" => gpr(x86::R8, 64),
        "r9" => gpr(x86::R9, 64),
        "r10" => gpr(x86::R10, 64),
        "r11" => gpr(x86::R11, 64),
        "r12" => gpr(x86::R12, 64),
        "r13" => gpr(x86::R13, 64),
        "r14" => gpr(x86::R14, 64),
        "r15" => gpr(x86::R15, 64),

        "eax" => gpr(x86::RAX, 32),
        "ecx" => gpr(x86::RCX, 32),
        "edx" => gpr(x86::RDX, 32),
        "ebx" => gpr(x86::RBX, 32),
        "esp" => gpr(x86::RSP, 32),
        "ebp" => gpr(x86::RBP, 32),
        "esi" => gpr(x86::RSI, 32),
        "edi" => gpr(x86::RDI, 32),
        "r8d" => gpr(x86::R8, 32),
        "r9d" => gpr(x86::R9, 32),
        "r10d" => gpr(x86::R10, 32),
        "r11d" => gpr(x86::R11, 32),
        "r12d" => gpr(x86::R12, 32),
        "r13d" => gpr(x86::R13, 32),
        "r14d" => gpr(x86::R14, 32),
        "r15d" => gpr(x86::R15, 32),

        "ax" => gpr(x86::RAX, 16),
        "cx" => gpr(x86::RCX, 16),
        "dx" => gpr(x86::RDX, 16),
        "bx" => gpr(x86::RBX, 16),
        "sp" => gpr(x86::RSP, 16),
        "bp" => gpr(x86::RBP, 16),
        "si" => gpr(x86::RSI, 16),
        "di" => gpr(x86::RDI, 16),
        "r8w" => gpr(x86::R8, 16),
        "r9w" => gpr(x86::R9, 16),
        "r10w" => gpr(x86::R10, 16),
        "r11w" => gpr(x86::R11, 16),
        "r12w" => gpr(x86::R12, 16),
        "r13w" => gpr(x86::R13, 16),
        "r14w" => gpr(x86::R14, 16),
        "r15w" => gpr(x86::R15, 16),

        "al" | "ah" => gpr(x86::RAX, 8),
        "cl" | "ch" => gpr(x86::RCX, 8),
        "dl" | "dh" => gpr(x86::RDX, 8),
        "bl" | "bh" => gpr(x86::RBX, 8),
        "spl" => gpr(x86::RSP, 8),
        "bpl" => gpr(x86::RBP, 8),
        "sil" => gpr(x86::RSI, 8),
        "dil" => gpr(x86::RDI, 8),
        "r8b" => gpr(x86::R8, 8),
        "r9b" => gpr(x86::R9, 8),
        "r10b" => gpr(x86::R10, 8),
        "r11b" => gpr(x86::R11, 8),
        "r12b" => gpr(x86::R12, 8),
        "r13b" => gpr(x86::R13, 8),
        "r14b" => gpr(x86::R14, 8),
        "r15b" => gpr(x86::R15, 8),

        "rip" => Some(Register::new(RegisterClass::ProgramCounter, x86::RIP, 64)),
        "rflags" | "eflags" => Some(Register::new(RegisterClass::Flags, x86::RFLAGS, 64)),

        "cs" => Some(Register::new(RegisterClass::Segment, x86::CS, 16)),
        "ds" => Some(Register::new(RegisterClass::Segment, x86::DS, 16)),
        "es" => Some(Register::new(RegisterClass::Segment, x86::ES, 16)),
        "fs" => Some(Register::new(RegisterClass::Segment, x86::FS, 16)),
        "gs" => Some(Register::new(RegisterClass::Segment, x86::GS, 16)),
        "ss" => Some(Register::new(RegisterClass::Segment, x86::SS, 16)),

        _ => None,
    }
}
