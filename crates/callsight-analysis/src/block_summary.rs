//! Per-block register summary.

use callsight_core::{AbiProfile, BasicBlock, Operation, Register, RegisterSet};

/// What one basic block does with the register bank.
///
/// `used_regs` is fixed once the block's instructions have been summarized
/// (parameter seeding extends the entry block before propagation starts);
/// `start_regs` is filled in by the fixed-point propagation and only ever
/// grows.
#[derive(Debug, Clone)]
pub struct BlockSummary {
    addr: u64,
    is_call_block: bool,
    is_syscall_block: bool,
    call_insn_addr: Option<u64>,
    used_regs: RegisterSet,
    start_regs: RegisterSet,
}

impl BlockSummary {
    /// Summarizes a block's instructions against an ABI profile.
    ///
    /// Every register an instruction reads or writes is promoted and, when
    /// tracked by the ABI, recorded in the used set. A call instruction
    /// marks the block a call block and records the call's address; a
    /// `syscall`/`sysenter` marks it a syscall block.
    pub fn summarize(block: &BasicBlock, abi: &AbiProfile) -> Self {
        let mut used_regs = abi.empty_set();
        let mut is_call_block = false;
        let mut is_syscall_block = false;
        let mut call_insn_addr = None;

        for inst in &block.instructions {
            for reg in inst.reads.iter().chain(inst.writes.iter()) {
                if let Some(index) = abi.abi_index(reg) {
                    used_regs.insert(index);
                }
            }
            match inst.operation {
                Operation::Call => {
                    is_call_block = true;
                    call_insn_addr = Some(inst.address);
                }
                Operation::Syscall | Operation::Sysenter => {
                    is_syscall_block = true;
                }
                _ => {}
            }
        }

        Self {
            addr: block.start,
            is_call_block,
            is_syscall_block,
            call_insn_addr,
            used_regs,
            start_regs: abi.empty_set(),
        }
    }

    /// Block start address.
    pub fn addr(&self) -> u64 {
        self.addr
    }

    /// True if the block ends in a call.
    pub fn is_call_block(&self) -> bool {
        self.is_call_block
    }

    /// True if the block contains a `syscall` or `sysenter`.
    pub fn is_syscall_block(&self) -> bool {
        self.is_syscall_block
    }

    /// Address of the call instruction, if this is a call block.
    pub fn call_insn_addr(&self) -> Option<u64> {
        self.call_insn_addr
    }

    /// Registers referenced by the block's instructions.
    pub fn used_regs(&self) -> &RegisterSet {
        &self.used_regs
    }

    /// Registers live at the block's entry.
    pub fn start_regs(&self) -> &RegisterSet {
        &self.start_regs
    }

    /// Replaces the live-in set during propagation.
    pub fn set_start_regs(&mut self, regs: RegisterSet) {
        self.start_regs = regs;
    }

    /// Marks a debug-info parameter register as used by this block.
    pub fn add_param_reg(&mut self, reg: &Register, abi: &AbiProfile) {
        if let Some(index) = abi.abi_index(reg) {
            self.used_regs.insert(index);
        }
    }

    /// Registers live at the block's exit.
    ///
    /// For a call block the call-site transfer function applies: of the
    /// pre-call live set only not-killed registers survive, and the
    /// callee's return registers become defined.
    pub fn out_regs(&self, abi: &AbiProfile) -> RegisterSet {
        let mut out = self.used_regs.clone();
        out.union_with(&self.start_regs);
        if self.is_call_block {
            out.intersect_with(abi.not_killed_regs());
            out.union_with(abi.return_regs());
        }
        out
    }

    /// Registers live at the call instruction itself: the pre-call view,
    /// with no clobber applied.
    pub fn call_site_regs(&self) -> RegisterSet {
        let mut out = self.used_regs.clone();
        out.union_with(&self.start_regs);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callsight_core::register::x86;
    use callsight_core::{Architecture, Instruction, RegisterClass};

    fn abi() -> AbiProfile {
        AbiProfile::for_architecture(Architecture::X86_64).unwrap()
    }

    fn gpr(id: u16, size: u16) -> Register {
        Register::new(RegisterClass::General, id, size)
    }

    fn index_of(abi: &AbiProfile, name: &str) -> usize {
        (0..abi.universe_width())
            .find(|&i| abi.register_name(i) == name)
            .unwrap()
    }

    fn block_with(instructions: Vec<Instruction>) -> BasicBlock {
        let mut block = BasicBlock::new(0x1000);
        for inst in instructions {
            block.push_instruction(inst);
        }
        block
    }

    #[test]
    fn test_used_regs_promote_sub_registers() {
        let abi = abi();
        let block = block_with(vec![Instruction::new(0x1000, 2, "mov")
            .with_writes(vec![gpr(x86::RDI, 32)])
            .with_reads(vec![gpr(x86::RAX, 8)])]);
        let summary = BlockSummary::summarize(&block, &abi);
        assert!(summary.used_regs().contains(index_of(&abi, "rdi")));
        assert!(summary.used_regs().contains(index_of(&abi, "rax")));
        assert_eq!(summary.used_regs().count(), 2);
    }

    #[test]
    fn test_untracked_registers_are_ignored() {
        let abi = abi();
        let rip = Register::new(RegisterClass::ProgramCounter, x86::RIP, 64);
        let block = block_with(vec![Instruction::new(0x1000, 7, "lea").with_reads(vec![rip])]);
        let summary = BlockSummary::summarize(&block, &abi);
        assert!(summary.used_regs().is_empty());
    }

    #[test]
    fn test_call_classification() {
        let abi = abi();
        let block = block_with(vec![
            Instruction::new(0x1000, 3, "mov"),
            Instruction::new(0x1003, 5, "call").with_operation(Operation::Call),
        ]);
        let summary = BlockSummary::summarize(&block, &abi);
        assert!(summary.is_call_block());
        assert_eq!(summary.call_insn_addr(), Some(0x1003));
        assert!(!summary.is_syscall_block());
    }

    #[test]
    fn test_syscall_classification() {
        let abi = abi();
        let block = block_with(vec![
            Instruction::new(0x1000, 2, "syscall").with_operation(Operation::Syscall)
        ]);
        let summary = BlockSummary::summarize(&block, &abi);
        assert!(summary.is_syscall_block());
        assert!(!summary.is_call_block());
        assert_eq!(summary.call_insn_addr(), None);
    }

    #[test]
    fn test_out_regs_without_call_is_start_union_used() {
        let abi = abi();
        let block = block_with(vec![
            Instruction::new(0x1000, 3, "mov").with_writes(vec![gpr(x86::RDI, 64)])
        ]);
        let mut summary = BlockSummary::summarize(&block, &abi);
        let mut start = abi.empty_set();
        start.insert(index_of(&abi, "rsi"));
        summary.set_start_regs(start);

        let out = summary.out_regs(&abi);
        assert!(out.contains(index_of(&abi, "rdi")));
        assert!(out.contains(index_of(&abi, "rsi")));
        assert_eq!(out, summary.call_site_regs());
    }

    #[test]
    fn test_out_regs_of_call_block_applies_clobber() {
        let abi = abi();
        let block = block_with(vec![
            Instruction::new(0x1000, 3, "mov")
                .with_writes(vec![gpr(x86::RDI, 64), gpr(x86::RBX, 64)]),
            Instruction::new(0x1003, 5, "call").with_operation(Operation::Call),
        ]);
        let summary = BlockSummary::summarize(&block, &abi);
        let out = summary.out_regs(&abi);

        // rdi is killed by the call, rbx survives, rax is newly defined.
        assert!(!out.contains(index_of(&abi, "rdi")));
        assert!(out.contains(index_of(&abi, "rbx")));
        assert!(out.contains(index_of(&abi, "rax")));

        // The exit set of a call block stays inside notKilled ∪ return.
        let mut bound = abi.not_killed_regs().clone();
        bound.union_with(abi.return_regs());
        assert!(out.is_subset(&bound));
    }

    #[test]
    fn test_call_site_regs_have_no_clobber() {
        let abi = abi();
        let block = block_with(vec![
            Instruction::new(0x1000, 3, "mov").with_writes(vec![gpr(x86::RDI, 64)]),
            Instruction::new(0x1003, 5, "call").with_operation(Operation::Call),
        ]);
        let summary = BlockSummary::summarize(&block, &abi);
        assert!(summary.call_site_regs().contains(index_of(&abi, "rdi")));
    }
}
