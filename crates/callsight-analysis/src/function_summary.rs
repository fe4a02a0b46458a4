//! Per-function summary: block summaries, live-in propagation, call sites.

use std::collections::{BTreeMap, BTreeSet};

use log::warn;

use callsight_core::{AbiProfile, Function, ParamStorage, Program};

use crate::BlockSummary;

/// One emitted call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSiteRecord {
    /// Address of the call instruction.
    pub call_insn_addr: Option<u64>,
    /// Entry address of the callee, when statically known.
    pub called_addr: Option<u64>,
    /// True if the callee lies in a PLT section.
    pub is_to_plt: bool,
    /// Names of the argument registers live at the call.
    pub live_registers: Vec<String>,
    /// Names attributed to the callee.
    pub func_names: Vec<String>,
}

/// The analysis of one function.
///
/// Owns a block summary per basic block, keyed by start address, plus the
/// set of call-block addresses. Built when the driver visits the function
/// and dropped once its report entry has been written.
pub struct FunctionSummary<'a> {
    function: &'a Function,
    abi: &'a AbiProfile,
    blocks: BTreeMap<u64, BlockSummary>,
    call_blocks: BTreeSet<u64>,
}

impl<'a> FunctionSummary<'a> {
    /// Analyzes a function: summarize every block, seed the entry block
    /// with debug-info parameter registers, and propagate live-in sets to
    /// a fixed point.
    pub fn new(function: &'a Function, program: &Program, abi: &'a AbiProfile) -> Self {
        let mut summary = Self {
            function,
            abi,
            blocks: BTreeMap::new(),
            call_blocks: BTreeSet::new(),
        };

        for block in function.cfg.blocks() {
            let block_summary = BlockSummary::summarize(block, abi);
            if block_summary.is_call_block() {
                summary.call_blocks.insert(block.start);
            }
            if summary.blocks.insert(block.start, block_summary).is_some() {
                warn!(
                    "function {}: block address {:#x} already processed",
                    function.name, block.start
                );
            }
        }

        summary.seed_param_regs(program);
        summary.propagate_start_regs();
        summary
    }

    /// The function being summarized.
    pub fn function(&self) -> &Function {
        self.function
    }

    /// Looks up one block summary.
    pub fn block(&self, addr: u64) -> Option<&BlockSummary> {
        self.blocks.get(&addr)
    }

    /// Iterates block summaries in ascending address order.
    pub fn blocks(&self) -> impl Iterator<Item = &BlockSummary> {
        self.blocks.values()
    }

    /// Call-block addresses in ascending order.
    pub fn call_block_addrs(&self) -> impl Iterator<Item = u64> + '_ {
        self.call_blocks.iter().copied()
    }

    /// Marks the registers that hold formal parameters on entry as used by
    /// the entry block.
    ///
    /// Debug info is looked up by the declared entry address, then by the
    /// lowest block address as a fallback for functions whose declared
    /// entry block is absent. A parameter location counts when its storage
    /// has a register component and its address interval overlaps the
    /// entry block.
    fn seed_param_regs(&mut self, program: &Program) {
        if self.blocks.is_empty() {
            return;
        }

        let declared_entry = self.function.cfg.entry;
        let (entry_addr, info) = match program.debug_info_for(declared_entry) {
            Some(info) if self.blocks.contains_key(&declared_entry) => (declared_entry, info),
            _ => {
                let first = match self.blocks.keys().next() {
                    Some(&addr) => addr,
                    None => return,
                };
                match program.debug_info_for(first) {
                    Some(info) => (first, info),
                    None => return,
                }
            }
        };

        let (entry_start, entry_end) = match self.function.cfg.block(entry_addr) {
            Some(block) => (block.start, block.end),
            None => return,
        };

        for param in &info.params {
            for loc in &param.locations {
                let has_register = matches!(
                    loc.storage,
                    ParamStorage::Register | ParamStorage::RegisterOffset
                );
                if !has_register || !loc.overlaps(entry_start, entry_end) {
                    continue;
                }
                if let (Some(reg), Some(entry)) = (loc.register, self.blocks.get_mut(&entry_addr))
                {
                    entry.add_param_reg(&reg, self.abi);
                }
            }
        }
    }

    /// Computes every block's live-in set as the least fixed point of
    /// `start(B) = ⋃ out(P)` over intraprocedural predecessors.
    ///
    /// The work list is kept in ascending address order so the result, and
    /// with it the emitted report, is byte-reproducible.
    fn propagate_start_regs(&mut self) {
        let mut pending: BTreeSet<u64> = self.blocks.keys().copied().collect();

        while let Some(addr) = pending.pop_first() {
            let mut new_start = self.abi.empty_set();
            for pred in self.function.cfg.intra_predecessors(addr) {
                if let Some(pred_summary) = self.blocks.get(&pred) {
                    new_start.union_with(&pred_summary.out_regs(self.abi));
                }
            }

            let block = match self.blocks.get_mut(&addr) {
                Some(block) => block,
                None => continue,
            };
            if new_start != *block.start_regs() {
                block.set_start_regs(new_start);
                for succ in self.function.cfg.intra_successors(addr) {
                    if self.blocks.contains_key(&succ) {
                        pending.insert(succ);
                    }
                }
            }
        }
    }

    /// Derives the call records of this function, in ascending call-block
    /// address order.
    ///
    /// The reported registers are the call-site live set (live-in union
    /// block-local uses) intersected with the ABI's argument registers.
    /// One record is produced per CALL edge; a call block without any CALL
    /// edge (an unresolved indirect call) produces a single record with no
    /// callee.
    pub fn call_sites(&self, program: &Program) -> Vec<CallSiteRecord> {
        let mut records = Vec::new();

        for &addr in &self.call_blocks {
            let block = &self.blocks[&addr];
            let mut live = block.call_site_regs();
            live.intersect_with(self.abi.param_regs());
            let live_registers: Vec<String> = live
                .ones()
                .map(|i| strip_register_namespace(self.abi.register_name(i)).to_string())
                .collect();

            let mut num_call_targets = 0;
            for edge in self.function.cfg.call_edges(addr) {
                num_call_targets += 1;
                let (called_addr, is_to_plt, func_names) = match edge.target {
                    Some(target) => {
                        let names = program.function_names_at(target).to_vec();
                        let is_to_plt = match program.function_at(target) {
                            Some(callee) => callee.is_in_plt(),
                            None => program.is_plt_address(target),
                        };
                        (Some(target), is_to_plt, names)
                    }
                    None => (None, false, Vec::new()),
                };
                records.push(CallSiteRecord {
                    call_insn_addr: block.call_insn_addr(),
                    called_addr,
                    is_to_plt,
                    live_registers: live_registers.clone(),
                    func_names,
                });
            }

            if num_call_targets == 0 {
                records.push(CallSiteRecord {
                    call_insn_addr: block.call_insn_addr(),
                    called_addr: None,
                    is_to_plt: false,
                    live_registers: live_registers.clone(),
                    func_names: Vec::new(),
                });
            }
        }

        records
    }
}

/// Strips a `namespace:` qualifier from a register name, up to and
/// including the last ':'.
pub fn strip_register_namespace(name: &str) -> &str {
    match name.rfind(':') {
        Some(i) => &name[i + 1..],
        None => name,
    }
}
