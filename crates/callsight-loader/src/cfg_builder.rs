//! Control flow graph construction from decoded instructions.

use std::collections::BTreeSet;

use callsight_core::{BasicBlock, ControlFlowGraph, EdgeKind, Operation};

use crate::disasm::Decoded;

/// Builds the intraprocedural CFG of one function.
pub struct CfgBuilder;

impl CfgBuilder {
    /// Builds a CFG from the decoded instructions of a function occupying
    /// [`entry`, `end`).
    ///
    /// Leaders are the entry, every in-range transfer target, and the
    /// instruction after every block terminator. Control transfers leaving
    /// the range become interprocedural edges (calls, tail calls, returns);
    /// unresolved indirect targets become sentinel edges.
    pub fn build(decoded: &[Decoded], entry: u64, end: u64) -> ControlFlowGraph {
        let mut cfg = ControlFlowGraph::new(entry);
        if decoded.is_empty() {
            return cfg;
        }

        let in_range = |addr: u64| addr >= entry && addr < end;

        // Step 1: leaders.
        let mut leaders = BTreeSet::new();
        leaders.insert(entry);
        for d in decoded {
            let next = d.inst.end_address();
            match d.inst.operation {
                Operation::Jump | Operation::ConditionalJump | Operation::Return => {
                    if let Some(target) = d.target.filter(|&t| in_range(t)) {
                        leaders.insert(target);
                    }
                    if in_range(next) {
                        leaders.insert(next);
                    }
                }
                Operation::Call | Operation::Syscall | Operation::Sysenter => {
                    if in_range(next) {
                        leaders.insert(next);
                    }
                }
                Operation::Other => {}
            }
        }

        // Step 2: slice instructions into blocks.
        let leaders_vec: Vec<u64> = leaders.iter().copied().collect();
        for (i, &leader) in leaders_vec.iter().enumerate() {
            let block_end = leaders_vec.get(i + 1).copied().unwrap_or(u64::MAX);
            let mut block = BasicBlock::new(leader);
            for d in decoded {
                if d.inst.address >= leader && d.inst.address < block_end {
                    block.push_instruction(d.inst.clone());
                }
            }
            if !block.is_empty() {
                cfg.add_block(block);
            }
        }

        // Step 3: edges from each block's last instruction.
        let block_addrs: Vec<u64> = cfg.block_addrs().collect();
        for &addr in &block_addrs {
            let Some(last) = cfg.block(addr).and_then(|b| b.last_instruction()) else {
                continue;
            };
            let last_addr = last.address;
            let next = last.end_address();
            let operation = last.operation;
            let target = decoded
                .iter()
                .find(|d| d.inst.address == last_addr)
                .and_then(|d| d.target);

            match operation {
                Operation::Jump => {
                    match target {
                        Some(t) if in_range(t) => cfg.add_edge(addr, Some(t), EdgeKind::Jump),
                        Some(t) => cfg.add_edge(addr, Some(t), EdgeKind::TailCall),
                        None => cfg.add_edge(addr, None, EdgeKind::Jump),
                    }
                }
                Operation::ConditionalJump => {
                    match target {
                        Some(t) if in_range(t) => cfg.add_edge(addr, Some(t), EdgeKind::Branch),
                        Some(t) => cfg.add_edge(addr, Some(t), EdgeKind::TailCall),
                        None => cfg.add_edge(addr, None, EdgeKind::Branch),
                    }
                    if in_range(next) {
                        cfg.add_edge(addr, Some(next), EdgeKind::Fallthrough);
                    }
                }
                Operation::Call => {
                    cfg.add_edge(addr, target, EdgeKind::Call);
                    if in_range(next) {
                        cfg.add_edge(addr, Some(next), EdgeKind::Fallthrough);
                    }
                }
                Operation::Return => {
                    cfg.add_edge(addr, None, EdgeKind::Return);
                }
                Operation::Syscall | Operation::Sysenter | Operation::Other => {
                    // Ends the block only because the next address is a
                    // leader; control continues there.
                    if in_range(next) {
                        cfg.add_edge(addr, Some(next), EdgeKind::Fallthrough);
                    }
                }
            }
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callsight_core::Instruction;

    fn other(addr: u64, size: usize) -> Decoded {
        Decoded {
            inst: Instruction::new(addr, size, "mov"),
            target: None,
        }
    }

    fn transfer(addr: u64, size: usize, mnemonic: &str, op: Operation, target: Option<u64>) -> Decoded {
        Decoded {
            inst: Instruction::new(addr, size, mnemonic).with_operation(op),
            target,
        }
    }

    #[test]
    fn test_straight_line_is_one_block() {
        let decoded = vec![
            other(0x1000, 3),
            other(0x1003, 3),
            transfer(0x1006, 1, "ret", Operation::Return, None),
        ];
        let cfg = CfgBuilder::build(&decoded, 0x1000, 0x1007);
        assert_eq!(cfg.num_blocks(), 1);
        let block = cfg.block(0x1000).unwrap();
        assert_eq!(block.len(), 3);
        assert_eq!(block.end, 0x1007);
        assert!(cfg.intra_successors(0x1000).is_empty());
    }

    #[test]
    fn test_conditional_branch_splits_blocks() {
        // 0x1000: je 0x1008 / 0x1002: mov / 0x1005: jmp 0x100a /
        // 0x1008: mov / 0x100a: ret
        let decoded = vec![
            transfer(0x1000, 2, "je", Operation::ConditionalJump, Some(0x1008)),
            other(0x1002, 3),
            transfer(0x1005, 3, "jmp", Operation::Jump, Some(0x100a)),
            other(0x1008, 2),
            transfer(0x100a, 1, "ret", Operation::Return, None),
        ];
        let cfg = CfgBuilder::build(&decoded, 0x1000, 0x100b);
        let addrs: Vec<u64> = cfg.block_addrs().collect();
        assert_eq!(addrs, vec![0x1000, 0x1002, 0x1008, 0x100a]);

        let mut succs = cfg.intra_successors(0x1000);
        succs.sort_unstable();
        assert_eq!(succs, vec![0x1002, 0x1008]);
        assert_eq!(cfg.intra_successors(0x1002), vec![0x100a]);
        assert_eq!(cfg.intra_successors(0x1008), vec![0x100a]);

        let mut preds = cfg.intra_predecessors(0x100a);
        preds.sort_unstable();
        assert_eq!(preds, vec![0x1002, 0x1008]);
    }

    #[test]
    fn test_call_terminates_block_with_fallthrough() {
        let decoded = vec![
            other(0x1000, 5),
            transfer(0x1005, 5, "call", Operation::Call, Some(0x2000)),
            other(0x100a, 3),
            transfer(0x100d, 1, "ret", Operation::Return, None),
        ];
        let cfg = CfgBuilder::build(&decoded, 0x1000, 0x100e);
        let addrs: Vec<u64> = cfg.block_addrs().collect();
        assert_eq!(addrs, vec![0x1000, 0x100a]);

        let calls: Vec<_> = cfg.call_edges(0x1000).collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].target, Some(0x2000));
        assert_eq!(cfg.intra_successors(0x1000), vec![0x100a]);
    }

    #[test]
    fn test_indirect_call_gets_sentinel_call_edge() {
        let decoded = vec![
            transfer(0x1000, 2, "call", Operation::Call, None),
            transfer(0x1002, 1, "ret", Operation::Return, None),
        ];
        let cfg = CfgBuilder::build(&decoded, 0x1000, 0x1003);
        let calls: Vec<_> = cfg.call_edges(0x1000).collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].target, None);
    }

    #[test]
    fn test_jump_out_of_range_is_tail_call() {
        let decoded = vec![transfer(0x1000, 5, "jmp", Operation::Jump, Some(0x5000))];
        let cfg = CfgBuilder::build(&decoded, 0x1000, 0x1005);
        let edges = cfg.out_edges(0x1000);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, EdgeKind::TailCall);
        assert_eq!(edges[0].target, Some(0x5000));
        assert!(cfg.intra_successors(0x1000).is_empty());
    }

    #[test]
    fn test_backward_jump_forms_loop() {
        let decoded = vec![
            other(0x1000, 3),
            other(0x1003, 3),
            transfer(0x1006, 2, "jne", Operation::ConditionalJump, Some(0x1003)),
            transfer(0x1008, 1, "ret", Operation::Return, None),
        ];
        let cfg = CfgBuilder::build(&decoded, 0x1000, 0x1009);
        let addrs: Vec<u64> = cfg.block_addrs().collect();
        assert_eq!(addrs, vec![0x1000, 0x1003, 0x1008]);
        let mut succs = cfg.intra_successors(0x1003);
        succs.sort_unstable();
        assert_eq!(succs, vec![0x1003, 0x1008]);
    }

    #[test]
    fn test_empty_function() {
        let cfg = CfgBuilder::build(&[], 0x1000, 0x1000);
        assert_eq!(cfg.num_blocks(), 0);
    }
}
