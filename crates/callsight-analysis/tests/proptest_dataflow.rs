//! Property-based tests for the start-register propagation.
//!
//! These verify the dataflow invariants on randomly generated functions:
//! - the propagation reaches a true fixed point,
//! - live sets never leave the ABI universe,
//! - the call-site transfer function bounds a call block's exit set,
//! - the analysis is deterministic,
//! - call records come out in ascending address order.

use proptest::prelude::*;

use callsight_analysis::FunctionSummary;
use callsight_core::{
    AbiProfile, Architecture, BasicBlock, ControlFlowGraph, EdgeKind, Function, Instruction,
    Operation, Program, Register, RegisterClass, Section,
};

const BLOCK_STRIDE: u64 = 0x10;
const BASE_ADDR: u64 = 0x1000;

/// Description of one generated block: registers its instructions touch,
/// and whether it ends in a call.
#[derive(Debug, Clone)]
struct BlockSpec {
    reg_ids: Vec<u16>,
    is_call: bool,
}

fn arb_block_spec() -> impl Strategy<Value = BlockSpec> {
    (
        prop::collection::vec(0u16..16, 0..4),
        prop::bool::weighted(0.3),
    )
        .prop_map(|(reg_ids, is_call)| BlockSpec { reg_ids, is_call })
}

/// A random function: up to `max_blocks` blocks with random register
/// effects and random intraprocedural edges.
fn arb_function(max_blocks: usize) -> impl Strategy<Value = Function> {
    prop::collection::vec(arb_block_spec(), 1..=max_blocks)
        .prop_flat_map(|specs| {
            let n = specs.len();
            let edges = prop::collection::vec((0..n, 0..n), 0..n * 2);
            (Just(specs), edges)
        })
        .prop_map(|(specs, edges)| {
            let addr_of = |i: usize| BASE_ADDR + (i as u64) * BLOCK_STRIDE;
            let mut cfg = ControlFlowGraph::new(BASE_ADDR);

            for (i, spec) in specs.iter().enumerate() {
                let start = addr_of(i);
                let mut block = BasicBlock::new(start);
                let regs: Vec<Register> = spec
                    .reg_ids
                    .iter()
                    .map(|&id| Register::new(RegisterClass::General, id, 64))
                    .collect();
                block.push_instruction(
                    Instruction::new(start, 4, "mov").with_reads(regs),
                );
                if spec.is_call {
                    block.push_instruction(
                        Instruction::new(start + 4, 5, "call").with_operation(Operation::Call),
                    );
                    cfg.add_edge(start, Some(0x500), EdgeKind::Call);
                }
                cfg.add_block(block);
            }

            for (from, to) in edges {
                cfg.add_edge(addr_of(from), Some(addr_of(to)), EdgeKind::Jump);
            }

            Function {
                name: "generated".to_string(),
                entry: BASE_ADDR,
                section_name: Some(".text".to_string()),
                section_start: Some(BASE_ADDR),
                cfg,
            }
        })
}

fn abi() -> AbiProfile {
    AbiProfile::for_architecture(Architecture::X86_64).unwrap()
}

fn program() -> Program {
    let mut program = Program::new(Architecture::X86_64);
    program.add_section(Section {
        name: ".plt".to_string(),
        start: 0x500,
        size: 0x100,
    });
    program.add_section(Section {
        name: ".text".to_string(),
        start: BASE_ADDR,
        size: 0x10000,
    });
    program
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    /// After propagation every block satisfies
    /// `start(B) = ⋃ out(P) over intraprocedural predecessors`.
    #[test]
    fn propagation_reaches_fixed_point(function in arb_function(12)) {
        let abi = abi();
        let program = program();
        let summary = FunctionSummary::new(&function, &program, &abi);

        for block in summary.blocks() {
            let mut expected = abi.empty_set();
            for pred in function.cfg.intra_predecessors(block.addr()) {
                if let Some(pred_summary) = summary.block(pred) {
                    expected.union_with(&pred_summary.out_regs(&abi));
                }
            }
            prop_assert_eq!(
                block.start_regs(),
                &expected,
                "block {:#x} is not at a fixed point", block.addr()
            );
        }
    }

    /// Live sets are always sized to the ABI universe.
    #[test]
    fn live_sets_stay_in_universe(function in arb_function(12)) {
        let abi = abi();
        let program = program();
        let summary = FunctionSummary::new(&function, &program, &abi);

        for block in summary.blocks() {
            prop_assert_eq!(block.used_regs().width(), abi.universe_width());
            prop_assert_eq!(block.start_regs().width(), abi.universe_width());
        }
    }

    /// A call block's exit set never escapes notKilled ∪ return.
    #[test]
    fn call_block_out_regs_are_bounded(function in arb_function(12)) {
        let abi = abi();
        let program = program();
        let summary = FunctionSummary::new(&function, &program, &abi);

        let mut bound = abi.not_killed_regs().clone();
        bound.union_with(abi.return_regs());

        for block in summary.blocks() {
            if block.is_call_block() {
                prop_assert!(block.out_regs(&abi).is_subset(&bound));
            }
        }
    }

    /// Re-running the analysis on the same function gives identical
    /// results.
    #[test]
    fn analysis_is_deterministic(function in arb_function(12)) {
        let abi = abi();
        let program = program();
        let first = FunctionSummary::new(&function, &program, &abi);
        let second = FunctionSummary::new(&function, &program, &abi);

        for (a, b) in first.blocks().zip(second.blocks()) {
            prop_assert_eq!(a.addr(), b.addr());
            prop_assert_eq!(a.start_regs(), b.start_regs());
            prop_assert_eq!(a.used_regs(), b.used_regs());
        }
        prop_assert_eq!(first.call_sites(&program), second.call_sites(&program));
    }

    /// Call records are ordered by ascending call-block address.
    #[test]
    fn call_records_are_ordered(function in arb_function(12)) {
        let abi = abi();
        let program = program();
        let summary = FunctionSummary::new(&function, &program, &abi);

        let addrs: Vec<u64> = summary.call_block_addrs().collect();
        let mut sorted = addrs.clone();
        sorted.sort_unstable();
        prop_assert_eq!(addrs, sorted);

        let records = summary.call_sites(&program);
        let insn_addrs: Vec<_> = records.iter().map(|r| r.call_insn_addr).collect();
        let mut sorted_insns = insn_addrs.clone();
        sorted_insns.sort_unstable();
        prop_assert_eq!(insn_addrs, sorted_insns);
    }
}
