//! # callsight-analysis
//!
//! The call-site liveness engine. For every function of a loaded program it
//! computes, per basic block, the set of ABI-tracked registers the block
//! uses, propagates live-in sets to a fixed point over the intraprocedural
//! CFG, and derives one record per call site naming the argument registers
//! that carry meaningful values into the call.

pub mod block_summary;
pub mod function_summary;
pub mod output;

pub use block_summary::BlockSummary;
pub use function_summary::{CallSiteRecord, FunctionSummary};
pub use output::json::JsonWriter;
pub use output::{write_report, ReportOptions, DEFAULT_INDENT};
