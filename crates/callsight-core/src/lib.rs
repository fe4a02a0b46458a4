//! # callsight-core
//!
//! Core abstractions for the callsight call-site analyzer. This crate defines
//! the program model produced by the loader and consumed by the analysis:
//! registers and register bit sets, the ABI profile, instructions, basic
//! blocks, control flow graphs with typed edges, functions, sections, and
//! debug parameter-location information.

pub mod abi;
pub mod arch;
pub mod basic_block;
pub mod cfg;
pub mod debug_info;
pub mod error;
pub mod instruction;
pub mod program;
pub mod register;
pub mod register_set;

pub use abi::AbiProfile;
pub use arch::Architecture;
pub use basic_block::BasicBlock;
pub use cfg::{ControlFlowGraph, Edge, EdgeKind};
pub use debug_info::{FormalParameter, FunctionDebugInfo, ParamLocation, ParamStorage};
pub use error::Error;
pub use instruction::{Instruction, Operation};
pub use program::{Function, Program, Section};
pub use register::{Register, RegisterClass};
pub use register_set::RegisterSet;
