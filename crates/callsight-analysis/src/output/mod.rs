//! Report emission.
//!
//! Streams the analysis of a whole program as one JSON document:
//!
//! ```json
//! {
//!   "functions": [
//!     {
//!       "funcName": "...", "funcAddr": 4096, "sectionName": ".text",
//!       "isInPlt": false,
//!       "calls": [
//!         {
//!           "callInstructionAddr": 4104, "calledAddr": 1296,
//!           "callToPlt": true,
//!           "liveRegisters": ["rdi"], "funcNames": ["printf@plt"]
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```

pub mod json;

use std::io::{self, Write};

use callsight_core::{AbiProfile, Program};

use crate::{CallSiteRecord, FunctionSummary, JsonWriter};

/// Default indent width of the pretty-printed report.
pub const DEFAULT_INDENT: usize = 2;

/// Knobs for report emission.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Drop call records whose callee is not in the PLT.
    pub only_plt_calls: bool,
    /// Indent width; 0 selects compact output.
    pub indent: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            only_plt_calls: true,
            indent: DEFAULT_INDENT,
        }
    }
}

/// Analyzes every function of `program` and streams the report to `out`.
///
/// Functions appear in the loader's discovery order; call records within a
/// function in ascending call-block address order.
pub fn write_report<W: Write>(
    out: W,
    program: &Program,
    abi: &AbiProfile,
    options: &ReportOptions,
) -> io::Result<()> {
    let mut writer = JsonWriter::new(out, options.indent);
    writer.open_object()?;
    writer.member_key("functions")?;
    writer.open_array()?;

    for function in program.functions() {
        let summary = FunctionSummary::new(function, program, abi);
        write_function(&mut writer, &summary, program, options)?;
    }

    writer.close_array()?;
    writer.close_object()?;
    writer.end()
}

fn write_function<W: Write>(
    writer: &mut JsonWriter<W>,
    summary: &FunctionSummary<'_>,
    program: &Program,
    options: &ReportOptions,
) -> io::Result<()> {
    let function = summary.function();

    writer.open_object()?;
    writer.member_key("funcName")?;
    writer.scalar_str(&function.name)?;
    writer.member_key("funcAddr")?;
    write_opt_addr(writer, function.section_start)?;
    writer.member_key("sectionName")?;
    writer.scalar_str(function.section_name.as_deref().unwrap_or(""))?;
    writer.member_key("isInPlt")?;
    writer.scalar_bool(function.is_in_plt())?;
    writer.member_key("calls")?;
    writer.open_array()?;

    for record in summary.call_sites(program) {
        if options.only_plt_calls && !record.is_to_plt {
            continue;
        }
        write_call(writer, &record)?;
    }

    writer.close_array()?;
    writer.close_object()
}

fn write_call<W: Write>(writer: &mut JsonWriter<W>, record: &CallSiteRecord) -> io::Result<()> {
    writer.open_object()?;
    writer.member_key("callInstructionAddr")?;
    write_opt_addr(writer, record.call_insn_addr)?;
    writer.member_key("calledAddr")?;
    write_opt_addr(writer, record.called_addr)?;
    writer.member_key("callToPlt")?;
    writer.scalar_bool(record.is_to_plt)?;
    writer.member_key("liveRegisters")?;
    writer.open_array()?;
    for name in &record.live_registers {
        writer.scalar_str(name)?;
    }
    writer.close_array()?;
    writer.member_key("funcNames")?;
    writer.open_array()?;
    for name in &record.func_names {
        writer.scalar_str(name)?;
    }
    writer.close_array()?;
    writer.close_object()
}

/// An address member: decimal integer, or null for the unknown sentinel.
fn write_opt_addr<W: Write>(writer: &mut JsonWriter<W>, addr: Option<u64>) -> io::Result<()> {
    match addr {
        Some(addr) => writer.scalar_u64(addr),
        None => writer.null(),
    }
}
