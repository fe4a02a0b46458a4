//! DWARF formal-parameter locations.
//!
//! Walks the debug info for subprograms and collects, per function entry
//! address, each formal parameter's location list reduced to
//! (address range, storage class, register). Only the leading operation
//! of a location expression is interpreted: `DW_OP_reg*` means the value
//! lives in a register, `DW_OP_breg*`/`DW_OP_fbreg` mean it lives at
//! register + offset. Anything else is memory storage.

use std::collections::HashMap;

use gimli::{AttributeValue, Dwarf, EndianSlice, LittleEndian, Reader};
use goblin::elf::Elf;

use callsight_core::register::x86;
use callsight_core::{
    FormalParameter, FunctionDebugInfo, ParamLocation, ParamStorage, Register, RegisterClass,
};

type Slice<'d> = EndianSlice<'d, LittleEndian>;

/// Reads parameter debug info, keyed by subprogram entry address.
///
/// A binary without DWARF sections yields an empty map.
pub fn read_param_info<'d>(
    elf: &Elf,
    data: &'d [u8],
) -> Result<HashMap<u64, FunctionDebugInfo>, gimli::Error> {
    let loader = |id: gimli::SectionId| -> Result<Slice<'d>, gimli::Error> {
        Ok(EndianSlice::new(
            section_data(elf, data, id.name()),
            LittleEndian,
        ))
    };
    let dwarf: Dwarf<Slice<'d>> = Dwarf::load(loader)?;

    let mut info: HashMap<u64, FunctionDebugInfo> = HashMap::new();

    let mut units = dwarf.units();
    while let Some(header) = units.next()? {
        let unit = dwarf.unit(header)?;
        read_unit(&dwarf, &unit, &mut info)?;
    }

    Ok(info)
}

/// The raw bytes of a named section, or an empty slice when absent.
fn section_data<'d>(elf: &Elf, data: &'d [u8], name: &str) -> &'d [u8] {
    elf.section_headers
        .iter()
        .find(|sh| elf.shdr_strtab.get_at(sh.sh_name) == Some(name))
        .and_then(|sh| sh.file_range())
        .and_then(|range| data.get(range))
        .unwrap_or(&[])
}

fn read_unit(
    dwarf: &Dwarf<Slice<'_>>,
    unit: &gimli::Unit<Slice<'_>>,
    info: &mut HashMap<u64, FunctionDebugInfo>,
) -> Result<(), gimli::Error> {
    // The subprogram currently being walked: (entry, low, high, depth).
    let mut current: Option<(u64, u64, u64, isize)> = None;
    let mut depth = 0isize;

    let mut entries = unit.entries();
    while let Some((delta, entry)) = entries.next_dfs()? {
        depth += delta;

        if let Some((_, _, _, sub_depth)) = current {
            if depth <= sub_depth {
                current = None;
            }
        }

        match entry.tag() {
            gimli::DW_TAG_subprogram => {
                current = subprogram_range(entry)?.map(|(low, high)| (low, low, high, depth));
            }
            gimli::DW_TAG_formal_parameter => {
                let Some((func_entry, low, high, sub_depth)) = current else {
                    continue;
                };
                if depth != sub_depth + 1 {
                    continue;
                }

                let name = match entry.attr_value(gimli::DW_AT_name)? {
                    Some(value) => dwarf
                        .attr_string(unit, value)
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    None => String::new(),
                };

                let locations = read_locations(dwarf, unit, entry, low, high)?;
                if locations.is_empty() {
                    continue;
                }
                info.entry(func_entry)
                    .or_default()
                    .params
                    .push(FormalParameter { name, locations });
            }
            _ => {}
        }
    }

    Ok(())
}

/// The [low, high) code range of a subprogram, if it has one.
fn subprogram_range(
    entry: &gimli::DebuggingInformationEntry<Slice<'_>>,
) -> Result<Option<(u64, u64)>, gimli::Error> {
    let low = match entry.attr_value(gimli::DW_AT_low_pc)? {
        Some(AttributeValue::Addr(addr)) => addr,
        _ => return Ok(None),
    };
    let high = match entry.attr_value(gimli::DW_AT_high_pc)? {
        Some(AttributeValue::Addr(addr)) => addr,
        Some(AttributeValue::Udata(size)) => low + size,
        _ => low,
    };
    Ok(Some((low, high)))
}

/// Reduces a parameter's DW_AT_location to model locations.
///
/// A bare expression covers the whole subprogram range; a location list
/// contributes one entry per covered range.
fn read_locations(
    dwarf: &Dwarf<Slice<'_>>,
    unit: &gimli::Unit<Slice<'_>>,
    entry: &gimli::DebuggingInformationEntry<Slice<'_>>,
    low: u64,
    high: u64,
) -> Result<Vec<ParamLocation>, gimli::Error> {
    let Some(attr) = entry.attr(gimli::DW_AT_location)? else {
        return Ok(Vec::new());
    };

    let mut locations = Vec::new();
    match attr.value() {
        AttributeValue::Exprloc(expr) => {
            let (storage, register) = decode_storage(&expr);
            locations.push(ParamLocation {
                low_pc: low,
                hi_pc: high,
                storage,
                register,
            });
        }
        value => {
            if let Some(mut iter) = dwarf.attr_locations(unit, value)? {
                while let Some(loc) = iter.next()? {
                    let (storage, register) = decode_storage(&loc.data);
                    locations.push(ParamLocation {
                        low_pc: loc.range.begin,
                        hi_pc: loc.range.end,
                        storage,
                        register,
                    });
                }
            }
        }
    }
    Ok(locations)
}

/// Interprets the first operation of a location expression.
fn decode_storage(expr: &gimli::Expression<Slice<'_>>) -> (ParamStorage, Option<Register>) {
    let mut reader = expr.0.clone();
    let Ok(op) = reader.read_u8() else {
        return (ParamStorage::Memory, None);
    };

    let reg_range = gimli::DW_OP_reg0.0..=gimli::DW_OP_reg31.0;
    let breg_range = gimli::DW_OP_breg0.0..=gimli::DW_OP_breg31.0;

    if reg_range.contains(&op) {
        let n = (op - gimli::DW_OP_reg0.0) as u64;
        return (ParamStorage::Register, dwarf_register(n));
    }
    if op == gimli::DW_OP_regx.0 {
        let n = reader.read_uleb128().unwrap_or(u64::MAX);
        return (ParamStorage::Register, dwarf_register(n));
    }
    if breg_range.contains(&op) {
        let n = (op - gimli::DW_OP_breg0.0) as u64;
        return (ParamStorage::RegisterOffset, dwarf_register(n));
    }
    if op == gimli::DW_OP_bregx.0 {
        let n = reader.read_uleb128().unwrap_or(u64::MAX);
        return (ParamStorage::RegisterOffset, dwarf_register(n));
    }
    if op == gimli::DW_OP_fbreg.0 {
        // Frame-base relative; the base register is not resolved here.
        return (ParamStorage::RegisterOffset, None);
    }

    (ParamStorage::Memory, None)
}

/// x86-64 System V DWARF register numbering.
fn dwarf_register(n: u64) -> Option<Register> {
    let gpr = |id: u16| Some(Register::new(RegisterClass::General, id, 64));
    match n {
        0 => gpr(x86::RAX),
        1 => gpr(x86::RDX),
        2 => gpr(x86::RCX),
        3 => gpr(x86::RBX),
        4 => gpr(x86::RSI),
        5 => gpr(x86::RDI),
        6 => gpr(x86::RBP),
        7 => gpr(x86::RSP),
        8..=15 => gpr(x86::R8 + (n as u16 - 8)),
        17..=32 => Some(Register::new(
            RegisterClass::Vector,
            x86::xmm(n as u16 - 17),
            128,
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(bytes: &'static [u8]) -> gimli::Expression<Slice<'static>> {
        gimli::Expression(EndianSlice::new(bytes, LittleEndian))
    }

    #[test]
    fn test_decode_reg_operation() {
        // DW_OP_reg5 = rdi
        let (storage, register) = decode_storage(&expr(&[0x55]));
        assert_eq!(storage, ParamStorage::Register);
        assert_eq!(register.unwrap().name(), "rdi");
    }

    #[test]
    fn test_decode_regx_operation() {
        // DW_OP_regx 17 = xmm0
        let (storage, register) = decode_storage(&expr(&[0x90, 17]));
        assert_eq!(storage, ParamStorage::Register);
        assert_eq!(register.unwrap().name(), "xmm0");
    }

    #[test]
    fn test_decode_breg_operation() {
        // DW_OP_breg4 <sleb offset> = rsi + offset
        let (storage, register) = decode_storage(&expr(&[0x74, 0x10]));
        assert_eq!(storage, ParamStorage::RegisterOffset);
        assert_eq!(register.unwrap().name(), "rsi");
    }

    #[test]
    fn test_decode_fbreg_operation() {
        // DW_OP_fbreg <sleb offset>
        let (storage, register) = decode_storage(&expr(&[0x91, 0x7c]));
        assert_eq!(storage, ParamStorage::RegisterOffset);
        assert!(register.is_none());
    }

    #[test]
    fn test_decode_memory_operation() {
        // DW_OP_addr
        let (storage, register) = decode_storage(&expr(&[0x03, 0, 0, 0, 0, 0, 0, 0, 0]));
        assert_eq!(storage, ParamStorage::Memory);
        assert!(register.is_none());
    }

    #[test]
    fn test_dwarf_register_numbering() {
        assert_eq!(dwarf_register(0).unwrap().name(), "rax");
        assert_eq!(dwarf_register(5).unwrap().name(), "rdi");
        assert_eq!(dwarf_register(7).unwrap().name(), "rsp");
        assert_eq!(dwarf_register(12).unwrap().name(), "r12");
        assert_eq!(dwarf_register(20).unwrap().name(), "xmm3");
        assert_eq!(dwarf_register(16), None); // return address column
        assert_eq!(dwarf_register(999), None);
    }
}
