//! ELF structure: sections, function symbols, and PLT stubs.

use std::collections::BTreeMap;

use goblin::elf::header::{EM_386, EM_AARCH64, EM_X86_64};
use goblin::elf::section_header::SHF_EXECINSTR;
use goblin::elf::sym::STT_FUNC;
use goblin::elf::Elf;
use log::{debug, warn};

use callsight_core::{Architecture, Function, Program, Section};

use crate::cfg_builder::CfgBuilder;
use crate::disasm::InstructionDecoder;
use crate::{dwarf, LoadError};

/// Size of one PLT stub on x86-64.
const PLT_ENTRY_SIZE: u64 = 16;

/// Parses an ELF image and builds the program model.
pub fn load_elf(data: &[u8]) -> Result<Program, LoadError> {
    let elf = Elf::parse(data)?;

    let architecture = match elf.header.e_machine {
        EM_X86_64 => Architecture::X86_64,
        EM_386 => Architecture::X86,
        EM_AARCH64 => Architecture::Arm64,
        other => Architecture::Unknown(other),
    };
    if architecture != Architecture::X86_64 {
        return Err(LoadError::UnsupportedArchitecture(
            architecture.name().to_string(),
        ));
    }

    let mut program = Program::new(architecture);

    for sh in &elf.section_headers {
        if sh.sh_addr == 0 {
            continue;
        }
        let name = elf
            .shdr_strtab
            .get_at(sh.sh_name)
            .unwrap_or("")
            .to_string();
        program.add_section(Section {
            name,
            start: sh.sh_addr,
            size: sh.sh_size,
        });
    }

    // Function starts: STT_FUNC symbols from symtab and dynsym, plus PLT
    // stubs synthesized from the PLT relocations.
    let mut starts: BTreeMap<u64, String> = BTreeMap::new();
    for sym in elf.syms.iter() {
        if sym.st_type() == STT_FUNC && sym.st_value != 0 {
            if let Some(name) = elf.strtab.get_at(sym.st_name) {
                record_function_start(&mut starts, &mut program, sym.st_value, name);
            }
        }
    }
    for sym in elf.dynsyms.iter() {
        if sym.st_type() == STT_FUNC && sym.st_value != 0 {
            if let Some(name) = elf.dynstrtab.get_at(sym.st_name) {
                record_function_start(&mut starts, &mut program, sym.st_value, name);
            }
        }
    }
    for (addr, name) in plt_stubs(&elf) {
        record_function_start(&mut starts, &mut program, addr, &name);
    }

    let decoder = InstructionDecoder::new()?;
    let start_addrs: Vec<u64> = starts.keys().copied().collect();

    for (i, (&entry, name)) in starts.iter().enumerate() {
        let Some((section, bytes)) = section_bytes_at(&elf, data, entry) else {
            debug!("skipping {name}: entry {entry:#x} has no section bytes");
            continue;
        };
        let section_end = section.sh_addr + section.sh_size;

        // A function extends to the next known function start in the same
        // section, or to the section end.
        let mut end = start_addrs
            .get(i + 1)
            .copied()
            .filter(|&next| next < section_end)
            .unwrap_or(section_end);
        if end <= entry {
            end = section_end;
        }

        let len = (end - entry).min(bytes.len() as u64) as usize;
        let decoded = decoder.decode(&bytes[..len], entry)?;
        let cfg = CfgBuilder::build(&decoded, entry, end);

        let section_name = elf.shdr_strtab.get_at(section.sh_name).map(str::to_string);
        program.add_function(Function {
            name: name.clone(),
            entry,
            section_name,
            section_start: Some(section.sh_addr),
            cfg,
        });
    }

    match dwarf::read_param_info(&elf, data) {
        Ok(info) => {
            for (entry, params) in info {
                program.set_debug_info(entry, params);
            }
        }
        Err(err) => {
            warn!("ignoring malformed debug info: {err}");
        }
    }

    Ok(program)
}

fn record_function_start(
    starts: &mut BTreeMap<u64, String>,
    program: &mut Program,
    addr: u64,
    name: &str,
) {
    if name.is_empty() {
        return;
    }
    match starts.get(&addr) {
        Some(_) => {
            // Alias for a start we already know.
            program.add_function_name(addr, name.to_string());
        }
        None => {
            starts.insert(addr, name.to_string());
        }
    }
}

/// Enumerates PLT stub entries as (address, "name@plt") pairs.
///
/// Stubs live either in `.plt.sec` (one stub per relocation, in order) or
/// in `.plt`, where the first slot is the resolver and stub i sits at
/// `(i + 1) * 16`.
fn plt_stubs(elf: &Elf) -> Vec<(u64, String)> {
    let section_by_name = |wanted: &str| {
        elf.section_headers.iter().find(|sh| {
            elf.shdr_strtab
                .get_at(sh.sh_name)
                .is_some_and(|name| name == wanted)
        })
    };

    let (base, skip_resolver) = match section_by_name(".plt.sec") {
        Some(sh) => (sh.sh_addr, false),
        None => match section_by_name(".plt") {
            Some(sh) => (sh.sh_addr, true),
            None => return Vec::new(),
        },
    };

    let mut stubs = Vec::new();
    for (i, reloc) in elf.pltrelocs.iter().enumerate() {
        let Some(sym) = elf.dynsyms.get(reloc.r_sym) else {
            continue;
        };
        let Some(name) = elf.dynstrtab.get_at(sym.st_name) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        let slot = if skip_resolver { i as u64 + 1 } else { i as u64 };
        let addr = base + slot * PLT_ENTRY_SIZE;
        debug!("plt stub {name}@plt at {addr:#x}");
        stubs.push((addr, format!("{name}@plt")));
    }
    stubs
}

/// The executable section containing `addr`, with the bytes from `addr` to
/// the section end.
fn section_bytes_at<'d>(
    elf: &Elf,
    data: &'d [u8],
    addr: u64,
) -> Option<(goblin::elf::SectionHeader, &'d [u8])> {
    for sh in &elf.section_headers {
        let executable = sh.sh_flags & SHF_EXECINSTR as u64 != 0;
        if !executable || addr < sh.sh_addr || addr >= sh.sh_addr + sh.sh_size {
            continue;
        }
        let range = sh.file_range()?;
        let section_data = data.get(range)?;
        let offset = (addr - sh.sh_addr) as usize;
        return Some((sh.clone(), section_data.get(offset..)?));
    }
    None
}
