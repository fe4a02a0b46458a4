//! The loaded program: sections, functions, names, and debug info.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;

use crate::{Architecture, ControlFlowGraph, FunctionDebugInfo};

/// A section of the binary.
#[derive(Debug, Clone)]
pub struct Section {
    /// Section name (e.g., ".text", ".plt.sec").
    pub name: String,
    /// Virtual address where this section starts.
    pub start: u64,
    /// Size in bytes.
    pub size: u64,
}

impl Section {
    /// Returns true if this section contains the address.
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.start + self.size
    }

    /// Returns true if this section belongs to the procedure linkage table.
    pub fn is_plt(&self) -> bool {
        self.name.contains(".plt")
    }
}

/// A function discovered by the loader.
#[derive(Debug)]
pub struct Function {
    /// Function name.
    pub name: String,
    /// Entry address.
    pub entry: u64,
    /// Name of the section containing the function, if known.
    pub section_name: Option<String>,
    /// Start address of that section.
    pub section_start: Option<u64>,
    /// Intraprocedural control flow graph.
    pub cfg: ControlFlowGraph,
}

impl Function {
    /// Returns true if this function lives in a PLT section.
    pub fn is_in_plt(&self) -> bool {
        self.section_name
            .as_deref()
            .is_some_and(|name| name.contains(".plt"))
    }
}

/// Everything the loader extracted from one binary.
///
/// Functions are kept in the loader's discovery order; lookups by address
/// are served by side tables.
#[derive(Debug)]
pub struct Program {
    /// Target architecture.
    pub architecture: Architecture,
    sections: Vec<Section>,
    functions: IndexMap<u64, Function>,
    function_names: BTreeMap<u64, Vec<String>>,
    debug_info: HashMap<u64, FunctionDebugInfo>,
}

impl Program {
    /// Creates an empty program for an architecture.
    pub fn new(architecture: Architecture) -> Self {
        Self {
            architecture,
            sections: Vec::new(),
            functions: IndexMap::new(),
            function_names: BTreeMap::new(),
            debug_info: HashMap::new(),
        }
    }

    /// Records a section.
    pub fn add_section(&mut self, section: Section) {
        self.sections.push(section);
    }

    /// Records a function, keyed by entry address. The function's name is
    /// also attributed to its entry address.
    pub fn add_function(&mut self, function: Function) {
        if !function.name.is_empty() {
            self.add_function_name(function.entry, function.name.clone());
        }
        self.functions.insert(function.entry, function);
    }

    /// Attributes an additional name to an address (symbol aliases).
    pub fn add_function_name(&mut self, addr: u64, name: String) {
        let names = self.function_names.entry(addr).or_default();
        if !names.contains(&name) {
            names.push(name);
        }
    }

    /// Attaches parameter debug info to the function entered at `entry`.
    pub fn set_debug_info(&mut self, entry: u64, info: FunctionDebugInfo) {
        self.debug_info.insert(entry, info);
    }

    /// Iterates functions in discovery order.
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    /// Number of functions.
    pub fn num_functions(&self) -> usize {
        self.functions.len()
    }

    /// Returns the function entered at `addr`, if any.
    pub fn function_at(&self, addr: u64) -> Option<&Function> {
        self.functions.get(&addr)
    }

    /// Names attributed to the function entered at `addr`.
    pub fn function_names_at(&self, addr: u64) -> &[String] {
        self.function_names
            .get(&addr)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the section containing `addr`.
    pub fn section_containing(&self, addr: u64) -> Option<&Section> {
        self.sections.iter().find(|s| s.contains(addr))
    }

    /// Returns true if `addr` lies in a PLT section.
    pub fn is_plt_address(&self, addr: u64) -> bool {
        self.section_containing(addr).is_some_and(Section::is_plt)
    }

    /// Parameter debug info for the function entered at `entry`.
    pub fn debug_info_for(&self, entry: u64) -> Option<&FunctionDebugInfo> {
        self.debug_info.get(&entry)
    }
}
