//! Architecture-agnostic register representation.

/// Register class (general purpose, vector, etc.).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterClass {
    /// General purpose register (rax, rdi, etc.)
    General,
    /// Vector/SIMD register (xmm0, ymm0, zmm0, etc.)
    Vector,
    /// Segment register (cs, ds, etc.) - x86 specific
    Segment,
    /// Program counter / instruction pointer (rip)
    ProgramCounter,
    /// Flags / status register (rflags)
    Flags,
    /// Other special registers
    Other,
}

/// A machine register.
///
/// Each register is identified by a numeric ID shared by all of its
/// sub-register aliases: `al`, `ax`, `eax`, and `rax` all carry the ID of
/// `rax` and differ only in `size`. Vector aliases work the same way:
/// `xmm3`, `ymm3`, and `zmm3` share one ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    /// The class of register.
    pub class: RegisterClass,
    /// Register ID, shared across sub-register aliases.
    pub id: u16,
    /// Size of this alias in bits.
    pub size: u16,
}

impl Register {
    /// Creates a new register.
    pub fn new(class: RegisterClass, id: u16, size: u16) -> Self {
        Self { class, id, size }
    }

    /// Returns the widest ABI-visible alias of this register.
    ///
    /// General purpose aliases widen to the 64-bit form; vector aliases
    /// widen to the xmm form, which is the slot the ABI tracks. Registers
    /// of other classes promote to themselves.
    pub fn promoted(&self) -> Self {
        match self.class {
            RegisterClass::General => Self::new(self.class, self.id, 64),
            RegisterClass::Vector => Self::new(self.class, self.id, 128),
            _ => *self,
        }
    }

    /// Returns the canonical name for this register alias.
    pub fn name(&self) -> &'static str {
        x86_reg_name(self.id, self.size)
    }
}

// x86/x86_64 register IDs. One ID space: GPRs first, then the special
// registers, then the vector bank.
pub mod x86 {
    // 64-bit GPRs
    pub const RAX: u16 = 0;
    pub const RCX: u16 = 1;
    pub const RDX: u16 = 2;
    pub const RBX: u16 = 3;
    pub const RSP: u16 = 4;
    pub const RBP: u16 = 5;
    pub const RSI: u16 = 6;
    pub const RDI: u16 = 7;
    pub const R8: u16 = 8;
    pub const R9: u16 = 9;
    pub const R10: u16 = 10;
    pub const R11: u16 = 11;
    pub const R12: u16 = 12;
    pub const R13: u16 = 13;
    pub const R14: u16 = 14;
    pub const R15: u16 = 15;

    // Instruction pointer
    pub const RIP: u16 = 16;

    // Flags
    pub const RFLAGS: u16 = 17;

    // Vector bank, xmm/ymm/zmm aliases share an ID
    pub const XMM0: u16 = 18;
    pub const XMM15: u16 = 33;

    // Segment registers
    pub const CS: u16 = 34;
    pub const DS: u16 = 35;
    pub const ES: u16 = 36;
    pub const FS: u16 = 37;
    pub const GS: u16 = 38;
    pub const SS: u16 = 39;

    /// ID of the n-th vector register.
    pub const fn xmm(n: u16) -> u16 {
        XMM0 + n
    }
}

static XMM_NAMES: [&str; 16] = [
    "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7", "xmm8", "xmm9", "xmm10",
    "xmm11", "xmm12", "xmm13", "xmm14", "xmm15",
];

static YMM_NAMES: [&str; 16] = [
    "ymm0", "ymm1", "ymm2", "ymm3", "ymm4", "ymm5", "ymm6", "ymm7", "ymm8", "ymm9", "ymm10",
    "ymm11", "ymm12", "ymm13", "ymm14", "ymm15",
];

static ZMM_NAMES: [&str; 16] = [
    "zmm0", "zmm1", "zmm2", "zmm3", "zmm4", "zmm5", "zmm6", "zmm7", "zmm8", "zmm9", "zmm10",
    "zmm11", "zmm12", "zmm13", "zmm14", "zmm15",
];

fn x86_reg_name(id: u16, size: u16) -> &'static str {
    if (x86::XMM0..=x86::XMM15).contains(&id) {
        let n = (id - x86::XMM0) as usize;
        return match size {
            256 => YMM_NAMES[n],
            512 => ZMM_NAMES[n],
            _ => XMM_NAMES[n],
        };
    }

    match (id, size) {
        // 64-bit
        (x86::RAX, 64) => "rax",
        (x86::RCX, 64) => "rcx",
        (x86::RDX, 64) => "rdx",
        (x86::RBX, 64) => "rbx",
        (x86::RSP, 64) => "rsp",
        (x86::RBP, 64) => "rbp",
        (x86::RSI, 64) => "rsi",
        (x86::RDI, 64) => "rdi",
        (x86::R8, 64) => "r8",
        (x86::R9, 64) => "r9",
        (x86::R10, 64) => "r10",
        (x86::R11, 64) => "r11",
        (x86::R12, 64) => "r12",
        (x86::R13, 64) => "r13",
        (x86::R14, 64) => "r14",
        (x86::R15, 64) => "r15",
        (x86::RIP, 64) => "rip",
        (x86::RFLAGS, 64) => "rflags",

        // 32-bit
        (x86::RAX, 32) => "eax",
        (x86::RCX, 32) => "ecx",
        (x86::RDX, 32) => "edx",
        (x86::RBX, 32) => "ebx",
        (x86::RSP, 32) => "esp",
        (x86::RBP, 32) => "ebp",
        (x86::RSI, 32) => "esi",
        (x86::RDI, 32) => "edi",
        (x86::R8, 32) => "r8d",
        (x86::R9, 32) => "r9d",
        (x86::R10, 32) => "r10d",
        (x86::R11, 32) => "r11d",
        (x86::R12, 32) => "r12d",
        (x86::R13, 32) => "r13d",
        (x86::R14, 32) => "r14d",
        (x86::R15, 32) => "r15d",

        // 16-bit
        (x86::RAX, 16) => "ax",
        (x86::RCX, 16) => "cx",
        (x86::RDX, 16) => "dx",
        (x86::RBX, 16) => "bx",
        (x86::RSP, 16) => "sp",
        (x86::RBP, 16) => "bp",
        (x86::RSI, 16) => "si",
        (x86::RDI, 16) => "di",
        (x86::R8, 16) => "r8w",
        (x86::R9, 16) => "r9w",
        (x86::R10, 16) => "r10w",
        (x86::R11, 16) => "r11w",
        (x86::R12, 16) => "r12w",
        (x86::R13, 16) => "r13w",
        (x86::R14, 16) => "r14w",
        (x86::R15, 16) => "r15w",

        // 8-bit low
        (x86::RAX, 8) => "al",
        (x86::RCX, 8) => "cl",
        (x86::RDX, 8) => "dl",
        (x86::RBX, 8) => "bl",
        (x86::RSP, 8) => "spl",
        (x86::RBP, 8) => "bpl",
        (x86::RSI, 8) => "sil",
        (x86::RDI, 8) => "dil",
        (x86::R8, 8) => "r8b",
        (x86::R9, 8) => "r9b",
        (x86::R10, 8) => "r10b",
        (x86::R11, 8) => "r11b",
        (x86::R12, 8) => "r12b",
        (x86::R13, 8) => "r13b",
        (x86::R14, 8) => "r14b",
        (x86::R15, 8) => "r15b",

        // Segment registers
        (x86::CS, _) => "cs",
        (x86::DS, _) => "ds",
        (x86::ES, _) => "es",
        (x86::FS, _) => "fs",
        (x86::GS, _) => "gs",
        (x86::SS, _) => "ss",

        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpr_alias_names() {
        assert_eq!(Register::new(RegisterClass::General, x86::RDI, 64).name(), "rdi");
        assert_eq!(Register::new(RegisterClass::General, x86::RDI, 32).name(), "edi");
        assert_eq!(Register::new(RegisterClass::General, x86::RDI, 8).name(), "dil");
        assert_eq!(Register::new(RegisterClass::General, x86::R9, 16).name(), "r9w");
    }

    #[test]
    fn test_vector_alias_names() {
        assert_eq!(Register::new(RegisterClass::Vector, x86::xmm(3), 128).name(), "xmm3");
        assert_eq!(Register::new(RegisterClass::Vector, x86::xmm(3), 256).name(), "ymm3");
        assert_eq!(Register::new(RegisterClass::Vector, x86::xmm(3), 512).name(), "zmm3");
    }

    #[test]
    fn test_gpr_promotion_widens_to_64() {
        let eax = Register::new(RegisterClass::General, x86::RAX, 32);
        let promoted = eax.promoted();
        assert_eq!(promoted.size, 64);
        assert_eq!(promoted.id, x86::RAX);
        assert_eq!(promoted.name(), "rax");
    }

    #[test]
    fn test_vector_promotion_widens_to_xmm() {
        let ymm2 = Register::new(RegisterClass::Vector, x86::xmm(2), 256);
        assert_eq!(ymm2.promoted().name(), "xmm2");
    }

    #[test]
    fn test_special_registers_promote_to_themselves() {
        let rip = Register::new(RegisterClass::ProgramCounter, x86::RIP, 64);
        assert_eq!(rip.promoted(), rip);
    }
}
