//! RISC-V operations and encoding constants.

use strum::IntoStaticStr;

/// Major opcodes (bits 6:0).
pub mod major {
    /// Integer loads.
    pub const LOAD: u32 = 0b000_0011;
    /// Memory fences.
    pub const MISC_MEM: u32 = 0b000_1111;
    /// Register-immediate ALU operations.
    pub const OP_IMM: u32 = 0b001_0011;
    /// Add upper immediate to PC.
    pub const AUIPC: u32 = 0b001_0111;
    /// Register-immediate ALU operations on 32-bit values.
    pub const OP_IMM_32: u32 = 0b001_1011;
    /// Integer stores.
    pub const STORE: u32 = 0b010_0011;
    /// Atomic memory operations.
    pub const AMO: u32 = 0b010_1111;
    /// Register-register ALU operations.
    pub const OP: u32 = 0b011_0011;
    /// Load upper immediate.
    pub const LUI: u32 = 0b011_0111;
    /// Register-register ALU operations on 32-bit values.
    pub const OP_32: u32 = 0b011_1011;
    /// Conditional branches.
    pub const BRANCH: u32 = 0b110_0011;
    /// Jump and link register.
    pub const JALR: u32 = 0b110_0111;
    /// Jump and link.
    pub const JAL: u32 = 0b110_1111;
    /// ECALL/EBREAK and CSR access.
    pub const SYSTEM: u32 = 0b111_0011;
}

/// Supported RISC-V operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
#[repr(u16)]
#[allow(missing_docs)]
pub enum Opcode {
    Unallocated,
    Lui,
    Auipc,
    Jal,
    Jalr,
    Beq,
    Bne,
    Blt,
    Bge,
    Bltu,
    Bgeu,
    Lb,
    Lh,
    Lw,
    Ld,
    Lbu,
    Lhu,
    Lwu,
    Sb,
    Sh,
    Sw,
    Sd,
    Addi,
    Slti,
    Sltiu,
    Xori,
    Ori,
    Andi,
    Slli,
    Srli,
    Srai,
    Add,
    Sub,
    Sll,
    Slt,
    Sltu,
    Xor,
    Srl,
    Sra,
    Or,
    And,
    Addiw,
    Slliw,
    Srliw,
    Sraiw,
    Addw,
    Subw,
    Sllw,
    Srlw,
    Sraw,
    Fence,
    Ecall,
    Ebreak,
    Csrrw,
    Csrrs,
    Csrrc,
    Csrrwi,
    Csrrsi,
    Csrrci,
    Mul,
    Mulh,
    Mulhsu,
    Mulhu,
    Div,
    Divu,
    Rem,
    Remu,
    Mulw,
    Divw,
    Divuw,
    Remw,
    Remuw,
    #[strum(serialize = "lr.w")]
    LrW,
    #[strum(serialize = "lr.d")]
    LrD,
    #[strum(serialize = "sc.w")]
    ScW,
    #[strum(serialize = "sc.d")]
    ScD,
    #[strum(serialize = "amoswap.w")]
    AmoswapW,
    #[strum(serialize = "amoswap.d")]
    AmoswapD,
    #[strum(serialize = "amoadd.w")]
    AmoaddW,
    #[strum(serialize = "amoadd.d")]
    AmoaddD,
    #[strum(serialize = "amoxor.w")]
    AmoxorW,
    #[strum(serialize = "amoxor.d")]
    AmoxorD,
    #[strum(serialize = "amoand.w")]
    AmoandW,
    #[strum(serialize = "amoand.d")]
    AmoandD,
    #[strum(serialize = "amoor.w")]
    AmoorW,
    #[strum(serialize = "amoor.d")]
    AmoorD,
    #[strum(serialize = "amomin.w")]
    AmominW,
    #[strum(serialize = "amomin.d")]
    AmominD,
    #[strum(serialize = "amomax.w")]
    AmomaxW,
    #[strum(serialize = "amomax.d")]
    AmomaxD,
    #[strum(serialize = "amominu.w")]
    AmominuW,
    #[strum(serialize = "amominu.d")]
    AmominuD,
    #[strum(serialize = "amomaxu.w")]
    AmomaxuW,
    #[strum(serialize = "amomaxu.d")]
    AmomaxuD,
}

impl Opcode {
    /// Bytes accessed by a load, store or atomic; zero for other operations.
    pub const fn access_size(self) -> u16 {
        use Opcode::*;
        match self {
            Lb | Lbu | Sb => 1,
            Lh | Lhu | Sh => 2,
            Lw | Lwu | Sw | LrW | ScW | AmoswapW | AmoaddW | AmoxorW | AmoandW | AmoorW
            | AmominW | AmomaxW | AmominuW | AmomaxuW => 4,
            Ld | Sd | LrD | ScD | AmoswapD | AmoaddD | AmoxorD | AmoandD | AmoorD | AmominD
            | AmomaxD | AmominuD | AmomaxuD => 8,
            _ => 0,
        }
    }
}
