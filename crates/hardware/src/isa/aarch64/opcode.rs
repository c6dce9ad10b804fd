//! AArch64 operations.

use strum::IntoStaticStr;

/// Supported AArch64 operations.
///
/// Immediate and register forms of the same mnemonic are separate operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
#[repr(u16)]
#[allow(missing_docs)]
pub enum Opcode {
    Unallocated,
    #[strum(serialize = "add")]
    AddImm,
    #[strum(serialize = "adds")]
    AddsImm,
    #[strum(serialize = "sub")]
    SubImm,
    #[strum(serialize = "subs")]
    SubsImm,
    #[strum(serialize = "add")]
    AddReg,
    #[strum(serialize = "adds")]
    AddsReg,
    #[strum(serialize = "sub")]
    SubReg,
    #[strum(serialize = "subs")]
    SubsReg,
    Adc,
    Adcs,
    Sbc,
    Sbcs,
    And,
    Ands,
    Orr,
    Eor,
    Bic,
    Bics,
    Orn,
    Eon,
    Movz,
    Movn,
    Movk,
    Madd,
    Msub,
    Udiv,
    Sdiv,
    Lslv,
    Lsrv,
    Asrv,
    Ldrb,
    Ldrh,
    #[strum(serialize = "ldr")]
    LdrW,
    #[strum(serialize = "ldr")]
    LdrX,
    Ldrsb,
    Ldrsh,
    Ldrsw,
    Strb,
    Strh,
    #[strum(serialize = "str")]
    StrW,
    #[strum(serialize = "str")]
    StrX,
    Cas,
    Casa,
    Casl,
    Casal,
    B,
    Bl,
    #[strum(serialize = "b.cond")]
    BCond,
    Cbz,
    Cbnz,
    Br,
    Blr,
    Ret,
    Svc,
    Brk,
    Nop,
}

impl Opcode {
    /// Bytes accessed by a load or store; zero for other operations.
    ///
    /// Compare-and-swap sizes come from the encoding and are not fixed per opcode.
    pub const fn access_size(self) -> u16 {
        use Opcode::*;
        match self {
            Ldrb | Ldrsb | Strb => 1,
            Ldrh | Ldrsh | Strh => 2,
            LdrW | Ldrsw | StrW => 4,
            LdrX | StrX => 8,
            _ => 0,
        }
    }
}
