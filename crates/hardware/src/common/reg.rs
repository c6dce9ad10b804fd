//! Registers and register files.
//!
//! This module provides the architectural register model shared by every core. It provides:
//! 1. **Identifiers:** [`Register`] names a register by bank ([`RegisterType`]) and tag.
//! 2. **Values:** [`RegisterValue`] holds up to eight bytes with an explicit width.
//! 3. **Storage:** [`RegisterFileSet`] holds one bank per register type, sized by the
//!    architecture's [`RegisterFileStructure`] list.

use std::fmt;

/// Register bank a [`Register`] belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegisterType {
    /// Integer registers (and the stack pointer on AArch64).
    #[default]
    General,
    /// Floating-point registers.
    Float,
    /// Condition flags (NZCV on AArch64).
    Flags,
    /// System and counter registers.
    System,
}

impl RegisterType {
    /// Number of register banks.
    pub const COUNT: usize = 4;

    /// Bank index inside a [`RegisterFileSet`].
    pub const fn index(self) -> usize {
        match self {
            Self::General => 0,
            Self::Float => 1,
            Self::Flags => 2,
            Self::System => 3,
        }
    }
}

/// An architectural register identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register {
    /// Bank the register lives in.
    pub kind: RegisterType,
    /// Index within the bank.
    pub tag: u16,
}

impl Register {
    /// General-purpose register `tag`.
    pub const fn general(tag: u16) -> Self {
        Self {
            kind: RegisterType::General,
            tag,
        }
    }

    /// The (single) condition-flags register.
    pub const fn flags() -> Self {
        Self {
            kind: RegisterType::Flags,
            tag: 0,
        }
    }

    /// System register `tag`.
    pub const fn system(tag: u16) -> Self {
        Self {
            kind: RegisterType::System,
            tag,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            RegisterType::General => "r",
            RegisterType::Float => "f",
            RegisterType::Flags => "flags",
            RegisterType::System => "sys",
        };
        write!(f, "{prefix}{}", self.tag)
    }
}

/// A register-sized value of 1 to 8 bytes.
///
/// Bits above `size` bytes are always zero, so two values compare equal exactly when
/// they hold the same bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RegisterValue {
    bits: u64,
    size: u8,
}

impl RegisterValue {
    /// Creates a value of `size` bytes, truncating `bits` to that width.
    pub const fn new(bits: u64, size: u8) -> Self {
        let bits = if size >= 8 {
            bits
        } else {
            bits & ((1u64 << (size as u32 * 8)) - 1)
        };
        Self { bits, size }
    }

    /// Builds a value from little-endian bytes (at most eight are used).
    pub fn from_le_bytes(bytes: &[u8]) -> Self {
        let len = bytes.len().min(8);
        let mut buf = [0u8; 8];
        buf[..len].copy_from_slice(&bytes[..len]);
        Self::new(u64::from_le_bytes(buf), len as u8)
    }

    /// The value zero-extended to 64 bits.
    pub const fn get(&self) -> u64 {
        self.bits
    }

    /// Width in bytes.
    pub const fn size(&self) -> u8 {
        self.size
    }

    /// The value sign-extended from its width to 64 bits.
    pub const fn sign_extended(&self) -> u64 {
        if self.size == 0 || self.size >= 8 {
            return self.bits;
        }
        let shift = 64 - self.size as u32 * 8;
        (((self.bits << shift) as i64) >> shift) as u64
    }

    /// The low `size` bytes in little-endian order.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.bits.to_le_bytes()[..self.size as usize].to_vec()
    }
}

impl From<u64> for RegisterValue {
    fn from(bits: u64) -> Self {
        Self::new(bits, 8)
    }
}

/// Shape of one register bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterFileStructure {
    /// Width of each register in bytes.
    pub bytes: u8,
    /// Number of registers in the bank.
    pub quantity: u16,
}

/// One register bank per [`RegisterType`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterFileSet {
    banks: Vec<Vec<RegisterValue>>,
}

impl RegisterFileSet {
    /// Creates a register file set with every register zeroed.
    ///
    /// # Arguments
    ///
    /// * `structure` - One entry per bank, in [`RegisterType::index`] order. Missing
    ///   trailing banks are created empty.
    pub fn new(structure: &[RegisterFileStructure]) -> Self {
        let mut banks = vec![Vec::new(); RegisterType::COUNT];
        for (bank, shape) in banks.iter_mut().zip(structure) {
            *bank = vec![RegisterValue::new(0, shape.bytes); shape.quantity as usize];
        }
        Self { banks }
    }

    /// Reads a register.
    ///
    /// # Panics
    ///
    /// Panics if the register is outside the bank; decoders only name registers
    /// that exist in their architecture's structure.
    pub fn get(&self, reg: Register) -> RegisterValue {
        self.banks[reg.kind.index()][reg.tag as usize]
    }

    /// Writes a register, zero-extending or truncating the value to the bank's width.
    pub fn set(&mut self, reg: Register, value: RegisterValue) {
        let slot = &mut self.banks[reg.kind.index()][reg.tag as usize];
        *slot = RegisterValue::new(value.get(), slot.size());
    }

    /// Number of registers in a bank.
    pub fn bank_len(&self, kind: RegisterType) -> usize {
        self.banks[kind.index()].len()
    }
}
