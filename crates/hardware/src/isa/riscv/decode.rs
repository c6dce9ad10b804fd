//! RV64 instruction decoding.
//!
//! Turns a 32-bit word (compressed forms are expanded first) into a micro-op
//! template: opcode, class flags, operand and destination registers, immediate
//! and branch class. Timing and identity are attached later by the decode cache.

use crate::common::error::InstructionException;
use crate::common::reg::{Register, RegisterValue};
use crate::core::units::bru::BranchType;
use crate::isa::MacroOp;
use crate::isa::group::InstructionFlags;
use crate::isa::instruction::{Instruction, Opcode as MicroOpcode};

use super::csr;
use super::opcode::{Opcode, major};

/// Field accessors over a raw 32-bit instruction word.
trait InstructionBits {
    fn opcode(&self) -> u32;
    fn rd(&self) -> u32;
    fn rs1(&self) -> u32;
    fn rs2(&self) -> u32;
    fn funct3(&self) -> u32;
    fn funct7(&self) -> u32;
    fn imm_i(&self) -> i64;
    fn imm_s(&self) -> i64;
    fn imm_b(&self) -> i64;
    fn imm_u(&self) -> i64;
    fn imm_j(&self) -> i64;
    fn csr(&self) -> u16;
}

impl InstructionBits for u32 {
    fn opcode(&self) -> u32 {
        self & 0x7F
    }

    fn rd(&self) -> u32 {
        (self >> 7) & 0x1F
    }

    fn rs1(&self) -> u32 {
        (self >> 15) & 0x1F
    }

    fn rs2(&self) -> u32 {
        (self >> 20) & 0x1F
    }

    fn funct3(&self) -> u32 {
        (self >> 12) & 0x7
    }

    fn funct7(&self) -> u32 {
        (self >> 25) & 0x7F
    }

    fn imm_i(&self) -> i64 {
        i64::from((*self as i32) >> 20)
    }

    fn imm_s(&self) -> i64 {
        let low = (self >> 7) & 0x1F;
        let high = ((*self as i32) >> 25) << 5;
        i64::from(high | low as i32)
    }

    fn imm_b(&self) -> i64 {
        let bit12 = ((*self as i32) >> 31) << 12;
        let bit11 = ((self >> 7) & 1) << 11;
        let bits10_5 = ((self >> 25) & 0x3F) << 5;
        let bits4_1 = ((self >> 8) & 0xF) << 1;
        i64::from(bit12 | (bit11 | bits10_5 | bits4_1) as i32)
    }

    fn imm_u(&self) -> i64 {
        i64::from((*self & 0xFFFF_F000) as i32)
    }

    fn imm_j(&self) -> i64 {
        let bit20 = ((*self as i32) >> 31) << 20;
        let bits19_12 = self & 0x000F_F000;
        let bit11 = ((self >> 20) & 1) << 11;
        let bits10_1 = ((self >> 21) & 0x3FF) << 1;
        i64::from(bit20 | (bits19_12 | bit11 | bits10_1) as i32)
    }

    fn csr(&self) -> u16 {
        (self >> 20) as u16
    }
}

/// Decodes a 32-bit instruction word into its micro-op templates.
///
/// RISC-V instructions never split, so the macro-op always holds one micro-op.
/// Words that do not decode produce an `Unallocated` micro-op carrying
/// `EncodingUnallocated`.
pub fn decode(word: u32) -> MacroOp {
    let uop = match decode_word(word) {
        Ok(uop) => uop,
        Err(exception) => faulted(exception),
    };
    vec![uop]
}

/// Macro-op for a word that does not decode.
pub fn unallocated() -> MacroOp {
    vec![faulted(InstructionException::EncodingUnallocated)]
}

fn faulted(exception: InstructionException) -> Instruction {
    let mut uop = Instruction::new(
        MicroOpcode::Riscv(Opcode::Unallocated),
        InstructionFlags::default(),
    );
    uop.raise(exception);
    uop
}

type Decoded = Result<Instruction, InstructionException>;

fn decode_word(word: u32) -> Decoded {
    match word.opcode() {
        major::LUI => Ok(upper(Opcode::Lui, word)),
        major::AUIPC => Ok(upper(Opcode::Auipc, word)),
        major::JAL => Ok(jal(word)),
        major::JALR if word.funct3() == 0 => Ok(jalr(word)),
        major::BRANCH => branch(word),
        major::LOAD => load(word),
        major::STORE => store(word),
        major::OP_IMM => op_imm(word),
        major::OP_IMM_32 => op_imm_32(word),
        major::OP => op(word),
        major::OP_32 => op_32(word),
        major::AMO => amo(word),
        major::MISC_MEM if word.funct3() <= 1 => Ok(build(Opcode::Fence, flags())),
        major::SYSTEM => system(word),
        _ => Err(InstructionException::EncodingUnallocated),
    }
}

// ══════════════════════════════════════════════════════════
// Template helpers
// ══════════════════════════════════════════════════════════

fn flags() -> InstructionFlags {
    InstructionFlags::default()
}

fn build(op: Opcode, flags: InstructionFlags) -> Instruction {
    Instruction::new(MicroOpcode::Riscv(op), flags)
}

/// Adds `x{reg}` as a source; `x0` is supplied immediately as zero.
fn read(uop: &mut Instruction, reg: u32) {
    if reg == 0 {
        uop.push_supplied_source(Register::general(0), RegisterValue::from(0));
    } else {
        uop.push_source(Register::general(reg as u16));
    }
}

/// Adds `x{reg}` as a destination; writes to `x0` are dropped.
fn write(uop: &mut Instruction, reg: u32) {
    if reg != 0 {
        uop.push_destination(Register::general(reg as u16));
    }
}

fn rr(op: Opcode, flags: InstructionFlags, word: u32) -> Instruction {
    let mut uop = build(op, flags);
    read(&mut uop, word.rs1());
    read(&mut uop, word.rs2());
    write(&mut uop, word.rd());
    uop
}

fn ri(op: Opcode, flags: InstructionFlags, word: u32, imm: i64) -> Instruction {
    let mut uop = build(op, flags);
    read(&mut uop, word.rs1());
    write(&mut uop, word.rd());
    uop.imm = imm;
    uop
}

const fn is_link(reg: u32) -> bool {
    reg == 1 || reg == 5
}

// ══════════════════════════════════════════════════════════
// Per-format decoders
// ══════════════════════════════════════════════════════════

fn upper(op: Opcode, word: u32) -> Instruction {
    let mut uop = build(op, flags());
    write(&mut uop, word.rd());
    uop.imm = word.imm_u();
    uop
}

fn jal(word: u32) -> Instruction {
    let mut uop = build(
        Opcode::Jal,
        InstructionFlags {
            is_branch: true,
            ..flags()
        },
    );
    write(&mut uop, word.rd());
    uop.imm = word.imm_j();
    let kind = if is_link(word.rd()) {
        BranchType::SubroutineCall
    } else {
        BranchType::Unconditional
    };
    uop.set_branch_info(kind, Some(uop.imm));
    uop
}

fn jalr(word: u32) -> Instruction {
    let branch = InstructionFlags {
        is_branch: true,
        ..flags()
    };
    let mut uop = ri(Opcode::Jalr, branch, word, word.imm_i());
    let kind = match (word.rd(), word.rs1()) {
        (0, rs1) if is_link(rs1) => BranchType::Return,
        (rd, _) if is_link(rd) => BranchType::SubroutineCall,
        _ => BranchType::Unconditional,
    };
    uop.set_branch_info(kind, None);
    uop
}

fn branch(word: u32) -> Decoded {
    let op = match word.funct3() {
        0b000 => Opcode::Beq,
        0b001 => Opcode::Bne,
        0b100 => Opcode::Blt,
        0b101 => Opcode::Bge,
        0b110 => Opcode::Bltu,
        0b111 => Opcode::Bgeu,
        _ => return Err(InstructionException::EncodingUnallocated),
    };
    let mut uop = build(
        op,
        InstructionFlags {
            is_branch: true,
            is_compare: true,
            ..flags()
        },
    );
    read(&mut uop, word.rs1());
    read(&mut uop, word.rs2());
    uop.imm = word.imm_b();
    uop.set_branch_info(BranchType::Conditional, Some(uop.imm));
    Ok(uop)
}

fn load(word: u32) -> Decoded {
    let op = match word.funct3() {
        0b000 => Opcode::Lb,
        0b001 => Opcode::Lh,
        0b010 => Opcode::Lw,
        0b011 => Opcode::Ld,
        0b100 => Opcode::Lbu,
        0b101 => Opcode::Lhu,
        0b110 => Opcode::Lwu,
        _ => return Err(InstructionException::EncodingUnallocated),
    };
    let load = InstructionFlags {
        is_load: true,
        ..flags()
    };
    Ok(ri(op, load, word, word.imm_i()))
}

fn store(word: u32) -> Decoded {
    let op = match word.funct3() {
        0b000 => Opcode::Sb,
        0b001 => Opcode::Sh,
        0b010 => Opcode::Sw,
        0b011 => Opcode::Sd,
        _ => return Err(InstructionException::EncodingUnallocated),
    };
    let mut uop = build(
        op,
        InstructionFlags {
            is_store_address: true,
            is_store_data: true,
            ..flags()
        },
    );
    read(&mut uop, word.rs1());
    read(&mut uop, word.rs2());
    uop.imm = word.imm_s();
    Ok(uop)
}

fn op_imm(word: u32) -> Decoded {
    let shamt = i64::from((word >> 20) & 0x3F);
    let funct6 = word >> 26;
    let (op, kind) = match (word.funct3(), funct6) {
        (0b000, _) => (Opcode::Addi, flags()),
        (0b010, _) => (Opcode::Slti, compare()),
        (0b011, _) => (Opcode::Sltiu, compare()),
        (0b100, _) => (Opcode::Xori, logical()),
        (0b110, _) => (Opcode::Ori, logical()),
        (0b111, _) => (Opcode::Andi, logical()),
        (0b001, 0b00_0000) => return Ok(ri(Opcode::Slli, shift(), word, shamt)),
        (0b101, 0b00_0000) => return Ok(ri(Opcode::Srli, shift(), word, shamt)),
        (0b101, 0b01_0000) => return Ok(ri(Opcode::Srai, shift(), word, shamt)),
        _ => return Err(InstructionException::EncodingUnallocated),
    };
    Ok(ri(op, kind, word, word.imm_i()))
}

fn op_imm_32(word: u32) -> Decoded {
    let shamt = i64::from(word.rs2());
    match (word.funct3(), word.funct7()) {
        (0b000, _) => Ok(ri(Opcode::Addiw, flags(), word, word.imm_i())),
        (0b001, 0x00) => Ok(ri(Opcode::Slliw, shift(), word, shamt)),
        (0b101, 0x00) => Ok(ri(Opcode::Srliw, shift(), word, shamt)),
        (0b101, 0x20) => Ok(ri(Opcode::Sraiw, shift(), word, shamt)),
        _ => Err(InstructionException::EncodingUnallocated),
    }
}

fn op(word: u32) -> Decoded {
    let (op, kind) = match (word.funct7(), word.funct3()) {
        (0x00, 0b000) => (Opcode::Add, flags()),
        (0x20, 0b000) => (Opcode::Sub, flags()),
        (0x00, 0b001) => (Opcode::Sll, shift()),
        (0x00, 0b010) => (Opcode::Slt, compare()),
        (0x00, 0b011) => (Opcode::Sltu, compare()),
        (0x00, 0b100) => (Opcode::Xor, logical()),
        (0x00, 0b101) => (Opcode::Srl, shift()),
        (0x20, 0b101) => (Opcode::Sra, shift()),
        (0x00, 0b110) => (Opcode::Or, logical()),
        (0x00, 0b111) => (Opcode::And, logical()),
        (0x01, 0b000) => (Opcode::Mul, multiply()),
        (0x01, 0b001) => (Opcode::Mulh, multiply()),
        (0x01, 0b010) => (Opcode::Mulhsu, multiply()),
        (0x01, 0b011) => (Opcode::Mulhu, multiply()),
        (0x01, 0b100) => (Opcode::Div, divide()),
        (0x01, 0b101) => (Opcode::Divu, divide()),
        (0x01, 0b110) => (Opcode::Rem, divide()),
        (0x01, 0b111) => (Opcode::Remu, divide()),
        _ => return Err(InstructionException::EncodingUnallocated),
    };
    Ok(rr(op, kind, word))
}

fn op_32(word: u32) -> Decoded {
    let (op, kind) = match (word.funct7(), word.funct3()) {
        (0x00, 0b000) => (Opcode::Addw, flags()),
        (0x20, 0b000) => (Opcode::Subw, flags()),
        (0x00, 0b001) => (Opcode::Sllw, shift()),
        (0x00, 0b101) => (Opcode::Srlw, shift()),
        (0x20, 0b101) => (Opcode::Sraw, shift()),
        (0x01, 0b000) => (Opcode::Mulw, multiply()),
        (0x01, 0b100) => (Opcode::Divw, divide()),
        (0x01, 0b101) => (Opcode::Divuw, divide()),
        (0x01, 0b110) => (Opcode::Remw, divide()),
        (0x01, 0b111) => (Opcode::Remuw, divide()),
        _ => return Err(InstructionException::EncodingUnallocated),
    };
    Ok(rr(op, kind, word))
}

fn amo(word: u32) -> Decoded {
    let double = match word.funct3() {
        0b010 => false,
        0b011 => true,
        _ => return Err(InstructionException::EncodingUnallocated),
    };
    let pick = |w: Opcode, d: Opcode| if double { d } else { w };
    let funct5 = word >> 27;
    let ordering = InstructionFlags {
        is_atomic: true,
        is_acquire: (word >> 26) & 1 == 1,
        is_release: (word >> 25) & 1 == 1,
        ..flags()
    };

    let mut uop = match funct5 {
        0b00010 if word.rs2() == 0 => {
            let mut uop = build(
                pick(Opcode::LrW, Opcode::LrD),
                InstructionFlags {
                    is_load: true,
                    is_load_reserved: true,
                    ..ordering
                },
            );
            read(&mut uop, word.rs1());
            uop
        }
        0b00011 => {
            let mut uop = build(
                pick(Opcode::ScW, Opcode::ScD),
                InstructionFlags {
                    is_store_address: true,
                    is_store_data: true,
                    is_store_conditional: true,
                    ..ordering
                },
            );
            read(&mut uop, word.rs1());
            read(&mut uop, word.rs2());
            uop
        }
        _ => {
            let op = match funct5 {
                0b00001 => pick(Opcode::AmoswapW, Opcode::AmoswapD),
                0b00000 => pick(Opcode::AmoaddW, Opcode::AmoaddD),
                0b00100 => pick(Opcode::AmoxorW, Opcode::AmoxorD),
                0b01100 => pick(Opcode::AmoandW, Opcode::AmoandD),
                0b01000 => pick(Opcode::AmoorW, Opcode::AmoorD),
                0b10000 => pick(Opcode::AmominW, Opcode::AmominD),
                0b10100 => pick(Opcode::AmomaxW, Opcode::AmomaxD),
                0b11000 => pick(Opcode::AmominuW, Opcode::AmominuD),
                0b11100 => pick(Opcode::AmomaxuW, Opcode::AmomaxuD),
                _ => return Err(InstructionException::EncodingUnallocated),
            };
            let mut uop = build(
                op,
                InstructionFlags {
                    is_load: true,
                    is_store_address: true,
                    is_store_data: true,
                    ..ordering
                },
            );
            read(&mut uop, word.rs1());
            read(&mut uop, word.rs2());
            uop
        }
    };
    write(&mut uop, word.rd());
    Ok(uop)
}

fn system(word: u32) -> Decoded {
    match word.funct3() {
        0b000 => match word {
            0x0000_0073 => Ok(build(Opcode::Ecall, flags())),
            0x0010_0073 => Ok(build(Opcode::Ebreak, flags())),
            _ => Err(InstructionException::EncodingUnallocated),
        },
        0b100 => Err(InstructionException::EncodingUnallocated),
        funct3 => csr_access(word, funct3),
    }
}

fn csr_access(word: u32, funct3: u32) -> Decoded {
    let op = match funct3 {
        0b001 => Opcode::Csrrw,
        0b010 => Opcode::Csrrs,
        0b011 => Opcode::Csrrc,
        0b101 => Opcode::Csrrwi,
        0b110 => Opcode::Csrrsi,
        _ => Opcode::Csrrci,
    };
    let reg = csr::register(word.csr()).ok_or(InstructionException::UnmappedSystemRegister)?;
    let immediate = funct3 & 0b100 != 0;
    // csrrs/csrrc with a zero source never write the CSR.
    let writes = matches!(op, Opcode::Csrrw | Opcode::Csrrwi) || word.rs1() != 0;
    if writes && csr::is_read_only(word.csr()) {
        return Err(InstructionException::EncodingUnallocated);
    }

    let mut uop = build(op, flags());
    if immediate {
        uop.push_supplied_source(
            Register::general(0),
            RegisterValue::from(u64::from(word.rs1())),
        );
    } else {
        read(&mut uop, word.rs1());
    }
    uop.push_source(reg);
    write(&mut uop, word.rd());
    if writes {
        uop.push_destination(reg);
    }
    Ok(uop)
}

fn compare() -> InstructionFlags {
    InstructionFlags {
        is_compare: true,
        ..flags()
    }
}

fn logical() -> InstructionFlags {
    InstructionFlags {
        is_logical: true,
        ..flags()
    }
}

fn shift() -> InstructionFlags {
    InstructionFlags {
        is_shift: true,
        ..flags()
    }
}

fn multiply() -> InstructionFlags {
    InstructionFlags {
        is_multiply: true,
        ..flags()
    }
}

fn divide() -> InstructionFlags {
    InstructionFlags {
        is_divide: true,
        ..flags()
    }
}
