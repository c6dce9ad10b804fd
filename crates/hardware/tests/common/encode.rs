//! # Instruction Encoders
//!
//! Minimal assemblers for the instructions the test programs use. Register
//! arguments are architectural register numbers; immediates are byte offsets.

/// RV64 encoders.
pub mod rv {
    const OP_IMM: u32 = 0x13;
    const OP: u32 = 0x33;
    const LOAD: u32 = 0x03;
    const STORE: u32 = 0x23;
    const BRANCH: u32 = 0x63;
    const LUI: u32 = 0x37;
    const JAL: u32 = 0x6F;
    const JALR: u32 = 0x67;
    const AMO: u32 = 0x2F;

    /// `addi x0, x0, 0`.
    pub const NOP: u32 = 0x0000_0013;

    /// `ecall`.
    pub const ECALL: u32 = 0x0000_0073;

    /// `c.nop`, two bytes.
    pub const C_NOP: u16 = 0x0001;

    /// Stack pointer.
    pub const SP: u32 = 2;
    /// First argument / return value.
    pub const A0: u32 = 10;
    /// Second argument.
    pub const A1: u32 = 11;
    /// Third argument.
    pub const A2: u32 = 12;
    /// Syscall number.
    pub const A7: u32 = 17;
    /// Return address.
    pub const RA: u32 = 1;

    fn r(funct7: u32, rs2: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
        (funct7 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
    }

    fn i(imm: i32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
        (((imm as u32) & 0xFFF) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
    }

    fn s(imm: i32, rs2: u32, rs1: u32, funct3: u32) -> u32 {
        let imm = imm as u32;
        (((imm >> 5) & 0x7F) << 25)
            | (rs2 << 20)
            | (rs1 << 15)
            | (funct3 << 12)
            | ((imm & 0x1F) << 7)
            | STORE
    }

    fn b(offset: i32, rs2: u32, rs1: u32, funct3: u32) -> u32 {
        let imm = offset as u32;
        (((imm >> 12) & 1) << 31)
            | (((imm >> 5) & 0x3F) << 25)
            | (rs2 << 20)
            | (rs1 << 15)
            | (funct3 << 12)
            | (((imm >> 1) & 0xF) << 8)
            | (((imm >> 11) & 1) << 7)
            | BRANCH
    }

    /// `addi rd, rs1, imm`.
    pub fn addi(rd: u32, rs1: u32, imm: i32) -> u32 {
        i(imm, rs1, 0, rd, OP_IMM)
    }

    /// `slli rd, rs1, shamt`.
    pub fn slli(rd: u32, rs1: u32, shamt: u32) -> u32 {
        i(shamt as i32 & 0x3F, rs1, 1, rd, OP_IMM)
    }

    /// `add rd, rs1, rs2`.
    pub fn add(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r(0, rs2, rs1, 0, rd, OP)
    }

    /// `sub rd, rs1, rs2`.
    pub fn sub(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r(0x20, rs2, rs1, 0, rd, OP)
    }

    /// `mul rd, rs1, rs2`.
    pub fn mul(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r(0x01, rs2, rs1, 0, rd, OP)
    }

    /// `div rd, rs1, rs2`.
    pub fn div(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r(0x01, rs2, rs1, 4, rd, OP)
    }

    /// `lui rd, imm20`.
    pub fn lui(rd: u32, imm20: u32) -> u32 {
        ((imm20 & 0xF_FFFF) << 12) | (rd << 7) | LUI
    }

    /// `lb rd, offset(rs1)`.
    pub fn lb(rd: u32, rs1: u32, offset: i32) -> u32 {
        i(offset, rs1, 0, rd, LOAD)
    }

    /// `lw rd, offset(rs1)`.
    pub fn lw(rd: u32, rs1: u32, offset: i32) -> u32 {
        i(offset, rs1, 2, rd, LOAD)
    }

    /// `ld rd, offset(rs1)`.
    pub fn ld(rd: u32, rs1: u32, offset: i32) -> u32 {
        i(offset, rs1, 3, rd, LOAD)
    }

    /// `lbu rd, offset(rs1)`.
    pub fn lbu(rd: u32, rs1: u32, offset: i32) -> u32 {
        i(offset, rs1, 4, rd, LOAD)
    }

    /// `lwu rd, offset(rs1)`.
    pub fn lwu(rd: u32, rs1: u32, offset: i32) -> u32 {
        i(offset, rs1, 6, rd, LOAD)
    }

    /// `sb rs2, offset(rs1)`.
    pub fn sb(rs2: u32, rs1: u32, offset: i32) -> u32 {
        s(offset, rs2, rs1, 0)
    }

    /// `sd rs2, offset(rs1)`.
    pub fn sd(rs2: u32, rs1: u32, offset: i32) -> u32 {
        s(offset, rs2, rs1, 3)
    }

    /// `beq rs1, rs2, offset`.
    pub fn beq(rs1: u32, rs2: u32, offset: i32) -> u32 {
        b(offset, rs2, rs1, 0)
    }

    /// `bne rs1, rs2, offset`.
    pub fn bne(rs1: u32, rs2: u32, offset: i32) -> u32 {
        b(offset, rs2, rs1, 1)
    }

    /// `blt rs1, rs2, offset`.
    pub fn blt(rs1: u32, rs2: u32, offset: i32) -> u32 {
        b(offset, rs2, rs1, 4)
    }

    /// `jal rd, offset`.
    pub fn jal(rd: u32, offset: i32) -> u32 {
        let imm = offset as u32;
        (((imm >> 20) & 1) << 31)
            | (((imm >> 1) & 0x3FF) << 21)
            | (((imm >> 11) & 1) << 20)
            | (((imm >> 12) & 0xFF) << 12)
            | (rd << 7)
            | JAL
    }

    /// `jalr rd, offset(rs1)`.
    pub fn jalr(rd: u32, rs1: u32, offset: i32) -> u32 {
        i(offset, rs1, 0, rd, JALR)
    }

    /// `ret`.
    pub fn ret() -> u32 {
        jalr(0, RA, 0)
    }

    /// `lr.d rd, (rs1)`.
    pub fn lr_d(rd: u32, rs1: u32) -> u32 {
        (0b00010 << 27) | (rs1 << 15) | (3 << 12) | (rd << 7) | AMO
    }

    /// `sc.d rd, rs2, (rs1)`.
    pub fn sc_d(rd: u32, rs2: u32, rs1: u32) -> u32 {
        (0b00011 << 27) | (rs2 << 20) | (rs1 << 15) | (3 << 12) | (rd << 7) | AMO
    }

    /// `amoadd.d rd, rs2, (rs1)`.
    pub fn amoadd_d(rd: u32, rs2: u32, rs1: u32) -> u32 {
        (rs2 << 20) | (rs1 << 15) | (3 << 12) | (rd << 7) | AMO
    }

    /// Loads a small immediate into `rd`.
    pub fn li(rd: u32, imm: i32) -> u32 {
        addi(rd, 0, imm)
    }
}

/// AArch64 encoders (64-bit forms).
pub mod a64 {
    /// `svc #0`.
    pub const SVC: u32 = 0xD400_0001;

    /// `nop`.
    pub const NOP: u32 = 0xD503_201F;

    /// `ret` (through x30).
    pub const RET: u32 = 0xD65F_03C0;

    /// Syscall number register.
    pub const X8: u32 = 8;

    /// `movz xd, #imm16`.
    pub fn movz(rd: u32, imm16: u32) -> u32 {
        0xD280_0000 | ((imm16 & 0xFFFF) << 5) | rd
    }

    /// `add xd, xn, #imm12`.
    pub fn add_imm(rd: u32, rn: u32, imm12: u32) -> u32 {
        0x9100_0000 | ((imm12 & 0xFFF) << 10) | (rn << 5) | rd
    }

    /// `sub xd, xn, #imm12`.
    pub fn sub_imm(rd: u32, rn: u32, imm12: u32) -> u32 {
        0xD100_0000 | ((imm12 & 0xFFF) << 10) | (rn << 5) | rd
    }

    /// `subs xd, xn, #imm12`.
    pub fn subs_imm(rd: u32, rn: u32, imm12: u32) -> u32 {
        0xF100_0000 | ((imm12 & 0xFFF) << 10) | (rn << 5) | rd
    }

    /// `add xd, xn, xm`.
    pub fn add(rd: u32, rn: u32, rm: u32) -> u32 {
        0x8B00_0000 | (rm << 16) | (rn << 5) | rd
    }

    /// `adc xd, xn, xm`.
    pub fn adc(rd: u32, rn: u32, rm: u32) -> u32 {
        0x9A00_0000 | (rm << 16) | (rn << 5) | rd
    }

    /// `ldr xt, [xn, #offset]`; `offset` is a multiple of 8.
    pub fn ldr(rt: u32, rn: u32, offset: u32) -> u32 {
        0xF940_0000 | ((offset / 8) << 10) | (rn << 5) | rt
    }

    /// `str xt, [xn, #offset]`; `offset` is a multiple of 8.
    pub fn str(rt: u32, rn: u32, offset: u32) -> u32 {
        0xF900_0000 | ((offset / 8) << 10) | (rn << 5) | rt
    }

    /// `ldrb wt, [xn, #offset]`.
    pub fn ldrb(rt: u32, rn: u32, offset: u32) -> u32 {
        0x3940_0000 | ((offset & 0xFFF) << 10) | (rn << 5) | rt
    }

    /// `ldrsb xt, [xn, #offset]`.
    pub fn ldrsb(rt: u32, rn: u32, offset: u32) -> u32 {
        0x3980_0000 | ((offset & 0xFFF) << 10) | (rn << 5) | rt
    }

    /// `cas xs, xt, [xn]`.
    pub fn cas(rs: u32, rt: u32, rn: u32) -> u32 {
        0xC8A0_7C00 | (rs << 16) | (rn << 5) | rt
    }

    /// `b offset`.
    pub fn b(offset: i32) -> u32 {
        0x1400_0000 | (((offset >> 2) as u32) & 0x03FF_FFFF)
    }

    /// `bl offset`.
    pub fn bl(offset: i32) -> u32 {
        0x9400_0000 | (((offset >> 2) as u32) & 0x03FF_FFFF)
    }

    /// `cbnz xt, offset`.
    pub fn cbnz(rt: u32, offset: i32) -> u32 {
        0xB500_0000 | ((((offset >> 2) as u32) & 0x7_FFFF) << 5) | rt
    }

    /// `b.ne offset`.
    pub fn b_ne(offset: i32) -> u32 {
        0x5400_0000 | ((((offset >> 2) as u32) & 0x7_FFFF) << 5) | 0x1
    }
}

/// Little-endian bytes of `words`.
pub fn assemble(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}
