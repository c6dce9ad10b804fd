//! Compressed (RVC) instruction expansion.
//!
//! Every supported 16-bit encoding is rewritten to the 32-bit instruction it
//! abbreviates, so the decoder only ever sees full-width words. Floating-point
//! forms and reserved encodings expand to `None`.

use super::opcode::major;

const QUADRANT_0: u16 = 0b00;
const QUADRANT_1: u16 = 0b01;
const QUADRANT_2: u16 = 0b10;

const SP: u32 = 2;
const RA: u32 = 1;

/// Expands a compressed instruction into its 32-bit equivalent.
///
/// # Returns
///
/// The expanded word, or `None` if `half` is reserved or not supported.
pub fn expand(half: u16) -> Option<u32> {
    let funct3 = (half >> 13) & 0x7;
    match half & 0x3 {
        QUADRANT_0 => quadrant_0(half, funct3),
        QUADRANT_1 => quadrant_1(half, funct3),
        QUADRANT_2 => quadrant_2(half, funct3),
        _ => None,
    }
}

fn quadrant_0(half: u16, funct3: u16) -> Option<u32> {
    let rd = rd_prime(half);
    let rs1 = rs1_prime(half);
    match funct3 {
        // C.ADDI4SPN
        0b000 => {
            let imm = bits(half, 6, 1) << 2
                | bits(half, 5, 1) << 3
                | bits(half, 11, 2) << 4
                | bits(half, 7, 4) << 6;
            (imm != 0).then(|| i_type(imm as i32, SP, 0b000, rd, major::OP_IMM))
        }
        // C.LW
        0b010 => Some(i_type(word_offset(half) as i32, rs1, 0b010, rd, major::LOAD)),
        // C.LD
        0b011 => Some(i_type(double_offset(half) as i32, rs1, 0b011, rd, major::LOAD)),
        // C.SW
        0b110 => Some(s_type(word_offset(half) as i32, rd, rs1, 0b010)),
        // C.SD
        0b111 => Some(s_type(double_offset(half) as i32, rd, rs1, 0b011)),
        _ => None,
    }
}

fn quadrant_1(half: u16, funct3: u16) -> Option<u32> {
    let rd = bits(half, 7, 5);
    let imm6 = sign_extend(bits(half, 2, 5) | bits(half, 12, 1) << 5, 6);
    match funct3 {
        // C.ADDI (C.NOP when rd is zero)
        0b000 => Some(i_type(imm6, rd, 0b000, rd, major::OP_IMM)),
        // C.ADDIW
        0b001 => (rd != 0).then(|| i_type(imm6, rd, 0b000, rd, major::OP_IMM_32)),
        // C.LI
        0b010 => Some(i_type(imm6, 0, 0b000, rd, major::OP_IMM)),
        0b011 if rd == SP => {
            // C.ADDI16SP
            let imm = sign_extend(
                bits(half, 6, 1) << 4
                    | bits(half, 2, 1) << 5
                    | bits(half, 5, 1) << 6
                    | bits(half, 3, 2) << 7
                    | bits(half, 12, 1) << 9,
                10,
            );
            (imm != 0).then(|| i_type(imm, SP, 0b000, SP, major::OP_IMM))
        }
        // C.LUI
        0b011 => (imm6 != 0).then(|| ((imm6 as u32 & 0xF_FFFF) << 12) | rd << 7 | major::LUI),
        0b100 => misc_alu(half, imm6),
        // C.J
        0b101 => Some(j_type(jump_offset(half), 0)),
        // C.BEQZ / C.BNEZ
        0b110 => Some(b_type(branch_offset(half), 0, rs1_prime(half), 0b000)),
        0b111 => Some(b_type(branch_offset(half), 0, rs1_prime(half), 0b001)),
        _ => None,
    }
}

fn misc_alu(half: u16, imm6: i32) -> Option<u32> {
    let rd = rs1_prime(half);
    let shamt = imm6 & 0x3F;
    match bits(half, 10, 2) {
        0b00 => Some(i_type(shamt, rd, 0b101, rd, major::OP_IMM)),
        0b01 => Some(i_type(0x400 | shamt, rd, 0b101, rd, major::OP_IMM)),
        0b10 => Some(i_type(imm6, rd, 0b111, rd, major::OP_IMM)),
        _ => {
            let rs2 = rd_prime(half);
            match (bits(half, 12, 1), bits(half, 5, 2)) {
                (0, 0b00) => Some(r_type(0x20, rs2, rd, 0b000, rd, major::OP)),
                (0, 0b01) => Some(r_type(0, rs2, rd, 0b100, rd, major::OP)),
                (0, 0b10) => Some(r_type(0, rs2, rd, 0b110, rd, major::OP)),
                (0, 0b11) => Some(r_type(0, rs2, rd, 0b111, rd, major::OP)),
                (1, 0b00) => Some(r_type(0x20, rs2, rd, 0b000, rd, major::OP_32)),
                (1, 0b01) => Some(r_type(0, rs2, rd, 0b000, rd, major::OP_32)),
                _ => None,
            }
        }
    }
}

fn quadrant_2(half: u16, funct3: u16) -> Option<u32> {
    let rd = bits(half, 7, 5);
    let rs2 = bits(half, 2, 5);
    match funct3 {
        // C.SLLI
        0b000 => {
            let shamt = bits(half, 2, 5) | bits(half, 12, 1) << 5;
            (rd != 0).then(|| i_type(shamt as i32, rd, 0b001, rd, major::OP_IMM))
        }
        // C.LWSP
        0b010 => {
            let imm = bits(half, 12, 1) << 5 | bits(half, 4, 3) << 2 | bits(half, 2, 2) << 6;
            (rd != 0).then(|| i_type(imm as i32, SP, 0b010, rd, major::LOAD))
        }
        // C.LDSP
        0b011 => {
            let imm = bits(half, 12, 1) << 5 | bits(half, 5, 2) << 3 | bits(half, 2, 3) << 6;
            (rd != 0).then(|| i_type(imm as i32, SP, 0b011, rd, major::LOAD))
        }
        0b100 => match (bits(half, 12, 1), rd, rs2) {
            (0, 0, 0) => None,
            // C.JR
            (0, rs1, 0) => Some(i_type(0, rs1, 0b000, 0, major::JALR)),
            // C.MV
            (0, rd, rs2) => Some(r_type(0, rs2, 0, 0b000, rd, major::OP)),
            // C.EBREAK
            (_, 0, 0) => Some(0x0010_0073),
            // C.JALR
            (_, rs1, 0) => Some(i_type(0, rs1, 0b000, RA, major::JALR)),
            // C.ADD
            (_, rd, rs2) => Some(r_type(0, rs2, rd, 0b000, rd, major::OP)),
        },
        // C.SWSP
        0b110 => {
            let imm = bits(half, 9, 4) << 2 | bits(half, 7, 2) << 6;
            Some(s_type(imm as i32, rs2, SP, 0b010))
        }
        // C.SDSP
        0b111 => {
            let imm = bits(half, 10, 3) << 3 | bits(half, 7, 3) << 6;
            Some(s_type(imm as i32, rs2, SP, 0b011))
        }
        _ => None,
    }
}

// ══════════════════════════════════════════════════════════
// Field extraction
// ══════════════════════════════════════════════════════════

const fn bits(half: u16, lo: u32, len: u32) -> u32 {
    (half as u32 >> lo) & ((1 << len) - 1)
}

const fn rd_prime(half: u16) -> u32 {
    8 + bits(half, 2, 3)
}

const fn rs1_prime(half: u16) -> u32 {
    8 + bits(half, 7, 3)
}

const fn word_offset(half: u16) -> u32 {
    bits(half, 6, 1) << 2 | bits(half, 10, 3) << 3 | bits(half, 5, 1) << 6
}

const fn double_offset(half: u16) -> u32 {
    bits(half, 10, 3) << 3 | bits(half, 5, 2) << 6
}

const fn jump_offset(half: u16) -> i32 {
    sign_extend(
        bits(half, 3, 3) << 1
            | bits(half, 11, 1) << 4
            | bits(half, 2, 1) << 5
            | bits(half, 7, 1) << 6
            | bits(half, 6, 1) << 7
            | bits(half, 9, 2) << 8
            | bits(half, 8, 1) << 10
            | bits(half, 12, 1) << 11,
        12,
    )
}

const fn branch_offset(half: u16) -> i32 {
    sign_extend(
        bits(half, 3, 2) << 1
            | bits(half, 10, 2) << 3
            | bits(half, 2, 1) << 5
            | bits(half, 5, 2) << 6
            | bits(half, 12, 1) << 8,
        9,
    )
}

const fn sign_extend(value: u32, width: u32) -> i32 {
    let shift = 32 - width;
    ((value << shift) as i32) >> shift
}

// ══════════════════════════════════════════════════════════
// 32-bit encoders
// ══════════════════════════════════════════════════════════

const fn i_type(imm: i32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
    ((imm as u32 & 0xFFF) << 20) | rs1 << 15 | funct3 << 12 | rd << 7 | opcode
}

const fn s_type(imm: i32, rs2: u32, rs1: u32, funct3: u32) -> u32 {
    let imm = imm as u32;
    ((imm >> 5) & 0x7F) << 25
        | rs2 << 20
        | rs1 << 15
        | funct3 << 12
        | (imm & 0x1F) << 7
        | major::STORE
}

const fn r_type(funct7: u32, rs2: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
    funct7 << 25 | rs2 << 20 | rs1 << 15 | funct3 << 12 | rd << 7 | opcode
}

const fn b_type(offset: i32, rs2: u32, rs1: u32, funct3: u32) -> u32 {
    let imm = offset as u32;
    ((imm >> 12) & 1) << 31
        | ((imm >> 5) & 0x3F) << 25
        | rs2 << 20
        | rs1 << 15
        | funct3 << 12
        | ((imm >> 1) & 0xF) << 8
        | ((imm >> 11) & 1) << 7
        | major::BRANCH
}

const fn j_type(offset: i32, rd: u32) -> u32 {
    let imm = offset as u32;
    ((imm >> 20) & 1) << 31
        | ((imm >> 1) & 0x3FF) << 21
        | ((imm >> 11) & 1) << 20
        | ((imm >> 12) & 0xFF) << 12
        | rd << 7
        | major::JAL
}
