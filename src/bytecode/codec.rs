//! Binary form of a [`Program`].
//!
//! Each instruction is one tag byte followed by exactly `Opcode::arity()`
//! little-endian `i32` words. Nothing else is stored, so instruction
//! boundaries come from the arity table alone.
//!
//! Tag byte layout:
//!
//! ```text
//!   bit 0-3  opcode number
//!   bit 4    first value operand is a literal   (ADD..MOD, CMP)
//!   bit 5    second value operand is a literal  (ADD..MOD, CMP)
//! ```

use crate::bytecode::{Instruction, Opcode, Operand, Program, RelOp};
use crate::frontend::token::ArithOp;
use thiserror::Error;

pub const WORD_SIZE: usize = 4;

const OPCODE_MASK: u8 = 0x0F;
const LHS_LITERAL: u8 = 0x10;
const RHS_LITERAL: u8 = 0x20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("encode error: instruction {addr}: index {value} does not fit in a signed 32-bit word")]
    IndexOverflow { addr: usize, value: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes remain than the opcode's arity requires
    #[error(
        "decode error: byte {offset}: {opcode} needs {expected} operand bytes, only {available} remain"
    )]
    Truncated {
        offset: usize,
        opcode: &'static str,
        expected: usize,
        available: usize,
    },

    #[error("decode error: byte {offset}: unknown instruction tag 0x{tag:02x}")]
    UnknownTag { offset: usize, tag: u8 },

    #[error("decode error: byte {offset}: unknown relational operator code {code}")]
    UnknownRelation { offset: usize, code: i32 },

    /// A slot index or jump target word was negative
    #[error("decode error: byte {offset}: negative index {value}")]
    NegativeIndex { offset: usize, value: i32 },
}

// =============================================================================
// Encoding
// =============================================================================

fn index_word(addr: usize, value: u32) -> Result<i32, EncodeError> {
    i32::try_from(value).map_err(|_| EncodeError::IndexOverflow { addr, value })
}

fn operand_word(addr: usize, operand: Operand) -> Result<i32, EncodeError> {
    match operand {
        Operand::Literal(n) => Ok(n),
        Operand::Slot(s) => index_word(addr, s),
    }
}

fn value_tag(opcode: Opcode, lhs: Operand, rhs: Operand) -> u8 {
    let mut tag = opcode as u8;
    if lhs.is_literal() {
        tag |= LHS_LITERAL;
    }
    if rhs.is_literal() {
        tag |= RHS_LITERAL;
    }
    tag
}

/// Tag byte plus operand words of one instruction.
fn frame(addr: usize, instr: &Instruction) -> Result<(u8, Vec<i32>), EncodeError> {
    let opcode = instr.opcode();
    Ok(match *instr {
        Instruction::Set { dest, value } => (opcode as u8, vec![index_word(addr, dest)?, value]),
        Instruction::Add { dest, lhs, rhs }
        | Instruction::Sub { dest, lhs, rhs }
        | Instruction::Mul { dest, lhs, rhs }
        | Instruction::Div { dest, lhs, rhs }
        | Instruction::Mod { dest, lhs, rhs } => (
            value_tag(opcode, lhs, rhs),
            vec![
                index_word(addr, dest)?,
                operand_word(addr, lhs)?,
                operand_word(addr, rhs)?,
            ],
        ),
        Instruction::Cmp { lhs, rhs, op } => (
            value_tag(opcode, lhs, rhs),
            vec![operand_word(addr, lhs)?, operand_word(addr, rhs)?, op.code()],
        ),
        Instruction::JumpIfFalse { target } | Instruction::Jump { target } => {
            (opcode as u8, vec![index_word(addr, target)?])
        }
        Instruction::Return { src } => (opcode as u8, vec![index_word(addr, src)?]),
    })
}

/// Appends the encoding of `program` to `out`.
pub fn encode_into(program: &Program, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    for (addr, instr) in program.instructions.iter().enumerate() {
        let (tag, words) = frame(addr, instr)?;
        debug_assert_eq!(words.len(), instr.opcode().arity());
        out.push(tag);
        for word in words {
            out.extend_from_slice(&word.to_le_bytes());
        }
    }
    Ok(())
}

pub fn encode(program: &Program) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    encode_into(program, &mut out)?;
    Ok(out)
}

// =============================================================================
// Decoding
// =============================================================================

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn byte(&mut self) -> Option<u8> {
        let b = self.bytes.get(self.pos).copied()?;
        self.pos += 1;
        Some(b)
    }

    /// Caller has already checked that a whole word remains.
    fn word(&mut self) -> (usize, i32) {
        let at = self.pos;
        let mut buf = [0u8; WORD_SIZE];
        buf.copy_from_slice(&self.bytes[at..at + WORD_SIZE]);
        self.pos += WORD_SIZE;
        (at, i32::from_le_bytes(buf))
    }

    fn index(&mut self) -> Result<u32, DecodeError> {
        let (offset, value) = self.word();
        u32::try_from(value).map_err(|_| DecodeError::NegativeIndex { offset, value })
    }

    fn operand(&mut self, literal: bool) -> Result<Operand, DecodeError> {
        if literal {
            Ok(Operand::Literal(self.word().1))
        } else {
            Ok(Operand::Slot(self.index()?))
        }
    }

    fn arith(
        &mut self,
        op: ArithOp,
        lhs_literal: bool,
        rhs_literal: bool,
    ) -> Result<Instruction, DecodeError> {
        let dest = self.index()?;
        let lhs = self.operand(lhs_literal)?;
        let rhs = self.operand(rhs_literal)?;
        Ok(op.instruction(dest, lhs, rhs))
    }

    fn relation(&mut self) -> Result<RelOp, DecodeError> {
        let (offset, code) = self.word();
        RelOp::from_code(code).ok_or(DecodeError::UnknownRelation { offset, code })
    }
}

fn parse_tag(offset: usize, tag: u8) -> Result<(Opcode, bool, bool), DecodeError> {
    let unknown = DecodeError::UnknownTag { offset, tag };
    let opcode = Opcode::from_u8(tag & OPCODE_MASK).ok_or(unknown.clone())?;
    let modes = tag & !OPCODE_MASK;
    if modes & !(LHS_LITERAL | RHS_LITERAL) != 0 || (modes != 0 && !opcode.has_value_operands()) {
        return Err(unknown);
    }
    Ok((opcode, modes & LHS_LITERAL != 0, modes & RHS_LITERAL != 0))
}

/// Decodes a byte stream produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<Program, DecodeError> {
    let mut reader = Reader { bytes, pos: 0 };
    let mut instructions = Vec::new();

    while let Some(tag) = reader.byte() {
        let offset = reader.pos - 1;
        let (opcode, lhs_literal, rhs_literal) = parse_tag(offset, tag)?;

        let expected = opcode.arity() * WORD_SIZE;
        if reader.remaining() < expected {
            return Err(DecodeError::Truncated {
                offset,
                opcode: opcode.mnemonic(),
                expected,
                available: reader.remaining(),
            });
        }

        let instr = match opcode {
            Opcode::Set => Instruction::Set {
                dest: reader.index()?,
                value: reader.word().1,
            },
            Opcode::Add => reader.arith(ArithOp::Add, lhs_literal, rhs_literal)?,
            Opcode::Sub => reader.arith(ArithOp::Sub, lhs_literal, rhs_literal)?,
            Opcode::Mul => reader.arith(ArithOp::Mul, lhs_literal, rhs_literal)?,
            Opcode::Div => reader.arith(ArithOp::Div, lhs_literal, rhs_literal)?,
            Opcode::Mod => reader.arith(ArithOp::Mod, lhs_literal, rhs_literal)?,
            Opcode::Cmp => Instruction::Cmp {
                lhs: reader.operand(lhs_literal)?,
                rhs: reader.operand(rhs_literal)?,
                op: reader.relation()?,
            },
            Opcode::JumpIfFalse => Instruction::JumpIfFalse {
                target: reader.index()?,
            },
            Opcode::Jump => Instruction::Jump {
                target: reader.index()?,
            },
            Opcode::Return => Instruction::Return {
                src: reader.index()?,
            },
        };
        instructions.push(instr);
    }

    Ok(Program { instructions })
}
