//! Instruction encoding shared by the machine, the assembler and the
//! disassembler.
//!
//! An instruction word keeps its opcode class in the top four bits and a
//! twelve bit payload (immediate, address or sub-opcode) in the rest.

use core::mem::transmute;
use variant_count::VariantCount;

use crate::{MachineError, ProgramWord};

pub const OPCODE_SHIFT: u32 = 12;
pub const PAYLOAD_MASK: ProgramWord = 0x0fff;

/// Set on a conditional branch that is edge triggered (`when`) instead of
/// level triggered (`if`).
pub const WHEN_FLAG: ProgramWord = 0x0100;
/// Set on a `when` branch whose condition held the last time it ran.
pub const LATCH_FLAG: ProgramWord = 0x0200;
/// Low bits of a conditional branch naming its comparison.
pub const CONDITION_MASK: ProgramWord = 0x00ff;

/// Event run by `reset`.
pub const EVENT_ID_INIT: ProgramWord = 0xffff;

pub const SMALL_IMMEDIATE_MIN: i32 = -0x800;
pub const SMALL_IMMEDIATE_MAX: i32 = 0x7ff;
pub const PAYLOAD_LIMIT: i32 = 0x1000;

#[repr(u16)] // Must match ProgramWord
#[derive(VariantCount, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpClass {
    Stop,
    SmallImmediate,
    LargeImmediate,
    Load,
    Store,
    LoadIndirect,
    StoreIndirect,
    UnaryOp,
    BinaryOp,
    Jump,
    ConditionalBranch,
    Emit,
    NativeCall,
    SubCall,
    SubRet,
    Reserved,
}

impl OpClass {
    /// Opcode class of an instruction word.
    pub fn of(word: ProgramWord) -> Self {
        let class = word.wrapping_shr(OPCODE_SHIFT);
        const { assert!(OpClass::VARIANT_COUNT == 16) };
        // SAFTY: a u16 shifted right by twelve is below sixteen and every
        // value below sixteen is a variant.
        unsafe { transmute::<ProgramWord, Self>(class) }
    }

    /// Number of words taken by an instruction of this class.
    pub fn length(self) -> usize {
        match self {
            OpClass::LargeImmediate
            | OpClass::LoadIndirect
            | OpClass::StoreIndirect
            | OpClass::ConditionalBranch => 2,
            OpClass::Emit => 3,
            _ => 1,
        }
    }

    pub fn base(self) -> ProgramWord {
        (self as ProgramWord).wrapping_shl(OPCODE_SHIFT)
    }
}

/// Length in words of the instruction starting with `word`.
pub fn op_length(word: ProgramWord) -> usize {
    OpClass::of(word).length()
}

pub fn payload(word: ProgramWord) -> ProgramWord {
    word & PAYLOAD_MASK
}

pub fn to_signed12(payload: ProgramWord) -> i16 {
    let payload = payload & PAYLOAD_MASK;
    if payload >= 0x800 {
        (payload | !PAYLOAD_MASK) as i16
    } else {
        payload as i16
    }
}

pub fn to_signed16(word: ProgramWord) -> i16 {
    word as i16
}

#[repr(u16)] // Must match ProgramWord
#[derive(VariantCount, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UnaryOp {
    Neg,
    Abs,
    BitNot,
}

impl UnaryOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Abs => "abs",
            UnaryOp::BitNot => "bitnot",
        }
    }
}

impl TryFrom<ProgramWord> for UnaryOp {
    type Error = MachineError;
    fn try_from(word: ProgramWord) -> Result<Self, Self::Error> {
        let code = payload(word);
        if code >= UnaryOp::VARIANT_COUNT as u16 {
            return Err(MachineError::UnknownArithmeticOp(word));
        }

        // SAFTY: We just check that the value is in range.
        let op = unsafe { transmute::<ProgramWord, Self>(code) };
        Ok(op)
    }
}

#[repr(u16)] // Must match ProgramWord
#[derive(VariantCount, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BinaryOp {
    ShiftLeft,
    ShiftRight,
    Add,
    Sub,
    Mult,
    Div,
    Mod,
    BitOr,
    BitXor,
    BitAnd,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
    Or,
    And,
}

impl BinaryOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinaryOp::ShiftLeft => "sl",
            BinaryOp::ShiftRight => "asr",
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mult => "mult",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
            BinaryOp::BitOr => "bitor",
            BinaryOp::BitXor => "bitxor",
            BinaryOp::BitAnd => "bitand",
            BinaryOp::Equal => "eq",
            BinaryOp::NotEqual => "ne",
            BinaryOp::GreaterThan => "gt",
            BinaryOp::GreaterEqual => "ge",
            BinaryOp::LessThan => "lt",
            BinaryOp::LessEqual => "le",
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
        }
    }

    /// Decodes the operation selected by the low byte of a binary op or
    /// conditional branch word.
    pub fn from_condition(word: ProgramWord) -> Result<Self, MachineError> {
        let code = word & CONDITION_MASK;
        if code >= BinaryOp::VARIANT_COUNT as u16 {
            return Err(MachineError::UnknownArithmeticOp(word));
        }

        // SAFTY: We just check that the value is in range.
        let op = unsafe { transmute::<ProgramWord, Self>(code) };
        Ok(op)
    }
}

impl TryFrom<ProgramWord> for BinaryOp {
    type Error = MachineError;
    fn try_from(word: ProgramWord) -> Result<Self, Self::Error> {
        if payload(word) > CONDITION_MASK {
            return Err(MachineError::UnknownArithmeticOp(word));
        }
        Self::from_condition(word)
    }
}

impl From<UnaryOp> for ProgramWord {
    fn from(op: UnaryOp) -> ProgramWord {
        OpClass::UnaryOp.base() | op as ProgramWord
    }
}

impl From<BinaryOp> for ProgramWord {
    fn from(op: BinaryOp) -> ProgramWord {
        OpClass::BinaryOp.base() | op as ProgramWord
    }
}
