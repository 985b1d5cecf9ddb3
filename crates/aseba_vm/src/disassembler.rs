//! Bytecode listings.
//!
//! In assembler form the listing reassembles to the same words: the event
//! table comes out as `dc` lines, jump and branch targets as absolute
//! addresses and event entry points get an `onevent_<id>:` label.
//! Otherwise each line also shows its address and raw words.

use core::fmt::{self, Write};

use heapless::String;
use thiserror_no_std::Error;

use crate::isa::{self, BinaryOp, OpClass, UnaryOp, LATCH_FLAG, WHEN_FLAG};
use crate::ProgramWord;

const TEXT_CAP: usize = 64;
const OPCODE_COLUMN: usize = 9;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisassemblerError {
    #[error("bad event table")]
    BadEventTable,
    #[error("unknown instruction {0:#06x}")]
    UnknownInstruction(ProgramWord),
    #[error("instruction at {0} runs past the end of the bytecode")]
    Truncated(usize),
    #[error("listing could not be written")]
    Format,
}

impl From<fmt::Error> for DisassemblerError {
    fn from(_: fmt::Error) -> Self {
        DisassemblerError::Format
    }
}

pub fn disassemble<W: Write>(
    bytecode: &[ProgramWord],
    out: &mut W,
    for_assembler: bool,
) -> Result<(), DisassemblerError> {
    let Some(first) = bytecode.first() else {
        writeln!(out, "; empty")?;
        return Ok(());
    };
    let table_end = usize::from(*first);
    if table_end & 1 == 0 || table_end > bytecode.len() {
        return Err(DisassemblerError::BadEventTable);
    }
    let last_pair = table_end.checked_sub(2);
    let mut listing = Listing { out, for_assembler };

    let mut text: String<TEXT_CAP> = String::new();
    write!(text, "dc {}", table_end)?;
    listing.entry(0, slice(bytecode, 0, 1)?, &text, last_pair == Some(0))?;

    let mut address: usize = 1;
    while address < table_end {
        let pair = slice(bytecode, address, 2)?;
        let (Some(id), Some(entry)) = (pair.first(), pair.get(1)) else {
            return Err(DisassemblerError::BadEventTable);
        };
        text.clear();
        write!(text, "dc 0x{:x}, {}", id, entry)?;
        listing.entry(address, pair, &text, last_pair == Some(address))?;
        address = address.checked_add(2).ok_or(DisassemblerError::BadEventTable)?;
    }

    let mut address = table_end;
    while address < bytecode.len() {
        let word = *bytecode.get(address).ok_or(DisassemblerError::Truncated(address))?;
        let class = OpClass::of(word);
        let words = slice(bytecode, address, class.length())?;

        let event = (1..table_end)
            .step_by(2)
            .find(|index| {
                bytecode
                    .get(index.wrapping_add(1))
                    .is_some_and(|entry| usize::from(*entry) == address)
            })
            .and_then(|index| bytecode.get(index));
        if let Some(id) = event {
            writeln!(listing.out, "onevent_{:x}:", id)?;
        }

        text.clear();
        render(&mut text, address, words)?;
        let gap = matches!(class, OpClass::Stop | OpClass::SubRet);
        listing.entry(address, words, &text, gap)?;
        address = address
            .checked_add(words.len())
            .ok_or(DisassemblerError::Truncated(address))?;
    }
    Ok(())
}

struct Listing<'w, W: Write> {
    out: &'w mut W,
    for_assembler: bool,
}

impl<W: Write> Listing<'_, W> {
    fn entry(
        &mut self,
        address: usize,
        words: &[ProgramWord],
        text: &str,
        gap: bool,
    ) -> Result<(), DisassemblerError> {
        if self.for_assembler {
            write!(self.out, "    ")?;
        } else {
            write!(self.out, "{:>4}  ", address)?;
            let mut width: usize = 0;
            for (index, word) in words.iter().enumerate() {
                if index > 0 {
                    write!(self.out, " ")?;
                    width = width.saturating_add(1);
                }
                write!(self.out, "{:04x}", word)?;
                width = width.saturating_add(4);
            }
            let pad = OPCODE_COLUMN.saturating_sub(width);
            write!(self.out, "{:pad$}  ", "", pad = pad)?;
        }
        writeln!(self.out, "{}", text)?;
        if gap {
            writeln!(self.out)?;
        }
        Ok(())
    }
}

fn slice(bytecode: &[ProgramWord], address: usize, len: usize) -> Result<&[ProgramWord], DisassemblerError> {
    let end = address
        .checked_add(len)
        .ok_or(DisassemblerError::Truncated(address))?;
    bytecode
        .get(address..end)
        .ok_or(DisassemblerError::Truncated(address))
}

fn operand(words: &[ProgramWord], index: usize) -> ProgramWord {
    words.get(index).copied().unwrap_or(0)
}

fn target(address: usize, offset: i16) -> i64 {
    i64::try_from(address)
        .unwrap_or(i64::MAX)
        .saturating_add(i64::from(offset))
}

fn render<W: Write>(out: &mut W, address: usize, words: &[ProgramWord]) -> Result<(), DisassemblerError> {
    let word = operand(words, 0);
    let payload = isa::payload(word);
    let unknown = DisassemblerError::UnknownInstruction(word);
    match OpClass::of(word) {
        OpClass::Stop => write!(out, "stop")?,
        OpClass::SmallImmediate => write!(out, "push.s {}", isa::to_signed12(payload))?,
        OpClass::LargeImmediate => {
            write!(out, "push {}", isa::to_signed16(operand(words, 1)))?
        }
        OpClass::Load => write!(out, "load {}", payload)?,
        OpClass::Store => write!(out, "store {}", payload)?,
        OpClass::LoadIndirect => {
            write!(out, "load.ind {} size={}", payload, operand(words, 1))?
        }
        OpClass::StoreIndirect => {
            write!(out, "store.ind {} size={}", payload, operand(words, 1))?
        }
        OpClass::UnaryOp => {
            let op = UnaryOp::try_from(word).map_err(|_| unknown)?;
            write!(out, "{}", op.mnemonic())?
        }
        OpClass::BinaryOp => {
            let op = BinaryOp::try_from(word).map_err(|_| unknown)?;
            write!(out, "{}", op.mnemonic())?
        }
        OpClass::Jump => write!(out, "jump {}", target(address, isa::to_signed12(payload)))?,
        OpClass::ConditionalBranch => {
            let op = BinaryOp::from_condition(word).map_err(|_| unknown)?;
            let destination = target(address, isa::to_signed16(operand(words, 1)));
            let (prefix, kind) = match (word & WHEN_FLAG != 0, word & LATCH_FLAG != 0) {
                (false, _) => ("", "if"),
                (true, false) => ("do.", "when"),
                (true, true) => ("dont.", "when"),
            };
            write!(out, "{}jump.{}.not {} {}", prefix, kind, op.mnemonic(), destination)?
        }
        OpClass::Emit => write!(
            out,
            "emit id={} data={} count={}",
            payload,
            operand(words, 1),
            operand(words, 2)
        )?,
        OpClass::NativeCall => write!(out, "callnat {}", payload)?,
        OpClass::SubCall => write!(out, "callsub {}", payload)?,
        OpClass::SubRet => write!(out, "ret")?,
        OpClass::Reserved => return Err(unknown),
    }
    Ok(())
}
