//! Two pass assembler for Aseba bytecode.
//!
//! Each line is blank, a comment, a label (`name:`) or an optionally
//! labelled instruction: `[name:] mnemonic [operands] [; comment]`.
//! Operands are separated by commas or white space. An operand is a
//! decimal or `0x` hex literal or a symbol, either optionally written as
//! `key=value` with the key ignored.
//!
//! The first pass only sizes instructions and records label addresses;
//! every symbol reads as zero. The second pass encodes with the full
//! table. `equ` only assigns in the second pass, so a line that uses an
//! `equ` constant before its definition sees the address of the `equ`
//! line instead of its value.

use heapless::Vec;
use thiserror_no_std::Error;

use crate::isa::{
    BinaryOp, OpClass, UnaryOp, LATCH_FLAG, PAYLOAD_LIMIT, PAYLOAD_MASK, SMALL_IMMEDIATE_MAX,
    SMALL_IMMEDIATE_MIN, WHEN_FLAG,
};
use crate::symbols::{SymbolError, SymbolTable, Symbols};
use crate::ProgramWord;

/// Most operands on one line, which also bounds the words a `dc` emits.
pub const MAX_OPERANDS: usize = 32;

const WORD_MIN: i32 = i16::MIN as i32;
const WORD_MAX: i32 = u16::MAX as i32;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AssemblerError {
    #[error("{0}")]
    Kind(AssemblerErrorKind),
    #[error("{kind} (line {line})")]
    WithLine { line: u32, kind: AssemblerErrorKind },
}

impl AssemblerError {
    fn with_line(self, line: u32) -> Self {
        match self {
            AssemblerError::WithLine { .. } => self,
            AssemblerError::Kind(kind) => AssemblerError::WithLine { line, kind },
        }
    }

    pub fn line_number(&self) -> Option<u32> {
        match self {
            Self::Kind(_) => None,
            Self::WithLine { line, .. } => Some(*line),
        }
    }

    pub fn error_kind(&self) -> &AssemblerErrorKind {
        match self {
            Self::Kind(kind) => kind,
            Self::WithLine { kind, .. } => kind,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AssemblerErrorKind {
    #[error("syntax error")]
    SyntaxError,
    #[error("unknown instruction")]
    UnknownInstruction,
    #[error("wrong number of arguments")]
    WrongArgumentCount,
    #[error("small integer overflow")]
    SmallIntegerOverflow,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("data address out of range")]
    DataAddressOutOfRange,
    #[error("native id out of range")]
    NativeIdOutOfRange,
    #[error("subroutine address out of range")]
    SubroutineAddressOutOfRange,
    #[error("event id out of range")]
    EventIdOutOfRange,
    #[error("jump target out of range")]
    JumpOutOfRange,
    #[error("unknown condition")]
    UnknownCondition,
    #[error("unknown symbol")]
    UnknownSymbol,
    #[error("instruction not implemented in the vm")]
    NotImplemented,
    #[error("name too long")]
    NameTooLong,
    #[error("too many symbols")]
    TooManySymbols,
    #[error("too many operands")]
    TooManyOperands,
    #[error("bytecode too large")]
    BytecodeTooLarge,
    #[error("missing label")]
    MissingLabel,
    #[error("too many lines")]
    LineNumberOverflow,
}

impl From<AssemblerErrorKind> for AssemblerError {
    fn from(kind: AssemblerErrorKind) -> Self {
        AssemblerError::Kind(kind)
    }
}

impl From<SymbolError> for AssemblerErrorKind {
    fn from(err: SymbolError) -> Self {
        match err {
            SymbolError::NameTooLong => AssemblerErrorKind::NameTooLong,
            SymbolError::TableFull => AssemblerErrorKind::TooManySymbols,
        }
    }
}

impl From<SymbolError> for AssemblerError {
    fn from(err: SymbolError) -> Self {
        AssemblerError::Kind(err.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand<'s> {
    Number(i32),
    Symbol(&'s str),
}

type Words = Vec<ProgramWord, MAX_OPERANDS>;

/// What an encoder sees of the line being assembled.
struct Line<'s, 'o> {
    pc: usize,
    operands: &'o [Operand<'s>],
    label: Option<&'s str>,
    symbols: Option<&'o mut dyn Symbols>,
}

impl Line<'_, '_> {
    /// Second pass, where symbols resolve for real.
    fn resolving(&self) -> bool {
        self.symbols.is_some()
    }

    fn value(&self, index: usize) -> Result<i32, AssemblerErrorKind> {
        match self.operands.get(index) {
            None => Err(AssemblerErrorKind::WrongArgumentCount),
            Some(Operand::Number(value)) => Ok(*value),
            Some(Operand::Symbol(name)) => match &self.symbols {
                None => Ok(0),
                Some(symbols) => symbols.lookup(name).ok_or(AssemblerErrorKind::UnknownSymbol),
            },
        }
    }

    fn checked(
        &self,
        index: usize,
        min: i32,
        max: i32,
        err: AssemblerErrorKind,
    ) -> Result<i32, AssemblerErrorKind> {
        let value = self.value(index)?;
        if value < min || value > max {
            return Err(err);
        }
        Ok(value)
    }

    fn payload(&self, index: usize, err: AssemblerErrorKind) -> Result<ProgramWord, AssemblerErrorKind> {
        let value = self.checked(index, 0, PAYLOAD_LIMIT.wrapping_sub(1), err)?;
        Ok(word(value) & PAYLOAD_MASK)
    }

    fn full_word(&self, index: usize, err: AssemblerErrorKind) -> Result<ProgramWord, AssemblerErrorKind> {
        Ok(word(self.checked(index, WORD_MIN, WORD_MAX, err)?))
    }

    /// Distance from this instruction to the target named by an operand.
    fn relative(&self, index: usize) -> Result<i32, AssemblerErrorKind> {
        let target = self.value(index)?;
        let pc = i32::try_from(self.pc).map_err(|_| AssemblerErrorKind::BytecodeTooLarge)?;
        target
            .checked_sub(pc)
            .ok_or(AssemblerErrorKind::JumpOutOfRange)
    }
}

// Truncates to the low 16 bits, so negative values come out in two's
// complement.
fn word(value: i32) -> ProgramWord {
    value as ProgramWord
}

fn words(slice: &[ProgramWord]) -> Result<Words, AssemblerErrorKind> {
    Vec::from_slice(slice).map_err(|_| AssemblerErrorKind::TooManyOperands)
}

type Encoder = fn(&mut Line<'_, '_>) -> Result<Words, AssemblerErrorKind>;

#[derive(Debug, Clone, Copy)]
enum Arity {
    Exactly(usize),
    Any,
}

#[derive(Clone, Copy)]
enum Encoding {
    Plain(OpClass),
    Unary(UnaryOp),
    Binary(BinaryOp),
    Encoder { arity: Arity, encode: Encoder },
}

static MNEMONICS: &[(&str, Encoding)] = &[
    ("dc", Encoding::Encoder { arity: Arity::Any, encode: encode_dc }),
    ("equ", Encoding::Encoder { arity: Arity::Exactly(1), encode: encode_equ }),
    ("stop", Encoding::Plain(OpClass::Stop)),
    ("push.s", Encoding::Encoder { arity: Arity::Exactly(1), encode: encode_push_small }),
    ("push", Encoding::Encoder { arity: Arity::Exactly(1), encode: encode_push }),
    ("load", Encoding::Encoder { arity: Arity::Exactly(1), encode: encode_load }),
    ("store", Encoding::Encoder { arity: Arity::Exactly(1), encode: encode_store }),
    ("load.ind", Encoding::Encoder { arity: Arity::Exactly(2), encode: encode_load_indirect }),
    ("store.ind", Encoding::Encoder { arity: Arity::Exactly(2), encode: encode_store_indirect }),
    ("neg", Encoding::Unary(UnaryOp::Neg)),
    ("abs", Encoding::Unary(UnaryOp::Abs)),
    ("bitnot", Encoding::Unary(UnaryOp::BitNot)),
    ("not", Encoding::Encoder { arity: Arity::Exactly(0), encode: encode_not }),
    ("sl", Encoding::Binary(BinaryOp::ShiftLeft)),
    ("asr", Encoding::Binary(BinaryOp::ShiftRight)),
    ("add", Encoding::Binary(BinaryOp::Add)),
    ("sub", Encoding::Binary(BinaryOp::Sub)),
    ("mult", Encoding::Binary(BinaryOp::Mult)),
    ("div", Encoding::Binary(BinaryOp::Div)),
    ("mod", Encoding::Binary(BinaryOp::Mod)),
    ("bitor", Encoding::Binary(BinaryOp::BitOr)),
    ("bitxor", Encoding::Binary(BinaryOp::BitXor)),
    ("bitand", Encoding::Binary(BinaryOp::BitAnd)),
    ("eq", Encoding::Binary(BinaryOp::Equal)),
    ("ne", Encoding::Binary(BinaryOp::NotEqual)),
    ("gt", Encoding::Binary(BinaryOp::GreaterThan)),
    ("ge", Encoding::Binary(BinaryOp::GreaterEqual)),
    ("lt", Encoding::Binary(BinaryOp::LessThan)),
    ("le", Encoding::Binary(BinaryOp::LessEqual)),
    ("or", Encoding::Binary(BinaryOp::Or)),
    ("and", Encoding::Binary(BinaryOp::And)),
    ("jump", Encoding::Encoder { arity: Arity::Exactly(1), encode: encode_jump }),
    ("jump.if.not", Encoding::Encoder { arity: Arity::Exactly(2), encode: encode_jump_if_not }),
    ("do.jump.when.not", Encoding::Encoder { arity: Arity::Exactly(2), encode: encode_do_jump_when_not }),
    ("dont.jump.when.not", Encoding::Encoder { arity: Arity::Exactly(2), encode: encode_dont_jump_when_not }),
    ("emit", Encoding::Encoder { arity: Arity::Exactly(3), encode: encode_emit }),
    ("callnat", Encoding::Encoder { arity: Arity::Exactly(1), encode: encode_callnat }),
    ("callsub", Encoding::Encoder { arity: Arity::Exactly(1), encode: encode_callsub }),
    ("ret", Encoding::Plain(OpClass::SubRet)),
];

fn lookup(mnemonic: &str) -> Option<Encoding> {
    MNEMONICS
        .iter()
        .find(|(name, _)| *name == mnemonic)
        .map(|(_, encoding)| *encoding)
}

/// The comparison a conditional branch names by its mnemonic.
fn condition(operand: Option<&Operand<'_>>) -> Result<BinaryOp, AssemblerErrorKind> {
    let Some(Operand::Symbol(name)) = operand else {
        return Err(AssemblerErrorKind::UnknownCondition);
    };
    match lookup(name) {
        Some(Encoding::Binary(op)) => Ok(op),
        _ => Err(AssemblerErrorKind::UnknownCondition),
    }
}

fn encode_dc(line: &mut Line<'_, '_>) -> Result<Words, AssemblerErrorKind> {
    let mut out = Words::new();
    for index in 0..line.operands.len() {
        out.push(line.full_word(index, AssemblerErrorKind::IntegerOverflow)?)
            .map_err(|_| AssemblerErrorKind::TooManyOperands)?;
    }
    Ok(out)
}

fn encode_equ(line: &mut Line<'_, '_>) -> Result<Words, AssemblerErrorKind> {
    let label = line.label.ok_or(AssemblerErrorKind::MissingLabel)?;
    let value = line.value(0)?;
    if let Some(symbols) = line.symbols.as_mut() {
        symbols.define(label, value)?;
    }
    Ok(Words::new())
}

fn encode_push_small(line: &mut Line<'_, '_>) -> Result<Words, AssemblerErrorKind> {
    let value = line.checked(
        0,
        SMALL_IMMEDIATE_MIN,
        SMALL_IMMEDIATE_MAX,
        AssemblerErrorKind::SmallIntegerOverflow,
    )?;
    words(&[OpClass::SmallImmediate.base() | (word(value) & PAYLOAD_MASK)])
}

fn encode_push(line: &mut Line<'_, '_>) -> Result<Words, AssemblerErrorKind> {
    let value = line.full_word(0, AssemblerErrorKind::IntegerOverflow)?;
    words(&[OpClass::LargeImmediate.base(), value])
}

fn encode_load(line: &mut Line<'_, '_>) -> Result<Words, AssemblerErrorKind> {
    let address = line.payload(0, AssemblerErrorKind::DataAddressOutOfRange)?;
    words(&[OpClass::Load.base() | address])
}

fn encode_store(line: &mut Line<'_, '_>) -> Result<Words, AssemblerErrorKind> {
    let address = line.payload(0, AssemblerErrorKind::DataAddressOutOfRange)?;
    words(&[OpClass::Store.base() | address])
}

fn encode_load_indirect(line: &mut Line<'_, '_>) -> Result<Words, AssemblerErrorKind> {
    let address = line.payload(0, AssemblerErrorKind::DataAddressOutOfRange)?;
    let size = line.full_word(1, AssemblerErrorKind::IntegerOverflow)?;
    words(&[OpClass::LoadIndirect.base() | address, size])
}

fn encode_store_indirect(line: &mut Line<'_, '_>) -> Result<Words, AssemblerErrorKind> {
    let address = line.payload(0, AssemblerErrorKind::DataAddressOutOfRange)?;
    let size = line.full_word(1, AssemblerErrorKind::IntegerOverflow)?;
    words(&[OpClass::StoreIndirect.base() | address, size])
}

fn encode_not(_: &mut Line<'_, '_>) -> Result<Words, AssemblerErrorKind> {
    Err(AssemblerErrorKind::NotImplemented)
}

fn encode_jump(line: &mut Line<'_, '_>) -> Result<Words, AssemblerErrorKind> {
    let offset = line.relative(0)?;
    // Targets are all zero in the first pass.
    if line.resolving() && !(SMALL_IMMEDIATE_MIN..=SMALL_IMMEDIATE_MAX).contains(&offset) {
        return Err(AssemblerErrorKind::JumpOutOfRange);
    }
    words(&[OpClass::Jump.base() | (word(offset) & PAYLOAD_MASK)])
}

fn encode_branch(line: &Line<'_, '_>, flags: ProgramWord) -> Result<Words, AssemblerErrorKind> {
    let op = condition(line.operands.first())?;
    let offset = line.relative(1)?;
    if line.resolving() && i16::try_from(offset).is_err() {
        return Err(AssemblerErrorKind::JumpOutOfRange);
    }
    words(&[
        OpClass::ConditionalBranch.base() | flags | op as ProgramWord,
        word(offset),
    ])
}

fn encode_jump_if_not(line: &mut Line<'_, '_>) -> Result<Words, AssemblerErrorKind> {
    encode_branch(line, 0)
}

fn encode_do_jump_when_not(line: &mut Line<'_, '_>) -> Result<Words, AssemblerErrorKind> {
    encode_branch(line, WHEN_FLAG)
}

fn encode_dont_jump_when_not(line: &mut Line<'_, '_>) -> Result<Words, AssemblerErrorKind> {
    encode_branch(line, WHEN_FLAG | LATCH_FLAG)
}

fn encode_emit(line: &mut Line<'_, '_>) -> Result<Words, AssemblerErrorKind> {
    let id = line.payload(0, AssemblerErrorKind::EventIdOutOfRange)?;
    let data = line.full_word(1, AssemblerErrorKind::DataAddressOutOfRange)?;
    let count = line.full_word(2, AssemblerErrorKind::IntegerOverflow)?;
    words(&[OpClass::Emit.base() | id, data, count])
}

fn encode_callnat(line: &mut Line<'_, '_>) -> Result<Words, AssemblerErrorKind> {
    let index = line.payload(0, AssemblerErrorKind::NativeIdOutOfRange)?;
    words(&[OpClass::NativeCall.base() | index])
}

fn encode_callsub(line: &mut Line<'_, '_>) -> Result<Words, AssemblerErrorKind> {
    let address = line.payload(0, AssemblerErrorKind::SubroutineAddressOutOfRange)?;
    words(&[OpClass::SubCall.base() | address])
}

pub struct Assembler<'t, const CAP: usize> {
    symbols: &'t mut SymbolTable<CAP>,
}

impl<'t, const CAP: usize> Assembler<'t, CAP> {
    /// `symbols` should already hold the names of the target device. Labels
    /// and constants are added to it.
    pub fn new(symbols: &'t mut SymbolTable<CAP>) -> Self {
        Self { symbols }
    }

    pub fn symbols(&self) -> &SymbolTable<CAP> {
        self.symbols
    }

    /// Assembles `source` into at most `N` words. Every error carries the
    /// line it was found on.
    pub fn assemble<const N: usize>(
        &mut self,
        source: &str,
    ) -> Result<Vec<ProgramWord, N>, AssemblerError> {
        let sized: Vec<ProgramWord, N> = self.pass(source, false)?;
        debug!("first pass: {} words", sized.len());
        let bytecode: Vec<ProgramWord, N> = self.pass(source, true)?;
        info!("assembled {} words", bytecode.len());
        Ok(bytecode)
    }

    fn pass<const N: usize>(
        &mut self,
        source: &str,
        resolve: bool,
    ) -> Result<Vec<ProgramWord, N>, AssemblerError> {
        let mut bytecode = Vec::new();
        let mut line_number: u32 = 0;
        for line in source.lines() {
            line_number = line_number
                .checked_add(1)
                .ok_or(AssemblerError::Kind(AssemblerErrorKind::LineNumberOverflow))?;
            self.add_line(line, resolve, &mut bytecode)
                .map_err(|err| err.with_line(line_number))?;
        }
        Ok(bytecode)
    }

    fn add_line<const N: usize>(
        &mut self,
        line: &str,
        resolve: bool,
        bytecode: &mut Vec<ProgramWord, N>,
    ) -> Result<(), AssemblerError> {
        let line = strip_comment(line).trim();
        if line.is_empty() {
            return Ok(());
        }

        let (label, rest) = split_label(line)?;
        if let Some(label) = label {
            let address = i32::try_from(bytecode.len())
                .map_err(|_| AssemblerErrorKind::BytecodeTooLarge)?;
            self.symbols.insert(label, address)?;
        }
        if rest.is_empty() {
            return Ok(());
        }

        let (mnemonic, args) = split_mnemonic(rest)?;
        let operands = parse_operands(args)?;
        let encoding = lookup(mnemonic).ok_or(AssemblerErrorKind::UnknownInstruction)?;
        let arity = match encoding {
            Encoding::Encoder { arity, .. } => arity,
            _ => Arity::Exactly(0),
        };
        if let Arity::Exactly(count) = arity {
            if operands.len() != count {
                return Err(AssemblerErrorKind::WrongArgumentCount.into());
            }
        }

        let out = match encoding {
            Encoding::Plain(class) => words(&[class.base()])?,
            Encoding::Unary(op) => words(&[ProgramWord::from(op)])?,
            Encoding::Binary(op) => words(&[ProgramWord::from(op)])?,
            Encoding::Encoder { encode, .. } => {
                let symbols: Option<&mut dyn Symbols> = if resolve {
                    Some(&mut *self.symbols)
                } else {
                    None
                };
                let mut context = Line {
                    pc: bytecode.len(),
                    operands: &operands,
                    label,
                    symbols,
                };
                encode(&mut context)?
            }
        };
        bytecode
            .extend_from_slice(&out)
            .map_err(|_| AssemblerErrorKind::BytecodeTooLarge)?;
        Ok(())
    }
}

fn strip_comment(line: &str) -> &str {
    match line.split(';').next() {
        Some(part) => part,
        None => line,
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn split_label(line: &str) -> Result<(Option<&str>, &str), AssemblerErrorKind> {
    let Some((head, rest)) = line.split_once(':') else {
        return Ok((None, line));
    };
    if head.is_empty() || !head.chars().all(is_word_char) {
        return Err(AssemblerErrorKind::SyntaxError);
    }
    Ok((Some(head), rest.trim()))
}

fn split_mnemonic(text: &str) -> Result<(&str, &str), AssemblerErrorKind> {
    let (mnemonic, args) = match text.split_once(char::is_whitespace) {
        Some((mnemonic, args)) => (mnemonic, args),
        None => (text, ""),
    };
    if !mnemonic.chars().all(|c| c.is_ascii_alphanumeric() || c == '.') {
        return Err(AssemblerErrorKind::SyntaxError);
    }
    let allowed = |c: char| is_word_char(c) || c.is_whitespace() || matches!(c, '-' | '.' | ',' | '+' | '=');
    if !args.chars().all(allowed) {
        return Err(AssemblerErrorKind::SyntaxError);
    }
    Ok((mnemonic, args))
}

fn parse_operands(args: &str) -> Result<Vec<Operand<'_>, MAX_OPERANDS>, AssemblerErrorKind> {
    let mut operands = Vec::new();
    let tokens = args
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty());
    for token in tokens {
        operands
            .push(parse_operand(token))
            .map_err(|_| AssemblerErrorKind::TooManyOperands)?;
    }
    Ok(operands)
}

fn parse_operand(token: &str) -> Operand<'_> {
    let token = match token.split_once('=') {
        Some((key, value)) if !key.is_empty() && key.chars().all(|c| c.is_ascii_lowercase()) => value,
        _ => token,
    };
    match parse_number(token) {
        Some(value) => Operand::Number(value),
        None => Operand::Symbol(token),
    }
}

fn parse_number(token: &str) -> Option<i32> {
    let (negative, digits) = match token.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };
    let hex = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X"));
    let magnitude = if let Some(hex) = hex {
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        i32::from_str_radix(hex, 16).ok()?
    } else {
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        digits.parse::<i32>().ok()?
    };
    if negative {
        magnitude.checked_neg()
    } else {
        Some(magnitude)
    }
}
