//! Aseba protocol messages.
//!
//! On the wire a message is a six byte header (payload length in bytes,
//! source node id, message id; all little endian `u16`) followed by the
//! payload. Most payloads are sequences of little endian words.

use bincode::{Decode, Encode};
use heapless::Vec;
use thiserror_no_std::Error;

use crate::ProgramWord;

pub const HEADER_SIZE: usize = 6;
pub const WORD_SIZE: usize = 2;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageError {
    #[error("the message could not be encoded")]
    Encode,
    #[error("the message could not be decoded")]
    Decode,
    #[error("payload does not fit in the message")]
    PayloadTooLarge,
    #[error("output buffer too small for the message")]
    BufferTooSmall,
    #[error("{0:#06x} is not a known message id")]
    UnknownId(u16),
    #[error("payload has no word {0}")]
    MissingWord(usize),
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageId {
    Description = 0x9000,
    NamedVariableDescription = 0x9001,
    LocalEventDescription = 0x9002,
    NativeFunctionDescription = 0x9003,
    Disconnected = 0x9004,
    Variables = 0x9005,
    ArrayAccessOutOfBounds = 0x9006,
    DivisionByZero = 0x9007,
    EventExecutionKilled = 0x9008,
    ExecutionStateChanged = 0x900a,
    BreakpointSetResult = 0x900b,
    NodePresent = 0x900c,
    GetDescription = 0xa000,
    SetBytecode = 0xa001,
    Reset = 0xa002,
    Run = 0xa003,
    Pause = 0xa004,
    Step = 0xa005,
    Stop = 0xa006,
    GetExecutionState = 0xa007,
    BreakpointSet = 0xa008,
    BreakpointClear = 0xa009,
    BreakpointClearAll = 0xa00a,
    GetVariables = 0xa00b,
    SetVariables = 0xa00c,
    GetNodeDescription = 0xa010,
    ListNodes = 0xa011,
}

impl From<MessageId> for u16 {
    fn from(id: MessageId) -> u16 {
        id as u16
    }
}

impl TryFrom<u16> for MessageId {
    type Error = MessageError;
    fn try_from(value: u16) -> Result<Self, Self::Error> {
        let id = match value {
            0x9000 => MessageId::Description,
            0x9001 => MessageId::NamedVariableDescription,
            0x9002 => MessageId::LocalEventDescription,
            0x9003 => MessageId::NativeFunctionDescription,
            0x9004 => MessageId::Disconnected,
            0x9005 => MessageId::Variables,
            0x9006 => MessageId::ArrayAccessOutOfBounds,
            0x9007 => MessageId::DivisionByZero,
            0x9008 => MessageId::EventExecutionKilled,
            0x900a => MessageId::ExecutionStateChanged,
            0x900b => MessageId::BreakpointSetResult,
            0x900c => MessageId::NodePresent,
            0xa000 => MessageId::GetDescription,
            0xa001 => MessageId::SetBytecode,
            0xa002 => MessageId::Reset,
            0xa003 => MessageId::Run,
            0xa004 => MessageId::Pause,
            0xa005 => MessageId::Step,
            0xa006 => MessageId::Stop,
            0xa007 => MessageId::GetExecutionState,
            0xa008 => MessageId::BreakpointSet,
            0xa009 => MessageId::BreakpointClear,
            0xa00a => MessageId::BreakpointClearAll,
            0xa00b => MessageId::GetVariables,
            0xa00c => MessageId::SetVariables,
            0xa010 => MessageId::GetNodeDescription,
            0xa011 => MessageId::ListNodes,
            _ => return Err(MessageError::UnknownId(value)),
        };
        Ok(id)
    }
}

impl MessageId {
    /// Messages sent by nodes, as opposed to commands sent to them.
    pub fn is_from_node(self) -> bool {
        (self as u16) < 0xa000
    }
}

#[derive(Encode, Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub payload_len: u16,
    pub source: u16,
    pub id: u16,
}

fn config() -> impl bincode::config::Config {
    bincode::config::legacy()
}

/// A message with at most `CAP` payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message<const CAP: usize> {
    id: u16,
    source: u16,
    payload: Vec<u8, CAP>,
}

impl<const CAP: usize> Message<CAP> {
    pub fn new(id: MessageId, source: u16) -> Self {
        Self {
            id: id.into(),
            source,
            payload: Vec::new(),
        }
    }

    pub fn with_words(id: MessageId, source: u16, words: &[ProgramWord]) -> Result<Self, MessageError> {
        let mut message = Self::new(id, source);
        for word in words {
            message.push_word(*word)?;
        }
        Ok(message)
    }

    /// Raw id, which may not be a [`MessageId`].
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn message_id(&self) -> Result<MessageId, MessageError> {
        MessageId::try_from(self.id)
    }

    pub fn source(&self) -> u16 {
        self.source
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn push_word(&mut self, word: ProgramWord) -> Result<(), MessageError> {
        let mut bytes = [0u8; WORD_SIZE];
        bincode::encode_into_slice(word, &mut bytes, config()).map_err(|_| MessageError::Encode)?;
        self.payload
            .extend_from_slice(&bytes)
            .map_err(|_| MessageError::PayloadTooLarge)
    }

    pub fn word_count(&self) -> usize {
        self.payload.len() / WORD_SIZE
    }

    /// The payload word at `index`.
    pub fn word(&self, index: usize) -> Result<ProgramWord, MessageError> {
        let start = index
            .checked_mul(WORD_SIZE)
            .ok_or(MessageError::MissingWord(index))?;
        let bytes = self
            .payload
            .get(start..)
            .filter(|bytes| bytes.len() >= WORD_SIZE)
            .ok_or(MessageError::MissingWord(index))?;
        let (word, _): (ProgramWord, usize) =
            bincode::decode_from_slice(bytes, config()).map_err(|_| MessageError::Decode)?;
        Ok(word)
    }

    /// Payload words from `start` on.
    pub fn words_from(&self, start: usize) -> impl Iterator<Item = ProgramWord> + '_ {
        (start..self.word_count()).filter_map(|index| self.word(index).ok())
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE.saturating_add(self.payload.len())
    }

    /// Writes the message to the front of `out` and returns the number of
    /// bytes written.
    pub fn serialize_into(&self, out: &mut [u8]) -> Result<usize, MessageError> {
        let len = self.encoded_len();
        if out.len() < len {
            return Err(MessageError::BufferTooSmall);
        }
        let header = MessageHeader {
            payload_len: u16::try_from(self.payload.len()).map_err(|_| MessageError::PayloadTooLarge)?,
            source: self.source,
            id: self.id,
        };
        let written =
            bincode::encode_into_slice(header, out, config()).map_err(|_| MessageError::Encode)?;
        out.get_mut(written..len)
            .ok_or(MessageError::BufferTooSmall)?
            .copy_from_slice(&self.payload);
        Ok(len)
    }

    /// Reads one message from the front of `bytes`. Returns `None` until
    /// `bytes` holds a complete message, otherwise the message and the
    /// number of bytes it took.
    pub fn deserialize(bytes: &[u8]) -> Result<Option<(Self, usize)>, MessageError> {
        if bytes.len() < HEADER_SIZE {
            return Ok(None);
        }
        let (header, read): (MessageHeader, usize) =
            bincode::decode_from_slice(bytes, config()).map_err(|_| MessageError::Decode)?;
        let end = read
            .checked_add(usize::from(header.payload_len))
            .ok_or(MessageError::Decode)?;
        let Some(payload) = bytes.get(read..end) else {
            return Ok(None);
        };
        let payload = Vec::from_slice(payload).map_err(|_| MessageError::PayloadTooLarge)?;
        let message = Self {
            id: header.id,
            source: header.source,
            payload,
        };
        Ok(Some((message, end)))
    }
}
