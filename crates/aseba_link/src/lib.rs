#![no_std]

#![cfg_attr(
    not(test),
    deny(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing,
        clippy::string_slice,
        clippy::arithmetic_side_effects,
        clippy::panicking_unwrap,
        clippy::out_of_bounds_indexing,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
    )
)]
#![cfg_attr(not(test), warn(clippy::missing_panics_doc))]

//! The node side of the Aseba debug protocol.
//!
//! [`NodeLink`] frames messages out of a transport byte stream, applies the
//! commands addressed to its device and encodes the replies. Commands for
//! other nodes are ignored. Faults raised while running or stepping end
//! the event and reach the host through the device's own notifications,
//! so they do not fail the command.

#[macro_use]
mod fmt;

use aseba_vm::message::{Message, MessageError, MessageId};
use aseba_vm::{Device, Host, MachineError, ProgramWord, Value};
use heapless::Vec;
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    #[error("bad message: {0}")]
    Message(#[from] MessageError),
    #[error("command failed: {0}")]
    Machine(#[from] MachineError),
    #[error("message {0:#06x} is not handled by a node")]
    Unsupported(u16),
    #[error("input buffer is full")]
    InputFull,
    #[error("output buffer too small")]
    OutBufTooSmall,
}

/// Transport bytes waiting to form complete messages.
#[derive(Debug, Clone, Default)]
pub struct InputBuffer<const CAP: usize> {
    bytes: Vec<u8, CAP>,
}

impl<const CAP: usize> InputBuffer<CAP> {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Appends `bytes`, or nothing at all if they do not fit.
    pub fn extend(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.bytes
            .extend_from_slice(bytes)
            .map_err(|_| LinkError::InputFull)
    }

    /// Takes the first complete message off the front of the buffer. A
    /// frame that cannot be decoded is dropped together with everything
    /// after it.
    pub fn pop<const PAYLOAD: usize>(&mut self) -> Result<Option<Message<PAYLOAD>>, LinkError> {
        let decoded = match Message::<PAYLOAD>::deserialize(&self.bytes) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!("dropping {} undecodable bytes", self.bytes.len());
                self.bytes.clear();
                return Err(err.into());
            }
        };
        let Some((message, used)) = decoded else {
            return Ok(None);
        };
        if used > self.bytes.len() {
            self.bytes.clear();
            return Ok(Some(message));
        }
        let rest = self.bytes.len().saturating_sub(used);
        self.bytes.copy_within(used.., 0);
        self.bytes.truncate(rest);
        Ok(Some(message))
    }
}

/// Debug protocol endpoint for one device. Messages carry at most `CAP`
/// payload bytes and up to `INPUT` bytes of unframed input are buffered.
#[derive(Debug, Clone, Default)]
pub struct NodeLink<const CAP: usize, const INPUT: usize> {
    input: InputBuffer<INPUT>,
}

impl<const CAP: usize, const INPUT: usize> NodeLink<CAP, INPUT> {
    pub fn new() -> Self {
        Self {
            input: InputBuffer::new(),
        }
    }

    pub fn input(&self) -> &InputBuffer<INPUT> {
        &self.input
    }

    /// Feeds transport bytes and processes every message they complete.
    /// Replies are written one after the other to `out`; returns the
    /// number of bytes written. Messages a node does not answer, such as
    /// other nodes' notifications on a shared bus, are skipped, and so
    /// are commands that fail. Only running out of room in `out` stops
    /// the loop early.
    pub fn receive<
        H: Host,
        const BYTECODE_SIZE: usize,
        const STACK_SIZE: usize,
        const VARIABLE_SIZE: usize,
        const ARG_WORDS: usize,
    >(
        &mut self,
        device: &mut Device<'_, H, BYTECODE_SIZE, STACK_SIZE, VARIABLE_SIZE, ARG_WORDS>,
        bytes: &[u8],
        out: &mut [u8],
    ) -> Result<usize, LinkError> {
        self.input.extend(bytes)?;
        let mut written: usize = 0;
        while let Some(message) = self.input.pop::<CAP>()? {
            let rest = out.get_mut(written..).ok_or(LinkError::OutBufTooSmall)?;
            let len = match self.process_message(device, &message, rest) {
                Ok(len) => len,
                Err(LinkError::Unsupported(id) | LinkError::Message(MessageError::UnknownId(id))) => {
                    trace!("skipping message {}", id);
                    0
                }
                Err(
                    err @ (LinkError::OutBufTooSmall
                    | LinkError::Message(MessageError::BufferTooSmall)),
                ) => return Err(err),
                Err(err) => {
                    warn!("command from {} failed: {}", message.source(), err);
                    0
                }
            };
            written = written.checked_add(len).ok_or(LinkError::OutBufTooSmall)?;
        }
        Ok(written)
    }

    /// Applies one command to `device` and writes its reply, if any, to
    /// `out`. Returns the number of bytes written.
    pub fn process_message<
        H: Host,
        const BYTECODE_SIZE: usize,
        const STACK_SIZE: usize,
        const VARIABLE_SIZE: usize,
        const ARG_WORDS: usize,
    >(
        &self,
        device: &mut Device<'_, H, BYTECODE_SIZE, STACK_SIZE, VARIABLE_SIZE, ARG_WORDS>,
        message: &Message<CAP>,
        out: &mut [u8],
    ) -> Result<usize, LinkError> {
        let id = message.message_id()?;
        if id.is_from_node()
            || matches!(
                id,
                MessageId::GetDescription | MessageId::GetNodeDescription | MessageId::ListNodes
            )
        {
            return Err(LinkError::Unsupported(id.into()));
        }

        let target = message.word(0)?;
        if target != device.node_id() {
            trace!("message {} for node {} ignored", u16::from(id), target);
            return Ok(0);
        }
        debug!("message {} from {}", u16::from(id), message.source());

        match id {
            MessageId::SetBytecode => {
                let offset = usize::from(message.word(1)?);
                let mut words: Vec<ProgramWord, CAP> = Vec::new();
                for word in message.words_from(2) {
                    words.push(word).map_err(|_| MessageError::PayloadTooLarge)?;
                }
                device.set_bytecode(offset, &words)?;
                Ok(0)
            }
            MessageId::Reset => {
                device.reset();
                Self::execution_state(device, out)
            }
            MessageId::Run => {
                device.set_step_by_step(false);
                log_fault(device.run());
                Self::execution_state(device, out)
            }
            MessageId::Pause => {
                device.set_step_by_step(true);
                Self::execution_state(device, out)
            }
            MessageId::Step => {
                if device.is_event_active() {
                    log_fault(device.step());
                }
                Self::execution_state(device, out)
            }
            MessageId::Stop => {
                device.stop();
                Self::execution_state(device, out)
            }
            MessageId::GetExecutionState => Self::execution_state(device, out),
            MessageId::BreakpointSet => {
                let pc = message.word(1)?;
                let ok = device.set_breakpoint(usize::from(pc));
                let node = device.node_id();
                Self::reply(
                    MessageId::BreakpointSetResult,
                    node,
                    &[node, pc, ProgramWord::from(ok)],
                    out,
                )
            }
            MessageId::BreakpointClear => {
                device.clear_breakpoint(usize::from(message.word(1)?));
                Ok(0)
            }
            MessageId::BreakpointClearAll => {
                device.clear_breakpoints();
                Ok(0)
            }
            MessageId::GetVariables => {
                let offset = message.word(1)?;
                let count = message.word(2)?;
                let start = usize::from(offset);
                let end = start
                    .checked_add(usize::from(count))
                    .ok_or(MachineError::OutOfBoundsVariableAccess(start))?;
                let values = device
                    .variable_data()
                    .get(start..end)
                    .ok_or(MachineError::OutOfBoundsVariableAccess(end))?;
                let mut reply = Message::<CAP>::new(MessageId::Variables, device.node_id());
                reply.push_word(offset)?;
                for value in values {
                    reply.push_word(*value as ProgramWord)?;
                }
                Ok(reply.serialize_into(out)?)
            }
            MessageId::SetVariables => {
                let offset = usize::from(message.word(1)?);
                let mut values: Vec<Value, CAP> = Vec::new();
                for word in message.words_from(2) {
                    values
                        .push(word as Value)
                        .map_err(|_| MessageError::PayloadTooLarge)?;
                }
                device.set_variable_data(offset, &values)?;
                Ok(0)
            }
            _ => Err(LinkError::Unsupported(id.into())),
        }
    }

    fn execution_state<
        H: Host,
        const BYTECODE_SIZE: usize,
        const STACK_SIZE: usize,
        const VARIABLE_SIZE: usize,
        const ARG_WORDS: usize,
    >(
        device: &Device<'_, H, BYTECODE_SIZE, STACK_SIZE, VARIABLE_SIZE, ARG_WORDS>,
        out: &mut [u8],
    ) -> Result<usize, LinkError> {
        let pc = ProgramWord::try_from(device.pc()).unwrap_or(ProgramWord::MAX);
        Self::reply(
            MessageId::ExecutionStateChanged,
            device.node_id(),
            &[pc, device.flags()],
            out,
        )
    }

    fn reply(
        id: MessageId,
        source: u16,
        words: &[ProgramWord],
        out: &mut [u8],
    ) -> Result<usize, LinkError> {
        let message = Message::<CAP>::with_words(id, source, words)?;
        Ok(message.serialize_into(out)?)
    }
}

fn log_fault(result: Result<(), MachineError>) {
    if let Err(err) = result {
        warn!("event ended by fault: {}", err);
    }
}
