//! The Aseba virtual machine.
//!
//! A [`Device`] owns its bytecode, data stack and variable memory. Work is
//! driven from outside: [`Device::setup_event`] points the machine at an
//! event handler and [`Device::step`] or [`Device::run`] execute it.
//! Everything the machine does to the outside world goes through its
//! [`Host`].

use core::ops::Range;

use heapless::Vec;

use crate::isa::{self, BinaryOp, OpClass, UnaryOp, EVENT_ID_INIT, LATCH_FLAG, WHEN_FLAG};
use crate::message::{Message, MessageId};
use crate::native::{bind_arguments, NativeArgs, NativeFunction, MAX_NATIVE_PARAMS};
use crate::{pop, pop2, push, read_word, set_value, MachineError, ProgramWord, Value};

pub const DEFAULT_NODE_ID: ProgramWord = 54321;
pub const DEFAULT_BYTECODE_SIZE: usize = 500;
pub const DEFAULT_STACK_SIZE: usize = 200;
pub const DEFAULT_VARIABLE_SIZE: usize = 200;

/// Most named variables a device describes.
pub const MAX_VARIABLES: usize = 64;
/// Most breakpoints set at once.
pub const MAX_BREAKPOINTS: usize = 16;
/// Words of scratch space for the arguments of one native call, unless the
/// device type says otherwise.
pub const MAX_NATIVE_ARG_WORDS: usize = 1024;

/// Scratch space that fits any call of the standard natives on a device
/// with `variable_size` words: at most four parameters, each one a window
/// of variable memory, possibly the same one.
pub const fn native_arg_words(variable_size: usize) -> usize {
    variable_size.saturating_mul(4)
}

const NOTIFICATION_CAP: usize = 8;

pub type DefaultDevice<'a, H> = Device<
    'a,
    H,
    DEFAULT_BYTECODE_SIZE,
    DEFAULT_STACK_SIZE,
    DEFAULT_VARIABLE_SIZE,
    { native_arg_words(DEFAULT_VARIABLE_SIZE) },
>;

/// Bits of [`Device::flags`].
pub mod flags {
    pub const EVENT_ACTIVE: u16 = 1;
    pub const STEP_BY_STEP: u16 = 2;
    pub const EVENT_RUNNING: u16 = 4;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    pub node_id: ProgramWord,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            node_id: DEFAULT_NODE_ID,
        }
    }
}

/// A named variable as declared by a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableSpec<'a> {
    pub name: &'a str,
    pub length: usize,
}

impl<'a> VariableSpec<'a> {
    pub const fn new(name: &'a str, length: usize) -> Self {
        Self { name, length }
    }
}

/// Where a named variable lives in variable memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableDescriptor<'a> {
    pub name: &'a str,
    pub offset: usize,
    pub length: usize,
}

impl VariableDescriptor<'_> {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset.saturating_add(self.length)
    }
}

/// One element of a named variable about to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableChange<'v> {
    pub name: &'v str,
    pub index: usize,
    pub new_value: Value,
    pub old_value: Value,
    /// The whole variable before the write.
    pub old_array: &'v [Value],
}

/// The outside world of a device.
///
/// Every method has a default that does nothing, so hosts only implement
/// what they observe.
pub trait Host {
    /// The program emitted `event_id` with the given payload.
    fn emit(&mut self, _event_id: ProgramWord, _payload: &[Value]) {}

    /// A named variable is being written. Called before memory changes.
    fn variable_changed(&mut self, _change: &VariableChange<'_>) {}

    /// Called before the default implementation of a native function.
    /// Returning `true` skips the default implementation. Changes made to
    /// `args` are written back to variable memory either way.
    fn native_call(&mut self, _name: &str, _args: &mut NativeArgs<'_>) -> bool {
        false
    }

    /// A serialized protocol message produced by the device.
    fn write(&mut self, _bytes: &[u8]) {}

    /// The device was reset.
    fn reset(&mut self) {}

    /// Source for `math.rand`.
    fn random(&mut self) -> Value {
        0
    }
}

/// A host that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl Host for NullHost {}

pub struct Device<
    'a,
    H: Host,
    const BYTECODE_SIZE: usize,
    const STACK_SIZE: usize,
    const VARIABLE_SIZE: usize,
    const ARG_WORDS: usize = MAX_NATIVE_ARG_WORDS,
> {
    config: DeviceConfig,
    layout: Vec<VariableDescriptor<'a>, MAX_VARIABLES>,
    natives: &'a [NativeFunction],
    host: H,
    bytecode: Vec<ProgramWord, BYTECODE_SIZE>,
    // Edge latches of `when` branches, indexed by the branch address.
    latches: [bool; BYTECODE_SIZE],
    variables: [Value; VARIABLE_SIZE],
    stack: Vec<Value, STACK_SIZE>,
    pc: usize,
    event_active: bool,
    step_by_step: bool,
    event_running: bool,
    breakpoints: Vec<usize, MAX_BREAKPOINTS>,
    arg_buffer: [Value; ARG_WORDS],
}

impl<
    'a,
    H: Host,
    const BYTECODE_SIZE: usize,
    const STACK_SIZE: usize,
    const VARIABLE_SIZE: usize,
    const ARG_WORDS: usize,
> Device<'a, H, BYTECODE_SIZE, STACK_SIZE, VARIABLE_SIZE, ARG_WORDS>
{
    /// Lays `variables` out one after the other from address zero. The
    /// memory past the last variable is free for the program.
    pub fn new(
        config: DeviceConfig,
        variables: &[VariableSpec<'a>],
        natives: &'a [NativeFunction],
        host: H,
    ) -> Result<Self, MachineError> {
        let mut layout = Vec::new();
        let mut offset: usize = 0;
        for spec in variables {
            layout
                .push(VariableDescriptor {
                    name: spec.name,
                    offset,
                    length: spec.length,
                })
                .map_err(|_| MachineError::VariablesTooLarge)?;
            offset = offset
                .checked_add(spec.length)
                .ok_or(MachineError::VariablesTooLarge)?;
        }
        if offset > VARIABLE_SIZE {
            return Err(MachineError::VariablesTooLarge);
        }

        Ok(Self {
            config,
            layout,
            natives,
            host,
            bytecode: Vec::new(),
            latches: [false; BYTECODE_SIZE],
            variables: [0; VARIABLE_SIZE],
            stack: Vec::new(),
            pc: 0,
            event_active: false,
            step_by_step: true,
            event_running: false,
            breakpoints: Vec::new(),
            arg_buffer: [0; ARG_WORDS],
        })
    }

    pub fn node_id(&self) -> ProgramWord {
        self.config.node_id
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn natives(&self) -> &'a [NativeFunction] {
        self.natives
    }

    pub fn variable_layout(&self) -> &[VariableDescriptor<'a>] {
        &self.layout
    }

    pub fn variable(&self, name: &str) -> Option<&[Value]> {
        let descriptor = self.layout.iter().find(|descriptor| descriptor.name == name)?;
        self.variables.get(descriptor.range())
    }

    /// Words used by named variables.
    pub fn user_data_size(&self) -> usize {
        self.layout
            .iter()
            .fold(0usize, |total, descriptor| total.saturating_add(descriptor.length))
    }

    pub fn variable_data(&self) -> &[Value] {
        &self.variables
    }

    pub fn variable_size(&self) -> usize {
        VARIABLE_SIZE
    }

    pub fn bytecode(&self) -> &[ProgramWord] {
        &self.bytecode
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn is_event_active(&self) -> bool {
        self.event_active
    }

    pub fn is_step_by_step(&self) -> bool {
        self.step_by_step
    }

    pub fn set_step_by_step(&mut self, step_by_step: bool) {
        self.step_by_step = step_by_step;
    }

    /// Execution state as sent in `executionStateChanged`.
    pub fn flags(&self) -> u16 {
        let mut mask = 0;
        if self.event_active {
            mask |= flags::EVENT_ACTIVE;
        }
        if self.step_by_step {
            mask |= flags::STEP_BY_STEP;
        }
        if self.event_running {
            mask |= flags::EVENT_RUNNING;
        }
        mask
    }

    /// Whether the `when` branch at `address` saw its condition hold the
    /// last time it ran.
    pub fn is_latched(&self, address: usize) -> bool {
        self.latches.get(address).copied().unwrap_or(false)
    }

    /// Writes `words` into the bytecode starting at `offset`, growing it as
    /// needed. A gap between the current end and `offset` is zero filled.
    pub fn set_bytecode(&mut self, offset: usize, words: &[ProgramWord]) -> Result<(), MachineError> {
        let end = offset
            .checked_add(words.len())
            .ok_or(MachineError::BytecodeTooLarge)?;
        if end > BYTECODE_SIZE {
            return Err(MachineError::BytecodeTooLarge);
        }
        if self.bytecode.len() < end {
            self.bytecode
                .resize(end, 0)
                .map_err(|_| MachineError::BytecodeTooLarge)?;
        }
        for (address, word) in (offset..end).zip(words.iter()) {
            set_value(
                &mut self.bytecode,
                address,
                *word,
                MachineError::BytecodeTooLarge,
            )?;
            // Producers may ship a branch already latched.
            set_value(
                &mut self.latches,
                address,
                word & LATCH_FLAG != 0,
                MachineError::BytecodeTooLarge,
            )?;
        }
        debug!("bytecode set: {} words at {}", words.len(), offset);
        Ok(())
    }

    pub fn set_breakpoint(&mut self, pc: usize) -> bool {
        if pc >= self.bytecode.len() {
            return false;
        }
        if self.breakpoints.contains(&pc) {
            return true;
        }
        self.breakpoints.push(pc).is_ok()
    }

    pub fn clear_breakpoint(&mut self, pc: usize) {
        self.breakpoints.retain(|address| *address != pc);
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    pub fn breakpoints(&self) -> &[usize] {
        &self.breakpoints
    }

    /// Entry point of `event_id` in the event table.
    pub fn event_address(&self, event_id: ProgramWord) -> Option<usize> {
        let table_end = usize::from(*self.bytecode.first()?);
        let mut index: usize = 1;
        while index < table_end {
            let id = *self.bytecode.get(index)?;
            let address = *self.bytecode.get(index.checked_add(1)?)?;
            if id == event_id {
                return Some(usize::from(address));
            }
            index = index.checked_add(2)?;
        }
        None
    }

    /// Starts the handler of `event_id`. If a handler is still running it
    /// is abandoned and reported with `eventExecutionKilled`. Unknown
    /// events change nothing.
    pub fn setup_event(&mut self, event_id: ProgramWord) -> bool {
        let Some(address) = self.event_address(event_id) else {
            return false;
        };
        if self.event_active {
            warn!("event killed at pc {}", self.pc);
            self.notify(MessageId::EventExecutionKilled, &[pc_word(self.pc)]);
        }
        trace!("event {} starts at {}", event_id, address);
        self.pc = address;
        self.event_active = true;
        true
    }

    /// Brings the machine back to its power on state with the current
    /// bytecode and starts the init event.
    pub fn reset(&mut self) {
        self.event_active = false;
        self.step_by_step = true;
        self.event_running = false;
        self.latches.fill(false);
        self.stack.clear();
        self.variables.fill(0);
        self.host.reset();
        info!("device {} reset", self.config.node_id);
        self.setup_event(EVENT_ID_INIT);
    }

    /// Ends the current event and pauses.
    pub fn stop(&mut self) {
        self.event_active = false;
        self.event_running = false;
        self.step_by_step = true;
    }

    /// Runs the current event. In step by step mode only one instruction
    /// runs. Otherwise the event runs until it stops, faults, or reaches a
    /// breakpoint, which switches to step by step mode.
    pub fn run(&mut self) -> Result<(), MachineError> {
        self.event_running = !self.step_by_step;
        while self.event_active {
            if let Err(err) = self.step() {
                self.event_running = false;
                return Err(err);
            }
            if self.step_by_step {
                break;
            }
            if self.event_active && self.breakpoints.contains(&self.pc) {
                debug!("breakpoint at {}", self.pc);
                self.step_by_step = true;
                break;
            }
        }
        self.event_running = false;
        Ok(())
    }

    /// Executes one instruction. A fault ends the current event and is
    /// reported both to the caller and, where the protocol has a message
    /// for it, through [`Host::write`].
    pub fn step(&mut self) -> Result<(), MachineError> {
        match self.execute() {
            Ok(()) => Ok(()),
            Err(err) => {
                error!("fault at pc {}: {}", self.pc, err);
                self.event_active = false;
                match err {
                    MachineError::IndexOutOfBounds { pc, size, index } => self.notify(
                        MessageId::ArrayAccessOutOfBounds,
                        &[pc_word(pc), size, index as ProgramWord],
                    ),
                    MachineError::DivisionByZero { pc } => {
                        self.notify(MessageId::DivisionByZero, &[pc_word(pc)])
                    }
                    _ => {}
                }
                Err(err)
            }
        }
    }

    /// Writes `data` to variable memory at `offset`, reporting every
    /// element of a named variable through [`Host::variable_changed`].
    pub fn set_variable_data(&mut self, offset: usize, data: &[Value]) -> Result<(), MachineError> {
        write_variables(&mut self.variables, &self.layout, &mut self.host, offset, data)
    }

    fn execute(&mut self) -> Result<(), MachineError> {
        let pc = self.pc;
        let word = read_word(pc, &self.bytecode)?;
        let payload = isa::payload(word);
        let mut next = offset_pc(pc, 1)?;

        match OpClass::of(word) {
            OpClass::Stop => {
                self.event_active = false;
            }
            OpClass::SmallImmediate => {
                push(&mut self.stack, isa::to_signed12(payload))?;
            }
            OpClass::LargeImmediate => {
                let value = read_word(next, &self.bytecode)?;
                push(&mut self.stack, isa::to_signed16(value))?;
                next = offset_pc(pc, 2)?;
            }
            OpClass::Load => {
                let value = self.read_variable(usize::from(payload))?;
                push(&mut self.stack, value)?;
            }
            OpClass::Store => {
                let value = pop(&mut self.stack)?;
                self.set_variable_data(usize::from(payload), &[value])?;
            }
            OpClass::LoadIndirect => {
                let size = read_word(next, &self.bytecode)?;
                let index = pop(&mut self.stack)?;
                let address = indexed_address(pc, payload, size, index)?;
                let value = self.read_variable(address)?;
                push(&mut self.stack, value)?;
                next = offset_pc(pc, 2)?;
            }
            OpClass::StoreIndirect => {
                let size = read_word(next, &self.bytecode)?;
                let index = pop(&mut self.stack)?;
                let address = indexed_address(pc, payload, size, index)?;
                let value = pop(&mut self.stack)?;
                self.set_variable_data(address, &[value])?;
                next = offset_pc(pc, 2)?;
            }
            OpClass::UnaryOp => {
                let op = UnaryOp::try_from(word)?;
                let value = pop(&mut self.stack)?;
                let result = match op {
                    UnaryOp::Neg => value.wrapping_neg(),
                    UnaryOp::Abs => value.wrapping_abs(),
                    UnaryOp::BitNot => !value,
                };
                push(&mut self.stack, result)?;
            }
            OpClass::BinaryOp => {
                let op = BinaryOp::try_from(word)?;
                let (lhs, rhs) = pop2(&mut self.stack)?;
                push(&mut self.stack, binary(op, lhs, rhs, pc)?)?;
            }
            OpClass::Jump => {
                next = relative_pc(pc, isa::to_signed12(payload))?;
            }
            OpClass::ConditionalBranch => {
                let op = BinaryOp::from_condition(word)?;
                let (lhs, rhs) = pop2(&mut self.stack)?;
                let condition = binary(op, lhs, rhs, pc)? != 0;
                let offset = isa::to_signed16(read_word(next, &self.bytecode)?);
                let skip = if word & WHEN_FLAG != 0 {
                    let latched = self.is_latched(pc);
                    set_value(
                        &mut self.latches,
                        pc,
                        condition,
                        MachineError::OutOfBoundsBytecodeRead(pc),
                    )?;
                    latched || !condition
                } else {
                    !condition
                };
                next = if skip {
                    relative_pc(pc, offset)?
                } else {
                    offset_pc(pc, 2)?
                };
            }
            OpClass::Emit => {
                let address = usize::from(read_word(next, &self.bytecode)?);
                let size = usize::from(read_word(offset_pc(pc, 2)?, &self.bytecode)?);
                let end = address
                    .checked_add(size)
                    .ok_or(MachineError::OutOfBoundsVariableAccess(address))?;
                let payload_data = self
                    .variables
                    .get(address..end)
                    .ok_or(MachineError::OutOfBoundsVariableAccess(end))?;
                self.host.emit(payload, payload_data);
                next = offset_pc(pc, 3)?;
            }
            OpClass::NativeCall => {
                self.call_native(payload)?;
            }
            OpClass::SubCall => {
                push(&mut self.stack, pc_word(next) as Value)?;
                next = usize::from(payload);
            }
            OpClass::SubRet => {
                let address = pop(&mut self.stack)?;
                next = usize::from(address as ProgramWord);
            }
            OpClass::Reserved => {
                return Err(MachineError::ReservedOpcode(word));
            }
        }

        self.pc = next;
        Ok(())
    }

    fn call_native(&mut self, index: ProgramWord) -> Result<(), MachineError> {
        let natives = self.natives;
        let native = natives
            .get(usize::from(index))
            .ok_or(MachineError::NativeIndexOutOfBounds(index))?;
        let spans = bind_arguments(native.params, &mut self.stack)?;

        let mut ranges: Vec<Range<usize>, MAX_NATIVE_PARAMS> = Vec::new();
        let mut used: usize = 0;
        for span in &spans {
            let source = span.address..span
                .address
                .checked_add(span.size)
                .ok_or(MachineError::OutOfBoundsVariableAccess(span.address))?;
            let values = self
                .variables
                .get(source.clone())
                .ok_or(MachineError::OutOfBoundsVariableAccess(source.end))?;
            let target = used..used
                .checked_add(span.size)
                .ok_or(MachineError::NativeArgumentsTooLarge)?;
            self.arg_buffer
                .get_mut(target.clone())
                .ok_or(MachineError::NativeArgumentsTooLarge)?
                .copy_from_slice(values);
            used = target.end;
            ranges
                .push(target)
                .map_err(|_| MachineError::TooManyNativeParams)?;
        }

        trace!("native call {}", native.name);
        {
            let mut args = NativeArgs::new(&mut self.arg_buffer, &ranges);
            let handled = self.host.native_call(native.name, &mut args);
            if !handled {
                if let Some(fun) = native.fun {
                    fun(&mut self.host, &mut args)?;
                }
            }
        }

        for (span, range) in spans.iter().zip(ranges.iter()) {
            let values = self
                .arg_buffer
                .get(range.clone())
                .ok_or(MachineError::NativeArgumentsTooLarge)?;
            write_variables(&mut self.variables, &self.layout, &mut self.host, span.address, values)?;
        }
        Ok(())
    }

    fn read_variable(&self, address: usize) -> Result<Value, MachineError> {
        self.variables
            .get(address)
            .copied()
            .ok_or(MachineError::OutOfBoundsVariableAccess(address))
    }

    fn notify(&mut self, id: MessageId, words: &[ProgramWord]) {
        let message = match Message::<NOTIFICATION_CAP>::with_words(id, self.config.node_id, words) {
            Ok(message) => message,
            Err(_) => {
                warn!("notification does not fit");
                return;
            }
        };
        let mut bytes = [0u8; NOTIFICATION_CAP + crate::message::HEADER_SIZE];
        match message.serialize_into(&mut bytes) {
            Ok(len) => {
                if let Some(encoded) = bytes.get(..len) {
                    self.host.write(encoded);
                }
            }
            Err(_) => warn!("notification could not be encoded"),
        }
    }
}

fn write_variables<H: Host>(
    variables: &mut [Value],
    layout: &[VariableDescriptor<'_>],
    host: &mut H,
    offset: usize,
    data: &[Value],
) -> Result<(), MachineError> {
    let end = offset
        .checked_add(data.len())
        .ok_or(MachineError::OutOfBoundsVariableAccess(offset))?;
    if end > variables.len() {
        return Err(MachineError::OutOfBoundsVariableAccess(end));
    }

    for descriptor in layout {
        let range = descriptor.range();
        if range.end <= offset || range.start >= end {
            continue;
        }
        let Some(old_array) = variables.get(range.clone()) else {
            continue;
        };
        let first = range.start.max(offset);
        let last = range.end.min(end);
        for address in first..last {
            let (Some(index), Some(data_index)) =
                (address.checked_sub(range.start), address.checked_sub(offset))
            else {
                continue;
            };
            let (Some(new_value), Some(old_value)) = (data.get(data_index), old_array.get(index))
            else {
                continue;
            };
            host.variable_changed(&VariableChange {
                name: descriptor.name,
                index,
                new_value: *new_value,
                old_value: *old_value,
                old_array,
            });
        }
    }

    variables
        .get_mut(offset..end)
        .ok_or(MachineError::OutOfBoundsVariableAccess(end))?
        .copy_from_slice(data);
    Ok(())
}

// Division by zero is a fault reported with `divisionByZero`. It does not
// yield 0, unlike the `math.div` native.
fn binary(op: BinaryOp, lhs: Value, rhs: Value, pc: usize) -> Result<Value, MachineError> {
    let shift = |amount: Value| (amount as u32) & 0x1f;
    let truth = |value: bool| Value::from(value);
    let result = match op {
        BinaryOp::ShiftLeft => i32::from(lhs).wrapping_shl(shift(rhs)) as Value,
        BinaryOp::ShiftRight => i32::from(lhs).wrapping_shr(shift(rhs)) as Value,
        BinaryOp::Add => lhs.wrapping_add(rhs),
        BinaryOp::Sub => lhs.wrapping_sub(rhs),
        BinaryOp::Mult => lhs.wrapping_mul(rhs),
        BinaryOp::Div => {
            if rhs == 0 {
                return Err(MachineError::DivisionByZero { pc });
            }
            lhs.wrapping_div(rhs)
        }
        BinaryOp::Mod => {
            if rhs == 0 {
                return Err(MachineError::DivisionByZero { pc });
            }
            lhs.wrapping_rem(rhs)
        }
        BinaryOp::BitOr => lhs | rhs,
        BinaryOp::BitXor => lhs ^ rhs,
        BinaryOp::BitAnd => lhs & rhs,
        BinaryOp::Equal => truth(lhs == rhs),
        BinaryOp::NotEqual => truth(lhs != rhs),
        BinaryOp::GreaterThan => truth(lhs > rhs),
        BinaryOp::GreaterEqual => truth(lhs >= rhs),
        BinaryOp::LessThan => truth(lhs < rhs),
        BinaryOp::LessEqual => truth(lhs <= rhs),
        BinaryOp::Or => truth(lhs != 0 || rhs != 0),
        BinaryOp::And => truth(lhs != 0 && rhs != 0),
    };
    Ok(result)
}

/// Address of element `index` of the `size` word array at `base`. Negative
/// indices are out of bounds too.
fn indexed_address(
    pc: usize,
    base: ProgramWord,
    size: ProgramWord,
    index: Value,
) -> Result<usize, MachineError> {
    let out_of_bounds = MachineError::IndexOutOfBounds { pc, size, index };
    let Ok(offset) = ProgramWord::try_from(index) else {
        return Err(out_of_bounds);
    };
    if offset >= size {
        return Err(out_of_bounds);
    }
    usize::from(base)
        .checked_add(usize::from(offset))
        .ok_or(out_of_bounds)
}

fn offset_pc(pc: usize, words: usize) -> Result<usize, MachineError> {
    pc.checked_add(words)
        .ok_or(MachineError::OutOfBoundsBytecodeRead(pc))
}

fn relative_pc(pc: usize, offset: i16) -> Result<usize, MachineError> {
    pc.checked_add_signed(isize::from(offset))
        .ok_or(MachineError::OutOfBoundsBytecodeRead(pc))
}

fn pc_word(pc: usize) -> ProgramWord {
    ProgramWord::try_from(pc).unwrap_or(ProgramWord::MAX)
}
