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

//! A virtual machine for Aseba bytecode and the tools around it.
//!
//! The machine is a 16-bit stack machine. Programs are a flat array of
//! program words: word 0 is the end of the event table, the words in
//! `[1, word0)` are `(event id, entry address)` pairs and the code starts
//! right after. Variables live in one flat array of signed 16-bit cells,
//! and native functions are called by index with a size-aware argument
//! binding (see [`native`]).
//!
//! Text programs are turned into bytecode with the two pass
//! [`assembler`], which resolves names through a [`symbols::SymbolTable`]
//! seeded from the device description.

#[macro_use]
mod fmt;

pub mod assembler;
pub mod device;
pub mod disassembler;
pub mod isa;
pub mod message;
pub mod native;
pub mod symbols;
pub mod thymio;

#[cfg(test)]
mod assembler_test;

use heapless::Vec;
use thiserror_no_std::Error;

pub use device::{
    DefaultDevice, Device, DeviceConfig, Host, NullHost, VariableChange, VariableDescriptor,
    VariableSpec,
};

/// One word of bytecode. Instructions and their operands are all
/// program words.
pub type ProgramWord = u16;

/// A cell of variable memory or of the data stack.
pub type Value = i16;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MachineError {
    #[error("the word {0:#06x} uses the reserved opcode")]
    ReservedOpcode(ProgramWord),
    #[error("the word {0:#06x} selects an unknown arithmetic operation")]
    UnknownArithmeticOp(ProgramWord),
    #[error("index {index} out of bounds for array of size {size} at pc {pc}")]
    IndexOutOfBounds { pc: usize, size: ProgramWord, index: Value },
    #[error("division by zero at pc {pc}")]
    DivisionByZero { pc: usize },
    #[error("native function {0} is not defined")]
    NativeIndexOutOfBounds(ProgramWord),
    #[error("attempted opperation would overflow the stack")]
    StackOverflow,
    #[error("attempted opperation would underflow the stack")]
    StackUnderflow,
    #[error("address {0} out of range of the bytecode")]
    OutOfBoundsBytecodeRead(usize),
    #[error("address {0} out of range of the variables")]
    OutOfBoundsVariableAccess(usize),
    #[error("native call arguments do not fit in the argument buffer")]
    NativeArgumentsTooLarge,
    #[error("native function declares more parameters than supported")]
    TooManyNativeParams,
    #[error("native argument {param} has no element {index}")]
    NativeArgumentOutOfRange { param: usize, index: usize },
    #[error("bytecode does not fit in the device")]
    BytecodeTooLarge,
    #[error("variables do not fit in the device")]
    VariablesTooLarge,
}

fn get_mut_or<T, E>(slice: &mut [T], index: usize, err: E) -> Result<&mut T, E> {
    slice.get_mut(index).ok_or(err)
}

fn set_value<T, E>(slice: &mut [T], index: usize, value: T, err: E) -> Result<(), E> {
    *get_mut_or(slice, index, err)? = value;
    Ok(())
}

fn read_word(index: usize, bytecode: &[ProgramWord]) -> Result<ProgramWord, MachineError> {
    match bytecode.get(index) {
        None => Err(MachineError::OutOfBoundsBytecodeRead(index)),
        Some(word) => Ok(*word),
    }
}

fn pop<const STACK_SIZE: usize>(stack: &mut Vec<Value, STACK_SIZE>) -> Result<Value, MachineError> {
    stack.pop().ok_or(MachineError::StackUnderflow)
}

fn pop2<const STACK_SIZE: usize>(
    stack: &mut Vec<Value, STACK_SIZE>,
) -> Result<(Value, Value), MachineError> {
    let rhs = pop(stack)?;
    let lhs = pop(stack)?;
    Ok((lhs, rhs))
}

fn push<const STACK_SIZE: usize>(
    stack: &mut Vec<Value, STACK_SIZE>,
    value: Value,
) -> Result<(), MachineError> {
    if stack.push(value).is_err() {
        return Err(MachineError::StackOverflow);
    }
    Ok(())
}

#[cfg(test)]
mod test;
