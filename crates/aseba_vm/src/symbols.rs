//! Names known to the assembler.
//!
//! A table starts out seeded from the device it assembles for: one entry
//! per variable (its offset), one `_nf.<name>` entry per native function
//! (its index), `_userdata` (first word after the named variables) and
//! `_topdata` (size of variable memory). Labels and `equ` constants are
//! added while assembling.

use core::fmt::Write;

use heapless::{String, Vec};
use thiserror_no_std::Error;

use crate::device::VariableDescriptor;
use crate::native::NativeFunction;

pub const NAME_CAP: usize = 48;

pub const NATIVE_PREFIX: &str = "_nf.";
pub const USER_DATA: &str = "_userdata";
pub const TOP_DATA: &str = "_topdata";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SymbolError {
    #[error("symbol name is too long")]
    NameTooLong,
    #[error("symbol table is full")]
    TableFull,
}

/// Name lookup as seen by instruction encoders.
pub trait Symbols {
    fn lookup(&self, name: &str) -> Option<i32>;

    /// Binds `name` to `value`, replacing any previous binding.
    fn define(&mut self, name: &str, value: i32) -> Result<(), SymbolError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String<NAME_CAP>,
    pub value: i32,
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable<const CAP: usize> {
    symbols: Vec<Symbol, CAP>,
}

impl<const CAP: usize> SymbolTable<CAP> {
    pub fn new() -> Self {
        Self {
            symbols: Vec::new(),
        }
    }

    /// A table holding the names a device exposes to programs.
    pub fn seeded(
        layout: &[VariableDescriptor<'_>],
        natives: &[NativeFunction],
        variable_size: usize,
    ) -> Result<Self, SymbolError> {
        let mut table = Self::new();
        let mut user_data: usize = 0;
        for variable in layout {
            table.insert(variable.name, to_value(variable.offset))?;
            user_data = user_data.max(variable.range().end);
        }
        for (index, native) in natives.iter().enumerate() {
            let mut name: String<NAME_CAP> = String::new();
            write!(name, "{}{}", NATIVE_PREFIX, native.name).map_err(|_| SymbolError::NameTooLong)?;
            table.insert(&name, to_value(index))?;
        }
        table.insert(USER_DATA, to_value(user_data))?;
        table.insert(TOP_DATA, to_value(variable_size))?;
        Ok(table)
    }

    pub fn get(&self, name: &str) -> Option<i32> {
        self.symbols
            .iter()
            .find(|symbol| symbol.name == name)
            .map(|symbol| symbol.value)
    }

    pub fn insert(&mut self, name: &str, value: i32) -> Result<(), SymbolError> {
        if let Some(symbol) = self.symbols.iter_mut().find(|symbol| symbol.name == name) {
            symbol.value = value;
            return Ok(());
        }
        let mut owned: String<NAME_CAP> = String::new();
        owned
            .push_str(name)
            .map_err(|_| SymbolError::NameTooLong)?;
        self.symbols
            .push(Symbol { name: owned, value })
            .map_err(|_| SymbolError::TableFull)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }
}

impl<const CAP: usize> Symbols for SymbolTable<CAP> {
    fn lookup(&self, name: &str) -> Option<i32> {
        self.get(name)
    }

    fn define(&mut self, name: &str, value: i32) -> Result<(), SymbolError> {
        self.insert(name, value)
    }
}

fn to_value(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
