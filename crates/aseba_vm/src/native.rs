//! Native functions and the convention used to pass them arguments.
//!
//! A native call names its arguments by address in variable memory. The
//! caller pushes one address per parameter, then the sizes the callee
//! cannot know statically: one per [`ParamSize::FromStack`] parameter and
//! one per distinct [`ParamSize::Group`] tag. [`bind_arguments`] pops all
//! of them and works out the window of memory each parameter covers.
//!
//! The machine copies every window into a [`NativeArgs`], runs the
//! function, and writes every window back so functions return results by
//! writing to their arguments.

use core::f32::consts::PI;
use core::ops::Range;

use heapless::Vec;
use micromath::F32Ext;

use crate::device::Host;
use crate::{pop, MachineError, Value};

/// Most parameters a native function may declare.
pub const MAX_NATIVE_PARAMS: usize = 16;

/// How the size of one native parameter is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParamSize {
    /// Always this many words.
    Fixed(u16),
    /// The caller pushes the size of this parameter alone.
    FromStack,
    /// Every parameter with the same tag shares one size pushed by the
    /// caller.
    Group(u16),
}

impl ParamSize {
    /// Decodes the signed size used in node descriptions: positive is a
    /// fixed size, zero is read from the stack and negative is a group tag.
    pub const fn from_declared(size: i16) -> Self {
        if size > 0 {
            ParamSize::Fixed(size.unsigned_abs())
        } else if size == 0 {
            ParamSize::FromStack
        } else {
            ParamSize::Group(size.unsigned_abs())
        }
    }

    pub const fn declared(self) -> i32 {
        match self {
            ParamSize::Fixed(size) => size as i32,
            ParamSize::FromStack => 0,
            ParamSize::Group(tag) => (tag as i32).wrapping_neg(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeParam {
    pub name: &'static str,
    pub size: ParamSize,
}

impl NativeParam {
    pub const fn new(name: &'static str, size: i16) -> Self {
        Self {
            name,
            size: ParamSize::from_declared(size),
        }
    }
}

pub type NativeFn = fn(&mut dyn Host, &mut NativeArgs<'_>) -> Result<(), MachineError>;

#[derive(Debug, Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [NativeParam],
    /// Default implementation. `None` leaves the arguments untouched
    /// unless the host handles the call.
    pub fun: Option<NativeFn>,
}

/// The window of variable memory bound to one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ArgSpan {
    pub address: usize,
    pub size: usize,
}

/// Pops the arguments of a call to a function with `params` off `stack`.
///
/// Addresses come off first, in declaration order, then one size for each
/// parameter read from the stack, again in declaration order, then one
/// size per distinct group tag in increasing tag order.
pub fn bind_arguments<const STACK_SIZE: usize>(
    params: &[NativeParam],
    stack: &mut Vec<Value, STACK_SIZE>,
) -> Result<Vec<ArgSpan, MAX_NATIVE_PARAMS>, MachineError> {
    if params.len() > MAX_NATIVE_PARAMS {
        return Err(MachineError::TooManyNativeParams);
    }

    let mut spans: Vec<ArgSpan, MAX_NATIVE_PARAMS> = Vec::new();
    for _ in params {
        let address = usize::from(pop(stack)? as u16);
        spans
            .push(ArgSpan { address, size: 0 })
            .map_err(|_| MachineError::TooManyNativeParams)?;
    }

    for (param, span) in params.iter().zip(spans.iter_mut()) {
        match param.size {
            ParamSize::Fixed(size) => span.size = usize::from(size),
            ParamSize::FromStack => span.size = usize::from(pop(stack)? as u16),
            ParamSize::Group(_) => {}
        }
    }

    let mut tags: Vec<u16, MAX_NATIVE_PARAMS> = Vec::new();
    for param in params {
        if let ParamSize::Group(tag) = param.size {
            if let Err(at) = tags.binary_search(&tag) {
                tags.insert(at, tag)
                    .map_err(|_| MachineError::TooManyNativeParams)?;
            }
        }
    }

    let mut group_sizes: Vec<(u16, usize), MAX_NATIVE_PARAMS> = Vec::new();
    for tag in tags {
        let size = usize::from(pop(stack)? as u16);
        group_sizes
            .push((tag, size))
            .map_err(|_| MachineError::TooManyNativeParams)?;
    }

    for (param, span) in params.iter().zip(spans.iter_mut()) {
        if let ParamSize::Group(tag) = param.size {
            if let Some((_, size)) = group_sizes.iter().find(|(group, _)| *group == tag) {
                span.size = *size;
            }
        }
    }

    Ok(spans)
}

/// Copies of the argument windows handed to a native function.
pub struct NativeArgs<'b> {
    data: &'b mut [Value],
    ranges: &'b [Range<usize>],
}

impl<'b> NativeArgs<'b> {
    /// `ranges` locate each parameter's values inside `data`.
    pub fn new(data: &'b mut [Value], ranges: &'b [Range<usize>]) -> Self {
        Self { data, ranges }
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Number of words bound to `param`, zero if there is no such
    /// parameter.
    pub fn size(&self, param: usize) -> usize {
        self.ranges.get(param).map_or(0, |range| range.len())
    }

    pub fn param(&self, param: usize) -> Option<&[Value]> {
        let range = self.ranges.get(param)?;
        self.data.get(range.clone())
    }

    pub fn param_mut(&mut self, param: usize) -> Option<&mut [Value]> {
        let range = self.ranges.get(param)?;
        self.data.get_mut(range.clone())
    }

    pub fn get(&self, param: usize, index: usize) -> Result<Value, MachineError> {
        self.param(param)
            .and_then(|values| values.get(index))
            .copied()
            .ok_or(MachineError::NativeArgumentOutOfRange { param, index })
    }

    pub fn set(&mut self, param: usize, index: usize, value: Value) -> Result<(), MachineError> {
        let slot = self
            .param_mut(param)
            .and_then(|values| values.get_mut(index))
            .ok_or(MachineError::NativeArgumentOutOfRange { param, index })?;
        *slot = value;
        Ok(())
    }
}

// Native results wrap to 16 bits like the arithmetic instructions.
fn wrap(value: i32) -> Value {
    value as Value
}

fn map_elements(
    args: &mut NativeArgs<'_>,
    inputs: usize,
    op: fn(&[Value]) -> Value,
) -> Result<(), MachineError> {
    let mut operands: Vec<Value, MAX_NATIVE_PARAMS> = Vec::new();
    for index in 0..args.size(0) {
        operands.clear();
        for param in 1..=inputs {
            operands
                .push(args.get(param, index)?)
                .map_err(|_| MachineError::TooManyNativeParams)?;
        }
        args.set(0, index, op(&operands))?;
    }
    Ok(())
}

fn operand(operands: &[Value], index: usize) -> i32 {
    operands.get(index).copied().map_or(0, i32::from)
}

fn round_to_value(value: f32) -> Value {
    value.round() as Value
}

/// Angles are 16-bit fractions of a half turn.
fn angle_to_radians(angle: Value) -> f32 {
    f32::from(angle) * PI / 32768.0
}

fn math_copy(_: &mut dyn Host, args: &mut NativeArgs<'_>) -> Result<(), MachineError> {
    map_elements(args, 1, |v| operand(v, 0) as Value)
}

fn math_fill(_: &mut dyn Host, args: &mut NativeArgs<'_>) -> Result<(), MachineError> {
    let value = args.get(1, 0)?;
    for index in 0..args.size(0) {
        args.set(0, index, value)?;
    }
    Ok(())
}

fn math_addscalar(_: &mut dyn Host, args: &mut NativeArgs<'_>) -> Result<(), MachineError> {
    let scalar = i32::from(args.get(2, 0)?);
    for index in 0..args.size(0) {
        let value = i32::from(args.get(1, index)?);
        args.set(0, index, wrap(value.wrapping_add(scalar)))?;
    }
    Ok(())
}

fn math_add(_: &mut dyn Host, args: &mut NativeArgs<'_>) -> Result<(), MachineError> {
    map_elements(args, 2, |v| wrap(operand(v, 0).wrapping_add(operand(v, 1))))
}

fn math_sub(_: &mut dyn Host, args: &mut NativeArgs<'_>) -> Result<(), MachineError> {
    map_elements(args, 2, |v| wrap(operand(v, 0).wrapping_sub(operand(v, 1))))
}

fn math_mul(_: &mut dyn Host, args: &mut NativeArgs<'_>) -> Result<(), MachineError> {
    map_elements(args, 2, |v| wrap(operand(v, 0).wrapping_mul(operand(v, 1))))
}

fn math_div(_: &mut dyn Host, args: &mut NativeArgs<'_>) -> Result<(), MachineError> {
    map_elements(args, 2, |v| {
        wrap(operand(v, 0).checked_div(operand(v, 1)).unwrap_or(0))
    })
}

fn math_min(_: &mut dyn Host, args: &mut NativeArgs<'_>) -> Result<(), MachineError> {
    map_elements(args, 2, |v| operand(v, 0).min(operand(v, 1)) as Value)
}

fn math_max(_: &mut dyn Host, args: &mut NativeArgs<'_>) -> Result<(), MachineError> {
    map_elements(args, 2, |v| operand(v, 0).max(operand(v, 1)) as Value)
}

fn math_clamp(_: &mut dyn Host, args: &mut NativeArgs<'_>) -> Result<(), MachineError> {
    map_elements(args, 3, |v| {
        operand(v, 0).max(operand(v, 1)).min(operand(v, 2)) as Value
    })
}

fn math_muldiv(_: &mut dyn Host, args: &mut NativeArgs<'_>) -> Result<(), MachineError> {
    map_elements(args, 3, |v| {
        let product = operand(v, 0).wrapping_mul(operand(v, 1));
        wrap(product.checked_div(operand(v, 2)).unwrap_or(0))
    })
}

fn math_dot(_: &mut dyn Host, args: &mut NativeArgs<'_>) -> Result<(), MachineError> {
    let mut sum: i64 = 0;
    for index in 0..args.size(0) {
        let a = i64::from(args.get(1, index)?);
        let b = i64::from(args.get(2, index)?);
        sum = sum.wrapping_add(a.wrapping_mul(b));
    }
    let shift = u32::from(args.get(3, 0)?.clamp(0, 63) as u16);
    args.set(0, 0, sum.wrapping_shr(shift) as Value)
}

fn math_stat(_: &mut dyn Host, args: &mut NativeArgs<'_>) -> Result<(), MachineError> {
    let mut min = Value::MAX;
    let mut max = Value::MIN;
    let mut sum: i32 = 0;
    let count = args.size(0);
    for index in 0..count {
        let value = args.get(0, index)?;
        min = min.min(value);
        max = max.max(value);
        sum = sum.wrapping_add(i32::from(value));
    }
    let mean = i32::try_from(count)
        .ok()
        .and_then(|count| sum.checked_div(count))
        .unwrap_or(0);
    args.set(1, 0, min)?;
    args.set(2, 0, max)?;
    args.set(3, 0, wrap(mean))
}

fn math_argbounds(_: &mut dyn Host, args: &mut NativeArgs<'_>) -> Result<(), MachineError> {
    let mut bounds: Option<(Value, usize, Value, usize)> = None;
    for index in 0..args.size(0) {
        let value = args.get(0, index)?;
        bounds = Some(match bounds {
            None => (value, index, value, index),
            Some((min, argmin, max, argmax)) => {
                let (min, argmin) = if value < min { (value, index) } else { (min, argmin) };
                let (max, argmax) = if value > max { (value, index) } else { (max, argmax) };
                (min, argmin, max, argmax)
            }
        });
    }
    if let Some((_, argmin, _, argmax)) = bounds {
        args.set(1, 0, wrap(i32::try_from(argmin).unwrap_or(i32::MAX)))?;
        args.set(2, 0, wrap(i32::try_from(argmax).unwrap_or(i32::MAX)))?;
    }
    Ok(())
}

fn math_sort(_: &mut dyn Host, args: &mut NativeArgs<'_>) -> Result<(), MachineError> {
    if let Some(values) = args.param_mut(0) {
        values.sort_unstable();
    }
    Ok(())
}

fn math_atan2(_: &mut dyn Host, args: &mut NativeArgs<'_>) -> Result<(), MachineError> {
    map_elements(args, 2, |v| {
        let angle = (operand(v, 0) as f32).atan2(operand(v, 1) as f32);
        round_to_value(angle * 32767.0 / PI)
    })
}

fn math_sin(_: &mut dyn Host, args: &mut NativeArgs<'_>) -> Result<(), MachineError> {
    map_elements(args, 1, |v| {
        round_to_value(angle_to_radians(operand(v, 0) as Value).sin() * 32767.0)
    })
}

fn math_cos(_: &mut dyn Host, args: &mut NativeArgs<'_>) -> Result<(), MachineError> {
    map_elements(args, 1, |v| {
        round_to_value(angle_to_radians(operand(v, 0) as Value).cos() * 32767.0)
    })
}

fn math_rot2(_: &mut dyn Host, args: &mut NativeArgs<'_>) -> Result<(), MachineError> {
    let x = f32::from(args.get(1, 0)?);
    let y = f32::from(args.get(1, 1)?);
    let theta = angle_to_radians(args.get(2, 0)?);
    let (sin, cos) = (theta.sin(), theta.cos());
    args.set(0, 0, round_to_value(x * cos - y * sin))?;
    args.set(0, 1, round_to_value(x * sin + y * cos))
}

fn math_sqrt(_: &mut dyn Host, args: &mut NativeArgs<'_>) -> Result<(), MachineError> {
    map_elements(args, 1, |v| {
        let x = operand(v, 0);
        if x > 0 { (x as f32).sqrt().floor() as Value } else { 0 }
    })
}

fn math_rand(host: &mut dyn Host, args: &mut NativeArgs<'_>) -> Result<(), MachineError> {
    for index in 0..args.size(0) {
        args.set(0, index, host.random())?;
    }
    Ok(())
}

const R_A: &[NativeParam] = &[NativeParam::new("r", -1), NativeParam::new("a", -1)];
const R_A_B: &[NativeParam] = &[
    NativeParam::new("r", -1),
    NativeParam::new("a", -1),
    NativeParam::new("b", -1),
];
const R_A_B_C: &[NativeParam] = &[
    NativeParam::new("r", -1),
    NativeParam::new("a", -1),
    NativeParam::new("b", -1),
    NativeParam::new("c", -1),
];

pub const MATH_COPY: NativeFunction = NativeFunction {
    name: "math.copy",
    description: "Copy an array",
    params: R_A,
    fun: Some(math_copy),
};

pub const MATH_FILL: NativeFunction = NativeFunction {
    name: "math.fill",
    description: "Fill an array with a constant value",
    params: &[NativeParam::new("r", -1), NativeParam::new("c", 1)],
    fun: Some(math_fill),
};

pub const MATH_ADDSCALAR: NativeFunction = NativeFunction {
    name: "math.addscalar",
    description: "Add a scalar to each element of an array",
    params: &[
        NativeParam::new("r", -1),
        NativeParam::new("a", -1),
        NativeParam::new("b", 1),
    ],
    fun: Some(math_addscalar),
};

pub const MATH_ADD: NativeFunction = NativeFunction {
    name: "math.add",
    description: "Element by element addition",
    params: R_A_B,
    fun: Some(math_add),
};

pub const MATH_SUB: NativeFunction = NativeFunction {
    name: "math.sub",
    description: "Element by element subtraction",
    params: R_A_B,
    fun: Some(math_sub),
};

pub const MATH_MUL: NativeFunction = NativeFunction {
    name: "math.mul",
    description: "Element by element multiplication",
    params: R_A_B,
    fun: Some(math_mul),
};

pub const MATH_DIV: NativeFunction = NativeFunction {
    name: "math.div",
    description: "Element by element division",
    params: R_A_B,
    fun: Some(math_div),
};

pub const MATH_MIN: NativeFunction = NativeFunction {
    name: "math.min",
    description: "Element by element minimum",
    params: R_A_B,
    fun: Some(math_min),
};

pub const MATH_MAX: NativeFunction = NativeFunction {
    name: "math.max",
    description: "Element by element maximum",
    params: R_A_B,
    fun: Some(math_max),
};

pub const MATH_CLAMP: NativeFunction = NativeFunction {
    name: "math.clamp",
    description: "Clamp each element between two bounds",
    params: &[
        NativeParam::new("r", -1),
        NativeParam::new("x", -1),
        NativeParam::new("low", -1),
        NativeParam::new("high", -1),
    ],
    fun: Some(math_clamp),
};

pub const MATH_DOT: NativeFunction = NativeFunction {
    name: "math.dot",
    description: "Scalar product, shifted right",
    params: &[
        NativeParam::new("r", -1),
        NativeParam::new("a", -1),
        NativeParam::new("b", -1),
        NativeParam::new("shift", 1),
    ],
    fun: Some(math_dot),
};

pub const MATH_STAT: NativeFunction = NativeFunction {
    name: "math.stat",
    description: "Minimum, maximum and mean of an array",
    params: &[
        NativeParam::new("x", -1),
        NativeParam::new("min", 1),
        NativeParam::new("max", 1),
        NativeParam::new("mean", 1),
    ],
    fun: Some(math_stat),
};

pub const MATH_ARGBOUNDS: NativeFunction = NativeFunction {
    name: "math.argbounds",
    description: "Indices of the minimum and maximum of an array",
    params: &[
        NativeParam::new("x", -1),
        NativeParam::new("argmin", 1),
        NativeParam::new("argmax", 1),
    ],
    fun: Some(math_argbounds),
};

pub const MATH_SORT: NativeFunction = NativeFunction {
    name: "math.sort",
    description: "Sort an array in place",
    params: &[NativeParam::new("x", -1)],
    fun: Some(math_sort),
};

pub const MATH_MULDIV: NativeFunction = NativeFunction {
    name: "math.muldiv",
    description: "Element by element a * b / c",
    params: R_A_B_C,
    fun: Some(math_muldiv),
};

pub const MATH_ATAN2: NativeFunction = NativeFunction {
    name: "math.atan2",
    description: "Atan2",
    params: &[
        NativeParam::new("r", -1),
        NativeParam::new("y", -1),
        NativeParam::new("x", -1),
    ],
    fun: Some(math_atan2),
};

pub const MATH_SIN: NativeFunction = NativeFunction {
    name: "math.sin",
    description: "Sine",
    params: &[NativeParam::new("r", -1), NativeParam::new("theta", -1)],
    fun: Some(math_sin),
};

pub const MATH_COS: NativeFunction = NativeFunction {
    name: "math.cos",
    description: "Cosine",
    params: &[NativeParam::new("r", -1), NativeParam::new("theta", -1)],
    fun: Some(math_cos),
};

pub const MATH_ROT2: NativeFunction = NativeFunction {
    name: "math.rot2",
    description: "Rotate a 2D vector",
    params: &[
        NativeParam::new("r", 2),
        NativeParam::new("v", 2),
        NativeParam::new("theta", 1),
    ],
    fun: Some(math_rot2),
};

pub const MATH_SQRT: NativeFunction = NativeFunction {
    name: "math.sqrt",
    description: "Square root",
    params: &[NativeParam::new("r", -1), NativeParam::new("x", -1)],
    fun: Some(math_sqrt),
};

pub const MATH_RAND: NativeFunction = NativeFunction {
    name: "math.rand",
    description: "Pseudo-random number",
    params: &[NativeParam::new("r", -1)],
    fun: Some(math_rand),
};

/// The math library, in the order nodes usually declare it.
pub static MATH_NATIVES: &[NativeFunction] = &[
    MATH_COPY,
    MATH_FILL,
    MATH_ADDSCALAR,
    MATH_ADD,
    MATH_SUB,
    MATH_MUL,
    MATH_DIV,
    MATH_MIN,
    MATH_MAX,
    MATH_CLAMP,
    MATH_DOT,
    MATH_STAT,
    MATH_ARGBOUNDS,
    MATH_SORT,
    MATH_MULDIV,
    MATH_ATAN2,
    MATH_SIN,
    MATH_COS,
    MATH_ROT2,
    MATH_SQRT,
    MATH_RAND,
];
