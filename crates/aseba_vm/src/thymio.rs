//! Description of a Thymio II node: its variables, local events and
//! native functions.
//!
//! Natives that drive hardware (leds, sound, sd card) have no default
//! implementation. A host that simulates them intercepts the call in
//! [`Host::native_call`](crate::device::Host::native_call).

use crate::device::{
    native_arg_words, Device, VariableSpec, DEFAULT_BYTECODE_SIZE, DEFAULT_STACK_SIZE,
};
use crate::native::{
    NativeFunction, NativeParam, MATH_ADD, MATH_ADDSCALAR, MATH_ARGBOUNDS, MATH_ATAN2, MATH_CLAMP,
    MATH_COPY, MATH_COS, MATH_DIV, MATH_DOT, MATH_FILL, MATH_MAX, MATH_MIN, MATH_MUL, MATH_MULDIV,
    MATH_RAND, MATH_ROT2, MATH_SIN, MATH_SORT, MATH_SQRT, MATH_STAT, MATH_SUB,
};

pub const THYMIO_VARIABLE_SIZE: usize = 620;

pub type ThymioDevice<'a, H> = Device<
    'a,
    H,
    DEFAULT_BYTECODE_SIZE,
    DEFAULT_STACK_SIZE,
    THYMIO_VARIABLE_SIZE,
    { native_arg_words(THYMIO_VARIABLE_SIZE) },
>;

pub static THYMIO_VARIABLES: &[VariableSpec<'static>] = &[
    VariableSpec::new("_id", 1),
    VariableSpec::new("event.source", 1),
    VariableSpec::new("event.args", 32),
    VariableSpec::new("_fwversion", 2),
    VariableSpec::new("_productId", 1),
    VariableSpec::new("buttons._raw", 5),
    VariableSpec::new("button.backward", 1),
    VariableSpec::new("button.left", 1),
    VariableSpec::new("button.center", 1),
    VariableSpec::new("button.forward", 1),
    VariableSpec::new("button.right", 1),
    VariableSpec::new("buttons._mean", 5),
    VariableSpec::new("buttons._noise", 5),
    VariableSpec::new("prox.horizontal", 7),
    VariableSpec::new("prox.comm.rx._payloads", 7),
    VariableSpec::new("prox.comm.rx._intensities", 7),
    VariableSpec::new("prox.comm.rx", 1),
    VariableSpec::new("prox.comm.tx", 1),
    VariableSpec::new("prox.ground.ambiant", 2),
    VariableSpec::new("prox.ground.reflected", 2),
    VariableSpec::new("prox.ground.delta", 2),
    VariableSpec::new("motor.left.target", 1),
    VariableSpec::new("motor.right.target", 1),
    VariableSpec::new("_vbat", 2),
    VariableSpec::new("_imot", 2),
    VariableSpec::new("motor.left.speed", 1),
    VariableSpec::new("motor.right.speed", 1),
    VariableSpec::new("motor.left.pwm", 1),
    VariableSpec::new("motor.right.pwm", 1),
    VariableSpec::new("_integrator", 2),
    VariableSpec::new("acc", 3),
    VariableSpec::new("leds.top", 3),
    VariableSpec::new("leds.bottom.left", 3),
    VariableSpec::new("leds.bottom.right", 3),
    VariableSpec::new("leds.circle", 8),
    VariableSpec::new("temperature", 1),
    VariableSpec::new("rc5.address", 1),
    VariableSpec::new("rc5.command", 1),
    VariableSpec::new("mic.intensity", 1),
    VariableSpec::new("mic.threshold", 1),
    VariableSpec::new("mic._mean", 1),
    VariableSpec::new("timer.period", 2),
    VariableSpec::new("acc._tap", 1),
    VariableSpec::new("sd.present", 1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalEvent {
    pub name: &'static str,
    pub description: &'static str,
}

/// Local events in id order: the id of an event is its index.
pub static THYMIO_EVENTS: &[LocalEvent] = &[
    LocalEvent { name: "button.backward", description: "Backward button state changed" },
    LocalEvent { name: "button.left", description: "Left button state changed" },
    LocalEvent { name: "button.center", description: "Center button state changed" },
    LocalEvent { name: "button.forward", description: "Forward button state changed" },
    LocalEvent { name: "button.right", description: "Right button state changed" },
    LocalEvent { name: "buttons", description: "Buttons values updated" },
    LocalEvent { name: "prox", description: "Proximity values updated" },
    LocalEvent { name: "prox.comm", description: "Data received on the proximity communication" },
    LocalEvent { name: "tap", description: "Tap detected" },
    LocalEvent { name: "acc", description: "Accelerometer values updated" },
    LocalEvent { name: "mic", description: "Microphone above threshold" },
    LocalEvent { name: "sound.finished", description: "Sound playback finished" },
    LocalEvent { name: "temperature", description: "Temperature value updated" },
    LocalEvent { name: "rc5", description: "RC5 message received" },
    LocalEvent { name: "motor", description: "Motor timer" },
    LocalEvent { name: "timer0", description: "Timer 0" },
    LocalEvent { name: "timer1", description: "Timer 1" },
];

/// Id of the local event called `name`.
pub fn event_id(name: &str) -> Option<u16> {
    THYMIO_EVENTS
        .iter()
        .position(|event| event.name == name)
        .and_then(|index| u16::try_from(index).ok())
}

const fn hardware(
    name: &'static str,
    description: &'static str,
    params: &'static [NativeParam],
) -> NativeFunction {
    NativeFunction {
        name,
        description,
        params,
        fun: None,
    }
}

const N: &[NativeParam] = &[NativeParam::new("n", 1)];
const RGB: &[NativeParam] = &[
    NativeParam::new("r", 1),
    NativeParam::new("g", 1),
    NativeParam::new("b", 1),
];
const EIGHT_LEDS: &[NativeParam] = &[
    NativeParam::new("l0", 1),
    NativeParam::new("l1", 1),
    NativeParam::new("l2", 1),
    NativeParam::new("l3", 1),
    NativeParam::new("l4", 1),
    NativeParam::new("l5", 1),
    NativeParam::new("l6", 1),
    NativeParam::new("l7", 1),
];
const LED_BRIGHTNESS: &[NativeParam] = &[NativeParam::new("led", 1), NativeParam::new("br", 1)];
const FREQUENCY: &[NativeParam] = &[NativeParam::new("Hz", 1), NativeParam::new("ds", 1)];
const FOUR_LEDS: &[NativeParam] = &[
    NativeParam::new("led 0", 1),
    NativeParam::new("led 1", 1),
    NativeParam::new("led 2", 1),
    NativeParam::new("led 3", 1),
];
const TWO_LEDS: &[NativeParam] = &[NativeParam::new("led 0", 1), NativeParam::new("led 1", 1)];
const LED: &[NativeParam] = &[NativeParam::new("led", 1)];
const RED_BLUE: &[NativeParam] = &[NativeParam::new("red", 1), NativeParam::new("blue", 1)];
const WAVE: &[NativeParam] = &[NativeParam::new("wave", 142)];
const STATE: &[NativeParam] = &[NativeParam::new("state", 1)];
const OPEN: &[NativeParam] = &[NativeParam::new("number", 1), NativeParam::new("status", 1)];
const WRITE: &[NativeParam] = &[NativeParam::new("data", -1), NativeParam::new("written", 1)];
const READ: &[NativeParam] = &[NativeParam::new("data", -1), NativeParam::new("read", 1)];
const SEEK: &[NativeParam] = &[NativeParam::new("position", 1), NativeParam::new("status", 1)];

pub static THYMIO_NATIVES: &[NativeFunction] = &[
    hardware("_system_reboot", "Reboot the microcontroller", &[]),
    hardware("_system_settings_read", "Read a setting", &[]),
    hardware("_system_settings_write", "Write a setting", &[]),
    hardware("_system_settings_flash", "Write the settings to flash", &[]),
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
    hardware("_leds.set", "Set the led", LED_BRIGHTNESS),
    hardware("sound.record", "Start recording of rN.wav", N),
    hardware("sound.play", "Start playback of pN.wav", N),
    hardware("sound.replay", "Start playback of rN.wav", N),
    hardware("sound.system", "Start playing system sound", N),
    hardware("leds.circle", "Set circular leds", EIGHT_LEDS),
    hardware("leds.top", "Set top RGB led", RGB),
    hardware("leds.bottom.left", "Set bottom-left RGB led", RGB),
    hardware("leds.bottom.right", "Set bottom-right RGB led", RGB),
    hardware("sound.freq", "Play frequency", FREQUENCY),
    hardware("leds.buttons", "Set buttons leds", FOUR_LEDS),
    hardware("leds.prox.h", "Set horizontal proximity leds", EIGHT_LEDS),
    hardware("leds.prox.v", "Set vertical proximity leds", TWO_LEDS),
    hardware("leds.rc", "Set rc led", LED),
    hardware("leds.sound", "Set sound led", LED),
    hardware("leds.temperature", "Set ntc led", RED_BLUE),
    hardware("sound.wave", "Set the primary wave of the tone generator", WAVE),
    hardware("prox.comm.enable", "Enable or disable the proximity communication", STATE),
    hardware("sd.open", "Open a file on the SD card", OPEN),
    hardware("sd.write", "Write data to the opened file", WRITE),
    hardware("sd.read", "Read data from the opened file", READ),
    hardware("sd.seek", "Seek the opened file", SEEK),
    hardware("_rf.nodeid", "Set the radio node id", &[]),
    hardware("_poweroff", "Power off", &[]),
];
