use super::*;
use crate::assembler::Assembler;
use crate::device::flags;
use crate::isa::EVENT_ID_INIT;
use crate::message::{Message, MessageId};
use crate::native::{NativeArgs, MATH_NATIVES};
use crate::symbols::SymbolTable;

extern crate std;
use std::string::{String, ToString};
use std::vec::Vec as StdVec;
use std::vec;

const BYTECODE_CAP: usize = 64;
const STACK_CAP: usize = 16;
const VARIABLE_CAP: usize = 32;

type TestDevice = Device<'static, Recorder, BYTECODE_CAP, STACK_CAP, VARIABLE_CAP>;

static VARIABLES: &[VariableSpec<'static>] = &[
    VariableSpec::new("a", 1),
    VariableSpec::new("fired", 1),
    VariableSpec::new("arr", 4),
    VariableSpec::new("r", 3),
    VariableSpec::new("x", 3),
    VariableSpec::new("y", 3),
];

#[derive(Default)]
struct Recorder {
    emitted: StdVec<(ProgramWord, StdVec<Value>)>,
    changes: StdVec<(String, usize, Value, Value, StdVec<Value>)>,
    written: StdVec<StdVec<u8>>,
    native_calls: StdVec<String>,
    intercept: Option<&'static str>,
    resets: usize,
    next_random: Value,
}

impl Host for Recorder {
    fn emit(&mut self, event_id: ProgramWord, payload: &[Value]) {
        self.emitted.push((event_id, payload.to_vec()));
    }

    fn variable_changed(&mut self, change: &VariableChange<'_>) {
        self.changes.push((
            change.name.to_string(),
            change.index,
            change.new_value,
            change.old_value,
            change.old_array.to_vec(),
        ));
    }

    fn native_call(&mut self, name: &str, args: &mut NativeArgs<'_>) -> bool {
        self.native_calls.push(name.to_string());
        if self.intercept == Some(name) {
            let _ = args.set(0, 0, 99);
            return true;
        }
        false
    }

    fn write(&mut self, bytes: &[u8]) {
        self.written.push(bytes.to_vec());
    }

    fn reset(&mut self) {
        self.resets += 1;
    }

    fn random(&mut self) -> Value {
        self.next_random
    }
}

fn new_device() -> TestDevice {
    TestDevice::new(
        DeviceConfig::default(),
        VARIABLES,
        MATH_NATIVES,
        Recorder::default(),
    )
    .unwrap()
}

fn load(words: &[ProgramWord]) -> TestDevice {
    let mut device = new_device();
    device.set_bytecode(0, words).unwrap();
    device
}

fn assemble(source: &str) -> StdVec<ProgramWord> {
    let device = new_device();
    let mut symbols: SymbolTable<64> = SymbolTable::seeded(
        device.variable_layout(),
        device.natives(),
        device.variable_size(),
    )
    .unwrap();
    let mut asm = Assembler::new(&mut symbols);
    let bytecode = asm.assemble::<BYTECODE_CAP>(source).unwrap();
    bytecode[..].to_vec()
}

fn free_run(device: &mut TestDevice, event_id: ProgramWord) -> Result<(), MachineError> {
    device.set_step_by_step(false);
    assert!(device.setup_event(event_id));
    device.run()
}

fn written_messages(device: &TestDevice) -> StdVec<Message<16>> {
    device
        .host()
        .written
        .iter()
        .map(|bytes| Message::<16>::deserialize(bytes).unwrap().unwrap().0)
        .collect()
}

#[test]
fn push_add_store() -> Result<(), MachineError> {
    // push.s 5, push.s 3, add, store 10
    let mut device = load(&[3, EVENT_ID_INIT, 3, 0x1005, 0x1003, 0x8002, 0x400a, 0x0000]);
    device.reset();
    device.step()?;
    device.step()?;
    device.step()?;
    assert_eq!(device.stack(), &[8]);
    device.step()?;
    assert_eq!(device.variable_data()[10], 8);
    assert!(device.stack().is_empty());
    device.step()?;
    assert!(!device.is_event_active());
    Ok(())
}

#[test]
fn setup_event_finds_entry_point() {
    let mut device = load(&[3, 42, 7, 0, 0, 0, 0, 0]);
    assert!(!device.setup_event(99));
    assert_eq!(device.pc(), 0);
    assert!(!device.is_event_active());

    assert!(device.setup_event(42));
    assert_eq!(device.pc(), 7);
    assert!(device.is_event_active());

    assert!(!device.setup_event(99));
    assert_eq!(device.pc(), 7);
    assert!(device.is_event_active());
    // an unknown event kills nothing
    assert!(device.host().written.is_empty());
}

#[test]
fn setup_event_reports_killed_event() {
    let mut device = load(&[3, 42, 7, 0, 0, 0, 0, 0]);
    assert!(device.setup_event(42));
    assert!(device.setup_event(42));

    let messages = written_messages(&device);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_id(), Ok(MessageId::EventExecutionKilled));
    assert_eq!(messages[0].source(), device.node_id());
    assert_eq!(messages[0].word(0), Ok(7));
}

const EDGE_PROGRAM: &str = "
    dc 3, 0xffff, start
start:
    load a
    push.s 0
    do.jump.when.not gt done
    load fired
    push.s 1
    add
    store fired
done:
    stop
";

fn fired(device: &TestDevice) -> Value {
    device.variable("fired").unwrap()[0]
}

#[test]
fn when_branch_fires_on_rising_edge_only() -> Result<(), MachineError> {
    let mut device = load(&assemble(EDGE_PROGRAM));
    device.reset();
    free_run(&mut device, EVENT_ID_INIT)?;
    assert_eq!(fired(&device), 0);

    device.set_variable_data(0, &[1])?;
    free_run(&mut device, EVENT_ID_INIT)?;
    assert_eq!(fired(&device), 1);
    free_run(&mut device, EVENT_ID_INIT)?;
    assert_eq!(fired(&device), 1);

    device.set_variable_data(0, &[0])?;
    free_run(&mut device, EVENT_ID_INIT)?;
    device.set_variable_data(0, &[1])?;
    free_run(&mut device, EVENT_ID_INIT)?;
    assert_eq!(fired(&device), 2);
    Ok(())
}

#[test]
fn reset_clears_when_latches() -> Result<(), MachineError> {
    let bytecode = assemble(EDGE_PROGRAM);
    let mut device = load(&bytecode);
    for _ in 0..3 {
        device.reset();
        assert_eq!(fired(&device), 0);
        device.set_variable_data(0, &[1])?;
        free_run(&mut device, EVENT_ID_INIT)?;
        assert_eq!(fired(&device), 1);
        free_run(&mut device, EVENT_ID_INIT)?;
        assert_eq!(fired(&device), 1);
    }
    // latches live beside the code, the bytecode itself never changes
    assert_eq!(device.bytecode(), &bytecode[..]);
    Ok(())
}

#[test]
fn latched_branch_loaded_from_bytecode() {
    let bytecode = assemble(
        "
    dc 3, 0xffff, 3
    load a
    push.s 0
    dont.jump.when.not gt 9
    stop
",
    );
    let device = load(&bytecode);
    assert!(device.is_latched(5));
    assert!(!device.is_latched(3));
}

#[test]
fn reset_zeroes_memory_and_starts_init() {
    let mut device = load(&[3, EVENT_ID_INIT, 3, 0x0000]);
    device.set_variable_data(2, &[5, 6]).unwrap();
    device.reset();
    assert!(device.variable_data().iter().all(|value| *value == 0));
    assert!(device.is_event_active());
    assert_eq!(device.pc(), 3);
    assert_eq!(device.flags(), flags::EVENT_ACTIVE | flags::STEP_BY_STEP);
    assert_eq!(device.host().resets, 1);
}

#[test]
fn step_by_step_runs_one_instruction() -> Result<(), MachineError> {
    let mut device = load(&[3, EVENT_ID_INIT, 3, 0x1001, 0x1002, 0x0000]);
    device.reset();
    device.run()?;
    assert_eq!(device.pc(), 4);
    assert_eq!(device.stack(), &[1]);
    device.run()?;
    assert_eq!(device.pc(), 5);
    Ok(())
}

#[test]
fn indirect_load_checks_bounds() {
    let source = "
    dc 3, 0xffff, 3
    push.s 4
    load.ind arr size=4
    stop
";
    let mut device = load(&assemble(source));
    let err = free_run(&mut device, EVENT_ID_INIT).unwrap_err();
    assert_eq!(
        err,
        MachineError::IndexOutOfBounds {
            pc: 4,
            size: 4,
            index: 4
        }
    );
    assert!(!device.is_event_active());

    let messages = written_messages(&device);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_id(), Ok(MessageId::ArrayAccessOutOfBounds));
    assert_eq!(messages[0].word(0), Ok(4));
    assert_eq!(messages[0].word(1), Ok(4));
    assert_eq!(messages[0].word(2), Ok(4));
}

#[test]
fn indirect_access_rejects_negative_index() {
    let source = "
    dc 3, 0xffff, 3
    push.s 7
    push.s -1
    store.ind arr 4
    stop
";
    let mut device = load(&assemble(source));
    let err = free_run(&mut device, EVENT_ID_INIT).unwrap_err();
    assert!(matches!(err, MachineError::IndexOutOfBounds { index: -1, .. }));
    assert!(device.variable("arr").unwrap().iter().all(|value| *value == 0));
    assert!(device.variable("fired").unwrap().iter().all(|value| *value == 0));
}

#[test]
fn indirect_store_notifies_change() -> Result<(), MachineError> {
    let source = "
    dc 3, 0xffff, 3
    push.s 9
    push.s 2
    store.ind arr 4
    push.s 3
    load.ind arr 4
    stop
";
    let mut device = load(&assemble(source));
    device.set_variable_data(2, &[1, 2, 3, 4])?;
    device.host_mut().changes.clear();
    free_run(&mut device, EVENT_ID_INIT)?;
    assert_eq!(device.variable("arr").unwrap(), &[1, 2, 9, 4]);
    assert_eq!(device.stack(), &[4]);
    assert_eq!(
        device.host().changes,
        vec![("arr".to_string(), 2, 9, 3, vec![1, 2, 3, 4])]
    );
    Ok(())
}

#[test]
fn conditional_loop() -> Result<(), MachineError> {
    let source = "
    dc 3, 0xffff, start
start:
    load a
    push.s 1
    add
    store a
    load a
    push.s 5
    jump.if.not ge start
    stop
";
    let mut device = load(&assemble(source));
    free_run(&mut device, EVENT_ID_INIT)?;
    assert_eq!(device.variable("a"), Some(&[5][..]));
    assert!(device.stack().is_empty());
    Ok(())
}

#[test]
fn subroutine_call_and_return() -> Result<(), MachineError> {
    let source = "
    dc 3, 0xffff, 3
    callsub set_a
    stop
set_a:
    push 1234
    store a
    ret
";
    let mut device = load(&assemble(source));
    free_run(&mut device, EVENT_ID_INIT)?;
    assert_eq!(device.variable("a"), Some(&[1234][..]));
    assert!(device.stack().is_empty());
    assert!(!device.is_event_active());
    Ok(())
}

#[test]
fn jump_skips_forward() -> Result<(), MachineError> {
    let source = "
    dc 3, 0xffff, 3
    jump over
    push.s 1
    store a
over:
    push.s 2
    store fired
    stop
";
    let mut device = load(&assemble(source));
    free_run(&mut device, EVENT_ID_INIT)?;
    assert_eq!(device.variable("a"), Some(&[0][..]));
    assert_eq!(device.variable("fired"), Some(&[2][..]));
    Ok(())
}

#[test]
fn emit_copies_payload() -> Result<(), MachineError> {
    let source = "
    dc 3, 0xffff, 3
    emit id=2 data=arr count=4
    stop
";
    let mut device = load(&assemble(source));
    device.set_variable_data(2, &[5, 6, 7, 8])?;
    free_run(&mut device, EVENT_ID_INIT)?;
    assert_eq!(device.host().emitted, vec![(2, vec![5, 6, 7, 8])]);
    Ok(())
}

#[test]
fn unary_and_binary_ops() -> Result<(), MachineError> {
    let source = "
    dc 3, 0xffff, 3
    push.s 6
    neg
    push.s -3
    div
    push.s 7
    push.s 4
    mod
    push.s 1
    push.s 4
    sl
    push -32768
    abs
    stop
";
    let mut device = load(&assemble(source));
    free_run(&mut device, EVENT_ID_INIT)?;
    assert_eq!(device.stack(), &[2, 3, 16, -32768]);
    Ok(())
}

#[test]
fn division_by_zero_faults() {
    let mut device = load(&[3, EVENT_ID_INIT, 3, 0x1001, 0x1000, 0x8005, 0x0000]);
    let err = free_run(&mut device, EVENT_ID_INIT).unwrap_err();
    assert_eq!(err, MachineError::DivisionByZero { pc: 5 });
    assert!(!device.is_event_active());
    let messages = written_messages(&device);
    assert_eq!(messages[0].message_id(), Ok(MessageId::DivisionByZero));
    assert_eq!(messages[0].word(0), Ok(5));
}

#[test]
fn modulo_by_zero_faults() {
    let mut device = load(&[3, EVENT_ID_INIT, 3, 0x1007, 0x1000, 0x8006, 0x0000]);
    let err = free_run(&mut device, EVENT_ID_INIT).unwrap_err();
    assert_eq!(err, MachineError::DivisionByZero { pc: 5 });
    assert_eq!(device.stack(), &[] as &[Value]);
}

#[test]
fn reserved_opcode_faults() {
    let mut device = load(&[3, EVENT_ID_INIT, 3, 0xf000]);
    let err = free_run(&mut device, EVENT_ID_INIT).unwrap_err();
    assert_eq!(err, MachineError::ReservedOpcode(0xf000));
    assert!(!device.is_event_active());
}

#[test]
fn unknown_arithmetic_op_faults() {
    let mut device = load(&[3, EVENT_ID_INIT, 3, 0x1001, 0x7005]);
    let err = free_run(&mut device, EVENT_ID_INIT).unwrap_err();
    assert_eq!(err, MachineError::UnknownArithmeticOp(0x7005));
}

#[test]
fn stack_underflow_faults() {
    let mut device = load(&[3, EVENT_ID_INIT, 3, 0x8002]);
    let err = free_run(&mut device, EVENT_ID_INIT).unwrap_err();
    assert_eq!(err, MachineError::StackUnderflow);
}

#[test]
fn stack_overflow_faults() {
    // push.s 1 then jump back to it forever
    let mut device = load(&[3, EVENT_ID_INIT, 3, 0x1001, 0x9fff]);
    let err = free_run(&mut device, EVENT_ID_INIT).unwrap_err();
    assert_eq!(err, MachineError::StackOverflow);
    assert_eq!(device.stack().len(), STACK_CAP);
}

#[test]
fn unknown_native_faults() {
    let mut device = load(&[3, EVENT_ID_INIT, 3, 0xc000 | 100]);
    let err = free_run(&mut device, EVENT_ID_INIT).unwrap_err();
    assert_eq!(err, MachineError::NativeIndexOutOfBounds(100));
}

const ADD_PROGRAM: &str = "
    dc 3, 0xffff, 3
    push.s 3
    push.s y
    push.s x
    push.s r
    callnat _nf.math.add
    stop
";

#[test]
fn native_call_shares_group_size() -> Result<(), MachineError> {
    let mut device = load(&assemble(ADD_PROGRAM));
    device.set_variable_data(9, &[1, 2, 3, 10, 20, 30])?;
    free_run(&mut device, EVENT_ID_INIT)?;
    assert_eq!(device.variable("r"), Some(&[11, 22, 33][..]));
    assert!(device.stack().is_empty());
    assert_eq!(device.host().native_calls, vec!["math.add".to_string()]);
    Ok(())
}

#[test]
fn native_results_go_through_change_notifications() -> Result<(), MachineError> {
    let mut device = load(&assemble(ADD_PROGRAM));
    device.set_variable_data(9, &[1, 2, 3, 10, 20, 30])?;
    device.host_mut().changes.clear();
    free_run(&mut device, EVENT_ID_INIT)?;
    let r_changes: StdVec<_> = device
        .host()
        .changes
        .iter()
        .filter(|change| change.0 == "r")
        .map(|change| (change.1, change.2, change.3))
        .collect();
    assert_eq!(r_changes, vec![(0, 11, 0), (1, 22, 0), (2, 33, 0)]);
    // inputs are written back too
    assert_eq!(device.host().changes.len(), 9);
    Ok(())
}

#[test]
fn host_can_intercept_native_call() -> Result<(), MachineError> {
    let mut device = load(&assemble(ADD_PROGRAM));
    device.host_mut().intercept = Some("math.add");
    device.set_variable_data(9, &[1, 2, 3, 10, 20, 30])?;
    free_run(&mut device, EVENT_ID_INIT)?;
    assert_eq!(device.variable("r"), Some(&[99, 0, 0][..]));
    Ok(())
}

#[test]
fn native_rand_uses_host() -> Result<(), MachineError> {
    let source = "
    dc 3, 0xffff, 3
    push.s 2
    push.s arr
    callnat _nf.math.rand
    stop
";
    let mut device = load(&assemble(source));
    device.host_mut().next_random = 17;
    free_run(&mut device, EVENT_ID_INIT)?;
    assert_eq!(device.variable("arr"), Some(&[17, 17, 0, 0][..]));
    Ok(())
}

#[test]
fn breakpoint_pauses_free_run() -> Result<(), MachineError> {
    let mut device = load(&[3, EVENT_ID_INIT, 3, 0x1001, 0x1002, 0x1003, 0x0000]);
    assert!(device.set_breakpoint(5));
    assert!(!device.set_breakpoint(BYTECODE_CAP));
    free_run(&mut device, EVENT_ID_INIT)?;
    assert_eq!(device.pc(), 5);
    assert!(device.is_step_by_step());
    assert!(device.is_event_active());
    assert_eq!(device.stack(), &[1, 2]);

    device.clear_breakpoint(5);
    assert!(device.breakpoints().is_empty());
    device.set_step_by_step(false);
    device.run()?;
    assert!(!device.is_event_active());
    assert_eq!(device.stack(), &[1, 2, 3]);
    Ok(())
}

#[test]
fn stop_pauses_device() {
    let mut device = load(&[3, EVENT_ID_INIT, 3, 0x0000]);
    device.reset();
    device.set_step_by_step(false);
    device.stop();
    assert_eq!(device.flags(), flags::STEP_BY_STEP);
}

#[test]
fn bytecode_grows_and_zero_fills() {
    let mut device = new_device();
    device.set_bytecode(2, &[7, 8]).unwrap();
    assert_eq!(device.bytecode(), &[0, 0, 7, 8]);
    device.set_bytecode(0, &[1]).unwrap();
    assert_eq!(device.bytecode(), &[1, 0, 7, 8]);
    assert_eq!(
        device.set_bytecode(BYTECODE_CAP - 1, &[1, 2]),
        Err(MachineError::BytecodeTooLarge)
    );
}

#[test]
fn variables_must_fit() {
    let specs = [VariableSpec::new("big", VARIABLE_CAP + 1)];
    let result = Device::<NullHost, 8, 8, VARIABLE_CAP>::new(
        DeviceConfig::default(),
        &specs,
        &[],
        NullHost,
    );
    assert!(matches!(result, Err(MachineError::VariablesTooLarge)));
}

#[test]
fn variable_layout_is_sequential() {
    let device = new_device();
    let layout: StdVec<(&str, usize, usize)> = device
        .variable_layout()
        .iter()
        .map(|descriptor| (descriptor.name, descriptor.offset, descriptor.length))
        .collect();
    assert_eq!(
        layout,
        vec![
            ("a", 0, 1),
            ("fired", 1, 1),
            ("arr", 2, 4),
            ("r", 6, 3),
            ("x", 9, 3),
            ("y", 12, 3)
        ]
    );
    assert_eq!(device.user_data_size(), 15);
    assert_eq!(device.variable("missing"), None);
}

#[test]
fn out_of_range_store_is_rejected() {
    let mut device = new_device();
    assert_eq!(
        device.set_variable_data(VARIABLE_CAP - 1, &[1, 2]),
        Err(MachineError::OutOfBoundsVariableAccess(VARIABLE_CAP + 1))
    );
}

#[test]
fn thymio_description_fits_device() {
    use crate::thymio::{event_id, ThymioDevice, THYMIO_NATIVES, THYMIO_VARIABLES, THYMIO_VARIABLE_SIZE};

    let device: ThymioDevice<'static, NullHost> =
        ThymioDevice::new(DeviceConfig::default(), THYMIO_VARIABLES, THYMIO_NATIVES, NullHost)
            .unwrap();
    assert!(device.user_data_size() <= THYMIO_VARIABLE_SIZE);
    assert_eq!(device.variable("event.args").map(<[Value]>::len), Some(32));

    let symbols: SymbolTable<128> = SymbolTable::seeded(
        device.variable_layout(),
        device.natives(),
        device.variable_size(),
    )
    .unwrap();
    assert_eq!(symbols.get("_nf.math.copy"), Some(4));
    assert_eq!(symbols.get("_nf._poweroff"), Some(48));
    assert_eq!(symbols.get("_topdata"), Some(620));

    assert_eq!(event_id("button.backward"), Some(0));
    assert_eq!(event_id("prox"), Some(6));
    assert_eq!(event_id("timer1"), Some(16));
    assert_eq!(event_id("nope"), None);
}

#[test]
fn native_params_may_share_one_large_array() -> Result<(), MachineError> {
    use crate::thymio::{ThymioDevice, THYMIO_NATIVES, THYMIO_VARIABLES};

    let mut device: ThymioDevice<'static, NullHost> =
        ThymioDevice::new(DeviceConfig::default(), THYMIO_VARIABLES, THYMIO_NATIVES, NullHost)?;
    let mut symbols: SymbolTable<128> = SymbolTable::seeded(
        device.variable_layout(),
        device.natives(),
        device.variable_size(),
    )
    .unwrap();
    // r = r + r over one 400 word array past the named variables
    let source = "
    dc 3, 0xffff, 3
    push 400
    push _userdata
    push _userdata
    push _userdata
    callnat _nf.math.add
    stop
";
    let bytecode = Assembler::new(&mut symbols).assemble::<32>(source).unwrap();
    device.set_bytecode(0, &bytecode)?;

    let start = device.user_data_size();
    let values: StdVec<Value> = (0..400).collect();
    device.set_variable_data(start, &values)?;
    device.set_step_by_step(false);
    assert!(device.setup_event(EVENT_ID_INIT));
    device.run()?;

    let doubled: StdVec<Value> = values.iter().map(|value| value * 2).collect();
    assert_eq!(&device.variable_data()[start..start + 400], &doubled[..]);
    Ok(())
}
