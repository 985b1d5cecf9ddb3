use crate::assembler::{Assembler, AssemblerError, AssemblerErrorKind};
use crate::device::VariableDescriptor;
use crate::isa::{BinaryOp, UnaryOp};
use crate::native::MATH_NATIVES;
use crate::symbols::{SymbolTable, TOP_DATA, USER_DATA};
use crate::ProgramWord;

extern crate std;
use std::vec::Vec as StdVec;

fn assemble(source: &str) -> Result<StdVec<ProgramWord>, AssemblerError> {
    let mut symbols: SymbolTable<32> = SymbolTable::new();
    let mut asm = Assembler::new(&mut symbols);
    Ok(asm.assemble::<64>(source)?.to_vec())
}

fn error_at(source: &str, line: u32, kind: AssemblerErrorKind) {
    let err = assemble(source).unwrap_err();
    assert_eq!(err, AssemblerError::WithLine { line, kind });
    assert_eq!(err.line_number(), Some(line));
    assert_eq!(*err.error_kind(), kind);
}

const LAYOUT: &[VariableDescriptor<'static>] = &[
    VariableDescriptor { name: "speed", offset: 0, length: 1 },
    VariableDescriptor { name: "leds", offset: 1, length: 8 },
];

fn seeded() -> SymbolTable<64> {
    SymbolTable::seeded(LAYOUT, MATH_NATIVES, 40).unwrap()
}

#[test]
fn assembles_straight_line_code() {
    let bytecode = assemble(
        "
    dc 3, 0xffff, 3   ; event table
    push.s 5
    push.s 3
    add
    store 10
    stop
",
    )
    .unwrap();
    assert_eq!(bytecode, [3, 0xffff, 3, 0x1005, 0x1003, 0x8002, 0x400a, 0x0000]);
}

#[test]
fn small_immediate_overflow_reports_line() {
    error_at("stop\n\npush.s 5000\n", 3, AssemblerErrorKind::SmallIntegerOverflow);
}

#[test]
fn small_immediate_bounds() {
    assert_eq!(assemble("push.s -2048").unwrap(), [0x1800]);
    assert_eq!(assemble("push.s 2047").unwrap(), [0x17ff]);
    assert_eq!(assemble("push.s -1").unwrap(), [0x1fff]);
    error_at("push.s 2048", 1, AssemblerErrorKind::SmallIntegerOverflow);
    error_at("push.s -2049", 1, AssemblerErrorKind::SmallIntegerOverflow);
}

#[test]
fn large_immediate_bounds() {
    assert_eq!(assemble("push -32768").unwrap(), [0x2000, 0x8000]);
    assert_eq!(assemble("push 65535").unwrap(), [0x2000, 0xffff]);
    error_at("push 65536", 1, AssemblerErrorKind::IntegerOverflow);
    error_at("push -32769", 1, AssemblerErrorKind::IntegerOverflow);
}

#[test]
fn forward_and_backward_labels() {
    let bytecode = assemble(
        "
    jump end
back:
    stop
    jump back
end: stop
",
    )
    .unwrap();
    assert_eq!(bytecode, [0x9003, 0x0000, 0x9fff, 0x0000]);
}

#[test]
fn labels_resolve_to_addresses() {
    let mut symbols: SymbolTable<8> = SymbolTable::new();
    let mut asm = Assembler::new(&mut symbols);
    asm.assemble::<16>("push 1\nhere: stop\nthere:\n").unwrap();
    assert_eq!(asm.symbols().get("here"), Some(2));
    assert_eq!(asm.symbols().get("there"), Some(3));
}

#[test]
fn assembly_is_deterministic() {
    let source = "
    dc 3, 0xffff, start
start:
    load.ind 0 size=4
    jump.if.not lt start
    callsub sub
    stop
sub:
    ret
";
    let first = assemble(source).unwrap();
    assert_eq!(assemble(source).unwrap(), first);

    let mut symbols: SymbolTable<8> = SymbolTable::new();
    let mut asm = Assembler::new(&mut symbols);
    let again = asm.assemble::<64>(source).unwrap();
    let twice = asm.assemble::<64>(source).unwrap();
    assert_eq!(again, twice);
    assert_eq!(&again[..], &first[..]);
}

#[test]
fn equ_defines_constants() {
    assert_eq!(assemble("limit: equ 7\npush.s limit").unwrap(), [0x1007]);
}

#[test]
fn equ_forward_reference_sees_label_address() {
    // the first pass records `value` as a label at address 1
    assert_eq!(assemble("dc value\nvalue: equ 7\ndc value").unwrap(), [1, 7]);
}

#[test]
fn equ_needs_label() {
    error_at("stop\nequ 7", 2, AssemblerErrorKind::MissingLabel);
}

#[test]
fn unknown_symbol() {
    error_at("stop\npush.s nowhere", 2, AssemblerErrorKind::UnknownSymbol);
}

#[test]
fn unknown_instruction() {
    error_at("frobnicate 1", 1, AssemblerErrorKind::UnknownInstruction);
}

#[test]
fn wrong_argument_count() {
    error_at("add 1", 1, AssemblerErrorKind::WrongArgumentCount);
    error_at("load", 1, AssemblerErrorKind::WrongArgumentCount);
    error_at("load.ind 1", 1, AssemblerErrorKind::WrongArgumentCount);
    error_at("emit 1 2", 1, AssemblerErrorKind::WrongArgumentCount);
    error_at("stop 0", 1, AssemblerErrorKind::WrongArgumentCount);
}

#[test]
fn logical_not_is_rejected() {
    error_at("push.s 1\nnot", 2, AssemblerErrorKind::NotImplemented);
}

#[test]
fn unary_and_binary_mnemonics() {
    for op in [UnaryOp::Neg, UnaryOp::Abs, UnaryOp::BitNot] {
        assert_eq!(assemble(op.mnemonic()).unwrap(), [ProgramWord::from(op)]);
    }
    let binary = [
        BinaryOp::ShiftLeft,
        BinaryOp::ShiftRight,
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mult,
        BinaryOp::Div,
        BinaryOp::Mod,
        BinaryOp::BitOr,
        BinaryOp::BitXor,
        BinaryOp::BitAnd,
        BinaryOp::Equal,
        BinaryOp::NotEqual,
        BinaryOp::GreaterThan,
        BinaryOp::GreaterEqual,
        BinaryOp::LessThan,
        BinaryOp::LessEqual,
        BinaryOp::Or,
        BinaryOp::And,
    ];
    for (code, op) in binary.into_iter().enumerate() {
        let expected = 0x8000 | code as ProgramWord;
        assert_eq!(ProgramWord::from(op), expected);
        assert_eq!(assemble(op.mnemonic()).unwrap(), [expected]);
    }
}

#[test]
fn conditional_branches() {
    assert_eq!(assemble("jump.if.not gt 5").unwrap(), [0xa00c, 5]);
    assert_eq!(assemble("do.jump.when.not lt 10").unwrap(), [0xa10e, 10]);
    assert_eq!(assemble("dont.jump.when.not eq 0").unwrap(), [0xa30a, 0]);
    assert_eq!(assemble("stop\nstop\njump.if.not ne 0").unwrap(), [0, 0, 0xa00b, 0xfffe]);
}

#[test]
fn branch_needs_comparison() {
    error_at("jump.if.not nothing 3", 1, AssemblerErrorKind::UnknownCondition);
    error_at("jump.if.not neg 3", 1, AssemblerErrorKind::UnknownCondition);
    error_at("jump.if.not 12 3", 1, AssemblerErrorKind::UnknownCondition);
}

#[test]
fn jump_range() {
    assert_eq!(assemble("jump 2047").unwrap(), [0x97ff]);
    error_at("jump 2048", 1, AssemblerErrorKind::JumpOutOfRange);
    error_at("jump.if.not eq 40000", 1, AssemblerErrorKind::JumpOutOfRange);
}

#[test]
fn payload_ranges() {
    assert_eq!(assemble("load 4095").unwrap(), [0x3fff]);
    error_at("load 4096", 1, AssemblerErrorKind::DataAddressOutOfRange);
    error_at("store -1", 1, AssemblerErrorKind::DataAddressOutOfRange);
    error_at("callnat 4096", 1, AssemblerErrorKind::NativeIdOutOfRange);
    error_at("callsub 5000", 1, AssemblerErrorKind::SubroutineAddressOutOfRange);
    error_at("emit 4096 0 0", 1, AssemblerErrorKind::EventIdOutOfRange);
}

#[test]
fn number_literal_forms() {
    assert_eq!(assemble("push.s +5").unwrap(), [0x1005]);
    assert_eq!(assemble("dc 0X1F, 0x1f, +0X10, -0X2").unwrap(), [31, 31, 16, 0xfffe]);
    error_at("push.s +0x", 1, AssemblerErrorKind::UnknownSymbol);
}

#[test]
fn keyed_operands() {
    assert_eq!(assemble("load.ind 5 size=3").unwrap(), [0x5005, 3]);
    assert_eq!(assemble("store.ind 7, 2").unwrap(), [0x6007, 2]);
    assert_eq!(assemble("emit id=1 data=2 count=3").unwrap(), [0xb001, 2, 3]);
}

#[test]
fn data_words() {
    assert_eq!(assemble("dc 0x10, -0x1, 65535").unwrap(), [16, 0xffff, 0xffff]);
    assert_eq!(assemble("dc").unwrap(), StdVec::<ProgramWord>::new());
}

#[test]
fn subroutines() {
    let bytecode = assemble("callsub sub\nstop\nsub: ret").unwrap();
    assert_eq!(bytecode, [0xd002, 0x0000, 0xe000]);
}

#[test]
fn device_symbols() {
    let mut symbols = seeded();
    let mut asm = Assembler::new(&mut symbols);
    let bytecode = asm
        .assemble::<16>(
            "
    load speed
    store.ind leds 8
    push _userdata
    push _topdata
    callnat _nf.math.add
",
        )
        .unwrap();
    assert_eq!(&bytecode[..], &[0x3000, 0x6001, 8, 0x2000, 9, 0x2000, 40, 0xc003]);
}

#[test]
fn seeded_table_contents() {
    let symbols = seeded();
    assert_eq!(symbols.get("leds"), Some(1));
    assert_eq!(symbols.get(USER_DATA), Some(9));
    assert_eq!(symbols.get(TOP_DATA), Some(40));
    assert_eq!(symbols.get("_nf.math.copy"), Some(0));
    assert_eq!(symbols.get("_nf.math.rand"), Some(20));
    assert_eq!(symbols.len(), LAYOUT.len() + MATH_NATIVES.len() + 2);
}

#[test]
fn comments_and_blank_lines() {
    let bytecode = assemble("; header\n\n   \nstop ; end\nret;").unwrap();
    assert_eq!(bytecode, [0x0000, 0xe000]);
}

#[test]
fn syntax_errors() {
    error_at("bad label: stop", 1, AssemblerErrorKind::SyntaxError);
    error_at("push.s (1)", 1, AssemblerErrorKind::SyntaxError);
    error_at("stop\nst*p", 2, AssemblerErrorKind::SyntaxError);
}

#[test]
fn bytecode_capacity() {
    let mut symbols: SymbolTable<4> = SymbolTable::new();
    let mut asm = Assembler::new(&mut symbols);
    let err = asm.assemble::<2>("stop\nstop\nstop").unwrap_err();
    assert_eq!(
        err,
        AssemblerError::WithLine {
            line: 3,
            kind: AssemblerErrorKind::BytecodeTooLarge
        }
    );
}

#[test]
fn symbol_table_capacity() {
    let mut symbols: SymbolTable<1> = SymbolTable::new();
    let mut asm = Assembler::new(&mut symbols);
    let err = asm.assemble::<8>("a: stop\nb: stop").unwrap_err();
    assert_eq!(*err.error_kind(), AssemblerErrorKind::TooManySymbols);

    let long = "a_label_name_that_does_not_fit_in_the_symbol_table_at_all: stop";
    error_at(long, 1, AssemblerErrorKind::NameTooLong);
}
