use std::sync::Arc;

use as_lib::assemble;
use emu_lib::io::console::PipeConsole;
use emu_lib::{loader, Emulator};

fn assemble_into(emu: &mut Emulator, source: &str) -> u16 {
    let assembly = assemble(source).unwrap();
    assert!(assembly.errors.is_empty(), "{:?}", assembly.errors);
    let start = assembly.start_addr();
    emu.load_words(assembly.words.iter().map(|(&addr, &word)| (addr, word)));
    start
}

#[test]
fn hello_output() {
    let console = Arc::new(PipeConsole::new());
    let mut emu = Emulator::with_console(console.clone());

    // CLA CLL; TAD 0204; TLS; HLT; "A"; 0
    emu.load_words([
        (0o200, 0o7300),
        (0o201, 0o1204),
        (0o202, 0o6046),
        (0o203, 0o7402),
        (0o204, 0o0101),
        (0o205, 0o0000),
    ]);
    emu.set_pc(0o200);
    emu.run(100);

    let regs = emu.registers();
    assert!(regs.halt);
    assert_eq!(regs.ac, 0o101);
    assert_eq!(Vec::from(console.take_output()), vec![0x41]);
}

#[test]
fn auto_index_loop() {
    let mut emu = Emulator::new();
    emu.state_mut().mem_write(0o10, 0o177);
    emu.load_words([(0o200, 0o1410), (0o201, 0o7402)]);
    emu.set_pc(0o200);
    emu.run(100);

    let regs = emu.registers();
    assert_eq!(emu.state().mem_read(0o10), 0o200);
    assert_eq!(regs.ac, 0o1410); // mem[0200] holds the TAD itself
    assert!(!regs.link);
    assert!(regs.halt);
}

#[test]
fn assembled_hello_types_itself() {
    let console = Arc::new(PipeConsole::new());
    let mut emu = Emulator::with_console(console.clone());

    let start = assemble_into(
        &mut emu,
        r#"
*0200
START, CLA CLL
LOOP, TAD I 0010    / auto-index walks the message
SZA                 / zero terminator ends the loop
JMP PRINT
HLT
PRINT, IOT 6046     / TLS
CLA
JMP LOOP
*0300
TEXT "HI"
0
"#,
    );
    emu.state_mut().mem_write(0o10, 0o277); // pre-increments to 0300
    emu.set_pc(start);
    emu.run(1_000);

    assert!(emu.registers().halt);
    assert_eq!(Vec::from(console.take_output()), b"HI".to_vec());
}

#[test]
fn keyboard_skip_and_read() {
    let console = Arc::new(PipeConsole::new());
    let mut emu = Emulator::with_console(console.clone());
    console.push_key(b'Z');

    let start = assemble_into(
        &mut emu,
        r#"
*0200
START, IOT 6032     / KSF: key is waiting, skip
HLT
IOT 6036            / KRB
HLT
"#,
    );
    emu.set_pc(start);
    emu.run(100);

    let regs = emu.registers();
    assert!(regs.halt);
    assert_eq!(regs.pc, 0o204);
    assert_eq!(regs.ac, 0x5a);
}

#[test]
fn keyboard_not_ready_falls_through() {
    let console = Arc::new(PipeConsole::new());
    let mut emu = Emulator::with_console(console.clone());

    let start = assemble_into(
        &mut emu,
        r#"
*0200
START, IOT 6032
HLT
HLT
"#,
    );
    emu.set_pc(start);
    emu.run(100);
    assert_eq!(emu.registers().pc, 0o202);

    // KRB with no key leaves the low byte zero.
    emu.clear_halt();
    let start = assemble_into(
        &mut emu,
        r#"
*0300
GO, CLA CMA         / AC = 7777
IOT 6036
HLT
"#,
    );
    emu.set_pc(start);
    emu.run(100);
    assert_eq!(emu.registers().ac, 0o7400);
}

#[test]
fn assembler_round_trip_through_loader() {
    let source = "*0200\nSTART, CLA CLL\nTAD A\nHLT\nA, 0123\n";
    let assembly = assemble(source).unwrap();
    assert_eq!(
        assembly.words.iter().map(|(&a, &w)| (a, w)).collect::<Vec<_>>(),
        vec![(0o200, 0o7300), (0o201, 0o1203), (0o202, 0o7402), (0o203, 0o0123)]
    );

    let mut emu = Emulator::new();
    let start = loader::load_image(emu.state_mut(), &assembly.to_srec()).unwrap();
    assert_eq!(start, Some(0o200));
    for (&addr, &word) in &assembly.words {
        assert_eq!(emu.state().mem_read(addr), word);
    }

    emu.run(100);
    assert_eq!(emu.registers().ac, 0o123);
    assert!(emu.registers().halt);
}

#[test]
fn saved_image_reloads() {
    let mut emu = Emulator::new();
    assemble_into(&mut emu, "*0200\nSTART, CLA IAC\nHLT\n");

    let saved = loader::save_image(emu.state());
    let mut copy = Emulator::new();
    loader::load_image(copy.state_mut(), &saved).unwrap();

    copy.set_pc(0o200);
    copy.run(100);
    assert_eq!(copy.registers().ac, 1);
    assert!(copy.registers().halt);
}

#[test]
fn isz_boundary() {
    let mut emu = Emulator::new();
    let start = assemble_into(
        &mut emu,
        r#"
*0200
START, ISZ CNT      / 7777 + 1 = 0, skip
HLT
CLA IAC
HLT
CNT, 7777
"#,
    );
    emu.set_pc(start);
    emu.run(100);
    assert_eq!(emu.registers().ac, 1);
    assert_eq!(emu.state().mem_read(0o204), 0);
}

#[test]
fn tad_exact_overflow() {
    let mut emu = Emulator::new();
    let start = assemble_into(
        &mut emu,
        r#"
*0200
START, CLA CLL
TAD A
TAD B
HLT
A, 4000
B, 4000
"#,
    );
    emu.set_pc(start);
    emu.run(100);
    assert_eq!(emu.registers().ac, 0);
    assert!(emu.registers().link);
}

#[test]
fn subroutine_call_and_return() {
    let mut emu = Emulator::new();
    let start = assemble_into(
        &mut emu,
        r#"
*0200
START, CLA
TAD X
JMS TWICE
DCA Y
HLT
X, 0021
Y, 0
TWICE, 0
CLL RAL
JMP I TWICE
"#,
    );
    emu.set_pc(start);
    emu.run(100);
    assert_eq!(emu.state().mem_read(0o206), 0o42);
    assert!(emu.registers().halt);
}
