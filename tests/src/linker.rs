use std::fs;
use std::path::{Path, PathBuf};

use common::srec;
use emu_lib::{loader, Emulator};
use rom_lib::{build_lib, link, parse_symbol_file, LIB_BASE, LIB_PAGE_SIZE};

fn build_test_lib(dir: &Path) -> (PathBuf, PathBuf) {
    let double = dir.join("double.pal");
    let negate = dir.join("negate.pal");
    fs::write(&double, "DOUBLE, 0\nCLL RAL\nJMP I DOUBLE\n").unwrap();
    fs::write(&negate, "NEGATE, 0\nCMA IAC\nJMP I NEGATE\n").unwrap();

    let rom = dir.join("lib.rom");
    let sym = dir.join("lib.sym");
    build_lib(&[double, negate], LIB_BASE, LIB_PAGE_SIZE, &rom, &sym).unwrap();
    (rom, sym)
}

#[test]
fn symbols_match_routine_entries() {
    let dir = tempfile::tempdir().unwrap();
    let (rom, sym) = build_test_lib(dir.path());

    let symbols = parse_symbol_file(&fs::read_to_string(&sym).unwrap(), &sym).unwrap();
    let (words, _) = srec::decode_words(&fs::read_to_string(&rom).unwrap()).unwrap();

    // Each routine's first statement occupies its symbol's address.
    for name in ["DOUBLE", "NEGATE"] {
        let addr = symbols.get(name).unwrap();
        assert!(words.contains_key(&addr), "{name} entry missing");
    }
    assert_eq!(symbols.get("DOUBLE"), Some(0o200));
    assert_eq!(symbols.get("NEGATE"), Some(0o203));
}

#[test]
fn linked_program_runs() {
    let dir = tempfile::tempdir().unwrap();
    let (rom, sym) = build_test_lib(dir.path());

    let app = dir.path().join("app.pal");
    fs::write(
        &app,
        "*0400\n\
         START, CLA\n\
         TAD VAL\n\
         JMS I DPTR\n\
         DCA RESULT\n\
         CLA\n\
         TAD RESULT\n\
         JMS I NPTR\n\
         DCA RESULT2\n\
         HLT\n\
         VAL, 0021\n\
         RESULT, 0\n\
         RESULT2, 0\n\
         DPTR, LINK DOUBLE\n\
         NPTR, LINK NEGATE\n",
    )
    .unwrap();

    let out = dir.path().join("app.rom");
    link(&rom, &sym, &app, &out).unwrap();

    let mut emu = Emulator::new();
    let start = loader::load_image(emu.state_mut(), &fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(start, Some(0o400));

    emu.run(1_000);
    assert!(emu.registers().halt);

    // 021 doubled is 042; negated it is 7736.
    assert_eq!(emu.state().mem_read(0o412), 0o42);
    assert_eq!(emu.state().mem_read(0o413), 0o7736);
}
