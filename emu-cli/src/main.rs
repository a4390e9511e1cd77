use std::fs;
use std::path::PathBuf;

use emu_lib::io::lpt::Lpt;
use emu_lib::io::rx8e::Rx8e;
use emu_lib::io::tc08::Tc08;
use emu_lib::{loader, Emulator};

use anyhow::{Context, Result};
use clap::Parser;

/// PDP-8 emulator
#[derive(Parser)]
#[command(about)]
struct Args {
    /// Image to execute (octal text or S-records)
    image: PathBuf,

    /// Start address (octal); defaults to the image's start record, or 0200
    #[arg(long, value_parser = parse_octal_arg)]
    start: Option<u16>,

    /// Stop after this many instructions
    #[arg(long, default_value_t = 100_000_000)]
    max_steps: usize,

    /// Attach the line printer to a file
    #[arg(long)]
    lpt: Option<PathBuf>,

    /// Attach a TC08 DECtape image to unit 0
    #[arg(long)]
    tc08: Option<PathBuf>,

    /// Attach an RX8E floppy image to unit 0
    #[arg(long)]
    rx8e: Option<PathBuf>,
}

fn parse_octal_arg(text: &str) -> Result<u16, String> {
    common::word::parse_octal(text).map_err(|err| err.to_string())
}

fn main() -> Result<()> {
    env_logger::init();

    let opt = Args::parse();
    let mut emu = Emulator::new();

    if let Some(path) = &opt.lpt {
        emu.set_lpt(Lpt::attach(path)?);
    }
    if let Some(path) = &opt.tc08 {
        let mut tc08 = Tc08::new();
        tc08.attach(0, path, true)?;
        emu.set_tc08(tc08);
    }
    if let Some(path) = &opt.rx8e {
        let mut rx8e = Rx8e::new();
        rx8e.attach(0, path, true)?;
        emu.set_rx8e(rx8e);
    }

    let text = fs::read_to_string(&opt.image)
        .with_context(|| format!("reading {}", opt.image.display()))?;
    let image_start = loader::load_image(emu.state_mut(), &text)?;
    emu.set_pc(opt.start.or(image_start).unwrap_or(0o200));

    let steps = emu.run(opt.max_steps);

    let regs = emu.registers();
    println!(
        "\n{steps} steps; PC {:04o} AC {:04o} MQ {:04o} L {} HALT {}",
        regs.pc, regs.ac, regs.mq, regs.link as u8, regs.halt as u8
    );
    Ok(())
}
