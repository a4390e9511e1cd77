use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// ROM builder and linker
#[derive(Parser)]
#[command(about)]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Build a library ROM and symbol file from position-independent routines
    BuildLib {
        /// Library routine sources, packed in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Base address of the library (octal)
        #[arg(long, value_parser = parse_octal_arg)]
        base: Option<u16>,

        /// Packing page size in words (octal)
        #[arg(long, value_parser = parse_octal_arg)]
        page_size: Option<u16>,

        /// Output ROM image
        #[arg(long, default_value = "lib.rom")]
        out_rom: PathBuf,

        /// Output symbol file
        #[arg(long, default_value = "lib.sym")]
        out_sym: PathBuf,
    },

    /// Link an application against a built library
    Link {
        lib_rom: PathBuf,
        lib_sym: PathBuf,
        app: PathBuf,

        /// Output ROM image
        #[arg(long, default_value = "app.rom")]
        out: PathBuf,
    },
}

fn parse_octal_arg(text: &str) -> Result<u16, String> {
    common::word::parse_octal(text).map_err(|err| err.to_string())
}

fn main() -> Result<()> {
    env_logger::init();

    match Args::parse().cmd {
        Cmd::BuildLib {
            files,
            base,
            page_size,
            out_rom,
            out_sym,
        } => rom_lib::build_lib(
            &files,
            base.unwrap_or(rom_lib::LIB_BASE),
            page_size.unwrap_or(rom_lib::LIB_PAGE_SIZE),
            &out_rom,
            &out_sym,
        )?,
        Cmd::Link {
            lib_rom,
            lib_sym,
            app,
            out,
        } => rom_lib::link(&lib_rom, &lib_sym, &app, &out)?,
    }
    Ok(())
}
