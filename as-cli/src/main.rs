use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use as_lib::{assemble, listing};

use anyhow::{bail, Context, Result};
use clap::Parser;

/// PAL assembler
#[derive(Parser)]
#[command(about)]
struct Args {
    /// Input assembly file
    input: PathBuf,

    /// S-record file to write (defaults to the input with a .srec extension)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Print a listing to stdout
    #[arg(long)]
    listing: bool,

    /// Dump the symbol table (json)
    #[arg(long)]
    symbols: bool,
}

fn main() -> Result<()> {
    env_logger::init();

    let opt = Args::parse();
    let source = fs::read_to_string(&opt.input)
        .with_context(|| format!("reading {}", opt.input.display()))?;
    let assembly = assemble(&source)?;

    if opt.listing {
        print!("{}", listing::render(&assembly));
    }

    if opt.symbols {
        let symbols: BTreeMap<&String, u16> = assembly.symbols.iter().collect();
        println!("{}", serde_json::to_string(&symbols)?);
    }

    if !assembly.errors.is_empty() {
        for err in &assembly.errors {
            eprintln!("{err}");
        }
        bail!("assembly failed with {} errors", assembly.errors.len());
    }

    let outname = opt
        .output
        .unwrap_or_else(|| opt.input.with_extension("srec"));
    fs::write(&outname, assembly.to_srec())
        .with_context(|| format!("writing {}", outname.display()))?;
    Ok(())
}
