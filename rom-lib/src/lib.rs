//! ROM building and linking. `build_lib` assembles position-independent
//! library routines, packs them onto pages, and emits a combined image plus
//! a symbol file; `link` patches an application's `LINK` placeholders
//! against that symbol file and merges the two images.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use as_lib::{assemble, AsmError, Assembly, SymbolTable};
use common::srec::{self, SrecError};
use common::word::{self, WORD_MASK};

use log::debug;
use thiserror::Error;

/// Default placement for library ROMs: page 1, one 128-word page at a time.
pub const LIB_BASE: u16 = 0o200;
pub const LIB_PAGE_SIZE: u16 = 0o200;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("{}: origin directives are not allowed in library routines", .file.display())]
    OriginNotAllowed { file: PathBuf },

    #[error("{}: routine is not position-independent", .file.display())]
    NotPositionIndependent { file: PathBuf },

    #[error("{}: routine of {} words does not fit a {}-word page", .file.display(), .size, .page_size)]
    RoutineTooLarge {
        file: PathBuf,
        size: u16,
        page_size: u16,
    },

    #[error("conflicting words at {addr:04o}: {old:04o} vs {new:04o}")]
    MemoryOverlap { addr: u16, old: u16, new: u16 },

    #[error("symbol \"{name}\" defined as both {old:04o} and {new:04o}")]
    DuplicateSymbol { name: String, old: u16, new: u16 },

    #[error("line {line}: unknown LINK symbol \"{name}\"")]
    UnknownLinkSymbol { name: String, line: usize },

    #[error("{}: line {}: bad symbol file entry", .file.display(), .line)]
    BadSymbolFile { file: PathBuf, line: usize },

    #[error("{}: {}", .file.display(), .source)]
    Asm { file: PathBuf, source: AsmError },

    #[error(transparent)]
    Srec(#[from] SrecError),

    #[error("{}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> LinkError + '_ {
    move |source| LinkError::Io {
        path: path.to_owned(),
        source,
    }
}

// Unlike interactive assembly, a linker input with any error is fatal.
fn assemble_strict(source: &str, file: &Path) -> Result<Assembly, LinkError> {
    let wrap = |source: AsmError| LinkError::Asm {
        file: file.to_owned(),
        source,
    };
    let assembly = assemble(source).map_err(wrap)?;
    if let Some(err) = assembly.errors.first() {
        return Err(wrap(err.clone()));
    }
    Ok(assembly)
}

fn merge_words(
    image: &mut BTreeMap<u16, u16>,
    new_words: &BTreeMap<u16, u16>,
) -> Result<(), LinkError> {
    for (&addr, &new) in new_words {
        match image.get(&addr) {
            Some(&old) if old != new => {
                return Err(LinkError::MemoryOverlap { addr, old, new });
            }
            _ => {
                image.insert(addr, new);
            }
        }
    }
    Ok(())
}

fn merge_symbols(symbols: &mut SymbolTable, new_symbols: &SymbolTable) -> Result<(), LinkError> {
    for (name, new) in new_symbols.iter() {
        match symbols.get(name) {
            Some(old) if old != new => {
                return Err(LinkError::DuplicateSymbol {
                    name: name.clone(),
                    old,
                    new,
                });
            }
            _ => {
                symbols.insert(name, new);
            }
        }
    }
    Ok(())
}

////////////////////////////////////////////////////////////////////////////////
// Symbol files: "NAME = 0200" per line, # comments, case-insensitive.

pub fn format_symbol_file(symbols: &SymbolTable) -> String {
    let mut entries: Vec<(&String, u16)> = symbols.iter().collect();
    entries.sort();
    entries
        .iter()
        .map(|(name, val)| format!("{name} = {val:04o}\n"))
        .collect()
}

pub fn parse_symbol_file(text: &str, file: &Path) -> Result<SymbolTable, LinkError> {
    let mut symbols = SymbolTable::new();
    for (line, line_no) in text.lines().zip(1..) {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let bad = || LinkError::BadSymbolFile {
            file: file.to_owned(),
            line: line_no,
        };
        let (name, val) = line.split_once('=').ok_or_else(bad)?;
        let val = word::parse_octal(val.trim()).map_err(|_| bad())?;
        symbols.insert(name.trim(), val);
    }
    Ok(symbols)
}

////////////////////////////////////////////////////////////////////////////////

/// Assemble each library routine twice: once at origin zero to learn its
/// size and check position independence, then at its packed position. The
/// packer never splits a routine across a page boundary.
pub fn build_lib(
    files: &[PathBuf],
    base_addr: u16,
    page_size: u16,
    out_rom: &Path,
    out_sym: &Path,
) -> Result<(), LinkError> {
    let mut image = BTreeMap::new();
    let mut symbols = SymbolTable::new();
    let mut page_base = base_addr;
    let mut offset: u16 = 0;

    for file in files {
        let source = fs::read_to_string(file).map_err(io_err(file))?;
        let has_origin = source
            .lines()
            .any(|line| line.split('/').next().unwrap_or_default().trim_start().starts_with('*'));
        if has_origin {
            return Err(LinkError::OriginNotAllowed { file: file.clone() });
        }

        let sized = assemble_strict(&format!("*0000\n{source}"), file)?;
        let min = sized.words.keys().next().copied().unwrap_or(0);
        let max = sized.words.keys().next_back().copied().unwrap_or(0);
        if min != 0 {
            return Err(LinkError::NotPositionIndependent { file: file.clone() });
        }
        let size = max + 1;
        if size > page_size {
            return Err(LinkError::RoutineTooLarge {
                file: file.clone(),
                size,
                page_size,
            });
        }

        if offset + size > page_size {
            page_base = (page_base + page_size) & WORD_MASK;
            offset = 0;
        }
        let origin = page_base + offset;
        debug!("Placing {} ({size} words) at {origin:04o}", file.display());

        let placed = assemble_strict(&format!("*{origin:04o}\n{source}"), file)?;
        merge_words(&mut image, &placed.words)?;
        merge_symbols(&mut symbols, &placed.symbols)?;
        offset += size;
    }

    fs::write(out_rom, srec::encode(&image, base_addr)).map_err(io_err(out_rom))?;
    fs::write(out_sym, format_symbol_file(&symbols)).map_err(io_err(out_sym))?;
    Ok(())
}

////////////////////////////////////////////////////////////////////////////////

// A line of the form "(label,) LINK SYMBOL" becomes "(label,) 0200": the
// library address is patched in as a literal data word.
fn rewrite_links(source: &str, symbols: &SymbolTable) -> Result<String, LinkError> {
    let mut out = String::new();
    for (line, line_no) in source.lines().zip(1..) {
        let code = line.split('/').next().unwrap_or_default();
        let tokens: Vec<&str> = code.split_whitespace().collect();

        let (label, name) = match tokens.as_slice() {
            [link, name] if link.eq_ignore_ascii_case("LINK") => (None, name),
            [label, link, name] if label.ends_with(',') && link.eq_ignore_ascii_case("LINK") => {
                (Some(*label), name)
            }
            _ => {
                out.push_str(line);
                out.push('\n');
                continue;
            }
        };

        let addr = symbols.get(name).ok_or_else(|| LinkError::UnknownLinkSymbol {
            name: name.to_string(),
            line: line_no,
        })?;
        match label {
            Some(label) => out.push_str(&format!("{label} {addr:04o}\n")),
            None => out.push_str(&format!("{addr:04o}\n")),
        }
    }
    Ok(out)
}

/// Merge an application against a built library: load the library image and
/// symbols, patch the application's `LINK` placeholders, assemble it, and
/// emit the combined image.
pub fn link(lib_rom: &Path, lib_sym: &Path, app: &Path, out_rom: &Path) -> Result<(), LinkError> {
    let rom_text = fs::read_to_string(lib_rom).map_err(io_err(lib_rom))?;
    let (lib_words, _) = srec::decode_words(&rom_text)?;

    let sym_text = fs::read_to_string(lib_sym).map_err(io_err(lib_sym))?;
    let symbols = parse_symbol_file(&sym_text, lib_sym)?;

    let app_source = fs::read_to_string(app).map_err(io_err(app))?;
    let rewritten = rewrite_links(&app_source, &symbols)?;
    let assembly = assemble_strict(&rewritten, app)?;

    let mut image = lib_words;
    merge_words(&mut image, &assembly.words)?;

    fs::write(out_rom, srec::encode(&image, assembly.start_addr())).map_err(io_err(out_rom))?;
    Ok(())
}
