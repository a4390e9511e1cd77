use std::collections::BTreeMap;

use common::opcode::{
    self, Opcode, INDIRECT_BIT, OPR_GROUP1_BASE, OPR_GROUP2_BASE, PAGE_BIT,
};
use common::srec;
use common::word::{self, OFFSET_MASK, PAGE_WORDS, WORD_MASK};

use log::trace;
use thiserror::Error;

use crate::ir::{Stmt, StmtKind, SymbolTable};
use crate::listing::ListingLine;

/// Where the location counter starts when the source has no `*` directive.
pub const DEFAULT_ORIGIN: u16 = 0o200;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AsmError {
    #[error("line {line}: duplicate label \"{name}\": {text}")]
    DuplicateLabel {
        name: String,
        line: usize,
        text: String,
    },

    #[error("line {line}: unknown symbol \"{name}\": {text}")]
    UnknownSymbol {
        name: String,
        line: usize,
        text: String,
    },

    #[error("line {line}: operand {operand:04o} not reachable from page of {addr:04o}: {text}")]
    OperandOutOfRange {
        operand: u16,
        addr: u16,
        line: usize,
        text: String,
    },

    #[error("line {line}: missing operand: {text}")]
    MissingOperand { line: usize, text: String },

    #[error("line {line}: bad origin: {text}")]
    BadOrigin { line: usize, text: String },

    #[error("line {line}: bad operate instruction: {text}")]
    InvalidOperate { line: usize, text: String },

    #[error("line {line}: malformed character literal: {text}")]
    MalformedCharLiteral { line: usize, text: String },

    #[error("empty program")]
    EmptyProgram,
}

/// The output of a compilation: the word map plus everything a listing or a
/// linker wants to know about how it was produced.
#[derive(Debug, Default)]
pub struct Assembly {
    pub words: BTreeMap<u16, u16>,
    pub symbols: SymbolTable,
    pub origins: Vec<u16>,
    pub lines: Vec<ListingLine>,
    pub errors: Vec<AsmError>,
}

impl Assembly {
    /// The S9 start address: the value of `START` if the program defines
    /// it, otherwise the lowest populated address.
    pub fn start_addr(&self) -> u16 {
        self.symbols
            .get("START")
            .unwrap_or_else(|| self.words.keys().next().copied().unwrap_or(0))
    }

    pub fn to_srec(&self) -> String {
        srec::encode(&self.words, self.start_addr())
    }
}

/// Two-pass assembly. Pass-1 failures (labels, origins, unparsable
/// statements) abort; pass-2 failures are collected in [`Assembly::errors`]
/// so a listing can still be rendered.
pub fn assemble(source: &str) -> Result<Assembly, AsmError> {
    let pass1 = Pass1::run(source)?;
    if pass1.stmts.is_empty() {
        return Err(AsmError::EmptyProgram);
    }
    Ok(pass2(pass1))
}

////////////////////////////////////////////////////////////////////////////////
// Pass 1: statement recognition, origins, and the symbol table.

struct Pass1 {
    stmts: Vec<Stmt>,
    symbols: SymbolTable,
    origins: Vec<u16>,
    loc: u16,
}

impl Pass1 {
    fn run(source: &str) -> Result<Pass1, AsmError> {
        let mut pass = Pass1 {
            stmts: Vec::new(),
            symbols: SymbolTable::new(),
            origins: Vec::new(),
            loc: DEFAULT_ORIGIN,
        };

        'lines: for (line, line_no) in source.lines().zip(1..) {
            let line = line.split('/').next().unwrap_or_default();
            for stmt in line.split(';') {
                let stmt = stmt.trim();
                if stmt.is_empty() {
                    continue;
                }
                if stmt == "$" {
                    break 'lines;
                }
                pass.statement(stmt, line_no)?;
            }
        }
        Ok(pass)
    }

    fn emit(&mut self, kind: StmtKind, line_no: usize, text: &str) {
        self.stmts.push(Stmt {
            addr: self.loc,
            kind,
            line_no,
            text: text.to_string(),
        });
        self.loc = word::inc(self.loc);
    }

    fn define(&mut self, name: &str, val: u16, line_no: usize, text: &str) -> Result<(), AsmError> {
        trace!("Defining \"{name}\" = {val:04o}");
        if !self.symbols.insert(name, val) {
            return Err(AsmError::DuplicateLabel {
                name: name.to_string(),
                line: line_no,
                text: text.to_string(),
            });
        }
        Ok(())
    }

    fn statement(&mut self, stmt: &str, line_no: usize) -> Result<(), AsmError> {
        // Origin: "*0200".
        if let Some(rest) = stmt.strip_prefix('*') {
            let addr = word::parse_octal(rest.trim()).map_err(|_| AsmError::BadOrigin {
                line: line_no,
                text: stmt.to_string(),
            })?;
            self.loc = addr;
            self.origins.push(addr);
            return Ok(());
        }

        // Pseudo-op assignment: "NAME = 6046".
        if let Some((name, val)) = stmt.split_once('=') {
            let (name, val) = (name.trim(), val.trim());
            let val = word::parse_octal(val).map_err(|_| AsmError::MissingOperand {
                line: line_no,
                text: stmt.to_string(),
            })?;
            return self.define(name, val, line_no, stmt);
        }

        let mut tokens: Vec<&str> = stmt.split_whitespace().collect();

        // Leading "NAME," defines a label at the current location.
        if let Some(label) = tokens.first().and_then(|tok| tok.strip_suffix(',')) {
            self.define(label, self.loc, line_no, stmt)?;
            tokens.remove(0);
        }
        let Some(&first) = tokens.first() else {
            return Ok(());
        };
        let mnemonic = first.to_ascii_uppercase();

        if mnemonic == "TEXT" {
            return self.text_directive(stmt, line_no);
        }

        if first.starts_with('"') {
            let word = self.char_literal(stmt, line_no)?;
            self.emit(StmtKind::Data(word), line_no, stmt);
            return Ok(());
        }

        if let Some(op) = Opcode::from_mem_ref_mnemonic(&mnemonic) {
            let indirect = tokens[1..].iter().any(|tok| tok.eq_ignore_ascii_case("I"));
            let operands: Vec<&str> = tokens[1..]
                .iter()
                .filter(|tok| !tok.eq_ignore_ascii_case("I"))
                .copied()
                .collect();
            let [operand] = operands.as_slice() else {
                return Err(AsmError::MissingOperand {
                    line: line_no,
                    text: stmt.to_string(),
                });
            };
            self.emit(
                StmtKind::Mem {
                    opcode: op,
                    indirect,
                    operand: operand.to_string(),
                },
                line_no,
                stmt,
            );
            return Ok(());
        }

        if mnemonic == "IOT" {
            let [_, operand] = tokens.as_slice() else {
                return Err(AsmError::MissingOperand {
                    line: line_no,
                    text: stmt.to_string(),
                });
            };
            self.emit(StmtKind::Iot(operand.to_string()), line_no, stmt);
            return Ok(());
        }

        if opcode::group1_bits(&mnemonic).is_some() || opcode::group2_bits(&mnemonic).is_some() {
            let tokens = tokens.iter().map(|tok| tok.to_ascii_uppercase()).collect();
            self.emit(StmtKind::Operate(tokens), line_no, stmt);
            return Ok(());
        }

        if tokens.len() > 1 {
            return Err(AsmError::InvalidOperate {
                line: line_no,
                text: stmt.to_string(),
            });
        }

        if first == "." {
            self.emit(StmtKind::EmitAddress, line_no, stmt);
        } else if let Some(val) = parse_number(first) {
            self.emit(StmtKind::Data(val), line_no, stmt);
        } else {
            self.emit(StmtKind::DataSymbol(first.to_string()), line_no, stmt);
        }
        Ok(())
    }

    // TEXT "..." emits one word per character, low seven bits.
    fn text_directive(&mut self, stmt: &str, line_no: usize) -> Result<(), AsmError> {
        let malformed = || AsmError::MalformedCharLiteral {
            line: line_no,
            text: stmt.to_string(),
        };
        let open = stmt.find('"').ok_or_else(malformed)?;
        let body = &stmt[open + 1..];
        let close = body.find('"').ok_or_else(malformed)?;
        for ch in body[..close].chars() {
            self.emit(StmtKind::Data(ch as u16 & 0x7f), line_no, stmt);
        }
        Ok(())
    }

    fn char_literal(&self, stmt: &str, line_no: usize) -> Result<u16, AsmError> {
        let malformed = || AsmError::MalformedCharLiteral {
            line: line_no,
            text: stmt.to_string(),
        };
        let open = stmt.find('"').ok_or_else(malformed)?;
        let mut chars = stmt[open + 1..].chars();
        let (ch, close) = (chars.next(), chars.next());
        if close != Some('"') || !chars.as_str().trim().is_empty() {
            return Err(malformed());
        }
        Ok(ch.unwrap_or_default() as u16 & 0x7f)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Pass 2: resolution and encoding.

/// Plain numeric token: octal by default, `0x` hex, `#` decimal, and a
/// leading `-` for two's-complement negation.
fn parse_number(token: &str) -> Option<u16> {
    if let Some(rest) = token.strip_prefix('-') {
        let val = parse_number(rest)?;
        return Some(val.wrapping_neg() & WORD_MASK);
    }
    if let Some(rest) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        return u16::from_str_radix(rest, 16).ok().filter(|&val| val <= WORD_MASK);
    }
    if let Some(rest) = token.strip_prefix('#') {
        return rest.parse().ok().filter(|&val| val <= WORD_MASK);
    }
    if token.chars().next().is_some_and(|ch| ch.is_ascii_digit()) {
        return word::parse_octal(token).ok();
    }
    None
}

fn resolve_value(token: &str, stmt: &Stmt, symbols: &SymbolTable) -> Result<u16, AsmError> {
    let unknown = || AsmError::UnknownSymbol {
        name: token.to_string(),
        line: stmt.line_no,
        text: stmt.text.clone(),
    };

    // Dot expressions are relative to the statement's own address.
    if token == "." {
        return Ok(stmt.addr);
    }
    if let Some(off) = token.strip_prefix(".+") {
        let off = word::parse_octal(off).map_err(|_| unknown())?;
        return Ok(stmt.addr.wrapping_add(off) & WORD_MASK);
    }
    if let Some(off) = token.strip_prefix(".-") {
        let off = word::parse_octal(off).map_err(|_| unknown())?;
        return Ok(stmt.addr.wrapping_sub(off) & WORD_MASK);
    }

    if let Some(val) = parse_number(token) {
        return Ok(val);
    }

    let name = token.strip_prefix('&').unwrap_or(token);
    symbols.get(name).ok_or_else(unknown)
}

fn encode_mem_ref(
    opcode: Opcode,
    indirect: bool,
    operand: u16,
    stmt: &Stmt,
) -> Result<u16, AsmError> {
    let page_bit = if operand < PAGE_WORDS {
        0
    } else if word::page_of(operand) == word::page_of(stmt.addr) {
        PAGE_BIT
    } else {
        return Err(AsmError::OperandOutOfRange {
            operand,
            addr: stmt.addr,
            line: stmt.line_no,
            text: stmt.text.clone(),
        });
    };
    let indirect_bit = if indirect { INDIRECT_BIT } else { 0 };
    Ok(opcode.base() | indirect_bit | page_bit | (operand & OFFSET_MASK))
}

// Group 2 wins when any mnemonic is group-2 specific; a lone CLA stays in
// group 1.
fn encode_operate(tokens: &[String], stmt: &Stmt) -> Result<u16, AsmError> {
    let invalid = || AsmError::InvalidOperate {
        line: stmt.line_no,
        text: stmt.text.clone(),
    };

    let group2 = tokens.iter().any(|tok| opcode::is_group2_only(tok));
    let (base, bits_of): (u16, fn(&str) -> Option<u16>) = if group2 {
        (OPR_GROUP2_BASE, opcode::group2_bits)
    } else {
        (OPR_GROUP1_BASE, opcode::group1_bits)
    };

    let mut word = base;
    for token in tokens {
        word |= bits_of(token).ok_or_else(invalid)?;
    }
    Ok(word)
}

fn pass2(pass1: Pass1) -> Assembly {
    let Pass1 {
        stmts,
        symbols,
        origins,
        ..
    } = pass1;

    let mut assembly = Assembly {
        symbols,
        origins,
        ..Default::default()
    };

    for stmt in &stmts {
        let word = match &stmt.kind {
            StmtKind::Data(val) => Ok(*val),
            StmtKind::DataSymbol(token) => resolve_value(token, stmt, &assembly.symbols),
            StmtKind::Iot(token) => resolve_value(token, stmt, &assembly.symbols),
            StmtKind::Mem {
                opcode,
                indirect,
                operand,
            } => resolve_value(operand, stmt, &assembly.symbols)
                .and_then(|addr| encode_mem_ref(*opcode, *indirect, addr, stmt)),
            StmtKind::Operate(tokens) => encode_operate(tokens, stmt),
            StmtKind::EmitAddress => Ok(stmt.addr),
        };

        let word = match word {
            Ok(word) => {
                assembly.words.insert(stmt.addr, word);
                Some(word)
            }
            Err(err) => {
                assembly.errors.push(err);
                None
            }
        };
        assembly.lines.push(ListingLine {
            addr: stmt.addr,
            word,
            line_no: stmt.line_no,
            text: stmt.text.clone(),
        });
    }
    assembly
}
