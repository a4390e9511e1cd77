//! Motorola S-record transport for 12-bit images. Each word occupies two
//! byte addresses: the low 8 bits at `2w`, the high 4 bits at `2w + 1`.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::word::WORD_MASK;

/// Maximum data bytes per S1 record.
const RUN_BYTES: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SrecError {
    #[error("line {0}: malformed S-record")]
    MalformedSRecord(usize),

    #[error("line {0}: S-record checksum mismatch")]
    InvalidChecksum(usize),

    #[error("line {0}: truncated S-record")]
    TruncatedRecord(usize),
}

////////////////////////////////////////////////////////////////////////////////
// Word map <-> byte map

pub fn words_to_bytes(words: &BTreeMap<u16, u16>) -> BTreeMap<u16, u8> {
    let mut bytes = BTreeMap::new();
    for (&addr, &word) in words {
        bytes.insert(addr * 2, (word & 0xff) as u8);
        bytes.insert(addr * 2 + 1, ((word >> 8) & 0xf) as u8);
    }
    bytes
}

pub fn bytes_to_words(bytes: &BTreeMap<u16, u8>) -> BTreeMap<u16, u16> {
    let mut words: BTreeMap<u16, u16> = BTreeMap::new();
    for (&addr, &val) in bytes {
        let word = words.entry(addr / 2).or_default();
        if addr & 0x1 == 0 {
            *word |= val as u16;
        } else {
            *word |= ((val as u16) & 0xf) << 8;
        }
        *word &= WORD_MASK;
    }
    words
}

////////////////////////////////////////////////////////////////////////////////
// Encode

fn checksum(count: u8, addr: u16, data: &[u8]) -> u8 {
    let mut sum = count as u32 + (addr >> 8) as u32 + (addr & 0xff) as u32;
    for byte in data {
        sum += *byte as u32;
    }
    !(sum as u8)
}

fn emit_s1(out: &mut String, addr: u16, data: &[u8]) {
    let count = (data.len() + 3) as u8;
    out.push_str(&format!("S1{count:02X}{addr:04X}"));
    for byte in data {
        out.push_str(&format!("{byte:02X}"));
    }
    out.push_str(&format!("{:02X}\n", checksum(count, addr, data)));
}

/// Render a word map as S1 records plus an S9 start record. The S9 address
/// field holds the byte address, twice the start word address.
pub fn encode(words: &BTreeMap<u16, u16>, start: u16) -> String {
    let bytes = words_to_bytes(words);

    let mut out = String::new();
    let mut run_addr: u16 = 0;
    let mut run: Vec<u8> = Vec::new();

    for (&addr, &val) in &bytes {
        let contiguous = !run.is_empty() && addr == run_addr + run.len() as u16;
        if !contiguous || run.len() >= RUN_BYTES {
            if !run.is_empty() {
                emit_s1(&mut out, run_addr, &run);
                run.clear();
            }
            run_addr = addr;
        }
        run.push(val);
    }
    if !run.is_empty() {
        emit_s1(&mut out, run_addr, &run);
    }

    let start_bytes = start * 2;
    out.push_str(&format!(
        "S903{start_bytes:04X}{:02X}\n",
        checksum(3, start_bytes, &[])
    ));
    out
}

////////////////////////////////////////////////////////////////////////////////
// Decode

struct Record {
    addr: u16,
    data: Vec<u8>,
}

fn parse_record(line: &str, line_no: usize) -> Result<Record, SrecError> {
    let hex = &line[2..];
    if hex.len() < 2 {
        return Err(SrecError::TruncatedRecord(line_no));
    }
    let byte_at = |i: usize| -> Result<u8, SrecError> {
        let digits = hex
            .get(i * 2..i * 2 + 2)
            .ok_or(SrecError::TruncatedRecord(line_no))?;
        u8::from_str_radix(digits, 16).map_err(|_| SrecError::MalformedSRecord(line_no))
    };

    let count = byte_at(0)? as usize;
    if count < 3 || hex.len() < (count + 1) * 2 {
        return Err(SrecError::TruncatedRecord(line_no));
    }

    let mut sum = count as u32;
    let mut body = Vec::with_capacity(count - 1);
    for i in 1..count {
        let byte = byte_at(i)?;
        sum += byte as u32;
        body.push(byte);
    }
    let cksum = byte_at(count)?;
    if cksum != !(sum as u8) {
        return Err(SrecError::InvalidChecksum(line_no));
    }

    let addr = ((body[0] as u16) << 8) | body[1] as u16;
    Ok(Record {
        addr,
        data: body.split_off(2),
    })
}

/// Parse S1 data records and the S9 terminator. Returns the byte map and the
/// start *word* address recovered from the S9, if present. Unrecognized
/// S-types (S0 headers and the like) are skipped.
pub fn decode(text: &str) -> Result<(BTreeMap<u16, u8>, Option<u16>), SrecError> {
    let mut bytes = BTreeMap::new();
    let mut start = None;

    for (line, line_no) in text.lines().zip(1..) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut chars = line.chars();
        if chars.next() != Some('S') || !chars.next().is_some_and(|c| c.is_ascii_digit()) {
            return Err(SrecError::MalformedSRecord(line_no));
        }

        match &line[..2] {
            "S1" => {
                let rec = parse_record(line, line_no)?;
                for (off, byte) in rec.data.iter().enumerate() {
                    bytes.insert(rec.addr + off as u16, *byte);
                }
            }
            "S9" => {
                let rec = parse_record(line, line_no)?;
                start = Some(rec.addr / 2);
            }
            _ => (),
        }
    }

    Ok((bytes, start))
}

/// [`decode`], then reassemble the byte map into a 12-bit word map.
pub fn decode_words(text: &str) -> Result<(BTreeMap<u16, u16>, Option<u16>), SrecError> {
    let (bytes, start) = decode(text)?;
    Ok((bytes_to_words(&bytes), start))
}

/// True if the text looks like an S-record file: the first non-empty line
/// starts with `S` and a digit.
pub fn sniff(text: &str) -> bool {
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut chars = line.chars();
        return chars.next() == Some('S') && chars.next().is_some_and(|c| c.is_ascii_digit());
    }
    false
}
