//! Host-side image loading and saving. Two text formats are understood:
//! whitespace-separated octal words with `@ADDR`/`ADDR:` load-address
//! tokens, and S-records (autodetected by their leading `S<digit>`).

use common::srec::{self, SrecError};
use common::word::{self, MEM_HIGH, MEM_WORDS};

use log::debug;
use thiserror::Error;

use crate::EmulatorState;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("line {line}: bad token \"{token}\"")]
    BadToken { line: usize, token: String },

    #[error(transparent)]
    Srec(#[from] SrecError),
}

/// Load a program image into core. Returns the start address when the image
/// carries one (an S9 record); the PC is set to it as a side effect.
pub fn load_image(state: &mut EmulatorState, text: &str) -> Result<Option<u16>, LoadError> {
    if srec::sniff(text) {
        let (words, start) = srec::decode_words(text)?;
        debug!("Loading {} words from S-records", words.len());
        for (addr, val) in words {
            state.mem_write(addr, val);
        }
        if let Some(pc) = start {
            state.set_pc(pc);
        }
        return Ok(start);
    }

    let mut addr: u16 = 0;
    for (line, line_no) in text.lines().zip(1..) {
        let line = line
            .split(|ch| ch == ';' || ch == '#')
            .next()
            .unwrap_or_default();
        for token in line.split_whitespace() {
            let parse = |text: &str| {
                word::parse_octal(text).map_err(|_| LoadError::BadToken {
                    line: line_no,
                    token: token.to_string(),
                })
            };

            if let Some(rest) = token.strip_prefix('@') {
                addr = parse(rest)?;
            } else if let Some(rest) = token.strip_suffix(':') {
                addr = parse(rest)?;
            } else if let Some((at, val)) = token.split_once(':') {
                addr = parse(at)?;
                state.mem_write(addr, parse(val)?);
                addr = word::inc(addr);
            } else {
                state.mem_write(addr, parse(token)?);
                addr = word::inc(addr);
            }
        }
    }
    Ok(None)
}

/// Format an inclusive word range for the monitor: an octal address column
/// followed by up to eight words per line.
pub fn dump_range(state: &EmulatorState, start: u16, end: u16) -> String {
    let start = start.min(MEM_HIGH) as usize;
    let end = end.min(MEM_HIGH) as usize;

    let mut out = String::new();
    let mut row = start;
    while row <= end {
        out.push_str(&format!("{row:04o}:"));
        for addr in row..=(row + 7).min(end) {
            out.push_str(&format!(" {:04o}", state.mem_read(addr as u16)));
        }
        out.push('\n');
        row += 8;
    }
    out
}

/// Render core as the saved-image text format: one `OADDR: W0 .. W7` line
/// per eight words, rows of zeros elided. [`load_image`] accepts the result.
pub fn save_image(state: &EmulatorState) -> String {
    let mut out = String::new();
    for row in (0..MEM_WORDS as u16).step_by(8) {
        let words: Vec<u16> = (row..row + 8).map(|addr| state.mem_read(addr)).collect();
        if words.iter().all(|&word| word == 0) {
            continue;
        }
        out.push_str(&format!("{row:04o}:"));
        for word in words {
            out.push_str(&format!(" {word:04o}"));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn octal_tokens() {
        let mut state = EmulatorState::new();
        let start = load_image(
            &mut state,
            "@0200 7300 1206  ; comment\n0300:1111 2222 # another\n0400:\n3333\n",
        )
        .unwrap();
        assert_eq!(start, None);
        assert_eq!(state.mem_read(0o200), 0o7300);
        assert_eq!(state.mem_read(0o201), 0o1206);
        assert_eq!(state.mem_read(0o300), 0o1111);
        assert_eq!(state.mem_read(0o301), 0o2222);
        assert_eq!(state.mem_read(0o400), 0o3333);
    }

    #[test]
    fn bad_token() {
        let mut state = EmulatorState::new();
        let err = load_image(&mut state, "0200: 9999\n").unwrap_err();
        assert_eq!(
            err,
            LoadError::BadToken {
                line: 1,
                token: "9999".into()
            }
        );
    }

    #[test]
    fn srec_autodetect_sets_pc() {
        let words: BTreeMap<u16, u16> = [(0o200, 0o7402)].into_iter().collect();
        let text = srec::encode(&words, 0o200);

        let mut state = EmulatorState::new();
        let start = load_image(&mut state, &text).unwrap();
        assert_eq!(start, Some(0o200));
        assert_eq!(state.pc(), 0o200);
        assert_eq!(state.mem_read(0o200), 0o7402);
    }

    #[test]
    fn dump_formats_rows() {
        let mut state = EmulatorState::new();
        state.mem_write(0o201, 0o1234);
        assert_eq!(
            dump_range(&state, 0o200, 0o211),
            "0200: 0000 1234 0000 0000 0000 0000 0000 0000\n\
             0210: 0000 0000\n"
        );
        // The top row clips at the end of core.
        assert_eq!(dump_range(&state, 0o7777, 0o7777), "7777: 0000\n");
    }

    #[test]
    fn save_round_trip() {
        let mut state = EmulatorState::new();
        state.mem_write(0o200, 0o7300);
        state.mem_write(0o207, 0o1234);
        state.mem_write(0o1000, 0o4321);

        let text = save_image(&state);
        assert_eq!(
            text,
            "0200: 7300 0000 0000 0000 0000 0000 0000 1234\n\
             1000: 4321 0000 0000 0000 0000 0000 0000 0000\n"
        );

        let mut back = EmulatorState::new();
        load_image(&mut back, &text).unwrap();
        for addr in 0..MEM_WORDS as u16 {
            assert_eq!(back.mem_read(addr), state.mem_read(addr));
        }
    }
}
