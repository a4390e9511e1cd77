use std::collections::VecDeque;
use std::io::{stdout, Write};
use std::sync::Mutex;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};

/// Host side of the teletype. Key reads are non-blocking: the keyboard IOTs
/// poll and take whatever has arrived.
pub trait Console: Send + Sync {
    fn key_available(&self) -> bool;
    fn read_key(&self) -> Option<u8>;
    fn write_char(&self, val: u8);
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Default)]
pub struct StdConsole {
    pending: Mutex<VecDeque<u8>>,
}

impl StdConsole {
    pub fn new() -> Self {
        Default::default()
    }

    // Drain whatever crossterm has queued into our own buffer. Poll failures
    // (headless hosts) are treated as "no key available".
    fn poll_keys(&self) {
        let mut pending = self.pending.lock().unwrap();
        while matches!(event::poll(Duration::ZERO), Ok(true)) {
            let Ok(ev) = event::read() else {
                return;
            };
            let Event::Key(key) = ev else {
                continue;
            };
            if matches!(key.kind, KeyEventKind::Release) {
                continue;
            }
            match key.code {
                KeyCode::Char(ch) if ch.is_ascii() => pending.push_back(ch as u8),
                KeyCode::Enter => pending.push_back(b'\r'),
                _ => (),
            }
        }
    }
}

impl Console for StdConsole {
    fn key_available(&self) -> bool {
        self.poll_keys();
        !self.pending.lock().unwrap().is_empty()
    }

    fn read_key(&self) -> Option<u8> {
        self.poll_keys();
        self.pending.lock().unwrap().pop_front()
    }

    fn write_char(&self, val: u8) {
        let mut out = stdout().lock();
        out.write_all(&[val]).unwrap();
        out.flush().unwrap();
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Default)]
pub struct PipeConsole {
    out_buf: Mutex<VecDeque<u8>>,
    in_buf: Mutex<VecDeque<u8>>,
}

impl PipeConsole {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn take_output(&self) -> VecDeque<u8> {
        std::mem::take(&mut self.out_buf.lock().unwrap())
    }

    pub fn is_out_empty(&self) -> bool {
        self.out_buf.lock().unwrap().is_empty()
    }

    pub fn pop_output(&self) -> Option<u8> {
        self.out_buf.lock().unwrap().pop_front()
    }

    pub fn push_key(&self, val: u8) {
        self.in_buf.lock().unwrap().push_back(val);
    }

    pub fn push_keys(&self, vals: &[u8]) {
        for val in vals.iter() {
            self.push_key(*val);
        }
    }
}

impl Console for PipeConsole {
    fn key_available(&self) -> bool {
        !self.in_buf.lock().unwrap().is_empty()
    }

    fn read_key(&self) -> Option<u8> {
        self.in_buf.lock().unwrap().pop_front()
    }

    fn write_char(&self, val: u8) {
        self.out_buf.lock().unwrap().push_back(val);
    }
}
