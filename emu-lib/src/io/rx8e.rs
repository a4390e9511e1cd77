use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use common::word::WORD_MASK;

use log::{debug, trace};

use crate::io::{DeviceError, IotHandler};
use crate::EmulatorState;

pub const TRACKS: u16 = 77;
pub const SECTORS: u16 = 26;
pub const NUM_DRIVES: usize = 2;

const MAX_SECTOR_WORDS: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Density {
    Rx01,
    Rx02,
}

impl Density {
    pub fn words_per_sector(self) -> usize {
        match self {
            Density::Rx01 => 64,
            Density::Rx02 => 128,
        }
    }

    pub fn sector_bytes(self) -> usize {
        match self {
            Density::Rx01 => 128,
            Density::Rx02 => 256,
        }
    }

    pub fn image_bytes(self) -> u64 {
        TRACKS as u64 * SECTORS as u64 * self.sector_bytes() as u64
    }

    fn from_extension(path: &Path) -> Density {
        match path.extension() {
            Some(ext) if ext.eq_ignore_ascii_case("rx02") => Density::Rx02,
            _ => Density::Rx01,
        }
    }

    fn from_size(size: u64) -> Density {
        if size >= Density::Rx02.image_bytes() {
            Density::Rx02
        } else {
            Density::Rx01
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// 12-bit words are packed a word and a half per pair of bytes: even words
// take a low byte plus the low nibble of the next byte, odd words the high
// nibble of that byte plus the following byte.

pub fn pack_sector(words: &[u16], bytes: &mut [u8]) {
    for (n, &word) in words.iter().enumerate() {
        let b = n * 3 / 2;
        if n & 0x1 == 0 {
            bytes[b] = word as u8;
            bytes[b + 1] = (bytes[b + 1] & 0xf0) | ((word >> 8) & 0xf) as u8;
        } else {
            bytes[b] = (bytes[b] & 0x0f) | (((word >> 8) & 0xf) << 4) as u8;
            bytes[b + 1] = word as u8;
        }
    }
}

pub fn unpack_sector(bytes: &[u8], words: &mut [u16]) {
    for (n, word) in words.iter_mut().enumerate() {
        let b = n * 3 / 2;
        *word = if n & 0x1 == 0 {
            bytes[b] as u16 | (((bytes[b + 1] & 0xf) as u16) << 8)
        } else {
            bytes[b + 1] as u16 | (((bytes[b] >> 4) as u16) << 8)
        };
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone)]
pub struct DriveStatus {
    pub path: PathBuf,
    pub density: Density,
    pub size_bytes: u64,
}

struct Drive {
    path: PathBuf,
    density: Density,
    size_bytes: u64,
}

/// RX8E floppy controller. Commands arrive over three IOTs: two LCDs load
/// the sector then the track, INTR primes the sector buffer, and XDR moves
/// one word per invocation until the sector is done.
pub struct Rx8e {
    drives: [Option<Drive>; NUM_DRIVES],

    load_phase: u8,
    pending_unit: usize,
    pending_sector: u16,
    pending_track: u16,
    pending_write: bool,

    buf: [u16; MAX_SECTOR_WORDS],
    word_index: usize,
    words_per_sector: usize,

    transfer_ready: bool,
    done: bool,
    error: bool,
}

impl Rx8e {
    pub const LCD: u16 = 0o6751;
    pub const XDR: u16 = 0o6752;
    pub const STR: u16 = 0o6753;
    pub const SER: u16 = 0o6754;
    pub const SDN: u16 = 0o6755;
    pub const INTR: u16 = 0o6756;
    pub const INIT: u16 = 0o6757;

    const DONE_BIT: u16 = 0o4000;
    const ERROR_BIT: u16 = 0o2000;
    const READY_BIT: u16 = 0o1000;

    pub fn new() -> Rx8e {
        Rx8e {
            drives: [None, None],
            load_phase: 0,
            pending_unit: 0,
            pending_sector: 0,
            pending_track: 0,
            pending_write: false,
            buf: [0; MAX_SECTOR_WORDS],
            word_index: 0,
            words_per_sector: 0,
            transfer_ready: false,
            done: false,
            error: false,
        }
    }

    pub fn attach(
        &mut self,
        unit: usize,
        path: impl Into<PathBuf>,
        create: bool,
    ) -> Result<(), DeviceError> {
        if unit >= NUM_DRIVES {
            return Err(DeviceError::InvalidDrive(unit));
        }
        let path: PathBuf = path.into();

        let (density, size_bytes) = if create && !path.exists() {
            let density = Density::from_extension(&path);
            let file = File::create(&path).map_err(DeviceError::io(&path))?;
            file.set_len(density.image_bytes())
                .map_err(DeviceError::io(&path))?;
            (density, density.image_bytes())
        } else {
            let meta = std::fs::metadata(&path).map_err(DeviceError::io(&path))?;
            (Density::from_size(meta.len()), meta.len())
        };

        debug!(
            "RX8E: unit {unit} attached to {} ({density:?}, {size_bytes} bytes)",
            path.display()
        );
        self.drives[unit] = Some(Drive {
            path,
            density,
            size_bytes,
        });
        Ok(())
    }

    pub fn detach(&mut self, unit: usize) -> Result<(), DeviceError> {
        if unit >= NUM_DRIVES {
            return Err(DeviceError::InvalidDrive(unit));
        }
        self.drives[unit] = None;
        Ok(())
    }

    pub fn get_status(&self, unit: usize) -> Result<DriveStatus, DeviceError> {
        let drive = self.drive(unit)?;
        Ok(DriveStatus {
            path: drive.path.clone(),
            density: drive.density,
            size_bytes: drive.size_bytes,
        })
    }

    fn drive(&self, unit: usize) -> Result<&Drive, DeviceError> {
        self.drives
            .get(unit)
            .ok_or(DeviceError::InvalidDrive(unit))?
            .as_ref()
            .ok_or(DeviceError::NotAttached(unit))
    }

    fn check_geometry(track: u16, sector: u16) -> Result<(), DeviceError> {
        if track >= TRACKS {
            return Err(DeviceError::InvalidTrack(track));
        }
        if sector >= SECTORS {
            return Err(DeviceError::InvalidSector(sector));
        }
        Ok(())
    }

    fn sector_offset(density: Density, track: u16, sector: u16) -> u64 {
        (track as u64 * SECTORS as u64 + sector as u64) * density.sector_bytes() as u64
    }

    pub fn read_sector(
        &self,
        unit: usize,
        track: u16,
        sector: u16,
        target: &mut [u16],
    ) -> Result<(), DeviceError> {
        let drive = self.drive(unit)?;
        Self::check_geometry(track, sector)?;
        let words = drive.density.words_per_sector();
        if target.len() < words {
            return Err(DeviceError::BufferTooSmall {
                need: words,
                got: target.len(),
            });
        }

        let mut bytes = vec![0u8; drive.density.sector_bytes()];
        let mut file = File::open(&drive.path).map_err(DeviceError::io(&drive.path))?;
        file.seek(SeekFrom::Start(Self::sector_offset(
            drive.density,
            track,
            sector,
        )))
        .map_err(DeviceError::io(&drive.path))?;
        file.read_exact(&mut bytes)
            .map_err(DeviceError::io(&drive.path))?;

        unpack_sector(&bytes, &mut target[..words]);
        Ok(())
    }

    pub fn write_sector(
        &self,
        unit: usize,
        track: u16,
        sector: u16,
        source: &[u16],
    ) -> Result<(), DeviceError> {
        let drive = self.drive(unit)?;
        Self::check_geometry(track, sector)?;
        let words = drive.density.words_per_sector();
        if source.len() < words {
            return Err(DeviceError::BufferTooSmall {
                need: words,
                got: source.len(),
            });
        }

        // Tail bytes past the packed words stay zero.
        let mut bytes = vec![0u8; drive.density.sector_bytes()];
        pack_sector(&source[..words], &mut bytes);

        let mut file = OpenOptions::new()
            .write(true)
            .open(&drive.path)
            .map_err(DeviceError::io(&drive.path))?;
        file.seek(SeekFrom::Start(Self::sector_offset(
            drive.density,
            track,
            sector,
        )))
        .map_err(DeviceError::io(&drive.path))?;
        file.write_all(&bytes).map_err(DeviceError::io(&drive.path))?;
        Ok(())
    }

    ///////////////////////////////////////////////////////////////////////////

    fn status_word(&self) -> u16 {
        ((self.done as u16) * Self::DONE_BIT)
            | ((self.error as u16) * Self::ERROR_BIT)
            | ((self.transfer_ready as u16) * Self::READY_BIT)
    }

    fn load_command(&mut self, ac: u16) {
        if self.load_phase == 1 {
            self.pending_track = ac & 0xff;
            self.load_phase = 2;
            trace!("RX8E: LCD track {:04o}", self.pending_track);
        } else {
            self.pending_unit = ((ac >> 5) & 0x1) as usize;
            self.pending_write = ac & 0o100 != 0;
            self.pending_sector = ac & 0o37;
            self.load_phase = 1;
            trace!(
                "RX8E: LCD unit {} sector {:04o} write {}",
                self.pending_unit,
                self.pending_sector,
                self.pending_write
            );
        }
    }

    fn start_io(&mut self) {
        self.done = false;
        self.transfer_ready = false;
        self.error = false;
        self.word_index = 0;

        if self.load_phase != 2 {
            debug!("RX8E: INTR with incomplete command");
            self.error = true;
            return;
        }
        self.load_phase = 0;

        let density = match self.drive(self.pending_unit) {
            Ok(drive) => drive.density,
            Err(err) => {
                debug!("RX8E: INTR: {err}");
                self.error = true;
                return;
            }
        };
        self.words_per_sector = density.words_per_sector();

        if self.pending_write {
            self.buf = [0; MAX_SECTOR_WORDS];
            self.transfer_ready = true;
            return;
        }

        let mut buf = [0u16; MAX_SECTOR_WORDS];
        match self.read_sector(
            self.pending_unit,
            self.pending_track,
            self.pending_sector,
            &mut buf,
        ) {
            Ok(()) => {
                self.buf = buf;
                self.transfer_ready = true;
            }
            Err(err) => {
                debug!("RX8E: read failed: {err}");
                self.error = true;
            }
        }
    }

    fn transfer(&mut self, state: &mut EmulatorState) {
        if !self.transfer_ready {
            return;
        }

        if self.pending_write {
            self.buf[self.word_index] = state.ac() & WORD_MASK;
            self.word_index += 1;
            if self.word_index == self.words_per_sector {
                let buf = self.buf;
                match self.write_sector(
                    self.pending_unit,
                    self.pending_track,
                    self.pending_sector,
                    &buf[..self.words_per_sector],
                ) {
                    Ok(()) => self.done = true,
                    Err(err) => {
                        debug!("RX8E: write failed: {err}");
                        self.error = true;
                    }
                }
                self.transfer_ready = false;
            }
        } else {
            state.set_ac(self.buf[self.word_index]);
            self.word_index += 1;
            if self.word_index == self.words_per_sector {
                self.transfer_ready = false;
                self.done = true;
            }
        }
    }
}

impl IotHandler for Rx8e {
    fn handle_iot(&mut self, ir: u16, state: &mut EmulatorState) {
        match ir {
            Self::LCD => self.load_command(state.ac()),
            Self::XDR => self.transfer(state),
            Self::STR => {
                if self.transfer_ready {
                    state.skip();
                }
            }
            Self::SER => {
                if self.error {
                    state.skip();
                }
            }
            Self::SDN => {
                if self.done {
                    state.skip();
                }
            }
            Self::INTR => {
                self.start_io();
                state.set_ac(self.status_word());
            }
            Self::INIT => self.reset(),
            _ => trace!("RX8E: IOT {ir:04o} ignored"),
        }
    }

    fn reset(&mut self) {
        self.load_phase = 0;
        self.pending_unit = 0;
        self.pending_sector = 0;
        self.pending_track = 0;
        self.pending_write = false;
        self.buf = [0; MAX_SECTOR_WORDS];
        self.word_index = 0;
        self.words_per_sector = 0;
        self.transfer_ready = false;
        self.done = false;
        self.error = false;
    }
}

impl Default for Rx8e {
    fn default() -> Self {
        Self::new()
    }
}
