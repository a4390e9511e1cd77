use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::PathBuf;

use common::mem::{ReadU16, WriteU16};
use common::srec::{self, SrecError};
use common::word::{self, WORD_MASK};

use log::{debug, trace};

use crate::io::{DeviceError, IotHandler};
use crate::EmulatorState;

/// 128 data words plus one trailing word per block.
pub const BLOCK_WORDS: usize = 129;
pub const NUM_DRIVES: usize = 2;

const BLOCK_BYTES: u64 = (BLOCK_WORDS * 2) as u64;
const MAX_BLOCKS: u16 = 0o2000;

#[derive(Debug, Clone)]
pub struct DriveStatus {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub read_only: bool,
}

struct Drive {
    path: PathBuf,
    size_bytes: u64,
    // Present when the backing file was an S-record image; such drives are
    // read-only.
    image: Option<Vec<u16>>,
}

impl Drive {
    fn read_only(&self) -> bool {
        self.image.is_some()
    }
}

/// TC08 DECtape controller. The guest loads a core transfer address with
/// DTXA, reads a block with DTLB, and polls DTSF for completion.
pub struct Tc08 {
    drives: [Option<Drive>; NUM_DRIVES],
    transfer_addr: u16,
    ready: bool,
}

impl Tc08 {
    pub const DTCA: u16 = 0o6762;
    pub const DTSF: u16 = 0o6764;
    pub const DTLB: u16 = 0o6766;
    pub const DTXA: u16 = 0o6771;

    pub fn new() -> Tc08 {
        Tc08 {
            drives: [None, None],
            transfer_addr: 0,
            ready: false,
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

        if create && !path.exists() {
            File::create(&path).map_err(DeviceError::io(&path))?;
        }
        let bytes = std::fs::read(&path).map_err(DeviceError::io(&path))?;

        let image = if bytes.first() == Some(&b'S')
            && bytes.get(1).is_some_and(|b| b.is_ascii_digit())
        {
            let text = std::str::from_utf8(&bytes).map_err(|_| SrecError::MalformedSRecord(1))?;
            Some(Self::load_srec_image(text)?)
        } else {
            None
        };

        debug!(
            "TC08: unit {unit} attached to {} ({} bytes{})",
            path.display(),
            bytes.len(),
            if image.is_some() { ", read-only" } else { "" }
        );
        self.drives[unit] = Some(Drive {
            path,
            size_bytes: bytes.len() as u64,
            image,
        });
        Ok(())
    }

    // The image array is indexed by word, one past the highest byte address
    // the records populate.
    fn load_srec_image(text: &str) -> Result<Vec<u16>, SrecError> {
        let (bytes, _) = srec::decode(text)?;
        let len = bytes
            .keys()
            .next_back()
            .map(|&addr| addr as usize / 2 + 1)
            .unwrap_or(0);
        let mut image = vec![0u16; len];
        for (addr, val) in srec::bytes_to_words(&bytes) {
            image[addr as usize] = val;
        }
        Ok(image)
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
            size_bytes: drive.size_bytes,
            read_only: drive.read_only(),
        })
    }

    fn drive(&self, unit: usize) -> Result<&Drive, DeviceError> {
        self.drives
            .get(unit)
            .ok_or(DeviceError::InvalidDrive(unit))?
            .as_ref()
            .ok_or(DeviceError::NotAttached(unit))
    }

    pub fn read_block(
        &self,
        unit: usize,
        block: u16,
        target: &mut [u16],
    ) -> Result<(), DeviceError> {
        let drive = self.drive(unit)?;
        if target.len() < BLOCK_WORDS {
            return Err(DeviceError::BufferTooSmall {
                need: BLOCK_WORDS,
                got: target.len(),
            });
        }
        if block >= MAX_BLOCKS {
            return Err(DeviceError::InvalidBlock(block));
        }

        if let Some(image) = &drive.image {
            // Blocks past the image read as zeros.
            let base = block as usize * BLOCK_WORDS;
            for (i, word) in target[..BLOCK_WORDS].iter_mut().enumerate() {
                *word = image.get(base + i).copied().unwrap_or(0);
            }
            return Ok(());
        }

        let offset = block as u64 * BLOCK_BYTES;
        if offset + BLOCK_BYTES > drive.size_bytes {
            return Err(DeviceError::InvalidBlock(block));
        }
        let mut file = File::open(&drive.path).map_err(DeviceError::io(&drive.path))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(DeviceError::io(&drive.path))?;
        for word in target[..BLOCK_WORDS].iter_mut() {
            *word = file.read_u16().map_err(DeviceError::io(&drive.path))? & WORD_MASK;
        }
        Ok(())
    }

    pub fn write_block(
        &mut self,
        unit: usize,
        block: u16,
        source: &[u16],
    ) -> Result<(), DeviceError> {
        let drive = self.drive(unit)?;
        if source.len() < BLOCK_WORDS {
            return Err(DeviceError::BufferTooSmall {
                need: BLOCK_WORDS,
                got: source.len(),
            });
        }
        if drive.read_only() {
            return Err(DeviceError::ReadOnlyImage);
        }
        if block >= MAX_BLOCKS {
            return Err(DeviceError::InvalidBlock(block));
        }

        let offset = block as u64 * BLOCK_BYTES;
        let path = drive.path.clone();
        let mut file = OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(DeviceError::io(&path))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(DeviceError::io(&path))?;
        for (i, &word) in source[..BLOCK_WORDS].iter().enumerate() {
            // The trailing word is always stored as zero.
            let word = if i == BLOCK_WORDS - 1 { 0 } else { word & WORD_MASK };
            file.write_u16(word).map_err(DeviceError::io(&path))?;
        }

        let drive = self.drives[unit].as_mut().unwrap();
        drive.size_bytes = drive.size_bytes.max(offset + BLOCK_BYTES);
        Ok(())
    }

    fn load_block(&mut self, state: &mut EmulatorState) {
        let unit = ((state.ac() >> 10) & 0x1) as usize;
        let block = state.ac() & 0o1777;

        let mut buf = [0u16; BLOCK_WORDS];
        match self.read_block(unit, block, &mut buf) {
            Ok(()) => {
                let mut addr = self.transfer_addr;
                for &word in buf.iter() {
                    state.mem_write(addr, word);
                    addr = word::inc(addr);
                }
                self.ready = true;
                state.skip();
            }
            Err(err) => {
                debug!("TC08: block {block:04o} read failed: {err}");
                self.ready = false;
            }
        }
    }
}

impl IotHandler for Tc08 {
    fn handle_iot(&mut self, ir: u16, state: &mut EmulatorState) {
        match ir {
            Self::DTCA => {
                self.ready = false;
                self.transfer_addr = 0;
            }
            Self::DTXA => self.transfer_addr = state.ac(),
            Self::DTSF => {
                if self.ready {
                    state.skip();
                }
            }
            Self::DTLB => self.load_block(state),
            _ => trace!("TC08: IOT {ir:04o} ignored"),
        }
    }

    fn reset(&mut self) {
        self.transfer_addr = 0;
        self.ready = false;
    }
}

impl Default for Tc08 {
    fn default() -> Self {
        Self::new()
    }
}
