pub mod console;
pub mod lpt;
pub mod rx8e;
pub mod tc08;

use std::path::{Path, PathBuf};

use common::srec::SrecError;

use thiserror::Error;

use crate::EmulatorState;

/// One device's slice of the IOT opcode space. The emulator routes each
/// recognized opcode range to the attached controller; everything a device
/// needs from the processor (AC, the skip, block transfers into core) goes
/// through the state handle.
pub trait IotHandler {
    fn handle_iot(&mut self, ir: u16, state: &mut EmulatorState);

    /// Clear controller state, keeping attachments.
    fn reset(&mut self) {}
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no such drive {0}")]
    InvalidDrive(usize),

    #[error("drive {0} not attached")]
    NotAttached(usize),

    #[error("track {0} out of range")]
    InvalidTrack(u16),

    #[error("sector {0} out of range")]
    InvalidSector(u16),

    #[error("block {0:04o} out of range")]
    InvalidBlock(u16),

    #[error("buffer holds {got} words, need {need}")]
    BufferTooSmall { need: usize, got: usize },

    #[error("image is read-only")]
    ReadOnlyImage,

    #[error("bad S-record image: {0}")]
    Srec(#[from] SrecError),

    #[error("{}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl DeviceError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> DeviceError + '_ {
        move |source| DeviceError::Io {
            path: path.to_owned(),
            source,
        }
    }
}
