use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::error;

use crate::io::DeviceError;

/// Line printer. Output appends to a host file; the file is opened per
/// character and closed on scope exit so it is released on every path.
pub struct Lpt {
    path: PathBuf,
    error_reported: bool,
}

impl Lpt {
    pub fn attach(path: impl Into<PathBuf>) -> Result<Lpt, DeviceError> {
        let path = path.into();
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(DeviceError::io(&path))?;
        Ok(Lpt {
            path,
            error_reported: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Print one character. A host failure is reported once per attachment,
    /// then suppressed.
    pub fn print(&mut self, val: u8) {
        let res = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(&[val]));
        if let Err(err) = res {
            if !self.error_reported {
                error!("LPT {}: {err}", self.path.display());
                self.error_reported = true;
            }
        }
    }
}
