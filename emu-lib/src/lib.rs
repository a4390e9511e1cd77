pub mod emulator;
pub mod emulator_state;
pub mod io;
pub mod loader;

pub use emulator::Emulator;
pub use emulator_state::{EmuError, EmulatorState, Registers};
pub use io::IotHandler;
