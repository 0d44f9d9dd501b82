use std::{io, path::PathBuf};

use thiserror::Error;

#[doc(hidden)]
pub mod fake;
pub mod hwmon;

type Result<T> = std::result::Result<T, HardwareError>;

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("I/O error on {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("Unexpected value {value:?} in {path:?}")]
    Parse { path: PathBuf, value: String },
    #[error("Fan level {0} is outside of [0, 1]")]
    LevelOutOfRange(f32),
    #[error("Device unavailable: {0}")]
    Unavailable(String),
}

// Temperature source sampled by the control loop
pub trait TemperatureSensor: Send {
    // Return the current temperature in degrees Celsius
    fn read_temperature(&mut self) -> Result<f32>;
}

// Fan driven by the control loop
pub trait FanActuator: Send {
    // Acquire the fan before the first level is set
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    // Set the fan level, the level must be inside [0, 1]
    fn set_level(&mut self, level: f32) -> Result<()>;

    // Release the fan once the control loop is done with it
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
