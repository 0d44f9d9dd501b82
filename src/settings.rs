use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    control_loop::LoopSettings,
    hardware::hwmon::{ActuatorSettings, SensorSettings},
};

const DEFAULT_CONFIG_DIR: &str = "./config/fancontrol/";
const LOG_FILE_NAME: &str = "log.txt";

// Daemon settings read once at start-up from an optional Json file
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    // Directory holding the stored fan curve
    pub config_dir: PathBuf,
    // Defaults to log.txt inside the config directory
    pub log_file: Option<PathBuf>,

    pub control: LoopSettings,

    pub sensor: SensorSettings,
    pub actuator: ActuatorSettings,
}

impl Settings {
    // Parse the Json settings file, missing fields keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Parsing settings file at: {:?}", path);

        let file = File::open(path)
            .with_context(|| "Failed to open Json settings file")?;

        let buf = BufReader::new(file);

        let settings = serde_json::from_reader(buf)
            .with_context(|| "Failed to parse Json settings file")?;

        Ok(settings)
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.config_dir.join(LOG_FILE_NAME))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            log_file: None,

            control: LoopSettings::default(),

            sensor: SensorSettings::default(),
            actuator: ActuatorSettings::default(),
        }
    }
}
