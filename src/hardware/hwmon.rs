use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::hardware::{FanActuator, HardwareError, TemperatureSensor};

const THERMAL_ZONE_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";
const PWM_PATH: &str = "/sys/class/hwmon/hwmon0/pwm1";
const PWM_ENABLE_PATH: &str = "/sys/class/hwmon/hwmon0/pwm1_enable";

// Values of the pwm enable attribute
const PWM_MODE_MANUAL: &str = "1";
const PWM_MODE_AUTO: &str = "2";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SensorSettings {
    // Sysfs attribute holding the temperature
    pub path: PathBuf,
    // The raw value is divided by this to get degrees Celsius
    pub divisor: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ActuatorSettings {
    pub pwm_path: PathBuf,
    // Switches between manual and automatic fan control when present
    pub enable_path: Option<PathBuf>,
    // Raw pwm value for a fan level of 1
    pub max_value: u32,
}

// Temperature sensor backed by a sysfs attribute
// such as a thermal zone or an hwmon temp input
#[derive(Debug)]
pub struct ThermalZoneSensor {
    path: PathBuf,
    divisor: f32,
}

impl ThermalZoneSensor {
    pub fn new(settings: &SensorSettings) -> Self {
        Self {
            path: settings.path.clone(),
            divisor: settings.divisor,
        }
    }
}

impl TemperatureSensor for ThermalZoneSensor {
    fn read_temperature(&mut self) -> Result<f32, HardwareError> {
        let raw = read_attribute(&self.path)?;

        let value: f32 = raw.parse().map_err(|_| HardwareError::Parse {
            path: self.path.clone(),
            value: raw.clone(),
        })?;

        Ok(value / self.divisor)
    }
}

// Fan driven through an hwmon pwm attribute
#[derive(Debug)]
pub struct PwmFan {
    pwm_path: PathBuf,
    enable_path: Option<PathBuf>,
    max_value: u32,
}

impl PwmFan {
    pub fn new(settings: &ActuatorSettings) -> Self {
        Self {
            pwm_path: settings.pwm_path.clone(),
            enable_path: settings.enable_path.clone(),
            max_value: settings.max_value,
        }
    }

    fn set_mode(&self, mode: &str) -> Result<(), HardwareError> {
        if let Some(enable_path) = &self.enable_path {
            debug!("Setting pwm mode {mode} on {enable_path:?}");
            write_attribute(enable_path, mode)?;
        }

        Ok(())
    }
}

impl FanActuator for PwmFan {
    fn open(&mut self) -> Result<(), HardwareError> {
        self.set_mode(PWM_MODE_MANUAL)
    }

    fn set_level(&mut self, level: f32) -> Result<(), HardwareError> {
        if !(0.0..=1.0).contains(&level) {
            return Err(HardwareError::LevelOutOfRange(level));
        }

        let value = (level * self.max_value as f32).round() as u32;
        trace!("Writing pwm value {value} for level {level}");

        write_attribute(&self.pwm_path, &value.to_string())
    }

    // Hand the fan back to automatic control
    fn close(&mut self) -> Result<(), HardwareError> {
        self.set_mode(PWM_MODE_AUTO)
    }
}

fn read_attribute(path: &Path) -> Result<String, HardwareError> {
    let raw = fs::read_to_string(path).map_err(|source| HardwareError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(raw.trim().to_string())
}

fn write_attribute(path: &Path, value: &str) -> Result<(), HardwareError> {
    fs::write(path, value).map_err(|source| HardwareError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(THERMAL_ZONE_PATH),
            divisor: 1000.,
        }
    }
}

impl Default for ActuatorSettings {
    fn default() -> Self {
        Self {
            pwm_path: PathBuf::from(PWM_PATH),
            enable_path: Some(PathBuf::from(PWM_ENABLE_PATH)),
            max_value: 255,
        }
    }
}
