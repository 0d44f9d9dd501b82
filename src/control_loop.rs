use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::{
    fan_curve::BreakpointTable,
    hardware::{FanActuator, HardwareError, TemperatureSensor},
};

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 100;

type Result<T> = std::result::Result<T, ControlError>;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Failed to open the fan actuator: {0}")]
    ActuatorOpen(HardwareError),
    #[error("Failed to read the temperature sensor: {0}")]
    SensorRead(HardwareError),
    #[error("Failed to set the fan level to {level}: {source}")]
    ActuatorWrite { level: f32, source: HardwareError },
    #[error("Failed to close the fan actuator: {0}")]
    ActuatorClose(HardwareError),
}

// What the loop does when the sensor or the actuator fails
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FaultPolicy {
    // Stop the loop on the first failure
    #[default]
    FailFast,
    // Retry the failed operation with an exponential backoff
    // before giving up like FailFast
    Retry { attempts: u32, backoff_ms: u64 },
    // Keep driving the fan with the last good level
    HoldLastLevel,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoopSettings {
    pub tick_interval_ms: u64,
    pub fault_policy: FaultPolicy,
}

// Sample the sensor, map the reading through the fan curve
// and drive the actuator at a fixed interval
pub struct ControlLoop {
    table: BreakpointTable,

    sensor: Box<dyn TemperatureSensor>,
    actuator: Box<dyn FanActuator>,

    settings: LoopSettings,

    // Level written on the last tick
    level: f32,
}

impl ControlLoop {
    pub fn new(
        table: BreakpointTable,
        sensor: Box<dyn TemperatureSensor>,
        actuator: Box<dyn FanActuator>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            table,
            sensor,
            actuator,
            settings,
            level: 0.,
        }
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    /// Run the loop until `exit` is cancelled or a failure is not
    /// absorbed by the fault policy.
    ///
    /// The exit signal is checked once per tick and raced against the tick
    /// sleep and the retry backoffs, so shutdown takes at most one tick of
    /// sensor and actuator work. The table is handed back once the actuator
    /// is closed.
    pub async fn run(
        mut self,
        exit: CancellationToken,
    ) -> Result<BreakpointTable> {
        info!("Control loop: Running");

        if let Err(err) = self.actuator.open() {
            error!("Error opening fan actuator: {err}");
            return Err(ControlError::ActuatorOpen(err));
        }

        let tick = self.settings.tick_interval();

        while !exit.is_cancelled() {
            if let Err(err) = self.step(&exit).await {
                error!("Control loop: {err}");

                // The loop is going down anyway, still try
                // to give the fan back
                if let Err(close_err) = self.close_actuator() {
                    warn!("{close_err}");
                }

                return Err(err);
            }

            select! {
                _ = exit.cancelled() => {},
                _ = tokio::time::sleep(tick) => {},
            }
        }

        info!("Control loop: Quiting");

        self.close_actuator()?;

        Ok(self.table)
    }

    // Run a single sampling tick.
    // Pending retries are dropped once exit is cancelled
    pub async fn step(&mut self, exit: &CancellationToken) -> Result<()> {
        if let Some(temperature) = self.read_temperature(exit).await? {
            match self.table.level_at(temperature) {
                Some(level) => self.level = level,
                None => debug!(
                    "Ignoring temperature reading {temperature}°C, \
                     holding level {}",
                    self.level
                ),
            }

            trace!("temp: {temperature}°C - level: {}", self.level);
        }

        self.write_level(exit).await
    }

    // Read the sensor according to the fault policy,
    // None means the reading was skipped
    async fn read_temperature(
        &mut self,
        exit: &CancellationToken,
    ) -> Result<Option<f32>> {
        let mut attempt = 0;

        loop {
            let err = match self.sensor.read_temperature() {
                Ok(temperature) => return Ok(Some(temperature)),
                Err(err) => err,
            };

            if self.settings.fault_policy == FaultPolicy::HoldLastLevel {
                warn!("Temperature read failed, holding last level: {err}");
                return Ok(None);
            }

            attempt += 1;
            match self.retry_delay(attempt) {
                Some(delay) => {
                    warn!("Temperature read failed (attempt {attempt}): {err}");

                    if !backoff(delay, exit).await {
                        debug!("Exit requested, skipping the sensor retry");
                        return Ok(None);
                    }
                }
                None => return Err(ControlError::SensorRead(err)),
            }
        }
    }

    // Write the current level according to the fault policy
    async fn write_level(&mut self, exit: &CancellationToken) -> Result<()> {
        let level = self.level;
        let mut attempt = 0;

        loop {
            let err = match self.actuator.set_level(level) {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            if self.settings.fault_policy == FaultPolicy::HoldLastLevel {
                warn!("Failed to set fan level {level}: {err}");
                return Ok(());
            }

            attempt += 1;
            match self.retry_delay(attempt) {
                Some(delay) => {
                    warn!(
                        "Failed to set fan level {level} \
                         (attempt {attempt}): {err}"
                    );

                    if !backoff(delay, exit).await {
                        debug!("Exit requested, skipping the actuator retry");
                        return Ok(());
                    }
                }
                None => {
                    return Err(ControlError::ActuatorWrite {
                        level,
                        source: err,
                    });
                }
            }
        }
    }

    // Delay before the given retry attempt, None once retries are exhausted
    fn retry_delay(&self, attempt: u32) -> Option<Duration> {
        match self.settings.fault_policy {
            FaultPolicy::Retry {
                attempts,
                backoff_ms,
            } if attempt <= attempts => {
                let factor = 2u64.saturating_pow(attempt - 1);
                Some(Duration::from_millis(backoff_ms.saturating_mul(factor)))
            }
            _ => None,
        }
    }

    fn close_actuator(&mut self) -> Result<()> {
        self.actuator.close().map_err(|err| {
            error!("Error closing fan actuator: {err}");
            ControlError::ActuatorClose(err)
        })
    }
}

// Sleep before a retry, false if exit was cancelled in the meantime
async fn backoff(delay: Duration, exit: &CancellationToken) -> bool {
    select! {
        biased;
        _ = exit.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

impl LoopSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            fault_policy: FaultPolicy::default(),
        }
    }
}
