//! In-memory sensor and actuator doubles.
//!
//! Both types are cheap handles over shared state: keep a clone to script
//! readings or inspect the commanded levels while the control loop owns the
//! other one.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use crate::hardware::{FanActuator, HardwareError, TemperatureSensor};

// None stands for a failed read
type Reading = Option<f32>;

/// Sensor returning scripted readings.
///
/// Readings are consumed in order, the last one is repeated once the script
/// runs out.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSensor {
    readings: Arc<Mutex<VecDeque<Reading>>>,
}

impl ScriptedSensor {
    pub fn new(readings: &[f32]) -> Self {
        let sensor = Self::default();
        for reading in readings {
            sensor.push(*reading);
        }
        sensor
    }

    pub fn push(&self, temperature: f32) {
        self.lock().push_back(Some(temperature));
    }

    pub fn push_failure(&self) {
        self.lock().push_back(None);
    }

    // Drop the pending readings and keep returning the given one
    pub fn set(&self, temperature: f32) {
        let mut readings = self.lock();
        readings.clear();
        readings.push_back(Some(temperature));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Reading>> {
        self.readings.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TemperatureSensor for ScriptedSensor {
    fn read_temperature(&mut self) -> Result<f32, HardwareError> {
        let mut readings = self.lock();

        let reading = if readings.len() > 1 {
            readings.pop_front().flatten()
        } else {
            readings.front().copied().flatten()
        };

        reading.ok_or_else(|| {
            HardwareError::Unavailable("scripted sensor failure".to_string())
        })
    }
}

#[derive(Debug, Default)]
struct ActuatorLog {
    levels: Vec<f32>,
    open_count: usize,
    close_count: usize,
    failing_writes: usize,
    failing_open: bool,
    failing_close: bool,
}

/// Actuator recording every level it is asked to set.
#[derive(Debug, Clone, Default)]
pub struct RecordingActuator {
    log: Arc<Mutex<ActuatorLog>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn levels(&self) -> Vec<f32> {
        self.lock().levels.clone()
    }

    pub fn last_level(&self) -> Option<f32> {
        self.lock().levels.last().copied()
    }

    pub fn open_count(&self) -> usize {
        self.lock().open_count
    }

    pub fn close_count(&self) -> usize {
        self.lock().close_count
    }

    // Make the next `count` calls to set_level fail
    pub fn fail_next_writes(&self, count: usize) {
        self.lock().failing_writes = count;
    }

    // Make every following open fail
    pub fn fail_open(&self) {
        self.lock().failing_open = true;
    }

    // Make every following close fail
    pub fn fail_close(&self) {
        self.lock().failing_close = true;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ActuatorLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl FanActuator for RecordingActuator {
    fn open(&mut self) -> Result<(), HardwareError> {
        let mut log = self.lock();

        if log.failing_open {
            return Err(scripted_failure("open"));
        }

        log.open_count += 1;
        Ok(())
    }

    fn set_level(&mut self, level: f32) -> Result<(), HardwareError> {
        let mut log = self.lock();

        if log.failing_writes > 0 {
            log.failing_writes -= 1;
            return Err(scripted_failure("set_level"));
        }

        log.levels.push(level);
        Ok(())
    }

    fn close(&mut self) -> Result<(), HardwareError> {
        let mut log = self.lock();

        if log.failing_close {
            return Err(scripted_failure("close"));
        }

        log.close_count += 1;
        Ok(())
    }
}

fn scripted_failure(operation: &str) -> HardwareError {
    HardwareError::Unavailable(format!("scripted actuator {operation} failure"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_sensor_repeats_last_reading() {
        let mut sensor = ScriptedSensor::new(&[10.0, 20.0]);
        assert_eq!(sensor.read_temperature().unwrap(), 10.0);
        assert_eq!(sensor.read_temperature().unwrap(), 20.0);
        assert_eq!(sensor.read_temperature().unwrap(), 20.0);

        sensor.push_failure();
        assert_eq!(sensor.read_temperature().unwrap(), 20.0);
        assert!(sensor.read_temperature().is_err());
        assert!(sensor.read_temperature().is_err());

        sensor.set(30.0);
        assert_eq!(sensor.read_temperature().unwrap(), 30.0);
    }

    #[test]
    fn empty_sensor_fails() {
        let mut sensor = ScriptedSensor::default();
        assert!(sensor.read_temperature().is_err());
    }

    #[test]
    fn recording_actuator_shares_state_between_clones() {
        let handle = RecordingActuator::new();
        let mut actuator = handle.clone();

        actuator.open().unwrap();
        actuator.set_level(0.25).unwrap();
        handle.fail_next_writes(1);
        assert!(actuator.set_level(0.5).is_err());
        actuator.set_level(0.75).unwrap();
        actuator.close().unwrap();

        assert_eq!(handle.levels(), vec![0.25, 0.75]);
        assert_eq!(handle.last_level(), Some(0.75));
        assert_eq!(handle.open_count(), 1);
        assert_eq!(handle.close_count(), 1);
    }

    #[test]
    fn recording_actuator_open_and_close_failures() {
        let handle = RecordingActuator::new();
        let mut actuator = handle.clone();

        handle.fail_open();
        handle.fail_close();

        assert!(actuator.open().is_err());
        assert!(actuator.close().is_err());
        assert_eq!(handle.open_count(), 0);
        assert_eq!(handle.close_count(), 0);
    }
}
