//! Fan curve data model.
//!
//! A fan curve is a fixed table of five breakpoints sorted by strictly
//! increasing temperature. The table is the unit that gets persisted by the
//! config store and handed to the control loop.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod breakpoint_curve;

pub use breakpoint_curve::interpolate;

// Number of breakpoints in every table
pub const TABLE_LEN: usize = 5;

// Size of one stored breakpoint: i32 temperature followed by f32 level
pub const RECORD_SIZE: usize = size_of::<i32>() + size_of::<f32>();

// Size of the raw table image on disk
pub const TABLE_SIZE: usize = RECORD_SIZE * TABLE_LEN;

/// Table used whenever no valid table is available from storage.
pub const DEFAULT_TABLE: BreakpointTable = BreakpointTable {
    points: [
        TemperaturePoint::new(20, 0.1),
        TemperaturePoint::new(40, 0.5),
        TemperaturePoint::new(50, 0.6),
        TemperaturePoint::new(60, 0.7),
        TemperaturePoint::new(100, 1.0),
    ],
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TableError {
    #[error("Expected {} breakpoints, found {found}", TABLE_LEN)]
    WrongPointCount { found: usize },
    #[error("Expected a {} bytes table image, found {found} bytes", TABLE_SIZE)]
    WrongImageSize { found: usize },
    #[error(
        "Breakpoint {index} has a negative temperature: {temperature_c}°C"
    )]
    NegativeTemperature { index: usize, temperature_c: i32 },
    #[error(
        "Breakpoint {index} is not above the previous one: {temperature_c}°C"
    )]
    NotAscending { index: usize, temperature_c: i32 },
    #[error("Breakpoint {index} has a fan level outside of [0, 1]: {level}")]
    LevelOutOfRange { index: usize, level: f32 },
}

/// One breakpoint of the fan curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperaturePoint {
    pub temperature_c: i32,
    pub fan_level: f32,
}

impl TemperaturePoint {
    pub const fn new(temperature_c: i32, fan_level: f32) -> Self {
        Self {
            temperature_c,
            fan_level,
        }
    }
}

/// Validated five point fan curve.
///
/// Temperatures are non-negative and strictly increasing, levels are finite
/// and inside `[0, 1]`. Levels are allowed to decrease between breakpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "Vec<TemperaturePoint>",
    into = "Vec<TemperaturePoint>"
)]
pub struct BreakpointTable {
    points: [TemperaturePoint; TABLE_LEN],
}

impl BreakpointTable {
    // Create a table after checking the breakpoints ordering and levels
    pub fn new(
        points: [TemperaturePoint; TABLE_LEN],
    ) -> Result<Self, TableError> {
        for (index, point) in points.iter().enumerate() {
            if point.temperature_c < 0 {
                return Err(TableError::NegativeTemperature {
                    index,
                    temperature_c: point.temperature_c,
                });
            }

            if index > 0
                && point.temperature_c <= points[index - 1].temperature_c
            {
                return Err(TableError::NotAscending {
                    index,
                    temperature_c: point.temperature_c,
                });
            }

            // NaN fails the range check as well
            if !(0.0..=1.0).contains(&point.fan_level) {
                return Err(TableError::LevelOutOfRange {
                    index,
                    level: point.fan_level,
                });
            }
        }

        Ok(Self { points })
    }

    pub fn points(&self) -> &[TemperaturePoint; TABLE_LEN] {
        &self.points
    }

    pub fn first(&self) -> &TemperaturePoint {
        &self.points[0]
    }

    pub fn last(&self) -> &TemperaturePoint {
        &self.points[TABLE_LEN - 1]
    }

    // Return the fan level for the given temperature, None if
    // the reading has to be ignored
    pub fn level_at(&self, temperature: f32) -> Option<f32> {
        interpolate(temperature, self)
    }

    /// Raw image of the table as stored on disk.
    ///
    /// Each record is the temperature as a 4 bytes signed integer followed
    /// by the level as a 4 bytes float, both in native byte order.
    pub fn to_bytes(&self) -> [u8; TABLE_SIZE] {
        let mut bytes = [0u8; TABLE_SIZE];

        for (point, record) in
            self.points.iter().zip(bytes.chunks_exact_mut(RECORD_SIZE))
        {
            record[..4].copy_from_slice(&point.temperature_c.to_ne_bytes());
            record[4..].copy_from_slice(&point.fan_level.to_ne_bytes());
        }

        bytes
    }

    // Decode a raw table image, the result goes through the same
    // checks as a table built with new
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TableError> {
        if bytes.len() != TABLE_SIZE {
            return Err(TableError::WrongImageSize { found: bytes.len() });
        }

        let mut points = [TemperaturePoint::new(0, 0.0); TABLE_LEN];

        for (point, record) in
            points.iter_mut().zip(bytes.chunks_exact(RECORD_SIZE))
        {
            let mut temp = [0u8; 4];
            let mut level = [0u8; 4];
            temp.copy_from_slice(&record[..4]);
            level.copy_from_slice(&record[4..]);

            *point = TemperaturePoint::new(
                i32::from_ne_bytes(temp),
                f32::from_ne_bytes(level),
            );
        }

        Self::new(points)
    }
}

impl Default for BreakpointTable {
    fn default() -> Self {
        DEFAULT_TABLE
    }
}

impl TryFrom<Vec<TemperaturePoint>> for BreakpointTable {
    type Error = TableError;

    fn try_from(value: Vec<TemperaturePoint>) -> Result<Self, Self::Error> {
        let found = value.len();
        let points: [TemperaturePoint; TABLE_LEN] = value
            .try_into()
            .map_err(|_| TableError::WrongPointCount { found })?;

        Self::new(points)
    }
}

impl From<BreakpointTable> for Vec<TemperaturePoint> {
    fn from(value: BreakpointTable) -> Self {
        value.points.to_vec()
    }
}
