use crate::fan_curve::{BreakpointTable, TemperaturePoint};

// Map a temperature reading to a fan level.
//
// Below the first breakpoint the level follows the line through the origin
// and the first breakpoint, above the last breakpoint it stays flat, and in
// between it is interpolated on the first segment containing the reading.
// Negative (and NaN) readings produce no value, the caller keeps its
// previous level.
pub fn interpolate(temperature: f32, table: &BreakpointTable) -> Option<f32> {
    let first = table.first();
    let last = table.last();

    if temperature >= 0.0 && temperature <= first.temperature_c as f32 {
        return Some(origin_extrapolation(first, temperature));
    }

    if temperature >= last.temperature_c as f32 {
        return Some(last.fan_level);
    }

    // Ties on a breakpoint resolve to the earlier segment
    table
        .points()
        .windows(2)
        .find(|segment| {
            temperature >= segment[0].temperature_c as f32
                && temperature <= segment[1].temperature_c as f32
        })
        .map(|segment| {
            linear_interpolation(&segment[0], &segment[1], temperature)
        })
}

// Line through (0, 0) and the first breakpoint
fn origin_extrapolation(first: &TemperaturePoint, temperature: f32) -> f32 {
    // The range [0, 0] only holds the breakpoint itself
    if first.temperature_c == 0 {
        return first.fan_level;
    }

    first.fan_level * (temperature / first.temperature_c as f32)
}

// Perform the linear interpolation between
// two points and return the fan level
fn linear_interpolation(
    pre: &TemperaturePoint,
    suc: &TemperaturePoint,
    temperature: f32,
) -> f32 {
    let x1 = pre.temperature_c as f32;
    let x2 = suc.temperature_c as f32;

    // Weighted form of m * t + q, exact on both breakpoints
    let f = (temperature - x1) / (x2 - x1);

    pre.fan_level * (1.0 - f) + suc.fan_level * f
}
