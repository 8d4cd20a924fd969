//! Energy estimation
//!
//! Converts raw counters into an energy figure with fixed calibration
//! constants. Pure; no rounding.

use serde::{Deserialize, Serialize};

/// Joules per counted operation.
pub const C_CPU: f64 = 1.5e-9;
/// Joules per byte-second of peak memory.
pub const C_MEM: f64 = 2.25e-9;
/// Fixed baseline joules charged to every run.
pub const C_BASE: f64 = 5e-4;
/// Joules in one kilowatt-hour.
pub const JOULES_PER_KWH: f64 = 3_600_000.0;

/// Derived energy for one execution.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnergyReport {
    pub energy_joules: f64,
    pub energy_kwh: f64,
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// `ops * C_CPU + peak_mem * duration * C_MEM + C_BASE`, and the same in kWh.
pub fn estimate(ops: u64, peak_mem_bytes: u64, duration_sec: f64) -> EnergyReport {
    let duration = non_negative(duration_sec);
    let energy_joules = ops as f64 * C_CPU + peak_mem_bytes as f64 * duration * C_MEM + C_BASE;
    EnergyReport {
        energy_joules,
        energy_kwh: energy_joules / JOULES_PER_KWH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_run_costs_exactly_the_baseline() {
        let report = estimate(0, 0, 0.0);
        assert_eq!(report.energy_joules, C_BASE);
        assert_eq!(report.energy_joules, 0.0005);
        assert_eq!(report.energy_kwh, 0.0005 / 3_600_000.0);
    }

    #[test]
    fn ops_scale_linearly() {
        let report = estimate(1000, 0, 0.0);
        assert_eq!(report.energy_joules, 1000.0 * 1.5e-9 + 0.0005);
    }

    #[test]
    fn memory_term_needs_duration() {
        assert_eq!(estimate(0, 88, 0.0).energy_joules, C_BASE);
        let report = estimate(0, 1_000_000, 2.0);
        assert_eq!(report.energy_joules, 1_000_000.0 * 2.0 * 2.25e-9 + 0.0005);
    }

    #[test]
    fn result_is_strictly_positive() {
        for (ops, mem, dur) in [(0, 0, 0.0), (1, 0, 0.0), (0, 1, 1e-9), (u64::MAX, u64::MAX, 1.0)] {
            let report = estimate(ops, mem, dur);
            assert!(report.energy_joules > 0.0);
            assert!(report.energy_kwh > 0.0);
        }
    }

    #[test]
    fn invalid_duration_is_treated_as_zero() {
        assert_eq!(estimate(0, 500, -3.0).energy_joules, C_BASE);
        assert_eq!(estimate(0, 500, f64::NAN).energy_joules, C_BASE);
    }
}
