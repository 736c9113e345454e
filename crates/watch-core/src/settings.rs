//! Detection parameters stored in the config table.

use serde::{Deserialize, Serialize};

use crate::MonitorError;

pub const RUN_THRESHOLD_PERCENT_KEY: &str = "run_threshold_percent";
pub const RUN_CONSECUTIVE_PERIODS_KEY: &str = "run_consecutive_periods";

pub const DEFAULT_RUN_THRESHOLD_PERCENT: f64 = 10.0;
pub const DEFAULT_RUN_CONSECUTIVE_PERIODS: usize = 5;
pub const MIN_RUN_CONSECUTIVE_PERIODS: usize = 2;

/// Validated run-detection parameters.
///
/// Can only be built through [`RunSettings::new`] or `Default`, so
/// `consecutive_periods >= 2` and a positive threshold always hold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    threshold_percent: f64,
    consecutive_periods: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            threshold_percent: DEFAULT_RUN_THRESHOLD_PERCENT,
            consecutive_periods: DEFAULT_RUN_CONSECUTIVE_PERIODS,
        }
    }
}

impl RunSettings {
    pub fn new(threshold_percent: f64, consecutive_periods: usize) -> Result<Self, MonitorError> {
        validate_run_threshold(threshold_percent)?;
        validate_run_periods(consecutive_periods)?;
        Ok(Self {
            threshold_percent,
            consecutive_periods,
        })
    }

    pub fn threshold_percent(&self) -> f64 {
        self.threshold_percent
    }

    pub fn consecutive_periods(&self) -> usize {
        self.consecutive_periods
    }
}

pub fn validate_run_threshold(value: f64) -> Result<(), MonitorError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(MonitorError::Configuration(format!(
            "{} must be a positive number, got {}",
            RUN_THRESHOLD_PERCENT_KEY, value
        )));
    }
    Ok(())
}

pub fn validate_run_periods(value: usize) -> Result<(), MonitorError> {
    if value < MIN_RUN_CONSECUTIVE_PERIODS {
        return Err(MonitorError::Configuration(format!(
            "{} must be at least {}, got {}",
            RUN_CONSECUTIVE_PERIODS_KEY, MIN_RUN_CONSECUTIVE_PERIODS, value
        )));
    }
    Ok(())
}

/// Validate a raw numeric value for one of the recognized config keys.
pub fn validate_setting(key: &str, value: f64) -> Result<(), MonitorError> {
    match key {
        RUN_THRESHOLD_PERCENT_KEY => validate_run_threshold(value),
        RUN_CONSECUTIVE_PERIODS_KEY => {
            if !value.is_finite() || value.fract() != 0.0 || value < 0.0 {
                return Err(MonitorError::Configuration(format!(
                    "{} must be a whole number, got {}",
                    RUN_CONSECUTIVE_PERIODS_KEY, value
                )));
            }
            validate_run_periods(value as usize)
        }
        other => Err(MonitorError::Configuration(format!(
            "Unknown config key: {}",
            other
        ))),
    }
}
