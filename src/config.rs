use std::time::Duration;

use crate::error::*;

/// Tuning constants for a [`BandwidthController`](crate::BandwidthController).
///
/// Bandwidth values are in bytes per second.
#[derive(Debug, Clone)]
pub struct Config {
    /// Length of one window slot.
    pub slot_duration: Duration,
    /// Number of slots in the window. The horizon is `slot_count * slot_duration`.
    pub slot_count: usize,
    /// Refreshes closer together than this are ignored.
    pub min_refresh_interval: Duration,
    /// At or below this loss ratio the estimate grows.
    pub low_loss_threshold: f32,
    /// Above this loss ratio the estimate backs off.
    pub high_loss_threshold: f32,
    /// Multiplier applied on low loss. Must be at least 1.
    pub growth_factor: f32,
    /// Multiplier applied on high loss. Must be in (0, 1].
    pub backoff_factor: f32,
    pub min_bandwidth: f32,
    pub max_bandwidth: f32,
    /// Estimate a new controller starts from.
    pub initial_bandwidth: f32,
    /// Changes smaller than this don't notify the handler.
    pub change_epsilon: f32,
    /// Largest byte count accepted by a single `add_*` call.
    pub max_event_bytes: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            slot_duration: Duration::from_millis(500),
            slot_count: 4,
            min_refresh_interval: Duration::from_millis(1200),
            low_loss_threshold: 0.01,
            high_loss_threshold: 0.10,
            growth_factor: 1.05,
            backoff_factor: 0.7,
            min_bandwidth: 8_000.0,
            // 10 Mbit/s
            max_bandwidth: 1_250_000.0,
            initial_bandwidth: 64_000.0,
            change_epsilon: 1.0,
            max_event_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.slot_count == 0 {
            return Err(Error::InvalidConfig("slot count must be non-zero"));
        }
        let slot_millis = u64::try_from(self.slot_duration.as_millis())
            .map_err(|_| Error::InvalidConfig("slot duration too large"))?;
        if slot_millis == 0 {
            return Err(Error::InvalidConfig("slot duration must be at least 1ms"));
        }
        if slot_millis.checked_mul(self.slot_count as u64).is_none() {
            return Err(Error::InvalidConfig(
                "window horizon does not fit in u64 milliseconds",
            ));
        }
        if u64::try_from(self.min_refresh_interval.as_millis()).is_err() {
            return Err(Error::InvalidConfig("refresh interval too large"));
        }
        if !(self.min_bandwidth > 0.0) {
            return Err(Error::InvalidConfig("minimum bandwidth must be positive"));
        }
        if !(self.min_bandwidth <= self.max_bandwidth) || !self.max_bandwidth.is_finite() {
            return Err(Error::InvalidConfig(
                "maximum bandwidth must be finite and not below the minimum",
            ));
        }
        if !(self.min_bandwidth..=self.max_bandwidth).contains(&self.initial_bandwidth) {
            return Err(Error::InvalidConfig(
                "initial bandwidth must lie between the minimum and maximum",
            ));
        }
        let unit = 0.0..=1.0;
        if !unit.contains(&self.low_loss_threshold) || !unit.contains(&self.high_loss_threshold) {
            return Err(Error::InvalidConfig("loss thresholds must lie in [0, 1]"));
        }
        if self.low_loss_threshold > self.high_loss_threshold {
            return Err(Error::InvalidConfig(
                "low loss threshold must not exceed the high loss threshold",
            ));
        }
        if !(self.growth_factor >= 1.0) || !self.growth_factor.is_finite() {
            return Err(Error::InvalidConfig("growth factor must be at least 1"));
        }
        if !(self.backoff_factor > 0.0 && self.backoff_factor <= 1.0) {
            return Err(Error::InvalidConfig("backoff factor must lie in (0, 1]"));
        }
        if !(self.change_epsilon >= 0.0) {
            return Err(Error::InvalidConfig("change epsilon must not be negative"));
        }
        if self.max_event_bytes == 0 {
            return Err(Error::InvalidConfig("per-event byte limit must be non-zero"));
        }
        Ok(())
    }

    pub(crate) fn slot_duration_millis(&self) -> u64 {
        u64::try_from(self.slot_duration.as_millis()).unwrap_or(u64::MAX)
    }

    pub(crate) fn min_refresh_interval_millis(&self) -> u64 {
        u64::try_from(self.min_refresh_interval.as_millis()).unwrap_or(u64::MAX)
    }

    /// Total time span covered by the window, at millisecond resolution.
    pub fn horizon(&self) -> Duration {
        Duration::from_millis(
            self.slot_duration_millis()
                .saturating_mul(self.slot_count as u64),
        )
    }
}
