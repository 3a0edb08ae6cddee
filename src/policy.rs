use crate::config::Config;

/// Multiplicative increase / multiplicative decrease rule with a hold band in between.
///
/// Low loss probes upward gently, high loss backs off hard, anything in between keeps the
/// current estimate so that noise doesn't make it oscillate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AimdPolicy {
    pub low_loss_threshold: f32,
    pub high_loss_threshold: f32,
    pub growth_factor: f32,
    pub backoff_factor: f32,
    pub min_bandwidth: f32,
    pub max_bandwidth: f32,
}

impl AimdPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            low_loss_threshold: config.low_loss_threshold,
            high_loss_threshold: config.high_loss_threshold,
            growth_factor: config.growth_factor,
            backoff_factor: config.backoff_factor,
            min_bandwidth: config.min_bandwidth,
            max_bandwidth: config.max_bandwidth,
        }
    }

    pub fn next_estimate(&self, current: f32, loss_ratio: f32) -> f32 {
        let next = if loss_ratio <= self.low_loss_threshold {
            current * self.growth_factor
        } else if loss_ratio > self.high_loss_threshold {
            current * self.backoff_factor
        } else {
            current
        };
        self.clamp(next)
    }

    pub fn clamp(&self, bandwidth: f32) -> f32 {
        if bandwidth.is_nan() {
            return self.min_bandwidth;
        }
        bandwidth.clamp(self.min_bandwidth, self.max_bandwidth)
    }
}

impl Default for AimdPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() <= expected * 1e-5,
            "{} != {}",
            actual,
            expected
        );
    }

    #[test]
    fn growth_on_low_loss_test() {
        let policy = AimdPolicy::default();
        assert_close(policy.next_estimate(100_000.0, 0.0), 105_000.0);
        assert_close(policy.next_estimate(100_000.0, 0.01), 105_000.0);
        // Capped at the ceiling
        assert_eq!(policy.next_estimate(1_240_000.0, 0.0), 1_250_000.0);
    }

    #[test]
    fn hold_in_stability_band_test() {
        let policy = AimdPolicy::default();
        assert_eq!(policy.next_estimate(100_000.0, 0.05), 100_000.0);
        assert_eq!(policy.next_estimate(100_000.0, 0.10), 100_000.0);
    }

    #[test]
    fn backoff_on_high_loss_test() {
        let policy = AimdPolicy::default();
        assert_close(policy.next_estimate(100_000.0, 0.9), 70_000.0);
        // Floored at the minimum
        assert_eq!(policy.next_estimate(10_000.0, 1.0), 8_000.0);
    }

    #[test]
    fn output_always_clamped_test() {
        let policy = AimdPolicy::default();
        assert_eq!(policy.next_estimate(0.0, 0.05), 8_000.0);
        assert_eq!(policy.next_estimate(f32::INFINITY, 0.05), 1_250_000.0);
        assert_eq!(policy.next_estimate(f32::NAN, 0.0), 8_000.0);
    }

    #[test]
    fn monotone_in_loss_test() {
        let policy = AimdPolicy::default();
        let mut rng = rand::thread_rng();
        for _ in 0..10_000 {
            let current = rng.gen_range(policy.min_bandwidth..=policy.max_bandwidth);
            let lower: f32 = rng.gen_range(0.0..=1.0);
            let higher: f32 = rng.gen_range(lower..=1.0);
            assert!(
                policy.next_estimate(current, higher) <= policy.next_estimate(current, lower),
                "current {} loss {} vs {}",
                current,
                lower,
                higher
            );
        }
    }
}
