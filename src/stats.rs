//! Numerically stable online estimators shared by every ranking algorithm
//! (§4.A). These are plain value types: no locking, no server identity.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Running sample count and mean, updated incrementally (no need to retain
/// the underlying samples).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RunningMean {
    pub count: u64,
    pub mean: f64,
}

impl RunningMean {
    pub fn observe(&mut self, value: f64) {
        self.count += 1;
        self.mean += (value - self.mean) / self.count as f64;
    }
}

/// Running variance/standard deviation via Welford's algorithm, layered on
/// top of [`RunningMean`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RunningVariance {
    pub count: u64,
    pub mean: f64,
    pub delta_m2: f64,
    pub variance: f64,
    pub stdev: f64,
}

impl RunningVariance {
    pub fn observe(&mut self, value: f64) {
        let delta1 = value - self.mean;
        self.count += 1;
        self.mean += delta1 / self.count as f64;
        let delta2 = value - self.mean;
        self.delta_m2 += delta1 * delta2;
        if self.count > 1 {
            self.variance = self.delta_m2 / (self.count - 1) as f64;
            self.stdev = self.variance.sqrt();
        }
    }
}

/// Sliding-window rate estimate, used only for reporting (§4.A).
#[derive(Debug, Clone)]
pub struct RunningRate {
    window_secs: f64,
    count: u64,
    cprev: u64,
    start: Instant,
}

impl Default for RunningRate {
    /// A 60s window is a reasonable default cadence for a per-server query
    /// rate shown in a report; callers that need a different cadence build
    /// one directly with [`RunningRate::new`].
    fn default() -> Self {
        Self::new(60.0)
    }
}

impl RunningRate {
    pub fn new(window_secs: f64) -> Self {
        Self {
            window_secs,
            count: 0,
            cprev: 0,
            start: Instant::now(),
        }
    }

    pub fn inc(&mut self, n: u64) {
        self.count += n;
    }

    /// Current estimated rate per second, rolling the window if it has
    /// fully elapsed.
    pub fn val(&mut self) -> f64 {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.start).as_secs_f64();
        if elapsed >= self.window_secs {
            self.cprev = self.count;
            self.count = 0;
            self.start = now;
        }
        let elapsed = now.saturating_duration_since(self.start).as_secs_f64();
        let weight = if elapsed < self.window_secs {
            (self.window_secs - elapsed) / self.window_secs
        } else {
            0.0
        };
        (self.cprev as f64 * weight + self.count as f64) / self.window_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_mean_matches_arithmetic_mean() {
        let mut rm = RunningMean::default();
        for v in [1.0, 2.0, 3.0, 4.0] {
            rm.observe(v);
        }
        assert_eq!(rm.count, 4);
        assert!((rm.mean - 2.5).abs() < 1e-12);
    }

    #[test]
    fn running_mean_zero_sample_invariant() {
        let rm = RunningMean::default();
        assert_eq!(rm.count, 0);
        assert_eq!(rm.mean, 0.0);
    }

    #[test]
    fn running_variance_matches_sample_variance() {
        let mut rv = RunningVariance::default();
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            rv.observe(v);
        }
        // Known sample variance of this data set is 4.571428571..., stdev ~2.1381
        assert!((rv.variance - 32.0 / 7.0).abs() < 1e-9);
        assert!((rv.stdev - (32.0_f64 / 7.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn running_variance_zero_until_two_samples() {
        let mut rv = RunningVariance::default();
        rv.observe(5.0);
        assert_eq!(rv.variance, 0.0);
        assert_eq!(rv.stdev, 0.0);
    }

    #[test]
    fn running_rate_reports_zero_with_no_observations() {
        let mut rr = RunningRate::new(60.0);
        assert_eq!(rr.val(), 0.0);
    }

    #[test]
    fn running_rate_counts_within_the_current_window() {
        let mut rr = RunningRate::new(60.0);
        rr.inc(30);
        // Still well inside the window: the full count applies uniformly at
        // roughly 0.5/s, with no prior-window contribution yet.
        assert!((rr.val() - 0.5).abs() < 0.05);
    }

    #[test]
    fn running_rate_rolls_the_window_after_it_elapses() {
        let mut rr = RunningRate::new(0.05);
        rr.inc(10);
        std::thread::sleep(std::time::Duration::from_millis(80));
        // The old window's count becomes `cprev` and decays out of the
        // weighted average as the new window ages past it.
        let rolled = rr.val();
        assert!(rolled < 10.0 / 0.05);
    }
}
