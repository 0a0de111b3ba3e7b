//! AR-1 autoregressive server-selection algorithm (§4.C.3).
//!
//! S. Deb, A. Srinivasan and S. Kuppili Pavan, "An improved DNS server
//! selection algorithm for faster lookups," COMSWARE '08, pp. 288-295.
//! Falls back to plain BIND ranking until a server has enough samples to
//! trust its AR prediction.
//!
//! Deviation from the source worth calling out: there, each `ARStats`
//! instance holds a live reference to the shared `Params` object, updated
//! in place whenever the owning `State` is reconfigured. Rust has no
//! shared, rebindable field like that without a `Rc`/`Arc` wrapper we don't
//! otherwise need, so `ArStats` methods take `&Ar1Params` as an argument
//! instead of storing one. `Ar1State` still owns the single canonical copy.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::algs::bind::{BindParams, BindState};
use crate::question::{Rcode, Server};
use crate::stats::RunningVariance;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ar1Params {
    pub bind: BindParams,
    /// Minimum sample size before the AR prediction is trusted for a server.
    pub p_count_min: u64,
    /// Lower clamp for the AR volatility parameter (alpha).
    pub alpha_min: f64,
    /// Upper clamp for the AR volatility parameter (alpha).
    pub alpha_max: f64,
    /// Idle-query count above which a server is forced back into rotation.
    pub idle_max: u64,
    /// Minimum sample size before the deviation-reset counter is checked.
    pub drc_count_min: u64,
    /// Consecutive highly-deviant responses required to trigger a reset.
    pub drc_consec: u64,
    /// How many standard deviations from the mean counts as "highly deviant".
    pub drc_stdev_co: f64,
}

impl Default for Ar1Params {
    fn default() -> Self {
        Self {
            bind: BindParams::default(),
            p_count_min: 4,
            alpha_min: 0.1,
            alpha_max: 0.9,
            idle_max: 100,
            drc_count_min: 50,
            drc_consec: 5,
            drc_stdev_co: 2.0,
        }
    }
}

/// Per-server AR bookkeeping: a running variance plus the extra terms
/// needed for the formula (5) alpha estimate and the formula (4) prediction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArStats {
    pub rv: RunningVariance,
    pub p: f64,
    pub alpha: f64,
    pub latest: f64,
    pub mean_xy: f64,
    pub mean_v2: f64,
    pub idle: u64,
    pub drc: u64,
}

impl ArStats {
    /// Reset all tracked statistics but seed alpha at its configured floor,
    /// matching the source's "restart the complete estimation" behavior.
    pub fn reset(&mut self, params: &Ar1Params) {
        *self = ArStats {
            alpha: params.alpha_min,
            ..ArStats::default()
        };
    }

    pub fn observe(&mut self, rtime: f64, params: &Ar1Params) {
        if self.rv.count > 0 {
            if (rtime - self.rv.mean).abs() > self.rv.stdev * params.drc_stdev_co {
                self.drc += 1;
            } else {
                self.drc = 0;
            }
            if self.drc >= params.drc_consec && self.rv.count >= params.drc_count_min {
                self.reset(params);
            }
        }
        self.rv.observe(rtime);
        let count = self.rv.count as f64;
        self.mean_v2 += (rtime * rtime - self.mean_v2) / count;
        if self.rv.count > 1 {
            self.mean_xy += (self.latest * rtime) / (self.rv.count - 1) as f64;
            // Formula (5), p. 4: alpha = (E[X(q)X(q-1)] - E[X]^2) / (E[X^2] - E[X]^2).
            // The paper's stated denominator is E[X^2] - E[X^2], which is
            // identically zero; this is that term re-derived to make the
            // formula well-defined.
            let mean2 = self.rv.mean * self.rv.mean;
            let denom = self.mean_v2 - mean2;
            // A run of identical response times drives both numerator and
            // denominator to exactly zero (the source's ZeroDivisionError
            // path); floor straight to alpha_min rather than dividing, since
            // Rust's 0.0 / 0.0 is NaN and NaN survives `f64::clamp` instead
            // of being laundered into a bound like Python's chained min/max.
            self.alpha = if denom == 0.0 {
                params.alpha_min
            } else {
                ((self.mean_xy - mean2) / denom).clamp(params.alpha_min, params.alpha_max)
            };
        }
        self.latest = rtime;
        self.idle = 0;
    }

    /// Formula (4), p. 4: prediction(X(q)) = alpha^k * X(q-k) + (1-alpha^k) * E[X].
    pub fn predict(&mut self) {
        let atok = self.alpha.powf((self.idle + 1) as f64);
        self.p = atok * self.latest + (1.0 - atok) * self.rv.mean;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ar1State {
    pub bind: BindState,
    pub sar: HashMap<Server, ArStats>,
    #[serde(skip)]
    pub params: Ar1Params,
}

impl Ar1State {
    pub fn new(params: Ar1Params) -> Self {
        Self {
            bind: BindState::new(params.bind),
            sar: HashMap::new(),
            params,
        }
    }

    pub fn add(&mut self, server: &str) {
        self.bind.add(server);
        self.sar.entry(server.to_string()).or_insert_with(|| {
            let mut ar = ArStats::default();
            ar.reset(&self.params);
            ar
        });
    }

    pub fn observe(&mut self, server: &str, rtime: f64, code: Rcode, candidates: &[Server]) {
        self.bind.observe(server, rtime, code, candidates);
        let params = self.params;
        for si in candidates {
            let Some(ari) = self.sar.get_mut(si) else {
                continue;
            };
            if si == server {
                ari.observe(rtime, &params);
            } else {
                ari.idle += 1;
            }
            if ari.rv.count >= params.p_count_min {
                ari.predict();
            }
        }
    }

    /// Idle-first override, then AR prediction, falling back to plain BIND
    /// ranking while the prediction is still zero (not enough samples).
    pub fn rank(&self, server: &str) -> f64 {
        let Some(ar) = self.sar.get(server) else {
            return self.bind.rank(server);
        };
        if ar.idle > self.params.idle_max {
            return -(ar.idle as f64);
        }
        if ar.p != 0.0 {
            return ar.p;
        }
        self.bind.rank(server)
    }

    pub fn report_rows(&mut self) -> HashMap<Server, HashMap<String, serde_json::Value>> {
        let mut rows = self.bind.report_rows();
        for (server, ar) in &self.sar {
            let row = rows.entry(server.clone()).or_default();
            row.insert("ar.p".to_string(), json!(ar.p));
            row.insert("ar.alpha".to_string(), json!(ar.alpha));
            row.insert("ar.idle".to_string(), json!(ar.idle));
            row.insert("ar.count".to_string(), json!(ar.rv.count));
        }
        rows
    }
}
