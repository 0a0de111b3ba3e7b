//! Shared base state: per-server and global response-time means (§4.A, §4.B).
//! BIND, BMOD and AR-1 all build on this; none of them use it directly as a
//! standalone algorithm (the reference's `base.State` is abstract for the
//! same reason).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::question::{Rcode, Server};
use crate::stats::{RunningMean, RunningRate};

/// Per-server response-time mean plus a global mean across all servers,
/// updated on every observed (non-excluded) response. Also tracks a
/// per-server query rate, used only for reporting (§4.A) and therefore not
/// persisted across a snapshot/reload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaseState {
    pub sm: HashMap<Server, RunningMean>,
    pub global: RunningMean,
    #[serde(skip)]
    pub rate: HashMap<Server, RunningRate>,
}

impl BaseState {
    pub fn add(&mut self, server: &str) {
        self.sm.entry(server.to_string()).or_default();
        self.rate.entry(server.to_string()).or_default();
    }

    /// Fold `rtime` into both the per-server and global means, and count the
    /// query against the server's rate window. The source records every
    /// observed rtime here regardless of rcode; SERVFAIL is only
    /// special-cased by the orchestrator's retry accounting (§4.E), not by
    /// the running mean or rate.
    pub fn observe(&mut self, server: &str, rtime: f64, _code: Rcode) {
        self.sm.entry(server.to_string()).or_default().observe(rtime);
        self.global.observe(rtime);
        self.rate.entry(server.to_string()).or_default().inc(1);
    }

    pub fn mean_for(&self, server: &str) -> f64 {
        self.sm.get(server).map(|m| m.mean).unwrap_or(0.0)
    }

    /// Every server with at least a mean entry, for report iteration order.
    pub fn servers(&self) -> Vec<Server> {
        self.sm.keys().cloned().collect()
    }

    /// Flattened report fields for one server: `m.count`, `m.mean`, and the
    /// current `rate.qps` (rolling its window as a side effect, matching
    /// [`RunningRate::val`]'s mutate-on-read contract).
    pub fn report_fields(&mut self, server: &str) -> HashMap<String, serde_json::Value> {
        let mut fields = HashMap::new();
        if let Some(mean) = self.sm.get(server) {
            fields.insert("m.count".to_string(), json!(mean.count));
            fields.insert("m.mean".to_string(), json!(mean.mean));
        }
        let qps = self.rate.entry(server.to_string()).or_default().val();
        fields.insert("rate.qps".to_string(), json!(qps));
        fields
    }
}
