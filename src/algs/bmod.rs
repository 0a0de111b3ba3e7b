//! BMOD: an experimental BIND variant that penalizes slow servers more
//! aggressively (§4.C.2).
//!
//! Tracks a second value RM per server, computed exactly like BIND's R but
//! *without* the non-selected-server discount, and keeps each server's R at
//! `max(R, RM)` so a slow server's rank never benefits from decaying back
//! down while idle.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::algs::bind::{BindParams, BindState};
use crate::question::{Rcode, Server};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BmodState {
    pub bind: BindState,
    pub srm: HashMap<Server, f64>,
}

impl BmodState {
    pub fn new(params: BindParams) -> Self {
        Self {
            bind: BindState::new(params),
            srm: HashMap::new(),
        }
    }

    pub fn add(&mut self, server: &str) {
        self.bind.add(server);
        self.srm.entry(server.to_string()).or_insert(0.0);
    }

    pub fn observe(&mut self, server: &str, rtime: f64, code: Rcode, candidates: &[Server]) {
        self.bind.observe(server, rtime, code, candidates);
        let rm_prev = *self.srm.get(server).unwrap_or(&0.0);
        let a = if rm_prev == 0.0 { 0.0 } else { self.bind.params.a };
        let rm = a * rm_prev + (1.0 - a) * rtime;
        self.srm.insert(server.to_string(), rm);
        let r = self.bind.sr.get(server).copied().unwrap_or(0.0);
        self.bind.sr.insert(server.to_string(), r.max(rm));
    }

    pub fn rank(&self, server: &str) -> f64 {
        self.bind.rank(server)
    }

    pub fn report_rows(&mut self) -> HashMap<Server, HashMap<String, serde_json::Value>> {
        let mut rows = self.bind.report_rows();
        for (server, rm) in &self.srm {
            rows.entry(server.clone())
                .or_default()
                .insert("rm".to_string(), json!(rm));
        }
        rows
    }
}
