//! BIND server-selection algorithm (§4.C.1).
//!
//! S. Deb, A. Srinivasan and S. Kuppili Pavan, "An improved DNS server
//! selection algorithm for faster lookups," 2008 3rd International
//! Conference on Communication Systems Software and Middleware and
//! Workshops (COMSWARE '08), pp. 288-295.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::algs::base::BaseState;
use crate::question::{Rcode, Server};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BindParams {
    /// Weight given to the prior R value of the queried server. The new
    /// observation gets weight `1 - a`.
    pub a: f64,
    /// Per-query discount applied to every server that was *not* queried,
    /// so it eventually becomes attractive enough to be selected again.
    pub g: f64,
}

impl Default for BindParams {
    fn default() -> Self {
        Self { a: 0.7, g: 0.98 }
    }
}

/// R values, one per server: a biased running estimate of expected
/// response time that decays for servers not recently queried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindState {
    pub base: BaseState,
    pub sr: HashMap<Server, f64>,
    #[serde(skip)]
    pub params: BindParams,
}

impl BindState {
    pub fn new(params: BindParams) -> Self {
        Self {
            base: BaseState::default(),
            sr: HashMap::new(),
            params,
        }
    }

    pub fn add(&mut self, server: &str) {
        self.base.add(server);
        self.sr.entry(server.to_string()).or_insert(0.0);
    }

    /// Update the queried server's R value toward the observed response
    /// time, and decay every other candidate's R value by `g` (§4.C.1).
    pub fn observe(&mut self, server: &str, rtime: f64, code: Rcode, candidates: &[Server]) {
        self.base.observe(server, rtime, code);
        for si in candidates {
            let ri = *self.sr.get(si).unwrap_or(&0.0);
            let r = if si == server {
                // On the first query to a server, Ri is exactly 0.0, which
                // forces a -> 0 so the initial R equals the first observed
                // response time outright.
                let a = if ri == 0.0 { 0.0 } else { self.params.a };
                a * ri + (1.0 - a) * rtime
            } else {
                self.params.g * ri
            };
            self.sr.insert(si.clone(), r);
        }
    }

    /// Rank by least R value: lower means "contact sooner".
    pub fn rank(&self, server: &str) -> f64 {
        *self.sr.get(server).unwrap_or(&0.0)
    }

    pub fn report_rows(&mut self) -> HashMap<Server, HashMap<String, serde_json::Value>> {
        let mut rows: HashMap<Server, HashMap<String, serde_json::Value>> = HashMap::new();
        for server in self.base.servers() {
            let mut fields = self.base.report_fields(&server);
            fields.insert("r".to_string(), json!(self.rank(&server)));
            rows.insert(server, fields);
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two servers, one fast and consistently selected, one always losing
    /// out: the fast server's R value should converge near its response
    /// time while the other decays toward zero.
    #[test]
    fn fast_server_converges_slow_server_decays() {
        let mut s = BindState::new(BindParams::default());
        s.add("fast");
        s.add("slow");
        let candidates = vec!["fast".to_string(), "slow".to_string()];
        for _ in 0..50 {
            s.observe("fast", 10.0, Rcode::NoError, &candidates);
        }
        assert!((s.rank("fast") - 10.0).abs() < 0.5);
        assert!(s.rank("slow") < 1e-6);
    }

    #[test]
    fn first_observation_sets_r_to_rtime_exactly() {
        let mut s = BindState::new(BindParams::default());
        s.add("a");
        s.add("b");
        let candidates = vec!["a".to_string(), "b".to_string()];
        s.observe("a", 42.0, Rcode::NoError, &candidates);
        assert_eq!(s.rank("a"), 42.0);
    }

    #[test]
    fn non_queried_server_decays_by_g() {
        let mut s = BindState::new(BindParams { a: 0.7, g: 0.98 });
        s.add("a");
        s.add("b");
        let candidates = vec!["a".to_string(), "b".to_string()];
        s.observe("a", 10.0, Rcode::NoError, &candidates);
        s.sr.insert("b".to_string(), 5.0);
        s.observe("a", 10.0, Rcode::NoError, &candidates);
        assert!((s.rank("b") - 5.0 * 0.98).abs() < 1e-12);
    }
}
