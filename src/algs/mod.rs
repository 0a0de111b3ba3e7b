//! The three pluggable ranking algorithms (§4.C) and the server-state store
//! that hosts them (§4.B).
//!
//! The reference implementation models BIND/BMOD/AR-1 as an inheritance
//! chain (`base.State` <- `bind.State` <- `bmod.State`/`ar1.State`). Rust has
//! no classical inheritance, so each algorithm's state *embeds* the one
//! beneath it (BMOD embeds BIND, AR-1 embeds BIND) and forwards through it,
//! matching the "BMOD state embeds a BIND state" guidance from the design
//! notes. Locking is handled once, at the [`State`] boundary, rather than
//! being re-acquired by each embedded layer: every layer exposes a
//! non-locking `*_inner` method, and `State` is the sole public, locking
//! entry point. This replaces the source's reentrant mutex (needed because
//! its `observe` recurses through `super.observe` while holding the lock)
//! with a structure that never re-enters the lock at all.

pub mod ar1;
pub mod base;
pub mod bind;
pub mod bmod;

use std::collections::HashMap;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::question::{Rcode, Server};

/// Which ranking algorithm a [`State`] is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmKind {
    Bind,
    Bmod,
    Ar1,
}

/// Algorithm-specific parameters, validated at config load time (§6).
#[derive(Debug, Clone)]
pub enum Params {
    Bind(bind::BindParams),
    Bmod(bind::BindParams),
    Ar1(ar1::Ar1Params),
}

impl Params {
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            Params::Bind(_) => AlgorithmKind::Bind,
            Params::Bmod(_) => AlgorithmKind::Bmod,
            Params::Ar1(_) => AlgorithmKind::Ar1,
        }
    }
}

/// The live per-algorithm state for every known server, serialized as a
/// whole for snapshot/reload (§4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StateInner {
    Bind(bind::BindState),
    Bmod(bmod::BmodState),
    Ar1(ar1::Ar1State),
}

impl StateInner {
    pub fn new(params: &Params) -> Self {
        match params {
            Params::Bind(p) => StateInner::Bind(bind::BindState::new(p.clone())),
            Params::Bmod(p) => StateInner::Bmod(bmod::BmodState::new(p.clone())),
            Params::Ar1(p) => StateInner::Ar1(ar1::Ar1State::new(p.clone())),
        }
    }

    pub fn kind(&self) -> AlgorithmKind {
        match self {
            StateInner::Bind(_) => AlgorithmKind::Bind,
            StateInner::Bmod(_) => AlgorithmKind::Bmod,
            StateInner::Ar1(_) => AlgorithmKind::Ar1,
        }
    }

    fn add(&mut self, server: &str) {
        match self {
            StateInner::Bind(s) => s.add(server),
            StateInner::Bmod(s) => s.add(server),
            StateInner::Ar1(s) => s.add(server),
        }
    }

    fn observe(&mut self, server: &str, rtime: f64, code: Rcode, candidates: &[Server]) {
        match self {
            StateInner::Bind(s) => s.observe(server, rtime, code, candidates),
            StateInner::Bmod(s) => s.observe(server, rtime, code, candidates),
            StateInner::Ar1(s) => s.observe(server, rtime, code, candidates),
        }
    }

    fn rank(&self, server: &str) -> f64 {
        match self {
            StateInner::Bind(s) => s.rank(server),
            StateInner::Bmod(s) => s.rank(server),
            StateInner::Ar1(s) => s.rank(server),
        }
    }

    /// Re-bind algorithm parameters and re-add every configured server
    /// after a snapshot overwrote this state wholesale (§4.G).
    fn reconcile(&mut self, params: &Params, servers: &[Server]) {
        match (self, params) {
            (StateInner::Bind(s), Params::Bind(p)) => {
                s.params = p.clone();
            }
            (StateInner::Bmod(s), Params::Bmod(p)) => {
                s.bind.params = p.clone();
            }
            (StateInner::Ar1(s), Params::Ar1(p)) => {
                s.bind.params = p.bind.clone();
                s.params = p.clone();
            }
            _ => {}
        }
        for server in servers {
            match self {
                StateInner::Bind(s) => s.add(server),
                StateInner::Bmod(s) => s.add(server),
                StateInner::Ar1(s) => s.add(server),
            }
        }
    }

    /// Flattened `path -> value` rows per server, for report synthesis
    /// (§4.H). Keys are dot-joined exactly like the reference `dkpathed`.
    pub fn report_rows(&mut self) -> HashMap<Server, HashMap<String, serde_json::Value>> {
        match self {
            StateInner::Bind(s) => s.report_rows(),
            StateInner::Bmod(s) => s.report_rows(),
            StateInner::Ar1(s) => s.report_rows(),
        }
    }

    pub fn query_count(&self, server: &str) -> u64 {
        match self {
            StateInner::Bind(s) => s.base.sm.get(server).map(|m| m.count).unwrap_or(0),
            StateInner::Bmod(s) => s.bind.base.sm.get(server).map(|m| m.count).unwrap_or(0),
            StateInner::Ar1(s) => s.bind.base.sm.get(server).map(|m| m.count).unwrap_or(0),
        }
    }
}

/// Thread-safe handle to [`StateInner`]. This is the component described in
/// §4.B / §5: every mutating or reading operation takes the lock briefly and
/// releases it, in O(|candidates|) time.
#[derive(Debug)]
pub struct State {
    inner: parking_lot::Mutex<StateInner>,
}

impl State {
    pub fn new(params: &Params) -> Self {
        Self {
            inner: parking_lot::Mutex::new(StateInner::new(params)),
        }
    }

    /// Idempotently register a server with default entries in every
    /// per-server map (§4.B).
    pub fn add(&self, server: &str) {
        self.inner.lock().add(server);
    }

    /// Update this server's (and, for AR-1, every candidate's idle count)
    /// statistics from an observed response (§4.B, §4.C).
    pub fn observe(&self, server: &str, rtime: f64, code: Rcode, candidates: &[Server]) {
        self.inner.lock().observe(server, rtime, code, candidates);
    }

    /// Pure rank lookup for a single server, given current state.
    pub fn rank(&self, server: &str) -> f64 {
        self.inner.lock().rank(server)
    }

    /// Shuffle `servers` then stable-sort by ascending rank (§4.B, §8.6:
    /// ties broken by the pre-sort shuffle, fairly, across calls).
    pub fn ranked(&self, servers: &[Server]) -> Vec<Server> {
        let mut servers = servers.to_vec();
        servers.shuffle(&mut rand::rng());
        let inner = self.inner.lock();
        servers.sort_by(|a, b| {
            inner
                .rank(a)
                .partial_cmp(&inner.rank(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        servers
    }

    /// Deep-merge an externally supplied snapshot over the current state
    /// (snapshot wins), then reinstate every configured server (§4.G).
    ///
    /// Algorithm params are never persisted, so `params` is always the
    /// authority on which algorithm is active (§9): if the snapshot's
    /// variant doesn't match `params`'s kind (a reload changed the
    /// configured algorithm), the snapshot is discarded in favor of fresh,
    /// `params`-typed state rather than silently keeping the old variant
    /// around under the new algorithm's name.
    pub fn load(&self, snapshot: StateInner, params: &Params, servers: &[Server]) {
        let mut inner = self.inner.lock();
        *inner = if snapshot.kind() == params.kind() {
            snapshot
        } else {
            StateInner::new(params)
        };
        inner.reconcile(params, servers);
    }

    /// Snapshot the current state for persistence or reporting (§4.G,
    /// §6 `state.model_dump()`).
    pub fn dump(&self) -> StateInner {
        self.inner.lock().clone()
    }

    pub fn report_rows(&self) -> HashMap<Server, HashMap<String, serde_json::Value>> {
        self.inner.lock().report_rows()
    }

    pub fn query_count(&self, server: &str) -> u64 {
        self.inner.lock().query_count(server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::bind::BindParams;

    #[test]
    fn ranked_is_a_permutation() {
        let params = Params::Bind(BindParams::default());
        let state = State::new(&params);
        for s in ["a", "b", "c"] {
            state.add(s);
        }
        let servers = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut ranked = state.ranked(&servers);
        ranked.sort();
        let mut expected = servers.clone();
        expected.sort();
        assert_eq!(ranked, expected);
    }

    #[test]
    fn load_with_a_mismatched_algorithm_rebuilds_fresh_state_under_the_new_one() {
        let bind_params = Params::Bind(BindParams::default());
        let bind_state = State::new(&bind_params);
        bind_state.add("a");
        bind_state.observe("a", 0.05, Rcode::NoError, &["a".to_string()]);
        let snapshot = bind_state.dump();
        assert_eq!(snapshot.kind(), AlgorithmKind::Bind);

        let ar1_params = Params::Ar1(crate::algs::ar1::Ar1Params::default());
        let ar1_state = State::new(&ar1_params);
        let servers = vec!["a".to_string()];
        ar1_state.load(snapshot, &ar1_params, &servers);

        assert_eq!(ar1_state.dump().kind(), AlgorithmKind::Ar1);
        assert_eq!(ar1_state.query_count("a"), 0);
    }

    #[test]
    fn load_with_a_matching_algorithm_keeps_the_snapshot() {
        let params = Params::Bind(BindParams::default());
        let state = State::new(&params);
        state.add("a");
        state.observe("a", 0.05, Rcode::NoError, &["a".to_string()]);
        let snapshot = state.dump();

        let reloaded = State::new(&params);
        reloaded.load(snapshot, &params, &["a".to_string()]);

        assert_eq!(reloaded.query_count("a"), 1);
    }
}
