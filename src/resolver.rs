//! Query orchestrator (§4.E): select candidates, rank them, attempt each in
//! order, retry SERVFAILs up to budget, and feed outcomes back into the
//! ranking state.

use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::algs::{AlgorithmKind, Params, State};
use crate::anomaly::AnomalyQueue;
use crate::backend::BackendRegistry;
use crate::config::Config;
use crate::error::{Result, WardenError};
use crate::question::{Question, Response, Server};
use crate::routing::{self, DomainRule};

static QUERY_ID_COUNTER: AtomicU16 = AtomicU16::new(1);

fn next_query_id() -> u16 {
    QUERY_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// One structured line per completed query (SPEC_FULL.md §10.3), grounded
/// on `original_source/dnsss/server.py`'s `replog.info(...)` (a dedicated
/// response logger distinct from `logger`, fired once per `report()` call
/// with the server, tag, and rcode folded in alongside the response).
fn log_response(resp: &Response) {
    info!(
        target: "wardendns::response",
        server = %resp.server,
        tag = resp.tag.as_deref().unwrap_or(""),
        code = %resp.code,
        rtime = resp.rtime,
        failed = resp.failed.as_ref().map(|f| f.len()).unwrap_or(0),
        "query resolved"
    );
}

/// Owns Config and State exclusively (§5 resource ownership); the backend
/// registry and anomaly queue are its own private collaborators.
pub struct Resolver {
    config: Config,
    state: State,
    backends: BackendRegistry,
    anomalies: Mutex<AnomalyQueue>,
}

impl Resolver {
    pub fn new(config: Config) -> Self {
        let state = State::new(&config.params);
        for server in &config.servers {
            state.add(server);
        }
        for rule in &config.rules {
            for server in &rule.servers {
                state.add(server);
            }
        }
        let anomalies = Mutex::new(AnomalyQueue::new(config.anomalies.clone()));
        Self {
            config,
            state,
            backends: BackendRegistry::new(),
            anomalies,
        }
    }

    pub fn algorithm_kind(&self) -> AlgorithmKind {
        self.config.params.kind()
    }

    pub fn rules(&self) -> &[DomainRule] {
        &self.config.rules
    }

    pub fn default_servers(&self) -> &[Server] {
        &self.config.servers
    }

    /// Candidate server set + routing tag for a question (§4.D).
    fn select(&self, q: &Question) -> (Vec<Server>, String) {
        let (servers, tag) = routing::select(q.qname(), &self.config.rules, &self.config.servers);
        (servers.to_vec(), tag)
    }

    /// Default per-server timeout hook; algorithm-specific resolvers may
    /// override this in principle, but none of BIND/BMOD/AR-1 do (§4.E).
    fn lifetime(&self, _server: &str, _q: &Question) -> f64 {
        self.config.timeout_max
    }

    /// Run a query to completion. Infallible except for "no candidates"
    /// (§7, §10.2): every backend failure mode is folded into the returned
    /// `Response`.
    pub fn query(&self, q: Question) -> Result<Response> {
        let (candidates, tag) = self.select(&q);
        if candidates.is_empty() {
            return Err(WardenError::NoCandidates {
                qname: q.qname().to_string(),
            });
        }
        let mut failed: Vec<Server> = Vec::new();

        // Open-question resolution (§9): bound total attempts at
        // retries_max + 1 so a pathological all-SERVFAIL pass can't loop
        // forever without ever exhausting the retry budget.
        let max_attempts = self.config.retries_max + 1;
        let mut attempts = 0u64;

        loop {
            let ranked = self.state.ranked(&candidates);
            let mut outcome = None;
            for server in &ranked {
                attempts += 1;
                let delay = self.anomalies.lock().delay_for(server);
                let mut lifetime = self
                    .lifetime(server, &q)
                    .clamp(self.config.timeout_min, self.config.timeout_max);
                let delay = delay.min(lifetime);
                lifetime -= delay;

                let backend = self.backends.get(server);
                let t0 = Instant::now() - std::time::Duration::from_secs_f64(delay.max(0.0));
                let mut rep = backend.resolve(&q, lifetime, self.config.tcp);
                rep.rtime += t0.elapsed().as_secs_f64();

                self.state.observe(server, rep.rtime, rep.code, &ranked);
                debug!(server = %server, tag = %tag, code = %rep.code, rtime = rep.rtime, "queried server");

                let retry_budget_left = (failed.len() as u64) < self.config.retries_max;
                if rep.code == crate::question::Rcode::ServFail
                    && retry_budget_left
                    && attempts < max_attempts
                {
                    failed.push(server.clone());
                    continue;
                }
                outcome = Some((server.clone(), rep));
                break;
            }
            match outcome {
                Some((server, rep)) => {
                    if !failed.is_empty() {
                        warn!(server = %server, retries = failed.len(), "resolved after retry");
                    }
                    let resp = Response {
                        id: if rep.id != 0 { rep.id } else { next_query_id() },
                        server,
                        rtime: rep.rtime,
                        q,
                        code: rep.code,
                        flags: rep.flags,
                        rrset: rep.rrset,
                        arset: rep.arset,
                        auset: rep.auset,
                        tag: Some(tag),
                        failed: if failed.is_empty() { None } else { Some(failed) },
                        ername: rep.ername,
                    };
                    log_response(&resp);
                    return Ok(resp);
                }
                None => {
                    if attempts >= max_attempts {
                        // Every candidate SERVFAILed and the retry budget
                        // (plus the hard attempt bound) is exhausted:
                        // surface a terminal SERVFAIL rather than loop.
                        let server = ranked.last().cloned().unwrap_or_default();
                        info!(qname = q.qname(), "retry budget exhausted, returning SERVFAIL");
                        let resp = Response {
                            id: next_query_id(),
                            server,
                            rtime: 0.0,
                            q,
                            code: crate::question::Rcode::ServFail,
                            flags: 0,
                            rrset: vec![],
                            arset: vec![],
                            auset: vec![],
                            tag: Some(tag),
                            failed: Some(failed),
                            ername: None,
                        };
                        log_response(&resp);
                        return Ok(resp);
                    }
                    continue;
                }
            }
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn reload_backends(&self) {
        self.backends.clear();
    }
}
