//! Backend stubs satisfying the external backend contract (§6): mock, static
//! file-backed, and refusal resolvers. The real UDP/TCP upstream transport is
//! out of scope (§1); these exist for tests and for exercising the core
//! without a live network.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;

use crate::question::{BackendResponse, ErName, Question, Rcode, RdClass, RdType, Server};

/// `(question, timeout_seconds, use_tcp) -> BackendResponse`, memoized per
/// server string the way the source caches `resolve_backend` (§9 design
/// notes: "a concurrent map with clear-on-reload semantics").
pub trait Backend: Send + Sync {
    fn resolve(&self, q: &Question, lifetime: f64, tcp: bool) -> BackendResponse;
}

/// Always answers REFUSED with zero added latency.
pub struct RefuseBackend;

impl Backend for RefuseBackend {
    fn resolve(&self, _q: &Question, _lifetime: f64, _tcp: bool) -> BackendResponse {
        BackendResponse {
            code: Rcode::Refused,
            ..Default::default()
        }
    }
}

/// Synthetic server with configurable base latency `r` and volatility `v`:
/// response time is `r * (1 + uniform(0, v))`. Exceeding the caller's
/// lifetime budget yields a SERVFAIL/Timeout instead of an answer.
pub struct MockBackend {
    pub r: f64,
    pub v: f64,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self { r: 0.005, v: 0.1 }
    }
}

impl Backend for MockBackend {
    fn resolve(&self, q: &Question, lifetime: f64, _tcp: bool) -> BackendResponse {
        let d: f64 = rand::rng().random_range(0.0..self.v.max(f64::MIN_POSITIVE));
        let mut rtime = self.r * (1.0 + d);
        if rtime >= lifetime {
            return BackendResponse {
                code: Rcode::ServFail,
                rtime: lifetime,
                ername: Some(ErName::Timeout),
                ..Default::default()
            };
        }
        let mut rrset = Vec::new();
        if q.rdclass == RdClass::In && matches!(q.rdtype, RdType::A | RdType::Aaaa) {
            let count = size_directive(q.qname()).unwrap_or(1);
            for i in 0..count {
                let addr = match q.rdtype {
                    RdType::A => format!("10.0.{}.{}", (i / 254) + 1, (i % 254) + 1),
                    _ => format!("fe80::{:x}", i + 1),
                };
                rrset.push(format!("{} 0 {} {} {}", q.qname(), q.rdclass, q.rdtype, addr));
            }
        }
        rtime = rtime.max(0.0);
        BackendResponse {
            code: Rcode::NoError,
            rtime,
            rrset,
            ..Default::default()
        }
    }
}

/// `<n>.size.example.` requests n answer records from [`MockBackend`].
fn size_directive(qname: &str) -> Option<usize> {
    let rest = qname.strip_suffix(".size.example")?;
    rest.parse().ok()
}

/// A static map of `"qname rdclass rdtype" -> BackendResponse`, loaded once
/// at construction, mirroring the source's YAML zone-file backend.
pub struct FileBackend {
    records: HashMap<String, BackendResponse>,
}

impl FileBackend {
    pub fn new(records: HashMap<String, BackendResponse>) -> Self {
        Self { records }
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        let records: HashMap<String, BackendResponse> = serde_yaml::from_str(contents)?;
        Ok(Self::new(records))
    }

    fn key(q: &Question) -> String {
        format!("{} {} {}", q.qname(), q.rdclass, q.rdtype)
    }
}

impl Backend for FileBackend {
    fn resolve(&self, q: &Question, _lifetime: f64, _tcp: bool) -> BackendResponse {
        self.records.get(&Self::key(q)).cloned().unwrap_or_default()
    }
}

/// Parse a server identifier into its backend, following the source's
/// `resolve_backend` dispatch: `refuse`, `mock[@k=v,...]`, `file@path`, or
/// (unsupported here, since real network transport is out of scope) a bare
/// `host[@port]`, which falls back to [`RefuseBackend`].
pub fn build_backend(server: &str) -> Arc<dyn Backend> {
    let lower = server.to_ascii_lowercase();
    if lower == "refuse" {
        return Arc::new(RefuseBackend);
    }
    if let Some(rest) = server.strip_prefix("mock") {
        let mut mock = MockBackend::default();
        if let Some(opts) = rest.strip_prefix('@') {
            for kv in opts.split(',').filter(|s| !s.is_empty()) {
                if let Some((k, v)) = kv.split_once('=') {
                    match (k, v.parse::<f64>()) {
                        ("r", Ok(val)) => mock.r = val,
                        ("v", Ok(val)) => mock.v = val,
                        _ => {}
                    }
                }
            }
        }
        return Arc::new(mock);
    }
    if let Some(path) = server.strip_prefix("file@") {
        return match std::fs::read_to_string(path).ok().and_then(|s| FileBackend::from_yaml(&s).ok()) {
            Some(backend) => Arc::new(backend),
            None => Arc::new(RefuseBackend),
        };
    }
    Arc::new(RefuseBackend)
}

/// Memoized backend registry: one [`Backend`] instance per server string,
/// cleared wholesale on config reload (§9).
#[derive(Default)]
pub struct BackendRegistry {
    cache: DashMap<Server, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, server: &str) -> Arc<dyn Backend> {
        if let Some(backend) = self.cache.get(server) {
            return backend.clone();
        }
        let backend = build_backend(server);
        self.cache.insert(server.to_string(), backend.clone());
        backend
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::{Question, RdClass, RdType};

    #[test]
    fn refuse_backend_always_refuses() {
        let backend = RefuseBackend;
        let q = Question::new("example.com", RdType::A, RdClass::In, 0x100);
        assert_eq!(backend.resolve(&q, 1.0, false).code, Rcode::Refused);
    }

    #[test]
    fn mock_backend_times_out_when_lifetime_too_small() {
        let backend = MockBackend { r: 1.0, v: 0.0 };
        let q = Question::new("example.com", RdType::A, RdClass::In, 0x100);
        let rep = backend.resolve(&q, 0.01, false);
        assert_eq!(rep.code, Rcode::ServFail);
        assert_eq!(rep.ername, Some(ErName::Timeout));
    }

    #[test]
    fn mock_backend_honors_size_directive() {
        let backend = MockBackend { r: 0.001, v: 0.0 };
        let q = Question::new("3.size.example", RdType::A, RdClass::In, 0x100);
        let rep = backend.resolve(&q, 5.0, false);
        assert_eq!(rep.rrset.len(), 3);
    }

    #[test]
    fn registry_memoizes_and_clears() {
        let registry = BackendRegistry::new();
        let a = registry.get("refuse");
        let b = registry.get("refuse");
        assert!(Arc::ptr_eq(&a, &b));
        registry.clear();
        let c = registry.get("refuse");
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
