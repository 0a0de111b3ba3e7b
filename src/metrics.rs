//! Prometheus metrics for the resolver core (§10.4). Mirrors the teacher's
//! `DnsMetrics` registry/collector shape (`prometheus::Registry` +
//! `opts!`/`histogram_opts!` + `TextEncoder::export`), with the collector set
//! narrowed to what this forwarder's orchestrator actually produces:
//! queries by rcode, per-server request/response counts and response-time
//! distribution, retries, active-anomaly state, and snapshot age.
//!
//! Exposition is hand-rolled against a bare `tokio::net::TcpListener`
//! instead of the teacher's `axum` router: a single `/metrics` scrape
//! endpoint doesn't carry its weight (see `DESIGN.md`).

use prometheus::{CounterVec, Encoder, Gauge, HistogramVec, IntCounter, Registry, TextEncoder, histogram_opts, opts};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::question::Response;

/// Prometheus collectors for the orchestrator (§10.4).
pub struct WardenMetrics {
    registry: Registry,

    queries_total: CounterVec,
    retries_total: IntCounter,
    server_requests: CounterVec,
    server_responses: CounterVec,
    server_response_time: HistogramVec,
    active_anomalies: Gauge,
    snapshot_age_seconds: Gauge,
}

impl WardenMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let queries_total = CounterVec::new(
            opts!("warden_queries_total", "Total queries handled, by response code"),
            &["rcode"],
        )?;
        let retries_total = IntCounter::with_opts(opts!(
            "warden_retries_total",
            "Total SERVFAIL retries issued across all queries"
        ))?;
        let server_requests = CounterVec::new(
            opts!("warden_server_requests_total", "Requests sent to each upstream server"),
            &["server"],
        )?;
        let server_responses = CounterVec::new(
            opts!(
                "warden_server_responses_total",
                "Responses received from each upstream server, by response code"
            ),
            &["server", "rcode"],
        )?;
        let server_response_time = HistogramVec::new(
            histogram_opts!(
                "warden_server_response_seconds",
                "Observed response time per upstream server"
            ),
            &["server"],
        )?;
        let active_anomalies = Gauge::with_opts(opts!(
            "warden_active_anomalies",
            "1 if a synthetic delay anomaly is currently active, else 0"
        ))?;
        let snapshot_age_seconds = Gauge::with_opts(opts!(
            "warden_snapshot_age_seconds",
            "Seconds since the state snapshot was last saved"
        ))?;

        registry.register(Box::new(queries_total.clone()))?;
        registry.register(Box::new(retries_total.clone()))?;
        registry.register(Box::new(server_requests.clone()))?;
        registry.register(Box::new(server_responses.clone()))?;
        registry.register(Box::new(server_response_time.clone()))?;
        registry.register(Box::new(active_anomalies.clone()))?;
        registry.register(Box::new(snapshot_age_seconds.clone()))?;

        Ok(Self {
            registry,
            queries_total,
            retries_total,
            server_requests,
            server_responses,
            server_response_time,
            active_anomalies,
            snapshot_age_seconds,
        })
    }

    /// Fold a completed query's outcome into the collectors (§10.4).
    pub fn observe_response(&self, resp: &Response) {
        self.queries_total
            .with_label_values(&[&resp.code.to_string()])
            .inc();
        self.server_requests.with_label_values(&[&resp.server]).inc();
        self.server_responses
            .with_label_values(&[&resp.server, &resp.code.to_string()])
            .inc();
        self.server_response_time
            .with_label_values(&[&resp.server])
            .observe(resp.rtime);
        if let Some(failed) = &resp.failed {
            self.retries_total.inc_by(failed.len() as u64);
            for server in failed {
                self.server_requests.with_label_values(&[server]).inc();
            }
        }
    }

    pub fn set_active_anomaly(&self, active: bool) {
        self.active_anomalies.set(if active { 1.0 } else { 0.0 });
    }

    pub fn set_snapshot_age_seconds(&self, age: f64) {
        self.snapshot_age_seconds.set(age);
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

/// Serve `/metrics` over plain HTTP/1.1 until the listener is dropped.
/// Minimal by design (§10.4): a single fixed route, no keep-alive, no
/// routing table, the way a binary-level concern should stay out of the
/// core library.
pub async fn serve(metrics: std::sync::Arc<WardenMetrics>, addr: std::net::SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    debug!(%addr, "metrics endpoint listening");
    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            if socket.read(&mut buf).await.is_err() {
                return;
            }
            let body = match metrics.export() {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, %peer, "failed to render metrics");
                    return;
                }
            };
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::{Question, RdClass, RdType, Rcode};

    fn sample_response(server: &str, code: Rcode, rtime: f64) -> Response {
        Response {
            id: 1,
            server: server.to_string(),
            rtime,
            q: Question::new("example.com", RdType::A, RdClass::In, 0x100),
            code,
            flags: 0,
            rrset: vec![],
            arset: vec![],
            auset: vec![],
            tag: None,
            failed: None,
            ername: None,
        }
    }

    #[test]
    fn observe_response_increments_query_and_server_counters() {
        let metrics = WardenMetrics::new().unwrap();
        metrics.observe_response(&sample_response("a", Rcode::NoError, 0.01));
        let text = metrics.export().unwrap();
        assert!(text.contains("warden_queries_total"));
        assert!(text.contains("warden_server_requests_total"));
        assert!(text.contains("warden_server_response_seconds"));
    }

    #[test]
    fn failed_attempts_count_toward_retries() {
        let metrics = WardenMetrics::new().unwrap();
        let mut resp = sample_response("b", Rcode::NoError, 0.02);
        resp.failed = Some(vec!["a".to_string()]);
        metrics.observe_response(&resp);
        let text = metrics.export().unwrap();
        assert!(text.contains("warden_retries_total 1"));
    }

    #[test]
    fn active_anomaly_gauge_toggles() {
        let metrics = WardenMetrics::new().unwrap();
        metrics.set_active_anomaly(true);
        assert!(metrics.export().unwrap().contains("warden_active_anomalies 1"));
        metrics.set_active_anomaly(false);
        assert!(metrics.export().unwrap().contains("warden_active_anomalies 0"));
    }
}
