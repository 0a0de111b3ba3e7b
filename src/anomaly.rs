//! Synthetic latency injection for chaos-style experiments (§4.F).

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A single `(server-pattern, delay-seconds)` rule within an anomaly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delayer {
    pub pattern: String,
    #[serde(default)]
    pub delay: f64,

    #[serde(skip)]
    compiled: Option<Regex>,
}

impl Delayer {
    pub fn new(pattern: impl Into<String>, delay: f64) -> Result<Self, ConfigError> {
        let pattern = pattern.into();
        let compiled = Regex::new(&pattern).map_err(|e| ConfigError::BadDelayerPattern {
            pattern: pattern.clone(),
            source: e,
        })?;
        Ok(Self {
            pattern,
            delay,
            compiled: Some(compiled),
        })
    }

    pub fn compile(&mut self) -> Result<(), ConfigError> {
        if self.compiled.is_none() {
            self.compiled = Some(Regex::new(&self.pattern).map_err(|e| {
                ConfigError::BadDelayerPattern {
                    pattern: self.pattern.clone(),
                    source: e,
                }
            })?);
        }
        Ok(())
    }

    fn matches(&self, server: &str) -> bool {
        self.compiled
            .as_ref()
            .expect("delayer not compiled")
            .is_match(server)
    }
}

/// A queued anomaly: its delayers stay active for `limit` queries, or
/// indefinitely if `limit` is absent.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Anomaly {
    pub limit: Option<u64>,
    pub delayers: Vec<Delayer>,
}

/// Drives the active-anomaly state machine described in §4.H: pops the next
/// queued anomaly once the current one's query budget is exhausted.
#[derive(Debug, Default)]
pub struct AnomalyQueue {
    queue: Vec<Anomaly>,
    active: Option<Anomaly>,
}

impl AnomalyQueue {
    pub fn new(queue: Vec<Anomaly>) -> Self {
        Self {
            queue,
            active: None,
        }
    }

    /// Ensure there's a usable active anomaly, popping from the queue while
    /// the current one (if any) has a zero/expired limit.
    pub fn prep(&mut self) {
        loop {
            match &self.active {
                Some(a) if a.limit.is_none_or(|l| l > 0) => return,
                _ => {
                    if self.queue.is_empty() {
                        self.active = None;
                        return;
                    }
                    self.active = Some(self.queue.remove(0));
                }
            }
        }
    }

    /// Find the first delayer whose pattern matches `server`, returning its
    /// configured delay (0.0 if no anomaly is active or nothing matches),
    /// then decrement the active anomaly's query budget.
    pub fn delay_for(&mut self, server: &str) -> f64 {
        self.prep();
        let delay = self
            .active
            .as_ref()
            .and_then(|a| a.delayers.iter().find(|d| d.matches(server)))
            .map(|d| d.delay)
            .unwrap_or(0.0);
        if let Some(active) = self.active.as_mut() {
            if let Some(limit) = active.limit.as_mut() {
                *limit = limit.saturating_sub(1);
            }
        }
        delay
    }
}
