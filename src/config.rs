//! Configuration loading: built-in defaults, overlaid by an optional TOML
//! file, overlaid by `WARDEN_*` environment variables, overlaid by CLI flags
//! (§10.1). Mirrors the teacher's `Default` + `from_env` + `validate` shape.

use std::path::PathBuf;

use serde::Deserialize;

use crate::algs::ar1::Ar1Params;
use crate::algs::bind::BindParams;
use crate::algs::{AlgorithmKind, Params};
use crate::anomaly::{Anomaly, Delayer};
use crate::error::ConfigError;
use crate::routing::DomainRule;

/// On-disk / over-the-wire representation of a domain rule, before its
/// regexes are compiled (§10.1).
#[derive(Debug, Clone, Deserialize)]
pub struct RawDomainRule {
    pub domain: String,
    #[serde(default)]
    pub exclude: Vec<String>,
    pub servers: Vec<String>,
    #[serde(default)]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawDelayer {
    pub pattern: String,
    #[serde(default)]
    pub delay: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAnomaly {
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub delayers: Vec<RawDelayer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBindParams {
    pub a: Option<f64>,
    pub g: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAr1Params {
    pub a: Option<f64>,
    pub g: Option<f64>,
    pub p_count_min: Option<u64>,
    pub alpha_min: Option<f64>,
    pub alpha_max: Option<f64>,
    pub idle_max: Option<u64>,
    pub drc_count_min: Option<u64>,
    pub drc_consec: Option<u64>,
    pub drc_stdev_co: Option<f64>,
}

/// Raw TOML document shape; every field optional so a file may set as few or
/// as many as it likes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfig {
    pub servers: Option<Vec<String>>,
    pub rules: Option<Vec<RawDomainRule>>,
    pub timeout_min: Option<f64>,
    pub timeout_max: Option<f64>,
    pub retries_max: Option<u64>,
    pub tcp: Option<bool>,
    pub algorithm: Option<String>,
    pub bind: Option<RawBindParams>,
    pub bmod: Option<RawBindParams>,
    pub ar1: Option<RawAr1Params>,
    pub anomalies: Option<Vec<RawAnomaly>>,
    pub state_file: Option<String>,
    pub autosave_secs: Option<u64>,
}

impl RawConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Overlay `other` on top of `self`: any field `other` sets wins.
    pub fn merge(mut self, other: RawConfig) -> Self {
        macro_rules! take {
            ($field:ident) => {
                if other.$field.is_some() {
                    self.$field = other.$field;
                }
            };
        }
        take!(servers);
        take!(rules);
        take!(timeout_min);
        take!(timeout_max);
        take!(retries_max);
        take!(tcp);
        take!(algorithm);
        take!(bind);
        take!(bmod);
        take!(ar1);
        take!(anomalies);
        take!(state_file);
        take!(autosave_secs);
        self
    }

    /// Overlay `WARDEN_*` environment variables, matching the teacher's
    /// `HEIMDALL_*` overlay pattern.
    pub fn overlay_env(mut self) -> Self {
        if let Ok(v) = std::env::var("WARDEN_SERVERS") {
            self.servers = Some(v.split(',').map(|s| s.trim().to_string()).collect());
        }
        if let Ok(v) = std::env::var("WARDEN_TIMEOUT_MIN") {
            if let Ok(v) = v.parse() {
                self.timeout_min = Some(v);
            }
        }
        if let Ok(v) = std::env::var("WARDEN_TIMEOUT_MAX") {
            if let Ok(v) = v.parse() {
                self.timeout_max = Some(v);
            }
        }
        if let Ok(v) = std::env::var("WARDEN_RETRIES_MAX") {
            if let Ok(v) = v.parse() {
                self.retries_max = Some(v);
            }
        }
        if let Ok(v) = std::env::var("WARDEN_TCP") {
            self.tcp = Some(v == "1" || v.eq_ignore_ascii_case("true"));
        }
        if let Ok(v) = std::env::var("WARDEN_ALGORITHM") {
            self.algorithm = Some(v);
        }
        if let Ok(v) = std::env::var("WARDEN_STATE_FILE") {
            self.state_file = Some(v);
        }
        if let Ok(v) = std::env::var("WARDEN_AUTOSAVE_SECS") {
            if let Ok(v) = v.parse() {
                self.autosave_secs = Some(v);
            }
        }
        self
    }
}

/// Fully validated, ready-to-run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub servers: Vec<String>,
    pub rules: Vec<DomainRule>,
    pub timeout_min: f64,
    pub timeout_max: f64,
    pub retries_max: u64,
    pub tcp: bool,
    pub params: Params,
    pub anomalies: Vec<Anomaly>,
    pub state_file: Option<PathBuf>,
    pub autosave_secs: Option<u64>,
}

impl Config {
    /// Load from an optional TOML file, overlaid with environment
    /// variables, then validate (§10.1 precedence: env > file > default;
    /// callers overlay CLI flags on top of the returned `RawConfig` before
    /// calling [`Config::from_raw`] if they need CLI to win over env too).
    pub fn load(toml_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let raw = match toml_path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::ParseError(e.to_string()))?;
                RawConfig::from_toml_str(&text)?
            }
            None => RawConfig::default(),
        }
        .overlay_env();
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let servers = raw.servers.unwrap_or_else(default_nameservers);
        if servers.is_empty() {
            return Err(ConfigError::EmptyServers);
        }

        let timeout_min = raw.timeout_min.unwrap_or(1.0);
        let timeout_max = raw.timeout_max.unwrap_or(5.0);
        if timeout_max <= 0.0 {
            return Err(ConfigError::NonPositiveTimeout(timeout_max));
        }
        if timeout_min > timeout_max {
            return Err(ConfigError::TimeoutOrder {
                timeout_min,
                timeout_max,
            });
        }

        let mut rules = Vec::new();
        for r in raw.rules.unwrap_or_default() {
            rules.push(DomainRule::new(r.domain, r.exclude, r.servers, r.tag)?);
        }
        crate::routing::sort_rules(&mut rules);
        // Assign GRP<n> tags once, here, so a live query's response tag
        // matches what report synthesis later recomputes for the same
        // server set (routing::select otherwise falls back to an empty
        // tag for a rule with no explicit one).
        crate::routing::server_groups(&servers, &mut rules);

        let algorithm = raw.algorithm.unwrap_or_else(|| "ar1".to_string());
        let params = build_params(&algorithm, raw.bind, raw.bmod, raw.ar1)?;

        let mut anomalies = Vec::new();
        for a in raw.anomalies.unwrap_or_default() {
            let mut delayers = Vec::new();
            for d in a.delayers {
                delayers.push(Delayer::new(d.pattern, d.delay)?);
            }
            anomalies.push(Anomaly {
                limit: a.limit,
                delayers,
            });
        }

        Ok(Config {
            servers,
            rules,
            timeout_min,
            timeout_max,
            retries_max: raw.retries_max.unwrap_or(3),
            tcp: raw.tcp.unwrap_or(false),
            params,
            anomalies,
            state_file: raw.state_file.map(PathBuf::from),
            autosave_secs: raw.autosave_secs,
        })
    }
}

fn build_params(
    algorithm: &str,
    bind: Option<RawBindParams>,
    bmod: Option<RawBindParams>,
    ar1: Option<RawAr1Params>,
) -> Result<Params, ConfigError> {
    match algorithm.to_ascii_lowercase().as_str() {
        "bind" => Ok(Params::Bind(validated_bind(bind.unwrap_or_default())?)),
        "bmod" => Ok(Params::Bmod(validated_bind(bmod.unwrap_or_default())?)),
        "ar1" | "" => Ok(Params::Ar1(validated_ar1(ar1.unwrap_or_default())?)),
        other => Err(ConfigError::ParseError(format!(
            "unknown algorithm {other:?}, expected one of bind, bmod, ar1"
        ))),
    }
}

fn validated_bind(raw: RawBindParams) -> Result<BindParams, ConfigError> {
    let defaults = BindParams::default();
    let a = raw.a.unwrap_or(defaults.a);
    let g = raw.g.unwrap_or(defaults.g);
    if !(a > 0.0 && a < 1.0) {
        return Err(ConfigError::InvalidBindA(a));
    }
    if !(g > 0.0 && g < 1.0) {
        return Err(ConfigError::InvalidBindG(g));
    }
    Ok(BindParams { a, g })
}

fn validated_ar1(raw: RawAr1Params) -> Result<Ar1Params, ConfigError> {
    let defaults = Ar1Params::default();
    let bind = validated_bind(RawBindParams {
        a: raw.a,
        g: raw.g,
    })?;
    let alpha_min = raw.alpha_min.unwrap_or(defaults.alpha_min);
    let alpha_max = raw.alpha_max.unwrap_or(defaults.alpha_max);
    if !(alpha_min > 0.0 && alpha_min < 1.0) {
        return Err(ConfigError::InvalidAr1Param {
            name: "alpha_min",
            value: alpha_min,
        });
    }
    if !(alpha_max > 0.0 && alpha_max < 1.0) {
        return Err(ConfigError::InvalidAr1Param {
            name: "alpha_max",
            value: alpha_max,
        });
    }
    if alpha_min > alpha_max {
        return Err(ConfigError::InvalidAr1Param {
            name: "alpha_min",
            value: alpha_min,
        });
    }
    let p_count_min = raw.p_count_min.unwrap_or(defaults.p_count_min);
    if p_count_min == 0 {
        return Err(ConfigError::InvalidAr1Param {
            name: "p_count_min",
            value: 0.0,
        });
    }
    Ok(Ar1Params {
        bind,
        p_count_min,
        alpha_min,
        alpha_max,
        idle_max: raw.idle_max.unwrap_or(defaults.idle_max),
        drc_count_min: raw.drc_count_min.unwrap_or(defaults.drc_count_min),
        drc_consec: raw.drc_consec.unwrap_or(defaults.drc_consec),
        drc_stdev_co: raw.drc_stdev_co.unwrap_or(defaults.drc_stdev_co),
    })
}

/// Fallback server list when none is configured. Unlike the source, which
/// shells out to the OS resolver configuration, we default to well-known
/// public recursive resolvers since "the system's configured resolvers"
/// has no single portable meaning outside a full OS-integration layer.
fn default_nameservers() -> Vec<String> {
    vec!["1.1.1.1".to_string(), "8.8.8.8".to_string()]
}

pub fn algorithm_kind_name(kind: AlgorithmKind) -> &'static str {
    match kind {
        AlgorithmKind::Bind => "bind",
        AlgorithmKind::Bmod => "bmod",
        AlgorithmKind::Ar1 => "ar1",
    }
}
