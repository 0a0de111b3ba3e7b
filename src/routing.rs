//! Domain-rule routing: map a question's qname to a candidate server set and
//! a reporting tag (§4.D).

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::question::Server;

/// A forwarding rule: queries under `domain` (and not under any `exclude`
/// entry) go to `servers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainRule {
    pub domain: String,
    #[serde(default)]
    pub exclude: Vec<String>,
    pub servers: Vec<Server>,
    #[serde(default)]
    pub tag: Option<String>,

    #[serde(skip)]
    inclpat: Option<Regex>,
    #[serde(skip)]
    exclpat: Option<Regex>,
}

impl DomainRule {
    pub fn new(
        domain: impl Into<String>,
        exclude: Vec<String>,
        servers: Vec<Server>,
        tag: Option<String>,
    ) -> Result<Self, ConfigError> {
        let domain = normalize(&domain.into());
        if domain.is_empty() {
            return Err(ConfigError::InvalidRule {
                domain,
                reason: "domain must not be empty".to_string(),
            });
        }
        if servers.is_empty() {
            return Err(ConfigError::InvalidRule {
                domain,
                reason: "servers must not be empty".to_string(),
            });
        }
        let exclude: Vec<String> = exclude.iter().map(|d| normalize(d)).collect();
        let inclpat = Some(build_pattern(std::slice::from_ref(&domain)).map_err(|e| {
            ConfigError::InvalidRule {
                domain: domain.clone(),
                reason: e.to_string(),
            }
        })?);
        let exclpat = Some(build_pattern(&exclude).map_err(|e| ConfigError::InvalidRule {
            domain: domain.clone(),
            reason: e.to_string(),
        })?);
        Ok(Self {
            domain,
            exclude,
            servers,
            tag,
            inclpat,
            exclpat,
        })
    }

    /// Ensure the compiled patterns exist, e.g. after deserializing a rule
    /// from a config file (where they are skipped).
    pub fn compile(&mut self) -> Result<(), ConfigError> {
        if self.inclpat.is_none() {
            self.inclpat =
                Some(
                    build_pattern(std::slice::from_ref(&self.domain)).map_err(|e| {
                        ConfigError::InvalidRule {
                            domain: self.domain.clone(),
                            reason: e.to_string(),
                        }
                    })?,
                );
        }
        if self.exclpat.is_none() {
            self.exclpat = Some(build_pattern(&self.exclude).map_err(|e| ConfigError::InvalidRule {
                domain: self.domain.clone(),
                reason: e.to_string(),
            })?);
        }
        Ok(())
    }

    /// Whether `qname` is this rule's domain or a sub-label of it, and not
    /// similarly covered by any exclude entry.
    pub fn matches(&self, qname: &str) -> bool {
        let incl = self.inclpat.as_ref().expect("rule not compiled");
        let excl = self.exclpat.as_ref().expect("rule not compiled");
        incl.is_match(qname) && !excl.is_match(qname)
    }

    /// Sort key: longer domains (more specific) sort first.
    fn order(&self) -> isize {
        -(self.domain.len() as isize)
    }
}

fn normalize(raw: &str) -> String {
    raw.trim_matches('.').to_ascii_lowercase()
}

/// Build `^(.+\.)?(d1|d2|...)\.?$`, case-insensitive. An empty domain list
/// builds a pattern that matches nothing.
fn build_pattern(domains: &[String]) -> Result<Regex, regex::Error> {
    if domains.is_empty() {
        return Regex::new(r"(?i)a^");
    }
    let escaped: Vec<String> = domains.iter().map(|d| regex::escape(d)).collect();
    let body = format!(r"(?i)^(.+\.)?({})\.?$", escaped.join("|"));
    Regex::new(&body)
}

/// Sort rules most-specific first, stable on ties (insertion order preserved).
pub fn sort_rules(rules: &mut [DomainRule]) {
    rules.sort_by_key(|r| r.order());
}

/// Assign deterministic group tags to every rule's server set, honoring any
/// explicitly configured tag and falling back to `GRP<n>` (§4.D).
///
/// Returns a map of server -> all tags it belongs to (a server may belong to
/// several groups), used by report synthesis (§4.H).
pub fn server_groups(
    default_servers: &[Server],
    rules: &mut [DomainRule],
) -> HashMap<Server, Vec<String>> {
    let mut seen: Vec<(Vec<Server>, String)> = Vec::new();
    let mut key_of = |servers: &[Server]| -> Vec<Server> {
        let mut v = servers.to_vec();
        v.sort();
        v.dedup();
        v
    };

    let default_key = key_of(default_servers);
    seen.push((default_key, "DFLT".to_string()));

    for rule in rules.iter_mut() {
        let key = key_of(&rule.servers);
        let tag = if let Some(existing) = seen.iter().find(|(k, _)| *k == key) {
            existing.1.clone()
        } else {
            let tag = rule
                .tag
                .clone()
                .unwrap_or_else(|| format!("GRP{}", seen.len()));
            seen.push((key, tag.clone()));
            tag
        };
        rule.tag = Some(tag);
    }

    let mut groups: HashMap<Server, Vec<String>> = HashMap::new();
    for (servers, tag) in &seen {
        for server in servers {
            groups.entry(server.clone()).or_default().push(tag.clone());
        }
    }
    for tags in groups.values_mut() {
        tags.sort();
    }
    groups
}

/// Select the candidate server set and tag for a question's qname, per the
/// first matching rule in specificity order, falling back to the configured
/// default servers under tag `"DFLT"` (§4.D).
pub fn select<'a>(
    qname: &str,
    rules: &'a [DomainRule],
    default_servers: &'a [Server],
) -> (&'a [Server], String) {
    for rule in rules {
        if rule.matches(qname) {
            return (&rule.servers, rule.tag.clone().unwrap_or_default());
        }
    }
    (default_servers, "DFLT".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(domain: &str, servers: &[&str], tag: Option<&str>) -> DomainRule {
        DomainRule::new(
            domain,
            vec![],
            servers.iter().map(|s| s.to_string()).collect(),
            tag.map(|t| t.to_string()),
        )
        .unwrap()
    }

    #[test]
    fn longer_domain_wins_when_both_match() {
        let mut rules = vec![
            rule("example.com", &["A"], None),
            rule("foo.example.com", &["B"], None),
        ];
        sort_rules(&mut rules);
        let default = vec!["D".to_string()];
        assert_eq!(select("bar.foo.example.com", &rules, &default).0, ["B"]);
        assert_eq!(select("foo.example.com", &rules, &default).0, ["B"]);
        assert_eq!(select("baz.example.com", &rules, &default).0, ["A"]);
        let (servers, tag) = select("other.net", &rules, &default);
        assert_eq!(servers, ["D"]);
        assert_eq!(tag, "DFLT");
    }

    #[test]
    fn exclude_list_carves_out_a_subdomain() {
        let r = DomainRule::new(
            "example.com",
            vec!["internal.example.com".to_string()],
            vec!["A".to_string()],
            None,
        )
        .unwrap();
        assert!(r.matches("foo.example.com"));
        assert!(!r.matches("internal.example.com"));
        assert!(!r.matches("deep.internal.example.com"));
    }

    #[test]
    fn trailing_dot_and_case_are_tolerated() {
        let r = rule("Example.COM", &["A"], None);
        assert!(r.matches("example.com."));
        assert!(r.matches("FOO.EXAMPLE.COM"));
    }

    #[test]
    fn server_groups_assign_grp_tags_in_insertion_order() {
        let mut rules = vec![rule("a.example", &["X"], None), rule("b.example", &["Y"], None)];
        let groups = server_groups(&["D".to_string()], &mut rules);
        assert_eq!(rules[0].tag.as_deref(), Some("GRP1"));
        assert_eq!(rules[1].tag.as_deref(), Some("GRP2"));
        assert_eq!(groups.get("D").unwrap(), &vec!["DFLT".to_string()]);
    }

    #[test]
    fn shared_server_set_reuses_the_same_tag() {
        let mut rules = vec![
            rule("a.example", &["X"], None),
            rule("b.example", &["X"], None),
        ];
        server_groups(&["D".to_string()], &mut rules);
        assert_eq!(rules[0].tag, rules[1].tag);
    }
}
