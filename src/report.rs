//! Report synthesis (§4.H): a grouped, sorted per-server summary suitable
//! for logging or an operator-facing display.

use std::collections::HashMap;

use comfy_table::{Table, presets::UTF8_FULL};
use serde_json::Value;

use crate::question::Server;
use crate::resolver::Resolver;
use crate::routing::server_groups;

/// One row of the report: a server plus its flattened, dot-joined stat
/// fields (e.g. `m.count`, `r`, `ar.p`).
#[derive(Debug, Clone)]
pub struct ServerRow {
    pub server: Server,
    pub fields: HashMap<String, Value>,
}

/// Grouped report: tag -> rows, ordered by descending total query count,
/// with servers reachable only via rules (and not part of any named group)
/// bucketed under `"UNWN"` last.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub groups: Vec<(String, Vec<ServerRow>)>,
}

/// Build the grouped report from a resolver's current state (§4.H).
///
/// Note: this recomputes group tags on every call via
/// [`server_groups`], matching the source's `servergroups` lazily-cached
/// property in spirit (deterministic given the same rules/servers) while
/// keeping `Resolver` free of interior-mutable caches.
pub fn build(resolver: &Resolver) -> Report {
    let mut rules = resolver.rules().to_vec();
    let groups_by_server = server_groups(resolver.default_servers(), &mut rules);
    let rows = resolver.state().report_rows();

    let mut by_tag: HashMap<String, Vec<ServerRow>> = HashMap::new();
    let mut totals: HashMap<String, u64> = HashMap::new();
    let mut unknown: Vec<ServerRow> = Vec::new();

    for (server, fields) in rows {
        let count = resolver.state().query_count(&server);
        let row = ServerRow {
            server: server.clone(),
            fields,
        };
        match groups_by_server.get(&server) {
            Some(tags) => {
                for tag in tags {
                    by_tag.entry(tag.clone()).or_default().push(row.clone());
                    *totals.entry(tag.clone()).or_insert(0) += count;
                }
            }
            None => unknown.push(row),
        }
    }

    let mut tags: Vec<String> = by_tag.keys().cloned().collect();
    tags.sort_by_key(|t| std::cmp::Reverse(*totals.get(t).unwrap_or(&0)));

    let mut groups: Vec<(String, Vec<ServerRow>)> = tags
        .into_iter()
        .map(|tag| {
            let mut rows = by_tag.remove(&tag).unwrap_or_default();
            rows.sort_by(|a, b| a.server.cmp(&b.server));
            (tag, rows)
        })
        .collect();

    if !unknown.is_empty() {
        unknown.sort_by(|a, b| a.server.cmp(&b.server));
        groups.push(("UNWN".to_string(), unknown));
    }

    Report { groups }
}

/// Render a report as one fixed-width table per group, sharing column
/// widths across all groups the way the source builds one combined table
/// then re-slices it (§4.H).
pub fn render_table(report: &Report) -> String {
    let mut columns: Vec<String> = vec!["server".to_string()];
    for (_, rows) in &report.groups {
        for row in rows {
            for key in row.fields.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
    }

    let mut out = String::new();
    for (tag, rows) in &report.groups {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL).set_header(columns.clone());
        for row in rows {
            let mut cells = vec![row.server.clone()];
            for col in columns.iter().skip(1) {
                let cell = row
                    .fields
                    .get(col)
                    .map(format_value)
                    .unwrap_or_default();
                cells.push(cell);
            }
            table.add_row(cells);
        }
        out.push_str(&format!("== {tag} ==\n"));
        out.push_str(&table.to_string());
        out.push('\n');
    }
    out
}

fn format_value(v: &Value) -> String {
    match v {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::bind::BindParams;
    use crate::algs::Params;
    use crate::config::Config;
    use crate::question::Rcode;
    use crate::routing::DomainRule;

    fn config_with_rule() -> Config {
        Config {
            servers: vec!["d1".to_string()],
            rules: vec![DomainRule::new(
                "example.com",
                vec![],
                vec!["r1".to_string()],
                None,
            )
            .unwrap()],
            timeout_min: 0.01,
            timeout_max: 1.0,
            retries_max: 1,
            tcp: false,
            params: Params::Bind(BindParams::default()),
            anomalies: vec![],
            state_file: None,
            autosave_secs: None,
        }
    }

    #[test]
    fn servers_group_by_tag_and_unknown_bucket_is_empty_when_all_covered() {
        let resolver = Resolver::new(config_with_rule());
        resolver
            .state()
            .observe("d1", 1.0, Rcode::NoError, &["d1".to_string()]);
        resolver
            .state()
            .observe("r1", 1.0, Rcode::NoError, &["r1".to_string()]);
        let report = build(&resolver);
        let tags: Vec<&str> = report.groups.iter().map(|(t, _)| t.as_str()).collect();
        assert!(tags.contains(&"DFLT"));
        assert!(tags.contains(&"GRP1"));
        assert!(!tags.contains(&"UNWN"));
    }

    #[test]
    fn table_rendering_includes_every_group_header() {
        let resolver = Resolver::new(config_with_rule());
        resolver
            .state()
            .observe("d1", 1.0, Rcode::NoError, &["d1".to_string()]);
        let report = build(&resolver);
        let rendered = render_table(&report);
        assert!(rendered.contains("=="));
        assert!(rendered.contains("server"));
    }
}
