//! State snapshot persistence (§4.G, §10.5): serialize/deserialize the live
//! ranking state as YAML, merge it over a running `Resolver`'s state, and
//! reconcile configured servers and algorithm params afterward.

use std::path::Path;

use tracing::{info, warn};

use crate::algs::StateInner;
use crate::resolver::Resolver;

/// Serialize the resolver's current state to a YAML string.
pub fn dump(resolver: &Resolver) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(&resolver.state().dump())
}

/// Write the resolver's current state to `path`, logging on success.
pub fn save(resolver: &Resolver, path: &Path) -> crate::error::Result<()> {
    let text = dump(resolver).map_err(|e| crate::error::WardenError::SnapshotSave(e.to_string()))?;
    std::fs::write(path, text)?;
    info!(path = %path.display(), "saved state snapshot");
    Ok(())
}

/// Load a snapshot from `path` and merge it over the resolver's state
/// (§4.G). A missing or corrupt snapshot is non-fatal (§7): the current
/// (freshly-initialized) state is kept and the condition is logged.
pub fn load(resolver: &Resolver, path: &Path) {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "no existing state snapshot, starting fresh");
            return;
        }
    };
    match serde_yaml::from_str::<StateInner>(&text) {
        Ok(snapshot) => {
            resolver
                .state()
                .load(snapshot, &resolver.config().params, &resolver.config().servers);
            info!(path = %path.display(), "loaded state snapshot");
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt state snapshot, keeping current state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::bind::BindParams;
    use crate::algs::Params;
    use crate::config::Config;
    use crate::question::{Rcode, RdClass, RdType, Question};

    fn test_config() -> Config {
        Config {
            servers: vec!["a".to_string(), "b".to_string()],
            rules: vec![],
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
    fn dump_then_load_is_idempotent_on_numeric_fields() {
        let resolver = Resolver::new(test_config());
        resolver.state().observe("a", 1.0, Rcode::NoError, &["a".to_string(), "b".to_string()]);
        let before = resolver.state().dump();
        let text = dump(&resolver).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.yaml");
        std::fs::write(&path, &text).unwrap();
        load(&resolver, &path);
        let after = resolver.state().dump();
        match (before, after) {
            (StateInner::Bind(b), StateInner::Bind(a)) => {
                assert_eq!(b.sr.get("a"), a.sr.get("a"));
                assert_eq!(b.base.sm.get("a").map(|m| m.count), a.base.sm.get("a").map(|m| m.count));
            }
            _ => panic!("expected BIND state"),
        }
    }

    #[test]
    fn missing_snapshot_file_is_non_fatal() {
        let resolver = Resolver::new(test_config());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.yaml");
        load(&resolver, &path);
        let q = Question::new("example.com", RdType::A, RdClass::In, 0x100);
        assert!(resolver.query(q).is_ok());
    }

    #[test]
    fn corrupt_snapshot_keeps_current_state() {
        let resolver = Resolver::new(test_config());
        resolver.state().observe("a", 5.0, Rcode::NoError, &["a".to_string(), "b".to_string()]);
        let before_rank = resolver.state().rank("a");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.yaml");
        std::fs::write(&path, "not: [valid, state").unwrap();
        load(&resolver, &path);
        assert_eq!(resolver.state().rank("a"), before_rank);
    }
}
