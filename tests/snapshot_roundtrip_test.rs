use wardendns::algs::ar1::Ar1Params;
use wardendns::algs::bind::BindParams;
use wardendns::algs::{Params, StateInner};
use wardendns::config::Config;
use wardendns::question::{Question, RdClass, RdType, Rcode};
use wardendns::resolver::Resolver;
use wardendns::snapshot;

fn config(params: Params) -> Config {
    Config {
        servers: vec!["a".to_string(), "b".to_string()],
        rules: vec![],
        timeout_min: 0.01,
        timeout_max: 0.5,
        retries_max: 1,
        tcp: false,
        params,
        anomalies: vec![],
        state_file: None,
        autosave_secs: None,
    }
}

#[test]
fn bind_statistics_survive_a_save_and_reload_cycle() {
    let resolver = Resolver::new(config(Params::Bind(BindParams::default())));
    for i in 0..20 {
        resolver
            .state()
            .observe("a", 0.01 + i as f64 * 0.001, Rcode::NoError, &["a".to_string(), "b".to_string()]);
    }
    let before_rank = resolver.state().rank("a");
    let before_count = resolver.state().query_count("a");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.yaml");
    snapshot::save(&resolver, &path).unwrap();

    let fresh = Resolver::new(config(Params::Bind(BindParams::default())));
    snapshot::load(&fresh, &path);

    assert_eq!(fresh.state().query_count("a"), before_count);
    assert!((fresh.state().rank("a") - before_rank).abs() < 1e-9);
}

#[test]
fn ar1_snapshot_round_trips_through_yaml() {
    let resolver = Resolver::new(config(Params::Ar1(Ar1Params::default())));
    for i in 0..10 {
        let q = Question::new(format!("h{i}.example.com"), RdType::A, RdClass::In, 0x100);
        resolver.query(q).unwrap();
    }
    let dumped = snapshot::dump(&resolver).unwrap();
    let parsed: StateInner = serde_yaml::from_str(&dumped).unwrap();
    match parsed {
        StateInner::Ar1(_) => {}
        _ => panic!("expected an AR-1 snapshot"),
    }
}

#[test]
fn loading_a_snapshot_from_a_different_algorithm_starts_fresh_under_the_new_one() {
    let bind_resolver = Resolver::new(config(Params::Bind(BindParams::default())));
    bind_resolver
        .state()
        .observe("a", 0.05, Rcode::NoError, &["a".to_string(), "b".to_string()]);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.yaml");
    snapshot::save(&bind_resolver, &path).unwrap();

    let ar1_resolver = Resolver::new(config(Params::Ar1(Ar1Params::default())));
    snapshot::load(&ar1_resolver, &path);

    // The new Config's algorithm always wins (§4.G/§9): a BIND snapshot
    // can't populate AR-1 state, so the mismatched variant is discarded for
    // fresh, params-typed state rather than being kept under the new name.
    assert!(matches!(ar1_resolver.state().dump(), StateInner::Ar1(_)));
    assert_eq!(ar1_resolver.state().query_count("a"), 0);
}
