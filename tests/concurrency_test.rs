use std::sync::Arc;
use std::thread;

use wardendns::algs::ar1::Ar1Params;
use wardendns::algs::Params;
use wardendns::config::Config;
use wardendns::question::{Question, RdClass, RdType};
use wardendns::resolver::Resolver;

fn config() -> Config {
    Config {
        servers: vec![
            "mock@r=0.001,v=0.2".to_string(),
            "mock@r=0.005,v=0.3".to_string(),
            "refuse".to_string(),
        ],
        rules: vec![],
        timeout_min: 0.01,
        timeout_max: 0.5,
        retries_max: 2,
        tcp: false,
        params: Params::Ar1(Ar1Params::default()),
        anomalies: vec![],
        state_file: None,
        autosave_secs: None,
    }
}

#[test]
fn many_threads_can_query_the_same_resolver_concurrently() {
    let resolver = Arc::new(Resolver::new(config()));
    let mut handles = Vec::new();

    for t in 0..16 {
        let resolver = resolver.clone();
        handles.push(thread::spawn(move || {
            for i in 0..50 {
                let q = Question::new(format!("host-{t}-{i}.example.com"), RdType::A, RdClass::In, 0x100);
                resolver.query(q).unwrap();
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    let total: u64 = ["mock@r=0.001,v=0.2", "mock@r=0.005,v=0.3", "refuse"]
        .iter()
        .map(|s| resolver.state().query_count(s))
        .sum();
    assert_eq!(total, 16 * 50);
}

#[test]
fn ranked_never_drops_or_duplicates_candidates_under_contention() {
    let resolver = Arc::new(Resolver::new(config()));
    let servers = resolver.default_servers().to_vec();
    let mut handles = Vec::new();

    for _ in 0..8 {
        let resolver = resolver.clone();
        let servers = servers.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..200 {
                let mut ranked = resolver.state().ranked(&servers);
                ranked.sort();
                let mut expected = servers.clone();
                expected.sort();
                assert_eq!(ranked, expected);
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }
}
