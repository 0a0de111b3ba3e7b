//! wardendns: a recursive DNS forwarder core with adaptive, statistics-driven
//! upstream server selection (BIND/BMOD/AR-1 ranking), domain-rule routing,
//! a retrying query orchestrator, anomaly-delay injection for testing, and
//! state snapshot/reload so running statistics survive a restart.
//!
//! This crate is the resolver core plus its ambient operational layer
//! (config, errors, metrics, snapshot persistence, reporting). Wire-level
//! DNS parsing and an actual UDP/TCP listening front end are out of scope;
//! [`backend::Backend`] is the seam where a real upstream transport plugs in.

pub mod algs;
pub mod anomaly;
pub mod backend;
pub mod config;
pub mod config_reload;
pub mod error;
pub mod graceful_shutdown;
pub mod metrics;
pub mod question;
pub mod report;
pub mod resolver;
pub mod routing;
pub mod snapshot;
pub mod stats;

pub use config::Config;
pub use error::{Result, WardenError};
pub use question::{Question, RdClass, RdType, Rcode, Response};
pub use resolver::Resolver;
