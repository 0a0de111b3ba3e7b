//! DNS question/response data model shared across the resolver core.
//!
//! Wire parsing and serialization are a front-end concern (see crate docs);
//! this module only carries the parsed, already-normalized shapes the core
//! operates on.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

pub type Server = String;
pub type Rset = Vec<String>;

/// Record type of a question. Only the subset the reference forwarder cares
/// about; unknown types round-trip as [`RdType::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RdType {
    A,
    Aaaa,
    Any,
    Cname,
    Https,
    Loc,
    Mx,
    Ns,
    Ptr,
    Soa,
    Srv,
    Svcb,
    Txt,
    Other(u16),
}

impl Default for RdType {
    fn default() -> Self {
        RdType::A
    }
}

impl fmt::Display for RdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RdType::A => write!(f, "A"),
            RdType::Aaaa => write!(f, "AAAA"),
            RdType::Any => write!(f, "ANY"),
            RdType::Cname => write!(f, "CNAME"),
            RdType::Https => write!(f, "HTTPS"),
            RdType::Loc => write!(f, "LOC"),
            RdType::Mx => write!(f, "MX"),
            RdType::Ns => write!(f, "NS"),
            RdType::Ptr => write!(f, "PTR"),
            RdType::Soa => write!(f, "SOA"),
            RdType::Srv => write!(f, "SRV"),
            RdType::Svcb => write!(f, "SVCB"),
            RdType::Txt => write!(f, "TXT"),
            RdType::Other(code) => write!(f, "TYPE{code}"),
        }
    }
}

/// Query class. `IN` covers the overwhelming majority of real traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RdClass {
    Ch,
    Cs,
    Hesiod,
    #[default]
    In,
    None,
    Star,
}

impl fmt::Display for RdClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RdClass::Ch => "CH",
            RdClass::Cs => "CS",
            RdClass::Hesiod => "Hesiod",
            RdClass::In => "IN",
            RdClass::None => "None",
            RdClass::Star => "*",
        };
        write!(f, "{s}")
    }
}

/// Standard DNS response codes, treated as opaque values by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rcode {
    Formerr,
    #[default]
    NoError,
    NotAuth,
    NotImp,
    NotZone,
    NxDomain,
    NxRrset,
    Refused,
    ServFail,
    YxDomain,
    YxRrset,
}

impl Rcode {
    /// Whether this rcode ends the retry loop outright (§4.E failure semantics).
    pub fn is_terminal(self) -> bool {
        !matches!(self, Rcode::ServFail)
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rcode::Formerr => "FORMERR",
            Rcode::NoError => "NOERROR",
            Rcode::NotAuth => "NOTAUTH",
            Rcode::NotImp => "NOTIMP",
            Rcode::NotZone => "NOTZONE",
            Rcode::NxDomain => "NXDOMAIN",
            Rcode::NxRrset => "NXRRSET",
            Rcode::Refused => "REFUSED",
            Rcode::ServFail => "SERVFAIL",
            Rcode::YxDomain => "YXDOMAIN",
            Rcode::YxRrset => "YXRRSET",
        };
        write!(f, "{s}")
    }
}

/// Hint attached to a SERVFAIL explaining why the backend gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErName {
    NoNameservers,
    Timeout,
}

impl fmt::Display for ErName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErName::NoNameservers => write!(f, "NoNameservers"),
            ErName::Timeout => write!(f, "Timeout"),
        }
    }
}

/// A parsed, normalized DNS question. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    qname: String,
    pub rdtype: RdType,
    pub rdclass: RdClass,
    pub flags: u16,
}

impl Question {
    /// Build a question, lower-casing/dot-trimming `qname` and rewriting PTR
    /// queries against a literal IP address to their reverse-pointer form
    /// (§3 Data Model).
    pub fn new(qname: impl Into<String>, rdtype: RdType, rdclass: RdClass, flags: u16) -> Self {
        let qname = normalize_qname(&qname.into());
        let mut q = Self {
            qname,
            rdtype,
            rdclass,
            flags,
        };
        q.autoreverse();
        q
    }

    fn autoreverse(&mut self) {
        if self.rdtype != RdType::Ptr || self.qname.contains("arpa") {
            return;
        }
        if let Ok(ip) = self.qname.parse::<IpAddr>() {
            self.qname = reverse_pointer(ip);
        }
    }

    pub fn qname(&self) -> &str {
        &self.qname
    }
}

fn normalize_qname(raw: &str) -> String {
    raw.trim_matches('.').to_ascii_lowercase()
}

/// Render an IP address as its `in-addr.arpa`/`ip6.arpa` reverse-pointer name.
fn reverse_pointer(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            format!("{}.{}.{}.{}.in-addr.arpa", o[3], o[2], o[1], o[0])
        }
        IpAddr::V6(v6) => {
            let mut nibbles = String::with_capacity(64);
            for byte in v6.octets().iter().rev() {
                nibbles.push_str(&format!("{:x}.{:x}.", byte & 0xf, byte >> 4));
            }
            format!("{nibbles}ip6.arpa")
        }
    }
}

/// Raw response from an upstream backend, before the orchestrator attaches
/// routing/retry metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendResponse {
    pub id: u16,
    pub code: Rcode,
    pub flags: u16,
    pub rrset: Rset,
    pub arset: Rset,
    pub auset: Rset,
    pub rtime: f64,
    pub ername: Option<ErName>,
}

/// The user-visible outcome of a `Resolver::query` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u16,
    pub server: Server,
    pub rtime: f64,
    pub q: Question,
    pub code: Rcode,
    pub flags: u16,
    pub rrset: Rset,
    pub arset: Rset,
    pub auset: Rset,
    pub tag: Option<String>,
    pub failed: Option<Vec<Server>>,
    pub ername: Option<ErName>,
}
