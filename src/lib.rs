//! rewire - a rule-driven DNS override forwarder.
//!
//! rewire is a DNS server that answers A queries matching configured
//! regular-expression rules with an operator-chosen address, and forwards
//! everything else to a single upstream resolver. It is meant for local
//! development overrides: point a hostname at a local service while staying
//! a transparent relay for all other traffic.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`config`]: Configuration loading, validation, and overrides
//! - [`dns`]: Override rules, answer synthesis, and upstream resolution
//! - [`server`]: Query handling and the UDP serve loop
//! - [`error`]: Error types
//!
//! # Testing
//!
//! Components are designed with trait-based abstractions so the whole query
//! pipeline can be exercised without network access:
//!
//! ```rust
//! use hickory_proto::rr::Name;
//! use rewire::dns::{Rule, RuleSet};
//! use std::str::FromStr;
//!
//! let rule = Rule::new("myapp\\.test", "127.0.0.1".parse().unwrap(), None).unwrap();
//! let rules = RuleSet::new(vec![rule]);
//! let name = Name::from_str("myapp.test.").unwrap();
//! assert!(rules.first_match(&name).is_some());
//! ```

pub mod config;
pub mod dns;
pub mod error;
pub mod server;

pub use config::Config;
pub use error::{Error, Result};
