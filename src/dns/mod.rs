//! DNS-related modules.

pub mod resolver;
pub mod rules;

pub use resolver::{DnsResolver, Exchange, UpstreamResolver};
pub use rules::{synthesize_answer, Rule, RuleSet, SYNTHETIC_TTL};
