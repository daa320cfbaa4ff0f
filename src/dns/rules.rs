//! Override rules with first-match-wins evaluation.
//!
//! A rule binds a regular-expression pattern to the address it should answer
//! with. Patterns are compiled once at configuration time; matching during
//! query handling is pure and allocation-light.

use std::net::IpAddr;

use hickory_proto::op::{Message, MessageType};
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use regex::Regex;

use crate::error::{ConfigError, Result};

/// Time-to-live for synthesized answer records, in seconds.
pub const SYNTHETIC_TTL: u32 = 60;

/// A single pattern → address binding.
///
/// The pattern uses partial-match semantics: a rule matches when the regex
/// finds a match anywhere in the queried name, rendered as presented on the
/// wire (trailing-dot form).
#[derive(Debug, Clone)]
pub struct Rule {
    pattern: Regex,
    address: IpAddr,
    /// Reserved for per-rule type scoping; matching never consults this yet.
    qtype: Option<RecordType>,
}

impl Rule {
    /// Compile a rule from its textual pattern.
    ///
    /// An uncompilable pattern is a fatal configuration error, never a
    /// per-query one.
    pub fn new(pattern: &str, address: IpAddr, qtype: Option<RecordType>) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self {
            pattern,
            address,
            qtype,
        })
    }

    /// Check the pattern against an already-rendered name.
    #[inline]
    fn matches(&self, name: &str) -> bool {
        self.pattern.is_match(name)
    }

    /// The address this rule answers with.
    pub fn address(&self) -> IpAddr {
        self.address
    }

    /// The textual form of the compiled pattern.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// The reserved per-rule record type, if configured.
    pub fn qtype(&self) -> Option<RecordType> {
        self.qtype
    }
}

/// An ordered list of rules; position is match priority.
///
/// Built once at startup and never mutated, so it is safe to share across
/// in-flight queries without synchronization.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Create a rule set preserving the given order.
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Find the first rule matching the queried name.
    ///
    /// Linear scan over the rules; evaluation stops at the first match, so
    /// earlier rules always win ties.
    pub fn first_match(&self, name: &Name) -> Option<&Rule> {
        let name = name.to_utf8();
        self.rules.iter().find(|rule| rule.matches(&name))
    }

    /// Check if the rule set has any rules.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the number of rules.
    #[inline]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Iterate over the rules in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }
}

/// Build the synthesized response for a matched rule.
///
/// The response is authoritative and carries exactly one answer record with
/// the queried name and class, TTL [`SYNTHETIC_TTL`], and the rule's address.
/// The record type follows the address family: A for IPv4, AAAA for IPv6.
pub fn synthesize_answer(query: &Message, rule: &Rule) -> Message {
    let mut response = Message::new();
    response
        .set_id(query.id())
        .set_message_type(MessageType::Response)
        .set_op_code(query.op_code())
        .set_recursion_desired(query.recursion_desired())
        .set_authoritative(true);

    for q in query.queries() {
        response.add_query(q.clone());
    }

    if let Some(question) = query.queries().first() {
        let rdata = match rule.address() {
            IpAddr::V4(addr) => RData::A(A(addr)),
            IpAddr::V6(addr) => RData::AAAA(AAAA(addr)),
        };
        let mut record = Record::from_rdata(question.name().clone(), SYNTHETIC_TTL, rdata);
        record.set_dns_class(question.query_class());
        response.add_answer(record);
    }

    response
}
