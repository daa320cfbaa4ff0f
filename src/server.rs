//! DNS server orchestration.
//!
//! Coordinates query parsing, rule matching, upstream forwarding, and
//! response sending. Designed with trait-based dependencies for testability.

use std::sync::Arc;

use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::{RData, Record, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use tokio::net::UdpSocket;
use tracing::{debug, error, info, instrument, warn};

use crate::dns::resolver::MAX_UDP_DNS_SIZE;
use crate::dns::{synthesize_answer, DnsResolver, RuleSet};
use crate::error::Result;

/// Outcome of handling one query.
///
/// Whatever path a query takes, it produces exactly one of these, and the
/// serve loop writes it back to the requester exactly once.
#[derive(Debug)]
pub enum Reply {
    /// Synthesized locally from a matched rule.
    Local(Message),
    /// Verbatim upstream reply bytes.
    Upstream(Vec<u8>),
    /// Locally-built failure response.
    Failure(Message),
}

impl Reply {
    /// Wire form of the response.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Self::Local(message) | Self::Failure(message) => Ok(message.to_bytes()?),
            Self::Upstream(wire) => Ok(wire.clone()),
        }
    }
}

/// DNS query handler that processes queries using the provided dependencies.
///
/// Holds the read-only rule set and the upstream resolver; queries are
/// independent, so handlers are cheap to clone into per-query tasks.
pub struct QueryHandler<R>
where
    R: DnsResolver,
{
    rules: Arc<RuleSet>,
    resolver: R,
}

impl<R> QueryHandler<R>
where
    R: DnsResolver,
{
    /// Create a new query handler.
    pub fn new(rules: RuleSet, resolver: R) -> Self {
        Self {
            rules: Arc::new(rules),
            resolver,
        }
    }

    /// Handle a DNS query and return the outcome.
    ///
    /// A queries consult the rule set first and are answered locally on the
    /// first match. Everything else, including A queries without a matching
    /// rule, is forwarded upstream. An upstream failure yields a SERVFAIL
    /// response rather than silence.
    #[instrument(skip(self, query), fields(domain))]
    pub async fn handle_query(&self, query: Message) -> Reply {
        let Some(question) = query.queries().first() else {
            warn!("query has no question section");
            return Reply::Failure(failure_response(&query, ResponseCode::FormErr));
        };

        let domain = question.name().clone();
        let qtype = question.query_type();
        tracing::Span::current().record("domain", domain.to_string());
        info!(%qtype, "serving query");

        if qtype == RecordType::A {
            debug!("checking rules for a local answer");
            if let Some(rule) = self.rules.first_match(&domain) {
                info!(
                    address = %rule.address(),
                    pattern = rule.pattern(),
                    "rule matched, answering locally"
                );
                return Reply::Local(synthesize_answer(&query, rule));
            }
        }

        match self.resolver.resolve(&query).await {
            Ok(exchange) => {
                info!(%qtype, rtt_ms = exchange.rtt.as_millis() as u64, "upstream reply");
                for answer in exchange.reply.answers() {
                    debug!(
                        rtype = %answer.record_type(),
                        target = %answer_target(answer),
                        "upstream answer"
                    );
                }
                Reply::Upstream(exchange.wire)
            }
            Err(err) => {
                error!(error = %err, "upstream exchange failed");
                Reply::Failure(failure_response(&query, ResponseCode::ServFail))
            }
        }
    }
}

impl<R> Clone for QueryHandler<R>
where
    R: DnsResolver,
{
    fn clone(&self) -> Self {
        Self {
            rules: Arc::clone(&self.rules),
            resolver: self.resolver.clone(),
        }
    }
}

/// Build a well-formed failure response mirroring the query's identity.
fn failure_response(query: &Message, code: ResponseCode) -> Message {
    let mut response = Message::new();
    response
        .set_id(query.id())
        .set_message_type(MessageType::Response)
        .set_op_code(query.op_code())
        .set_recursion_desired(query.recursion_desired())
        .set_response_code(code);

    for q in query.queries() {
        response.add_query(q.clone());
    }

    response
}

/// Render the address-like field of an answer record for logging.
fn answer_target(record: &Record) -> String {
    match record.data() {
        RData::A(a) => a.to_string(),
        RData::AAAA(aaaa) => aaaa.to_string(),
        RData::CNAME(cname) => cname.0.to_string(),
        RData::MX(mx) => mx.exchange().to_string(),
        RData::SOA(soa) => soa.mname().to_string(),
        other => other.to_string(),
    }
}

/// Run the DNS serve loop.
///
/// Each datagram is parsed and dispatched to its own task, so a slow
/// upstream exchange only suspends the query being forwarded. Unparseable
/// datagrams are logged and dropped; every parsed query gets exactly one
/// response.
pub async fn run_server<R>(socket: UdpSocket, handler: QueryHandler<R>) -> Result<()>
where
    R: DnsResolver,
{
    let socket = Arc::new(socket);
    let mut buf = [0u8; MAX_UDP_DNS_SIZE];

    loop {
        let (len, peer) = socket.recv_from(&mut buf).await?;

        let query = match Message::from_bytes(&buf[..len]) {
            Ok(m) => m,
            Err(err) => {
                warn!(%peer, "failed to parse DNS message: {err}");
                continue;
            }
        };

        let handler = handler.clone();
        let socket = Arc::clone(&socket);
        tokio::spawn(async move {
            let reply = handler.handle_query(query).await;
            match reply.to_bytes() {
                Ok(bytes) => {
                    if let Err(err) = socket.send_to(&bytes, peer).await {
                        warn!(%peer, "failed to send response: {err}");
                    }
                }
                Err(err) => {
                    error!(%peer, "failed to encode response: {err}");
                }
            }
        });
    }
}
