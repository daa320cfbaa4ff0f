//! DNS resolver trait and implementations.
//!
//! Provides abstraction over upstream resolution to enable:
//! - Testing with mock resolvers
//! - Different forwarding strategies later on

use std::future::Future;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use hickory_proto::op::Message;
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use tokio::net::UdpSocket;

use crate::error::{Error, Result};

/// Maximum DNS message size over UDP.
pub const MAX_UDP_DNS_SIZE: usize = 512;

/// Result of one upstream round trip.
///
/// `wire` holds the reply exactly as received, so relays can stay
/// byte-for-byte faithful; `reply` is the parsed form used for logging.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub reply: Message,
    pub wire: Vec<u8>,
    pub rtt: Duration,
}

/// Trait for upstream DNS resolution.
///
/// Implementations forward a query through some transport and hand back the
/// single reply together with the measured round-trip time.
pub trait DnsResolver: Send + Sync + Clone + 'static {
    /// Forward a query and return the upstream reply.
    fn resolve(&self, query: &Message) -> impl Future<Output = Result<Exchange>> + Send;
}

/// Upstream DNS resolver using UDP.
///
/// Forwards queries unmodified to a single configured upstream server. No
/// retry, no failover, no caching: each call is one fresh exchange.
#[derive(Clone)]
pub struct UpstreamResolver {
    upstream_addr: SocketAddr,
    timeout: Duration,
}

impl UpstreamResolver {
    /// Create a new upstream resolver with a per-exchange deadline.
    pub const fn new(upstream_addr: SocketAddr, timeout: Duration) -> Self {
        Self {
            upstream_addr,
            timeout,
        }
    }
}

impl DnsResolver for UpstreamResolver {
    async fn resolve(&self, query: &Message) -> Result<Exchange> {
        let started = Instant::now();

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(self.upstream_addr).await?;

        let query_bytes = query.to_bytes()?;
        socket.send(&query_bytes).await?;

        let mut response_buf = [0u8; MAX_UDP_DNS_SIZE];
        let len = tokio::time::timeout(self.timeout, socket.recv(&mut response_buf))
            .await
            .map_err(|_| Error::UpstreamTimeout(self.timeout))??;

        let wire = response_buf[..len].to_vec();
        let reply = Message::from_bytes(&wire)?;
        if reply.id() != query.id() {
            return Err(Error::Resolver(format!(
                "upstream reply id {} does not match query id {}",
                reply.id(),
                query.id()
            )));
        }

        Ok(Exchange {
            reply,
            wire,
            rtt: started.elapsed(),
        })
    }
}
