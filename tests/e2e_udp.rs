//! End-to-end tests over real loopback sockets.
//!
//! A fake upstream resolver and the full serve loop run on ephemeral ports;
//! queries go through the same wire path a real client would use.

use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use tokio::net::UdpSocket;

use rewire::dns::{Rule, RuleSet, UpstreamResolver};
use rewire::server::{run_server, QueryHandler};

/// Spawn a fake upstream resolver answering every A query with `ip`.
async fn spawn_upstream(ip: Ipv4Addr) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 512];
        loop {
            let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                break;
            };
            let Ok(query) = Message::from_bytes(&buf[..len]) else {
                continue;
            };

            let mut reply = Message::new();
            reply
                .set_id(query.id())
                .set_message_type(MessageType::Response)
                .set_op_code(OpCode::Query)
                .set_response_code(ResponseCode::NoError);
            for q in query.queries() {
                reply.add_query(q.clone());
            }
            if let Some(q) = query.queries().first() {
                reply.add_answer(Record::from_rdata(q.name().clone(), 300, RData::A(A(ip))));
            }

            let _ = socket.send_to(&reply.to_bytes().unwrap(), peer).await;
        }
    });

    addr
}

/// Spawn the serve loop on an ephemeral port and return its address.
async fn spawn_server(rules: RuleSet, upstream: SocketAddr) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let resolver = UpstreamResolver::new(upstream, Duration::from_millis(250));
    let handler = QueryHandler::new(rules, resolver);

    tokio::spawn(async move {
        let _ = run_server(socket, handler).await;
    });

    addr
}

/// Send one query to the server and wait for its reply.
async fn exchange(server: SocketAddr, query: &Message) -> Message {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket
        .send_to(&query.to_bytes().unwrap(), server)
        .await
        .unwrap();

    let mut buf = [0u8; 512];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("timed out waiting for a reply")
        .unwrap();
    Message::from_bytes(&buf[..len]).unwrap()
}

fn create_query(domain: &str, qtype: RecordType, id: u16) -> Message {
    let mut query = Query::new();
    query.set_name(Name::from_str(domain).unwrap());
    query.set_query_type(qtype);

    let mut message = Message::new();
    message.set_id(id);
    message.set_recursion_desired(true);
    message.add_query(query);
    message
}

#[tokio::test]
async fn should_answer_matched_query_locally_over_the_wire() {
    let upstream = spawn_upstream(Ipv4Addr::new(1, 2, 3, 4)).await;
    let rules = RuleSet::new(vec![Rule::new(
        "myapp\\.test",
        "10.0.0.5".parse().unwrap(),
        None,
    )
    .unwrap()]);
    let server = spawn_server(rules, upstream).await;

    let response = exchange(server, &create_query("myapp.test.", RecordType::A, 42)).await;

    assert_eq!(response.id(), 42);
    assert!(response.authoritative());
    assert_eq!(response.answers().len(), 1);
    match response.answers()[0].data() {
        RData::A(a) => assert_eq!(a.0, Ipv4Addr::new(10, 0, 0, 5)),
        other => panic!("expected A record, got {other:?}"),
    }
}

#[tokio::test]
async fn should_forward_unmatched_query_to_upstream_over_the_wire() {
    let upstream = spawn_upstream(Ipv4Addr::new(93, 184, 216, 34)).await;
    let rules = RuleSet::new(vec![Rule::new(
        "myapp\\.test",
        "10.0.0.5".parse().unwrap(),
        None,
    )
    .unwrap()]);
    let server = spawn_server(rules, upstream).await;

    let response = exchange(server, &create_query("example.com.", RecordType::A, 77)).await;

    assert_eq!(response.id(), 77);
    assert!(!response.authoritative());
    match response.answers()[0].data() {
        RData::A(a) => assert_eq!(a.0, Ipv4Addr::new(93, 184, 216, 34)),
        other => panic!("expected A record, got {other:?}"),
    }
}

#[tokio::test]
async fn should_answer_servfail_when_upstream_is_unreachable() {
    // Grab an ephemeral port and release it so nothing is listening there.
    let unused = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let dead_upstream = unused.local_addr().unwrap();
    drop(unused);

    let server = spawn_server(RuleSet::default(), dead_upstream).await;

    let response = exchange(server, &create_query("example.com.", RecordType::A, 99)).await;

    assert_eq!(response.id(), 99);
    assert_eq!(response.response_code(), ResponseCode::ServFail);
    assert!(response.answers().is_empty());
}
