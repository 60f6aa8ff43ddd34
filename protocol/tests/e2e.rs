//! End-to-end tests for the Agora protocol.
//!
//! These run real nodes on loopback: real gossip servers, real proof of work,
//! real trial decryption. Each test builds its own nodes, so there is no
//! shared state and no ordering dependency between tests.

use std::sync::Arc;
use std::time::Duration;

use agora_protocol::config::{NodeConfig, MAX_ADDRESS_LENGTH};
use agora_protocol::identity::IdentityRegistry;
use agora_protocol::message::Recipient;
use agora_protocol::network::GossipClient;
use agora_protocol::pow::{self, PowWorker};
use agora_protocol::store::{Admission, GossipObject, ObjectStore, Peer, PeerStore, Record};
use agora_protocol::time::now;
use agora_protocol::{AgoraNode, NodeError};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn loopback_config(bootstrap: Vec<String>) -> NodeConfig {
    NodeConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        bootstrap_peers: bootstrap,
        silence_networking_errors: true,
        advertise: false,
        reconnect_interval: Duration::from_millis(200),
        ..NodeConfig::default()
    }
}

async fn isolated_node() -> AgoraNode {
    AgoraNode::start(loopback_config(Vec::new())).await.unwrap()
}

/// Polls `condition` until it holds or `limit` passes.
async fn eventually(limit: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}

fn mined(payload: &[u8], expiration_time: u128, ttl: u128) -> GossipObject {
    let input = GossipObject::pow_input(payload, expiration_time);
    GossipObject {
        payload: payload.to_vec(),
        nonce: pow::solve(&input, ttl).unwrap(),
        expiration_time,
        receive_time: 0,
    }
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

/// A group post shows up in its author's own inbox.
#[tokio::test]
async fn group_post_lands_in_authors_inbox() {
    let node = isolated_node().await;
    let alice = node.identities.create_identity("alice");
    let group = node.identities.create_group(alice.id, "G").unwrap();

    node.post_to_group(alice.id, &group.key, "hello", 60)
        .await
        .unwrap();

    let inbox = node.identities.inbox(alice.id).unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].message, "hello");
    let recipient = serde_json::to_value(&inbox[0].recipient).unwrap();
    assert_eq!(recipient["type"], "unmoderated group");
    node.stop();
}

/// Only the addressee of a direct message can read it.
#[tokio::test]
async fn direct_message_is_isolated() {
    let node = isolated_node().await;
    let alice = node.identities.create_identity("alice");
    let bob = node.identities.create_identity("bob");
    let carol = node.identities.create_identity("carol");

    node.send_direct(alice.id, &bob.public_half(), "for bob only", 60)
        .await
        .unwrap();

    let inbox = node.identities.inbox(bob.id).unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].public_half, alice.public_half());
    assert_eq!(inbox[0].recipient, Recipient::PublicHalf(bob.public_half()));
    assert!(node.identities.inbox(alice.id).unwrap().is_empty());
    assert!(node.identities.inbox(carol.id).unwrap().is_empty());
    node.stop();
}

/// Group members see a post; outsiders do not.
#[tokio::test]
async fn group_membership_decides_visibility() {
    let node = isolated_node().await;
    let alice = node.identities.create_identity("alice");
    let bob = node.identities.create_identity("bob");
    let mallory = node.identities.create_identity("mallory");
    let group = node.identities.create_group(alice.id, "club").unwrap();
    node.identities.join_group(bob.id, "club", group.key).unwrap();

    node.post_to_group(alice.id, &group.key, "members only", 60)
        .await
        .unwrap();

    assert_eq!(node.identities.inbox(bob.id).unwrap().len(), 1);
    assert!(node.identities.inbox(mallory.id).unwrap().is_empty());
    node.stop();
}

/// Posting to a group the identity does not hold is refused before any work.
#[tokio::test]
async fn posting_to_unknown_group_fails() {
    let node = isolated_node().await;
    let alice = node.identities.create_identity("alice");
    let result = node.post_to_group(alice.id, &[9u8; 32], "nope", 60).await;
    assert!(result.is_err());
    assert!(node.objects.is_empty());
    node.stop();
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

#[test]
fn overlong_peer_address_is_rejected() {
    let now = agora_protocol::time::now();
    let address = "h".repeat(MAX_ADDRESS_LENGTH + 1);
    let expiration_time = now + 60;
    // A genuinely valid proof does not help.
    let input = Peer::pow_input(&address, expiration_time);
    let nonce = pow::solve(&input, Peer::pow_ttl(60)).unwrap();
    let peer = Peer {
        address,
        nonce,
        expiration_time,
    };

    let peers = PeerStore::new();
    assert_eq!(peers.admit(peer, now), Admission::AddressTooLong);
    assert!(peers.is_empty());
}

#[test]
fn duplicate_submission_is_stored_once() {
    let now = 1_700_000_000;
    let object = mined(b"twice", now + 60, 60);
    let mut remined = object.clone();
    remined.receive_time = now + 5;

    let objects = ObjectStore::new();
    assert!(objects.insert_if_admissible(object, now));
    assert!(!objects.insert_if_admissible(remined, now + 5));
    assert_eq!(objects.len(), 1);
}

#[test]
fn expired_object_is_gone_after_the_sweep() {
    let now = 1_700_000_000;
    let object = mined(b"short lived", now + 10, 10);
    let hash = object.content_hash();

    let objects = ObjectStore::new();
    assert!(objects.insert_if_admissible(object, now));

    assert!(objects.sweep_expired(now + 9).is_empty());
    assert!(objects.contains(&hash));

    assert_eq!(objects.sweep_expired(now + 10).len(), 1);
    assert!(!objects.contains(&hash));
}

/// An object whose solve finished after its lifetime ran out is refused
/// locally instead of being stored and announced.
#[tokio::test]
async fn object_that_expired_while_mining_is_not_published() {
    let node = isolated_node().await;
    let started = now() - 10;
    let object = GossipObject::mine(&PowWorker::new(), b"too slow".to_vec(), 1, started)
        .await
        .unwrap();

    let result = node.publish(object);
    assert!(matches!(
        result,
        Err(NodeError::NotAdmitted(Admission::Expired))
    ));
    assert!(node.objects.is_empty());
    node.stop();
}

// ---------------------------------------------------------------------------
// Gossip
// ---------------------------------------------------------------------------

/// A peer learned through `POST /peers` is dialed right away, not on the next
/// reconnection sweep.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn learned_peer_is_dialed_immediately() {
    let a = isolated_node().await;
    let b = AgoraNode::start(NodeConfig {
        reconnect_interval: Duration::from_secs(600),
        ..loopback_config(Vec::new())
    })
    .await
    .unwrap();

    let record = Peer::mine(&PowWorker::new(), a.local_addr().to_string(), 60, now())
        .await
        .unwrap();
    GossipClient::new(Duration::from_secs(5))
        .unwrap()
        .push_peer(&b.local_addr().to_string(), &record)
        .await
        .unwrap();

    assert!(b.peers.contains(&record.content_hash()));
    assert!(eventually(Duration::from_secs(5), || b.connected_count() == 1).await);

    b.stop();
    a.stop();
}

/// A node with a backlog pushes all of it to a new peer, and objects created
/// meanwhile still flow.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backlog_and_live_objects_reach_a_new_peer() {
    let a = isolated_node().await;

    let backlog = Arc::new(ObjectStore::new());
    let expiration_time = now() + 60;
    let hashes: Vec<_> = (0..24)
        .map(|i| {
            let object = mined(format!("backlog {i}").as_bytes(), expiration_time, 60);
            backlog.insert_trusted(object.clone());
            object.content_hash()
        })
        .collect();

    let b = AgoraNode::start_with(
        loopback_config(vec![a.local_addr().to_string()]),
        backlog,
        Arc::new(PeerStore::new()),
        Arc::new(IdentityRegistry::new()),
    )
    .await
    .unwrap();
    let live = b.create_object(b"live".to_vec(), 60).await.unwrap();

    let delivered = eventually(Duration::from_secs(20), || {
        hashes.iter().all(|hash| a.objects.contains(hash))
            && a.objects.contains(&live.content_hash())
    })
    .await;
    assert!(delivered, "a holds {} of {}", a.objects.len(), hashes.len() + 1);

    b.stop();
    a.stop();
}

/// Two nodes sharing a bootstrap peer end up with the same objects.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_nodes_converge_through_a_bootstrap_peer() {
    let a = isolated_node().await;
    let early = a.create_object(b"from a".to_vec(), 60).await.unwrap();

    let b = AgoraNode::start(loopback_config(vec![a.local_addr().to_string()]))
        .await
        .unwrap();
    let late = b.create_object(b"from b".to_vec(), 60).await.unwrap();

    let converged = eventually(Duration::from_secs(20), || {
        [&a, &b].iter().all(|node| {
            node.objects.contains(&early.content_hash())
                && node.objects.contains(&late.content_hash())
        })
    })
    .await;
    assert!(converged, "a={} b={}", a.objects.len(), b.objects.len());

    // Objects created after the link is up flow too.
    let after = a.create_object(b"after".to_vec(), 60).await.unwrap();
    assert!(
        eventually(Duration::from_secs(20), || b
            .objects
            .contains(&after.content_hash()))
        .await
    );

    b.stop();
    a.stop();
}

/// A group post made on one node reaches a member's inbox on another.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn group_post_crosses_nodes() {
    let a = isolated_node().await;
    let b = AgoraNode::start(loopback_config(vec![a.local_addr().to_string()]))
        .await
        .unwrap();

    let alice = a.identities.create_identity("alice");
    let group = a.identities.create_group(alice.id, "relay").unwrap();
    let bob = b.identities.create_identity("bob");
    b.identities.join_group(bob.id, "relay", group.key).unwrap();

    a.post_to_group(alice.id, &group.key, "across the wire", 60)
        .await
        .unwrap();

    let delivered = eventually(Duration::from_secs(20), || {
        b.identities
            .inbox(bob.id)
            .map(|inbox| inbox.iter().any(|m| m.message == "across the wire"))
            .unwrap_or(false)
    })
    .await;
    assert!(delivered);

    b.stop();
    a.stop();
}

/// Stopping a node closes every connection it owns.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_tears_down_connections() {
    let a = isolated_node().await;
    let b = AgoraNode::start(loopback_config(vec![a.local_addr().to_string()]))
        .await
        .unwrap();

    assert!(eventually(Duration::from_secs(10), || b.connected_count() == 1).await);
    b.stop();
    assert!(b.connections().is_empty());
    a.stop();
}
