//! Integration tests for the pairing and relay protocol.
//!
//! Each test binds a real server on a loopback port and drives it with raw
//! protocol clients over TCP.
//!
//! Run with verbose output: RUST_LOG=debug cargo test --test pairing_relay -- --nocapture

use std::net::SocketAddr;
use std::sync::Once;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use couplet::channel;
use couplet::credentials::CredentialStore;
use couplet::integrity::{self, SessionKey};
use couplet::keyexchange::{self, DhParams};
use couplet::protocol;
use couplet::Server;

/// One-time tracing initialization. Use RUST_LOG=debug for verbose output.
static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG")
            .map(|_| tracing_subscriber::EnvFilter::from_default_env())
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Window after which we call a channel silent.
const SILENCE_WINDOW: Duration = Duration::from_millis(300);

async fn start_server(users: &[(&str, &str)]) -> SocketAddr {
    init_tracing();
    let mut store = CredentialStore::default();
    for (user, pass) in users {
        store.register(user, pass).expect("unique fixture users");
    }
    let server = Server::bind("127.0.0.1:0", store, DhParams::default())
        .await
        .expect("bind failed");
    let addr = server.local_addr().expect("local addr");
    tokio::spawn(server.run());
    addr
}

struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    key: SessionKey,
}

/// Open a connection and send the login line; returns the transport plus
/// the server's one-word verdict.
async fn raw_login(
    addr: SocketAddr,
    login_line: &str,
) -> (Lines<BufReader<OwnedReadHalf>>, OwnedWriteHalf, String) {
    let stream = TcpStream::connect(addr).await.expect("connect failed");
    let (read_half, mut writer) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    channel::send_line(&mut writer, login_line)
        .await
        .expect("login write failed");
    let verdict = timeout(TEST_TIMEOUT, lines.next_line())
        .await
        .expect("timed out waiting for login verdict")
        .expect("login read failed")
        .expect("server closed before login verdict");
    (lines, writer, verdict)
}

impl TestClient {
    /// Full client handshake: login plus key exchange.
    async fn connect(addr: SocketAddr, username: &str, password: &str) -> Self {
        let (mut lines, mut writer, verdict) =
            raw_login(addr, &format!("{username}:{password}")).await;
        assert_eq!(verdict, protocol::LOGIN_OK, "login should succeed");

        // Server's public value first, then ours.
        let server_public_line = timeout(TEST_TIMEOUT, lines.next_line())
            .await
            .expect("timed out in key exchange")
            .expect("key exchange read failed")
            .expect("server closed during key exchange");
        let server_public =
            keyexchange::parse_public(&server_public_line).expect("server sent a decimal value");

        let params = DhParams::default();
        let keypair = keyexchange::generate_keypair(&params);
        channel::send_line(&mut writer, &keypair.public.to_string())
            .await
            .expect("public value write failed");

        let secret = keyexchange::derive_shared(&params, &keypair.private, &server_public);
        Self {
            lines,
            writer,
            key: SessionKey::from_secret(&secret),
        }
    }

    async fn send(&mut self, line: &str) {
        channel::send_line(&mut self.writer, line)
            .await
            .expect("send failed");
    }

    /// Tag `text` under our session key and send it as a chat packet.
    async fn send_chat(&mut self, text: &str) {
        let tag = integrity::tag(&self.key, text);
        self.send(&protocol::seal_envelope(text, &tag)).await;
    }

    async fn recv(&mut self) -> String {
        timeout(TEST_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .expect("read failed")
            .expect("server closed the connection")
    }

    /// Assert nothing arrives for a short window.
    async fn expect_silence(&mut self) {
        if let Ok(line) = timeout(SILENCE_WINDOW, self.lines.next_line()).await {
            panic!("expected silence, got {:?}", line);
        }
    }
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn login_rejected_for_bad_password() {
    let addr = start_server(&[("alice", "segredo")]).await;
    let (_lines, _writer, verdict) = raw_login(addr, "alice:errada").await;
    assert_eq!(verdict, protocol::LOGIN_FAIL);
}

#[tokio::test]
async fn login_rejected_for_unknown_user() {
    let addr = start_server(&[("alice", "segredo")]).await;
    let (_lines, _writer, verdict) = raw_login(addr, "mallory:segredo").await;
    assert_eq!(verdict, protocol::LOGIN_FAIL);
}

#[tokio::test]
async fn malformed_login_line_is_refused() {
    let addr = start_server(&[("alice", "segredo")]).await;
    let (_lines, _writer, verdict) = raw_login(addr, "no delimiter at all").await;
    assert_eq!(verdict, protocol::LOGIN_FAIL);
}

#[tokio::test]
async fn second_login_for_an_online_user_is_refused() {
    let addr = start_server(&[("alice", "a"), ("bob", "b")]).await;
    let _alice = TestClient::connect(addr, "alice", "a").await;

    let (_lines, _writer, verdict) = raw_login(addr, "alice:a").await;
    assert_eq!(verdict, protocol::LOGIN_FAIL);
}

// ============================================================================
// Pairing and relay
// ============================================================================

#[tokio::test]
async fn pair_forms_and_messages_relay_with_fresh_tags() {
    let addr = start_server(&[("alice", "a"), ("bob", "b")]).await;
    let mut alice = TestClient::connect(addr, "alice", "a").await;
    let mut bob = TestClient::connect(addr, "bob", "b").await;

    // Both sides learn each other's identity.
    assert_eq!(alice.recv().await, protocol::pairing_notice("bob"));
    assert_eq!(bob.recv().await, protocol::pairing_notice("alice"));

    // alice → bob: the forwarded copy names the sender and verifies under
    // bob's own session key (per-hop re-tagging).
    alice.send_chat("hi").await;
    let forwarded = bob.recv().await;
    let (text, tag) = protocol::split_envelope(&forwarded).expect("framed relay line");
    assert_eq!(text, "alice: hi");
    assert!(integrity::verify(&bob.key, "hi", tag));

    // bob → alice works symmetrically.
    bob.send_chat("oi").await;
    let forwarded = alice.recv().await;
    let (text, tag) = protocol::split_envelope(&forwarded).expect("framed relay line");
    assert_eq!(text, "bob: oi");
    assert!(integrity::verify(&alice.key, "oi", tag));

    // A literal delimiter inside the text survives the trip intact.
    alice.send_chat("a||b").await;
    let forwarded = bob.recv().await;
    let (text, tag) = protocol::split_envelope(&forwarded).expect("framed relay line");
    assert_eq!(text, "alice: a||b");
    assert!(integrity::verify(&bob.key, "a||b", tag));
}

#[tokio::test]
async fn tampered_message_bounces_to_sender_and_never_reaches_partner() {
    let addr = start_server(&[("alice", "a"), ("bob", "b")]).await;
    let mut alice = TestClient::connect(addr, "alice", "a").await;
    let mut bob = TestClient::connect(addr, "bob", "b").await;
    alice.recv().await;
    bob.recv().await;

    // Tag computed under the wrong key.
    let wrong_key = SessionKey::from_text("chave errada");
    let tag = integrity::tag(&wrong_key, "hi");
    alice.send(&protocol::seal_envelope("hi", &tag)).await;

    assert_eq!(alice.recv().await, protocol::TAMPERED_REPLY);
    bob.expect_silence().await;

    // The connection survives: a valid message still goes through.
    alice.send_chat("ainda aqui").await;
    let forwarded = bob.recv().await;
    assert!(forwarded.starts_with("alice: ainda aqui"));
}

#[tokio::test]
async fn malformed_packet_is_dropped_without_any_reply() {
    let addr = start_server(&[("alice", "a"), ("bob", "b")]).await;
    let mut alice = TestClient::connect(addr, "alice", "a").await;
    let mut bob = TestClient::connect(addr, "bob", "b").await;
    alice.recv().await;
    bob.recv().await;

    alice.send("sem delimitador nenhum").await;
    bob.expect_silence().await;
    alice.expect_silence().await;
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::test]
async fn directory_commands_answer_on_the_requester_channel() {
    let addr = start_server(&[("alice", "a"), ("bob", "b"), ("carol", "c")]).await;
    let mut alice = TestClient::connect(addr, "alice", "a").await;
    let mut bob = TestClient::connect(addr, "bob", "b").await;
    alice.recv().await;
    bob.recv().await;

    alice.send("__CMD__:USERS").await;
    assert_eq!(alice.recv().await, "Registrados: alice, bob, carol");

    alice.send("__CMD__:ONLINE").await;
    assert_eq!(alice.recv().await, "Online: alice, bob");

    alice.send("__CMD__:PARTNER").await;
    assert_eq!(alice.recv().await, "Parceiro atual: bob");

    alice.send("__CMD__:BOGUS").await;
    assert_eq!(alice.recv().await, "Comando desconhecido");

    // Command traffic never leaks to the partner.
    bob.expect_silence().await;
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test]
async fn exit_notifies_partner_and_later_sends_get_nopart() {
    let addr = start_server(&[("alice", "a"), ("bob", "b")]).await;
    let mut alice = TestClient::connect(addr, "alice", "a").await;
    let mut bob = TestClient::connect(addr, "bob", "b").await;
    alice.recv().await;
    bob.recv().await;

    bob.send(protocol::EXIT_TOKEN).await;

    let notice = alice.recv().await;
    assert!(notice.contains("bob"), "departure notice names bob: {notice}");

    // The survivor's chat now has nowhere to go.
    alice.send_chat("alguém aí?").await;
    assert_eq!(alice.recv().await, protocol::NO_PARTNER_REPLY);

    // But the connection itself is still serviceable.
    alice.send("__CMD__:PARTNER").await;
    assert_eq!(alice.recv().await, "Sem parceiro no momento");
}

#[tokio::test]
async fn abrupt_disconnect_behaves_like_exit() {
    let addr = start_server(&[("alice", "a"), ("bob", "b")]).await;
    let mut alice = TestClient::connect(addr, "alice", "a").await;
    let bob = TestClient::connect(addr, "bob", "b").await;
    alice.recv().await;

    drop(bob);

    let notice = alice.recv().await;
    assert!(notice.contains("bob"), "departure notice names bob: {notice}");
}

#[tokio::test]
async fn departed_username_is_free_for_a_new_login() {
    let addr = start_server(&[("alice", "a"), ("bob", "b")]).await;
    let mut alice = TestClient::connect(addr, "alice", "a").await;
    let mut bob = TestClient::connect(addr, "bob", "b").await;
    alice.recv().await;
    bob.recv().await;

    bob.send(protocol::EXIT_TOKEN).await;
    alice.recv().await; // departure notice

    // bob's teardown completed (the notice proves it), so the name is free.
    let (_lines, _writer, verdict) = raw_login(addr, "bob:b").await;
    assert_eq!(verdict, protocol::LOGIN_OK);
}

// ============================================================================
// Matchmaking order
// ============================================================================

#[tokio::test]
async fn third_user_waits_for_a_fourth() {
    let addr = start_server(&[("alice", "a"), ("bob", "b"), ("carol", "c"), ("dave", "d")]).await;
    let mut alice = TestClient::connect(addr, "alice", "a").await;
    let mut bob = TestClient::connect(addr, "bob", "b").await;
    alice.recv().await;
    bob.recv().await;

    let mut carol = TestClient::connect(addr, "carol", "c").await;
    carol.expect_silence().await;

    let mut dave = TestClient::connect(addr, "dave", "d").await;
    assert_eq!(carol.recv().await, protocol::pairing_notice("dave"));
    assert_eq!(dave.recv().await, protocol::pairing_notice("carol"));
}

#[tokio::test]
async fn disconnect_while_waiting_releases_the_queue_slot() {
    let addr = start_server(&[("alice", "a"), ("bob", "b"), ("carol", "c")]).await;

    let alice = TestClient::connect(addr, "alice", "a").await;
    drop(alice); // gone before anyone arrives

    // Give the server a moment to run alice's teardown.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut bob = TestClient::connect(addr, "bob", "b").await;
    bob.expect_silence().await; // queued, not paired with a ghost

    let mut carol = TestClient::connect(addr, "carol", "c").await;
    assert_eq!(bob.recv().await, protocol::pairing_notice("carol"));
    assert_eq!(carol.recv().await, protocol::pairing_notice("bob"));
}
