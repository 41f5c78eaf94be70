//! # Couplet - Pairwise Chat Relay
//!
//! A server-mediated chat relay: authenticated clients are matched into 1:1
//! sessions and exchange integrity-checked text through the server.
//!
//! - **Key agreement**: per-connection Diffie-Hellman; each client shares a
//!   secret with the server, never with its partner
//! - **Integrity**: HMAC-SHA256 tags, verified and re-established per relay
//!   hop; the server is a trusted re-signer, not a blind forwarder
//! - **Matchmaking**: strict-FIFO wait queue with blocking (non-polling)
//!   pairing waits
//! - **Concurrency**: one task per connection; all shared tables live in a
//!   single switchboard actor reached through cheap-clone handles
//!
//! ## Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `server` | Accept loop, one worker task per connection |
//! | `connection` | Per-connection lifecycle and teardown funnel |
//! | `switchboard` | Actor owning wait queue, pairs, sessions, online set |
//! | `matchmaker` | FIFO queue + symmetric active-pairs table |
//! | `registry` | Username → session (channel handle, key) |
//! | `relay` | Verify, re-tag, forward; `BAD`/`NOPART` sentinels |
//! | `commands` | `USERS` / `ONLINE` / `PARTNER` directory queries |
//! | `keyexchange` | DH keypairs and shared-secret derivation |
//! | `integrity` | Session keys and message tags |
//! | `protocol` | Wire tokens, framing, notices |
//! | `credentials` | File-backed username → password-hash store |
//! | `channel` | Line framing over the opaque secure byte-stream |
//! | `client` | Interactive terminal client |

pub mod channel;
pub mod client;
pub(crate) mod commands;
pub(crate) mod connection;
pub mod credentials;
pub mod integrity;
pub mod keyexchange;
pub mod matchmaker;
pub mod protocol;
pub mod registry;
pub(crate) mod relay;
pub mod server;
pub mod switchboard;

pub use credentials::CredentialStore;
pub use integrity::SessionKey;
pub use keyexchange::DhParams;
pub use server::Server;
pub use switchboard::{MatchStatus, Switchboard};
