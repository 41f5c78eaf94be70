//! # Switchboard
//!
//! Single-writer discipline for all shared connection state. The wait
//! queue, active pairs, session registry, and online set are owned by one
//! actor task; connection workers talk to it through a cheap-to-clone
//! handle and never touch the tables directly.
//!
//! ## Architecture
//!
//! - `Switchboard`: the public handle (clone freely, send commands)
//! - `SwitchboardActor`: owns all state, processes commands sequentially
//! - `SwitchboardCommand`: commands sent from handles to the actor
//!
//! Teardown is a single command, so removal from every table plus the
//! partner notification happen atomically with respect to all other
//! workers.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::integrity::SessionKey;
use crate::matchmaker::Matchmaker;
use crate::protocol;
use crate::registry::{Session, SessionRegistry};

/// Depth of the actor's command queue. Workers block (without spinning)
/// when the actor falls behind.
const COMMAND_QUEUE_DEPTH: usize = 256;

/// Outcome of a match request.
#[derive(Debug)]
pub enum MatchStatus {
    /// Paired immediately with the longest-waiting user.
    Paired(String),
    /// Queued; the receiver resolves with the partner's name once a later
    /// request pairs us, or fails if we are released first.
    Queued(oneshot::Receiver<String>),
}

// ============================================================================
// Commands sent from Handle to Actor
// ============================================================================

enum SwitchboardCommand {
    Login {
        user: String,
        reply: oneshot::Sender<bool>,
    },
    RegisterSession {
        user: String,
        session: Session,
        reply: oneshot::Sender<()>,
    },
    RequestMatch {
        user: String,
        reply: oneshot::Sender<MatchStatus>,
    },
    PartnerOf {
        user: String,
        reply: oneshot::Sender<Option<String>>,
    },
    OnlineUsers {
        reply: oneshot::Sender<Vec<String>>,
    },
    SessionOf {
        user: String,
        reply: oneshot::Sender<Option<Session>>,
    },
    Teardown {
        user: String,
        reply: oneshot::Sender<Option<String>>,
    },
    Quit,
}

// ============================================================================
// Switchboard Handle (public API - cheap to clone)
// ============================================================================

/// Handle to the switchboard actor.
#[derive(Clone)]
pub struct Switchboard {
    cmd_tx: mpsc::Sender<SwitchboardCommand>,
}

impl std::fmt::Debug for Switchboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Switchboard").finish()
    }
}

impl Switchboard {
    /// Spawn the actor task and return a handle to it.
    pub fn spawn() -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        tokio::spawn(SwitchboardActor::default().run(cmd_rx));
        Self { cmd_tx }
    }

    /// Mark a username online. Returns `false` when the name is already
    /// connected (or the switchboard is gone); the caller must refuse the
    /// login.
    pub async fn login(&self, user: &str) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        let cmd = SwitchboardCommand::Login {
            user: user.to_string(),
            reply: reply_tx,
        };
        if self.cmd_tx.send(cmd).await.is_err() {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    /// Record the session established for an online username.
    pub async fn register_session(
        &self,
        user: &str,
        key: SessionKey,
        outbound: mpsc::Sender<String>,
    ) {
        let (reply_tx, reply_rx) = oneshot::channel();
        let cmd = SwitchboardCommand::RegisterSession {
            user: user.to_string(),
            session: Session { outbound, key },
            reply: reply_tx,
        };
        if self.cmd_tx.send(cmd).await.is_ok() {
            let _ = reply_rx.await;
        }
    }

    /// Ask the matchmaker for a partner. A closed switchboard behaves like a
    /// queue entry released immediately: the returned waiter fails at once
    /// and the connection unwinds into teardown.
    pub async fn request_match(&self, user: &str) -> MatchStatus {
        let (reply_tx, reply_rx) = oneshot::channel();
        let cmd = SwitchboardCommand::RequestMatch {
            user: user.to_string(),
            reply: reply_tx,
        };
        if self.cmd_tx.send(cmd).await.is_err() {
            let (_dead_tx, dead_rx) = oneshot::channel();
            return MatchStatus::Queued(dead_rx);
        }
        match reply_rx.await {
            Ok(status) => status,
            Err(_) => {
                let (_dead_tx, dead_rx) = oneshot::channel();
                MatchStatus::Queued(dead_rx)
            }
        }
    }

    /// Current partner from the active-pairs table.
    pub async fn partner_of(&self, user: &str) -> Option<String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let cmd = SwitchboardCommand::PartnerOf {
            user: user.to_string(),
            reply: reply_tx,
        };
        if self.cmd_tx.send(cmd).await.is_err() {
            return None;
        }
        reply_rx.await.unwrap_or(None)
    }

    /// Currently authenticated usernames.
    pub async fn online_users(&self) -> Vec<String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(SwitchboardCommand::OnlineUsers { reply: reply_tx })
            .await
            .is_err()
        {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    /// Look up a username's live session (outbound queue plus key).
    pub async fn session(&self, user: &str) -> Option<Session> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let cmd = SwitchboardCommand::SessionOf {
            user: user.to_string(),
            reply: reply_tx,
        };
        if self.cmd_tx.send(cmd).await.is_err() {
            return None;
        }
        reply_rx.await.unwrap_or(None)
    }

    /// Remove a username from every table, best-effort-notify its partner,
    /// and return the former partner's name if a pair was dissolved.
    pub async fn teardown(&self, user: &str) -> Option<String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let cmd = SwitchboardCommand::Teardown {
            user: user.to_string(),
            reply: reply_tx,
        };
        if self.cmd_tx.send(cmd).await.is_err() {
            return None;
        }
        reply_rx.await.unwrap_or(None)
    }

    /// Shut the actor down. Pending waiters fail over to teardown.
    pub async fn quit(&self) {
        let _ = self.cmd_tx.send(SwitchboardCommand::Quit).await;
    }
}

// ============================================================================
// Switchboard Actor (owns all state, processes commands sequentially)
// ============================================================================

#[derive(Default)]
struct SwitchboardActor {
    matchmaker: Matchmaker,
    registry: SessionRegistry,
}

impl SwitchboardActor {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<SwitchboardCommand>) {
        loop {
            match cmd_rx.recv().await {
                Some(SwitchboardCommand::Login { user, reply }) => {
                    let accepted = self.registry.mark_online(&user);
                    if !accepted {
                        debug!(user = %user, "login refused, username already online");
                    }
                    let _ = reply.send(accepted);
                }
                Some(SwitchboardCommand::RegisterSession {
                    user,
                    session,
                    reply,
                }) => {
                    self.registry.insert_session(&user, session);
                    let _ = reply.send(());
                }
                Some(SwitchboardCommand::RequestMatch { user, reply }) => {
                    let (waiter_tx, waiter_rx) = oneshot::channel();
                    let status = match self.matchmaker.request_match(&user, waiter_tx) {
                        Some(partner) => {
                            info!(user = %user, partner = %partner, "pair formed");
                            MatchStatus::Paired(partner)
                        }
                        None => {
                            debug!(user = %user, "queued for pairing");
                            MatchStatus::Queued(waiter_rx)
                        }
                    };
                    let _ = reply.send(status);
                }
                Some(SwitchboardCommand::PartnerOf { user, reply }) => {
                    let _ = reply.send(self.matchmaker.partner_of(&user));
                }
                Some(SwitchboardCommand::OnlineUsers { reply }) => {
                    let _ = reply.send(self.registry.online_users());
                }
                Some(SwitchboardCommand::SessionOf { user, reply }) => {
                    let _ = reply.send(self.registry.session(&user));
                }
                Some(SwitchboardCommand::Teardown { user, reply }) => {
                    let _ = reply.send(self.teardown(&user));
                }
                Some(SwitchboardCommand::Quit) | None => {
                    debug!("switchboard actor shutting down");
                    break;
                }
            }
        }
    }

    /// Remove `user` from WaitQueue, ActivePairs, OnlineSet, and the
    /// session registry, then notify the partner, in that order.
    fn teardown(&mut self, user: &str) -> Option<String> {
        let partner = self.matchmaker.release(user);
        let was_online = self.registry.remove(user);

        if let Some(partner_name) = &partner {
            if let Some(partner_session) = self.registry.session(partner_name) {
                // Best-effort: the partner may be mid-teardown itself.
                let _ = partner_session
                    .outbound
                    .try_send(protocol::departure_notice(user));
            }
        }

        if was_online {
            debug!(user = %user, partner = ?partner, "connection state cleared");
        }
        partner
    }
}
