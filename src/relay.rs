//! # Relay Engine
//!
//! Per-connection packet interpretation while a connection is paired.
//! Integrity is verified and re-established per hop against each endpoint's
//! own server-shared secret: the server is a trusted re-signer, not a blind
//! forwarder.
//!
//! Recoverable faults never leave the sender's connection: a bad tag gets
//! `BAD`, a vanished partner gets `NOPART`, a malformed packet is dropped,
//! and a forwarding failure is swallowed (best-effort delivery).

use tokio::io::{self, AsyncWrite};
use tracing::{debug, warn};

use crate::channel;
use crate::commands;
use crate::integrity::{self, SessionKey};
use crate::protocol;
use crate::server::ServerContext;

/// What the relay loop should do after one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PacketOutcome {
    Continue,
    /// The client sent the exit token; leave the loop gracefully.
    Exit,
}

/// One paired connection's view of the relay: its own identity and key,
/// and the partner fixed at pairing time.
pub(crate) struct RelayEngine {
    pub user: String,
    pub partner: String,
    pub key: SessionKey,
}

impl RelayEngine {
    /// Interpret one inbound packet, replying on `writer` (the sender's own
    /// channel) where the protocol calls for it.
    pub(crate) async fn handle_packet<W>(
        &self,
        packet: &str,
        writer: &mut W,
        ctx: &ServerContext,
    ) -> io::Result<PacketOutcome>
    where
        W: AsyncWrite + Unpin,
    {
        if packet == protocol::EXIT_TOKEN {
            return Ok(PacketOutcome::Exit);
        }

        if let Some(token) = protocol::command_token(packet) {
            let reply = commands::respond(token, &self.user, ctx).await;
            channel::send_line(writer, &reply).await?;
            return Ok(PacketOutcome::Continue);
        }

        let Some((text, tag)) = protocol::split_envelope(packet) else {
            debug!(user = %self.user, "dropping packet without tag delimiter");
            return Ok(PacketOutcome::Continue);
        };

        if !integrity::verify(&self.key, text, tag) {
            // Tampering or a stale key; the sender is told, the partner
            // never sees the message.
            warn!(user = %self.user, "integrity check failed on inbound message");
            channel::send_line(writer, protocol::TAMPERED_REPLY).await?;
            return Ok(PacketOutcome::Continue);
        }

        let Some(partner_session) = ctx.switchboard.session(&self.partner).await else {
            channel::send_line(writer, protocol::NO_PARTNER_REPLY).await?;
            return Ok(PacketOutcome::Continue);
        };

        let forwarded_tag = integrity::tag(&partner_session.key, text);
        let line = protocol::relayed_line(&self.user, text, &forwarded_tag);
        if partner_session.outbound.try_send(line).is_err() {
            debug!(
                user = %self.user,
                partner = %self.partner,
                "partner outbound unavailable, message dropped"
            );
        }
        Ok(PacketOutcome::Continue)
    }
}
