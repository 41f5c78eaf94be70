//! # Connection Lifecycle
//!
//! Drives one connection end to end:
//! `Connected → Authenticated → KeyAgreed → Waiting → Paired → Closed`.
//!
//! Once a username is registered anywhere in shared state, every exit path
//! (graceful exit token, peer disconnect, I/O error, key-exchange failure)
//! funnels through the same switchboard teardown before the channel drops,
//! so no partial state survives a connection.

use anyhow::{Context, Result};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::channel;
use crate::integrity::SessionKey;
use crate::keyexchange;
use crate::protocol;
use crate::relay::{PacketOutcome, RelayEngine};
use crate::server::ServerContext;
use crate::switchboard::MatchStatus;

/// Depth of the per-connection outbound queue. A partner that outpaces this
/// connection's socket loses messages (best-effort forwarding), it never
/// blocks the switchboard or its own loop.
const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Serve one accepted connection until it closes. The stream is the opaque
/// secure channel; this task owns it exclusively.
pub(crate) async fn serve_connection<S>(stream: S, ctx: ServerContext)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half).lines();

    let username = match authenticate(&mut reader, &mut write_half, &ctx).await {
        Ok(Some(name)) => name,
        Ok(None) => return,
        Err(err) => {
            debug!(error = %err, "connection dropped during login");
            return;
        }
    };
    info!(user = %username, "client authenticated");

    // The username now exists in shared state: from here on, exactly one
    // teardown runs no matter how `drive` comes back.
    if let Err(err) = drive(&mut reader, &mut write_half, &ctx, &username).await {
        debug!(user = %username, "connection ended abnormally: {err:#}");
    }
    ctx.switchboard.teardown(&username).await;
    let _ = write_half.shutdown().await;
    info!(user = %username, "client disconnected");
}

/// Read and check the login line. `Ok(Some)` means the username has been
/// marked online; `Ok(None)` means the client was refused (reply already
/// sent) and nothing was registered.
async fn authenticate<R, W>(
    reader: &mut Lines<R>,
    writer: &mut W,
    ctx: &ServerContext,
) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let Some(line) = reader.next_line().await? else {
        return Ok(None);
    };
    let Some((username, password)) = line.split_once(':') else {
        warn!("malformed login line, refusing");
        channel::send_line(writer, protocol::LOGIN_FAIL).await?;
        return Ok(None);
    };
    if !ctx.credentials.verify(username, password) {
        warn!(user = %username, "authentication failed");
        channel::send_line(writer, protocol::LOGIN_FAIL).await?;
        return Ok(None);
    }
    if !ctx.switchboard.login(username).await {
        warn!(user = %username, "refusing second login for an online user");
        channel::send_line(writer, protocol::LOGIN_FAIL).await?;
        return Ok(None);
    }
    channel::send_line(writer, protocol::LOGIN_OK).await?;
    Ok(Some(username.to_string()))
}

/// Everything between a successful login and teardown.
async fn drive<R, W>(
    reader: &mut Lines<R>,
    writer: &mut W,
    ctx: &ServerContext,
    username: &str,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    // Key exchange, server's public value first. A malformed peer value
    // fails the connection; the operator sees it, the partner tables were
    // never touched.
    let keypair = keyexchange::generate_keypair(&ctx.params);
    channel::send_line(writer, &keypair.public.to_string()).await?;
    let peer_line = reader
        .next_line()
        .await?
        .context("channel closed before the peer public value arrived")?;
    let peer_public = match keyexchange::parse_public(&peer_line) {
        Ok(value) => value,
        Err(err) => {
            warn!(user = %username, error = %err, "key exchange failed, closing connection");
            return Err(err.into());
        }
    };
    let secret = keyexchange::derive_shared(&ctx.params, &keypair.private, &peer_public);
    let key = SessionKey::from_secret(&secret);
    debug!(user = %username, "session key established");

    let (outbound_tx, mut outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
    ctx.switchboard
        .register_session(username, key.clone(), outbound_tx)
        .await;

    let Some(partner) = wait_for_partner(reader, ctx, username).await? else {
        return Ok(()); // left before a pair formed
    };
    channel::send_line(writer, &protocol::pairing_notice(&partner)).await?;

    let engine = RelayEngine {
        user: username.to_string(),
        partner,
        key,
    };
    relay_loop(reader, writer, &mut outbound_rx, &engine, ctx).await
}

/// Block (without polling) until the matchmaker pairs us, the client gives
/// up, or the connection drops. `Ok(None)` means no pair: proceed to
/// teardown.
async fn wait_for_partner<R>(
    reader: &mut Lines<R>,
    ctx: &ServerContext,
    username: &str,
) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut waiter = match ctx.switchboard.request_match(username).await {
        MatchStatus::Paired(partner) => return Ok(Some(partner)),
        MatchStatus::Queued(waiter) => waiter,
    };

    loop {
        tokio::select! {
            paired = &mut waiter => {
                // A failed waiter means we were released (server shutdown);
                // treat it like a disconnect.
                return Ok(paired.ok());
            }
            inbound = reader.next_line() => {
                match inbound? {
                    None => return Ok(None),
                    Some(packet) if packet == protocol::EXIT_TOKEN => return Ok(None),
                    Some(_) => {
                        debug!(user = %username, "dropping packet received before pairing");
                    }
                }
            }
        }
    }
}

/// The paired phase: drain partner-directed traffic onto the socket and
/// feed inbound packets to the relay engine, preserving per-connection
/// arrival order.
async fn relay_loop<R, W>(
    reader: &mut Lines<R>,
    writer: &mut W,
    outbound_rx: &mut mpsc::Receiver<String>,
    engine: &RelayEngine,
    ctx: &ServerContext,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            delivery = outbound_rx.recv() => {
                match delivery {
                    Some(line) => channel::send_line(writer, &line).await?,
                    // Our registry entry is gone: the server is shutting
                    // down around us.
                    None => return Ok(()),
                }
            }
            inbound = reader.next_line() => {
                match inbound? {
                    None => return Ok(()),
                    Some(packet) => {
                        if engine.handle_packet(&packet, writer, ctx).await?
                            == PacketOutcome::Exit
                        {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}
