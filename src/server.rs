//! # Server
//!
//! Accept loop and shared handles. One tokio task per accepted connection;
//! the only state those tasks share travels through the switchboard handle.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::connection;
use crate::credentials::CredentialStore;
use crate::keyexchange::DhParams;
use crate::switchboard::Switchboard;

/// Cheap-to-clone bundle of everything a connection worker needs.
#[derive(Debug, Clone)]
pub(crate) struct ServerContext {
    pub switchboard: Switchboard,
    pub credentials: Arc<CredentialStore>,
    pub params: Arc<DhParams>,
}

/// The chat relay server.
///
/// ```ignore
/// let server = Server::bind("0.0.0.0:5000", credentials, DhParams::default()).await?;
/// server.run().await?;
/// ```
pub struct Server {
    listener: TcpListener,
    ctx: ServerContext,
}

impl Server {
    /// Bind the listener and spawn the switchboard actor.
    pub async fn bind(addr: &str, credentials: CredentialStore, params: DhParams) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        if credentials.is_empty() {
            warn!("credential store is empty, every login will fail");
        }
        info!(addr = %listener.local_addr()?, "chat relay listening");
        Ok(Self {
            listener,
            ctx: ServerContext {
                switchboard: Switchboard::spawn(),
                credentials: Arc::new(credentials),
                params: Arc::new(params),
            },
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, one worker task each.
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, peer) = self
                .listener
                .accept()
                .await
                .context("accept failed")?;
            debug!(peer = %peer, "inbound connection");
            tokio::spawn(connection::serve_connection(stream, self.ctx.clone()));
        }
    }
}
