//! # Secure Channel Boundary
//!
//! The secure-transport layer is an external collaborator: by the time the
//! core runs, each connection is an opaque reliable, ordered, confidential
//! byte-stream with the peer already verified. The core therefore works
//! against plain `AsyncRead + AsyncWrite` and never names a concrete
//! transport; the server binary plugs in a `TcpStream`, a deployment may
//! plug in a TLS stream instead.
//!
//! One logical packet is one `\n`-terminated line.

use tokio::io::{self, AsyncWrite, AsyncWriteExt};

/// Write one logical packet to the channel.
pub async fn send_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
