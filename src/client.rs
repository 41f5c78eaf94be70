//! # Interactive Client
//!
//! Terminal client for the relay: logs in, runs the key exchange, then
//! bridges stdin and the server connection. Slash commands map onto the
//! wire protocol:
//!
//! | Input | Wire |
//! |-------|------|
//! | `/exit` | `__EXIT__` |
//! | `/users` | `__CMD__:USERS` |
//! | `/online` | `__CMD__:ONLINE` |
//! | `/me` | `__CMD__:PARTNER` |
//! | anything else | `<text>\|\|<tag>` under the session key |

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::channel;
use crate::integrity::{self, SessionKey};
use crate::keyexchange::{self, DhParams};
use crate::protocol;

/// Run the interactive client against `addr` until the user exits or the
/// server closes the connection.
pub async fn run(addr: &str, params: &DhParams) -> Result<()> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    let username = prompt(&mut stdin, "Usuário: ").await?;
    let password = prompt(&mut stdin, "Senha: ").await?;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to {addr}"))?;
    let (read_half, mut write_half) = stream.into_split();
    let mut server = BufReader::new(read_half).lines();

    channel::send_line(&mut write_half, &format!("{username}:{password}")).await?;
    let reply = server
        .next_line()
        .await?
        .context("server closed during login")?;
    if reply != protocol::LOGIN_OK {
        bail!("login rejected");
    }

    // Key exchange: the server's public value arrives first.
    let server_public_line = server
        .next_line()
        .await?
        .context("server closed during key exchange")?;
    let server_public = keyexchange::parse_public(&server_public_line)?;
    let keypair = keyexchange::generate_keypair(params);
    channel::send_line(&mut write_half, &keypair.public.to_string()).await?;
    let secret = keyexchange::derive_shared(params, &keypair.private, &server_public);
    let key = SessionKey::from_secret(&secret);
    debug!("session key established");

    println!("Conectado. Aguardando um par...");

    loop {
        tokio::select! {
            inbound = server.next_line() => {
                match inbound? {
                    None => {
                        println!("Conexão encerrada pelo servidor.");
                        break;
                    }
                    Some(line) if line == protocol::TAMPERED_REPLY => {
                        println!("⚠ ALERTA: integridade quebrada, mensagem adulterada!");
                    }
                    Some(line) if line == protocol::NO_PARTNER_REPLY => {
                        println!("Parceiro indisponível, mensagem descartada.");
                    }
                    Some(line) => println!("{line}"),
                }
            }
            input = stdin.next_line() => {
                let Some(line) = input? else {
                    channel::send_line(&mut write_half, protocol::EXIT_TOKEN).await?;
                    break;
                };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                match text {
                    "/exit" => {
                        channel::send_line(&mut write_half, protocol::EXIT_TOKEN).await?;
                        println!("Você saiu do chat.");
                        break;
                    }
                    "/users" => {
                        send_command(&mut write_half, "USERS").await?;
                    }
                    "/online" => {
                        send_command(&mut write_half, "ONLINE").await?;
                    }
                    "/me" => {
                        send_command(&mut write_half, "PARTNER").await?;
                    }
                    _ => {
                        let tag = integrity::tag(&key, text);
                        channel::send_line(
                            &mut write_half,
                            &protocol::seal_envelope(text, &tag),
                        )
                        .await?;
                    }
                }
            }
        }
    }

    let _ = write_half.shutdown().await;
    Ok(())
}

async fn send_command<W>(writer: &mut W, token: &str) -> Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    channel::send_line(writer, &format!("{}{token}", protocol::CMD_PREFIX)).await?;
    Ok(())
}

async fn prompt<R>(stdin: &mut tokio::io::Lines<R>, label: &str) -> Result<String>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    use std::io::Write;
    print!("{label}");
    std::io::stdout().flush()?;
    let line = stdin.next_line().await?.context("stdin closed")?;
    Ok(line.trim().to_string())
}
