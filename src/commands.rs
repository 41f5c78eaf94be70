//! # Command Processor
//!
//! Directory-style queries dispatched from `__CMD__:` packets. Stateless:
//! each command reads the credential store or the switchboard tables and
//! produces a single-line reply on the requester's channel.

use crate::server::ServerContext;

/// Reply for a token that is not a known command.
pub(crate) const UNKNOWN_COMMAND_REPLY: &str = "Comando desconhecido";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    /// All registered usernames, from the credential store.
    Users,
    /// Currently connected usernames.
    Online,
    /// Current partner, or an explicit not-paired reply.
    Partner,
}

impl Command {
    pub(crate) fn parse(token: &str) -> Option<Self> {
        match token {
            "USERS" => Some(Command::Users),
            "ONLINE" => Some(Command::Online),
            "PARTNER" => Some(Command::Partner),
            _ => None,
        }
    }
}

/// Answer one command token on behalf of `user`.
pub(crate) async fn respond(token: &str, user: &str, ctx: &ServerContext) -> String {
    match Command::parse(token) {
        Some(Command::Users) => {
            format!("Registrados: {}", ctx.credentials.usernames().join(", "))
        }
        Some(Command::Online) => {
            format!("Online: {}", ctx.switchboard.online_users().await.join(", "))
        }
        Some(Command::Partner) => match ctx.switchboard.partner_of(user).await {
            Some(partner) => format!("Parceiro atual: {partner}"),
            None => "Sem parceiro no momento".to_string(),
        },
        None => UNKNOWN_COMMAND_REPLY.to_string(),
    }
}
