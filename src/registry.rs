//! # Session Registry
//!
//! Single source of truth for "who is connected with what key": the mapping
//! from logged-in username to its session (outbound channel handle plus
//! session key), and the online set used by directory queries.
//!
//! The online set is a superset of the session map during the brief window
//! between a successful login and the end of key exchange. Like the
//! matchmaker, this is a plain structure owned by the switchboard actor.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;

use crate::integrity::SessionKey;

/// One connection's relay endpoint: the queue its owning task drains onto
/// the socket, and the key messages to it must be tagged with.
#[derive(Debug, Clone)]
pub struct Session {
    pub outbound: mpsc::Sender<String>,
    pub key: SessionKey,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
    online: HashSet<String>,
}

impl SessionRegistry {
    /// Mark a username online. Returns `false` if it already is: at most
    /// one live connection per username.
    pub fn mark_online(&mut self, user: &str) -> bool {
        self.online.insert(user.to_string())
    }

    /// Record a key-exchanged session for an online username.
    pub fn insert_session(&mut self, user: &str, session: Session) {
        debug_assert!(self.online.contains(user), "session for offline user");
        self.sessions.insert(user.to_string(), session);
    }

    pub fn session(&self, user: &str) -> Option<Session> {
        self.sessions.get(user).cloned()
    }

    pub fn is_online(&self, user: &str) -> bool {
        self.online.contains(user)
    }

    /// Drop every trace of a username. Returns whether it was online.
    pub fn remove(&mut self, user: &str) -> bool {
        self.sessions.remove(user);
        self.online.remove(user)
    }

    /// Currently authenticated usernames, sorted for stable replies.
    pub fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.online.iter().cloned().collect();
        users.sort();
        users
    }
}
