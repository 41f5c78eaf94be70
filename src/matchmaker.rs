//! # Matchmaker
//!
//! FIFO wait queue plus the symmetric active-pairs table. Per username the
//! states are `Idle → Queued → Paired → Closed`; a username is a key in at
//! most one of the two tables at any time.
//!
//! The matchmaker is a plain data structure with no interior locking; it is
//! owned by the switchboard actor, which serializes all access. A caller
//! that ends up queued hands over a `oneshot` sender and suspends on the
//! receiving end until a later `request_match` pairs it; there is no
//! polling.

use std::collections::{HashMap, VecDeque};

use tokio::sync::oneshot;

#[derive(Debug, Default)]
pub struct Matchmaker {
    wait_queue: VecDeque<String>,
    active_pairs: HashMap<String, String>,
    /// Wake-up channel for each queued username, fired with the partner's
    /// name by the `request_match` call that pops it.
    waiters: HashMap<String, oneshot::Sender<String>>,
}

impl Matchmaker {
    /// Try to pair `user` with the longest-waiting queued user.
    ///
    /// Returns the partner when a pair forms (the queued partner's waiter
    /// fires with `user`'s name). Returns `None` when `user` was enqueued
    /// instead; `waiter` is then kept until pairing or release. A user never
    /// pairs with itself, and never occupies two queue slots.
    pub fn request_match(&mut self, user: &str, waiter: oneshot::Sender<String>) -> Option<String> {
        if let Some(partner) = self.active_pairs.get(user) {
            // Repeat call from an already-paired user.
            return Some(partner.clone());
        }

        if self.wait_queue.front().is_some_and(|head| head != user) {
            if let Some(partner) = self.wait_queue.pop_front() {
                self.active_pairs.insert(user.to_string(), partner.clone());
                self.active_pairs.insert(partner.clone(), user.to_string());
                if let Some(tx) = self.waiters.remove(&partner) {
                    let _ = tx.send(user.to_string());
                }
                return Some(partner);
            }
        }

        if !self.wait_queue.iter().any(|queued| queued == user) {
            self.wait_queue.push_back(user.to_string());
        }
        // A repeat request keeps the single queue slot but supersedes the
        // stored waiter.
        self.waiters.insert(user.to_string(), waiter);
        None
    }

    /// Remove `user` from whichever table holds it, transitioning it to
    /// `Closed`. Returns the former partner when a pair is dissolved, so the
    /// caller can notify them. Dropping a queued user's waiter wakes its
    /// connection with a closed-channel error.
    pub fn release(&mut self, user: &str) -> Option<String> {
        self.wait_queue.retain(|queued| queued != user);
        self.waiters.remove(user);

        let partner = self.active_pairs.remove(user)?;
        self.active_pairs.remove(&partner);
        Some(partner)
    }

    pub fn partner_of(&self, user: &str) -> Option<String> {
        self.active_pairs.get(user).cloned()
    }

    pub fn is_queued(&self, user: &str) -> bool {
        self.wait_queue.iter().any(|queued| queued == user)
    }

    pub fn is_paired(&self, user: &str) -> bool {
        self.active_pairs.contains_key(user)
    }
}
