//! Local view state mirrored from the store.
//!
//! DESIGN
//! ======
//! `ViewState` lives behind `Arc<RwLock<_>>` shared between the client and
//! its mirror task. The mirror task is the only writer of `games`; every
//! snapshot replaces the collection wholesale. Listeners registered through
//! the client get a copy of each new collection, and are dropped once their
//! receiver goes away. When the subscription ends on its own the feed is
//! marked ended and every listener is closed, so waiters see `None`.

use tokio::sync::mpsc;

use crate::game::Collection;
use crate::identity::VoteState;

#[derive(Debug, Default)]
pub struct ViewState {
    /// Latest collection delivered by the subscription.
    pub games: Collection,
    /// The entry this client last voted for.
    pub current_vote: VoteState,
    /// Pending text in the "add game" input.
    pub draft: String,
    /// Number of snapshots applied since mount.
    pub snapshots_seen: u64,
    feed_ended: bool,
    listeners: Vec<mpsc::UnboundedSender<Collection>>,
}

impl ViewState {
    #[must_use]
    pub fn new(current_vote: VoteState) -> Self {
        Self { current_vote, ..Self::default() }
    }

    /// Replace the mirrored collection and notify listeners.
    pub fn apply_snapshot(&mut self, games: Collection) {
        self.listeners.retain(|tx| tx.send(games.clone()).is_ok());
        self.games = games;
        self.snapshots_seen += 1;
    }

    /// Register a listener; it receives every collection applied after this call.
    /// After the feed has ended the receiver comes back already closed.
    pub fn listen(&mut self) -> mpsc::UnboundedReceiver<Collection> {
        let (tx, rx) = mpsc::unbounded_channel();
        if !self.feed_ended {
            self.listeners.push(tx);
        }
        rx
    }

    /// The subscription finished: close every listener.
    pub fn end_feed(&mut self) {
        self.feed_ended = true;
        self.listeners.clear();
    }

    /// A new subscription is starting.
    pub fn restart_feed(&mut self) {
        self.feed_ended = false;
    }

    #[must_use]
    pub fn feed_ended(&self) -> bool {
        self.feed_ended
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
