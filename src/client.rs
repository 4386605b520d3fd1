//! Vote client: the state manager behind the voting board.
//!
//! DESIGN
//! ======
//! A `VoteClient` is built once per session with its collaborators injected:
//! the realtime store and the client-local storage. Mounting does three
//! things, in order:
//!
//! 1. Overwrite both fixed entries with zeroed counters. This is an
//!    unconditional write, not a create-if-missing, so every mount resets the
//!    official tallies. Failures are logged and otherwise ignored.
//! 2. Load the persisted vote identity.
//! 3. Subscribe to the collection and spawn the mirror task, which replaces
//!    the local collection with each full snapshot.
//!
//! Exactly one subscription is active per client. Switching stores or
//! unmounting tears the current one down first.
//!
//! ERROR HANDLING
//! ==============
//! Add and vote return errors to the caller but never roll anything back:
//! when the store write fails, the draft is not cleared and the vote identity
//! is not updated, so local state stays as it was before the attempt.

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ErrorCode;
use crate::game::{Collection, GameEntry, fixed_seed_entries};
use crate::identity::{self, LocalStorage, StorageError, VoteState};
use crate::state::ViewState;
use crate::store::{self, RealtimeStore, StoreError, Subscription};
use crate::view::Board;
use crate::vote::apply_vote;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ErrorCode for ClientError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Store(e) => e.error_code(),
            Self::Storage(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.retryable(),
            Self::Storage(e) => e.retryable(),
        }
    }
}

/// What a call to [`VoteClient::vote`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// The client had already voted for this entry; nothing was written.
    AlreadyVoted,
    /// The transaction committed. `previous` is the identity it replaced.
    Committed { previous: VoteState, attempts: usize },
}

pub struct VoteClient {
    store: Arc<dyn RealtimeStore>,
    storage: Arc<dyn LocalStorage>,
    collection: String,
    view: Arc<RwLock<ViewState>>,
    mirror: Option<JoinHandle<()>>,
}

// =============================================================================
// LIFECYCLE
// =============================================================================

impl VoteClient {
    /// Seed, load the saved vote, and start mirroring `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Store`] if the subscription cannot be opened.
    /// Seed failures and unreadable local storage are logged, not returned.
    pub async fn mount(
        store: Arc<dyn RealtimeStore>,
        storage: Arc<dyn LocalStorage>,
        collection: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let collection = collection.into();

        seed_fixed_games(store.as_ref(), &collection).await;

        let current_vote = identity::load_vote(storage.as_ref()).unwrap_or_else(|e| {
            warn!(error = %e, "could not read saved vote; starting without one");
            VoteState::NoVote
        });

        let view = Arc::new(RwLock::new(ViewState::new(current_vote)));
        let mut client = Self { store, storage, collection, view, mirror: None };
        client.start_mirror().await?;

        info!(collection = %client.collection, "vote client mounted");
        Ok(client)
    }

    async fn start_mirror(&mut self) -> Result<(), ClientError> {
        let subscription = self.store.subscribe(&self.collection).await?;
        self.view.write().await.restart_feed();
        let view = self.view.clone();
        let collection = self.collection.clone();
        self.mirror = Some(tokio::spawn(run_mirror(subscription, view, collection)));
        Ok(())
    }

    async fn stop_mirror(&mut self) {
        if let Some(handle) = self.mirror.take() {
            handle.abort();
            // Wait for the task to drop its subscription.
            let _ = handle.await;
        }
    }

    /// Point the client at a different store. The old subscription is torn
    /// down before the new one opens; fixed entries are not re-seeded.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Store`] if the new subscription cannot be opened.
    /// The client is left without a subscription in that case.
    pub async fn switch_store(&mut self, store: Arc<dyn RealtimeStore>) -> Result<(), ClientError> {
        self.stop_mirror().await;
        self.store = store;
        self.start_mirror().await?;
        info!(collection = %self.collection, "vote client switched store");
        Ok(())
    }

    /// Stop mirroring. In-flight writes are left to finish on their own.
    pub async fn unmount(mut self) {
        self.stop_mirror().await;
        info!(collection = %self.collection, "vote client unmounted");
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub fn is_mirroring(&self) -> bool {
        self.mirror.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for VoteClient {
    fn drop(&mut self) {
        if let Some(handle) = self.mirror.take() {
            handle.abort();
        }
    }
}

/// Unconditionally write both fixed entries with zero votes.
async fn seed_fixed_games(store: &dyn RealtimeStore, collection: &str) {
    for (id, entry) in fixed_seed_entries() {
        let path = store::path::child(collection, id);
        match store.write(&path, entry.to_value()).await {
            Ok(()) => debug!(%path, "fixed entry seeded"),
            Err(e) => warn!(error = %e, %path, "fixed entry seed failed"),
        }
    }
}

async fn run_mirror(mut subscription: Subscription, view: Arc<RwLock<ViewState>>, collection: String) {
    while let Some(snapshot) = subscription.recv().await {
        let games = Collection::from_snapshot(snapshot.as_ref());
        debug!(%collection, entries = games.len(), "snapshot received");
        view.write().await.apply_snapshot(games);
    }
    view.write().await.end_feed();
    warn!(%collection, "subscription ended; live updates stopped");
}

// =============================================================================
// READS
// =============================================================================

impl VoteClient {
    pub async fn games(&self) -> Collection {
        self.view.read().await.games.clone()
    }

    pub async fn current_vote(&self) -> VoteState {
        self.view.read().await.current_vote.clone()
    }

    pub async fn draft(&self) -> String {
        self.view.read().await.draft.clone()
    }

    pub async fn set_draft(&self, text: impl Into<String>) {
        self.view.write().await.draft = text.into();
    }

    /// Largest community vote count, at least 1.
    pub async fn progress_denominator(&self) -> u64 {
        self.view.read().await.games.progress_denominator()
    }

    /// Presentation model for the current state.
    pub async fn board(&self) -> Board {
        let view = self.view.read().await;
        Board::build(&view.games, &view.current_vote)
    }

    /// Receive every collection applied after this call. The receiver closes
    /// when the subscription ends.
    pub async fn updates(&self) -> tokio::sync::mpsc::UnboundedReceiver<Collection> {
        self.view.write().await.listen()
    }

    /// Wait until a received snapshot satisfies `pred`. Checks the latest
    /// snapshot first, if one has arrived. If the subscription has ended the
    /// latest collection is returned as is, whether or not it matches.
    pub async fn until(&self, pred: impl Fn(&Collection) -> bool) -> Collection {
        let mut rx = {
            let mut view = self.view.write().await;
            if view.feed_ended() || (view.snapshots_seen > 0 && pred(&view.games)) {
                return view.games.clone();
            }
            view.listen()
        };

        while let Some(games) = rx.recv().await {
            if pred(&games) {
                return games;
            }
        }
        // Feed ended before a match.
        self.games().await
    }
}

// =============================================================================
// WRITES
// =============================================================================

impl VoteClient {
    /// Submit a community entry. Blank input is ignored and returns `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Store`] if the store rejects the write.
    pub async fn add_game(&self, input: &str) -> Result<Option<String>, ClientError> {
        let Some(entry) = GameEntry::community(input) else {
            debug!("ignoring blank game name");
            return Ok(None);
        };

        let id = self.store.create_child(&self.collection, entry.to_value()).await?;
        info!(%id, name = %entry.name, "community entry added");
        Ok(Some(id))
    }

    /// Submit the current draft, clearing it once the entry is created.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Store`] if the store rejects the write; the
    /// draft is kept in that case.
    pub async fn submit_draft(&self) -> Result<Option<String>, ClientError> {
        let draft = self.draft().await;
        let id = self.add_game(&draft).await?;
        if id.is_some() {
            self.view.write().await.draft.clear();
        }
        Ok(id)
    }

    /// Vote for `id`, moving this client's vote off its previous pick.
    ///
    /// The saved identity is re-read from storage on every call, so calls
    /// made back to back each see the outcome of the one before.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Storage`] if the saved identity cannot be read
    /// or written, and [`ClientError::Store`] if the transaction fails.
    pub async fn vote(&self, id: &str) -> Result<VoteOutcome, ClientError> {
        let previous = identity::load_vote(self.storage.as_ref())?;
        if previous.is_voted_for(id) {
            debug!(%id, "already voted for this entry");
            return Ok(VoteOutcome::AlreadyVoted);
        }

        let from = previous.voted_for().map(str::to_string);
        let target = id.to_string();
        let outcome = self
            .store
            .transact(&self.collection, &move |current| apply_vote(current, from.as_deref(), &target))
            .await?;

        identity::save_vote(self.storage.as_ref(), id)?;
        self.view.write().await.current_vote = VoteState::VotedFor(id.to_string());

        info!(%id, previous = ?previous.voted_for(), attempts = outcome.attempts, "vote committed");
        Ok(VoteOutcome::Committed { previous, attempts: outcome.attempts })
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
