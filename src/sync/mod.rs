// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Replication of the local decks to a remote repository.
//!
//! A sync pulls every deck, adopting remote states for card identities
//! without a pending local review, and then pushes the write queue one
//! commit per review. When the remote history of a deck moved in a way that
//! cannot be replayed onto, the pending reviews are pushed to a side branch
//! instead and stay queued.

#[cfg(test)]
pub(crate) mod fixture;
pub mod message;
mod periodic;
mod pull;
mod push;
pub mod snapshot;

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::db::Database;
use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::queue::QueueError;
use crate::queue::WriteQueue;
use crate::remote::Commit;
use crate::remote::Remote;
use crate::remote::Sha;
use crate::store::SharedStore;
use crate::store::lock;
use crate::sync::message::ReviewLine;
use crate::sync::message::parse_message;
use crate::sync::snapshot::deck_names;
use crate::types::card_id::CardId;
use crate::types::deck::DeckName;
use crate::types::timestamp::Timestamp;

/// Why a sync failed. None of these lose queued reviews.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncError {
    RemoteUnavailable(String),
    /// A file in the remote repository could not be parsed.
    MalformedRemote(String),
    QueueCorruption(String),
    /// The local store or database failed.
    Local(String),
    TimedOut,
    Cancelled,
}

impl SyncError {
    fn remote(e: ErrorReport) -> Self {
        SyncError::RemoteUnavailable(e.message().to_string())
    }
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::RemoteUnavailable(msg) => write!(f, "remote unavailable: {msg}"),
            SyncError::MalformedRemote(msg) => write!(f, "malformed remote: {msg}"),
            SyncError::QueueCorruption(msg) => {
                write!(f, "sync state lost, please resync ({msg})")
            }
            SyncError::Local(msg) => write!(f, "{msg}"),
            SyncError::TimedOut => write!(f, "sync timed out"),
            SyncError::Cancelled => write!(f, "sync cancelled"),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<ErrorReport> for SyncError {
    fn from(e: ErrorReport) -> Self {
        SyncError::Local(e.message().to_string())
    }
}

impl From<QueueError> for SyncError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Corrupt(detail) => SyncError::QueueCorruption(detail),
            QueueError::Storage(e) => SyncError::Local(e.message().to_string()),
        }
    }
}

impl From<SyncError> for ErrorReport {
    fn from(e: SyncError) -> Self {
        ErrorReport::new(e.to_string())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    Error,
}

/// A commit on the replicated branch, for history display.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSummary {
    pub sha: Sha,
    pub summary: String,
    pub timestamp: Timestamp,
    pub reviews: Vec<ReviewLine>,
}

impl From<Commit> for CommitSummary {
    fn from(commit: Commit) -> Self {
        let summary = commit.message.lines().next().unwrap_or_default().to_string();
        Self {
            reviews: parse_message(&commit.message),
            sha: commit.sha,
            summary,
            timestamp: commit.timestamp,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: SyncState,
    /// Reviews not replicated yet.
    pub pending: usize,
    pub message: Option<String>,
    pub last_sync: Option<Timestamp>,
    pub recent: Vec<CommitSummary>,
    /// Side branches holding reviews that need a manual merge.
    pub branches: Vec<String>,
}

/// What a sync did to one deck.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckOutcome {
    pub deck: DeckName,
    /// Whether a new remote head was read.
    pub pulled: bool,
    /// Card identities changed remotely while a local review was pending.
    pub conflicts: Vec<CardId>,
    /// Reviews replicated to the branch.
    pub pushed: usize,
    /// The side branch the pending reviews went to, if the history diverged.
    pub branch: Option<String>,
}

impl DeckOutcome {
    pub fn describe(&self) -> String {
        if let Some(branch) = &self.branch {
            return format!(
                "{}: pushed to branch `{branch}`, manual merge required",
                self.deck
            );
        }
        let mut parts = Vec::new();
        if self.pulled {
            parts.push("pulled".to_string());
        }
        if self.pushed > 0 {
            parts.push(format!("pushed {} reviews", self.pushed));
        }
        if !self.conflicts.is_empty() {
            parts.push(format!("{} conflicts", self.conflicts.len()));
        }
        if parts.is_empty() {
            parts.push("up to date".to_string());
        }
        format!("{}: {}", self.deck, parts.join(", "))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub decks: Vec<DeckOutcome>,
    pub recent: Vec<CommitSummary>,
}

impl SyncReport {
    pub fn deck(&self, name: &DeckName) -> Option<&DeckOutcome> {
        self.decks.iter().find(|outcome| &outcome.deck == name)
    }

    pub fn pushed(&self) -> usize {
        self.decks.iter().map(|outcome| outcome.pushed).sum()
    }

    pub fn branches(&self) -> Vec<String> {
        self.decks
            .iter()
            .filter_map(|outcome| outcome.branch.clone())
            .collect()
    }

    pub fn describe(&self) -> String {
        if self.decks.is_empty() {
            return "nothing to sync".to_string();
        }
        self.decks
            .iter()
            .map(DeckOutcome::describe)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub type SyncResult = Result<SyncReport, SyncError>;

pub struct SyncEngine<R: Remote> {
    remote: Arc<R>,
    store: SharedStore,
    queue: WriteQueue,
    db: Database,
    branch: String,
    config: SyncConfig,
    status: watch::Sender<SyncStatus>,
    deck_locks: Mutex<HashMap<DeckName, Arc<AsyncMutex<()>>>>,
    /// Cancels the sync in progress, if any.
    running: Mutex<Option<CancellationToken>>,
    shutdown: CancellationToken,
}

impl<R: Remote> SyncEngine<R> {
    /// `db` must be the database backing the store's write queue.
    pub fn new(
        remote: Arc<R>,
        store: SharedStore,
        db: Database,
        branch: impl Into<String>,
        config: SyncConfig,
    ) -> Fallible<Arc<Self>> {
        let queue = WriteQueue::new(db.clone());
        let status = SyncStatus {
            pending: queue.pending_count()?,
            ..SyncStatus::default()
        };
        let (status, _) = watch::channel(status);
        Ok(Arc::new(Self {
            remote,
            store,
            queue,
            db,
            branch: branch.into(),
            config,
            status,
            deck_locks: Mutex::new(HashMap::new()),
            running: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }))
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Start a sync in the background. Returns `None` if one is already
    /// running.
    pub fn trigger(self: &Arc<Self>) -> Option<JoinHandle<SyncResult>> {
        let token = self.begin()?;
        let engine = Arc::clone(self);
        Some(tokio::spawn(async move { engine.run(token).await }))
    }

    /// Sync and wait for the outcome. Returns `None` if a sync is already
    /// running.
    pub async fn sync(self: &Arc<Self>) -> Option<SyncResult> {
        let token = self.begin()?;
        Some(self.run(token).await)
    }

    /// Cancel the sync in progress. Commits already confirmed stay
    /// confirmed.
    pub fn cancel(&self) {
        if let Some(token) = self.running.lock().unwrap().as_ref() {
            token.cancel();
        }
    }

    /// Cancel the sync in progress and stop periodic syncing.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.cancel();
    }

    /// Publish the current number of pending reviews.
    pub fn refresh_pending(&self) {
        match self.queue.pending_count() {
            Ok(pending) => {
                self.status.send_if_modified(|status| {
                    let changed = status.pending != pending;
                    status.pending = pending;
                    changed
                });
            }
            Err(e) => log::error!("Failed to count pending reviews: {e}"),
        }
    }

    /// Drop the write queue and the remote snapshots, so that the next sync
    /// starts over from the remote. Reviews not replicated yet are lost.
    pub fn resync(&self) -> Result<(), SyncError> {
        if self.status.borrow().state == SyncState::Syncing {
            return Err(SyncError::Local(
                "cannot resync while a sync is running".to_string(),
            ));
        }
        self.queue.clear()?;
        self.status.send_modify(|status| {
            status.state = SyncState::Idle;
            status.pending = 0;
            status.message = Some("sync state reset".to_string());
        });
        Ok(())
    }

    /// Move to `Syncing` unless already there.
    fn begin(&self) -> Option<CancellationToken> {
        let started = self.status.send_if_modified(|status| {
            if status.state == SyncState::Syncing {
                return false;
            }
            status.state = SyncState::Syncing;
            status.message = None;
            true
        });
        if !started {
            log::debug!("A sync is already running.");
            return None;
        }
        let token = self.shutdown.child_token();
        *self.running.lock().unwrap() = Some(token.clone());
        Some(token)
    }

    async fn run(self: &Arc<Self>, token: CancellationToken) -> SyncResult {
        log::debug!("Syncing with branch {}.", self.branch);
        let result = tokio::select! {
            _ = token.cancelled() => Err(SyncError::Cancelled),
            result = tokio::time::timeout(self.config.timeout(), self.sync_all()) => {
                match result {
                    Ok(result) => result,
                    Err(_) => Err(SyncError::TimedOut),
                }
            }
        };
        self.finish(&result);
        result
    }

    fn finish(&self, result: &SyncResult) {
        *self.running.lock().unwrap() = None;
        let pending = match self.queue.pending_count() {
            Ok(pending) => Some(pending),
            Err(e) => {
                log::error!("Failed to count pending reviews: {e}");
                None
            }
        };
        match result {
            Ok(report) => {
                let description = report.describe();
                log::info!("Sync finished: {description}.");
                for branch in report.branches() {
                    log::warn!("Reviews pushed to branch {branch}, manual merge required.");
                }
                self.status.send_modify(|status| {
                    status.state = SyncState::Idle;
                    status.message = Some(description);
                    status.last_sync = Some(Timestamp::now());
                    status.recent = report.recent.clone();
                    status.branches.extend(report.branches());
                    if let Some(pending) = pending {
                        status.pending = pending;
                    }
                });
            }
            Err(e) => {
                log::error!("Sync failed: {e}");
                self.status.send_modify(|status| {
                    status.state = SyncState::Error;
                    status.message = Some(e.to_string());
                    if let Some(pending) = pending {
                        status.pending = pending;
                    }
                });
            }
        }
    }

    async fn sync_all(self: &Arc<Self>) -> SyncResult {
        if !self.remote.is_reachable().await {
            return Err(SyncError::RemoteUnavailable(
                "remote is not reachable".to_string(),
            ));
        }
        let head = self
            .remote
            .head(&self.branch)
            .await
            .map_err(SyncError::remote)?;
        let mut decks: BTreeSet<DeckName> = lock(&self.store).list_decks().into_iter().collect();
        if let Some(head) = &head {
            let files = self
                .remote
                .list_files(head, "")
                .await
                .map_err(SyncError::remote)?;
            decks.extend(deck_names(&files));
        }

        let mut tasks = JoinSet::new();
        for deck in decks {
            let engine = Arc::clone(self);
            tasks.spawn(async move { engine.sync_deck(deck).await });
        }
        let mut outcomes = Vec::new();
        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(e)) => {
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    failure.get_or_insert(SyncError::Local(format!("sync task failed: {e}")));
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }
        outcomes.sort_by(|a, b| a.deck.cmp(&b.deck));

        let recent = self.recent_commits().await?;
        Ok(SyncReport {
            decks: outcomes,
            recent,
        })
    }

    /// Pull, then push, one deck. Holds the deck's lock throughout, so the
    /// two never interleave with another sync of the same deck.
    async fn sync_deck(self: Arc<Self>, deck: DeckName) -> Result<DeckOutcome, SyncError> {
        let deck_lock = self.deck_lock(&deck);
        let _guard = deck_lock.lock().await;
        let pulled = self.pull_deck(&deck).await?;
        let pushed = self.push_deck(&deck).await?;
        Ok(DeckOutcome {
            deck,
            pulled: pulled.changed,
            conflicts: pulled.conflicts,
            pushed: pushed.pushed,
            branch: pushed.branch,
        })
    }

    fn deck_lock(&self, deck: &DeckName) -> Arc<AsyncMutex<()>> {
        let mut locks = self.deck_locks.lock().unwrap();
        Arc::clone(locks.entry(deck.clone()).or_default())
    }

    /// The newest commits on the replicated branch.
    pub async fn recent_commits(&self) -> Result<Vec<CommitSummary>, SyncError> {
        let commits = self
            .remote
            .list_commits(&self.branch)
            .await
            .map_err(SyncError::remote)?;
        Ok(commits
            .into_iter()
            .take(self.config.recent_commits)
            .map(CommitSummary::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::fsrs::Rating;
    use crate::remote::STATE_FILE;
    use crate::remote::deck_file;
    use crate::sync::fixture::Fixture;
    use crate::types::card_state::StateMap;
    use crate::types::card_state::parse_states;

    #[tokio::test]
    async fn test_good_review_is_pushed_with_message() -> Fallible<()> {
        let fx = Fixture::new()?;
        let hola = CardId::forward("hola");
        let first = fx.rate(&hola, Rating::Good, fx.now)?;
        let later = fx.now.plus_days(3);
        let second = fx.rate(&hola, Rating::Good, later)?;
        assert_eq!(second.reps, first.reps + 1);

        let report = fx.sync().await?;
        assert_eq!(report.pushed(), 2);
        assert_eq!(fx.queue().pending_count()?, 0);

        let commits = fx.remote.list_commits("main").await?;
        assert_eq!(
            commits[0].message,
            format!("review: hola (Good) — next due {}", second.due.utc_date())
        );
        assert_eq!(
            commits[1].message,
            format!("review: hola (Good) — next due {}", first.due.utc_date())
        );

        let remote_states = fx
            .remote
            .file("main", &deck_file(&fx.deck, STATE_FILE))
            .map(|content| parse_states(&content))
            .transpose()?
            .unwrap_or_default();
        assert_eq!(remote_states.get(&hola), Some(&second));

        let status = fx.engine.status().borrow().clone();
        assert_eq!(status.state, SyncState::Idle);
        assert_eq!(status.pending, 0);
        assert_eq!(status.recent.len(), 2);
        assert_eq!(status.recent[0].reviews[0].card, hola);
        Ok(())
    }

    #[tokio::test]
    async fn test_offline_sync_fails_and_keeps_queue() -> Fallible<()> {
        let fx = Fixture::new()?;
        fx.rate(&CardId::forward("hola"), Rating::Good, fx.now)?;
        fx.remote.set_offline(true);

        let result = fx.engine.sync().await;
        assert!(matches!(result, Some(Err(SyncError::RemoteUnavailable(_)))));
        assert_eq!(fx.queue().pending_count()?, 1);
        let status = fx.engine.status().borrow().clone();
        assert_eq!(status.state, SyncState::Error);
        assert_eq!(status.pending, 1);
        assert!(status.message.is_some());

        // Ratings keep working offline.
        fx.rate(&CardId::forward("gato"), Rating::Easy, fx.now)?;
        assert_eq!(fx.queue().pending_count()?, 2);

        fx.remote.set_offline(false);
        let report = fx.sync().await?;
        assert_eq!(report.pushed(), 2);
        assert_eq!(fx.engine.status().borrow().state, SyncState::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn test_only_one_sync_runs_at_a_time() -> Fallible<()> {
        let fx = Fixture::new()?;
        fx.rate(&CardId::forward("hola"), Rating::Good, fx.now)?;
        fx.remote.set_delay(Some(Duration::from_millis(50)));
        let first = fx.engine.trigger();
        assert!(first.is_some());
        assert!(fx.engine.trigger().is_none());
        assert!(fx.engine.sync().await.is_none());
        assert_eq!(fx.engine.status().borrow().state, SyncState::Syncing);
        if let Some(handle) = first {
            let report = handle.await.map_err(|e| ErrorReport::new(e.to_string()))??;
            assert_eq!(report.pushed(), 1);
        }
        assert!(fx.engine.trigger().is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_timeout() -> Fallible<()> {
        let fx = Fixture::with_config("[sync]\ntimeout_secs = 1\n")?;
        fx.rate(&CardId::forward("hola"), Rating::Good, fx.now)?;
        fx.remote.set_delay(Some(Duration::from_secs(5)));
        let result = fx.engine.sync().await;
        assert_eq!(result, Some(Err(SyncError::TimedOut)));
        assert_eq!(fx.queue().pending_count()?, 1);
        assert_eq!(fx.engine.status().borrow().state, SyncState::Error);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel() -> Fallible<()> {
        let fx = Fixture::new()?;
        fx.rate(&CardId::forward("hola"), Rating::Good, fx.now)?;
        fx.remote.set_delay(Some(Duration::from_secs(5)));
        let Some(handle) = fx.engine.trigger() else {
            return crate::error::fail("sync did not start");
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        fx.engine.cancel();
        let result = handle.await.map_err(|e| ErrorReport::new(e.to_string()))?;
        assert_eq!(result, Err(SyncError::Cancelled));
        assert_eq!(fx.queue().pending_count()?, 1);
        assert_eq!(fx.engine.status().borrow().state, SyncState::Error);
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_batch_keeps_confirmed_commits() -> Fallible<()> {
        let fx = Fixture::new()?;
        fx.rate(&CardId::forward("hola"), Rating::Good, fx.now)?;
        fx.rate(&CardId::forward("gato"), Rating::Good, fx.now)?;
        fx.rate(&CardId::forward("perro"), Rating::Good, fx.now)?;
        fx.remote.go_offline_after(2);

        let result = fx.engine.sync().await;
        assert!(matches!(result, Some(Err(SyncError::RemoteUnavailable(_)))));
        assert_eq!(fx.queue().pending_count()?, 1);
        let left = fx.queue().peek_batch(10)?;
        assert_eq!(left[0].card, CardId::forward("perro"));

        fx.remote.set_offline(false);
        let report = fx.sync().await?;
        assert_eq!(report.pushed(), 1);
        assert_eq!(fx.queue().pending_count()?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_batch_size_limits_one_sync() -> Fallible<()> {
        let fx = Fixture::with_config("[sync]\nbatch_size = 2\n")?;
        for card in ["hola", "gato", "perro"] {
            fx.rate(&CardId::forward(card), Rating::Good, fx.now)?;
        }
        assert_eq!(fx.sync().await?.pushed(), 2);
        assert_eq!(fx.queue().pending_count()?, 1);
        assert_eq!(fx.sync().await?.pushed(), 1);
        assert_eq!(fx.queue().pending_count()?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_decks_sync_in_parallel_without_false_divergence() -> Fallible<()> {
        let fx = Fixture::new()?;
        fx.sync().await?;
        let french: DeckName = "french".parse()?;
        fx.rate(&CardId::forward("hola"), Rating::Good, fx.now)?;
        fx.rate_in(&french, &CardId::forward("hola"), Rating::Hard, fx.now)?;
        fx.rate(&CardId::forward("gato"), Rating::Good, fx.now)?;

        let report = fx.sync().await?;
        assert_eq!(report.pushed(), 3);
        assert!(report.branches().is_empty());
        assert_eq!(fx.queue().pending_count()?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_remote_review_of_pending_card_goes_to_branch() -> Fallible<()> {
        let fx = Fixture::new()?;
        fx.seed_remote(&StateMap::new())?;
        fx.sync().await?;
        let hola = CardId::forward("hola");
        let local = fx.rate(&hola, Rating::Good, fx.now)?;

        // Another device reviews the same card first.
        let mut states = StateMap::new();
        let other = crate::schedule::schedule(None, Rating::Easy, fx.now);
        states.insert(hola.clone(), other.clone());
        fx.remote_states(&states)?;

        let report = fx.sync().await?;
        let outcome = report
            .deck(&fx.deck)
            .ok_or_else(|| ErrorReport::new("no outcome for the deck"))?;
        assert_eq!(outcome.conflicts, vec![hola.clone()]);
        assert_eq!(outcome.pushed, 0);
        let Some(branch) = outcome.branch.clone() else {
            return crate::error::fail("expected a branch");
        };
        assert_eq!(fx.queue().pending_count()?, 1);
        assert_eq!(fx.local_state(&hola), Some(local.clone()));

        // Main still has the other device's review.
        let remote_states = fx
            .remote
            .file("main", &deck_file(&fx.deck, STATE_FILE))
            .map(|content| parse_states(&content))
            .transpose()?
            .unwrap_or_default();
        assert_eq!(remote_states.get(&hola), Some(&other));

        let branch_states = fx
            .remote
            .file(&branch, &deck_file(&fx.deck, STATE_FILE))
            .map(|content| parse_states(&content))
            .transpose()?
            .unwrap_or_default();
        assert_eq!(branch_states.get(&hola), Some(&local));

        // Syncing again does not overwrite main either.
        let report = fx.sync().await?;
        assert_eq!(report.pushed(), 0);
        assert_eq!(fx.queue().pending_count()?, 1);
        assert_eq!(
            fx.remote
                .file("main", &deck_file(&fx.deck, STATE_FILE))
                .map(|content| parse_states(&content))
                .transpose()?
                .unwrap_or_default()
                .get(&hola),
            Some(&other)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_same_deck_syncs_one_at_a_time() -> Fallible<()> {
        let fx = Fixture::new()?;
        fx.seed_remote(&StateMap::new())?;
        fx.rate(&CardId::forward("hola"), Rating::Good, fx.now)?;
        fx.remote.set_delay(Some(Duration::from_millis(20)));

        let (first, second) = tokio::join!(
            Arc::clone(&fx.engine).sync_deck(fx.deck.clone()),
            Arc::clone(&fx.engine).sync_deck(fx.deck.clone()),
        );
        let (first, second) = (first?, second?);
        assert_eq!(first.pushed + second.pushed, 1);
        assert_eq!(first.branch, None);
        assert_eq!(second.branch, None);
        assert_eq!(fx.remote.max_in_flight(), 1);
        assert_eq!(fx.remote.pushes(), 1);
        assert_eq!(fx.queue().pending_count()?, 0);

        // The seed commit and the one review.
        let commits = fx.remote.list_commits("main").await?;
        assert_eq!(commits.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_resync_clears_queue() -> Fallible<()> {
        let fx = Fixture::new()?;
        fx.rate(&CardId::forward("hola"), Rating::Good, fx.now)?;
        fx.engine.resync()?;
        assert_eq!(fx.queue().pending_count()?, 0);
        assert_eq!(fx.engine.status().borrow().pending, 0);
        Ok(())
    }

    #[test]
    fn test_describe_branch_outcome() -> Fallible<()> {
        let outcome = DeckOutcome {
            deck: "spanish".parse()?,
            pulled: true,
            conflicts: Vec::new(),
            pushed: 0,
            branch: Some("reviews/spanish-20250601T090000-0a1b2c3d".to_string()),
        };
        assert_eq!(
            outcome.describe(),
            "spanish: pushed to branch `reviews/spanish-20250601T090000-0a1b2c3d`, manual merge required"
        );
        Ok(())
    }

    #[test]
    fn test_queue_corruption_message() {
        let e = SyncError::from(QueueError::Corrupt("mutation 3: bad state".to_string()));
        assert!(e.to_string().starts_with("sync state lost, please resync"));
    }
}
