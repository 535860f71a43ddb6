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

use std::env::current_dir;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::CONFIG_FILE;
use crate::config::Config;
use crate::db::Database;
use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::error::fail;
use crate::fsrs::Rating;
use crate::queue::WriteQueue;
use crate::remote::directory::DirectoryRemote;
use crate::schedule::review;
use crate::session::CardLabel;
use crate::session::Policy;
use crate::session::ReviewSession;
use crate::store::DeckStore;
use crate::store::SharedStore;
use crate::store::StoreEvent;
use crate::store::lock;
use crate::sync::SyncEngine;
use crate::sync::SyncResult;
use crate::sync::SyncStatus;
use crate::types::card::CardView;
use crate::types::card_id::CardId;
use crate::types::card_state::CardState;
use crate::types::deck::DeckName;
use crate::types::timestamp::Timestamp;

pub const DATABASE_FILE: &str = "gitcards.db";
pub const DECKS_DIR: &str = "decks";

/// What a review front end shows.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub deck: DeckName,
    pub remaining: usize,
    pub current: Option<CardView>,
    pub label: Option<CardLabel>,
    pub introduced: usize,
    pub reviewed: usize,
}

/// A collection directory, opened: its decks, its database, and its sync
/// engine if a remote is configured.
pub struct Collection {
    directory: PathBuf,
    config: Config,
    db: Database,
    store: SharedStore,
    engine: Option<Arc<SyncEngine<DirectoryRemote>>>,
    policy: Policy,
    session: Option<ReviewSession>,
}

impl Collection {
    pub fn new(directory: Option<String>) -> Fallible<Self> {
        let directory: PathBuf = match directory {
            Some(dir) => PathBuf::from(dir),
            None => current_dir()?,
        };
        let directory = if directory.exists() {
            directory.canonicalize()?
        } else {
            return fail("directory does not exist.");
        };
        Self::open(&directory)
    }

    pub fn open(directory: &Path) -> Fallible<Self> {
        let config = Config::load(directory)?;

        let db_path: PathBuf = directory.join(DATABASE_FILE);
        let db_path: &str = db_path
            .to_str()
            .ok_or_else(|| ErrorReport::new("invalid path"))?;
        let db: Database = Database::new(db_path)?;

        let store = DeckStore::open(&directory.join(DECKS_DIR), WriteQueue::new(db.clone()))?
            .into_shared();

        let engine = match &config.remote {
            Some(location) => {
                log::debug!("Remote: {}", location.path().display());
                let remote = Arc::new(DirectoryRemote::new(location.path()));
                Some(SyncEngine::new(
                    remote,
                    Arc::clone(&store),
                    db.clone(),
                    config.branch.clone(),
                    config.sync.clone(),
                )?)
            }
            None => None,
        };

        Ok(Self {
            directory: directory.to_path_buf(),
            policy: config.review,
            config,
            db,
            store,
            engine,
            session: None,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn engine(&self) -> Option<&Arc<SyncEngine<DirectoryRemote>>> {
        self.engine.as_ref()
    }

    pub fn decks(&self) -> Vec<DeckName> {
        lock(&self.store).list_decks()
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Takes effect from the next session.
    pub fn set_policy(&mut self, policy: Policy) {
        self.policy = policy;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        lock(&self.store).subscribe()
    }

    pub fn pending_count(&self) -> Fallible<usize> {
        Ok(WriteQueue::new(self.db.clone()).pending_count()?)
    }

    /// Start reviewing a deck. Replaces any session in progress.
    pub fn start_session(&mut self, deck: &DeckName, now: Timestamp) -> Fallible<()> {
        let introduced = self.db.introduced_count(deck, now.local_date())?;
        let store = lock(&self.store);
        let Some(deck) = store.get_deck(deck) else {
            return fail(format!("no such deck: {deck}"));
        };
        let session = ReviewSession::start(deck, &self.policy, introduced, now);
        log::debug!(
            "Started session on {} with {} cards.",
            session.deck(),
            session.remaining()
        );
        drop(store);
        self.session = Some(session);
        Ok(())
    }

    pub fn session_state(&self) -> Option<SessionState> {
        let session = self.session.as_ref()?;
        let store = lock(&self.store);
        let deck = store.get_deck(session.deck());
        let current = session.current();
        Some(SessionState {
            deck: session.deck().clone(),
            remaining: session.remaining(),
            current: current.and_then(|id| deck.and_then(|deck| deck.view(id))),
            label: current.map(|id| session.label(id)),
            introduced: session.introduced(),
            reviewed: session.reviewed(),
        })
    }

    /// Rate the current card of the session. Never waits on the network.
    pub fn rate(&mut self, card: &CardId, rating: Rating, now: Timestamp) -> Fallible<CardState> {
        let Some(session) = self.session.as_mut() else {
            return fail("no session in progress.");
        };
        if session.current() != Some(card) {
            return fail(format!("{card} is not the current card."));
        }
        let state = {
            let mut store = lock(&self.store);
            let current = store
                .get_deck(session.deck())
                .and_then(|deck| deck.state(card))
                .cloned();
            let r = review(
                session.deck().clone(),
                card.clone(),
                current.as_ref(),
                rating,
                now,
            );
            let state = r.state().clone();
            store.apply_local_mutation(r)?;
            state
        };
        if session.advance(card, rating)? {
            self.db.record_introduced(session.deck(), session.day())?;
        }
        if let Some(engine) = &self.engine {
            engine.refresh_pending();
        }
        Ok(state)
    }

    pub fn sync_status(&self) -> Option<watch::Receiver<SyncStatus>> {
        self.engine.as_ref().map(|engine| engine.status())
    }

    /// Start a background sync. `Ok(None)` if one is already running.
    pub fn trigger_sync(&self) -> Fallible<Option<JoinHandle<SyncResult>>> {
        match &self.engine {
            Some(engine) => Ok(engine.trigger()),
            None => fail(format!(
                "no remote configured in {}",
                self.directory.join(CONFIG_FILE).display()
            )),
        }
    }
}
