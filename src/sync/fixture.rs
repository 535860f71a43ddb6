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

//! A collection wired to an in-memory remote, for sync tests.

use std::sync::Arc;

use tempfile::TempDir;
use tempfile::tempdir;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::db::Database;
use crate::error::Fallible;
use crate::error::fail;
use crate::fsrs::Rating;
use crate::helper::CARDS_JSON;
use crate::helper::write_deck;
use crate::queue::WriteQueue;
use crate::remote::CARDS_FILE;
use crate::remote::FileMap;
use crate::remote::STATE_FILE;
use crate::remote::deck_file;
use crate::remote::memory::MemoryRemote;
use crate::schedule::review;
use crate::store::DeckStore;
use crate::store::SharedStore;
use crate::store::StoreEvent;
use crate::store::lock;
use crate::sync::SyncEngine;
use crate::sync::SyncReport;
use crate::sync::snapshot::RemoteDeck;
use crate::sync::snapshot::digest;
use crate::types::card::parse_cards;
use crate::types::card::render_cards;
use crate::types::card_id::CardId;
use crate::types::card_state::CardState;
use crate::types::card_state::StateMap;
use crate::types::card_state::render_states;
use crate::types::deck::DeckName;
use crate::types::timestamp::Timestamp;

pub struct Fixture {
    _dir: TempDir,
    pub now: Timestamp,
    /// The `spanish` deck. A `french` deck with the same cards exists too.
    pub deck: DeckName,
    pub db: Database,
    pub store: SharedStore,
    pub remote: Arc<MemoryRemote>,
    pub engine: Arc<SyncEngine<MemoryRemote>>,
}

impl Fixture {
    pub fn new() -> Fallible<Self> {
        Self::with_config("")
    }

    pub fn with_config(config: &str) -> Fallible<Self> {
        let config = Config::parse(config)?;
        let dir = tempdir()?;
        let decks = dir.path().join("decks");
        write_deck(&decks, "spanish", CARDS_JSON, None)?;
        write_deck(&decks, "french", CARDS_JSON, None)?;
        let db = Database::in_memory()?;
        let store = DeckStore::open(&decks, WriteQueue::new(db.clone()))?.into_shared();
        let remote = Arc::new(MemoryRemote::new());
        let engine = SyncEngine::new(
            Arc::clone(&remote),
            Arc::clone(&store),
            db.clone(),
            config.branch,
            config.sync,
        )?;
        Ok(Self {
            _dir: dir,
            now: Timestamp::parse("2025-06-01T09:00:00Z")?,
            deck: "spanish".parse()?,
            db,
            store,
            remote,
            engine,
        })
    }

    pub fn queue(&self) -> WriteQueue {
        WriteQueue::new(self.db.clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        lock(&self.store).subscribe()
    }

    /// Rate a card of the `spanish` deck, returning its new state.
    pub fn rate(&self, card: &CardId, rating: Rating, now: Timestamp) -> Fallible<CardState> {
        self.rate_in(&self.deck, card, rating, now)
    }

    pub fn rate_in(
        &self,
        deck: &DeckName,
        card: &CardId,
        rating: Rating,
        now: Timestamp,
    ) -> Fallible<CardState> {
        let mut store = lock(&self.store);
        let current = store.get_deck(deck).and_then(|d| d.state(card)).cloned();
        let r = review(deck.clone(), card.clone(), current.as_ref(), rating, now);
        let state = r.state().clone();
        store.apply_local_mutation(r)?;
        Ok(state)
    }

    pub fn local_state(&self, card: &CardId) -> Option<CardState> {
        lock(&self.store)
            .get_deck(&self.deck)
            .and_then(|deck| deck.state(card))
            .cloned()
    }

    pub fn local_states(&self) -> StateMap {
        lock(&self.store)
            .get_deck(&self.deck)
            .map(|deck| deck.states().clone())
            .unwrap_or_default()
    }

    pub async fn sync(&self) -> Fallible<SyncReport> {
        match self.engine.sync().await {
            Some(result) => Ok(result?),
            None => fail("a sync is already running"),
        }
    }

    /// Commit the `spanish` deck to the remote, as another device would.
    pub fn seed_remote(&self, states: &StateMap) -> Fallible<()> {
        let mut files = FileMap::new();
        files.insert(deck_file(&self.deck, CARDS_FILE), CARDS_JSON.to_string());
        files.insert(deck_file(&self.deck, STATE_FILE), render_states(states)?);
        self.remote.advance("main", files, "add spanish");
        Ok(())
    }

    /// Replace the remote `spanish/state.json`, as another device would.
    pub fn remote_states(&self, states: &StateMap) -> Fallible<()> {
        let mut files = FileMap::new();
        files.insert(deck_file(&self.deck, STATE_FILE), render_states(states)?);
        self.remote.advance("main", files, "review elsewhere");
        Ok(())
    }

    /// Delete a card from the local `spanish` deck.
    pub fn remove_local_card(&self, id: &str) -> Fallible<()> {
        let mut store = lock(&self.store);
        let Some(deck) = store.get_deck(&self.deck) else {
            return fail("missing deck");
        };
        let cards: Vec<_> = deck
            .cards()
            .iter()
            .filter(|card| card.id() != id)
            .cloned()
            .collect();
        let rendered = render_cards(&cards)?;
        let remote = RemoteDeck {
            cards: parse_cards(&rendered)?,
            states: deck.states().clone(),
            cards_digest: Some(digest(&rendered)),
        };
        store.apply_remote_snapshot(&self.deck, remote, &Default::default())
    }
}
