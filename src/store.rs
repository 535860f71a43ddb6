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

//! The local decks: one directory per deck, holding `cards.json` and
//! `state.json`.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs::create_dir_all;
use std::fs::read_to_string;
use std::fs::rename;
use std::fs::write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Instant;

use tokio::sync::broadcast;
use walkdir::WalkDir;

use crate::error::Fallible;
use crate::error::fail;
use crate::queue::QueueError;
use crate::queue::WriteQueue;
use crate::remote::CARDS_FILE;
use crate::remote::STATE_FILE;
use crate::schedule::Review;
use crate::sync::snapshot::RemoteDeck;
use crate::types::card::parse_cards;
use crate::types::card::render_cards;
use crate::types::card_id::CardId;
use crate::types::card_state::StateMap;
use crate::types::card_state::parse_states;
use crate::types::card_state::render_states;
use crate::types::deck::Deck;
use crate::types::deck::DeckName;
use crate::types::mutation::MutationId;

const EVENT_CAPACITY: usize = 64;

/// A change to the local decks, for observers that render them.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreEvent {
    /// A card identity was rated on this device.
    CardReviewed { deck: DeckName, card: CardId },
    /// A deck's cards and states were replaced from the remote.
    DeckUpdated { deck: DeckName },
}

pub type SharedStore = Arc<Mutex<DeckStore>>;

pub fn lock(store: &SharedStore) -> MutexGuard<'_, DeckStore> {
    store.lock().unwrap()
}

pub struct DeckStore {
    directory: PathBuf,
    decks: BTreeMap<DeckName, Deck>,
    queue: WriteQueue,
    events: broadcast::Sender<StoreEvent>,
}

impl DeckStore {
    /// Load every deck under `directory`, then replay the mutations still in
    /// the write queue over them.
    pub fn open(directory: &Path, queue: WriteQueue) -> Fallible<Self> {
        create_dir_all(directory)?;
        let start = Instant::now();
        let mut decks = BTreeMap::new();
        for entry in WalkDir::new(directory).min_depth(1).max_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            let name: DeckName = match name.parse() {
                Ok(name) => name,
                Err(_) => {
                    log::debug!("Skipping {}.", entry.path().display());
                    continue;
                }
            };
            if let Some(deck) = load_deck(entry.path(), name)? {
                decks.insert(deck.name().clone(), deck);
            }
        }
        let duration = start.elapsed().as_millis();
        log::debug!("Loaded {} decks in {duration}ms.", decks.len());

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut store = Self {
            directory: directory.to_path_buf(),
            decks,
            queue,
            events,
        };
        store.replay_pending()?;
        Ok(store)
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    pub fn list_decks(&self) -> Vec<DeckName> {
        self.decks.keys().cloned().collect()
    }

    pub fn get_deck(&self, name: &DeckName) -> Option<&Deck> {
        self.decks.get(name)
    }

    pub fn decks(&self) -> impl Iterator<Item = &Deck> {
        self.decks.values()
    }

    pub fn queue(&self) -> &WriteQueue {
        &self.queue
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Record a review. The mutation is queued before anything else changes,
    /// so a crash can lose the file write but never the review.
    pub fn apply_local_mutation(&mut self, review: Review) -> Fallible<MutationId> {
        let Some(deck) = self.decks.get(review.deck()) else {
            return fail(format!("no such deck: {}", review.deck()));
        };
        if !deck.contains(review.card()) {
            return fail(format!("no card {} in deck {}", review.card(), review.deck()));
        }
        let mutation = review.into_mutation();
        let id = self.queue.enqueue(&mutation)?;

        let deck_name = mutation.deck.clone();
        let card = mutation.card.clone();
        if let Some(deck) = self.decks.get_mut(&deck_name) {
            deck.set_state(mutation.card, mutation.state);
            write_states(&self.directory, deck)?;
        }
        let _ = self.events.send(StoreEvent::CardReviewed {
            deck: deck_name,
            card,
        });
        Ok(id)
    }

    /// Adopt a deck as read from the remote. Card identities in `pending`
    /// keep their local state; every other identity takes the remote state,
    /// or loses its state if the remote has none. A deck missing remotely is
    /// left alone.
    pub fn apply_remote_snapshot(
        &mut self,
        name: &DeckName,
        remote: RemoteDeck,
        pending: &BTreeSet<CardId>,
    ) -> Fallible<()> {
        if remote.cards_digest.is_none() {
            return Ok(());
        }
        let mut states: StateMap = remote
            .states
            .into_iter()
            .filter(|(id, _)| !pending.contains(id))
            .collect();
        if let Some(local) = self.decks.get(name) {
            for id in pending {
                if let Some(state) = local.state(id) {
                    states.insert(id.clone(), state.clone());
                }
            }
        }

        match self.decks.get_mut(name) {
            Some(deck) => deck.replace(remote.cards, states),
            None => {
                log::info!("Creating deck {name} from the remote.");
                let deck = Deck::new(name.clone(), remote.cards, states);
                self.decks.insert(name.clone(), deck);
            }
        }
        if let Some(deck) = self.decks.get(name) {
            write_cards(&self.directory, deck)?;
            write_states(&self.directory, deck)?;
        }
        let _ = self.events.send(StoreEvent::DeckUpdated { deck: name.clone() });
        Ok(())
    }

    /// Reapply queued mutations in order. A crash between queueing a review
    /// and writing `state.json` is recovered here.
    fn replay_pending(&mut self) -> Fallible<()> {
        let pending = match self.queue.peek_batch(usize::MAX) {
            Ok(pending) => pending,
            // Opening must still work, or the queue could never be reset.
            Err(QueueError::Corrupt(detail)) => {
                log::error!("Not replaying queued reviews: {detail}");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let mut touched = BTreeSet::new();
        for mutation in pending {
            let Some(deck) = self.decks.get_mut(&mutation.deck) else {
                log::warn!(
                    "Queued review of {} in unknown deck {}.",
                    mutation.card,
                    mutation.deck
                );
                continue;
            };
            if !deck.contains(&mutation.card) {
                continue;
            }
            if deck.state(&mutation.card) != Some(&mutation.state) {
                deck.set_state(mutation.card, mutation.state);
                touched.insert(mutation.deck);
            }
        }
        for name in touched {
            if let Some(deck) = self.decks.get(&name) {
                log::info!("Recovered unsaved reviews in deck {name}.");
                write_states(&self.directory, deck)?;
            }
        }
        Ok(())
    }
}

fn load_deck(path: &Path, name: DeckName) -> Fallible<Option<Deck>> {
    let cards_path = path.join(CARDS_FILE);
    if !cards_path.exists() {
        log::debug!("No {CARDS_FILE} in {}, skipping.", path.display());
        return Ok(None);
    }
    let cards = match parse_cards(&read_to_string(&cards_path)?) {
        Ok(cards) => cards,
        Err(e) => return fail(format!("{}: {}", cards_path.display(), e.message())),
    };
    let state_path = path.join(STATE_FILE);
    let states = if state_path.exists() {
        match parse_states(&read_to_string(&state_path)?) {
            Ok(states) => states,
            Err(e) => return fail(format!("{}: {}", state_path.display(), e.message())),
        }
    } else {
        StateMap::new()
    };
    Ok(Some(Deck::new(name, cards, states)))
}

fn write_cards(directory: &Path, deck: &Deck) -> Fallible<()> {
    let content = render_cards(deck.cards())?;
    write_deck_file(directory, deck, CARDS_FILE, &content)
}

fn write_states(directory: &Path, deck: &Deck) -> Fallible<()> {
    let content = render_states(deck.states())?;
    write_deck_file(directory, deck, STATE_FILE, &content)
}

fn write_deck_file(directory: &Path, deck: &Deck, file: &str, content: &str) -> Fallible<()> {
    let deck_dir = directory.join(deck.name().as_str());
    create_dir_all(&deck_dir)?;
    let path = deck_dir.join(file);
    let tmp = deck_dir.join(format!(".{file}.tmp"));
    write(&tmp, content)?;
    rename(&tmp, &path)?;
    Ok(())
}
