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

use crate::collection::Collection;
use crate::error::Fallible;
use crate::store::lock;
use crate::types::deck::Deck;
use crate::types::timestamp::Timestamp;

#[derive(Debug, PartialEq)]
struct DeckCounts {
    cards: usize,
    identities: usize,
    due: usize,
    new: usize,
}

fn count(deck: &Deck, now: Timestamp) -> DeckCounts {
    let identities = deck.identities();
    let due = identities
        .iter()
        .filter(|id| deck.state(id).is_some_and(|state| state.is_due(now)))
        .count();
    let new = identities
        .iter()
        .filter(|id| deck.state(id).is_none())
        .count();
    DeckCounts {
        cards: deck.cards().len(),
        identities: identities.len(),
        due,
        new,
    }
}

/// Load a collection and everything in it, replaying the write queue.
pub fn check_collection(directory: Option<String>) -> Fallible<()> {
    let collection = Collection::new(directory)?;
    let now = Timestamp::now();
    let store = lock(collection.store());
    for deck in store.decks() {
        let counts = count(deck, now);
        println!(
            "{}: {} cards, {} identities, {} due, {} new",
            deck.name(),
            counts.cards,
            counts.identities,
            counts.due,
            counts.new
        );
    }
    drop(store);
    println!("{} reviews pending", collection.pending_count()?);
    println!("ok");
    Ok(())
}
