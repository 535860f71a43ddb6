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

use crate::error::Fallible;
use crate::error::fail;
use crate::remote::CARDS_FILE;
use crate::remote::FileMap;
use crate::remote::STATE_FILE;
use crate::remote::Sha;
use crate::remote::deck_file;
use crate::types::card::Card;
use crate::types::card::parse_cards;
use crate::types::card_state::StateMap;
use crate::types::card_state::parse_states;
use crate::types::deck::DeckName;

/// What this device last saw of a deck in the remote repository.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct RemoteSnapshot {
    /// The branch head the snapshot was taken at. `None` if the branch was
    /// empty.
    pub head: Option<Sha>,
    /// The deck's `state.json` at that head.
    pub states: StateMap,
    /// Digest of the deck's `cards.json` at that head, `None` if the deck did
    /// not exist remotely.
    pub cards_digest: Option<String>,
}

impl RemoteSnapshot {
    pub fn exists_remotely(&self) -> bool {
        self.cards_digest.is_some()
    }
}

/// A deck as read from the remote repository.
#[derive(Clone, Debug)]
pub struct RemoteDeck {
    pub cards: Vec<Card>,
    pub states: StateMap,
    pub cards_digest: Option<String>,
}

impl RemoteDeck {
    /// Parse a deck's files, as returned by listing `<deck>/` at some commit.
    pub fn parse(deck: &DeckName, files: &FileMap) -> Fallible<Self> {
        let cards_path = deck_file(deck, CARDS_FILE);
        let state_path = deck_file(deck, STATE_FILE);
        let (cards, cards_digest) = match files.get(&cards_path) {
            Some(content) => match parse_cards(content) {
                Ok(cards) => (cards, Some(digest(content))),
                Err(e) => return fail(format!("{cards_path}: {}", e.message())),
            },
            None => (Vec::new(), None),
        };
        let states = match files.get(&state_path) {
            Some(content) => match parse_states(content) {
                Ok(states) => states,
                Err(e) => return fail(format!("{state_path}: {}", e.message())),
            },
            None => StateMap::new(),
        };
        Ok(Self {
            cards,
            states,
            cards_digest,
        })
    }
}

pub fn digest(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// The deck names present in a listing of the repository root.
pub fn deck_names(files: &FileMap) -> Vec<DeckName> {
    let mut names: Vec<DeckName> = files
        .keys()
        .filter_map(|path| {
            let (dir, file) = path.split_once('/')?;
            if file != CARDS_FILE {
                return None;
            }
            dir.parse().ok()
        })
        .collect();
    names.dedup();
    names
}
