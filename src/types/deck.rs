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

use std::fmt::Display;
use std::fmt::Formatter;
use std::str::FromStr;

use rusqlite::ToSql;
use rusqlite::types::FromSql;
use rusqlite::types::FromSqlError;
use rusqlite::types::FromSqlResult;
use rusqlite::types::ToSqlOutput;
use rusqlite::types::ValueRef;
use serde::Serialize;
use serde::Serializer;

use crate::error::ErrorReport;
use crate::error::fail;
use crate::types::card::Card;
use crate::types::card::CardView;
use crate::types::card_id::CardId;
use crate::types::card_state::CardState;
use crate::types::card_state::StateMap;

/// A deck's name doubles as its directory name, locally and in the remote
/// repository.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct DeckName(String);

impl DeckName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DeckName {
    type Err = ErrorReport;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.starts_with('.') || s.contains(['/', '\\']) {
            return fail(format!("invalid deck name: `{s}`"));
        }
        Ok(Self(s.to_string()))
    }
}

impl Display for DeckName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for DeckName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl ToSql for DeckName {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.as_str()))
    }
}

impl FromSql for DeckName {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let string: String = FromSql::column_result(value)?;
        string
            .parse()
            .map_err(|e: ErrorReport| FromSqlError::Other(Box::new(e)))
    }
}

#[derive(Clone, Debug)]
pub struct Deck {
    name: DeckName,
    /// Cards in declaration order.
    cards: Vec<Card>,
    states: StateMap,
}

impl Deck {
    /// Build a deck, dropping any state that does not belong to one of the
    /// deck's card identities.
    pub fn new(name: DeckName, cards: Vec<Card>, states: StateMap) -> Self {
        let mut deck = Self {
            name,
            cards,
            states,
        };
        deck.prune_orphans();
        deck
    }

    pub fn name(&self) -> &DeckName {
        &self.name
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn states(&self) -> &StateMap {
        &self.states
    }

    /// Every card identity, in declaration order, reverse identities right
    /// after their forward side.
    pub fn identities(&self) -> Vec<CardId> {
        self.cards.iter().flat_map(|card| card.identities()).collect()
    }

    pub fn contains(&self, id: &CardId) -> bool {
        self.cards
            .iter()
            .any(|card| card.id() == id.card() && (!id.is_reverse() || card.content().reversible))
    }

    pub fn state(&self, id: &CardId) -> Option<&CardState> {
        self.states.get(id)
    }

    pub fn view(&self, id: &CardId) -> Option<CardView> {
        if !self.contains(id) {
            return None;
        }
        self.cards
            .iter()
            .find(|card| card.id() == id.card())
            .map(|card| card.view(id.is_reverse()))
    }

    pub(crate) fn set_state(&mut self, id: CardId, state: CardState) {
        self.states.insert(id, state);
    }

    pub(crate) fn replace(&mut self, cards: Vec<Card>, states: StateMap) {
        self.cards = cards;
        self.states = states;
        self.prune_orphans();
    }

    fn prune_orphans(&mut self) {
        let orphans: Vec<CardId> = self
            .states
            .keys()
            .filter(|id| !self.contains(id))
            .cloned()
            .collect();
        for id in orphans {
            log::debug!("Pruning orphan state for {id} in deck {}", self.name);
            self.states.remove(&id);
        }
    }
}
