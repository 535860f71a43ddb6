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

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::error::Fallible;
use crate::error::fail;
use crate::types::card_id::CardId;
use crate::types::card_id::validate_card_id;
use crate::types::timestamp::Timestamp;

#[derive(Clone, Debug, PartialEq)]
pub struct Card {
    id: String,
    content: CardContent,
}

/// The fields stored for each card in `cards.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardContent {
    pub source: String,
    pub translation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created: Timestamp,
    #[serde(default)]
    pub reversible: bool,
}

/// What to show for one card identity: the reverse side swaps the prompt and
/// the answer.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardView {
    pub id: CardId,
    pub front: String,
    pub back: String,
    pub example: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
}

impl Card {
    pub fn new(id: impl Into<String>, content: CardContent) -> Fallible<Self> {
        let id = id.into();
        validate_card_id(&id)?;
        Ok(Self { id, content })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content(&self) -> &CardContent {
        &self.content
    }

    /// The identities this card schedules: itself, and its reverse if the
    /// card is reversible.
    pub fn identities(&self) -> Vec<CardId> {
        let mut ids = vec![CardId::forward(&self.id)];
        if self.content.reversible {
            ids.push(CardId::reverse(&self.id));
        }
        ids
    }

    pub fn view(&self, reverse: bool) -> CardView {
        let (front, back) = if reverse {
            (&self.content.translation, &self.content.source)
        } else {
            (&self.content.source, &self.content.translation)
        };
        CardView {
            id: if reverse {
                CardId::reverse(&self.id)
            } else {
                CardId::forward(&self.id)
            },
            front: front.clone(),
            back: back.clone(),
            example: self.content.example.clone(),
            notes: self.content.notes.clone(),
            tags: self.content.tags.clone(),
        }
    }
}

/// Parse the contents of a `cards.json` file. Cards keep the order in which
/// they are declared in the file.
pub fn parse_cards(json: &str) -> Fallible<Vec<Card>> {
    let map: Map<String, Value> = serde_json::from_str(json)?;
    let mut cards = Vec::with_capacity(map.len());
    for (id, value) in map {
        let content: CardContent = match serde_json::from_value(value) {
            Ok(content) => content,
            Err(e) => return fail(format!("invalid card `{id}`: {e}")),
        };
        cards.push(Card::new(id, content)?);
    }
    Ok(cards)
}

pub fn render_cards(cards: &[Card]) -> Fallible<String> {
    let mut map = Map::new();
    for card in cards {
        map.insert(card.id.clone(), serde_json::to_value(&card.content)?);
    }
    Ok(serde_json::to_string_pretty(&map)?)
}
