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

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Fallible;
use crate::fsrs::Difficulty;
use crate::fsrs::Stability;
use crate::types::card_id::CardId;
use crate::types::timestamp::Timestamp;

/// Scheduling state of a card identity. A card identity without a state is
/// new.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardState {
    /// When the card is next due.
    pub due: Timestamp,
    /// The card's stability (an FSRS parameter).
    pub stability: Stability,
    /// The card's difficulty (an FSRS parameter).
    pub difficulty: Difficulty,
    /// The number of successful reviews.
    pub reps: u32,
    /// When the card was last reviewed.
    #[serde(default)]
    pub last_review: Option<Timestamp>,
    #[serde(default)]
    pub suspended: bool,
}

impl CardState {
    pub fn is_due(&self, now: Timestamp) -> bool {
        !self.suspended && self.due <= now
    }
}

/// The contents of a `state.json` file.
pub type StateMap = BTreeMap<CardId, CardState>;

pub fn parse_states(json: &str) -> Fallible<StateMap> {
    if json.trim().is_empty() {
        return Ok(StateMap::new());
    }
    Ok(serde_json::from_str(json)?)
}

pub fn render_states(states: &StateMap) -> Fallible<String> {
    Ok(serde_json::to_string_pretty(states)?)
}
