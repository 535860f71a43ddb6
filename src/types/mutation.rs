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

use crate::fsrs::Rating;
use crate::types::card_id::CardId;
use crate::types::card_state::CardState;
use crate::types::deck::DeckName;
use crate::types::timestamp::Timestamp;

pub type MutationId = i64;

/// A review outcome waiting to be replicated. Each one carries the full
/// resulting state, so mutations of one card identity must be replicated in
/// the order they were produced.
#[derive(Clone, Debug, PartialEq)]
pub struct Mutation {
    pub id: MutationId,
    pub deck: DeckName,
    pub card: CardId,
    pub rating: Rating,
    pub state: CardState,
    pub reviewed_at: Timestamp,
}

/// A mutation before the write queue has assigned it an id.
#[derive(Clone, Debug, PartialEq)]
pub struct NewMutation {
    pub deck: DeckName,
    pub card: CardId,
    pub rating: Rating,
    pub state: CardState,
    pub reviewed_at: Timestamp,
}
