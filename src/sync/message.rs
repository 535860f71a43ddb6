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

//! Commit messages. Each replicated review is described by one line:
//!
//! ```text
//! review: <card identity> (<rating>) — next due <YYYY-MM-DD>
//! ```

use serde::Serialize;

use crate::fsrs::Rating;
use crate::types::card_id::CardId;
use crate::types::date::Date;
use crate::types::deck::DeckName;
use crate::types::mutation::Mutation;

const PREFIX: &str = "review: ";
const DUE_SEPARATOR: &str = " — next due ";

/// A review line recovered from a commit message.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReviewLine {
    pub card: CardId,
    pub rating: Rating,
    pub due: Date,
}

pub fn review_line(mutation: &Mutation) -> String {
    format!(
        "{PREFIX}{} ({}){DUE_SEPARATOR}{}",
        mutation.card,
        mutation.rating,
        mutation.state.due.utc_date()
    )
}

/// The message of a commit carrying several reviews of one deck that could
/// not be replicated onto the main branch.
pub fn branch_message(deck: &DeckName, mutations: &[Mutation]) -> String {
    let mut lines = Vec::with_capacity(mutations.len() + 2);
    lines.push(format!(
        "reviews of {deck} made on a diverged history, manual merge required"
    ));
    lines.push(String::new());
    lines.extend(mutations.iter().map(review_line));
    lines.join("\n")
}

pub fn parse_review_line(line: &str) -> Option<ReviewLine> {
    let rest = line.trim().strip_prefix(PREFIX)?;
    let (head, due) = rest.rsplit_once(DUE_SEPARATOR)?;
    let (card, rating) = head.rsplit_once(" (")?;
    let rating = rating.strip_suffix(')')?;
    let due = Date::parse(due.trim()).ok()?;
    Some(ReviewLine {
        card: card.parse().ok()?,
        rating: rating.parse().ok()?,
        due,
    })
}

/// Every review line in a commit message. Other lines are ignored.
pub fn parse_message(message: &str) -> Vec<ReviewLine> {
    message.lines().filter_map(parse_review_line).collect()
}
