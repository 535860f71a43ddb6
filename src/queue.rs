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

//! The write queue: a durable, ordered log of review outcomes that have not
//! been replicated yet.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::fmt::Formatter;

use crate::db::Database;
use crate::db::MutationRow;
use crate::error::ErrorReport;
use crate::fsrs::Rating;
use crate::sync::snapshot::RemoteSnapshot;
use crate::types::card_id::CardId;
use crate::types::card_state::CardState;
use crate::types::deck::DeckName;
use crate::types::mutation::Mutation;
use crate::types::mutation::MutationId;
use crate::types::mutation::NewMutation;
use crate::types::timestamp::Timestamp;

#[derive(Debug)]
pub enum QueueError {
    /// A queued row could not be decoded.
    Corrupt(String),
    /// The database could not be read or written.
    Storage(ErrorReport),
}

impl Display for QueueError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::Corrupt(detail) => {
                write!(f, "sync state lost, please resync ({detail})")
            }
            QueueError::Storage(e) => write!(f, "{}", e.message()),
        }
    }
}

impl std::error::Error for QueueError {}

impl From<ErrorReport> for QueueError {
    fn from(e: ErrorReport) -> Self {
        QueueError::Storage(e)
    }
}

impl From<QueueError> for ErrorReport {
    fn from(e: QueueError) -> Self {
        ErrorReport::new(e.to_string())
    }
}

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Clone)]
pub struct WriteQueue {
    db: Database,
}

impl WriteQueue {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Durably append a mutation. Returns once it has been committed.
    pub fn enqueue(&self, mutation: &NewMutation) -> QueueResult<MutationId> {
        let id = self.db.insert_mutation(mutation)?;
        log::debug!("Enqueued mutation {id} for {}/{}.", mutation.deck, mutation.card);
        Ok(id)
    }

    /// The oldest `n` pending mutations, in the order they were produced.
    pub fn peek_batch(&self, n: usize) -> QueueResult<Vec<Mutation>> {
        let rows = self.db.mutations(None, n)?;
        rows.into_iter().map(decode).collect()
    }

    /// The oldest `n` pending mutations of one deck.
    pub fn peek_deck_batch(&self, deck: &DeckName, n: usize) -> QueueResult<Vec<Mutation>> {
        let rows = self.db.mutations(Some(deck), n)?;
        rows.into_iter().map(decode).collect()
    }

    /// Remove a replicated mutation. Acking an id that is no longer queued is
    /// a no-op.
    ///
    /// # Panics
    ///
    /// If an older mutation of the same card identity is still queued.
    pub fn ack(&self, id: MutationId) -> QueueResult<()> {
        if self.check_causal_order(id, None)? {
            self.db.delete_mutation(id)?;
        }
        Ok(())
    }

    /// Remove a replicated mutation and record the remote snapshot its commit
    /// produced, atomically.
    ///
    /// # Panics
    ///
    /// If an older mutation of the same card identity is still queued, or if
    /// the mutation does not belong to `deck`.
    pub fn ack_confirmed(
        &self,
        id: MutationId,
        deck: &DeckName,
        snapshot: &RemoteSnapshot,
    ) -> QueueResult<()> {
        if self.check_causal_order(id, Some(deck))? {
            self.db.confirm_mutation(id, deck, snapshot)?;
        } else {
            self.db.put_snapshot(deck, snapshot)?;
        }
        Ok(())
    }

    pub fn pending_count(&self) -> QueueResult<usize> {
        Ok(self.db.mutation_count(None)?)
    }

    pub fn pending_count_for(&self, deck: &DeckName) -> QueueResult<usize> {
        Ok(self.db.mutation_count(Some(deck))?)
    }

    /// The card identities of a deck with at least one pending mutation.
    pub fn pending_cards(&self, deck: &DeckName) -> QueueResult<BTreeSet<CardId>> {
        let rows = self.db.mutations(Some(deck), usize::MAX)?;
        let mut cards = BTreeSet::new();
        for row in rows {
            cards.insert(decode(row)?.card);
        }
        Ok(cards)
    }

    /// Drop every pending mutation and every snapshot, so that the next sync
    /// starts over from the remote.
    pub fn clear(&self) -> QueueResult<()> {
        let dropped = self.db.mutation_count(None)?;
        self.db.clear_mutations()?;
        self.db.clear_snapshots()?;
        log::warn!("Cleared the write queue, dropping {dropped} unreplicated reviews.");
        Ok(())
    }

    /// Whether `id` is still queued. Panics if acking it now would skip an
    /// older mutation of the same card identity.
    fn check_causal_order(&self, id: MutationId, deck: Option<&DeckName>) -> QueueResult<bool> {
        let Some(row) = self.db.mutation(id)? else {
            return Ok(false);
        };
        if let Some(deck) = deck {
            assert_eq!(
                row.deck_name,
                deck.as_str(),
                "mutation {id} does not belong to deck {deck}"
            );
        }
        let oldest = self.db.oldest_mutation_of(&row.deck_name, &row.card_id)?;
        assert_eq!(
            oldest,
            Some(id),
            "mutation {id} acked before an older mutation of {}/{}",
            row.deck_name,
            row.card_id
        );
        Ok(true)
    }
}

fn decode(row: MutationRow) -> QueueResult<Mutation> {
    let id = row.mutation_id;
    let corrupt = |what: &str, e: ErrorReport| {
        QueueError::Corrupt(format!("mutation {id}: bad {what}: {}", e.message()))
    };
    let deck: DeckName = row.deck_name.parse().map_err(|e| corrupt("deck", e))?;
    let card: CardId = row.card_id.parse().map_err(|e| corrupt("card", e))?;
    let rating: Rating = row.rating.parse().map_err(|e| corrupt("rating", e))?;
    let state: CardState = serde_json::from_str(&row.state)
        .map_err(|e| corrupt("state", ErrorReport::from(e)))?;
    let reviewed_at = Timestamp::parse(&row.reviewed_at).map_err(|e| corrupt("timestamp", e))?;
    Ok(Mutation {
        id,
        deck,
        card,
        rating,
        state,
        reviewed_at,
    })
}
