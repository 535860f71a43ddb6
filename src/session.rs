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

use std::collections::HashSet;
use std::collections::VecDeque;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Fallible;
use crate::error::fail;
use crate::fsrs::Rating;
use crate::types::card_id::CardId;
use crate::types::date::Date;
use crate::types::deck::Deck;
use crate::types::deck::DeckName;
use crate::types::timestamp::Timestamp;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewOrder {
    Random,
    #[default]
    OldestFirst,
    /// Declaration order. Sessions spanning several decks keep each deck's
    /// cards together; within one deck this is just the order of the file.
    DeckGrouped,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub new_cards_per_day: u32,
    pub review_order: ReviewOrder,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            new_cards_per_day: 20,
            review_order: ReviewOrder::default(),
        }
    }
}

/// Select and order the card identities to review today: due cards first,
/// then as many new cards as today's remaining allowance permits.
pub fn build_session(
    deck: &Deck,
    policy: &Policy,
    introduced_today: usize,
    now: Timestamp,
) -> Vec<CardId> {
    let mut due: Vec<(Timestamp, CardId)> = Vec::new();
    let mut new: Vec<CardId> = Vec::new();
    for id in deck.identities() {
        match deck.state(&id) {
            Some(state) => {
                if state.is_due(now) {
                    due.push((state.due, id));
                }
            }
            None => new.push(id),
        }
    }

    match policy.review_order {
        // `sort_by_key` is stable, so ties keep declaration order.
        ReviewOrder::OldestFirst => due.sort_by_key(|(due, _)| *due),
        ReviewOrder::Random => {
            let mut rng = StdRng::seed_from_u64(shuffle_seed(deck.name(), now));
            due.shuffle(&mut rng);
        }
        ReviewOrder::DeckGrouped => {}
    }

    let allowance = (policy.new_cards_per_day as usize).saturating_sub(introduced_today);
    new.truncate(allowance);

    log::debug!(
        "Session for {}: {} due, {} new (allowance {allowance}).",
        deck.name(),
        due.len(),
        new.len()
    );

    due.into_iter().map(|(_, id)| id).chain(new).collect()
}

/// The shuffle depends only on the deck and the time, so a given session is
/// reproducible.
fn shuffle_seed(deck: &DeckName, now: Timestamp) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(deck.as_str().as_bytes());
    hasher.update(now.to_rfc3339().as_bytes());
    let hash = hasher.finalize();
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(seed)
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CardLabel {
    New,
    Due,
}

/// An in-progress review of one deck.
pub struct ReviewSession {
    deck: DeckName,
    day: Date,
    queue: VecDeque<CardId>,
    /// Admitted new identities that have not been rated yet.
    unseen: HashSet<CardId>,
    introduced: usize,
    reviewed: usize,
}

impl ReviewSession {
    pub fn start(deck: &Deck, policy: &Policy, introduced_today: usize, now: Timestamp) -> Self {
        let queue: VecDeque<CardId> = build_session(deck, policy, introduced_today, now).into();
        let unseen = queue
            .iter()
            .filter(|id| deck.state(id).is_none())
            .cloned()
            .collect();
        Self {
            deck: deck.name().clone(),
            day: now.local_date(),
            queue,
            unseen,
            introduced: 0,
            reviewed: 0,
        }
    }

    pub fn deck(&self) -> &DeckName {
        &self.deck
    }

    /// The local calendar day the session's new-card allowance counts against.
    pub fn day(&self) -> Date {
        self.day
    }

    pub fn current(&self) -> Option<&CardId> {
        self.queue.front()
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    pub fn is_complete(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn label(&self, id: &CardId) -> CardLabel {
        if self.unseen.contains(id) {
            CardLabel::New
        } else {
            CardLabel::Due
        }
    }

    /// New cards introduced during this session.
    pub fn introduced(&self) -> usize {
        self.introduced
    }

    pub fn reviewed(&self) -> usize {
        self.reviewed
    }

    /// Move past the current card after it was rated. A card rated Again
    /// goes to the back of the queue; any other rating removes it. Returns
    /// whether this was the card's first review.
    pub fn advance(&mut self, id: &CardId, rating: Rating) -> Fallible<bool> {
        if self.queue.front() != Some(id) {
            return fail(format!("{id} is not the current card."));
        }
        let card = match self.queue.pop_front() {
            Some(card) => card,
            None => return fail("the session is complete."),
        };
        let first = self.unseen.remove(&card);
        if first {
            self.introduced += 1;
        }
        self.reviewed += 1;
        if rating == Rating::Again {
            self.queue.push_back(card);
        }
        Ok(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::schedule;
    use crate::types::card::Card;
    use crate::types::card::CardContent;
    use crate::types::card_state::CardState;
    use crate::types::card_state::StateMap;

    fn now() -> Fallible<Timestamp> {
        Timestamp::parse("2025-06-01T09:30:00Z")
    }

    fn card(id: &str, reversible: bool) -> Fallible<Card> {
        Card::new(
            id,
            CardContent {
                source: id.to_string(),
                translation: id.to_uppercase(),
                example: None,
                notes: None,
                tags: Vec::new(),
                created: Timestamp::parse("2025-01-01T00:00:00Z")?,
                reversible,
            },
        )
    }

    /// Five plain cards and one reversible card, none reviewed.
    fn fresh_deck() -> Fallible<Deck> {
        let mut cards = Vec::new();
        for id in ["uno", "dos", "tres", "cuatro", "cinco"] {
            cards.push(card(id, false)?);
        }
        cards.push(card("seis", true)?);
        Ok(Deck::new("spanish".parse()?, cards, StateMap::new()))
    }

    fn due_state(due: Timestamp) -> CardState {
        CardState {
            due,
            stability: 2.0,
            difficulty: 5.0,
            reps: 1,
            last_review: Some(due.plus_days(-2)),
            suspended: false,
        }
    }

    fn policy(new_cards_per_day: u32, review_order: ReviewOrder) -> Policy {
        Policy {
            new_cards_per_day,
            review_order,
        }
    }

    #[test]
    fn test_reversible_card_counts_twice() -> Fallible<()> {
        let deck = fresh_deck()?;
        let session = build_session(&deck, &policy(10, ReviewOrder::OldestFirst), 0, now()?);
        assert_eq!(session.len(), 6);
        assert_eq!(session[5], CardId::reverse("seis"));
        Ok(())
    }

    #[test]
    fn test_new_card_cap() -> Fallible<()> {
        let deck = fresh_deck()?;
        let session = build_session(&deck, &policy(2, ReviewOrder::OldestFirst), 0, now()?);
        assert_eq!(session, vec![CardId::forward("uno"), CardId::forward("dos")]);
        Ok(())
    }

    #[test]
    fn test_cap_counts_cards_introduced_earlier_today() -> Fallible<()> {
        let deck = fresh_deck()?;
        let p = policy(4, ReviewOrder::OldestFirst);
        assert_eq!(build_session(&deck, &p, 3, now()?).len(), 1);
        assert_eq!(build_session(&deck, &p, 4, now()?).len(), 0);
        assert_eq!(build_session(&deck, &p, 9, now()?).len(), 0);
        Ok(())
    }

    #[test]
    fn test_zero_cap_and_nothing_due_is_complete() -> Fallible<()> {
        let deck = fresh_deck()?;
        let session = ReviewSession::start(&deck, &policy(0, ReviewOrder::Random), 0, now()?);
        assert!(session.is_complete());
        assert_eq!(session.remaining(), 0);
        assert_eq!(session.current(), None);
        Ok(())
    }

    #[test]
    fn test_due_cards_come_first_and_size_formula() -> Fallible<()> {
        let now = now()?;
        let mut states = StateMap::new();
        states.insert(CardId::forward("tres"), due_state(now.plus_days(-1)));
        states.insert(CardId::forward("uno"), due_state(now.plus_days(-5)));
        // Not due yet.
        states.insert(CardId::forward("dos"), due_state(now.plus_days(3)));
        // Suspended.
        let mut suspended = due_state(now.plus_days(-9));
        suspended.suspended = true;
        states.insert(CardId::forward("cuatro"), suspended);
        let deck = Deck::new("spanish".parse()?, fresh_deck()?.cards().to_vec(), states);

        let session = build_session(&deck, &policy(1, ReviewOrder::OldestFirst), 0, now);
        assert_eq!(
            session,
            vec![
                CardId::forward("uno"),
                CardId::forward("tres"),
                CardId::forward("cinco")
            ]
        );

        let grouped = build_session(&deck, &policy(0, ReviewOrder::DeckGrouped), 0, now);
        assert_eq!(grouped, vec![CardId::forward("uno"), CardId::forward("tres")]);
        Ok(())
    }

    #[test]
    fn test_random_order_is_a_reproducible_permutation() -> Fallible<()> {
        let now = now()?;
        let deck = fresh_deck()?;
        let mut states = StateMap::new();
        for id in deck.identities() {
            states.insert(id, due_state(now.plus_days(-1)));
        }
        let deck = Deck::new(deck.name().clone(), deck.cards().to_vec(), states);
        let p = policy(0, ReviewOrder::Random);
        let a = build_session(&deck, &p, 0, now);
        let b = build_session(&deck, &p, 0, now);
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort();
        let mut expected = deck.identities();
        expected.sort();
        assert_eq!(sorted, expected);
        Ok(())
    }

    #[test]
    fn test_again_requeues_and_others_remove() -> Fallible<()> {
        let now = now()?;
        let deck = fresh_deck()?;
        let mut session = ReviewSession::start(&deck, &policy(3, ReviewOrder::OldestFirst), 0, now);
        assert_eq!(session.remaining(), 3);
        let uno = CardId::forward("uno");
        assert_eq!(session.label(&uno), CardLabel::New);

        assert!(session.advance(&uno, Rating::Again)?);
        assert_eq!(session.remaining(), 3);
        assert_eq!(session.current(), Some(&CardId::forward("dos")));
        assert_eq!(session.label(&uno), CardLabel::Due);

        for rating in [Rating::Hard, Rating::Good] {
            let current = session.current().cloned().unwrap();
            let before = session.remaining();
            session.advance(&current, rating)?;
            assert_eq!(session.remaining(), before - 1);
        }
        assert_eq!(session.current(), Some(&uno));
        assert!(!session.advance(&uno, Rating::Easy)?);
        assert!(session.is_complete());
        assert_eq!(session.introduced(), 3);
        assert_eq!(session.reviewed(), 4);
        Ok(())
    }

    #[test]
    fn test_only_current_card_can_be_rated() -> Fallible<()> {
        let deck = fresh_deck()?;
        let mut session = ReviewSession::start(&deck, &policy(3, ReviewOrder::OldestFirst), 0, now()?);
        assert!(session.advance(&CardId::forward("dos"), Rating::Good).is_err());
        assert_eq!(session.remaining(), 3);
        Ok(())
    }

    #[test]
    fn test_reverse_scheduled_independently() -> Fallible<()> {
        let now = now()?;
        let deck = fresh_deck()?;
        let mut states = StateMap::new();
        states.insert(
            CardId::forward("seis"),
            schedule(None, Rating::Good, now.plus_days(-1)),
        );
        let deck = Deck::new(deck.name().clone(), deck.cards().to_vec(), states);
        let session = build_session(&deck, &policy(10, ReviewOrder::OldestFirst), 0, now);
        assert!(session.contains(&CardId::reverse("seis")));
        assert!(!session.contains(&CardId::forward("seis")));
        Ok(())
    }
}
