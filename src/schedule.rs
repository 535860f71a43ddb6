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
use crate::fsrs::Stability;
use crate::fsrs::clamp_d;
use crate::fsrs::clamp_s;
use crate::fsrs::initial_difficulty;
use crate::fsrs::initial_stability;
use crate::fsrs::interval;
use crate::fsrs::new_difficulty;
use crate::fsrs::new_stability;
use crate::fsrs::retrievability;
use crate::types::card_id::CardId;
use crate::types::card_state::CardState;
use crate::types::deck::DeckName;
use crate::types::mutation::NewMutation;
use crate::types::timestamp::Timestamp;

/// The desired recall probability.
const TARGET_RECALL: f64 = 0.9;

/// The minimum review interval in days.
const MIN_INTERVAL: f64 = 1.0;

/// The maximum review interval in days.
const MAX_INTERVAL: f64 = 365.0;

/// The outcome of rating a card. Only the scheduler constructs these, so the
/// store can only ever record states the memory model produced.
#[derive(Clone, Debug)]
pub struct Review {
    deck: DeckName,
    card: CardId,
    rating: Rating,
    state: CardState,
    reviewed_at: Timestamp,
}

impl Review {
    pub fn deck(&self) -> &DeckName {
        &self.deck
    }

    pub fn card(&self) -> &CardId {
        &self.card
    }

    pub fn rating(&self) -> Rating {
        self.rating
    }

    pub fn state(&self) -> &CardState {
        &self.state
    }

    pub fn into_mutation(self) -> NewMutation {
        NewMutation {
            deck: self.deck,
            card: self.card,
            rating: self.rating,
            state: self.state,
            reviewed_at: self.reviewed_at,
        }
    }
}

/// Rate a card identity, producing its new state.
pub fn review(
    deck: DeckName,
    card: CardId,
    current: Option<&CardState>,
    rating: Rating,
    now: Timestamp,
) -> Review {
    let state = schedule(current, rating, now);
    log::debug!(
        "{deck}/{card} {rating} S={:.2}d D={:.2} reps={} due={}",
        state.stability,
        state.difficulty,
        state.reps,
        state.due
    );
    Review {
        deck,
        card,
        rating,
        state,
        reviewed_at: now,
    }
}

/// Compute the state of a card after it is rated `rating` at `now`. `None`
/// means the card is new.
pub fn schedule(current: Option<&CardState>, rating: Rating, now: Timestamp) -> CardState {
    match current {
        None => {
            let stability = initial_stability(rating);
            let difficulty = initial_difficulty(rating);
            CardState {
                due: next_due(stability, rating, now),
                stability,
                difficulty,
                reps: if rating == Rating::Again { 0 } else { 1 },
                last_review: Some(now),
                suspended: false,
            }
        }
        Some(state) => {
            let stability = clamp_s(state.stability);
            let difficulty = clamp_d(state.difficulty);
            let elapsed = match state.last_review {
                Some(last_review) => now.days_since(last_review).max(0.0),
                None => 0.0,
            };
            let retr = retrievability(elapsed, stability);
            let stability = clamp_s(new_stability(difficulty, stability, retr, rating));
            let difficulty = new_difficulty(difficulty, rating);
            let reps = match rating {
                Rating::Again => state.reps,
                _ => state.reps.saturating_add(1),
            };
            CardState {
                due: next_due(stability, rating, now),
                stability,
                difficulty,
                reps,
                last_review: Some(now),
                suspended: state.suspended,
            }
        }
    }
}

/// A lapsed card is due again right away, within the same session.
fn next_due(stability: Stability, rating: Rating, now: Timestamp) -> Timestamp {
    if rating == Rating::Again {
        return now;
    }
    let days = interval(TARGET_RECALL, stability)
        .round()
        .clamp(MIN_INTERVAL, MAX_INTERVAL);
    now.plus_days(days as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Fallible;
    use crate::fsrs::MAX_DIFFICULTY;
    use crate::fsrs::MIN_DIFFICULTY;

    const RATINGS: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    fn now() -> Fallible<Timestamp> {
        Timestamp::parse("2025-06-01T09:30:00Z")
    }

    fn priors() -> Fallible<Vec<Option<CardState>>> {
        let mut priors = vec![None];
        for (days_ago, stability, difficulty, reps) in [
            (1, 1.0, 5.0, 1),
            (3, 2.5, 8.0, 2),
            (10, 9.0, 2.0, 4),
            (40, 30.0, 6.5, 7),
            (0, 0.4, 9.9, 0),
        ] {
            let last = now()?.plus_days(-days_ago);
            priors.push(Some(CardState {
                due: last.plus_days(days_ago),
                stability,
                difficulty,
                reps,
                last_review: Some(last),
                suspended: false,
            }));
        }
        Ok(priors)
    }

    #[test]
    fn test_deterministic() -> Fallible<()> {
        for prior in priors()? {
            for rating in RATINGS {
                let a = schedule(prior.as_ref(), rating, now()?);
                let b = schedule(prior.as_ref(), rating, now()?);
                assert_eq!(serde_json::to_string(&a)?, serde_json::to_string(&b)?);
            }
        }
        Ok(())
    }

    #[test]
    fn test_due_relative_to_now() -> Fallible<()> {
        let now = now()?;
        for prior in priors()? {
            for rating in RATINGS {
                let state = schedule(prior.as_ref(), rating, now);
                if rating == Rating::Again {
                    assert!(state.due <= now);
                } else {
                    assert!(state.due > now);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_interval_monotonic_in_rating() -> Fallible<()> {
        let now = now()?;
        for prior in priors()? {
            let hard = schedule(prior.as_ref(), Rating::Hard, now);
            let good = schedule(prior.as_ref(), Rating::Good, now);
            let easy = schedule(prior.as_ref(), Rating::Easy, now);
            assert!(easy.due >= good.due);
            assert!(good.due >= hard.due);
        }
        Ok(())
    }

    #[test]
    fn test_reps() -> Fallible<()> {
        let now = now()?;
        let first = schedule(None, Rating::Good, now);
        assert_eq!(first.reps, 1);
        let lapse = schedule(None, Rating::Again, now);
        assert_eq!(lapse.reps, 0);
        let second = schedule(Some(&first), Rating::Good, now.plus_days(3));
        assert_eq!(second.reps, 2);
        let forgot = schedule(Some(&second), Rating::Again, now.plus_days(20));
        assert_eq!(forgot.reps, 2);
        Ok(())
    }

    #[test]
    fn test_lapse_decreases_stability() -> Fallible<()> {
        let now = now()?;
        let learned = schedule(None, Rating::Easy, now);
        let lapsed = schedule(Some(&learned), Rating::Again, now.plus_days(10));
        assert!(lapsed.stability < learned.stability);
        Ok(())
    }

    #[test]
    fn test_success_increases_stability() -> Fallible<()> {
        let now = now()?;
        let first = schedule(None, Rating::Good, now);
        let later = now.plus_days(3);
        for rating in [Rating::Hard, Rating::Good, Rating::Easy] {
            let next = schedule(Some(&first), rating, later);
            assert!(next.stability > first.stability);
        }
        Ok(())
    }

    #[test]
    fn test_out_of_range_inputs_are_clamped() -> Fallible<()> {
        let now = now()?;
        let broken = CardState {
            due: now,
            stability: -4.0,
            difficulty: 57.0,
            reps: 3,
            last_review: Some(now.plus_days(5)),
            suspended: false,
        };
        for rating in RATINGS {
            let state = schedule(Some(&broken), rating, now);
            assert!(state.stability > 0.0);
            assert!(state.difficulty >= MIN_DIFFICULTY);
            assert!(state.difficulty <= MAX_DIFFICULTY);
        }
        let nan = CardState {
            stability: f64::NAN,
            difficulty: f64::NAN,
            ..broken
        };
        let state = schedule(Some(&nan), Rating::Good, now);
        assert!(state.stability.is_finite());
        assert!(state.difficulty.is_finite());
        assert!(state.due > now);
        Ok(())
    }

    #[test]
    fn test_suspended_flag_passes_through() -> Fallible<()> {
        let now = now()?;
        let mut state = schedule(None, Rating::Good, now);
        state.suspended = true;
        let next = schedule(Some(&state), Rating::Good, now.plus_days(4));
        assert!(next.suspended);
        let fresh = schedule(None, Rating::Good, now);
        assert!(!fresh.suspended);
        Ok(())
    }
}
