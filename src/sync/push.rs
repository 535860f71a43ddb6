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

use crate::remote::CARDS_FILE;
use crate::remote::FileMap;
use crate::remote::PushOutcome;
use crate::remote::Remote;
use crate::remote::STATE_FILE;
use crate::remote::Sha;
use crate::remote::deck_file;
use crate::remote::touches_deck;
use crate::store::lock;
use crate::sync::SyncEngine;
use crate::sync::SyncError;
use crate::sync::message::branch_message;
use crate::sync::message::review_line;
use crate::sync::snapshot::RemoteSnapshot;
use crate::sync::snapshot::digest;
use crate::types::card::render_cards;
use crate::types::card_state::render_states;
use crate::types::deck::DeckName;
use crate::types::mutation::Mutation;
use crate::types::timestamp::Timestamp;

/// How many times one push may move onto a head advanced by other decks.
const MAX_REBASES: usize = 8;

#[derive(Debug, Default)]
pub(super) struct PushReport {
    pub pushed: usize,
    pub branch: Option<String>,
}

impl<R: Remote> SyncEngine<R> {
    /// Replicate the deck's queued reviews, one commit each, oldest first.
    pub(super) async fn push_deck(&self, deck: &DeckName) -> Result<PushReport, SyncError> {
        let mut report = PushReport::default();
        let batch = self.queue.peek_deck_batch(deck, self.config.batch_size)?;
        if batch.is_empty() {
            return Ok(report);
        }
        let mut snapshot = self.db.get_snapshot(deck)?.unwrap_or_default();
        let mut rebases = 0;
        let mut index = 0;
        while index < batch.len() {
            let mutation = &batch[index];
            if !self.deck_contains(mutation) {
                log::warn!(
                    "{deck}/{} no longer exists, dropping its queued review.",
                    mutation.card
                );
                self.queue.ack(mutation.id)?;
                index += 1;
                continue;
            }

            let mut states = snapshot.states.clone();
            states.insert(mutation.card.clone(), mutation.state.clone());
            let mut files = FileMap::new();
            files.insert(deck_file(deck, STATE_FILE), render_states(&states)?);
            let cards_digest = match &snapshot.cards_digest {
                Some(existing) => existing.clone(),
                None => {
                    let (cards, _) = self.local_files(deck)?;
                    let cards_digest = digest(&cards);
                    files.insert(deck_file(deck, CARDS_FILE), cards);
                    cards_digest
                }
            };

            let message = review_line(mutation);
            let outcome = self
                .remote
                .push_commit(&self.branch, snapshot.head.as_ref(), files, &message)
                .await
                .map_err(SyncError::remote)?;
            match outcome {
                PushOutcome::Pushed(sha) => {
                    log::debug!("{deck}: {} {message}", sha.short());
                    let next = RemoteSnapshot {
                        head: Some(sha),
                        states,
                        cards_digest: Some(cards_digest),
                    };
                    self.queue.ack_confirmed(mutation.id, deck, &next)?;
                    snapshot = next;
                    report.pushed += 1;
                    index += 1;
                }
                PushOutcome::Conflict => match self.rebase_target(deck, &snapshot).await? {
                    Some(head) => {
                        if rebases == MAX_REBASES {
                            return Err(SyncError::RemoteUnavailable(
                                "the remote branch keeps moving, try again later".to_string(),
                            ));
                        }
                        rebases += 1;
                        log::debug!("{deck}: rebasing onto {}.", head.short());
                        snapshot.head = Some(head);
                        self.db.put_snapshot(deck, &snapshot)?;
                    }
                    None => {
                        let branch = self
                            .push_to_branch(deck, &snapshot, &batch[index..])
                            .await?;
                        report.branch = Some(branch);
                        break;
                    }
                },
            }
        }
        self.refresh_pending();
        Ok(report)
    }

    /// After a rejected push: the new head to retry on, if every commit
    /// since the snapshot leaves the deck untouched. `None` means the deck's
    /// history diverged.
    async fn rebase_target(
        &self,
        deck: &DeckName,
        snapshot: &RemoteSnapshot,
    ) -> Result<Option<Sha>, SyncError> {
        let commits = self
            .remote
            .list_commits(&self.branch)
            .await
            .map_err(SyncError::remote)?;
        let Some(newest) = commits.first() else {
            return Ok(None);
        };
        for commit in &commits {
            if Some(&commit.sha) == snapshot.head.as_ref() {
                return Ok(Some(newest.sha.clone()));
            }
            if commit.files.iter().any(|path| touches_deck(path, deck)) {
                log::warn!(
                    "{deck}: remote commit {} changed the deck since the last sync.",
                    commit.sha.short()
                );
                return Ok(None);
            }
        }
        // The snapshot head is not in the history any more: the branch was
        // rewritten. Only an empty base can be built upon.
        if snapshot.head.is_none() {
            Ok(Some(newest.sha.clone()))
        } else {
            Ok(None)
        }
    }

    /// Push the local deck to a new side branch, leaving `pending` queued.
    async fn push_to_branch(
        &self,
        deck: &DeckName,
        snapshot: &RemoteSnapshot,
        pending: &[Mutation],
    ) -> Result<String, SyncError> {
        let now = Timestamp::now().into_inner();
        let name = format!(
            "reviews/{deck}-{}-{:08x}",
            now.format("%Y%m%dT%H%M%S"),
            rand::random::<u32>()
        );
        let (cards, states) = self.local_files(deck)?;
        let mut files = FileMap::new();
        files.insert(deck_file(deck, CARDS_FILE), cards);
        files.insert(deck_file(deck, STATE_FILE), states);
        let message = branch_message(deck, pending);

        if let Some(base) = &snapshot.head {
            self.remote
                .create_branch(&name, base)
                .await
                .map_err(SyncError::remote)?;
        }
        let outcome = self
            .remote
            .push_commit(&name, snapshot.head.as_ref(), files, &message)
            .await
            .map_err(SyncError::remote)?;
        match outcome {
            PushOutcome::Pushed(sha) => {
                log::warn!(
                    "{deck}: history diverged, pushed {} pending reviews to {name} ({}).",
                    pending.len(),
                    sha.short()
                );
                Ok(name)
            }
            PushOutcome::Conflict => Err(SyncError::RemoteUnavailable(format!(
                "branch {name} moved while pushing to it"
            ))),
        }
    }

    fn deck_contains(&self, mutation: &Mutation) -> bool {
        lock(&self.store)
            .get_deck(&mutation.deck)
            .is_some_and(|deck| deck.contains(&mutation.card))
    }

    /// The local deck's `cards.json` and `state.json`.
    fn local_files(&self, deck: &DeckName) -> Result<(String, String), SyncError> {
        let store = lock(&self.store);
        let Some(local) = store.get_deck(deck) else {
            return Err(SyncError::Local(format!("no such deck: {deck}")));
        };
        Ok((render_cards(local.cards())?, render_states(local.states())?))
    }
}
