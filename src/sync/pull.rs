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

use crate::remote::Remote;
use crate::store::lock;
use crate::sync::SyncEngine;
use crate::sync::SyncError;
use crate::sync::snapshot::RemoteDeck;
use crate::sync::snapshot::RemoteSnapshot;
use crate::types::card_id::CardId;
use crate::types::deck::DeckName;

#[derive(Debug, Default)]
pub(super) struct PullReport {
    /// Whether the remote head moved since the last pull.
    pub changed: bool,
    pub conflicts: Vec<CardId>,
}

impl<R: Remote> SyncEngine<R> {
    /// Bring a deck up to date with the remote head. Pulling an unchanged
    /// head does nothing.
    pub(super) async fn pull_deck(&self, deck: &DeckName) -> Result<PullReport, SyncError> {
        let stored = self.db.get_snapshot(deck)?;
        let head = self
            .remote
            .head(&self.branch)
            .await
            .map_err(SyncError::remote)?;
        let previous = match stored {
            Some(snapshot) if snapshot.head == head => {
                log::debug!("{deck}: remote unchanged.");
                return Ok(PullReport::default());
            }
            Some(snapshot) => snapshot,
            None => RemoteSnapshot::default(),
        };
        let Some(head) = head else {
            return Ok(PullReport::default());
        };

        let files = self
            .remote
            .list_files(&head, &format!("{deck}/"))
            .await
            .map_err(SyncError::remote)?;
        let remote = RemoteDeck::parse(deck, &files)
            .map_err(|e| SyncError::MalformedRemote(e.message().to_string()))?;
        let pending = self.queue.pending_cards(deck)?;

        let conflicts: Vec<CardId> = pending
            .iter()
            .filter(|id| remote.states.get(*id) != previous.states.get(*id))
            .cloned()
            .collect();
        for id in &conflicts {
            log::warn!("{deck}/{id} changed remotely while a local review was pending; keeping the local review.");
        }

        let next = RemoteSnapshot {
            head: Some(head),
            states: remote.states.clone(),
            cards_digest: remote.cards_digest.clone(),
        };
        lock(&self.store).apply_remote_snapshot(deck, remote, &pending)?;
        // A conflicting deck keeps its old head, so that the push is rejected
        // and the pending reviews go to a side branch instead of over the
        // remote ones.
        if conflicts.is_empty() {
            self.db.put_snapshot(deck, &next)?;
            log::debug!(
                "{deck}: pulled {}.",
                next.head.as_ref().map(|sha| sha.short()).unwrap_or_default()
            );
        }
        Ok(PullReport {
            changed: true,
            conflicts,
        })
    }
}
