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

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::remote::Remote;
use crate::sync::SyncEngine;

impl<R: Remote> SyncEngine<R> {
    /// Sync every `every` while the remote is reachable, until
    /// [`SyncEngine::shutdown`].
    pub fn spawn_periodic(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick is immediate.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = engine.shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if !engine.remote.is_reachable().await {
                    log::debug!("Remote unreachable, skipping periodic sync.");
                    continue;
                }
                match engine.trigger() {
                    Some(handle) => {
                        // The outcome is published on the status channel.
                        let _ = handle.await;
                    }
                    None => log::debug!("Sync already running, skipping periodic sync."),
                }
            }
            log::debug!("Periodic sync stopped.");
        })
    }
}
