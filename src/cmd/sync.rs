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

use crate::collection::Collection;
use crate::config::CONFIG_FILE;
use crate::error::Fallible;
use crate::error::fail;
use crate::sync::SyncReport;

/// Run one sync in the foreground. Ctrl-C cancels it; reviews already
/// replicated stay replicated.
pub async fn sync(directory: Option<String>, reset: bool) -> Fallible<()> {
    let collection = Collection::new(directory)?;
    let report = run_sync(&collection, reset).await?;
    for outcome in &report.decks {
        println!("{}", outcome.describe());
    }
    if report.decks.is_empty() {
        println!("{}", report.describe());
    }
    println!("{} reviews pending", collection.pending_count()?);
    Ok(())
}

async fn run_sync(collection: &Collection, reset: bool) -> Fallible<SyncReport> {
    let Some(engine) = collection.engine() else {
        return fail(format!(
            "no remote configured in {}",
            collection.directory().join(CONFIG_FILE).display()
        ));
    };
    if reset {
        engine.resync()?;
        println!("Sync state reset.");
    }
    let Some(handle) = collection.trigger_sync()? else {
        return fail("a sync is already running.");
    };
    let engine = engine.clone();
    let cancel = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Cancelling sync.");
            engine.cancel();
        }
    });
    let result = handle.await;
    cancel.abort();
    Ok(result??)
}
