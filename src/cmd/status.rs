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

use std::fmt::Display;
use std::fmt::Formatter;

use clap::ValueEnum;
use serde::Serialize;

use crate::collection::Collection;
use crate::error::Fallible;
use crate::remote::Remote;
use crate::store::lock;
use crate::sync::CommitSummary;
use crate::types::deck::DeckName;

#[derive(ValueEnum, Clone)]
pub enum StatusFormat {
    /// Plain text output.
    Text,
    /// JSON output.
    Json,
}

impl Display for StatusFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusFormat::Text => write!(f, "text"),
            StatusFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    decks: Vec<DeckStatus>,
    pending_count: usize,
    remote: Option<RemoteStatus>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeckStatus {
    name: DeckName,
    pending_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RemoteStatus {
    location: String,
    branch: String,
    reachable: bool,
    recent: Vec<CommitSummary>,
}

async fn gather_status(collection: &Collection) -> Fallible<Status> {
    let queue = lock(collection.store()).queue().clone();
    let decks = collection
        .decks()
        .into_iter()
        .map(|name| {
            Ok(DeckStatus {
                pending_count: queue.pending_count_for(&name)?,
                name,
            })
        })
        .collect::<Fallible<Vec<_>>>()?;

    let remote = match collection.engine() {
        Some(engine) => {
            let reachable = engine.remote().is_reachable().await;
            let recent = if reachable {
                engine.recent_commits().await?
            } else {
                Vec::new()
            };
            Some(RemoteStatus {
                location: engine.remote().root().display().to_string(),
                branch: collection.config().branch.clone(),
                reachable,
                recent,
            })
        }
        None => None,
    };

    Ok(Status {
        decks,
        pending_count: queue.pending_count()?,
        remote,
    })
}

pub async fn print_status(directory: Option<String>, format: StatusFormat) -> Fallible<()> {
    let collection = Collection::new(directory)?;
    let status = gather_status(&collection).await?;
    match format {
        StatusFormat::Text => {
            for deck in &status.decks {
                println!("{}: {} reviews pending", deck.name, deck.pending_count);
            }
            match &status.remote {
                Some(remote) if remote.reachable => {
                    println!("Remote {} ({}):", remote.location, remote.branch);
                    for commit in &remote.recent {
                        println!(
                            "  {} {} {}",
                            commit.sha.short(),
                            commit.timestamp,
                            commit.summary
                        );
                    }
                }
                Some(remote) => println!("Remote {} is not reachable.", remote.location),
                None => println!("No remote configured."),
            }
        }
        StatusFormat::Json => {
            let status_json = serde_json::to_string_pretty(&status)?;
            println!("{}", status_json);
        }
    }
    Ok(())
}
