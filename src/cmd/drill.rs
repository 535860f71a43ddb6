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

use std::io::BufRead;

use crate::collection::Collection;
use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::error::fail;
use crate::fsrs::Rating;
use crate::session::CardLabel;
use crate::sync::SyncState;
use crate::types::card::CardView;
use crate::types::deck::DeckName;
use crate::types::timestamp::Timestamp;

pub async fn drill(directory: Option<String>, deck: Option<String>, offline: bool) -> Fallible<()> {
    let mut collection = Collection::new(directory)?;
    let deck = choose_deck(&collection.decks(), deck.as_deref())?;

    let periodic = match (collection.engine(), collection.config().sync.interval()) {
        (Some(engine), Some(every)) if !offline => Some(engine.spawn_periodic(every)),
        _ => None,
    };

    collection.start_session(&deck, Timestamp::now())?;
    let remaining = collection
        .session_state()
        .map(|state| state.remaining)
        .unwrap_or_default();
    println!("Drilling {deck}: {remaining} cards.");

    while let Some(state) = collection.session_state() {
        let (Some(card), Some(label)) = (state.current, state.label) else {
            break;
        };
        println!();
        println!("[{} left, {}]", state.remaining, describe_label(label));
        println!("Q: {}", card.front);
        println!("[press enter to reveal]");
        if read_line().await?.is_none() {
            break;
        }
        print_answer(&card);
        let Some(rating) = read_rating().await? else {
            break;
        };
        let next = collection.rate(&card.id, rating, Timestamp::now())?;
        println!("Next due {}.", next.due.local_date());
    }

    if let Some(state) = collection.session_state() {
        println!();
        println!(
            "Reviewed {} cards, {} of them new.",
            state.reviewed, state.introduced
        );
    }

    if let Some(handle) = periodic {
        handle.abort();
    }
    if !offline {
        if let Some(engine) = collection.engine() {
            // A periodic sync may still be finishing.
            engine
                .status()
                .wait_for(|status| status.state != SyncState::Syncing)
                .await
                .map_err(|e| ErrorReport::new(e.to_string()))?;
            if let Some(handle) = collection.trigger_sync()? {
                match handle.await? {
                    Ok(report) => println!("Synced: {}.", report.describe()),
                    Err(e) => println!("Sync failed, reviews kept for later: {e}."),
                }
            }
        }
    }
    Ok(())
}

/// The deck named on the command line, or the only deck there is.
fn choose_deck(decks: &[DeckName], requested: Option<&str>) -> Fallible<DeckName> {
    match requested {
        Some(name) => {
            let name: DeckName = name.parse()?;
            if decks.contains(&name) {
                Ok(name)
            } else {
                fail(format!("no such deck: {name}"))
            }
        }
        None => match decks {
            [] => fail("the collection has no decks."),
            [deck] => Ok(deck.clone()),
            _ => {
                let names: Vec<String> = decks.iter().map(|deck| deck.to_string()).collect();
                fail(format!(
                    "choose a deck with --deck: {}",
                    names.join(", ")
                ))
            }
        },
    }
}

fn describe_label(label: CardLabel) -> &'static str {
    match label {
        CardLabel::New => "new",
        CardLabel::Due => "due",
    }
}

fn print_answer(card: &CardView) {
    println!("A: {}", card.back);
    if let Some(example) = &card.example {
        println!("   {example}");
    }
    if let Some(notes) = &card.notes {
        println!("   ({notes})");
    }
}

/// Read one line from stdin off the async runtime. `None` at end of input.
async fn read_line() -> Fallible<Option<String>> {
    let line = tokio::task::spawn_blocking(|| {
        let mut input = String::new();
        let read = std::io::stdin().lock().read_line(&mut input)?;
        Ok::<_, std::io::Error>((read > 0).then_some(input))
    })
    .await??;
    Ok(line)
}

async fn read_rating() -> Fallible<Option<Rating>> {
    loop {
        println!("Rating: (1 = Again, 2 = Hard, 3 = Good, 4 = Easy)");
        let Some(input) = read_line().await? else {
            return Ok(None);
        };
        match parse_rating(&input) {
            Some(rating) => return Ok(Some(rating)),
            None => println!("Invalid input. Please enter a number between 1 and 4."),
        }
    }
}

fn parse_rating(input: &str) -> Option<Rating> {
    match input.trim().parse::<u8>() {
        Ok(1) => Some(Rating::Again),
        Ok(2) => Some(Rating::Hard),
        Ok(3) => Some(Rating::Good),
        Ok(4) => Some(Rating::Easy),
        _ => None,
    }
}
