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
use std::sync::Mutex;
use std::sync::MutexGuard;

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::Transaction;

use crate::error::Fallible;
use crate::remote::Sha;
use crate::sync::snapshot::RemoteSnapshot;
use crate::types::card_state::StateMap;
use crate::types::card_state::parse_states;
use crate::types::card_state::render_states;
use crate::types::date::Date;
use crate::types::deck::DeckName;
use crate::types::mutation::MutationId;
use crate::types::mutation::NewMutation;

/// The local database: the write queue, the remote snapshots, and the daily
/// new card counters.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// A write queue row, exactly as stored. Decoding is left to the queue, so
/// that it can tell corruption apart from other database errors.
pub struct MutationRow {
    pub mutation_id: MutationId,
    pub deck_name: String,
    pub card_id: String,
    pub rating: String,
    pub state: String,
    pub reviewed_at: String,
}

impl MutationRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            mutation_id: row.get(0)?,
            deck_name: row.get(1)?,
            card_id: row.get(2)?,
            rating: row.get(3)?,
            state: row.get(4)?,
            reviewed_at: row.get(5)?,
        })
    }
}

impl Database {
    pub fn new(database_path: &str) -> Fallible<Self> {
        let conn = Connection::open(database_path)?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn in_memory() -> Fallible<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(mut conn: Connection) -> Fallible<Self> {
        {
            let tx = conn.transaction()?;
            if !probe_schema_exists(&tx)? {
                log::debug!("Creating database schema.");
                tx.execute_batch(include_str!("schema.sql"))?;
                tx.commit()?;
            }
        }
        let conn = Arc::new(Mutex::new(conn));
        Ok(Self { conn })
    }

    pub fn insert_mutation(&self, mutation: &NewMutation) -> Fallible<MutationId> {
        let state = serde_json::to_string(&mutation.state)?;
        let conn = self.acquire();
        let sql = "insert into mutations (deck_name, card_id, rating, state, reviewed_at) values (?, ?, ?, ?, ?) returning mutation_id;";
        let id: MutationId = conn.query_row(
            sql,
            (
                &mutation.deck,
                &mutation.card,
                mutation.rating,
                state,
                mutation.reviewed_at,
            ),
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// The oldest `limit` queued mutations, optionally restricted to a deck,
    /// in the order they were produced.
    pub fn mutations(&self, deck: Option<&DeckName>, limit: usize) -> Fallible<Vec<MutationRow>> {
        let conn = self.acquire();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let sql = "select mutation_id, deck_name, card_id, rating, state, reviewed_at from mutations where (?1 is null or deck_name = ?1) order by mutation_id limit ?2;";
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query((deck.map(|d| d.as_str()), limit))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(MutationRow::from_row(row)?);
        }
        Ok(result)
    }

    pub fn mutation(&self, id: MutationId) -> Fallible<Option<MutationRow>> {
        let conn = self.acquire();
        let sql = "select mutation_id, deck_name, card_id, rating, state, reviewed_at from mutations where mutation_id = ?;";
        let row = conn
            .query_row(sql, [id], MutationRow::from_row)
            .optional()?;
        Ok(row)
    }

    /// The id of the oldest queued mutation of a card identity.
    pub fn oldest_mutation_of(&self, deck: &str, card_id: &str) -> Fallible<Option<MutationId>> {
        let conn = self.acquire();
        let sql = "select min(mutation_id) from mutations where deck_name = ? and card_id = ?;";
        let id: Option<MutationId> = conn.query_row(sql, [deck, card_id], |row| row.get(0))?;
        Ok(id)
    }

    pub fn mutation_count(&self, deck: Option<&DeckName>) -> Fallible<usize> {
        let conn = self.acquire();
        let sql = "select count(*) from mutations where (?1 is null or deck_name = ?1);";
        let count: i64 = conn.query_row(sql, [deck.map(|d| d.as_str())], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn delete_mutation(&self, id: MutationId) -> Fallible<()> {
        let conn = self.acquire();
        conn.execute("delete from mutations where mutation_id = ?;", [id])?;
        Ok(())
    }

    /// Remove a replicated mutation and record the remote state it produced,
    /// in one transaction.
    pub fn confirm_mutation(
        &self,
        id: MutationId,
        deck: &DeckName,
        snapshot: &RemoteSnapshot,
    ) -> Fallible<()> {
        let mut conn = self.acquire();
        let tx = conn.transaction()?;
        tx.execute("delete from mutations where mutation_id = ?;", [id])?;
        upsert_snapshot(&tx, deck, snapshot)?;
        tx.commit()?;
        Ok(())
    }

    pub fn clear_mutations(&self) -> Fallible<()> {
        let conn = self.acquire();
        conn.execute("delete from mutations;", [])?;
        Ok(())
    }

    pub fn get_snapshot(&self, deck: &DeckName) -> Fallible<Option<RemoteSnapshot>> {
        let conn = self.acquire();
        let sql = "select head, states, cards_digest from snapshots where deck_name = ?;";
        let row: Option<(Option<Sha>, String, Option<String>)> = conn
            .query_row(sql, [deck], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .optional()?;
        match row {
            Some((head, states, cards_digest)) => {
                let states: StateMap = parse_states(&states)?;
                Ok(Some(RemoteSnapshot {
                    head,
                    states,
                    cards_digest,
                }))
            }
            None => Ok(None),
        }
    }

    pub fn put_snapshot(&self, deck: &DeckName, snapshot: &RemoteSnapshot) -> Fallible<()> {
        let mut conn = self.acquire();
        let tx = conn.transaction()?;
        upsert_snapshot(&tx, deck, snapshot)?;
        tx.commit()?;
        Ok(())
    }

    pub fn clear_snapshots(&self) -> Fallible<()> {
        let conn = self.acquire();
        conn.execute("delete from snapshots;", [])?;
        Ok(())
    }

    pub fn introduced_count(&self, deck: &DeckName, day: Date) -> Fallible<usize> {
        let conn = self.acquire();
        let sql = "select card_count from introduced where deck_name = ? and day = ?;";
        let count: Option<i64> = conn
            .query_row(sql, (deck, day), |row| row.get(0))
            .optional()?;
        Ok(count.unwrap_or(0) as usize)
    }

    pub fn record_introduced(&self, deck: &DeckName, day: Date) -> Fallible<()> {
        let conn = self.acquire();
        let sql = "insert into introduced (deck_name, day, card_count) values (?, ?, 1) on conflict (deck_name, day) do update set card_count = card_count + 1;";
        conn.execute(sql, (deck, day))?;
        Ok(())
    }

    fn acquire(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }
}

fn upsert_snapshot(tx: &Transaction, deck: &DeckName, snapshot: &RemoteSnapshot) -> Fallible<()> {
    let states = render_states(&snapshot.states)?;
    let sql = "insert into snapshots (deck_name, head, states, cards_digest) values (?, ?, ?, ?) on conflict (deck_name) do update set head = excluded.head, states = excluded.states, cards_digest = excluded.cards_digest;";
    tx.execute(
        sql,
        (deck, snapshot.head.as_ref(), states, &snapshot.cards_digest),
    )?;
    Ok(())
}

fn probe_schema_exists(tx: &Transaction) -> Fallible<bool> {
    let sql = "select count(*) from sqlite_master where type='table' AND name=?;";
    let count: i64 = tx.query_row(sql, ["mutations"], |row| row.get(0))?;
    Ok(count > 0)
}
