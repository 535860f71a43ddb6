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
use std::str::FromStr;

use rusqlite::ToSql;
use rusqlite::types::FromSql;
use rusqlite::types::FromSqlError;
use rusqlite::types::FromSqlResult;
use rusqlite::types::ToSqlOutput;
use rusqlite::types::ValueRef;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de::Error as _;

use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::error::fail;

const REVERSE_SUFFIX: &str = ":reverse";

/// The key of a schedulable unit: a card's own id, or `<id>:reverse` for the
/// reverse side of a reversible card. Each identity has its own state.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct CardId {
    card: String,
    reverse: bool,
}

impl CardId {
    pub fn forward(card: impl Into<String>) -> Self {
        Self {
            card: card.into(),
            reverse: false,
        }
    }

    pub fn reverse(card: impl Into<String>) -> Self {
        Self {
            card: card.into(),
            reverse: true,
        }
    }

    /// The id of the underlying card.
    pub fn card(&self) -> &str {
        &self.card
    }

    pub fn is_reverse(&self) -> bool {
        self.reverse
    }
}

/// Card ids must be non-empty and must not contain `:`, which is reserved for
/// the reverse suffix.
pub fn validate_card_id(id: &str) -> Fallible<()> {
    if id.trim().is_empty() {
        return fail("card id must not be empty.");
    }
    if id.contains(':') {
        return fail(format!("card id `{id}` must not contain ':'."));
    }
    Ok(())
}

impl Display for CardId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.reverse {
            write!(f, "{}{}", self.card, REVERSE_SUFFIX)
        } else {
            write!(f, "{}", self.card)
        }
    }
}

impl FromStr for CardId {
    type Err = ErrorReport;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (card, reverse) = match s.strip_suffix(REVERSE_SUFFIX) {
            Some(card) => (card, true),
            None => (s, false),
        };
        validate_card_id(card)?;
        Ok(Self {
            card: card.to_string(),
            reverse,
        })
    }
}

impl Serialize for CardId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CardId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(deserializer)?;
        string.parse().map_err(|e: ErrorReport| D::Error::custom(e.message()))
    }
}

impl ToSql for CardId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for CardId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let string: String = FromSql::column_result(value)?;
        string
            .parse()
            .map_err(|e: ErrorReport| FromSqlError::Other(Box::new(e)))
    }
}
