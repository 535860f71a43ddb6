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

//! The capability the sync engine needs from a remote repository, and the
//! repository layout it understands.

pub mod directory;
#[cfg(test)]
pub mod memory;

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fmt::Formatter;
use std::future::Future;

use rusqlite::ToSql;
use rusqlite::types::FromSql;
use rusqlite::types::FromSqlResult;
use rusqlite::types::ToSqlOutput;
use rusqlite::types::ValueRef;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Fallible;
use crate::types::deck::DeckName;
use crate::types::timestamp::Timestamp;

pub const CARDS_FILE: &str = "cards.json";
pub const STATE_FILE: &str = "state.json";

/// Repository path of one of a deck's files.
pub fn deck_file(deck: &DeckName, file: &str) -> String {
    format!("{deck}/{file}")
}

/// Whether a repository path belongs to a deck.
pub fn touches_deck(path: &str, deck: &DeckName) -> bool {
    path.strip_prefix(deck.as_str())
        .is_some_and(|rest| rest.starts_with('/'))
}

/// A commit identifier.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sha(String);

impl Sha {
    pub fn new(sha: impl Into<String>) -> Self {
        Self(sha.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first eight characters.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl Display for Sha {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToSql for Sha {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.as_str()))
    }
}

impl FromSql for Sha {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let string: String = FromSql::column_result(value)?;
        Ok(Sha(string))
    }
}

/// Repository path to file content.
pub type FileMap = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub sha: Sha,
    pub parent: Option<Sha>,
    pub message: String,
    /// Paths changed by this commit.
    pub files: Vec<String>,
    pub timestamp: Timestamp,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PushOutcome {
    /// The commit is the new head of the branch.
    Pushed(Sha),
    /// The branch head is not the parent the commit was built on.
    Conflict,
}

/// A remote repository. Every method may fail with a transport error; a
/// rejected push because of a moved head is not an error but
/// [`PushOutcome::Conflict`].
pub trait Remote: Send + Sync + 'static {
    /// Whether the remote can be reached right now.
    fn is_reachable(&self) -> impl Future<Output = bool> + Send;

    /// The head of a branch, or `None` if the branch has no commits.
    fn head(&self, branch: &str) -> impl Future<Output = Fallible<Option<Sha>>> + Send;

    /// All files at commit `at` whose path starts with `prefix`.
    fn list_files(&self, at: &Sha, prefix: &str)
    -> impl Future<Output = Fallible<FileMap>> + Send;

    /// The commits reachable from a branch head, newest first.
    fn list_commits(&self, branch: &str) -> impl Future<Output = Fallible<Vec<Commit>>> + Send;

    /// Create a commit on `branch` that writes `files` on top of `parent`.
    /// Succeeds only if `parent` is the branch's current head (`None` for a
    /// branch that does not exist yet).
    fn push_commit(
        &self,
        branch: &str,
        parent: Option<&Sha>,
        files: FileMap,
        message: &str,
    ) -> impl Future<Output = Fallible<PushOutcome>> + Send;

    /// Create a branch pointing at an existing commit. Fails if the branch
    /// already exists.
    fn create_branch(&self, name: &str, from: &Sha) -> impl Future<Output = Fallible<()>> + Send;
}

/// The full tree of a commit, as kept by the bundled remotes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct StoredCommit {
    #[serde(flatten)]
    pub commit: Commit,
    pub tree: FileMap,
}

impl StoredCommit {
    pub fn build(
        parent: Option<&StoredCommit>,
        files: FileMap,
        message: &str,
        timestamp: Timestamp,
    ) -> Self {
        let mut tree = parent.map(|p| p.tree.clone()).unwrap_or_default();
        let changed: Vec<String> = files.keys().cloned().collect();
        tree.extend(files);

        let mut hasher = blake3::Hasher::new();
        if let Some(parent) = parent {
            hasher.update(parent.commit.sha.as_str().as_bytes());
        }
        hasher.update(message.as_bytes());
        hasher.update(timestamp.to_rfc3339().as_bytes());
        for (path, content) in &tree {
            hasher.update(path.as_bytes());
            hasher.update(&(content.len() as u64).to_le_bytes());
            hasher.update(content.as_bytes());
        }
        let sha = Sha(hasher.finalize().to_hex().to_string());

        Self {
            commit: Commit {
                sha,
                parent: parent.map(|p| p.commit.sha.clone()),
                message: message.to_string(),
                files: changed,
                timestamp,
            },
            tree,
        }
    }

    pub fn files_under(&self, prefix: &str) -> FileMap {
        self.tree
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(path, content)| (path.clone(), content.clone()))
            .collect()
    }
}
