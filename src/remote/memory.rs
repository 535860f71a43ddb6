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

//! An in-memory remote for tests, with knobs for going offline, slowing
//! down, and committing on behalf of another device.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use crate::error::Fallible;
use crate::error::fail;
use crate::remote::Commit;
use crate::remote::FileMap;
use crate::remote::PushOutcome;
use crate::remote::Remote;
use crate::remote::Sha;
use crate::remote::StoredCommit;
use crate::types::timestamp::Timestamp;

#[derive(Default)]
struct Inner {
    branches: HashMap<String, Sha>,
    commits: HashMap<Sha, StoredCommit>,
    offline: bool,
    delay: Option<Duration>,
    /// Go offline once this many more pushes have succeeded.
    pushes_until_offline: Option<usize>,
    pushes: usize,
    /// Calls currently inside the delay, and the most there ever were.
    in_flight: usize,
    max_in_flight: usize,
}

#[derive(Default)]
pub struct MemoryRemote {
    inner: Mutex<Inner>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.acquire().offline = offline;
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.acquire().delay = delay;
    }

    pub fn go_offline_after(&self, pushes: usize) {
        self.acquire().pushes_until_offline = Some(pushes);
    }

    /// The number of commits pushed through the [`Remote`] interface.
    pub fn pushes(&self) -> usize {
        self.acquire().pushes
    }

    /// Commit directly on `branch`, as another device would.
    pub fn advance(&self, branch: &str, files: FileMap, message: &str) -> Sha {
        let mut inner = self.acquire();
        let parent = inner
            .branches
            .get(branch)
            .and_then(|sha| inner.commits.get(sha))
            .cloned();
        let commit = StoredCommit::build(parent.as_ref(), files, message, Timestamp::now());
        let sha = commit.commit.sha.clone();
        inner.commits.insert(sha.clone(), commit);
        inner.branches.insert(branch.to_string(), sha.clone());
        sha
    }

    /// A file's content at the head of a branch.
    pub fn file(&self, branch: &str, path: &str) -> Option<String> {
        let inner = self.acquire();
        let sha = inner.branches.get(branch)?;
        inner.commits.get(sha)?.tree.get(path).cloned()
    }

    pub fn branches(&self) -> Vec<String> {
        let mut names: Vec<String> = self.acquire().branches.keys().cloned().collect();
        names.sort();
        names
    }

    /// The most calls that were ever waiting out the delay at once.
    pub fn max_in_flight(&self) -> usize {
        self.acquire().max_in_flight
    }

    fn acquire(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    async fn enter(&self) -> Fallible<()> {
        let delay = self.acquire().delay;
        if let Some(delay) = delay {
            {
                let mut inner = self.acquire();
                inner.in_flight += 1;
                inner.max_in_flight = inner.max_in_flight.max(inner.in_flight);
            }
            tokio::time::sleep(delay).await;
            self.acquire().in_flight -= 1;
        }
        if self.acquire().offline {
            return fail("remote is offline");
        }
        Ok(())
    }
}

impl Remote for MemoryRemote {
    async fn is_reachable(&self) -> bool {
        !self.acquire().offline
    }

    async fn head(&self, branch: &str) -> Fallible<Option<Sha>> {
        self.enter().await?;
        Ok(self.acquire().branches.get(branch).cloned())
    }

    async fn list_files(&self, at: &Sha, prefix: &str) -> Fallible<FileMap> {
        self.enter().await?;
        match self.acquire().commits.get(at) {
            Some(commit) => Ok(commit.files_under(prefix)),
            None => fail(format!("unknown commit {at}")),
        }
    }

    async fn list_commits(&self, branch: &str) -> Fallible<Vec<Commit>> {
        self.enter().await?;
        let inner = self.acquire();
        let mut commits = Vec::new();
        let mut next = inner.branches.get(branch).cloned();
        while let Some(sha) = next {
            let Some(stored) = inner.commits.get(&sha) else {
                return fail(format!("unknown commit {sha}"));
            };
            next = stored.commit.parent.clone();
            commits.push(stored.commit.clone());
        }
        Ok(commits)
    }

    async fn push_commit(
        &self,
        branch: &str,
        parent: Option<&Sha>,
        files: FileMap,
        message: &str,
    ) -> Fallible<PushOutcome> {
        self.enter().await?;
        let mut inner = self.acquire();
        if inner.branches.get(branch) != parent {
            return Ok(PushOutcome::Conflict);
        }
        let parent = parent.and_then(|sha| inner.commits.get(sha)).cloned();
        let commit = StoredCommit::build(parent.as_ref(), files, message, Timestamp::now());
        let sha = commit.commit.sha.clone();
        inner.commits.insert(sha.clone(), commit);
        inner.branches.insert(branch.to_string(), sha.clone());
        inner.pushes += 1;
        if let Some(left) = inner.pushes_until_offline {
            if left <= 1 {
                inner.offline = true;
                inner.pushes_until_offline = None;
            } else {
                inner.pushes_until_offline = Some(left - 1);
            }
        }
        Ok(PushOutcome::Pushed(sha))
    }

    async fn create_branch(&self, name: &str, from: &Sha) -> Fallible<()> {
        self.enter().await?;
        let mut inner = self.acquire();
        if inner.branches.contains_key(name) {
            return fail(format!("branch `{name}` already exists"));
        }
        if !inner.commits.contains_key(from) {
            return fail(format!("unknown commit {from}"));
        }
        inner.branches.insert(name.to_string(), from.clone());
        Ok(())
    }
}
