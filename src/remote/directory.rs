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

//! A repository history kept in a plain directory:
//!
//! ```text
//! <root>/refs.json            branch name -> head sha
//! <root>/commits/<sha>.json   one file per commit, with its full tree
//! ```
//!
//! Every file is written to a temporary path and renamed into place, so a
//! reader never sees a partial write. Ref updates hold an exclusive lock on
//! `<root>/refs.lock`, so handles in other processes or on other machines
//! sharing the directory cannot both move a branch from the same parent.

use std::collections::BTreeMap;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use fs4::fs_std::FileExt;
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::Fallible;
use crate::error::fail;
use crate::remote::Commit;
use crate::remote::FileMap;
use crate::remote::PushOutcome;
use crate::remote::Remote;
use crate::remote::Sha;
use crate::remote::StoredCommit;
use crate::types::timestamp::Timestamp;

const REFS_FILE: &str = "refs.json";
const LOCK_FILE: &str = "refs.lock";
const COMMITS_DIR: &str = "commits";

type Refs = BTreeMap<String, Sha>;

pub struct DirectoryRemote {
    root: PathBuf,
    /// Serializes ref updates made through this handle. Other handles are
    /// kept out by the lock file.
    write_lock: Mutex<()>,
}

impl DirectoryRemote {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read_refs(&self) -> Fallible<Refs> {
        let path = self.root.join(REFS_FILE);
        match fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(refs) => Ok(refs),
                Err(e) => fail(format!("corrupt refs file {}: {e}", path.display())),
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if fs::metadata(&self.root).await.is_ok() {
                    Ok(Refs::new())
                } else {
                    fail(format!(
                        "remote directory {} does not exist",
                        self.root.display()
                    ))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Take the exclusive lock on the refs. It is released when the returned
    /// file is dropped.
    async fn lock_refs(&self) -> Fallible<File> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || -> Fallible<File> {
            let path = root.join(LOCK_FILE);
            let file = match OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&path)
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return fail(format!(
                        "remote directory {} does not exist",
                        root.display()
                    ));
                }
                Err(e) => return Err(e.into()),
            };
            file.lock_exclusive()?;
            Ok(file)
        })
        .await?
    }

    async fn write_refs(&self, refs: &Refs) -> Fallible<()> {
        let content = serde_json::to_string_pretty(refs)?;
        write_atomic(&self.root.join(REFS_FILE), &content).await
    }

    fn commit_path(&self, sha: &Sha) -> PathBuf {
        self.root
            .join(COMMITS_DIR)
            .join(format!("{}.json", sha.as_str()))
    }

    async fn read_commit(&self, sha: &Sha) -> Fallible<StoredCommit> {
        let path = self.commit_path(sha);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return fail(format!("unknown commit {sha}"));
            }
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&content) {
            Ok(commit) => Ok(commit),
            Err(e) => fail(format!("corrupt commit file {}: {e}", path.display())),
        }
    }

    async fn write_commit(&self, commit: &StoredCommit) -> Fallible<()> {
        fs::create_dir_all(self.root.join(COMMITS_DIR)).await?;
        let content = serde_json::to_string_pretty(commit)?;
        write_atomic(&self.commit_path(&commit.commit.sha), &content).await
    }
}

async fn write_atomic(path: &Path, content: &str) -> Fallible<()> {
    let path = path.to_path_buf();
    let content = content.to_string();
    tokio::task::spawn_blocking(move || -> Fallible<()> {
        let Some(dir) = path.parent() else {
            return fail(format!("no parent directory for {}", path.display()));
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    })
    .await?
}

impl Remote for DirectoryRemote {
    async fn is_reachable(&self) -> bool {
        match fs::metadata(&self.root).await {
            Ok(metadata) => metadata.is_dir(),
            Err(_) => false,
        }
    }

    async fn head(&self, branch: &str) -> Fallible<Option<Sha>> {
        let refs = self.read_refs().await?;
        Ok(refs.get(branch).cloned())
    }

    async fn list_files(&self, at: &Sha, prefix: &str) -> Fallible<FileMap> {
        let commit = self.read_commit(at).await?;
        Ok(commit.files_under(prefix))
    }

    async fn list_commits(&self, branch: &str) -> Fallible<Vec<Commit>> {
        let refs = self.read_refs().await?;
        let mut commits = Vec::new();
        let mut next = refs.get(branch).cloned();
        while let Some(sha) = next {
            let stored = self.read_commit(&sha).await?;
            next = stored.commit.parent.clone();
            commits.push(stored.commit);
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
        let _guard = self.write_lock.lock().await;
        let _lock = self.lock_refs().await?;
        let mut refs = self.read_refs().await?;
        if refs.get(branch) != parent {
            return Ok(PushOutcome::Conflict);
        }
        let parent = match parent {
            Some(sha) => Some(self.read_commit(sha).await?),
            None => None,
        };
        let commit = StoredCommit::build(parent.as_ref(), files, message, Timestamp::now());
        self.write_commit(&commit).await?;
        let sha = commit.commit.sha;
        refs.insert(branch.to_string(), sha.clone());
        self.write_refs(&refs).await?;
        log::debug!("{}: {branch} -> {}", self.root.display(), sha.short());
        Ok(PushOutcome::Pushed(sha))
    }

    async fn create_branch(&self, name: &str, from: &Sha) -> Fallible<()> {
        let _guard = self.write_lock.lock().await;
        let _lock = self.lock_refs().await?;
        let mut refs = self.read_refs().await?;
        if refs.contains_key(name) {
            return fail(format!("branch `{name}` already exists"));
        }
        self.read_commit(from).await?;
        refs.insert(name.to_string(), from.clone());
        self.write_refs(&refs).await
    }
}
