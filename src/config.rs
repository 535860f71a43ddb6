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

//! The collection's `gitcards.toml`. Every key is optional.

use std::fs::read_to_string;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Fallible;
use crate::error::fail;
use crate::session::Policy;

pub const CONFIG_FILE: &str = "gitcards.toml";

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where the remote repository lives.
    pub remote: Option<RepositoryLocation>,
    /// The branch reviews are replicated to.
    pub branch: String,
    pub review: Policy,
    pub sync: SyncConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote: None,
            branch: "main".to_string(),
            review: Policy::default(),
            sync: SyncConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct RepositoryLocation(PathBuf);

impl RepositoryLocation {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Relative locations are relative to the collection directory.
    fn resolve(&mut self, base: &Path) {
        if self.0.is_relative() {
            self.0 = base.join(&self.0);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub timeout_secs: u64,
    /// The most mutations pushed per deck in one sync.
    pub batch_size: usize,
    /// How many commits the status keeps.
    pub recent_commits: usize,
    /// Sync this often while drilling. Unset means only on request.
    pub interval_secs: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            batch_size: 50,
            recent_commits: 10,
            interval_secs: None,
        }
    }
}

impl SyncConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval_secs.map(Duration::from_secs)
    }
}

impl Config {
    pub fn parse(content: &str) -> Fallible<Self> {
        let config: Config = toml::from_str(content)?;
        if config.branch.trim().is_empty() {
            return fail("branch must not be empty");
        }
        if config.sync.batch_size == 0 {
            return fail("sync.batch_size must be at least 1");
        }
        if config.sync.timeout_secs == 0 {
            return fail("sync.timeout_secs must be at least 1");
        }
        if config.sync.interval_secs == Some(0) {
            return fail("sync.interval_secs must be at least 1");
        }
        Ok(config)
    }

    /// Load `gitcards.toml` from a collection directory. A missing file means
    /// the defaults.
    pub fn load(directory: &Path) -> Fallible<Self> {
        let path = directory.join(CONFIG_FILE);
        if !path.exists() {
            log::debug!("No {CONFIG_FILE}, using defaults.");
            return Ok(Self::default());
        }
        let mut config = match Self::parse(&read_to_string(&path)?) {
            Ok(config) => config,
            Err(e) => return fail(format!("{}: {}", path.display(), e.message())),
        };
        if let Some(remote) = &mut config.remote {
            remote.resolve(directory);
        }
        Ok(config)
    }
}
