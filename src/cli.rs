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

use clap::Parser;

use crate::cmd::check::check_collection;
use crate::cmd::drill::drill;
use crate::cmd::status::StatusFormat;
use crate::cmd::status::print_status;
use crate::cmd::sync::sync;
use crate::error::Fallible;

#[derive(Parser)]
#[command(version, about, long_about = None)]
enum Command {
    /// Review the cards due today.
    Drill {
        /// Path to the collection directory. By default, the current working directory is used.
        directory: Option<String>,
        /// The deck to review. May be omitted if the collection has one deck.
        #[arg(long)]
        deck: Option<String>,
        /// Do not sync when the session ends.
        #[arg(long)]
        offline: bool,
    },
    /// Replicate reviews to and from the remote repository.
    Sync {
        /// Path to the collection directory. By default, the current working directory is used.
        directory: Option<String>,
        /// Discard the write queue and start over from the remote.
        #[arg(long)]
        reset: bool,
    },
    /// Print pending reviews and the recent history of the remote.
    Status {
        /// Path to the collection directory. By default, the current working directory is used.
        directory: Option<String>,
        /// Output format.
        #[arg(long, default_value_t = StatusFormat::Text)]
        format: StatusFormat,
    },
    /// Check the integrity of a collection.
    Check {
        /// Path to the collection directory. By default, the current working directory is used.
        directory: Option<String>,
    },
}

pub async fn entrypoint() -> Fallible<()> {
    let cli: Command = Command::parse();
    match cli {
        Command::Drill {
            directory,
            deck,
            offline,
        } => drill(directory, deck, offline).await,
        Command::Sync { directory, reset } => sync(directory, reset).await,
        Command::Status { directory, format } => print_status(directory, format).await,
        Command::Check { directory } => check_collection(directory),
    }
}
