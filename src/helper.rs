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

use std::fs::create_dir_all;
use std::fs::write;
use std::path::Path;

use crate::error::Fallible;
use crate::remote::CARDS_FILE;
use crate::remote::STATE_FILE;

/// Four cards, two of them reversible: six card identities.
pub const CARDS_JSON: &str = r#"{
    "hola": {
        "source": "hola",
        "translation": "hello",
        "example": "¡Hola, amigo!",
        "created": "2025-01-01T00:00:00Z",
        "reversible": true
    },
    "gato": {
        "source": "el gato",
        "translation": "the cat",
        "tags": ["animals"],
        "created": "2025-01-01T00:00:00Z",
        "reversible": true
    },
    "perro": {
        "source": "el perro",
        "translation": "the dog",
        "tags": ["animals"],
        "created": "2025-01-02T00:00:00Z"
    },
    "casa": {
        "source": "la casa",
        "translation": "the house",
        "created": "2025-01-03T00:00:00Z"
    }
}"#;

/// Write a deck directory under `decks`.
pub fn write_deck(decks: &Path, name: &str, cards: &str, states: Option<&str>) -> Fallible<()> {
    let dir = decks.join(name);
    create_dir_all(&dir)?;
    write(dir.join(CARDS_FILE), cards)?;
    if let Some(states) = states {
        write(dir.join(STATE_FILE), states)?;
    }
    Ok(())
}

/// Write a collection directory with a `spanish` deck and the given config.
pub fn write_collection(root: &Path, config: &str) -> Fallible<()> {
    write(root.join("gitcards.toml"), config)?;
    write_deck(&root.join("decks"), "spanish", CARDS_JSON, None)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::types::card::parse_cards;

    #[test]
    fn test_write_collection() -> Fallible<()> {
        let dir = tempdir()?;
        write_collection(dir.path(), "")?;
        let cards = std::fs::read_to_string(dir.path().join("decks/spanish/cards.json"))?;
        assert_eq!(parse_cards(&cards)?.len(), 4);
        Ok(())
    }
}
