//! Persisted selection: the three selected ids, nothing else.
//!
//! Item lists and error state are never saved; they are rebuilt from the
//! cache (or the network) when the session starts again.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{Level, PlaceId, NO_SELECTION};

/// Selection file name in the data directory
const SELECTION_FILE: &str = "selection.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSelection {
    pub country: PlaceId,
    pub state: PlaceId,
    pub city: PlaceId,
}

impl Default for SavedSelection {
    fn default() -> Self {
        Self {
            country: NO_SELECTION,
            state: NO_SELECTION,
            city: NO_SELECTION,
        }
    }
}

impl SavedSelection {
    pub fn get(&self, level: Level) -> PlaceId {
        match level {
            Level::Country => self.country,
            Level::State => self.state,
            Level::City => self.city,
        }
    }

    /// Scalar fields in fixed order: country, state, city.
    pub fn to_fields(&self) -> [PlaceId; 3] {
        [self.country, self.state, self.city]
    }

    pub fn from_fields(fields: &[PlaceId]) -> Result<Self> {
        match *fields {
            [country, state, city] => Ok(Self {
                country,
                state,
                city,
            }),
            _ => Err(anyhow::anyhow!(
                "Expected 3 selection fields (country, state, city), got {}",
                fields.len()
            )),
        }
    }
}

/// Reads and writes `selection.json` under a data directory.
pub struct SelectionStore {
    data_dir: PathBuf,
}

impl SelectionStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// `Ok(None)` when nothing has been saved yet.
    pub fn load(&self) -> Result<Option<SavedSelection>> {
        let path = self.selection_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read selection file")?;
        let fields: Vec<PlaceId> =
            serde_json::from_str(&contents).context("Failed to parse selection file")?;
        SavedSelection::from_fields(&fields).map(Some)
    }

    pub fn save(&self, selection: &SavedSelection) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        let contents = serde_json::to_string(&selection.to_fields())?;
        std::fs::write(self.selection_path(), contents).context("Failed to write selection file")?;
        Ok(())
    }

    fn selection_path(&self) -> PathBuf {
        self.data_dir.join(SELECTION_FILE)
    }
}
