use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::store::{CacheError, PlaceCache};
use crate::models::{Level, Place, PlaceId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    /// Short human age such as "just now", "12m ago", "3h ago", "2d ago".
    pub fn age_display(&self) -> String {
        match self.age_minutes() {
            // Negative means clock skew
            m if m < 1 => "just now".to_string(),
            m if m < 60 => format!("{}m ago", m),
            m if m < 1440 => format!("{}h ago", m / 60),
            m => format!("{}d ago", m / 1440),
        }
    }
}

/// File-backed cache: `{cache_dir}/{table}.json` per level.
///
/// Clone is cheap and clones share the write lock.
#[derive(Clone)]
pub struct JsonPlaceCache {
    tables: Arc<Tables>,
}

struct Tables {
    cache_dir: PathBuf,
    /// Serialises read-modify-write of a table.
    write_lock: Mutex<()>,
}

impl JsonPlaceCache {
    pub fn new(cache_dir: PathBuf) -> anyhow::Result<Self> {
        fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            tables: Arc::new(Tables {
                cache_dir,
                write_lock: Mutex::new(()),
            }),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.tables.cache_dir
    }

    /// When the level's table was last written, for display.
    pub fn table_age(&self, level: Level) -> Option<String> {
        match self.tables.load(level) {
            Ok(cached) => cached.map(|c| c.age_display()),
            Err(e) => {
                debug!(table = level.table(), error = %e, "Failed to load cache for age display");
                None
            }
        }
    }

    async fn blocking<R, F>(&self, work: F) -> Result<R, CacheError>
    where
        R: Send + 'static,
        F: FnOnce(&Tables) -> Result<R, CacheError> + Send + 'static,
    {
        let tables = Arc::clone(&self.tables);
        tokio::task::spawn_blocking(move || work(&tables))
            .await
            .map_err(|e| CacheError::Worker(e.to_string()))?
    }
}

impl Tables {
    fn table_path(&self, level: Level) -> PathBuf {
        self.cache_dir.join(format!("{}.json", level.table()))
    }

    fn load(&self, level: Level) -> Result<Option<CachedData<Vec<Place>>>, CacheError> {
        let path = self.table_path(level);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn select(&self, level: Level, parent_id: PlaceId) -> Result<Vec<Place>, CacheError> {
        let mut rows: Vec<Place> = match self.load(level)? {
            Some(cached) => cached
                .data
                .into_iter()
                .filter(|p| p.parent_id == parent_id)
                .collect(),
            None => Vec::new(),
        };
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    fn insert_all(&self, level: Level, places: &[Place], parent_id: PlaceId) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut rows = self.load(level)?.map(|c| c.data).unwrap_or_default();
        for place in places {
            let stamped = place.stamped(parent_id);
            match rows.iter_mut().find(|row| row.id == stamped.id) {
                Some(existing) => *existing = stamped,
                None => rows.push(stamped),
            }
        }

        // Write beside the table, then swap it in: readers see the old
        // table or the new one, never a partial file.
        let path = self.table_path(level);
        let tmp = path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(&CachedData::new(rows))?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(contents.as_bytes())?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl PlaceCache for JsonPlaceCache {
    async fn query(&self, level: Level, parent_id: PlaceId) -> Result<Vec<Place>, CacheError> {
        self.blocking(move |tables| tables.select(level, parent_id)).await
    }

    async fn write_transaction(
        &self,
        level: Level,
        places: &[Place],
        parent_id: PlaceId,
    ) -> Result<(), CacheError> {
        let places = places.to_vec();
        self.blocking(move |tables| tables.insert_all(level, &places, parent_id))
            .await
    }
}

// ============================================================================
// Tests
// ============================================================================
