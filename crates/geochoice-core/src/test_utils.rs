//! Recording fakes for the cache and network seams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::api::{ApiError, RemoteSource};
use crate::cache::{CacheError, PlaceCache};
use crate::models::{Level, Place, PlaceId};

pub fn place(id: PlaceId, parent_id: PlaceId, name: &str) -> Place {
    Place::new(id, parent_id, name)
}

/// Poll `condition` until it holds, panicking after a few seconds.
pub async fn wait_for(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached within 5s");
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

#[derive(Default)]
pub struct FakeCache {
    tables: Mutex<HashMap<Level, Vec<Place>>>,
    queries: Mutex<Vec<(Level, PlaceId)>>,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FakeCache {
    pub fn seed(&self, level: Level, places: Vec<Place>) {
        self.tables.lock().unwrap().entry(level).or_default().extend(places);
    }

    pub fn rows(&self, level: Level) -> Vec<Place> {
        self.tables.lock().unwrap().get(&level).cloned().unwrap_or_default()
    }

    pub fn queries(&self, level: Level) -> usize {
        self.queries.lock().unwrap().iter().filter(|(l, _)| *l == level).count()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

fn broken() -> CacheError {
    CacheError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk unplugged"))
}

#[async_trait]
impl PlaceCache for FakeCache {
    async fn query(&self, level: Level, parent_id: PlaceId) -> Result<Vec<Place>, CacheError> {
        self.queries.lock().unwrap().push((level, parent_id));
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(broken());
        }
        let mut rows: Vec<Place> = self
            .rows(level)
            .into_iter()
            .filter(|p| p.parent_id == parent_id)
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn write_transaction(
        &self,
        level: Level,
        places: &[Place],
        parent_id: PlaceId,
    ) -> Result<(), CacheError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(broken());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        let stamped = places.iter().map(|p| p.stamped(parent_id)).collect();
        self.seed(level, stamped);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRemote {
    responses: Mutex<HashMap<(Level, PlaceId), Vec<Place>>>,
    calls: Mutex<Vec<(Level, PlaceId)>>,
    fail_all: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeRemote {
    pub fn respond(&self, level: Level, parent_id: PlaceId, places: Vec<Place>) {
        self.responses.lock().unwrap().insert((level, parent_id), places);
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self, level: Level, parent_id: PlaceId) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| **call == (level, parent_id))
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Make every later fetch wait for a permit on the returned semaphore.
    pub fn hold(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    async fn answer(&self, level: Level, parent_id: PlaceId) -> Result<Vec<Place>, ApiError> {
        self.calls.lock().unwrap().push((level, parent_id));
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(ApiError::ServerError("directory unavailable".to_string()));
        }
        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(&(level, parent_id))
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl RemoteSource for FakeRemote {
    async fn fetch_countries(&self) -> Result<Vec<Place>, ApiError> {
        self.answer(Level::Country, crate::models::NO_SELECTION).await
    }

    async fn fetch_states(&self, country_id: PlaceId) -> Result<Vec<Place>, ApiError> {
        self.answer(Level::State, country_id).await
    }

    async fn fetch_cities(&self, state_id: PlaceId) -> Result<Vec<Place>, ApiError> {
        self.answer(Level::City, state_id).await
    }
}
