//! Cache-then-remote loading of one level's list.
//!
//! A load reads the cache for the parent, falls back to the network when
//! the cache has nothing, and persists what the network returned before
//! publishing it. Every publish goes through the level's `Flight`, which
//! refuses writes from a load that has been superseded or cancelled.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{ApiError, RemoteSource};
use crate::cache::{CacheError, PlaceCache};
use crate::models::{Level, Place, PlaceId};
use crate::observable::Observable;
use crate::slot::{LoadState, PlaceSlot};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Cache read failed: {0}")]
    CacheRead(#[source] CacheError),

    #[error("Network request failed: {0}")]
    Network(#[from] ApiError),

    #[error("Cache write failed: {0}")]
    CachePersist(#[source] CacheError),
}

/// A failed load, as reported through the shared problem value.
#[derive(Error, Debug)]
#[error("Failed to load {level} list: {error}")]
pub struct LoadFailure {
    pub level: Level,
    #[source]
    pub error: LoadError,
}

/// Most recent load failure across all levels, `None` after a success.
pub type Problem = Option<Arc<LoadFailure>>;

// ============================================================================
// Single flight per slot
// ============================================================================

struct InFlight {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// The one outstanding load of a level, if any.
///
/// Cancelling and publishing both take the same lock, so once `cancel`
/// returns the cancelled load can no longer write to the slot.
#[derive(Default)]
pub(crate) struct Flight {
    current: Mutex<Option<InFlight>>,
}

impl Flight {
    fn lock(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cancel the previous load and spawn the one built by `start`.
    pub(crate) fn launch<F, Fut>(&self, runtime: &Handle, start: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let mut current = self.lock();
        if let Some(previous) = current.take() {
            previous.token.cancel();
        }
        let handle = runtime.spawn(start(token.clone()));
        *current = Some(InFlight { token, handle });
    }

    /// Returns true if a load was still registered.
    pub(crate) fn cancel(&self) -> bool {
        match self.lock().take() {
            Some(previous) => {
                previous.token.cancel();
                !previous.handle.is_finished()
            }
            None => false,
        }
    }

    /// Run `write` unless `token` was cancelled, holding the flight lock.
    fn guarded<R>(&self, token: &CancellationToken, write: impl FnOnce() -> R) -> Option<R> {
        let _current = self.lock();
        if token.is_cancelled() {
            None
        } else {
            Some(write())
        }
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .map(|f| !f.handle.is_finished())
            .unwrap_or(false)
    }
}

// ============================================================================
// Load job
// ============================================================================

/// Everything one load of one level needs; runs as its own task.
pub(crate) struct LoadJob {
    pub level: Level,
    pub parent_id: PlaceId,
    pub slot: Arc<PlaceSlot>,
    pub flight: Arc<Flight>,
    pub problem: Observable<Problem>,
    pub cache: Arc<dyn PlaceCache>,
    pub remote: Arc<dyn RemoteSource>,
    pub limiter: Arc<Semaphore>,
}

impl LoadJob {
    pub(crate) async fn run(self, token: CancellationToken) {
        if !self.publish(&token, LoadState::Loading, None, None) {
            return;
        }

        let _permit = tokio::select! {
            biased;
            _ = token.cancelled() => return self.cancelled(),
            permit = Arc::clone(&self.limiter).acquire_owned() => match permit {
                Ok(permit) => permit,
                // Closed semaphore: the session is gone.
                Err(_) => return self.cancelled(),
            },
        };

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => return self.cancelled(),
            outcome = self.resolve() => outcome,
        };

        match outcome {
            Ok(items) => {
                let state = if items.is_empty() {
                    LoadState::Empty
                } else {
                    LoadState::Ok
                };
                debug!(level = %self.level, parent_id = self.parent_id, count = items.len(), "Load complete");
                self.publish(&token, state, Some(items), Some(None));
            }
            Err(error) => {
                warn!(level = %self.level, parent_id = self.parent_id, error = %error, "Load failed");
                let failure = Arc::new(LoadFailure {
                    level: self.level,
                    error,
                });
                if !self.publish(&token, LoadState::Error, None, Some(Some(failure))) {
                    debug!(level = %self.level, "Failure of a superseded load discarded");
                }
            }
        }
    }

    /// Cache first; on an empty cache, fetch and persist.
    async fn resolve(&self) -> Result<Vec<Place>, LoadError> {
        let cached = self
            .cache
            .query(self.level, self.parent_id)
            .await
            .map_err(LoadError::CacheRead)?;
        if !cached.is_empty() {
            debug!(level = %self.level, parent_id = self.parent_id, count = cached.len(), "Serving from cache");
            return Ok(cached);
        }

        debug!(level = %self.level, parent_id = self.parent_id, "Cache empty, fetching from network");
        let fetched = self.remote.fetch(self.level, self.parent_id).await?;
        if !fetched.is_empty() {
            self.cache
                .write_transaction(self.level, &fetched, self.parent_id)
                .await
                .map_err(LoadError::CachePersist)?;
        }
        Ok(fetched
            .iter()
            .map(|place| place.stamped(self.parent_id))
            .collect())
    }

    /// Write items (optional), state and problem (optional) together.
    ///
    /// Listeners run after the flight lock is released; in order items,
    /// problem, state. Returns false if the load has been cancelled.
    fn publish(
        &self,
        token: &CancellationToken,
        state: LoadState,
        items: Option<Vec<Place>>,
        problem: Option<Problem>,
    ) -> bool {
        let staged = self.flight.guarded(token, || {
            let items = items.map(|items| self.slot.stage_items(items));
            let problem = problem.map(|problem| self.problem.stage(problem));
            let state = self.slot.stage_state(state);
            (items, problem, state)
        });

        match staged {
            Some((items, problem, state)) => {
                if let Some(change) = items {
                    change.notify();
                }
                if let Some(change) = problem {
                    change.notify();
                }
                state.notify();
                true
            }
            None => false,
        }
    }

    fn cancelled(&self) {
        debug!(level = %self.level, parent_id = self.parent_id, "Load cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NO_SELECTION;
    use crate::test_utils::{place, wait_for, FakeCache, FakeRemote};

    struct Harness {
        slot: Arc<PlaceSlot>,
        flight: Arc<Flight>,
        problem: Observable<Problem>,
        cache: Arc<FakeCache>,
        remote: Arc<FakeRemote>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                slot: Arc::new(PlaceSlot::for_places()),
                flight: Arc::new(Flight::default()),
                problem: Observable::new(None),
                cache: Arc::new(FakeCache::default()),
                remote: Arc::new(FakeRemote::default()),
            }
        }

        fn job(&self, level: Level, parent_id: PlaceId) -> LoadJob {
            LoadJob {
                level,
                parent_id,
                slot: Arc::clone(&self.slot),
                flight: Arc::clone(&self.flight),
                problem: self.problem.clone(),
                cache: self.cache.clone(),
                remote: self.remote.clone(),
                limiter: Arc::new(Semaphore::new(1)),
            }
        }

        fn launch(&self, level: Level, parent_id: PlaceId) {
            let job = self.job(level, parent_id);
            self.flight.launch(&Handle::current(), |token| job.run(token));
        }

        async fn settled(&self) {
            let slot = Arc::clone(&self.slot);
            let flight = Arc::clone(&self.flight);
            wait_for(move || slot.state().is_settled() && !flight.is_running()).await;
        }
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let h = Harness::new();
        h.cache.seed(Level::State, vec![place(11, 1, "Texas"), place(10, 1, "Alabama")]);
        h.remote.respond(Level::State, 1, vec![place(99, 1, "Nowhere")]);

        h.launch(Level::State, 1);
        h.settled().await;

        assert_eq!(h.slot.state(), LoadState::Ok);
        let names: Vec<String> = h.slot.items().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Alabama", "Texas"]);
        assert_eq!(h.remote.calls(Level::State, 1), 0);
    }

    #[tokio::test]
    async fn test_cache_miss_fetches_and_persists_once() {
        let h = Harness::new();
        h.remote.respond(
            Level::City,
            48,
            vec![place(100, NO_SELECTION, "Austin"), place(101, NO_SELECTION, "Houston")],
        );

        h.launch(Level::City, 48);
        h.settled().await;

        assert_eq!(h.slot.state(), LoadState::Ok);
        assert!(h.slot.items().iter().all(|p| p.parent_id == 48));
        let stored = h.cache.rows(Level::City);
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|p| p.parent_id == 48));
        assert_eq!(h.cache.writes(), 1);

        h.launch(Level::City, 48);
        h.settled().await;

        assert_eq!(h.remote.calls(Level::City, 48), 1);
        assert_eq!(h.slot.items().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_remote_result_is_empty_state() {
        let h = Harness::new();
        h.remote.respond(Level::City, 7, vec![]);

        h.launch(Level::City, 7);
        h.settled().await;

        assert_eq!(h.slot.state(), LoadState::Empty);
        assert!(h.slot.items().is_empty());
        assert!(h.problem.get().is_none());
    }

    #[tokio::test]
    async fn test_network_failure_sets_error_and_problem() {
        let h = Harness::new();
        h.remote.fail_all(true);

        h.launch(Level::Country, NO_SELECTION);
        h.settled().await;

        assert_eq!(h.slot.state(), LoadState::Error);
        assert!(h.slot.items().is_empty());
        let problem = h.problem.get().expect("problem should be set");
        assert_eq!(problem.level, Level::Country);
        assert!(matches!(problem.error, LoadError::Network(_)));
    }

    #[tokio::test]
    async fn test_cache_read_and_persist_failures_are_reported() {
        let h = Harness::new();
        h.cache.fail_reads(true);
        h.launch(Level::Country, NO_SELECTION);
        h.settled().await;
        assert!(matches!(
            h.problem.get().map(|p| matches!(p.error, LoadError::CacheRead(_))),
            Some(true)
        ));

        h.cache.fail_reads(false);
        h.cache.fail_writes(true);
        h.remote.respond(Level::Country, NO_SELECTION, vec![place(1, NO_SELECTION, "USA")]);
        h.launch(Level::Country, NO_SELECTION);
        h.settled().await;

        assert_eq!(h.slot.state(), LoadState::Error);
        // Nothing is published when the write fails.
        assert!(h.slot.items().is_empty());
        assert!(h.cache.rows(Level::Country).is_empty());
        assert!(matches!(
            h.problem.get().map(|p| matches!(p.error, LoadError::CachePersist(_))),
            Some(true)
        ));
    }

    #[tokio::test]
    async fn test_success_clears_previous_problem() {
        let h = Harness::new();
        h.remote.fail_all(true);
        h.launch(Level::Country, NO_SELECTION);
        h.settled().await;
        assert!(h.problem.get().is_some());

        h.remote.fail_all(false);
        h.remote.respond(Level::Country, NO_SELECTION, vec![place(1, NO_SELECTION, "USA")]);
        h.launch(Level::Country, NO_SELECTION);
        h.settled().await;

        assert_eq!(h.slot.state(), LoadState::Ok);
        assert!(h.problem.get().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_load_publishes_nothing() {
        let h = Harness::new();
        h.remote.fail_all(true);
        let gate = h.remote.hold();

        h.launch(Level::State, 3);
        let remote = Arc::clone(&h.remote);
        wait_for(move || remote.calls(Level::State, 3) == 1).await;
        assert_eq!(h.slot.state(), LoadState::Loading);

        assert!(h.flight.cancel());
        gate.add_permits(1);
        let flight = Arc::clone(&h.flight);
        wait_for(move || !flight.is_running()).await;

        // Still the last value written before cancellation, no Error.
        assert_eq!(h.slot.state(), LoadState::Loading);
        assert!(h.problem.get().is_none());
    }

    #[tokio::test]
    async fn test_relaunch_supersedes_previous_load() {
        let h = Harness::new();
        h.remote.respond(Level::State, 1, vec![place(10, 1, "Texas")]);
        h.remote.respond(Level::State, 2, vec![place(20, 2, "Ontario")]);
        let gate = h.remote.hold();

        h.launch(Level::State, 1);
        let remote = Arc::clone(&h.remote);
        wait_for(move || remote.calls(Level::State, 1) == 1).await;

        h.launch(Level::State, 2);
        gate.add_permits(2);
        h.settled().await;

        let names: Vec<String> = h.slot.items().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Ontario"]);
    }
}
