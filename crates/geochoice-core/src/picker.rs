//! The country → state → city picking session.
//!
//! `PlacePicker` owns the three slots and keeps each one consistent with
//! its parent's current selection:
//!
//! - a distinct change of a parent's selection cancels every load below it,
//!   clears the levels below, and starts a load for the child
//! - a `true` written to the retry trigger reloads every level in `Error`
//! - a saved selection is restored before the first load, so restoring
//!   never starts a load that is immediately thrown away
//!
//! Setup order is fixed: restore, load countries, wire country → state,
//! load states, wire state → city, load cities, wire retry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::api::RemoteSource;
use crate::cache::PlaceCache;
use crate::loader::{Flight, LoadJob, Problem};
use crate::models::{Level, PlaceId, NO_SELECTION};
use crate::observable::{Observable, Subscription};
use crate::persistence::SavedSelection;
use crate::slot::{LoadState, PlaceSlot};

struct LevelHandle {
    slot: Arc<PlaceSlot>,
    flight: Arc<Flight>,
}

struct Shared {
    levels: [LevelHandle; 3],
    problem: Observable<Problem>,
    retry_requested: Observable<bool>,
    cache: Arc<dyn PlaceCache>,
    remote: Arc<dyn RemoteSource>,
    limiter: Arc<Semaphore>,
    runtime: Handle,
    closed: AtomicBool,
    subscriptions: Mutex<Vec<Subscription>>,
}

pub struct PlacePicker {
    shared: Arc<Shared>,
}

impl PlacePicker {
    /// Build the session and start the initial loads.
    ///
    /// Must be called from within a Tokio runtime; loads are spawned on it.
    pub fn start(
        cache: Arc<dyn PlaceCache>,
        remote: Arc<dyn RemoteSource>,
        saved: Option<SavedSelection>,
        max_concurrent_loads: usize,
    ) -> Result<Self> {
        let runtime =
            Handle::try_current().context("PlacePicker must be started inside a Tokio runtime")?;

        let new_level = || LevelHandle {
            slot: Arc::new(PlaceSlot::for_places()),
            flight: Arc::new(Flight::default()),
        };
        let shared = Arc::new(Shared {
            levels: [new_level(), new_level(), new_level()],
            problem: Observable::new(None),
            retry_requested: Observable::new(false),
            cache,
            remote,
            limiter: Arc::new(Semaphore::new(max_concurrent_loads.max(1))),
            runtime,
            closed: AtomicBool::new(false),
            subscriptions: Mutex::new(Vec::new()),
        });

        if let Some(saved) = saved {
            shared.restore(&saved);
        }

        shared.load(Level::Country);
        shared.wire_cascade(Level::Country);
        shared.load(Level::State);
        shared.wire_cascade(Level::State);
        shared.load(Level::City);
        shared.wire_retry();

        info!(
            country = shared.slot(Level::Country).selected(),
            state = shared.slot(Level::State).selected(),
            city = shared.slot(Level::City).selected(),
            "Place picker started"
        );
        Ok(Self { shared })
    }

    pub fn countries(&self) -> &Arc<PlaceSlot> {
        self.shared.slot(Level::Country)
    }

    pub fn states(&self) -> &Arc<PlaceSlot> {
        self.shared.slot(Level::State)
    }

    pub fn cities(&self) -> &Arc<PlaceSlot> {
        self.shared.slot(Level::City)
    }

    pub fn slot(&self, level: Level) -> &Arc<PlaceSlot> {
        self.shared.slot(level)
    }

    /// Most recent load failure across all three levels.
    pub fn problem(&self) -> Problem {
        self.shared.problem.get()
    }

    pub fn subscribe_problem<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Problem, &Problem) + Send + Sync + 'static,
    {
        self.shared.problem.subscribe(listener)
    }

    /// Self-clearing retry trigger: write `true` to retry failed levels.
    pub fn retry_requested(&self) -> &Observable<bool> {
        &self.shared.retry_requested
    }

    pub fn request_retry(&self) {
        self.shared.retry_requested.set(true);
    }

    pub fn save(&self) -> SavedSelection {
        SavedSelection {
            country: self.countries().selected(),
            state: self.states().selected(),
            city: self.cities().selected(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Cancel every in-flight load and stop reacting to changes.
    pub fn teardown(&self) {
        self.shared.teardown();
    }

    #[cfg(test)]
    fn is_loading(&self, level: Level) -> bool {
        self.shared.handle(level).flight.is_running()
    }
}

impl Drop for PlacePicker {
    fn drop(&mut self) {
        self.shared.teardown();
    }
}

impl Shared {
    fn handle(&self, level: Level) -> &LevelHandle {
        &self.levels[level.index()]
    }

    fn slot(&self, level: Level) -> &Arc<PlaceSlot> {
        &self.handle(level).slot
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn restore(&self, saved: &SavedSelection) {
        for level in Level::ALL {
            self.slot(level).restore(saved.get(level));
        }
        debug!(?saved, "Selection restored");
    }

    /// Parent id a load of `level` is keyed on, `None` if the parent is unselected.
    fn parent_key(&self, level: Level) -> Option<PlaceId> {
        match level.parent() {
            None => Some(NO_SELECTION),
            Some(parent) => {
                let slot = self.slot(parent);
                slot.has_selection().then(|| slot.selected())
            }
        }
    }

    /// Start (or restart) the load of `level` for its parent's current selection.
    fn load(&self, level: Level) {
        if self.is_closed() {
            return;
        }
        let handle = self.handle(level);
        let Some(parent_id) = self.parent_key(level) else {
            handle.flight.cancel();
            debug!(level = %level, "Parent not selected, not loading");
            return;
        };

        let job = LoadJob {
            level,
            parent_id,
            slot: Arc::clone(&handle.slot),
            flight: Arc::clone(&handle.flight),
            problem: self.problem.clone(),
            cache: Arc::clone(&self.cache),
            remote: Arc::clone(&self.remote),
            limiter: Arc::clone(&self.limiter),
        };
        debug!(level = %level, parent_id, "Submitting load");
        handle.flight.launch(&self.runtime, |token| job.run(token));
    }

    fn wire_cascade(self: &Arc<Self>, parent: Level) {
        let weak: Weak<Shared> = Arc::downgrade(self);
        let subscription = self
            .slot(parent)
            .selected_id()
            .subscribe_distinct(move |_, selected: &PlaceId| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_selection_changed(parent, *selected);
                }
            });
        self.keep(subscription);
    }

    fn on_selection_changed(&self, parent: Level, selected: PlaceId) {
        let Some(child) = parent.child() else {
            return;
        };
        if self.is_closed() {
            return;
        }
        debug!(level = %parent, selected, "Selection changed, resetting {}", child);

        // Cancel before clearing so a superseded load cannot land on top of
        // the clear. Clearing the child re-enters here for the grandchild.
        for level in parent.descendants() {
            self.handle(level).flight.cancel();
        }
        for level in parent.descendants() {
            let slot = self.slot(level);
            slot.clear();
            slot.set_state(LoadState::Idle);
        }
        self.problem.set(None);

        self.load(child);
    }

    fn wire_retry(self: &Arc<Self>) {
        let weak: Weak<Shared> = Arc::downgrade(self);
        let subscription = self.retry_requested.subscribe(move |_, requested: &bool| {
            if !*requested {
                return;
            }
            if let Some(shared) = weak.upgrade() {
                shared.retry_requested.set(false);
                shared.retry_failed();
            }
        });
        self.keep(subscription);
    }

    fn retry_failed(&self) {
        for level in Level::ALL {
            if self.slot(level).state() == LoadState::Error {
                info!(level = %level, "Retrying failed load");
                self.load(level);
            }
        }
    }

    fn keep(&self, subscription: Subscription) {
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(subscription);
    }

    fn teardown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let subscriptions =
            std::mem::take(&mut *self.subscriptions.lock().unwrap_or_else(|e| e.into_inner()));
        drop(subscriptions);

        let mut cancelled = 0;
        for level in Level::ALL {
            if self.handle(level).flight.cancel() {
                cancelled += 1;
            }
        }
        self.limiter.close();
        info!(cancelled, "Place picker torn down");
    }
}
