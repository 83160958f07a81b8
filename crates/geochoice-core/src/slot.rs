//! Choice slots: one selectable list with its load lifecycle.

use crate::models::{Place, PlaceId, NO_SELECTION};
use crate::observable::{Change, Observable, Subscription};

/// Lifecycle of a slot's item list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// Nothing requested (or the parent selection is empty).
    #[default]
    Idle,
    Loading,
    /// Loaded, at least one item.
    Ok,
    /// Loaded successfully, zero items.
    Empty,
    /// The last load failed; see the session's problem value.
    Error,
}

impl LoadState {
    pub fn is_settled(&self) -> bool {
        !matches!(self, LoadState::Loading)
    }
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            LoadState::Idle => "idle",
            LoadState::Loading => "loading",
            LoadState::Ok => "ok",
            LoadState::Empty => "empty",
            LoadState::Error => "error",
        };
        f.write_str(label)
    }
}

/// A selected id, the list it is chosen from, and the list's load state.
///
/// The presentation layer may write `selected_id`; `items` and `state` are
/// only written by the loader and the cascade.
#[derive(Debug)]
pub struct ChoiceSlot<T, K> {
    none: K,
    selected_id: Observable<K>,
    items: Observable<Vec<T>>,
    state: Observable<LoadState>,
}

pub type PlaceSlot = ChoiceSlot<Place, PlaceId>;

impl PlaceSlot {
    pub fn for_places() -> Self {
        Self::new(NO_SELECTION)
    }
}

impl<T, K> ChoiceSlot<T, K>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    K: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(none: K) -> Self {
        Self {
            selected_id: Observable::new(none.clone()),
            none,
            items: Observable::new(Vec::new()),
            state: Observable::new(LoadState::Idle),
        }
    }

    /// The sentinel meaning "nothing selected".
    pub fn none(&self) -> &K {
        &self.none
    }

    pub fn selected(&self) -> K {
        self.selected_id.get()
    }

    pub fn has_selection(&self) -> bool {
        self.selected_id.get() != self.none
    }

    pub fn select(&self, id: K) {
        self.selected_id.set(id);
    }

    pub fn items(&self) -> Vec<T> {
        self.items.get()
    }

    pub fn state(&self) -> LoadState {
        self.state.get()
    }

    pub fn selected_id(&self) -> &Observable<K> {
        &self.selected_id
    }

    pub fn subscribe_items<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Vec<T>, &Vec<T>) + Send + Sync + 'static,
    {
        self.items.subscribe(listener)
    }

    pub fn subscribe_state<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&LoadState, &LoadState) + Send + Sync + 'static,
    {
        self.state.subscribe(listener)
    }

    /// Reset selection and items. State is left for the next load to set.
    pub fn clear(&self) {
        self.selected_id.set(self.none.clone());
        self.items.set(Vec::new());
    }

    /// Put a persisted selection back without notifying listeners.
    pub(crate) fn restore(&self, id: K) {
        self.selected_id.set_silently(id);
    }

    pub(crate) fn set_state(&self, state: LoadState) {
        self.state.set(state);
    }

    pub(crate) fn stage_state(&self, state: LoadState) -> Change<LoadState> {
        self.state.stage(state)
    }

    pub(crate) fn stage_items(&self, items: Vec<T>) -> Change<Vec<T>> {
        self.items.stage(items)
    }
}
