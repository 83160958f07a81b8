//! Observable values with change listeners.
//!
//! An `Observable<T>` is a shared, thread-safe holder. Cloning it yields
//! another handle to the same value. Listeners receive `(old, new)` and are
//! always invoked with no lock held, so a listener may read or write any
//! observable (including the one that notified it).
//!
//! Every write is queued in write order and one thread at a time delivers
//! the queue. A write made while another thread (or an outer listener) is
//! delivering is handed to that delivery instead of running its own, so
//! listeners see changes in the order they were stored and the last
//! notification always carries the current value.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

type Listener<T> = Arc<dyn Fn(&T, &T) + Send + Sync>;

struct Entry<T> {
    id: u64,
    listener: Listener<T>,
}

/// Writes stored but not yet announced.
struct Pending<T> {
    queue: VecDeque<(T, T)>,
    delivering: bool,
}

struct Inner<T> {
    value: RwLock<T>,
    pending: Mutex<Pending<T>>,
    listeners: Mutex<Vec<Entry<T>>>,
    next_id: AtomicU64,
}

impl<T> Inner<T> {
    fn pending(&self) -> MutexGuard<'_, Pending<T>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct Observable<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Observable<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = self.inner.value.read().unwrap_or_else(|e| e.into_inner());
        f.debug_tuple("Observable").field(&*value).finish()
    }
}

impl<T> Default for Observable<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: RwLock::new(value),
                pending: Mutex::new(Pending {
                    queue: VecDeque::new(),
                    delivering: false,
                }),
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn get(&self) -> T {
        self.inner
            .value
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Store `value` and notify every listener.
    pub fn set(&self, value: T) {
        self.stage(value).notify();
    }

    /// Store `value` without notifying anyone.
    pub(crate) fn set_silently(&self, value: T) {
        *self.inner.value.write().unwrap_or_else(|e| e.into_inner()) = value;
    }

    /// Store `value` now and hand back the notification to fire later.
    ///
    /// Used when the write has to happen under a caller-held lock but the
    /// listeners must not run under it. The change is queued in write
    /// order, so a later write to the same observable is announced after it.
    pub(crate) fn stage(&self, value: T) -> Change<T> {
        let mut pending = self.inner.pending();
        let old = {
            let mut slot = self.inner.value.write().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *slot, value.clone())
        };
        pending.queue.push_back((old, value));
        Change {
            target: self.clone(),
        }
    }

    /// Announce queued writes until the queue is empty.
    ///
    /// Returns at once if someone else is already delivering; that delivery
    /// picks up everything queued behind it.
    fn deliver(&self) {
        {
            let mut pending = self.inner.pending();
            if pending.delivering {
                return;
            }
            pending.delivering = true;
        }
        let _delivering = Delivering { inner: &self.inner };

        loop {
            let (old, new) = {
                let mut pending = self.inner.pending();
                match pending.queue.pop_front() {
                    Some(change) => change,
                    None => {
                        pending.delivering = false;
                        return;
                    }
                }
            };
            let listeners: Vec<Listener<T>> = self
                .inner
                .listeners
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .map(|entry| Arc::clone(&entry.listener))
                .collect();
            for listener in &listeners {
                listener(&old, &new);
            }
        }
    }

    /// Listen to every write, including writes of an equal value.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(listener))
    }

    fn add_listener(&self, listener: Listener<T>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Entry { id, listener });

        let weak: Weak<Inner<T>> = Arc::downgrade(&self.inner);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner
                        .listeners
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .retain(|entry| entry.id != id);
                }
            })),
        }
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl<T> Observable<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Listen only to writes that change the value.
    pub fn subscribe_distinct<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        self.subscribe(move |old, new| {
            if old != new {
                listener(old, new);
            }
        })
    }
}

/// A write that has been applied but not yet announced.
#[must_use = "a staged change notifies nobody until `notify` is called"]
pub(crate) struct Change<T> {
    target: Observable<T>,
}

impl<T> Change<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn notify(self) {
        self.target.deliver();
    }
}

/// Clears the delivering flag if a listener panics mid-delivery.
struct Delivering<'a, T> {
    inner: &'a Inner<T>,
}

impl<T> Drop for Delivering<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.inner.pending().delivering = false;
        }
    }
}

/// Handle for a registered listener. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the listener immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Keep the listener registered for as long as the observable lives.
    pub fn detach(mut self) {
        self.unsubscribe = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}
