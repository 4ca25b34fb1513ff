use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use super::record::{StateRecord, StateUpdate, SurfaceRecord};
use crate::display::DisplayId;
use crate::surface::SurfaceId;

/// Result of one [`StateStore::publish`].
#[derive(Debug, Clone)]
pub struct Published {
    pub before: Arc<StateRecord>,
    pub after: Arc<StateRecord>,
}

impl Published {
    pub fn changed(&self) -> bool {
        !Arc::ptr_eq(&self.before, &self.after)
    }
}

/// Current value plus a stream of every later value.
pub struct Observation<T> {
    current: Arc<T>,
    updates: Receiver<Arc<T>>,
}

impl<T> Observation<T> {
    /// An observation that will never see another value.
    fn closed(current: Arc<T>) -> Self {
        let (_, updates) = crossbeam_channel::unbounded();
        Self { current, updates }
    }

    pub fn current(&self) -> &Arc<T> {
        &self.current
    }

    /// Next value, if one was published. Does not block.
    pub fn try_next(&mut self) -> Option<Arc<T>> {
        let next = self.updates.try_recv().ok()?;
        self.current = Arc::clone(&next);
        Some(next)
    }

    pub fn next_timeout(&mut self, timeout: Duration) -> Option<Arc<T>> {
        let next = self.updates.recv_timeout(timeout).ok()?;
        self.current = Arc::clone(&next);
        Some(next)
    }

    /// Consumes every pending value and returns the newest.
    pub fn latest(&mut self) -> &Arc<T> {
        while self.try_next().is_some() {}
        &self.current
    }

    /// `true` once the store was shut down and no values are pending.
    pub fn is_closed(&self) -> bool {
        self.updates.is_empty()
            && matches!(
                self.updates.recv_timeout(Duration::ZERO),
                Err(RecvTimeoutError::Disconnected)
            )
    }
}

/// Projection of a display record that only reports real changes.
pub struct Watch<T, F> {
    observation: Observation<StateRecord>,
    selector: F,
    value: T,
}

impl<T, F> Watch<T, F>
where
    T: PartialEq + Clone,
    F: Fn(&StateRecord) -> T,
{
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Waits up to `timeout` for the projection to change.
    pub fn changed_within(&mut self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let record = self.observation.next_timeout(remaining)?;
            let next = (self.selector)(&record);
            if next != self.value {
                self.value = next.clone();
                return Some(next);
            }
        }
    }
}

struct Watchers<K, T> {
    entries: Vec<(K, Sender<Arc<T>>)>,
}

impl<K: PartialEq + Copy, T> Watchers<K, T> {
    fn new() -> Self {
        Self { entries: Vec::new() }
    }

    fn add(&mut self, key: K) -> Receiver<Arc<T>> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.entries.push((key, tx));
        rx
    }

    fn notify(&mut self, key: K, value: &Arc<T>) {
        self.entries
            .retain(|(k, tx)| *k != key || tx.send(Arc::clone(value)).is_ok());
    }
}

/// Typed, observable state shared by every controller. Records are swapped
/// whole; readers holding an `Arc` never see a half-applied update.
pub struct StateStore {
    displays: RwLock<BTreeMap<DisplayId, Arc<StateRecord>>>,
    surfaces: RwLock<BTreeMap<SurfaceId, Arc<SurfaceRecord>>>,
    display_watchers: Mutex<Watchers<DisplayId, StateRecord>>,
    surface_watchers: Mutex<Watchers<SurfaceId, SurfaceRecord>>,
    closed: AtomicBool,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            displays: RwLock::new(BTreeMap::new()),
            surfaces: RwLock::new(BTreeMap::new()),
            display_watchers: Mutex::new(Watchers::new()),
            surface_watchers: Mutex::new(Watchers::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Current record for `display`, starting from defaults when the display
    /// was never published to. After shutdown nothing is stored.
    pub fn snapshot(&self, display: DisplayId) -> Arc<StateRecord> {
        if let Some(record) = self
            .displays
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&display)
        {
            return Arc::clone(record);
        }
        let mut displays = self.displays.write().unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            return Arc::new(StateRecord::new(display));
        }
        Arc::clone(
            displays
                .entry(display)
                .or_insert_with(|| Arc::new(StateRecord::new(display))),
        )
    }

    pub fn displays(&self) -> Vec<DisplayId> {
        self.displays
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    /// Replaces the record for `display` with `update` applied on top of it.
    /// An update that changes nothing is dropped without notifying anyone.
    pub fn publish(&self, display_id: DisplayId, update: &StateUpdate) -> Published {
        let mut displays = self.displays.write().unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            tracing::debug!(display = %display_id, "state store closed; dropping update");
            let before = displays
                .get(&display_id)
                .cloned()
                .unwrap_or_else(|| Arc::new(StateRecord::new(display_id)));
            return Published {
                after: Arc::clone(&before),
                before,
            };
        }
        let before = Arc::clone(
            displays
                .entry(display_id)
                .or_insert_with(|| Arc::new(StateRecord::new(display_id))),
        );

        let mut next = update.apply(&before);
        if next == *before {
            return Published {
                after: Arc::clone(&before),
                before,
            };
        }
        next.revision = before.revision + 1;
        let after = Arc::new(next);
        displays.insert(display_id, Arc::clone(&after));

        // Take the watcher list before releasing the records so observers
        // see revisions in order.
        let mut watchers = self
            .display_watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        drop(displays);
        watchers.notify(display_id, &after);
        drop(watchers);
        tracing::trace!(display = %display_id, revision = after.revision, "state published");
        Published { before, after }
    }

    /// Publishes `update` to every known display, or to the default display
    /// when none is known yet.
    pub fn publish_all(&self, update: &StateUpdate) -> Vec<Published> {
        let mut displays = self.displays();
        if displays.is_empty() {
            displays.push(DisplayId::DEFAULT);
        }
        displays
            .into_iter()
            .map(|display| self.publish(display, update))
            .collect()
    }

    pub fn observe(&self, display: DisplayId) -> Observation<StateRecord> {
        let mut displays = self.displays.write().unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            return Observation::closed(Arc::new(StateRecord::new(display)));
        }
        let current = Arc::clone(
            displays
                .entry(display)
                .or_insert_with(|| Arc::new(StateRecord::new(display))),
        );
        let updates = self.register_display_watcher(display);
        Observation { current, updates }
    }

    /// Follows one projection of a display record, e.g. the visible ids for
    /// a debug view.
    pub fn watch<T, F>(&self, display: DisplayId, selector: F) -> Watch<T, F>
    where
        T: PartialEq + Clone,
        F: Fn(&StateRecord) -> T,
    {
        let observation = self.observe(display);
        let value = selector(observation.current());
        Watch {
            observation,
            selector,
            value,
        }
    }

    pub fn surface(&self, surface: SurfaceId) -> Option<Arc<SurfaceRecord>> {
        self.surfaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&surface)
            .cloned()
    }

    /// Replaces a surface record with `update(current)`.
    pub fn publish_surface<F>(
        &self,
        surface: SurfaceId,
        display: DisplayId,
        update: F,
    ) -> Arc<SurfaceRecord>
    where
        F: FnOnce(&SurfaceRecord) -> SurfaceRecord,
    {
        let mut surfaces = self.surfaces.write().unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            return surfaces
                .get(&surface)
                .cloned()
                .unwrap_or_else(|| Arc::new(SurfaceRecord::new(surface, display)));
        }
        let before = Arc::clone(
            surfaces
                .entry(surface)
                .or_insert_with(|| Arc::new(SurfaceRecord::new(surface, display))),
        );
        let mut next = update(&before);
        next.surface = surface;
        next.revision = before.revision;
        if next == *before {
            return before;
        }
        next.revision = before.revision + 1;
        let after = Arc::new(next);
        surfaces.insert(surface, Arc::clone(&after));

        let mut watchers = self
            .surface_watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        drop(surfaces);
        watchers.notify(surface, &after);
        after
    }

    pub fn observe_surface(&self, surface: SurfaceId, display: DisplayId) -> Observation<SurfaceRecord> {
        let mut surfaces = self.surfaces.write().unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            return Observation::closed(Arc::new(SurfaceRecord::new(surface, display)));
        }
        let current = Arc::clone(
            surfaces
                .entry(surface)
                .or_insert_with(|| Arc::new(SurfaceRecord::new(surface, display))),
        );
        let updates = self
            .surface_watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(surface);
        Observation { current, updates }
    }

    pub fn forget_surface(&self, surface: SurfaceId) {
        self.surfaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&surface);
        self.surface_watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .retain(|(key, _)| *key != surface);
    }

    /// Drops every record and disconnects every observer. Later publishes
    /// are ignored.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.displays
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.surfaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.display_watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clear();
        self.surface_watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clear();
        tracing::debug!("state store shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn register_display_watcher(&self, display: DisplayId) -> Receiver<Arc<StateRecord>> {
        self.display_watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(display)
    }
}
