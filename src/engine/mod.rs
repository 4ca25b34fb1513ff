//! Runtime wiring: platform signals in, surface transitions out.
//!
//! Signals run on a worker pool, serialised per display. Each one produces
//! a [`StateUpdate`] that is handed to a single state thread, which
//! publishes it, emits derived events and decides every affected surface.
//! Decisions are then applied on a single UI thread, the only place window
//! manager calls happen.

mod in_flight;
pub mod signal;
mod strand;

pub use signal::{Signal, Strand};

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{Receiver, Sender};
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use self::in_flight::{InFlight, WorkToken};
use self::strand::StrandExecutor;
use crate::display::DisplayId;
use crate::events::{
    CloseDrawer, DebugIdsUpdated, DrawerVisibilityChanged, EventBus, LockscreenDismissed,
    NotificationCountChanged, RemoveFrameConfirmed, ScreenPowerChanged, SubscriptionId,
};
use crate::platform::{keyboard_showing, Platform};
use crate::pool::{panic_message, WorkerPool};
use crate::prefs::{self, PreferenceStore};
use crate::settings::Settings;
use crate::state::{derive_update, IdFilters, Published, StateRecord, StateStore, StateUpdate};
use crate::surface::{
    select_dim_behind, DimBehindController, FrameLayouts, OverlaySurfaceController,
    OverlayWindowManager, ReevaluateHook, SurfaceAnimator, SurfaceBackends, SurfaceContext,
    SurfaceId,
};
use crate::visibility::{Decision, SurfaceConfig};
use crate::window::{SnapshotOptions, WindowSnapshotBuilder};

#[derive(Debug, Clone, Copy)]
enum Target {
    Display(DisplayId),
    AllDisplays,
}

enum StateMessage {
    Publish {
        target: Target,
        update: StateUpdate,
        token: WorkToken,
    },
    Reevaluate {
        surface: SurfaceId,
        token: WorkToken,
    },
    Stop,
}

enum UiMessage {
    Apply {
        controller: Arc<OverlaySurfaceController>,
        decision: Decision,
        record: Arc<StateRecord>,
        token: WorkToken,
    },
    Destroy {
        controller: Arc<OverlaySurfaceController>,
        token: WorkToken,
    },
    Stop,
}

struct Shared {
    settings: Settings,
    platform: Platform,
    store: Arc<StateStore>,
    bus: Arc<EventBus>,
    context: SurfaceContext,
    builder: WindowSnapshotBuilder,
    dim_behind: Arc<dyn DimBehindController>,
    surfaces: RwLock<BTreeMap<SurfaceId, Arc<OverlaySurfaceController>>>,
    filters: RwLock<IdFilters>,
    options: RwLock<SnapshotOptions>,
    /// Displays that already had their first accessibility pass.
    initialized: Mutex<BTreeSet<DisplayId>>,
    drawer_open: AtomicBool,
    closed: AtomicBool,
    in_flight: InFlight,
    state_tx: Sender<StateMessage>,
    ui_tx: Sender<UiMessage>,
}

pub struct Engine {
    shared: Arc<Shared>,
    signal_pool: Arc<WorkerPool>,
    traversal_pool: Arc<WorkerPool>,
    strands: StrandExecutor<Strand>,
    state_thread: Mutex<Option<JoinHandle<()>>>,
    ui_thread: Mutex<Option<JoinHandle<()>>>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl Engine {
    /// Starts the pools and both execution contexts. Frame layouts, id
    /// filters and hidden apps are read from `preferences` when given.
    pub fn new(
        settings: Settings,
        platform: Platform,
        preferences: Option<Arc<dyn PreferenceStore>>,
    ) -> Result<Self> {
        let (signal_workers, traversal_workers) = settings.pool_sizes();
        let signal_pool = Arc::new(WorkerPool::new("overlay-signal", signal_workers)?);
        let traversal_pool = Arc::new(WorkerPool::new("overlay-walk", traversal_workers)?);

        let store = Arc::new(StateStore::new());
        let bus = Arc::new(EventBus::new());
        let (layouts, filters, hide_on_apps) = match preferences.as_deref() {
            Some(saved) => (
                FrameLayouts::load(saved, settings.layout_defaults),
                IdFilters::from_preferences(saved),
                prefs::hide_on_apps(saved),
            ),
            None => (
                FrameLayouts::new(settings.layout_defaults),
                IdFilters::default(),
                BTreeSet::new(),
            ),
        };
        let context = SurfaceContext {
            store: Arc::clone(&store),
            bus: Arc::clone(&bus),
            layouts: Arc::new(Mutex::new(layouts)),
            preferences,
        };

        let (state_tx, state_rx) = crossbeam_channel::unbounded();
        let (ui_tx, ui_rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared {
            options: RwLock::new(SnapshotOptions {
                pixel_ui: settings.pixel_ui,
                hide_on_apps,
            }),
            dim_behind: select_dim_behind(settings.supports_dim_behind),
            builder: WindowSnapshotBuilder::new(Arc::clone(&traversal_pool)),
            settings,
            platform,
            store,
            bus,
            context,
            surfaces: RwLock::new(BTreeMap::new()),
            filters: RwLock::new(filters),
            initialized: Mutex::new(BTreeSet::new()),
            drawer_open: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            in_flight: InFlight::default(),
            state_tx,
            ui_tx,
        });

        let state_thread = {
            let shared = Arc::clone(&shared);
            spawn_context("overlay-state", move || state_loop(&shared, &state_rx))?
        };
        let ui_thread = match spawn_context("overlay-ui", move || ui_loop(&ui_rx)) {
            Ok(handle) => handle,
            Err(err) => {
                let _ = shared.state_tx.send(StateMessage::Stop);
                let _ = state_thread.join();
                return Err(err);
            }
        };

        let subscriptions = vec![
            {
                let weak = Arc::downgrade(&shared);
                shared.bus.subscribe(move |event: &DrawerVisibilityChanged| {
                    if let Some(shared) = weak.upgrade() {
                        shared.drawer_open.store(event.open, Ordering::SeqCst);
                    }
                })
            },
            {
                let weak = Arc::downgrade(&shared);
                shared.bus.subscribe(move |event: &RemoveFrameConfirmed| {
                    let Some(shared) = weak.upgrade() else {
                        return;
                    };
                    match event.surface {
                        Some(surface) if event.confirmed && !surface.is_main() => {
                            shared.unregister(surface);
                        }
                        _ => {}
                    }
                })
            },
        ];

        tracing::info!(signal_workers, traversal_workers, "overlay engine started");
        Ok(Self {
            strands: StrandExecutor::new(Arc::clone(&signal_pool)),
            shared,
            signal_pool,
            traversal_pool,
            state_thread: Mutex::new(Some(state_thread)),
            ui_thread: Mutex::new(Some(ui_thread)),
            subscriptions: Mutex::new(subscriptions),
        })
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.shared.store
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.shared.bus
    }

    pub fn settings(&self) -> &Settings {
        &self.shared.settings
    }

    pub fn surface_context(&self) -> SurfaceContext {
        self.shared.context.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Creates a controller for `id` and schedules its first evaluation.
    pub fn register_surface(
        &self,
        id: SurfaceId,
        display: DisplayId,
        config: SurfaceConfig,
        window_manager: Box<dyn OverlayWindowManager>,
        animator: Box<dyn SurfaceAnimator>,
    ) -> Result<Arc<OverlaySurfaceController>> {
        if self.is_shut_down() {
            bail!("engine is shut down");
        }
        let mut surfaces = self
            .shared
            .surfaces
            .write()
            .map_err(|_| anyhow!("surface registry lock poisoned"))?;
        if surfaces.contains_key(&id) {
            bail!("surface {id} is already registered");
        }
        let backends = SurfaceBackends {
            window_manager,
            animator,
            dim_behind: Arc::clone(&self.shared.dim_behind),
        };
        let controller =
            OverlaySurfaceController::new(id, display, config, backends, self.shared.context.clone());
        controller.set_reevaluate_hook(Some(self.shared.reevaluate_hook()));
        surfaces.insert(id, Arc::clone(&controller));
        drop(surfaces);

        tracing::info!(surface = %id, display = %controller.display(), "surface registered");
        self.shared.request_reevaluation(id);
        Ok(controller)
    }

    /// Like [`Engine::register_surface`], reading the configuration from
    /// the preference store (defaults without one).
    pub fn register_surface_from_preferences(
        &self,
        id: SurfaceId,
        display: DisplayId,
        window_manager: Box<dyn OverlayWindowManager>,
        animator: Box<dyn SurfaceAnimator>,
    ) -> Result<Arc<OverlaySurfaceController>> {
        let config = self
            .shared
            .context
            .preferences
            .as_deref()
            .map(|store| SurfaceConfig::from_preferences(store, id))
            .unwrap_or_default();
        self.register_surface(id, display, config, window_manager, animator)
    }

    /// Drops the controller and detaches its surface on the UI thread.
    pub fn unregister_surface(&self, id: SurfaceId) -> bool {
        self.shared.unregister(id)
    }

    pub fn surface(&self, id: SurfaceId) -> Option<Arc<OverlaySurfaceController>> {
        self.shared
            .surfaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn surfaces(&self) -> Vec<Arc<OverlaySurfaceController>> {
        self.shared.controllers(None)
    }

    /// Queues a signal. Returns `false` once the engine is shut down.
    pub fn submit(&self, signal: Signal) -> bool {
        if self.is_shut_down() {
            tracing::debug!(?signal, "engine shut down; signal dropped");
            return false;
        }
        let token = self.shared.in_flight.begin();
        let shared = Arc::clone(&self.shared);
        self.strands
            .submit(signal.strand(), move || shared.process_signal(signal, token));
        true
    }

    /// Replaces the id filters and rebuilds every display's snapshot.
    pub fn update_filters(&self, filters: IdFilters) {
        *self
            .shared
            .filters
            .write()
            .unwrap_or_else(PoisonError::into_inner) = filters;
        self.refresh_windows();
    }

    pub fn update_options(&self, options: SnapshotOptions) {
        *self
            .shared
            .options
            .write()
            .unwrap_or_else(PoisonError::into_inner) = options;
        self.refresh_windows();
    }

    /// Re-reads filters, hidden apps and every surface's configuration from
    /// the preference store.
    pub fn reload_preferences(&self) {
        let Some(store) = self.shared.context.preferences.as_deref() else {
            return;
        };
        *self
            .shared
            .filters
            .write()
            .unwrap_or_else(PoisonError::into_inner) = IdFilters::from_preferences(store);
        self.shared
            .options
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .hide_on_apps = prefs::hide_on_apps(store);
        for controller in self.surfaces() {
            controller.set_config(SurfaceConfig::from_preferences(store, controller.id()));
        }
        tracing::debug!("preferences reloaded");
        self.refresh_windows();
    }

    /// Waits until every accepted signal and re-evaluation has been applied.
    /// Returns `false` on timeout.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.shared.in_flight.wait_idle(timeout)
    }

    /// Stops every thread, detaches every surface and clears the bus and
    /// the store. Idempotent.
    pub fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("overlay engine shutting down");

        self.signal_pool.shutdown();
        self.traversal_pool.shutdown();

        let _ = self.shared.state_tx.send(StateMessage::Stop);
        join_context("overlay-state", &self.state_thread);
        let _ = self.shared.ui_tx.send(UiMessage::Stop);
        join_context("overlay-ui", &self.ui_thread);

        let controllers = std::mem::take(
            &mut *self
                .shared
                .surfaces
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for controller in controllers.into_values() {
            controller.set_reevaluate_hook(None);
            controller.destroy();
        }

        let subscriptions = std::mem::take(
            &mut *self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for id in subscriptions {
            self.shared.bus.unsubscribe(id);
        }
        self.shared.bus.clear();
        self.shared.store.shutdown();
        tracing::info!("overlay engine stopped");
    }

    fn refresh_windows(&self) {
        for display in self.shared.known_displays() {
            self.submit(Signal::WindowsChanged { display });
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn process_signal(&self, signal: Signal, token: WorkToken) {
        tracing::trace!(?signal, "processing signal");
        match signal {
            Signal::Accessibility { display } => self.on_accessibility(display, token),
            Signal::WindowsChanged { display } => {
                let on_keyguard = self.store.snapshot(display).was_on_keyguard;
                if let Some(update) = self.window_update(display, on_keyguard) {
                    self.send_publish(Target::Display(display), update, token);
                }
            }
            Signal::ScreenPower { display, on } => {
                self.send_publish(Target::Display(display), StateUpdate::screen_on(on), token)
            }
            Signal::Keyguard { locked } => {
                self.send_publish(Target::AllDisplays, StateUpdate::keyguard(locked), token)
            }
            Signal::NotificationCount { count } => self.send_publish(
                Target::AllDisplays,
                StateUpdate::notification_count(count),
                token,
            ),
            Signal::Keyboard { display, showing } => {
                self.send_publish(Target::Display(display), StateUpdate::keyboard(showing), token)
            }
            Signal::Rotation {
                display,
                rotation,
                natural,
            } => self.send_publish(
                Target::Display(display),
                StateUpdate::orientation(rotation, natural),
                token,
            ),
        }
    }

    fn on_accessibility(&self, display: DisplayId, token: WorkToken) {
        let platform = &self.platform;
        let locked = platform.lock.is_locked();
        let screen_on = platform.power.is_screen_on(display);
        let mut update = StateUpdate::screen_on(screen_on)
            .merge(StateUpdate::keyguard(locked))
            .merge(StateUpdate::keyboard(keyboard_showing(
                platform.keyboard.as_ref(),
                display,
            )));
        if let Some(info) = platform.displays.display(display) {
            update = update.merge(StateUpdate::orientation(info.rotation, info.natural));
        }

        let initial = self
            .initialized
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(display);
        let wants_windows = initial
            || (screen_on
                && (((locked || self.any_surface_in_shade(display))
                    && self.any_surface_enabled(display))
                    || self.drawer_should_close_on_shade()));
        if wants_windows {
            if let Some(windows) = self.window_update(display, locked) {
                update = update.merge(windows);
            }
        }
        self.send_publish(Target::Display(display), update, token);
    }

    fn window_update(&self, display_id: DisplayId, on_keyguard: bool) -> Option<StateUpdate> {
        let Some(windows) = self.platform.windows.on_screen_windows(display_id) else {
            tracing::debug!(display = %display_id, "window enumeration unavailable; keeping last snapshot");
            return None;
        };
        let options = self
            .options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let snapshot = self.builder.build(display_id, &windows, &options);
        let filters = self.filters.read().unwrap_or_else(PoisonError::into_inner);
        Some(derive_update(&snapshot, &filters, on_keyguard))
    }

    fn any_surface_in_shade(&self, display: DisplayId) -> bool {
        self.controllers(Some(display))
            .iter()
            .any(|controller| controller.config().show_in_notification_shade)
    }

    fn any_surface_enabled(&self, display: DisplayId) -> bool {
        self.controllers(Some(display))
            .iter()
            .any(|controller| controller.config().enabled)
    }

    fn drawer_should_close_on_shade(&self) -> bool {
        self.settings.close_drawer_on_notification_shade && self.drawer_open.load(Ordering::SeqCst)
    }

    fn send_publish(&self, target: Target, update: StateUpdate, token: WorkToken) {
        if update.is_empty() {
            return;
        }
        let message = StateMessage::Publish {
            target,
            update,
            token,
        };
        if self.state_tx.send(message).is_err() {
            tracing::debug!(?target, "state context stopped; update dropped");
        }
    }

    fn reevaluate_hook(self: &Arc<Self>) -> ReevaluateHook {
        let weak = Arc::downgrade(self);
        Arc::new(move |surface| {
            if let Some(shared) = weak.upgrade() {
                shared.request_reevaluation(surface);
            }
        })
    }

    fn request_reevaluation(&self, surface: SurfaceId) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let token = self.in_flight.begin();
        if self
            .state_tx
            .send(StateMessage::Reevaluate { surface, token })
            .is_err()
        {
            tracing::debug!(%surface, "state context stopped; re-evaluation dropped");
        }
    }

    fn unregister(&self, surface: SurfaceId) -> bool {
        let removed = self
            .surfaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&surface);
        let Some(controller) = removed else {
            return false;
        };
        controller.set_reevaluate_hook(None);
        tracing::info!(%surface, "surface unregistered");
        let token = self.in_flight.begin();
        if let Err(err) = self.ui_tx.send(UiMessage::Destroy { controller, token }) {
            // UI context is gone; tear down here instead.
            if let UiMessage::Destroy { controller, .. } = err.into_inner() {
                controller.destroy();
            }
        }
        true
    }

    /// Controllers on `display`, or all of them.
    fn controllers(&self, display: Option<DisplayId>) -> Vec<Arc<OverlaySurfaceController>> {
        self.surfaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|controller| display.map_or(true, |d| controller.display() == d))
            .cloned()
            .collect()
    }

    fn known_displays(&self) -> BTreeSet<DisplayId> {
        let mut displays: BTreeSet<DisplayId> =
            self.platform.displays.displays().into_iter().collect();
        displays.extend(self.store.displays());
        displays.extend(self.controllers(None).iter().map(|c| c.display()));
        displays.insert(DisplayId::DEFAULT);
        displays
    }

    fn handle_publish(&self, target: Target, update: &StateUpdate, token: &WorkToken) {
        let published = match target {
            Target::Display(display) => vec![self.store.publish(display, update)],
            Target::AllDisplays => {
                for display in self.known_displays() {
                    self.store.snapshot(display);
                }
                self.store.publish_all(update)
            }
        };
        for published in published.iter().filter(|p| p.changed()) {
            self.emit_derived_events(published);
            self.dispatch(&published.after, token);
        }
    }

    fn handle_reevaluate(&self, surface: SurfaceId, token: &WorkToken) {
        let controller = self
            .surfaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&surface)
            .cloned();
        let Some(controller) = controller else {
            tracing::trace!(%surface, "re-evaluation for unknown surface");
            return;
        };
        let record = self.store.snapshot(controller.display());
        let decision = controller.decide(&record);
        self.send_apply(controller, decision, record, token.follow_up());
    }

    fn dispatch(&self, record: &Arc<StateRecord>, token: &WorkToken) {
        for controller in self.controllers(Some(record.display)) {
            let decision = controller.decide(record);
            self.send_apply(controller, decision, Arc::clone(record), token.follow_up());
        }
    }

    fn send_apply(
        &self,
        controller: Arc<OverlaySurfaceController>,
        decision: Decision,
        record: Arc<StateRecord>,
        token: WorkToken,
    ) {
        let message = UiMessage::Apply {
            controller,
            decision,
            record,
            token,
        };
        if self.ui_tx.send(message).is_err() {
            tracing::debug!("UI context stopped; decision dropped");
        }
    }

    fn emit_derived_events(&self, published: &Published) {
        let (before, after) = (&published.before, &published.after);
        let display = after.display;

        if before.is_screen_on != after.is_screen_on {
            self.bus.publish(ScreenPowerChanged {
                display,
                on: after.is_screen_on,
            });
        }
        if display.is_default() {
            if before.was_on_keyguard && !after.was_on_keyguard {
                self.bus.publish(LockscreenDismissed);
            }
            if before.notification_count != after.notification_count {
                self.bus.publish(NotificationCountChanged {
                    count: after.notification_count,
                });
            }
        }
        if before.visible_ids != after.visible_ids {
            self.bus.publish(DebugIdsUpdated {
                display,
                ids: Arc::clone(&after.visible_ids),
            });
        }
        let shade_opened = !before.showing_notifications_panel && after.showing_notifications_panel;
        if shade_opened && self.drawer_should_close_on_shade() {
            tracing::debug!(display = %after.display, "notification shade opened; closing drawer");
            self.bus.publish(CloseDrawer);
        }
    }
}

fn spawn_context<F>(name: &str, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .with_context(|| format!("spawn {name} thread"))
}

fn join_context(name: &str, slot: &Mutex<Option<JoinHandle<()>>>) {
    let handle = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    let Some(handle) = handle else {
        return;
    };
    if handle.thread().id() == thread::current().id() {
        return;
    }
    if handle.join().is_err() {
        tracing::warn!(context = name, "execution context exited with a panic");
    }
}

fn state_loop(shared: &Shared, receiver: &Receiver<StateMessage>) {
    for message in receiver.iter() {
        let result = panic::catch_unwind(AssertUnwindSafe(|| match message {
            StateMessage::Publish {
                target,
                update,
                token,
            } => {
                shared.handle_publish(target, &update, &token);
                true
            }
            StateMessage::Reevaluate { surface, token } => {
                shared.handle_reevaluate(surface, &token);
                true
            }
            StateMessage::Stop => false,
        }));
        match result {
            Ok(true) => {}
            Ok(false) => break,
            Err(payload) => tracing::error!(
                panic = %panic_message(payload.as_ref()),
                "state context message panicked"
            ),
        }
    }
    tracing::debug!("state context stopped");
}

fn ui_loop(receiver: &Receiver<UiMessage>) {
    for message in receiver.iter() {
        let result = panic::catch_unwind(AssertUnwindSafe(|| match message {
            UiMessage::Apply {
                controller,
                decision,
                record,
                token,
            } => {
                controller.apply(decision, &record);
                drop(token);
                true
            }
            UiMessage::Destroy { controller, token } => {
                controller.destroy();
                drop(token);
                true
            }
            UiMessage::Stop => false,
        }));
        match result {
            Ok(true) => {}
            Ok(false) => break,
            Err(payload) => tracing::error!(
                panic = %panic_message(payload.as_ref()),
                "UI context message panicked"
            ),
        }
    }
    tracing::debug!("UI context stopped");
}
