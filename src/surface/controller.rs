use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use super::backend::{
    DimBehindController, NoopAnimator, OverlayWindowManager, SurfaceAnimator, SurfaceError,
    SurfaceSpec, UnsupportedDimBehind,
};
use super::geometry::{select_layout, FrameLayouts, GeometryDiff, LayoutKey, SurfaceGeometry};
use super::guard::{AnimationGuard, TransitionGuard};
use super::SurfaceId;
use crate::display::{DisplayId, NaturalOrientation, Rotation};
use crate::events::{
    CenterFrame, EventBus, FrameAttachmentChanged, FrameIntercept, FrameMoveFinished, FrameMoved,
    FrameResizeFinished, FrameResized, FrameSelected, PreviewFrames, PreviewMode, SubscriptionId,
    TempHide,
};
use crate::prefs::PreferenceStore;
use crate::state::{StateRecord, StateStore, SurfaceRecord};
use crate::visibility::{evaluate, Decision, Mode, SurfaceConfig, SurfaceRuntimeState};

/// Platform pieces a controller drives.
pub struct SurfaceBackends {
    pub window_manager: Box<dyn OverlayWindowManager>,
    pub animator: Box<dyn SurfaceAnimator>,
    pub dim_behind: Arc<dyn DimBehindController>,
}

impl SurfaceBackends {
    pub fn new(window_manager: impl OverlayWindowManager + 'static) -> Self {
        Self {
            window_manager: Box::new(window_manager),
            animator: Box::new(NoopAnimator),
            dim_behind: Arc::new(UnsupportedDimBehind),
        }
    }

    pub fn with_animator(mut self, animator: impl SurfaceAnimator + 'static) -> Self {
        self.animator = Box::new(animator);
        self
    }

    pub fn with_dim_behind(mut self, dim_behind: Arc<dyn DimBehindController>) -> Self {
        self.dim_behind = dim_behind;
        self
    }
}

/// Shared services every controller on the process uses.
#[derive(Clone)]
pub struct SurfaceContext {
    pub store: Arc<StateStore>,
    pub bus: Arc<EventBus>,
    pub layouts: Arc<Mutex<FrameLayouts>>,
    /// Where finished gestures persist layouts. `None` keeps them in memory.
    pub preferences: Option<Arc<dyn PreferenceStore>>,
}

impl SurfaceContext {
    pub fn new(store: Arc<StateStore>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            bus,
            layouts: Arc::new(Mutex::new(FrameLayouts::default())),
            preferences: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Unchanged,
    Added,
    Removed,
    Repositioned,
    /// Another transition was in flight; the request was dropped.
    Deferred,
    /// The platform refused; state is unchanged and the next signal retries.
    Failed,
}

pub type ReevaluateHook = Arc<dyn Fn(SurfaceId) + Send + Sync>;

/// How long `destroy` waits for an in-flight transition to let go.
const DESTROY_WAIT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SeenState {
    screen_on: bool,
    rotation: Rotation,
    natural: NaturalOrientation,
    shade_expanded: bool,
}

impl SeenState {
    fn of(record: &StateRecord) -> Self {
        Self {
            screen_on: record.is_screen_on,
            rotation: record.screen_orientation,
            natural: record.natural_orientation,
            shade_expanded: record.notifications_panel_fully_expanded,
        }
    }
}

struct SurfaceInner {
    config: Arc<SurfaceConfig>,
    runtime: SurfaceRuntimeState,
    attached: bool,
    /// Spec last accepted by the window manager.
    applied: Option<SurfaceSpec>,
    keep_screen_on: bool,
    last_mode: Option<Mode>,
    seen: Option<SeenState>,
    destroyed: bool,
}

/// Owns one overlay surface and keeps it attached exactly when the decision
/// engine says so.
pub struct OverlaySurfaceController {
    id: SurfaceId,
    display: DisplayId,
    inner: Mutex<SurfaceInner>,
    guard: TransitionGuard,
    window_manager: Mutex<Box<dyn OverlayWindowManager>>,
    animator: Mutex<Box<dyn SurfaceAnimator>>,
    dim_behind: Arc<dyn DimBehindController>,
    context: SurfaceContext,
    reevaluate_hook: RwLock<Option<ReevaluateHook>>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl fmt::Debug for OverlaySurfaceController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlaySurfaceController")
            .field("id", &self.id)
            .field("display", &self.display)
            .field("guard", &self.guard.current())
            .finish_non_exhaustive()
    }
}

impl OverlaySurfaceController {
    pub fn new(
        id: SurfaceId,
        display: DisplayId,
        config: SurfaceConfig,
        backends: SurfaceBackends,
        context: SurfaceContext,
    ) -> Arc<Self> {
        let controller = Arc::new(Self {
            id,
            display,
            inner: Mutex::new(SurfaceInner {
                config: Arc::new(config),
                runtime: SurfaceRuntimeState::default(),
                attached: false,
                applied: None,
                keep_screen_on: false,
                last_mode: None,
                seen: None,
                destroyed: false,
            }),
            guard: TransitionGuard::new(),
            window_manager: Mutex::new(backends.window_manager),
            animator: Mutex::new(backends.animator),
            dim_behind: backends.dim_behind,
            context,
            reevaluate_hook: RwLock::new(None),
            subscriptions: Mutex::new(Vec::new()),
        });
        controller.bind_events();
        controller.mirror();
        controller
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn display(&self) -> DisplayId {
        self.display
    }

    pub fn is_attached(&self) -> bool {
        self.lock_inner().attached
    }

    pub fn guard_state(&self) -> AnimationGuard {
        self.guard.current()
    }

    pub fn runtime(&self) -> SurfaceRuntimeState {
        self.lock_inner().runtime
    }

    pub fn config(&self) -> Arc<SurfaceConfig> {
        Arc::clone(&self.lock_inner().config)
    }

    pub fn last_mode(&self) -> Option<Mode> {
        self.lock_inner().last_mode
    }

    /// Geometry the window manager last accepted.
    pub fn geometry(&self) -> Option<SurfaceGeometry> {
        self.lock_inner().applied.as_ref().map(|spec| spec.geometry)
    }

    /// Swaps in new preferences and asks for a re-evaluation.
    pub fn set_config(&self, config: SurfaceConfig) {
        {
            let mut inner = self.lock_inner();
            if *inner.config == config {
                return;
            }
            inner.config = Arc::new(config);
            inner.runtime.is_pending_reposition = true;
        }
        self.request_reevaluation();
    }

    /// Routes re-evaluation requests raised by events. Without a hook they
    /// run synchronously on the caller's thread.
    pub fn set_reevaluate_hook(&self, hook: Option<ReevaluateHook>) {
        *self
            .reevaluate_hook
            .write()
            .unwrap_or_else(PoisonError::into_inner) = hook;
    }

    pub fn request_reevaluation(&self) {
        let hook = self
            .reevaluate_hook
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match hook {
            Some(hook) => hook(self.id),
            None => {
                self.reevaluate_current();
            }
        }
    }

    /// Mutates the runtime flags. Returns whether anything changed.
    pub fn update_runtime<F>(&self, update: F) -> bool
    where
        F: FnOnce(&mut SurfaceRuntimeState),
    {
        let mut inner = self.lock_inner();
        let before = inner.runtime;
        update(&mut inner.runtime);
        inner.runtime != before
    }

    /// Evaluates the decision for `record`, first folding in runtime side
    /// effects of what changed since the last record this surface saw.
    pub fn decide(&self, record: &StateRecord) -> Decision {
        if record.display != self.display {
            tracing::warn!(
                surface = %self.id,
                expected = %self.display,
                got = %record.display,
                "record for another display; hiding"
            );
            return Decision::HIDE;
        }
        let mut inner = self.lock_inner();
        let seen = SeenState::of(record);
        if let Some(previous) = inner.seen {
            if previous.screen_on != seen.screen_on {
                inner.runtime.on_screen_power_changed(seen.screen_on);
            }
            if previous.rotation != seen.rotation || previous.natural != seen.natural {
                inner.runtime.on_orientation_changed();
            }
            if previous.shade_expanded != seen.shade_expanded {
                inner.runtime.on_shade_expansion_changed();
            }
        }
        inner.seen = Some(seen);
        evaluate(record, &inner.runtime, &inner.config)
    }

    /// Executes at most one add, remove or reposition for `decision`.
    pub fn apply(&self, decision: Decision, record: &StateRecord) -> TransitionOutcome {
        let attached = {
            let inner = self.lock_inner();
            if inner.destroyed {
                return TransitionOutcome::Unchanged;
            }
            inner.attached
        };
        let outcome = match (decision.show(), attached) {
            (true, false) => self.add(record),
            (false, true) => self.remove(),
            (true, true) => {
                if self.reposition(record) {
                    TransitionOutcome::Repositioned
                } else {
                    TransitionOutcome::Unchanged
                }
            }
            (false, false) => TransitionOutcome::Unchanged,
        };
        if !matches!(outcome, TransitionOutcome::Deferred | TransitionOutcome::Failed) {
            self.lock_inner().last_mode = decision.mode;
        }

        if outcome == TransitionOutcome::Unchanged {
            tracing::trace!(surface = %self.id, mode = ?decision.mode, "surface unchanged");
        } else {
            tracing::debug!(surface = %self.id, mode = ?decision.mode, ?outcome, "surface re-evaluated");
        }
        self.mirror();
        outcome
    }

    pub fn reevaluate(&self, record: &StateRecord) -> TransitionOutcome {
        let decision = self.decide(record);
        self.apply(decision, record)
    }

    /// Re-evaluates against the store's current record for this display.
    pub fn reevaluate_current(&self) -> TransitionOutcome {
        let record = self.context.store.snapshot(self.display);
        self.reevaluate(&record)
    }

    /// Unsubscribes from the bus and detaches without animating.
    pub fn destroy(&self) {
        let subscriptions = std::mem::take(
            &mut *self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for id in subscriptions {
            self.context.bus.unsubscribe(id);
        }

        self.lock_inner().destroyed = true;

        // A transition still holding the guard detaches once it sees the flag.
        let deadline = Instant::now() + DESTROY_WAIT;
        let ticket = loop {
            if let Some(ticket) = self.guard.try_begin(AnimationGuard::Removing) {
                break Some(ticket);
            }
            if Instant::now() >= deadline {
                break None;
            }
            thread::sleep(Duration::from_millis(1));
        };
        match ticket {
            Some(ticket) => {
                if self.lock_inner().attached {
                    self.detach_now();
                }
                drop(ticket);
            }
            None => {
                tracing::debug!(surface = %self.id, "transition in flight; detach left to it");
            }
        }
        self.context.store.forget_surface(self.id);
        tracing::debug!(surface = %self.id, "surface controller destroyed");
    }

    fn add(&self, record: &StateRecord) -> TransitionOutcome {
        let Some(ticket) = self.guard.try_begin(AnimationGuard::Adding) else {
            tracing::debug!(surface = %self.id, "transition in flight; add skipped");
            return TransitionOutcome::Deferred;
        };
        // Another caller may have finished a transition since `apply` looked.
        {
            let inner = self.lock_inner();
            if inner.attached || inner.destroyed {
                return TransitionOutcome::Unchanged;
            }
        }
        self.mirror();

        let spec = {
            let mut inner = self.lock_inner();
            let geometry = self.target_geometry(&inner, record);
            inner.runtime.is_pending_reposition = false;
            self.spec_for(geometry, &inner)
        };
        let result = self.lock_window_manager().attach(&spec);
        let outcome = match result {
            Ok(()) => TransitionOutcome::Added,
            Err(SurfaceError::AlreadyAttached(_)) => {
                tracing::debug!(surface = %self.id, "platform already shows surface");
                TransitionOutcome::Unchanged
            }
            Err(err) => {
                tracing::warn!(surface = %self.id, %err, "attach failed; retrying on next signal");
                TransitionOutcome::Failed
            }
        };

        if outcome != TransitionOutcome::Failed {
            let mut inner = self.lock_inner();
            inner.attached = true;
            inner.applied = Some(spec);
        }
        if outcome == TransitionOutcome::Added {
            tracing::info!(surface = %self.id, display = %self.display, "surface attached");
            self.context.bus.publish(FrameAttachmentChanged {
                surface: self.id,
                attached: true,
            });
            self.lock_animator().animate_in(self.id);
        }
        self.detach_if_destroyed();
        drop(ticket);
        outcome
    }

    fn remove(&self) -> TransitionOutcome {
        let Some(ticket) = self.guard.try_begin(AnimationGuard::Removing) else {
            tracing::debug!(surface = %self.id, "transition in flight; remove skipped");
            return TransitionOutcome::Deferred;
        };
        if !self.lock_inner().attached {
            return TransitionOutcome::Unchanged;
        }
        self.mirror();

        self.lock_animator().animate_out(self.id);
        let result = self.lock_window_manager().detach(self.id);
        let outcome = match result {
            Ok(()) => TransitionOutcome::Removed,
            Err(SurfaceError::NotAttached(_)) => {
                tracing::debug!(surface = %self.id, "platform already removed surface");
                TransitionOutcome::Unchanged
            }
            Err(err) => {
                tracing::warn!(surface = %self.id, %err, "detach failed; retrying on next signal");
                TransitionOutcome::Failed
            }
        };

        if outcome != TransitionOutcome::Failed {
            let mut inner = self.lock_inner();
            inner.attached = false;
            inner.applied = None;
            inner.keep_screen_on = false;
        }
        if outcome == TransitionOutcome::Removed {
            tracing::info!(surface = %self.id, display = %self.display, "surface detached");
            self.context.bus.publish(FrameAttachmentChanged {
                surface: self.id,
                attached: false,
            });
        }
        self.detach_if_destroyed();
        drop(ticket);
        outcome
    }

    /// Finishes a `destroy` that arrived while this transition held the guard.
    fn detach_if_destroyed(&self) {
        let pending = {
            let inner = self.lock_inner();
            inner.destroyed && inner.attached
        };
        if pending {
            self.detach_now();
        }
    }

    /// Detaches without animating. Callers hold the guard.
    fn detach_now(&self) {
        match self.lock_window_manager().detach(self.id) {
            Ok(()) | Err(SurfaceError::NotAttached(_)) => {}
            Err(err) => tracing::warn!(surface = %self.id, %err, "detach on destroy failed"),
        }
        let mut inner = self.lock_inner();
        inner.attached = false;
        inner.applied = None;
        inner.keep_screen_on = false;
    }

    /// Pushes a new spec when a reposition is pending and at least one field
    /// differs from what the window manager has.
    fn reposition(&self, record: &StateRecord) -> bool {
        if !self.guard.current().is_idle() {
            return false;
        }
        let (spec, previous) = {
            let mut inner = self.lock_inner();
            if !inner.attached || !inner.runtime.is_pending_reposition {
                return false;
            }
            inner.runtime.is_pending_reposition = false;
            let Some(previous) = inner.applied.clone() else {
                return false;
            };
            let geometry = self.target_geometry(&inner, record);
            (self.spec_for(geometry, &inner), previous)
        };

        let diff = GeometryDiff::between(&previous.geometry, &spec.geometry);
        if !diff.any() && previous == spec {
            return false;
        }
        tracing::debug!(surface = %self.id, ?diff, "updating surface layout");

        let result = self.lock_window_manager().update_geometry(&spec);
        match result {
            Ok(()) => {
                self.lock_inner().applied = Some(spec);
                true
            }
            Err(SurfaceError::NotAttached(_)) => {
                tracing::debug!(surface = %self.id, "surface vanished before update");
                let mut inner = self.lock_inner();
                inner.attached = false;
                inner.applied = None;
                false
            }
            Err(err) => {
                tracing::warn!(surface = %self.id, %err, "layout update failed");
                false
            }
        }
    }

    fn layout_key(&self, inner: &SurfaceInner, record: &StateRecord) -> LayoutKey {
        select_layout(self.id, &inner.config, &inner.runtime, record)
    }

    fn target_geometry(&self, inner: &SurfaceInner, record: &StateRecord) -> SurfaceGeometry {
        let key = self.layout_key(inner, record);
        self.lock_layouts().geometry(key)
    }

    fn spec_for(&self, geometry: SurfaceGeometry, inner: &SurfaceInner) -> SurfaceSpec {
        let mut spec = SurfaceSpec {
            surface: self.id,
            display: self.display,
            geometry,
            keep_screen_on: inner.keep_screen_on,
            dim_behind: None,
        };
        self.dim_behind.apply(&mut spec, inner.config.dim_percent);
        spec
    }

    fn mirror(&self) {
        let (attached, geometry, mode) = {
            let inner = self.lock_inner();
            if inner.destroyed {
                return;
            }
            (
                inner.attached,
                inner.applied.as_ref().map(|spec| spec.geometry),
                inner.last_mode,
            )
        };
        let guard = self.guard.current();
        self.context
            .store
            .publish_surface(self.id, self.display, |current| SurfaceRecord {
                attached,
                guard,
                geometry,
                mode,
                ..current.clone()
            });
    }

    fn bind_events(self: &Arc<Self>) {
        let ids = vec![
            self.subscribe_weak(Self::on_temp_hide),
            self.subscribe_weak(Self::on_preview_frames),
            self.subscribe_weak(Self::on_frame_selected),
            self.subscribe_weak(Self::on_frame_moved),
            self.subscribe_weak(Self::on_frame_resized),
            self.subscribe_weak(Self::on_center_frame),
            self.subscribe_weak(Self::on_frame_intercept),
            self.subscribe_weak(|this: &Self, event: &FrameMoveFinished| {
                if event.surface == this.id {
                    this.persist_layouts();
                }
            }),
            self.subscribe_weak(|this: &Self, event: &FrameResizeFinished| {
                if event.surface == this.id {
                    this.persist_layouts();
                }
            }),
        ];
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(ids);
    }

    fn subscribe_weak<E, F>(self: &Arc<Self>, handler: F) -> SubscriptionId
    where
        E: Any + Send + Sync,
        F: Fn(&Self, &E) + Send + Sync + 'static,
    {
        let weak = Arc::downgrade(self);
        self.context.bus.subscribe(move |event: &E| {
            if let Some(controller) = weak.upgrade() {
                handler(&controller, event);
            }
        })
    }

    fn on_temp_hide(&self, event: &TempHide) {
        if event.surface != self.id {
            return;
        }
        if self.update_runtime(|runtime| runtime.set_temp_hide(true)) {
            self.request_reevaluation();
        }
    }

    fn on_preview_frames(&self, event: &PreviewFrames) {
        if self.id.is_main() && !event.include_main_frame {
            return;
        }
        let changed = self.update_runtime(|runtime| {
            runtime.is_preview = match event.show {
                PreviewMode::Show => true,
                PreviewMode::Toggle => !runtime.is_preview,
                PreviewMode::Hide | PreviewMode::ShowForSelection => false,
            };
            runtime.selection_request_id = match event.show {
                PreviewMode::ShowForSelection => event.request_code,
                _ => None,
            };
            runtime.is_pending_reposition = true;
        });
        if changed {
            self.request_reevaluation();
        }
    }

    fn on_frame_selected(&self, event: &FrameSelected) {
        if event.surface.is_some() {
            return;
        }
        if self.update_runtime(|runtime| runtime.selection_request_id = None) {
            self.request_reevaluation();
        }
    }

    fn on_frame_moved(&self, event: &FrameMoved) {
        if event.surface == self.id {
            self.edit_layout(|layouts, key| layouts.apply_move(key, event.dx, event.dy));
        }
    }

    fn on_frame_resized(&self, event: &FrameResized) {
        if event.surface != self.id {
            return;
        }
        self.edit_layout(|layouts, key| layouts.apply_resize(key, event.side, event.velocity));
        if event.is_up {
            self.context
                .bus
                .publish(FrameResizeFinished { surface: self.id });
        }
    }

    fn on_center_frame(&self, event: &CenterFrame) {
        if event.surface == self.id {
            self.edit_layout(|layouts, key| layouts.center(key, event.axis));
        }
    }

    fn on_frame_intercept(&self, event: &FrameIntercept) {
        if event.surface != self.id {
            return;
        }
        {
            let mut inner = self.lock_inner();
            if inner.keep_screen_on == event.down || !inner.attached {
                return;
            }
            inner.keep_screen_on = event.down;
            inner.runtime.is_pending_reposition = true;
        }
        self.request_reevaluation();
    }

    fn edit_layout<F>(&self, edit: F)
    where
        F: FnOnce(&mut FrameLayouts, LayoutKey) -> SurfaceGeometry,
    {
        let record = self.context.store.snapshot(self.display);
        let key = {
            let mut inner = self.lock_inner();
            inner.runtime.is_pending_reposition = true;
            self.layout_key(&inner, &record)
        };
        let geometry = edit(&mut self.lock_layouts(), key);
        tracing::trace!(surface = %self.id, key = %key.key(), ?geometry, "layout edited");
        self.request_reevaluation();
    }

    fn persist_layouts(&self) {
        let Some(preferences) = self.context.preferences.as_ref() else {
            return;
        };
        if let Err(err) = self.lock_layouts().save(preferences.as_ref()) {
            tracing::warn!(surface = %self.id, ?err, "failed to persist frame layouts");
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, SurfaceInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_layouts(&self) -> MutexGuard<'_, FrameLayouts> {
        self.context
            .layouts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_window_manager(&self) -> MutexGuard<'_, Box<dyn OverlayWindowManager>> {
        self.window_manager
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_animator(&self) -> MutexGuard<'_, Box<dyn SurfaceAnimator>> {
        self.animator.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
