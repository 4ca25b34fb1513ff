use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::display::{DisplayId, NaturalOrientation, Rotation};
use crate::surface::{AnimationGuard, SurfaceGeometry, SurfaceId};
use crate::visibility::Mode;

/// Depth from the bottom of the window stack. `None` means no such window.
pub type Layer = Option<NonZeroUsize>;

/// Aggregated screen state for one display. Never mutated in place; see
/// [`StateUpdate::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRecord {
    pub display: DisplayId,
    pub revision: u64,
    pub is_screen_on: bool,
    pub was_on_keyguard: bool,
    pub screen_orientation: Rotation,
    pub natural_orientation: NaturalOrientation,
    pub current_app_layer: Layer,
    pub current_app_package: Option<String>,
    pub current_sys_ui_layer: Layer,
    pub current_system_layer: Layer,
    pub on_main_lockscreen: bool,
    pub showing_notifications_panel: bool,
    pub notifications_panel_fully_expanded: bool,
    pub notification_count: u32,
    pub hide_for_present_ids: bool,
    pub hide_for_non_present_ids: bool,
    pub is_on_edge_panel: bool,
    pub is_on_screen_off_memo: bool,
    pub is_on_face_widgets: bool,
    pub hiding_for_present_app: bool,
    pub showing_keyboard: bool,
    pub visible_ids: Arc<BTreeSet<String>>,
    pub snapshot_generation: u64,
}

impl StateRecord {
    pub fn new(display: DisplayId) -> Self {
        Self {
            display,
            revision: 0,
            is_screen_on: false,
            was_on_keyguard: false,
            screen_orientation: Rotation::R0,
            natural_orientation: NaturalOrientation::Portrait,
            current_app_layer: None,
            current_app_package: None,
            current_sys_ui_layer: None,
            current_system_layer: None,
            on_main_lockscreen: false,
            showing_notifications_panel: false,
            notifications_panel_fully_expanded: false,
            notification_count: 0,
            hide_for_present_ids: false,
            hide_for_non_present_ids: false,
            is_on_edge_panel: false,
            is_on_screen_off_memo: false,
            is_on_face_widgets: false,
            hiding_for_present_app: false,
            showing_keyboard: false,
            visible_ids: Arc::new(BTreeSet::new()),
            snapshot_generation: 0,
        }
    }
}

/// Partial update. `None` fields keep the previous value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateUpdate {
    pub is_screen_on: Option<bool>,
    pub was_on_keyguard: Option<bool>,
    pub screen_orientation: Option<Rotation>,
    pub natural_orientation: Option<NaturalOrientation>,
    pub current_app_layer: Option<Layer>,
    pub current_app_package: Option<Option<String>>,
    pub current_sys_ui_layer: Option<Layer>,
    pub current_system_layer: Option<Layer>,
    pub on_main_lockscreen: Option<bool>,
    pub showing_notifications_panel: Option<bool>,
    pub notifications_panel_fully_expanded: Option<bool>,
    pub notification_count: Option<u32>,
    pub hide_for_present_ids: Option<bool>,
    pub hide_for_non_present_ids: Option<bool>,
    pub is_on_edge_panel: Option<bool>,
    pub is_on_screen_off_memo: Option<bool>,
    pub is_on_face_widgets: Option<bool>,
    pub hiding_for_present_app: Option<bool>,
    pub showing_keyboard: Option<bool>,
    pub visible_ids: Option<Arc<BTreeSet<String>>>,
    pub snapshot_generation: Option<u64>,
}

impl StateUpdate {
    /// Screen power change. Turning the screen off also collapses the shade.
    pub fn screen_on(on: bool) -> Self {
        Self {
            is_screen_on: Some(on),
            notifications_panel_fully_expanded: (!on).then_some(false),
            ..Self::default()
        }
    }

    pub fn keyguard(locked: bool) -> Self {
        Self {
            was_on_keyguard: Some(locked),
            ..Self::default()
        }
    }

    pub fn orientation(rotation: Rotation, natural: NaturalOrientation) -> Self {
        Self {
            screen_orientation: Some(rotation),
            natural_orientation: Some(natural),
            ..Self::default()
        }
    }

    pub fn notification_count(count: u32) -> Self {
        Self {
            notification_count: Some(count),
            ..Self::default()
        }
    }

    pub fn keyboard(showing: bool) -> Self {
        Self {
            showing_keyboard: Some(showing),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Combines two updates; fields set in `later` win.
    pub fn merge(self, later: StateUpdate) -> StateUpdate {
        StateUpdate {
            is_screen_on: later.is_screen_on.or(self.is_screen_on),
            was_on_keyguard: later.was_on_keyguard.or(self.was_on_keyguard),
            screen_orientation: later.screen_orientation.or(self.screen_orientation),
            natural_orientation: later.natural_orientation.or(self.natural_orientation),
            current_app_layer: later.current_app_layer.or(self.current_app_layer),
            current_app_package: later.current_app_package.or(self.current_app_package),
            current_sys_ui_layer: later.current_sys_ui_layer.or(self.current_sys_ui_layer),
            current_system_layer: later.current_system_layer.or(self.current_system_layer),
            on_main_lockscreen: later.on_main_lockscreen.or(self.on_main_lockscreen),
            showing_notifications_panel: later
                .showing_notifications_panel
                .or(self.showing_notifications_panel),
            notifications_panel_fully_expanded: later
                .notifications_panel_fully_expanded
                .or(self.notifications_panel_fully_expanded),
            notification_count: later.notification_count.or(self.notification_count),
            hide_for_present_ids: later.hide_for_present_ids.or(self.hide_for_present_ids),
            hide_for_non_present_ids: later
                .hide_for_non_present_ids
                .or(self.hide_for_non_present_ids),
            is_on_edge_panel: later.is_on_edge_panel.or(self.is_on_edge_panel),
            is_on_screen_off_memo: later.is_on_screen_off_memo.or(self.is_on_screen_off_memo),
            is_on_face_widgets: later.is_on_face_widgets.or(self.is_on_face_widgets),
            hiding_for_present_app: later.hiding_for_present_app.or(self.hiding_for_present_app),
            showing_keyboard: later.showing_keyboard.or(self.showing_keyboard),
            visible_ids: later.visible_ids.or(self.visible_ids),
            snapshot_generation: later.snapshot_generation.or(self.snapshot_generation),
        }
    }

    /// Builds the next record. `base` is left untouched and the revision is
    /// carried over unchanged; the store bumps it on accept.
    pub fn apply(&self, base: &StateRecord) -> StateRecord {
        StateRecord {
            display: base.display,
            revision: base.revision,
            is_screen_on: self.is_screen_on.unwrap_or(base.is_screen_on),
            was_on_keyguard: self.was_on_keyguard.unwrap_or(base.was_on_keyguard),
            screen_orientation: self.screen_orientation.unwrap_or(base.screen_orientation),
            natural_orientation: self.natural_orientation.unwrap_or(base.natural_orientation),
            current_app_layer: self.current_app_layer.unwrap_or(base.current_app_layer),
            current_app_package: self
                .current_app_package
                .clone()
                .unwrap_or_else(|| base.current_app_package.clone()),
            current_sys_ui_layer: self.current_sys_ui_layer.unwrap_or(base.current_sys_ui_layer),
            current_system_layer: self.current_system_layer.unwrap_or(base.current_system_layer),
            on_main_lockscreen: self.on_main_lockscreen.unwrap_or(base.on_main_lockscreen),
            showing_notifications_panel: self
                .showing_notifications_panel
                .unwrap_or(base.showing_notifications_panel),
            notifications_panel_fully_expanded: self
                .notifications_panel_fully_expanded
                .unwrap_or(base.notifications_panel_fully_expanded),
            notification_count: self.notification_count.unwrap_or(base.notification_count),
            hide_for_present_ids: self.hide_for_present_ids.unwrap_or(base.hide_for_present_ids),
            hide_for_non_present_ids: self
                .hide_for_non_present_ids
                .unwrap_or(base.hide_for_non_present_ids),
            is_on_edge_panel: self.is_on_edge_panel.unwrap_or(base.is_on_edge_panel),
            is_on_screen_off_memo: self.is_on_screen_off_memo.unwrap_or(base.is_on_screen_off_memo),
            is_on_face_widgets: self.is_on_face_widgets.unwrap_or(base.is_on_face_widgets),
            hiding_for_present_app: self
                .hiding_for_present_app
                .unwrap_or(base.hiding_for_present_app),
            showing_keyboard: self.showing_keyboard.unwrap_or(base.showing_keyboard),
            visible_ids: self
                .visible_ids
                .clone()
                .unwrap_or_else(|| Arc::clone(&base.visible_ids)),
            snapshot_generation: self.snapshot_generation.unwrap_or(base.snapshot_generation),
        }
    }
}

/// What a surface controller last reported about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceRecord {
    pub surface: SurfaceId,
    pub display: DisplayId,
    pub revision: u64,
    pub attached: bool,
    pub guard: AnimationGuard,
    pub geometry: Option<SurfaceGeometry>,
    pub mode: Option<Mode>,
}

impl SurfaceRecord {
    pub fn new(surface: SurfaceId, display: DisplayId) -> Self {
        Self {
            surface,
            display,
            revision: 0,
            attached: false,
            guard: AnimationGuard::Idle,
            geometry: None,
            mode: None,
        }
    }
}
