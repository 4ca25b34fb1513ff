use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::record::StateUpdate;
use crate::window::WindowSnapshot;

/// User-chosen id lists matched against the visible ids of system UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdFilters {
    /// Hide while any of these is visible.
    #[serde(default)]
    pub present_ids: BTreeSet<String>,
    /// Hide unless all of these are visible.
    #[serde(default)]
    pub non_present_ids: BTreeSet<String>,
}

impl IdFilters {
    pub fn hide_for_present(&self, visible: &BTreeSet<String>) -> bool {
        !self.present_ids.is_empty() && !self.present_ids.is_disjoint(visible)
    }

    pub fn hide_for_non_present(&self, visible: &BTreeSet<String>) -> bool {
        !self.non_present_ids.is_empty() && !self.non_present_ids.is_subset(visible)
    }
}

/// Everything a fresh snapshot says about the display. `on_keyguard` is the
/// lock state the snapshot is interpreted under.
pub fn derive_update(snapshot: &WindowSnapshot, filters: &IdFilters, on_keyguard: bool) -> StateUpdate {
    let markers = &snapshot.markers;
    StateUpdate {
        current_app_layer: Some(snapshot.app_layer()),
        current_app_package: Some(snapshot.top_application_package.clone()),
        current_sys_ui_layer: Some(snapshot.system_ui_layer()),
        current_system_layer: Some(snapshot.system_layer()),
        on_main_lockscreen: Some(markers.on_main_lockscreen),
        showing_notifications_panel: Some(markers.showing_notifications_panel),
        notifications_panel_fully_expanded: Some(markers.notifications_panel_fully_expanded()),
        hide_for_present_ids: Some(filters.hide_for_present(&snapshot.visible_ids)),
        hide_for_non_present_ids: Some(filters.hide_for_non_present(&snapshot.visible_ids)),
        is_on_edge_panel: Some(snapshot.has_edge_panel),
        is_on_screen_off_memo: Some(on_keyguard && snapshot.has_screen_off_memo),
        is_on_face_widgets: Some(snapshot.is_on_face_widgets()),
        hiding_for_present_app: Some(snapshot.has_hide_on_app_window),
        visible_ids: Some(Arc::new(snapshot.visible_ids.clone())),
        snapshot_generation: Some(snapshot.generation),
        ..StateUpdate::default()
    }
}
