use std::collections::BTreeSet;
use std::num::NonZeroUsize;

use super::ids;
use super::node::WindowType;
use crate::display::DisplayId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    SystemUi,
    Application,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowEntry {
    /// Position in the snapshot, 0 being topmost. Meaningless outside the
    /// snapshot that produced it.
    pub index: usize,
    pub classification: Classification,
    pub window_type: WindowType,
    pub package: Option<String>,
    pub is_focused: bool,
    pub is_active: bool,
}

/// One node reached while walking a system UI tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeSummary {
    pub window_index: usize,
    /// Child indices from the window root down to this node.
    pub path: Vec<u32>,
    pub view_id: Option<String>,
    pub visible: bool,
}

/// Facts about the system UI read off its visible ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemUiMarkers {
    pub on_main_lockscreen: bool,
    pub showing_notifications_panel: bool,
    pub has_more_button: bool,
    pub has_settings_container_button: bool,
    pub has_clear_all_button: bool,
    pub on_face_widgets: bool,
}

impl SystemUiMarkers {
    pub fn from_visible_ids(visible_ids: &BTreeSet<String>, pixel_ui: bool) -> Self {
        Self {
            on_main_lockscreen: ids::contains_any(visible_ids, ids::MAIN_LOCKSCREEN_IDS),
            showing_notifications_panel: ids::contains_any(
                visible_ids,
                ids::NOTIFICATION_PANEL_IDS,
            ),
            has_more_button: ids::contains_any(visible_ids, ids::MORE_BUTTON_IDS),
            has_settings_container_button: pixel_ui
                && ids::contains_any(visible_ids, ids::SETTINGS_CONTAINER_IDS),
            has_clear_all_button: ids::contains_any(visible_ids, ids::CLEAR_ALL_IDS),
            on_face_widgets: visible_ids
                .iter()
                .any(|id| id.contains(ids::FACE_WIDGET_ID_FRAGMENT)),
        }
    }

    /// The shade counts as fully expanded once the quick settings footer
    /// shows, or on Pixel UI once the settings container shows without a
    /// clear-all button.
    pub fn notifications_panel_fully_expanded(&self) -> bool {
        self.has_more_button || (self.has_settings_container_button && !self.has_clear_all_button)
    }
}

/// Immutable description of every window on one display at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub generation: u64,
    pub display: DisplayId,
    pub windows: Vec<WindowEntry>,
    pub top_application_window_index: Option<usize>,
    pub top_application_package: Option<String>,
    pub top_non_system_ui_window_index: Option<usize>,
    pub min_system_ui_window_index: Option<usize>,
    pub has_edge_panel: bool,
    pub has_screen_off_memo: bool,
    pub has_face_widgets_window: bool,
    pub has_hide_on_app_window: bool,
    /// Sorted by window index then path, so scheduling order never shows.
    pub nodes: Vec<NodeSummary>,
    pub visible_ids: BTreeSet<String>,
    pub markers: SystemUiMarkers,
    /// Children that could not be read and were treated as absent.
    pub skipped_nodes: usize,
}

impl WindowSnapshot {
    pub fn empty(display: DisplayId, generation: u64) -> Self {
        Self {
            generation,
            display,
            windows: Vec::new(),
            top_application_window_index: None,
            top_application_package: None,
            top_non_system_ui_window_index: None,
            min_system_ui_window_index: None,
            has_edge_panel: false,
            has_screen_off_memo: false,
            has_face_widgets_window: false,
            has_hide_on_app_window: false,
            nodes: Vec::new(),
            visible_ids: BTreeSet::new(),
            markers: SystemUiMarkers::default(),
            skipped_nodes: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Depth of `index` counted from the bottom of the stack, so the topmost
    /// window has the largest layer. Never zero.
    pub fn layer_of(&self, index: Option<usize>) -> Option<NonZeroUsize> {
        index
            .filter(|i| *i < self.len())
            .and_then(|i| NonZeroUsize::new(self.len() - i))
    }

    pub fn app_layer(&self) -> Option<NonZeroUsize> {
        self.layer_of(self.top_application_window_index)
    }

    pub fn system_ui_layer(&self) -> Option<NonZeroUsize> {
        self.layer_of(self.min_system_ui_window_index)
    }

    pub fn system_layer(&self) -> Option<NonZeroUsize> {
        self.layer_of(self.top_non_system_ui_window_index)
    }

    pub fn is_on_face_widgets(&self) -> bool {
        self.has_face_widgets_window || self.markers.on_face_widgets
    }
}
