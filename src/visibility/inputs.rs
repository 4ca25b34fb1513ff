use serde::{Deserialize, Serialize};

/// Per-surface preferences. Read-only while a decision is evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Master switch for the surface.
    pub enabled: bool,
    /// External override that shows the surface no matter what.
    pub force_show: bool,
    /// External automation may veto showing; `false` keeps the surface hidden.
    pub externally_permitted: bool,
    pub show_on_main_lock_screen: bool,
    pub show_in_notification_shade: bool,
    /// Hide on the PIN/pattern page, detected as "locked but neither the
    /// main lock screen nor the shade is visible".
    pub hide_on_security_page: bool,
    pub hide_on_notification_shade: bool,
    pub hide_on_face_widgets: bool,
    pub hide_on_edge_panel: bool,
    /// Hide while any notification is showing on the lock screen.
    pub hide_on_notifications: bool,
    pub hide_in_landscape: bool,
    pub hide_when_keyboard_shown: bool,
    /// Keep different positions for the lock screen and the shade.
    pub separate_lock_and_shade_position: bool,
    /// Keep different layouts for landscape rotations.
    pub separate_landscape_layout: bool,
    /// Amount to dim content behind the surface, in percent.
    pub dim_percent: u8,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            force_show: false,
            externally_permitted: true,
            show_on_main_lock_screen: true,
            show_in_notification_shade: false,
            hide_on_security_page: true,
            hide_on_notification_shade: false,
            hide_on_face_widgets: false,
            hide_on_edge_panel: true,
            hide_on_notifications: false,
            hide_in_landscape: false,
            hide_when_keyboard_shown: false,
            separate_lock_and_shade_position: false,
            separate_landscape_layout: false,
            dim_percent: 0,
        }
    }
}

impl SurfaceConfig {
    /// Enabled surface with every other setting at its default.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }
}

/// Transient per-surface flags owned by that surface's controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceRuntimeState {
    pub is_preview: bool,
    pub is_temp_hide: bool,
    /// Set while a picker waits for the user to tap a frame.
    pub selection_request_id: Option<i32>,
    pub is_pending_reposition: bool,
}

impl SurfaceRuntimeState {
    /// Temp-hide wins over preview.
    pub fn set_temp_hide(&mut self, hide: bool) {
        self.is_temp_hide = hide;
        if hide {
            self.is_preview = false;
        }
    }

    /// A screen power change ends temp-hide; screen off also ends preview.
    pub fn on_screen_power_changed(&mut self, on: bool) {
        self.is_temp_hide = false;
        if !on {
            self.is_preview = false;
            self.selection_request_id = None;
        }
    }

    pub fn on_orientation_changed(&mut self) {
        self.is_pending_reposition = true;
        self.is_preview = false;
    }

    pub fn on_shade_expansion_changed(&mut self) {
        self.is_pending_reposition = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_hide_clears_preview() {
        let mut state = SurfaceRuntimeState {
            is_preview: true,
            ..SurfaceRuntimeState::default()
        };
        state.set_temp_hide(true);
        assert!(state.is_temp_hide);
        assert!(!state.is_preview);
    }

    #[test]
    fn screen_off_clears_transient_flags() {
        let mut state = SurfaceRuntimeState {
            is_preview: true,
            is_temp_hide: true,
            selection_request_id: Some(4),
            is_pending_reposition: false,
        };
        state.on_screen_power_changed(true);
        assert!(!state.is_temp_hide);
        assert!(state.is_preview);

        state.on_screen_power_changed(false);
        assert!(!state.is_preview);
        assert_eq!(state.selection_request_id, None);
    }

    #[test]
    fn config_defaults_match_preferences() {
        let config: SurfaceConfig = serde_json::from_str("{}").expect("empty config");
        assert_eq!(config, SurfaceConfig::default());
        assert!(config.externally_permitted);
        assert!(config.hide_on_security_page);
        assert!(!config.enabled);
    }
}
