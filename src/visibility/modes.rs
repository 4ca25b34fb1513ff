use serde::{Deserialize, Serialize};

use super::inputs::{SurfaceConfig, SurfaceRuntimeState};
use crate::display::is_portrait_like;
use crate::state::StateRecord;

/// Reasons a surface may be shown, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Forced,
    Preview,
    SecondaryDisplay,
    NotificationShade,
    LockScreen,
}

/// Evaluation order. The first mode whose predicate holds decides.
pub const MODE_PRECEDENCE: [Mode; 5] = [
    Mode::Forced,
    Mode::Preview,
    Mode::SecondaryDisplay,
    Mode::NotificationShade,
    Mode::LockScreen,
];

/// Everything one decision looks at.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub global: &'a StateRecord,
    pub surface: &'a SurfaceRuntimeState,
    pub config: &'a SurfaceConfig,
}

impl<'a> DecisionInput<'a> {
    pub fn new(
        global: &'a StateRecord,
        surface: &'a SurfaceRuntimeState,
        config: &'a SurfaceConfig,
    ) -> Self {
        Self {
            global,
            surface,
            config,
        }
    }
}

impl Mode {
    pub fn holds(self, input: &DecisionInput<'_>) -> bool {
        match self {
            Mode::Forced => forced(input),
            Mode::Preview => preview(input),
            Mode::SecondaryDisplay => secondary_display(input),
            Mode::NotificationShade => notification_shade(input),
            Mode::LockScreen => lock_screen(input),
        }
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// The mode that matched, if any.
    pub mode: Option<Mode>,
}

impl Decision {
    pub const HIDE: Decision = Decision { mode: None };

    pub fn show(self) -> bool {
        self.mode.is_some()
    }
}

pub fn evaluate(global: &StateRecord, surface: &SurfaceRuntimeState, config: &SurfaceConfig) -> Decision {
    let input = DecisionInput::new(global, surface, config);
    Decision {
        mode: MODE_PRECEDENCE.iter().copied().find(|mode| mode.holds(&input)),
    }
}

pub fn should_show(global: &StateRecord, surface: &SurfaceRuntimeState, config: &SurfaceConfig) -> bool {
    evaluate(global, surface, config).show()
}

/// Conditions shared by the secondary display, shade and lock screen modes.
pub fn baseline(input: &DecisionInput<'_>) -> bool {
    let DecisionInput {
        global,
        surface,
        config,
    } = *input;
    global.is_screen_on
        && !surface.is_temp_hide
        && !global.hide_for_present_ids
        && !global.hide_for_non_present_ids
        && config.enabled
        && (!config.hide_in_landscape
            || is_portrait_like(global.screen_orientation, global.natural_orientation))
        && config.externally_permitted
        && !(config.hide_when_keyboard_shown && global.showing_keyboard)
}

pub fn forced(input: &DecisionInput<'_>) -> bool {
    input.config.enabled && input.config.force_show
}

/// Preview needs the screen on; a dark screen has nothing to preview on.
pub fn preview(input: &DecisionInput<'_>) -> bool {
    (input.surface.is_preview || input.surface.selection_request_id.is_some())
        && !input.surface.is_temp_hide
        && input.global.is_screen_on
}

pub fn secondary_display(input: &DecisionInput<'_>) -> bool {
    !input.global.display.is_default() && baseline(input)
}

pub fn notification_shade(input: &DecisionInput<'_>) -> bool {
    input.global.notifications_panel_fully_expanded
        && input.config.show_in_notification_shade
        && baseline(input)
}

pub fn lock_screen(input: &DecisionInput<'_>) -> bool {
    let DecisionInput {
        global,
        config,
        ..
    } = *input;
    global.was_on_keyguard
        && (config.show_on_main_lock_screen || !config.show_in_notification_shade)
        && !(config.hide_on_face_widgets && global.is_on_face_widgets)
        && global.current_app_layer.is_none()
        && global.current_app_package.is_none()
        && !(global.is_on_edge_panel && config.hide_on_edge_panel)
        && !global.is_on_screen_off_memo
        && (global.on_main_lockscreen
            || global.showing_notifications_panel
            || !config.hide_on_security_page)
        && (!global.showing_notifications_panel || !config.hide_on_notification_shade)
        && (global.notification_count == 0 || !config.hide_on_notifications)
        && !global.hiding_for_present_app
        && baseline(input)
}
