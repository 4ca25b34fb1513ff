//! Package names and view ids the classifier looks for.

pub const SYSTEM_UI_PACKAGE: &str = "com.android.systemui";
pub const ASSISTANT_PACKAGE: &str = "com.google.android.googlequicksearchbox";
pub const EDGE_PANEL_PACKAGE: &str = "com.samsung.android.app.cocktailbarservice";
pub const SCREEN_OFF_MEMO_PACKAGE: &str = "com.samsung.android.app.notes";
pub const FACE_WIDGETS_PACKAGE: &str = "com.samsung.android.app.aodservice";

/// Any visible node id containing this counts as face widgets being shown.
pub const FACE_WIDGET_ID_FRAGMENT: &str = "com.samsung.android.app.aodservice:id/facewidget_";

const SYSTEM_UI_ID_PREFIX: &str = "com.android.systemui:id/";

pub const MAIN_LOCKSCREEN_IDS: &[&str] = &[
    "notification_panel",
    "left_button",
    "camera_button",
    "keyguard_indication_text_bottom",
];

pub const NOTIFICATION_PANEL_IDS: &[&str] = &[
    "quick_settings_panel",
    "settings_button",
    "tile_label",
    "header_label",
    "split_shade_status_bar",
    "quick_qs_panel",
];

pub const MORE_BUTTON_IDS: &[&str] = &["more_button", "edit_button"];
pub const SETTINGS_CONTAINER_IDS: &[&str] = &["settings_button_container"];
pub const CLEAR_ALL_IDS: &[&str] = &["clear_all"];

pub fn system_ui_id(name: &str) -> String {
    format!("{SYSTEM_UI_ID_PREFIX}{name}")
}

/// `true` when any of the short `names` appears, fully qualified, in `ids`.
pub fn contains_any<'a, I>(ids: I, names: &[&str]) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    ids.into_iter().any(|id| {
        id.strip_prefix(SYSTEM_UI_ID_PREFIX)
            .is_some_and(|short| names.contains(&short))
    })
}
