//! Preference collaborator boundary.
//!
//! Keys are opaque strings. Anything unreadable falls back to the documented
//! default so a corrupt preference can never stop the overlay logic.

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::state::IdFilters;
use crate::surface::SurfaceId;
use crate::visibility::SurfaceConfig;

pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
}

pub mod keys {
    pub const WIDGET_FRAME_ENABLED: &str = "widget_frame_enabled";
    pub const FORCE_SHOW_FRAME: &str = "force_show_frame";
    pub const CAN_SHOW_FRAME_FROM_TASKER: &str = "can_show_frame_from_tasker";
    pub const SHOW_ON_MAIN_LOCK_SCREEN: &str = "show_on_main_lock_screen";
    pub const SHOW_IN_NOTIFICATION_CENTER: &str = "show_in_notification_center";
    pub const HIDE_ON_SECURITY_PAGE: &str = "hide_on_security_page";
    pub const HIDE_ON_NOTIFICATION_SHADE: &str = "hide_on_notification_shade";
    pub const HIDE_ON_FACEWIDGETS: &str = "hide_on_facewidgets";
    pub const HIDE_ON_EDGE_PANEL: &str = "frame_hide_on_edge_panel";
    pub const HIDE_ON_NOTIFICATIONS: &str = "hide_on_notifications";
    pub const HIDE_IN_LANDSCAPE: &str = "hide_in_landscape";
    pub const HIDE_WHEN_KEYBOARD_SHOWN: &str = "hide_frame_when_keyboard_shown";
    pub const SEPARATE_POS_FOR_LOCK_NC: &str = "separate_position_for_lock_notification";
    pub const SEPARATE_LAYOUT_FOR_LANDSCAPE: &str = "frame_separate_layout_for_landscape";
    pub const MASKED_MODE_DIM_AMOUNT: &str = "masked_mode_wallpaper_dim_amount";
    pub const PRESENT_IDS: &str = "present_ids";
    pub const NON_PRESENT_IDS: &str = "non_present_ids";
    pub const HIDE_FRAME_ON_APPS: &str = "frame_hide_on_apps";
}

/// Key for a per-frame setting. The main frame uses the bare key.
pub fn frame_key(surface: SurfaceId, base: &str) -> String {
    if surface.is_main() {
        base.to_string()
    } else {
        format!("{base}_{}", surface.0)
    }
}

/// Reads and decodes `key`, or returns `default` when the key is missing
/// or holds something else.
pub fn read_or_default<T: DeserializeOwned>(store: &dyn PreferenceStore, key: &str, default: T) -> T {
    let Some(value) = store.get(key) else {
        return default;
    };
    match serde_json::from_value(value) {
        Ok(decoded) => decoded,
        Err(err) => {
            tracing::debug!(key, %err, "unreadable preference; using default");
            default
        }
    }
}

impl SurfaceConfig {
    pub fn from_preferences(store: &dyn PreferenceStore, surface: SurfaceId) -> Self {
        let defaults = SurfaceConfig::default();
        let frame = |base: &str| frame_key(surface, base);
        let flag = |key: &str, default: bool| read_or_default(store, key, default);
        let dim: u8 = read_or_default::<u32>(
            store,
            &frame(keys::MASKED_MODE_DIM_AMOUNT),
            u32::from(defaults.dim_percent),
        )
        .min(100)
        .try_into()
        .unwrap_or(100);

        Self {
            enabled: flag(keys::WIDGET_FRAME_ENABLED, defaults.enabled),
            force_show: flag(keys::FORCE_SHOW_FRAME, defaults.force_show),
            externally_permitted: flag(
                keys::CAN_SHOW_FRAME_FROM_TASKER,
                defaults.externally_permitted,
            ),
            show_on_main_lock_screen: flag(
                &frame(keys::SHOW_ON_MAIN_LOCK_SCREEN),
                defaults.show_on_main_lock_screen,
            ),
            show_in_notification_shade: flag(
                &frame(keys::SHOW_IN_NOTIFICATION_CENTER),
                defaults.show_in_notification_shade,
            ),
            hide_on_security_page: flag(
                &frame(keys::HIDE_ON_SECURITY_PAGE),
                defaults.hide_on_security_page,
            ),
            hide_on_notification_shade: flag(
                &frame(keys::HIDE_ON_NOTIFICATION_SHADE),
                defaults.hide_on_notification_shade,
            ),
            hide_on_face_widgets: flag(
                &frame(keys::HIDE_ON_FACEWIDGETS),
                defaults.hide_on_face_widgets,
            ),
            hide_on_edge_panel: flag(&frame(keys::HIDE_ON_EDGE_PANEL), defaults.hide_on_edge_panel),
            hide_on_notifications: flag(
                &frame(keys::HIDE_ON_NOTIFICATIONS),
                defaults.hide_on_notifications,
            ),
            hide_in_landscape: flag(keys::HIDE_IN_LANDSCAPE, defaults.hide_in_landscape),
            hide_when_keyboard_shown: flag(
                &frame(keys::HIDE_WHEN_KEYBOARD_SHOWN),
                defaults.hide_when_keyboard_shown,
            ),
            separate_lock_and_shade_position: flag(
                &frame(keys::SEPARATE_POS_FOR_LOCK_NC),
                defaults.separate_lock_and_shade_position,
            ),
            separate_landscape_layout: flag(
                keys::SEPARATE_LAYOUT_FOR_LANDSCAPE,
                defaults.separate_landscape_layout,
            ),
            dim_percent: dim,
        }
    }
}

impl IdFilters {
    pub fn from_preferences(store: &dyn PreferenceStore) -> Self {
        Self {
            present_ids: read_or_default(store, keys::PRESENT_IDS, BTreeSet::new()),
            non_present_ids: read_or_default(store, keys::NON_PRESENT_IDS, BTreeSet::new()),
        }
    }
}

pub fn hide_on_apps(store: &dyn PreferenceStore) -> BTreeSet<String> {
    read_or_default(store, keys::HIDE_FRAME_ON_APPS, BTreeSet::new())
}

#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: Mutex<BTreeMap<String, Value>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }
}

/// Preferences kept as one JSON object on disk. Every `set` rewrites the file.
#[derive(Debug)]
pub struct JsonFilePreferences {
    path: PathBuf,
    values: Mutex<BTreeMap<String, Value>>,
}

impl JsonFilePreferences {
    /// Opens `path`. A missing or empty file starts out empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("read preferences file {}", path.display()))?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).with_context(|| {
                    format!("deserialize preferences file {}", path.display())
                })?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_locked(&self, values: &BTreeMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create preferences folder {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(values).context("serialize preferences")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("write preferences file {}", self.path.display()))
    }
}

impl PreferenceStore for JsonFilePreferences {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow!("preferences lock poisoned"))?;
        values.insert(key.to_string(), value);
        self.write_locked(&values)
    }
}
