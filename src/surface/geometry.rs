use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::SurfaceId;
use crate::display::is_portrait_like;
use crate::events::{Axis, ResizeSide};
use crate::prefs::{self, PreferenceStore};
use crate::state::StateRecord;
use crate::visibility::{SurfaceConfig, SurfaceRuntimeState};

pub const POSITIONS_KEY: &str = "frame_positions_map";
pub const SIZES_KEY: &str = "frame_sizes_map";

/// Smallest width or height a resize may produce.
pub const MIN_EDGE: i32 = 1;

/// Placement of a surface. `x`/`y` are the offset of the surface centre
/// from the display centre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SurfaceGeometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Which fields differ between two geometries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeometryDiff {
    pub x: bool,
    pub y: bool,
    pub width: bool,
    pub height: bool,
}

impl GeometryDiff {
    pub fn between(current: &SurfaceGeometry, target: &SurfaceGeometry) -> Self {
        Self {
            x: current.x != target.x,
            y: current.y != target.y,
            width: current.width != target.width,
            height: current.height != target.height,
        }
    }

    pub fn any(&self) -> bool {
        self.x || self.y || self.width || self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutSlot {
    LockNormal,
    LockNotification,
    NotificationNormal,
    Preview,
    /// Frames other than the main one keep their own placement.
    Secondary(SurfaceId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutKey {
    pub slot: LayoutSlot,
    pub landscape: bool,
}

impl LayoutKey {
    pub fn portrait(slot: LayoutSlot) -> Self {
        Self {
            slot,
            landscape: false,
        }
    }

    pub fn as_portrait(self) -> Self {
        Self::portrait(self.slot)
    }

    /// Persisted key, e.g. `lock_normal_portrait`.
    pub fn key(&self) -> String {
        let orientation = if self.landscape { "landscape" } else { "portrait" };
        match self.slot {
            LayoutSlot::LockNormal => format!("lock_normal_{orientation}"),
            LayoutSlot::LockNotification => format!("lock_notification_{orientation}"),
            LayoutSlot::NotificationNormal => format!("notification_normal_{orientation}"),
            LayoutSlot::Preview => format!("preview_{orientation}"),
            LayoutSlot::Secondary(id) => format!("secondary_{}_{orientation}", id.0),
        }
    }

    fn uses_notification_defaults(&self) -> bool {
        matches!(
            self.slot,
            LayoutSlot::LockNotification | LayoutSlot::NotificationNormal
        )
    }
}

/// Picks the layout slot a surface should be placed with right now.
pub fn select_layout(
    surface: SurfaceId,
    config: &SurfaceConfig,
    runtime: &SurfaceRuntimeState,
    record: &StateRecord,
) -> LayoutKey {
    let landscape = config.separate_landscape_layout
        && !is_portrait_like(record.screen_orientation, record.natural_orientation);
    let slot = if runtime.is_preview {
        LayoutSlot::Preview
    } else if !surface.is_main() {
        LayoutSlot::Secondary(surface)
    } else if record.notifications_panel_fully_expanded && config.show_in_notification_shade {
        if record.was_on_keyguard && config.separate_lock_and_shade_position {
            LayoutSlot::LockNotification
        } else {
            LayoutSlot::NotificationNormal
        }
    } else {
        LayoutSlot::LockNormal
    };
    LayoutKey { slot, landscape }
}

/// Fallback placement for slots nobody saved yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutDefaults {
    #[serde(default = "default_frame_size")]
    pub frame_size: (i32, i32),
    #[serde(default = "default_notification_frame_size")]
    pub notification_frame_size: (i32, i32),
    #[serde(default = "default_notification_position")]
    pub notification_position: (i32, i32),
}

fn default_frame_size() -> (i32, i32) {
    (300, 300)
}

fn default_notification_frame_size() -> (i32, i32) {
    (300, 200)
}

fn default_notification_position() -> (i32, i32) {
    (0, -400)
}

impl Default for LayoutDefaults {
    fn default() -> Self {
        Self {
            frame_size: default_frame_size(),
            notification_frame_size: default_notification_frame_size(),
            notification_position: default_notification_position(),
        }
    }
}

/// Saved positions and sizes for every layout slot, shared by all frames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameLayouts {
    positions: BTreeMap<String, (i32, i32)>,
    sizes: BTreeMap<String, (i32, i32)>,
    defaults: LayoutDefaults,
}

impl FrameLayouts {
    pub fn new(defaults: LayoutDefaults) -> Self {
        Self {
            positions: BTreeMap::new(),
            sizes: BTreeMap::new(),
            defaults,
        }
    }

    /// Reads both maps from preferences. A missing or malformed map counts
    /// as empty.
    pub fn load(store: &dyn PreferenceStore, defaults: LayoutDefaults) -> Self {
        Self {
            positions: prefs::read_or_default(store, POSITIONS_KEY, BTreeMap::new()),
            sizes: prefs::read_or_default(store, SIZES_KEY, BTreeMap::new()),
            defaults,
        }
    }

    pub fn save(&self, store: &dyn PreferenceStore) -> anyhow::Result<()> {
        store.set(POSITIONS_KEY, serde_json::to_value(&self.positions)?)?;
        store.set(SIZES_KEY, serde_json::to_value(&self.sizes)?)?;
        Ok(())
    }

    pub fn position(&self, key: LayoutKey) -> (i32, i32) {
        if let Some(position) = self.positions.get(&key.key()) {
            return *position;
        }
        if key.landscape {
            return self.position(key.as_portrait());
        }
        if key.uses_notification_defaults() {
            self.defaults.notification_position
        } else {
            (0, 0)
        }
    }

    pub fn size(&self, key: LayoutKey) -> (i32, i32) {
        if let Some(size) = self.sizes.get(&key.key()) {
            return *size;
        }
        if key.landscape {
            return self.size(key.as_portrait());
        }
        if key.uses_notification_defaults() {
            self.defaults.notification_frame_size
        } else {
            self.defaults.frame_size
        }
    }

    pub fn geometry(&self, key: LayoutKey) -> SurfaceGeometry {
        let (x, y) = self.position(key);
        let (width, height) = self.size(key);
        SurfaceGeometry {
            x,
            y,
            width,
            height,
        }
    }

    pub fn set_geometry(&mut self, key: LayoutKey, geometry: SurfaceGeometry) {
        let name = key.key();
        self.positions.insert(name.clone(), (geometry.x, geometry.y));
        self.sizes.insert(name, (geometry.width, geometry.height));
    }

    pub fn apply_move(&mut self, key: LayoutKey, dx: i32, dy: i32) -> SurfaceGeometry {
        let mut geometry = self.geometry(key);
        geometry.x = geometry.x.saturating_add(dx);
        geometry.y = geometry.y.saturating_add(dy);
        self.set_geometry(key, geometry);
        geometry
    }

    /// Dragging an edge changes that dimension by `velocity` and shifts the
    /// centre by half of it so the opposite edge stays put.
    pub fn apply_resize(&mut self, key: LayoutKey, side: ResizeSide, velocity: i32) -> SurfaceGeometry {
        let mut geometry = self.geometry(key);
        let half = velocity / 2;
        match side {
            ResizeSide::Left => {
                geometry.width = geometry.width.saturating_sub(velocity);
                geometry.x = geometry.x.saturating_add(half);
            }
            ResizeSide::Top => {
                geometry.height = geometry.height.saturating_sub(velocity);
                geometry.y = geometry.y.saturating_add(half);
            }
            ResizeSide::Right => {
                geometry.width = geometry.width.saturating_add(velocity);
                geometry.x = geometry.x.saturating_add(half);
            }
            ResizeSide::Bottom => {
                geometry.height = geometry.height.saturating_add(velocity);
                geometry.y = geometry.y.saturating_add(half);
            }
        }
        geometry.width = geometry.width.max(MIN_EDGE);
        geometry.height = geometry.height.max(MIN_EDGE);
        self.set_geometry(key, geometry);
        geometry
    }

    pub fn center(&mut self, key: LayoutKey, axis: Axis) -> SurfaceGeometry {
        let mut geometry = self.geometry(key);
        match axis {
            Axis::Horizontal => geometry.x = 0,
            Axis::Vertical => geometry.y = 0,
        }
        self.set_geometry(key, geometry);
        geometry
    }
}
