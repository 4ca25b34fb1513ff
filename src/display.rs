use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

/// Logical display identifier. `0` is the built-in default display.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DisplayId(pub u32);

impl DisplayId {
    pub const DEFAULT: DisplayId = DisplayId(0);

    pub fn is_default(self) -> bool {
        self == Self::DEFAULT
    }
}

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "display#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    #[serde(rename = "0")]
    R0,
    #[serde(rename = "90")]
    R90,
    #[serde(rename = "180")]
    R180,
    #[serde(rename = "270")]
    R270,
}

impl Rotation {
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::R0),
            90 => Some(Rotation::R90),
            180 => Some(Rotation::R180),
            270 => Some(Rotation::R270),
            _ => None,
        }
    }

    pub fn degrees(self) -> i32 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }

    /// `true` for 90° and 270°.
    pub fn is_quarter_turn(self) -> bool {
        matches!(self, Rotation::R90 | Rotation::R270)
    }
}

/// How the panel is mounted when the rotation is 0°.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NaturalOrientation {
    #[default]
    Portrait,
    Landscape,
}

/// Whether content is laid out portrait-like, measured relative to the
/// panel's natural orientation rather than to its current pixel size.
pub fn is_portrait_like(rotation: Rotation, natural: NaturalOrientation) -> bool {
    match natural {
        NaturalOrientation::Portrait => !rotation.is_quarter_turn(),
        NaturalOrientation::Landscape => rotation.is_quarter_turn(),
    }
}

/// Shape classification derived purely from the current width/height ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectClass {
    Tall,
    Square,
    Wide,
}

/// Ratios within this distance of 1.0 count as square.
pub const SQUARE_TOLERANCE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub id: DisplayId,
    /// Current width in pixels, already rotated.
    pub width: u32,
    /// Current height in pixels, already rotated.
    pub height: u32,
    #[serde(default)]
    pub rotation: Rotation,
    #[serde(default)]
    pub natural: NaturalOrientation,
    #[serde(default = "default_built_in")]
    pub built_in: bool,
}

fn default_built_in() -> bool {
    true
}

impl DisplayInfo {
    pub fn new(id: DisplayId, width: u32, height: u32) -> Self {
        Self {
            id,
            width,
            height,
            rotation: Rotation::R0,
            natural: if width > height {
                NaturalOrientation::Landscape
            } else {
                NaturalOrientation::Portrait
            },
            built_in: true,
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        if rotation.is_quarter_turn() != self.rotation.is_quarter_turn() {
            std::mem::swap(&mut self.width, &mut self.height);
        }
        self.rotation = rotation;
        self
    }

    pub fn is_portrait_like(&self) -> bool {
        is_portrait_like(self.rotation, self.natural)
    }

    /// Shape guess from the current pixel size. Ignores rotation entirely,
    /// so it can disagree with [`DisplayInfo::is_portrait_like`] on square
    /// panels.
    pub fn aspect_class(&self) -> AspectClass {
        if self.width == 0 || self.height == 0 {
            return AspectClass::Square;
        }
        let ratio = f64::from(self.width) / f64::from(self.height);
        if (ratio - 1.0).abs() <= SQUARE_TOLERANCE {
            AspectClass::Square
        } else if ratio < 1.0 {
            AspectClass::Tall
        } else {
            AspectClass::Wide
        }
    }
}

/// Known displays. Only built-in panels are tracked.
#[derive(Debug, Default)]
pub struct DisplayRegistry {
    displays: RwLock<BTreeMap<DisplayId, DisplayInfo>>,
}

impl DisplayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a display. Returns `false` for non built-in panels,
    /// which are ignored.
    pub fn upsert(&self, info: DisplayInfo) -> bool {
        if !info.built_in {
            tracing::debug!(display = %info.id, "ignoring external display");
            return false;
        }
        self.displays
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(info.id, info);
        true
    }

    pub fn remove(&self, id: DisplayId) -> Option<DisplayInfo> {
        self.displays
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    pub fn get(&self, id: DisplayId) -> Option<DisplayInfo> {
        self.displays
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .copied()
    }

    /// Looks a display up from its string form, as stored in preferences.
    pub fn find_by_str(&self, raw: &str) -> Option<DisplayInfo> {
        let id = raw.trim().parse::<u32>().ok()?;
        self.get(DisplayId(id))
    }

    pub fn ids(&self) -> Vec<DisplayId> {
        self.displays
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portrait_like_follows_natural_orientation() {
        assert!(is_portrait_like(Rotation::R0, NaturalOrientation::Portrait));
        assert!(is_portrait_like(Rotation::R180, NaturalOrientation::Portrait));
        assert!(!is_portrait_like(Rotation::R90, NaturalOrientation::Portrait));
        assert!(is_portrait_like(Rotation::R270, NaturalOrientation::Landscape));
        assert!(!is_portrait_like(Rotation::R0, NaturalOrientation::Landscape));
    }

    #[test]
    fn rotating_swaps_dimensions_once() {
        let info = DisplayInfo::new(DisplayId::DEFAULT, 1080, 2400).with_rotation(Rotation::R90);
        assert_eq!((info.width, info.height), (2400, 1080));
        let info = info.with_rotation(Rotation::R270);
        assert_eq!((info.width, info.height), (2400, 1080));
        let info = info.with_rotation(Rotation::R0);
        assert_eq!((info.width, info.height), (1080, 2400));
    }

    #[test]
    fn aspect_class_detects_square_panels() {
        assert_eq!(DisplayInfo::new(DisplayId(1), 1000, 1050).aspect_class(), AspectClass::Square);
        assert_eq!(DisplayInfo::new(DisplayId(1), 1080, 2400).aspect_class(), AspectClass::Tall);
        assert_eq!(DisplayInfo::new(DisplayId(1), 2400, 1080).aspect_class(), AspectClass::Wide);
    }

    #[test]
    fn registry_skips_external_displays() {
        let registry = DisplayRegistry::new();
        let mut external = DisplayInfo::new(DisplayId(3), 1920, 1080);
        external.built_in = false;
        assert!(!registry.upsert(external));
        assert!(registry.upsert(DisplayInfo::new(DisplayId(1), 1080, 1920)));
        assert_eq!(registry.ids(), vec![DisplayId(1)]);
        assert!(registry.find_by_str(" 1 ").is_some());
        assert!(registry.find_by_str("x").is_none());
    }
}
