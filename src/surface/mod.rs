pub mod backend;
pub mod controller;
pub mod geometry;
pub mod guard;
pub mod recording;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use backend::{
    select_dim_behind, DimBehindController, FlagDimBehind, NoopAnimator, OverlayWindowManager,
    SurfaceAnimator, SurfaceError, SurfaceSpec, UnsupportedDimBehind,
};
pub use controller::{
    OverlaySurfaceController, ReevaluateHook, SurfaceBackends, SurfaceContext, TransitionOutcome,
};
pub use geometry::{FrameLayouts, GeometryDiff, LayoutDefaults, LayoutKey, LayoutSlot, SurfaceGeometry};
pub use guard::{AnimationGuard, TransitionGuard};

/// Overlay surface identifier. The main frame is `-1`; secondary frames use
/// their positive frame ids.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SurfaceId(pub i32);

impl SurfaceId {
    pub const MAIN: SurfaceId = SurfaceId(-1);

    pub fn is_main(self) -> bool {
        self == Self::MAIN
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_main() {
            write!(f, "frame#main")
        } else {
            write!(f, "frame#{}", self.0)
        }
    }
}
