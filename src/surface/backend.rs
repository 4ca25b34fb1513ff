use std::sync::Arc;

use super::geometry::SurfaceGeometry;
use super::SurfaceId;
use crate::display::DisplayId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceError {
    #[error("surface {0} is already attached")]
    AlreadyAttached(SurfaceId),
    #[error("surface {0} is not attached")]
    NotAttached(SurfaceId),
    #[error("window manager unavailable: {0}")]
    Unavailable(String),
    #[error("platform rejected the request: {0}")]
    Rejected(String),
}

/// Everything the window manager needs to place one surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceSpec {
    pub surface: SurfaceId,
    pub display: DisplayId,
    pub geometry: SurfaceGeometry,
    pub keep_screen_on: bool,
    /// Dim amount behind the surface in percent, when the platform can dim.
    pub dim_behind: Option<u8>,
}

/// Overlay window manager. Implementations are only ever called from the
/// UI context.
pub trait OverlayWindowManager: Send {
    fn attach(&mut self, spec: &SurfaceSpec) -> Result<(), SurfaceError>;
    fn detach(&mut self, surface: SurfaceId) -> Result<(), SurfaceError>;
    fn update_geometry(&mut self, spec: &SurfaceSpec) -> Result<(), SurfaceError>;
}

/// Enter/exit animations. Both calls return once the animation finished.
pub trait SurfaceAnimator: Send {
    fn animate_in(&mut self, surface: SurfaceId);
    fn animate_out(&mut self, surface: SurfaceId);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAnimator;

impl SurfaceAnimator for NoopAnimator {
    fn animate_in(&mut self, _surface: SurfaceId) {}
    fn animate_out(&mut self, _surface: SurfaceId) {}
}

/// Platform capability for dimming whatever sits behind a surface.
pub trait DimBehindController: Send + Sync {
    fn apply(&self, spec: &mut SurfaceSpec, percent: u8);
}

/// Platforms with a dim-behind window flag.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlagDimBehind;

impl DimBehindController for FlagDimBehind {
    fn apply(&self, spec: &mut SurfaceSpec, percent: u8) {
        spec.dim_behind = (percent > 0).then_some(percent.min(100));
    }
}

/// Platforms without one. Dimming is skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedDimBehind;

impl DimBehindController for UnsupportedDimBehind {
    fn apply(&self, spec: &mut SurfaceSpec, percent: u8) {
        if percent > 0 {
            tracing::trace!(surface = %spec.surface, percent, "dim behind not supported");
        }
        spec.dim_behind = None;
    }
}

pub fn select_dim_behind(supports_flag: bool) -> Arc<dyn DimBehindController> {
    if supports_flag {
        Arc::new(FlagDimBehind)
    } else {
        Arc::new(UnsupportedDimBehind)
    }
}
