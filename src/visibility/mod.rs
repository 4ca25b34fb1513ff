//! Pure show/hide decision for one surface.

pub mod inputs;
pub mod modes;

pub use inputs::{SurfaceConfig, SurfaceRuntimeState};
pub use modes::{evaluate, should_show, Decision, DecisionInput, Mode, MODE_PRECEDENCE};
