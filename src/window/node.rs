use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::display::DisplayId;

/// Why a node could not be read. Every variant means "treat the node as
/// absent"; none of them aborts a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalError {
    #[error("node is no longer available")]
    Disposed,
    #[error("permission denied while reading node")]
    PermissionDenied,
    #[error("node tree changed during traversal")]
    ConcurrentModification,
    #[error("node read failed: {0}")]
    Other(String),
}

pub type NodeRef = Arc<dyn AccessNode>;
pub type WindowRef = Arc<dyn PlatformWindow>;

/// One element of an accessibility-style UI tree.
pub trait AccessNode: Send + Sync {
    /// Package that owns the node.
    fn package(&self) -> Option<&str>;
    /// Fully-qualified resource name, e.g. `com.android.systemui:id/clear_all`.
    fn view_id(&self) -> Option<&str>;
    fn is_visible_to_user(&self) -> bool;
    fn child_count(&self) -> usize;
    fn child(&self, index: usize) -> Result<NodeRef, TraversalError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    Application,
    InputMethod,
    System,
    AccessibilityOverlay,
    SplitScreenDivider,
    MagnificationOverlay,
    #[default]
    Unknown,
}

/// A top-level on-screen window.
pub trait PlatformWindow: Send + Sync {
    fn window_type(&self) -> WindowType;
    fn is_focused(&self) -> bool;
    fn is_active(&self) -> bool;
    fn root(&self) -> Result<NodeRef, TraversalError>;
}

pub trait WindowSource: Send + Sync {
    /// Windows on `display`, topmost first. `None` when the platform
    /// refuses to enumerate right now.
    fn on_screen_windows(&self, display: DisplayId) -> Option<Vec<WindowRef>>;
}
