//! In-memory window trees for replays, benches and tests.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::ids;
use super::node::{AccessNode, NodeRef, PlatformWindow, TraversalError, WindowRef, WindowSource, WindowType};
use crate::display::DisplayId;

/// Plain, serializable node description. Call [`MemoryNode::freeze`] to get
/// something the snapshot builder can walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryNode {
    #[serde(default)]
    pub package: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub children: Vec<MemoryChild>,
}

fn default_visible() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MemoryChild {
    /// A child whose fetch fails with `error`.
    Failed { error: TraversalError },
    Node(MemoryNode),
}

impl MemoryNode {
    pub fn new(id: Option<&str>) -> Self {
        Self {
            package: None,
            id: id.map(str::to_owned),
            visible: true,
            children: Vec::new(),
        }
    }

    /// Node owned by system UI with a short id such as `clear_all`.
    pub fn system_ui(short_id: &str) -> Self {
        Self::new(Some(&ids::system_ui_id(short_id))).with_package(ids::SYSTEM_UI_PACKAGE)
    }

    pub fn with_package(mut self, package: &str) -> Self {
        self.package = Some(package.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn with_child(mut self, child: MemoryNode) -> Self {
        self.children.push(MemoryChild::Node(child));
        self
    }

    pub fn with_failed_child(mut self, error: TraversalError) -> Self {
        self.children.push(MemoryChild::Failed { error });
        self
    }

    pub fn freeze(&self) -> NodeRef {
        Arc::new(self.frozen())
    }

    fn frozen(&self) -> FrozenNode {
        FrozenNode {
            package: self.package.clone(),
            id: self.id.clone(),
            visible: self.visible,
            children: self
                .children
                .iter()
                .map(|child| match child {
                    MemoryChild::Node(node) => Ok(Arc::new(node.frozen()) as NodeRef),
                    MemoryChild::Failed { error } => Err(error.clone()),
                })
                .collect(),
        }
    }
}

struct FrozenNode {
    package: Option<String>,
    id: Option<String>,
    visible: bool,
    children: Vec<Result<NodeRef, TraversalError>>,
}

impl AccessNode for FrozenNode {
    fn package(&self) -> Option<&str> {
        self.package.as_deref()
    }

    fn view_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn is_visible_to_user(&self) -> bool {
        self.visible
    }

    fn child_count(&self) -> usize {
        self.children.len()
    }

    fn child(&self, index: usize) -> Result<NodeRef, TraversalError> {
        match self.children.get(index) {
            Some(Ok(node)) => Ok(Arc::clone(node)),
            Some(Err(err)) => Err(err.clone()),
            None => Err(TraversalError::ConcurrentModification),
        }
    }
}

#[derive(Clone)]
pub struct MemoryWindow {
    window_type: WindowType,
    focused: bool,
    active: bool,
    root: Option<NodeRef>,
}

impl MemoryWindow {
    pub fn new(window_type: WindowType, root: Option<MemoryNode>) -> Self {
        Self {
            window_type,
            focused: false,
            active: false,
            root: root.map(|node| node.freeze()),
        }
    }

    pub fn system_ui(root: MemoryNode) -> Self {
        Self::new(WindowType::System, Some(root))
    }

    pub fn application(package: &str) -> Self {
        Self::new(WindowType::Application, Some(MemoryNode::new(None).with_package(package)))
    }

    /// A window whose root fetch reports the node as disposed.
    pub fn without_root(window_type: WindowType) -> Self {
        Self::new(window_type, None)
    }

    pub fn focused(mut self, focused: bool) -> Self {
        self.focused = focused;
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn into_ref(self) -> WindowRef {
        Arc::new(self)
    }
}

impl PlatformWindow for MemoryWindow {
    fn window_type(&self) -> WindowType {
        self.window_type
    }

    fn is_focused(&self) -> bool {
        self.focused
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn root(&self) -> Result<NodeRef, TraversalError> {
        self.root.clone().ok_or(TraversalError::Disposed)
    }
}

/// Serializable form of a [`MemoryWindow`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    #[serde(default, rename = "type")]
    pub window_type: WindowType,
    #[serde(default)]
    pub focused: bool,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub root: Option<MemoryNode>,
}

impl WindowSpec {
    pub fn to_window(&self) -> MemoryWindow {
        MemoryWindow::new(self.window_type, self.root.clone())
            .focused(self.focused)
            .active(self.active)
    }
}

/// Window lists keyed by display. Displays never set enumerate as empty.
#[derive(Default)]
pub struct MemoryWindowSource {
    windows: RwLock<HashMap<DisplayId, Vec<WindowRef>>>,
    unavailable: RwLock<bool>,
}

impl MemoryWindowSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_windows(&self, display: DisplayId, windows: Vec<WindowRef>) {
        self.windows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(display, windows);
    }

    /// Makes enumeration fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().unwrap_or_else(PoisonError::into_inner) = unavailable;
    }
}

impl WindowSource for MemoryWindowSource {
    fn on_screen_windows(&self, display: DisplayId) -> Option<Vec<WindowRef>> {
        if *self.unavailable.read().unwrap_or_else(PoisonError::into_inner) {
            return None;
        }
        Some(
            self.windows
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&display)
                .cloned()
                .unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_failed_children_separately_from_nodes() {
        let json = r#"{
            "package": "com.android.systemui",
            "id": "com.android.systemui:id/root",
            "children": [
                {"error": "disposed"},
                {"id": "com.android.systemui:id/clear_all", "visible": false}
            ]
        }"#;
        let node: MemoryNode = serde_json::from_str(json).expect("parse node");
        assert_eq!(node.children.len(), 2);
        assert!(matches!(
            node.children[0],
            MemoryChild::Failed { error: TraversalError::Disposed }
        ));
        let frozen = node.freeze();
        assert!(frozen.child(0).is_err());
        let second = frozen.child(1).expect("second child");
        assert!(!second.is_visible_to_user());
        assert!(frozen.child(2).is_err());
    }

    #[test]
    fn window_source_reports_unavailable() {
        let source = MemoryWindowSource::new();
        assert_eq!(source.on_screen_windows(DisplayId::DEFAULT).map(|w| w.len()), Some(0));
        source.set_unavailable(true);
        assert!(source.on_screen_windows(DisplayId::DEFAULT).is_none());
    }
}
