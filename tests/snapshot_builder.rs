use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use lockscreen_overlay::display::DisplayId;
use lockscreen_overlay::pool::WorkerPool;
use lockscreen_overlay::window::ids;
use lockscreen_overlay::window::memory::{MemoryNode, MemoryWindow};
use lockscreen_overlay::window::{
    AccessNode, NodeRef, PlatformWindow, SnapshotOptions, TraversalError, WindowRef,
    WindowSnapshot, WindowSnapshotBuilder, WindowType,
};

/// Node that stalls for a while before handing out children, so sibling
/// subtrees finish in a different order from run to run.
struct SlowNode {
    id: String,
    delay: Duration,
    children: Vec<Arc<SlowNode>>,
}

impl SlowNode {
    fn tree(prefix: &str, depth: u32, fan_out: u32, rng: &mut StdRng) -> Arc<SlowNode> {
        let delay = Duration::from_micros(rng.gen_range(0..400));
        let children = if depth == 0 {
            Vec::new()
        } else {
            (0..fan_out)
                .map(|i| Self::tree(&format!("{prefix}_{i}"), depth - 1, fan_out, rng))
                .collect()
        };
        Arc::new(SlowNode {
            id: ids::system_ui_id(prefix),
            delay,
            children,
        })
    }
}

impl AccessNode for SlowNode {
    fn package(&self) -> Option<&str> {
        Some(ids::SYSTEM_UI_PACKAGE)
    }

    fn view_id(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn is_visible_to_user(&self) -> bool {
        true
    }

    fn child_count(&self) -> usize {
        self.children.len()
    }

    fn child(&self, index: usize) -> Result<NodeRef, TraversalError> {
        sleep(self.delay);
        self.children
            .get(index)
            .map(|child| Arc::clone(child) as NodeRef)
            .ok_or(TraversalError::Disposed)
    }
}

struct SlowWindow(Arc<SlowNode>);

impl PlatformWindow for SlowWindow {
    fn window_type(&self) -> WindowType {
        WindowType::System
    }

    fn is_focused(&self) -> bool {
        false
    }

    fn is_active(&self) -> bool {
        false
    }

    fn root(&self) -> Result<NodeRef, TraversalError> {
        Ok(Arc::clone(&self.0) as NodeRef)
    }
}

fn windows(seed: u64) -> Vec<WindowRef> {
    let mut rng = StdRng::seed_from_u64(seed);
    vec![
        MemoryWindow::application("com.example.mail").into_ref(),
        Arc::new(SlowWindow(SlowNode::tree("status_bar", 3, 3, &mut rng))),
        MemoryWindow::new(
            WindowType::InputMethod,
            Some(MemoryNode::new(None).with_package("com.example.keyboard")),
        )
        .into_ref(),
        Arc::new(SlowWindow(SlowNode::tree("keyguard", 3, 4, &mut rng))),
        MemoryWindow::system_ui(
            MemoryNode::system_ui("root")
                .with_child(MemoryNode::system_ui("notification_panel"))
                .with_child(MemoryNode::system_ui("clear_all").hidden())
                .with_failed_child(TraversalError::PermissionDenied),
        )
        .into_ref(),
    ]
}

fn build(pool_size: usize, seed: u64) -> WindowSnapshot {
    let pool = Arc::new(WorkerPool::new("snapshot-test", pool_size).unwrap());
    let builder = WindowSnapshotBuilder::new(Arc::clone(&pool));
    let snapshot = builder.build(DisplayId::DEFAULT, &windows(seed), &SnapshotOptions::default());
    pool.shutdown();
    snapshot
}

#[test]
fn classification_is_independent_of_traversal_order() {
    let reference = build(1, 1);
    assert_eq!(reference.top_application_window_index, Some(0));
    assert_eq!(
        reference.top_application_package.as_deref(),
        Some("com.example.mail")
    );
    assert_eq!(reference.top_non_system_ui_window_index, Some(2));
    assert_eq!(reference.min_system_ui_window_index, Some(1));
    assert_eq!(reference.skipped_nodes, 1);
    assert!(reference.markers.on_main_lockscreen);
    assert!(!reference.markers.has_clear_all_button);

    for (pool_size, seed) in [(2, 7), (4, 99), (8, 12345), (8, 3)] {
        let other = build(pool_size, seed);
        assert_eq!(
            other.top_application_window_index,
            reference.top_application_window_index
        );
        assert_eq!(
            other.top_non_system_ui_window_index,
            reference.top_non_system_ui_window_index
        );
        assert_eq!(other.visible_ids, reference.visible_ids, "pool {pool_size}");
        assert_eq!(other.nodes, reference.nodes, "pool {pool_size}");
        assert_eq!(other.markers, reference.markers);
    }
}

#[test]
fn every_visible_node_is_collected() {
    let snapshot = build(4, 42);
    // 1 + 3 + 9 + 27 and 1 + 4 + 16 + 64, plus root and notification_panel.
    assert_eq!(snapshot.visible_ids.len(), 40 + 85 + 2);
    assert!(snapshot
        .visible_ids
        .contains(&ids::system_ui_id("keyguard_3_3_3")));
    assert!(!snapshot.visible_ids.contains(&ids::system_ui_id("clear_all")));
    assert!(snapshot
        .nodes
        .iter()
        .any(|node| node.view_id.as_deref() == Some(ids::system_ui_id("clear_all").as_str())
            && !node.visible));
}

#[test]
fn generations_increase_per_build() {
    let pool = Arc::new(WorkerPool::new("snapshot-test", 2).unwrap());
    let builder = WindowSnapshotBuilder::new(Arc::clone(&pool));
    let first = builder.build(DisplayId::DEFAULT, &[], &SnapshotOptions::default());
    let second = builder.build(DisplayId(1), &windows(5), &SnapshotOptions::default());
    assert!(second.generation > first.generation);
    assert!(first.is_empty());
    assert_eq!(first.app_layer(), None);
    assert_eq!(second.len(), 5);
    assert_eq!(second.app_layer().map(|layer| layer.get()), Some(5));
}
