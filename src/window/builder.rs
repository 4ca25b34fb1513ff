use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use super::ids;
use super::node::{NodeRef, WindowRef, WindowType};
use super::snapshot::{Classification, NodeSummary, SystemUiMarkers, WindowEntry, WindowSnapshot};
use crate::display::DisplayId;
use crate::pool::WorkerPool;

/// Classifier knobs that come from user preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotOptions {
    /// Count the Pixel-style settings container when judging shade expansion.
    pub pixel_ui: bool,
    /// Packages whose presence anywhere on screen hides the overlay.
    pub hide_on_apps: BTreeSet<String>,
}

/// Turns a window list into a [`WindowSnapshot`].
///
/// System UI trees are walked on the traversal pool; `build` blocks until
/// every fanned-out visit finished. Must not be called from a job running on
/// the same pool.
pub struct WindowSnapshotBuilder {
    pool: Arc<WorkerPool>,
    generation: AtomicU64,
}

impl WindowSnapshotBuilder {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self {
            pool,
            generation: AtomicU64::new(0),
        }
    }

    pub fn build(
        &self,
        display: DisplayId,
        windows: &[WindowRef],
        options: &SnapshotOptions,
    ) -> WindowSnapshot {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let mut snapshot = WindowSnapshot::empty(display, generation);
        let mut system_ui_roots = Vec::new();

        for (index, window) in windows.iter().enumerate() {
            let window_type = window.window_type();
            let root = match window.root() {
                Ok(root) => Some(root),
                Err(err) => {
                    tracing::trace!(index, %err, "window root unavailable");
                    None
                }
            };
            let package = root
                .as_ref()
                .and_then(|root| root.package().map(str::to_owned));
            let package_is = |name: &str| package.as_deref() == Some(name);

            let is_system_ui = package_is(ids::SYSTEM_UI_PACKAGE);
            let is_application = window_type == WindowType::Application
                || (window_type == WindowType::Unknown && package_is(ids::ASSISTANT_PACKAGE));
            let classification = if is_system_ui {
                Classification::SystemUi
            } else if is_application {
                Classification::Application
            } else {
                Classification::Other
            };
            let is_focused = window.is_focused();
            let is_active = window.is_active();

            if is_application && snapshot.top_application_window_index.is_none() {
                snapshot.top_application_window_index = Some(index);
                snapshot.top_application_package = package.clone();
            }
            if snapshot.top_non_system_ui_window_index.is_none()
                && window_type != WindowType::Application
                && window_type != WindowType::AccessibilityOverlay
                && !is_system_ui
            {
                snapshot.top_non_system_ui_window_index = Some(index);
            }
            if is_system_ui {
                snapshot.min_system_ui_window_index.get_or_insert(index);
                if let Some(root) = root {
                    system_ui_roots.push((index, root));
                }
            }

            snapshot.has_edge_panel |= package_is(ids::EDGE_PANEL_PACKAGE) && is_focused && is_active;
            snapshot.has_screen_off_memo |= package_is(ids::SCREEN_OFF_MEMO_PACKAGE);
            snapshot.has_face_widgets_window |= package_is(ids::FACE_WIDGETS_PACKAGE);
            snapshot.has_hide_on_app_window |= package
                .as_ref()
                .is_some_and(|p| options.hide_on_apps.contains(p));

            snapshot.windows.push(WindowEntry {
                index,
                classification,
                window_type,
                package,
                is_focused,
                is_active,
            });
        }

        let walked = self.walk(system_ui_roots);
        snapshot.visible_ids = walked
            .nodes
            .iter()
            .filter(|node| node.visible)
            .filter_map(|node| node.view_id.clone())
            .collect();
        snapshot.markers = SystemUiMarkers::from_visible_ids(&snapshot.visible_ids, options.pixel_ui);
        snapshot.nodes = walked.nodes;
        snapshot.skipped_nodes = walked.skipped;

        tracing::trace!(
            display = %snapshot.display,
            generation,
            windows = snapshot.len(),
            nodes = snapshot.nodes.len(),
            skipped = snapshot.skipped_nodes,
            "window snapshot built"
        );
        snapshot
    }

    fn walk(&self, roots: Vec<(usize, NodeRef)>) -> Walked {
        if roots.is_empty() {
            return Walked::default();
        }

        let walk = Arc::new(Walk::new(Arc::clone(&self.pool)));
        for (window_index, root) in roots {
            let ticket = walk.ticket();
            let walk_for_job = Arc::clone(&walk);
            self.pool.execute(move || {
                let _ticket = ticket;
                walk_for_job.explore(root, window_index, Vec::new());
            });
        }
        walk.wait();

        let mut nodes = std::mem::take(&mut *walk.nodes.lock().unwrap_or_else(PoisonError::into_inner));
        nodes.sort();
        Walked {
            nodes,
            skipped: walk.skipped.load(Ordering::SeqCst),
        }
    }
}

#[derive(Default)]
struct Walked {
    nodes: Vec<NodeSummary>,
    skipped: usize,
}

/// Shared state of one multi-threaded tree walk.
struct Walk {
    pool: Arc<WorkerPool>,
    nodes: Mutex<Vec<NodeSummary>>,
    skipped: AtomicUsize,
    pending: Mutex<usize>,
    finished: Condvar,
}

/// Outstanding unit of work. Dropping it, even while unwinding, marks the
/// work done so [`Walk::wait`] cannot hang on a panicking node.
struct WalkTicket(Arc<Walk>);

impl Drop for WalkTicket {
    fn drop(&mut self) {
        let mut pending = self.0.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.0.finished.notify_all();
        }
    }
}

impl Walk {
    fn new(pool: Arc<WorkerPool>) -> Self {
        Self {
            pool,
            nodes: Mutex::new(Vec::new()),
            skipped: AtomicUsize::new(0),
            pending: Mutex::new(0),
            finished: Condvar::new(),
        }
    }

    fn ticket(self: &Arc<Self>) -> WalkTicket {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        WalkTicket(Arc::clone(self))
    }

    fn wait(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        while *pending > 0 {
            pending = self
                .finished
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Records `node` and schedules one fetch per child.
    fn explore(self: &Arc<Self>, node: NodeRef, window_index: usize, path: Vec<u32>) {
        let child_count = node.child_count();
        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(NodeSummary {
                window_index,
                path: path.clone(),
                view_id: node.view_id().map(str::to_owned),
                visible: node.is_visible_to_user(),
            });

        for child_index in 0..child_count {
            let ticket = self.ticket();
            let walk = Arc::clone(self);
            let parent = Arc::clone(&node);
            let mut child_path = path.clone();
            child_path.push(u32::try_from(child_index).unwrap_or(u32::MAX));
            self.pool.execute(move || {
                let _ticket = ticket;
                match parent.child(child_index) {
                    Ok(child) => walk.explore(child, window_index, child_path),
                    Err(err) => {
                        walk.skipped.fetch_add(1, Ordering::SeqCst);
                        tracing::trace!(window_index, ?child_path, %err, "skipping unreadable node");
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::memory::{MemoryNode, MemoryWindow};
    use crate::window::node::TraversalError;

    fn pool() -> Arc<WorkerPool> {
        Arc::new(WorkerPool::new("walk-test", 4).expect("pool"))
    }

    fn sysui_tree() -> MemoryNode {
        MemoryNode::system_ui("root")
            .with_child(
                MemoryNode::system_ui("notification_panel")
                    .with_child(MemoryNode::system_ui("clear_all"))
                    .with_child(MemoryNode::system_ui("more_button").hidden()),
            )
            .with_child(MemoryNode::system_ui("keyguard_indication_text_bottom"))
            .with_failed_child(TraversalError::Disposed)
    }

    #[test]
    fn first_application_window_wins() {
        let builder = WindowSnapshotBuilder::new(pool());
        let windows: Vec<WindowRef> = vec![
            MemoryWindow::system_ui(sysui_tree()).into_ref(),
            MemoryWindow::application("com.example.first").into_ref(),
            MemoryWindow::application("com.example.second").into_ref(),
        ];
        let snapshot = builder.build(DisplayId::DEFAULT, &windows, &SnapshotOptions::default());

        assert_eq!(snapshot.top_application_window_index, Some(1));
        assert_eq!(snapshot.top_application_package.as_deref(), Some("com.example.first"));
        assert_eq!(snapshot.min_system_ui_window_index, Some(0));
        assert_eq!(snapshot.app_layer().map(|l| l.get()), Some(2));
    }

    #[test]
    fn hidden_nodes_are_collected_but_not_named() {
        let builder = WindowSnapshotBuilder::new(pool());
        let windows: Vec<WindowRef> = vec![MemoryWindow::system_ui(sysui_tree()).into_ref()];
        let snapshot = builder.build(DisplayId::DEFAULT, &windows, &SnapshotOptions::default());

        assert_eq!(snapshot.nodes.len(), 5);
        assert_eq!(snapshot.skipped_nodes, 1);
        assert!(snapshot.visible_ids.contains(&ids::system_ui_id("clear_all")));
        assert!(!snapshot.visible_ids.contains(&ids::system_ui_id("more_button")));
        assert!(snapshot.markers.on_main_lockscreen);
        assert!(!snapshot.markers.notifications_panel_fully_expanded());
    }

    #[test]
    fn unreadable_root_still_yields_entry() {
        let builder = WindowSnapshotBuilder::new(pool());
        let windows: Vec<WindowRef> = vec![
            MemoryWindow::without_root(WindowType::Application).into_ref(),
            MemoryWindow::system_ui(sysui_tree()).into_ref(),
        ];
        let snapshot = builder.build(DisplayId::DEFAULT, &windows, &SnapshotOptions::default());

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.top_application_window_index, Some(0));
        assert_eq!(snapshot.top_application_package, None);
        assert_eq!(snapshot.windows[0].classification, Classification::Application);
    }

    #[test]
    fn assistant_with_unknown_type_counts_as_application() {
        let builder = WindowSnapshotBuilder::new(pool());
        let windows: Vec<WindowRef> = vec![MemoryWindow::new(
            WindowType::Unknown,
            Some(MemoryNode::new(None).with_package(ids::ASSISTANT_PACKAGE)),
        )
        .into_ref()];
        let snapshot = builder.build(DisplayId::DEFAULT, &windows, &SnapshotOptions::default());
        assert_eq!(snapshot.top_application_window_index, Some(0));
    }

    #[test]
    fn top_non_system_ui_skips_apps_and_overlays() {
        let builder = WindowSnapshotBuilder::new(pool());
        let windows: Vec<WindowRef> = vec![
            MemoryWindow::new(
                WindowType::AccessibilityOverlay,
                Some(MemoryNode::new(None).with_package("com.example.overlay")),
            )
            .into_ref(),
            MemoryWindow::system_ui(MemoryNode::system_ui("root")).into_ref(),
            MemoryWindow::application("com.example.app").into_ref(),
            MemoryWindow::new(
                WindowType::InputMethod,
                Some(MemoryNode::new(None).with_package("com.example.ime")),
            )
            .into_ref(),
        ];
        let snapshot = builder.build(DisplayId::DEFAULT, &windows, &SnapshotOptions::default());
        assert_eq!(snapshot.top_non_system_ui_window_index, Some(3));
        assert_eq!(snapshot.system_layer().map(|l| l.get()), Some(1));
    }

    #[test]
    fn vendor_overlays_and_hidden_apps_are_flagged() {
        let builder = WindowSnapshotBuilder::new(pool());
        let edge = MemoryWindow::new(
            WindowType::System,
            Some(MemoryNode::new(None).with_package(ids::EDGE_PANEL_PACKAGE)),
        );
        let windows: Vec<WindowRef> = vec![
            edge.clone().into_ref(),
            MemoryWindow::new(
                WindowType::System,
                Some(MemoryNode::new(None).with_package(ids::SCREEN_OFF_MEMO_PACKAGE)),
            )
            .into_ref(),
            MemoryWindow::application("com.example.banking").into_ref(),
        ];
        let options = SnapshotOptions {
            pixel_ui: false,
            hide_on_apps: ["com.example.banking".to_string()].into_iter().collect(),
        };
        let snapshot = builder.build(DisplayId::DEFAULT, &windows, &options);
        assert!(!snapshot.has_edge_panel, "edge panel needs focus and activity");
        assert!(snapshot.has_screen_off_memo);
        assert!(snapshot.has_hide_on_app_window);

        let focused: Vec<WindowRef> = vec![edge.focused(true).active(true).into_ref()];
        let snapshot = builder.build(DisplayId::DEFAULT, &focused, &options);
        assert!(snapshot.has_edge_panel);
    }

    #[test]
    fn generations_increase() {
        let builder = WindowSnapshotBuilder::new(pool());
        let first = builder.build(DisplayId::DEFAULT, &[], &SnapshotOptions::default());
        let second = builder.build(DisplayId::DEFAULT, &[], &SnapshotOptions::default());
        assert!(second.generation > first.generation);
        assert!(first.is_empty());
    }
}
