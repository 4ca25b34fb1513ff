pub mod builder;
pub mod ids;
pub mod memory;
pub mod node;
pub mod snapshot;

pub use builder::{SnapshotOptions, WindowSnapshotBuilder};
pub use node::{AccessNode, NodeRef, PlatformWindow, TraversalError, WindowRef, WindowSource, WindowType};
pub use snapshot::{Classification, NodeSummary, SystemUiMarkers, WindowEntry, WindowSnapshot};
