pub mod derive;
pub mod record;
pub mod store;

pub use derive::{derive_update, IdFilters};
pub use record::{Layer, StateRecord, StateUpdate, SurfaceRecord};
pub use store::{Observation, Published, StateStore, Watch};
