pub mod display;
pub mod engine;
pub mod events;
pub mod logging;
pub mod platform;
pub mod pool;
pub mod prefs;
pub mod replay;
pub mod settings;
pub mod state;
pub mod surface;
pub mod visibility;
pub mod window;

pub use engine::{Engine, Signal};
pub use settings::Settings;
