use serde::{Deserialize, Serialize};

use crate::surface::LayoutDefaults;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    /// When enabled the engine initialises the logger at debug level.
    /// Defaults to `false` when the field is missing in the settings file.
    #[serde(default)]
    pub debug_logging: bool,
    /// Optional file that receives a copy of every log line.
    #[serde(default)]
    pub log_file: Option<String>,
    /// Threads that process platform signals. Signals for one display
    /// still run one at a time.
    #[serde(default = "default_signal_workers")]
    pub signal_workers: usize,
    /// Threads used to walk system UI node trees.
    #[serde(default = "default_traversal_workers")]
    pub traversal_workers: usize,
    /// Pixel-style system UI, which exposes a settings container button in
    /// the expanded shade.
    #[serde(default)]
    pub pixel_ui: bool,
    /// Platform offers a dim-behind window flag.
    #[serde(default = "default_supports_dim_behind")]
    pub supports_dim_behind: bool,
    /// Close the widget drawer when the notification shade opens.
    #[serde(default = "default_close_drawer")]
    pub close_drawer_on_notification_shade: bool,
    /// Preference file holding frame configuration and saved layouts.
    #[serde(default)]
    pub preferences_file: Option<String>,
    #[serde(default)]
    pub layout_defaults: LayoutDefaults,
}

fn default_signal_workers() -> usize {
    4
}

fn default_traversal_workers() -> usize {
    4
}

fn default_supports_dim_behind() -> bool {
    true
}

fn default_close_drawer() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug_logging: false,
            log_file: None,
            signal_workers: default_signal_workers(),
            traversal_workers: default_traversal_workers(),
            pixel_ui: false,
            supports_dim_behind: default_supports_dim_behind(),
            close_drawer_on_notification_shade: default_close_drawer(),
            preferences_file: None,
            layout_defaults: LayoutDefaults::default(),
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Worker counts with zero bumped to one.
    pub fn pool_sizes(&self) -> (usize, usize) {
        (self.signal_workers.max(1), self.traversal_workers.max(1))
    }
}
