//! Signal sources the engine reads platform facts from, plus an in-memory
//! platform for tests and replays.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::display::{DisplayId, DisplayInfo, DisplayRegistry};
use crate::window::memory::MemoryWindowSource;
use crate::window::{WindowRef, WindowSource};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("{0} service unavailable")]
    Unavailable(&'static str),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("{0}")]
    Other(String),
}

pub trait PowerState: Send + Sync {
    fn is_screen_on(&self, display: DisplayId) -> bool;
}

pub trait LockState: Send + Sync {
    fn is_locked(&self) -> bool;
}

pub trait NotificationState: Send + Sync {
    fn visible_count(&self) -> u32;
}

pub trait KeyboardState: Send + Sync {
    /// Height of the input method window on `display`.
    fn input_method_height(&self, display: DisplayId) -> Result<u32, PlatformError>;
}

pub trait DisplaySource: Send + Sync {
    fn display(&self, id: DisplayId) -> Option<DisplayInfo>;
    fn displays(&self) -> Vec<DisplayId>;
}

/// Whether a keyboard covers part of `display_id`. Read errors count as hidden.
pub fn keyboard_showing(keyboard: &dyn KeyboardState, display_id: DisplayId) -> bool {
    match keyboard.input_method_height(display_id) {
        Ok(height) => height > 0,
        Err(err) => {
            tracing::trace!(display = %display_id, %err, "keyboard height unavailable");
            false
        }
    }
}

/// Every collaborator the engine polls.
#[derive(Clone)]
pub struct Platform {
    pub windows: Arc<dyn WindowSource>,
    pub power: Arc<dyn PowerState>,
    pub lock: Arc<dyn LockState>,
    pub notifications: Arc<dyn NotificationState>,
    pub keyboard: Arc<dyn KeyboardState>,
    pub displays: Arc<dyn DisplaySource>,
}

/// Platform whose facts are set by hand.
#[derive(Default)]
pub struct MemoryPlatform {
    windows: MemoryWindowSource,
    displays: DisplayRegistry,
    screen_on: RwLock<BTreeMap<DisplayId, bool>>,
    keyboard: RwLock<BTreeMap<DisplayId, Result<u32, PlatformError>>>,
    locked: AtomicBool,
    notifications: AtomicU32,
}

impl MemoryPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bundle with every seam pointing at this platform.
    pub fn platform(self: &Arc<Self>) -> Platform {
        Platform {
            windows: self.clone(),
            power: self.clone(),
            lock: self.clone(),
            notifications: self.clone(),
            keyboard: self.clone(),
            displays: self.clone(),
        }
    }

    pub fn window_source(&self) -> &MemoryWindowSource {
        &self.windows
    }

    pub fn set_windows(&self, display: DisplayId, windows: Vec<WindowRef>) {
        self.windows.set_windows(display, windows);
    }

    /// Returns `false` when the display was ignored.
    pub fn set_display(&self, info: DisplayInfo) -> bool {
        self.displays.upsert(info)
    }

    pub fn remove_display(&self, id: DisplayId) -> Option<DisplayInfo> {
        self.displays.remove(id)
    }

    pub fn set_screen_on(&self, display: DisplayId, on: bool) {
        self.screen_on
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(display, on);
    }

    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::SeqCst);
    }

    pub fn set_notification_count(&self, count: u32) {
        self.notifications.store(count, Ordering::SeqCst);
    }

    pub fn set_keyboard_height(&self, display: DisplayId, height: Result<u32, PlatformError>) {
        self.keyboard
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(display, height);
    }
}

impl WindowSource for MemoryPlatform {
    fn on_screen_windows(&self, display: DisplayId) -> Option<Vec<WindowRef>> {
        self.windows.on_screen_windows(display)
    }
}

impl PowerState for MemoryPlatform {
    fn is_screen_on(&self, display: DisplayId) -> bool {
        self.screen_on
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&display)
            .copied()
            .unwrap_or(false)
    }
}

impl LockState for MemoryPlatform {
    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }
}

impl NotificationState for MemoryPlatform {
    fn visible_count(&self) -> u32 {
        self.notifications.load(Ordering::SeqCst)
    }
}

impl KeyboardState for MemoryPlatform {
    fn input_method_height(&self, display: DisplayId) -> Result<u32, PlatformError> {
        self.keyboard
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&display)
            .cloned()
            .unwrap_or(Ok(0))
    }
}

impl DisplaySource for MemoryPlatform {
    fn display(&self, id: DisplayId) -> Option<DisplayInfo> {
        self.displays.get(id)
    }

    fn displays(&self) -> Vec<DisplayId> {
        self.displays.ids()
    }
}
