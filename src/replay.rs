//! Scripted scenarios run against a real [`Engine`] on an in-memory
//! platform. Used by the `overlay_replay` binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::display::{DisplayId, DisplayInfo};
use crate::engine::{Engine, Signal};
use crate::events::{DrawerVisibilityChanged, FrameMoved, PreviewFrames, PreviewMode, TempHide};
use crate::platform::{MemoryPlatform, PlatformError};
use crate::prefs::{JsonFilePreferences, MemoryPreferences, PreferenceStore};
use crate::settings::Settings;
use crate::state::{StateRecord, SurfaceRecord};
use crate::surface::recording::{RecordingAnimator, RecordingWindowManager, SurfaceCall, SurfaceLog};
use crate::surface::SurfaceId;
use crate::visibility::SurfaceConfig;
use crate::window::memory::WindowSpec;
use crate::window::WindowRef;

const STEP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub displays: Vec<DisplayInfo>,
    /// Preferences written before any surface is registered.
    #[serde(default)]
    pub preferences: BTreeMap<String, Value>,
    #[serde(default)]
    pub surfaces: Vec<ScenarioSurface>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSurface {
    pub id: SurfaceId,
    #[serde(default)]
    pub display: DisplayId,
    /// Explicit configuration. Read from preferences when absent.
    #[serde(default)]
    pub config: Option<SurfaceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    ScreenOn {
        #[serde(default)]
        display: DisplayId,
        on: bool,
    },
    Locked {
        locked: bool,
    },
    NotificationCount {
        count: u32,
    },
    KeyboardHeight {
        #[serde(default)]
        display: DisplayId,
        height: Option<u32>,
    },
    Display {
        info: DisplayInfo,
    },
    Windows {
        #[serde(default)]
        display: DisplayId,
        windows: Vec<WindowSpec>,
    },
    Preference {
        key: String,
        value: Value,
    },
    ReloadPreferences,
    Signal {
        signal: Signal,
    },
    TempHide {
        surface: SurfaceId,
    },
    Preview {
        show: bool,
        #[serde(default)]
        include_main_frame: bool,
    },
    Move {
        surface: SurfaceId,
        dx: i32,
        dy: i32,
    },
    Drawer {
        open: bool,
    },
}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub index: usize,
    pub step: Step,
    pub calls: Vec<SurfaceCall>,
    /// `false` when the engine did not settle in time.
    pub settled: bool,
}

#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub steps: Vec<StepReport>,
    pub records: Vec<Arc<StateRecord>>,
    pub surfaces: Vec<Arc<SurfaceRecord>>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read scenario {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("deserialize scenario {}", path.display()))
    }
}

fn open_preferences(settings: &Settings) -> Result<Arc<dyn PreferenceStore>> {
    Ok(match settings.preferences_file.as_deref() {
        Some(path) => Arc::new(JsonFilePreferences::open(path)?),
        None => Arc::new(MemoryPreferences::new()),
    })
}

/// Runs every step, waiting for the engine to settle after each one.
pub fn run(scenario: &Scenario, settings: Settings) -> Result<ReplayReport> {
    let preferences = open_preferences(&settings)?;
    for (key, value) in &scenario.preferences {
        preferences
            .set(key, value.clone())
            .with_context(|| format!("seed preference {key}"))?;
    }

    let memory = MemoryPlatform::new();
    for info in &scenario.displays {
        memory.set_display(*info);
    }

    let engine = Engine::new(settings, memory.platform(), Some(Arc::clone(&preferences)))?;
    let log = SurfaceLog::new();
    for surface in &scenario.surfaces {
        let window_manager = Box::new(RecordingWindowManager::new(log.clone()));
        let animator = Box::new(RecordingAnimator::new(log.clone()));
        match &surface.config {
            Some(config) => engine.register_surface(
                surface.id,
                surface.display,
                config.clone(),
                window_manager,
                animator,
            )?,
            None => engine.register_surface_from_preferences(
                surface.id,
                surface.display,
                window_manager,
                animator,
            )?,
        };
    }
    if !engine.flush(STEP_TIMEOUT) {
        tracing::warn!("engine did not settle after registering surfaces");
    }
    log.take();

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        apply_step(&engine, &memory, preferences.as_ref(), step)
            .with_context(|| format!("step {index}"))?;
        let settled = engine.flush(STEP_TIMEOUT);
        if !settled {
            tracing::warn!(index, "engine did not settle");
        }
        steps.push(StepReport {
            index,
            step: step.clone(),
            calls: log.take(),
            settled,
        });
    }

    let records = engine
        .store()
        .displays()
        .into_iter()
        .map(|display| engine.store().snapshot(display))
        .collect();
    let surfaces = scenario
        .surfaces
        .iter()
        .filter_map(|surface| engine.store().surface(surface.id))
        .collect();
    engine.shutdown();

    Ok(ReplayReport {
        steps,
        records,
        surfaces,
    })
}

fn apply_step(
    engine: &Engine,
    memory: &MemoryPlatform,
    preferences: &dyn PreferenceStore,
    step: &Step,
) -> Result<()> {
    match step {
        Step::ScreenOn { display, on } => memory.set_screen_on(*display, *on),
        Step::Locked { locked } => memory.set_locked(*locked),
        Step::NotificationCount { count } => memory.set_notification_count(*count),
        Step::KeyboardHeight { display, height } => memory.set_keyboard_height(
            *display,
            height.ok_or(PlatformError::Unavailable("input method")),
        ),
        Step::Display { info } => {
            if !memory.set_display(*info) {
                tracing::info!(display = %info.id, "external display ignored");
            }
        }
        Step::Windows { display, windows } => {
            let windows: Vec<WindowRef> = windows
                .iter()
                .map(|spec| spec.to_window().into_ref())
                .collect();
            memory.set_windows(*display, windows);
        }
        Step::Preference { key, value } => preferences.set(key, value.clone())?,
        Step::ReloadPreferences => engine.reload_preferences(),
        Step::Signal { signal } => {
            engine.submit(*signal);
        }
        Step::TempHide { surface } => {
            engine.bus().publish(TempHide { surface: *surface });
        }
        Step::Preview {
            show,
            include_main_frame,
        } => {
            engine.bus().publish(PreviewFrames {
                show: if *show {
                    PreviewMode::Show
                } else {
                    PreviewMode::Hide
                },
                request_code: None,
                include_main_frame: *include_main_frame,
            });
        }
        Step::Move { surface, dx, dy } => {
            engine.bus().publish(FrameMoved {
                surface: *surface,
                dx: *dx,
                dy: *dy,
            });
        }
        Step::Drawer { open } => {
            engine.bus().publish(DrawerVisibilityChanged { open: *open });
        }
    }
    Ok(())
}
