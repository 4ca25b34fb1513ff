use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use lockscreen_overlay::display::{DisplayId, DisplayInfo};
use lockscreen_overlay::events::DebugIdsUpdated;
use lockscreen_overlay::platform::MemoryPlatform;
use lockscreen_overlay::prefs::{keys, JsonFilePreferences, PreferenceStore};
use lockscreen_overlay::surface::recording::{RecordingAnimator, RecordingWindowManager, SurfaceLog};
use lockscreen_overlay::surface::SurfaceId;
use lockscreen_overlay::visibility::{Mode, SurfaceConfig};
use lockscreen_overlay::window::ids;
use lockscreen_overlay::window::memory::{MemoryNode, MemoryWindow};
use lockscreen_overlay::window::WindowRef;
use lockscreen_overlay::{Engine, Settings, Signal};
use serde_json::json;
use tempfile::tempdir;

const WAIT: Duration = Duration::from_secs(5);
const SIDE: DisplayId = DisplayId(1);

fn settings() -> Settings {
    Settings {
        signal_workers: 3,
        traversal_workers: 2,
        ..Settings::default()
    }
}

fn lock_screen() -> Vec<WindowRef> {
    vec![MemoryWindow::system_ui(
        MemoryNode::system_ui("root")
            .with_child(MemoryNode::system_ui("keyguard_indication_text_bottom"))
            .with_child(MemoryNode::system_ui("left_button")),
    )
    .into_ref()]
}

fn register(engine: &Engine, id: SurfaceId, display: DisplayId, log: &SurfaceLog) {
    engine
        .register_surface(
            id,
            display,
            SurfaceConfig::enabled(),
            Box::new(RecordingWindowManager::new(log.clone())),
            Box::new(RecordingAnimator::new(log.clone())),
        )
        .unwrap();
}

#[test]
fn secondary_display_shows_independently_of_the_lock_screen() {
    let memory = MemoryPlatform::new();
    memory.set_display(DisplayInfo::new(SIDE, 1920, 1080));
    let engine = Engine::new(settings(), memory.platform(), None).unwrap();
    let log = SurfaceLog::new();
    register(&engine, SurfaceId::MAIN, DisplayId::DEFAULT, &log);
    register(&engine, SurfaceId(2), SIDE, &log);

    memory.set_screen_on(SIDE, true);
    engine.submit(Signal::Accessibility { display: SIDE });
    engine.submit(Signal::Accessibility {
        display: DisplayId::DEFAULT,
    });
    assert!(engine.flush(WAIT));

    let side = engine.surface(SurfaceId(2)).unwrap();
    let main = engine.surface(SurfaceId::MAIN).unwrap();
    assert!(side.is_attached());
    assert_eq!(side.last_mode(), Some(Mode::SecondaryDisplay));
    assert!(!main.is_attached(), "default display screen is off");
    assert!(log.is_attached(SurfaceId(2)));
    assert!(!log.is_attached(SurfaceId::MAIN));
}

#[test]
fn keyguard_changes_reach_every_known_display() {
    let memory = MemoryPlatform::new();
    memory.set_display(DisplayInfo::new(SIDE, 1920, 1080));
    let engine = Engine::new(settings(), memory.platform(), None).unwrap();

    engine.submit(Signal::Keyguard { locked: true });
    assert!(engine.flush(WAIT));
    assert!(engine.store().snapshot(DisplayId::DEFAULT).was_on_keyguard);
    assert!(engine.store().snapshot(SIDE).was_on_keyguard);

    engine.submit(Signal::NotificationCount { count: 5 });
    assert!(engine.flush(WAIT));
    assert_eq!(engine.store().snapshot(SIDE).notification_count, 5);
}

#[test]
fn signals_from_many_threads_settle_on_the_last_value_per_display() {
    let memory = MemoryPlatform::new();
    memory.set_display(DisplayInfo::new(SIDE, 1920, 1080));
    let engine = Arc::new(Engine::new(settings(), memory.platform(), None).unwrap());

    let senders: Vec<_> = [DisplayId::DEFAULT, SIDE]
        .into_iter()
        .map(|display| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..200 {
                    engine.submit(Signal::ScreenPower {
                        display,
                        on: i % 2 == 1,
                    });
                }
            })
        })
        .collect();
    for sender in senders {
        sender.join().unwrap();
    }
    assert!(engine.flush(WAIT));
    // One strand per display keeps per-display order, so the last submit wins.
    assert!(engine.store().snapshot(DisplayId::DEFAULT).is_screen_on);
    assert!(engine.store().snapshot(SIDE).is_screen_on);
}

#[test]
fn preference_changes_apply_after_reload() {
    let dir = tempdir().unwrap();
    let preferences = Arc::new(JsonFilePreferences::open(dir.path().join("prefs.json")).unwrap());
    preferences.set(keys::WIDGET_FRAME_ENABLED, json!(true)).unwrap();

    let memory = MemoryPlatform::new();
    memory.set_screen_on(DisplayId::DEFAULT, true);
    memory.set_locked(true);
    memory.set_windows(DisplayId::DEFAULT, lock_screen());
    let store: Arc<dyn PreferenceStore> = preferences.clone();
    let engine = Engine::new(settings(), memory.platform(), Some(store)).unwrap();
    let log = SurfaceLog::new();
    let main = engine
        .register_surface_from_preferences(
            SurfaceId::MAIN,
            DisplayId::DEFAULT,
            Box::new(RecordingWindowManager::new(log.clone())),
            Box::new(RecordingAnimator::new(log.clone())),
        )
        .unwrap();
    engine.submit(Signal::Accessibility {
        display: DisplayId::DEFAULT,
    });
    assert!(engine.flush(WAIT));
    assert!(main.is_attached());

    preferences
        .set(keys::PRESENT_IDS, json!([ids::system_ui_id("left_button")]))
        .unwrap();
    engine.reload_preferences();
    assert!(engine.flush(WAIT));
    assert!(engine.store().snapshot(DisplayId::DEFAULT).hide_for_present_ids);
    assert!(!main.is_attached());

    preferences.set(keys::PRESENT_IDS, json!([])).unwrap();
    preferences.set(keys::FORCE_SHOW_FRAME, json!(true)).unwrap();
    engine.reload_preferences();
    assert!(engine.flush(WAIT));
    assert!(main.is_attached());
    assert_eq!(main.last_mode(), Some(Mode::Forced));
}

#[test]
fn debug_ids_follow_window_changes() {
    let memory = MemoryPlatform::new();
    memory.set_screen_on(DisplayId::DEFAULT, true);
    memory.set_locked(true);
    let engine = Engine::new(settings(), memory.platform(), None).unwrap();
    let updates = Arc::new(Mutex::new(Vec::new()));
    {
        let updates = Arc::clone(&updates);
        engine.bus().subscribe(move |e: &DebugIdsUpdated| {
            updates.lock().unwrap().push(e.ids.len());
        });
    }
    let mut watch = engine
        .store()
        .watch(DisplayId::DEFAULT, |record| record.visible_ids.len());

    memory.set_windows(DisplayId::DEFAULT, lock_screen());
    engine.submit(Signal::WindowsChanged {
        display: DisplayId::DEFAULT,
    });
    assert!(engine.flush(WAIT));
    assert_eq!(watch.changed_within(WAIT), Some(3));

    memory.set_windows(DisplayId::DEFAULT, Vec::new());
    engine.submit(Signal::WindowsChanged {
        display: DisplayId::DEFAULT,
    });
    assert!(engine.flush(WAIT));
    assert_eq!(watch.changed_within(WAIT), Some(0));
    assert_eq!(*updates.lock().unwrap(), vec![3, 0]);
}

#[test]
fn unavailable_window_list_keeps_the_last_snapshot() {
    let memory = MemoryPlatform::new();
    memory.set_screen_on(DisplayId::DEFAULT, true);
    memory.set_locked(true);
    memory.set_windows(DisplayId::DEFAULT, lock_screen());
    let engine = Engine::new(settings(), memory.platform(), None).unwrap();
    engine.submit(Signal::Accessibility {
        display: DisplayId::DEFAULT,
    });
    assert!(engine.flush(WAIT));
    let before = engine.store().snapshot(DisplayId::DEFAULT);
    assert!(before.on_main_lockscreen);

    memory.window_source().set_unavailable(true);
    engine.submit(Signal::WindowsChanged {
        display: DisplayId::DEFAULT,
    });
    assert!(engine.flush(WAIT));
    let after = engine.store().snapshot(DisplayId::DEFAULT);
    assert!(Arc::ptr_eq(&before, &after));
}
