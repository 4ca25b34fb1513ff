use lockscreen_overlay::display::DisplayId;
use lockscreen_overlay::replay::{self, Scenario, Step};
use lockscreen_overlay::surface::recording::SurfaceCall;
use lockscreen_overlay::surface::SurfaceId;
use lockscreen_overlay::visibility::Mode;
use lockscreen_overlay::Settings;
use tempfile::tempdir;

const SCENARIO: &str = r#"{
    "displays": [
        { "id": 0, "width": 1080, "height": 2400 },
        { "id": 1, "width": 1920, "height": 1080 },
        { "id": 7, "width": 800, "height": 600, "built_in": false }
    ],
    "surfaces": [
        { "id": -1, "config": { "enabled": true, "hide_in_landscape": true } },
        { "id": 3, "display": 1, "config": { "enabled": true } }
    ],
    "steps": [
        { "step": "screen_on", "on": true },
        { "step": "locked", "locked": true },
        { "step": "windows", "windows": [
            { "type": "system", "root": {
                "package": "com.android.systemui",
                "id": "com.android.systemui:id/camera_button"
            } }
        ] },
        { "step": "signal", "signal": { "kind": "accessibility", "display": 0 } },
        { "step": "signal", "signal": { "kind": "rotation", "display": 0, "rotation": "90" } },
        { "step": "signal", "signal": { "kind": "rotation", "display": 0, "rotation": "0" } },
        { "step": "temp_hide", "surface": -1 },
        { "step": "signal", "signal": { "kind": "screen_power", "display": 0, "on": false } },
        { "step": "signal", "signal": { "kind": "screen_power", "display": 0, "on": true } },
        { "step": "screen_on", "display": 1, "on": true },
        { "step": "signal", "signal": { "kind": "accessibility", "display": 1 } },
        { "step": "move", "surface": 3, "dx": 40, "dy": 0 }
    ]
}"#;

fn settings() -> Settings {
    Settings {
        signal_workers: 2,
        traversal_workers: 2,
        ..Settings::default()
    }
}

fn attach_calls(calls: &[SurfaceCall]) -> Vec<SurfaceCall> {
    calls
        .iter()
        .filter(|call| call.is_attach_or_detach())
        .cloned()
        .collect()
}

#[test]
fn scenario_file_replays_end_to_end() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scenario.json");
    std::fs::write(&path, SCENARIO).unwrap();

    let scenario = Scenario::load(&path).unwrap();
    assert_eq!(scenario.steps.len(), 12);
    assert!(matches!(scenario.steps[6], Step::TempHide { .. }));

    let report = replay::run(&scenario, settings()).unwrap();
    assert!(report.steps.iter().all(|step| step.settled));

    // Lock screen appears.
    assert!(matches!(
        attach_calls(&report.steps[3].calls)[..],
        [SurfaceCall::Attach(SurfaceId::MAIN, _)]
    ));
    // Landscape hides it, upright shows it again.
    assert_eq!(
        attach_calls(&report.steps[4].calls),
        vec![SurfaceCall::Detach(SurfaceId::MAIN)]
    );
    assert!(matches!(
        attach_calls(&report.steps[5].calls)[..],
        [SurfaceCall::Attach(SurfaceId::MAIN, _)]
    ));
    // Temp hide lasts until the screen power changes.
    assert_eq!(
        attach_calls(&report.steps[6].calls),
        vec![SurfaceCall::Detach(SurfaceId::MAIN)]
    );
    assert!(attach_calls(&report.steps[7].calls).is_empty());
    assert!(matches!(
        attach_calls(&report.steps[8].calls)[..],
        [SurfaceCall::Attach(SurfaceId::MAIN, _)]
    ));
    // Secondary display frame appears once its screen is on, then moves.
    assert!(matches!(
        attach_calls(&report.steps[10].calls)[..],
        [SurfaceCall::Attach(SurfaceId(3), _)]
    ));
    assert!(matches!(
        report.steps[11].calls[..],
        [SurfaceCall::Update(SurfaceId(3), geometry)] if geometry.x == 40
    ));

    let side = report
        .surfaces
        .iter()
        .find(|surface| surface.surface == SurfaceId(3))
        .unwrap();
    assert!(side.attached);
    assert_eq!(side.mode, Some(Mode::SecondaryDisplay));
    assert!(report
        .records
        .iter()
        .all(|record| record.display != DisplayId(7)));
}

#[test]
fn preferences_file_from_settings_is_used() {
    let dir = tempdir().unwrap();
    let prefs_path = dir.path().join("prefs.json");
    std::fs::write(&prefs_path, r#"{ "widget_frame_enabled": true, "force_show_frame": true }"#)
        .unwrap();
    let scenario: Scenario = serde_json::from_str(r#"{ "surfaces": [ { "id": -1 } ] }"#).unwrap();

    let settings = Settings {
        preferences_file: Some(prefs_path.to_string_lossy().into_owned()),
        ..settings()
    };
    let report = replay::run(&scenario, settings).unwrap();
    assert!(report.steps.is_empty());
    let main = &report.surfaces[0];
    assert!(main.attached);
    assert_eq!(main.mode, Some(Mode::Forced));
}

#[test]
fn missing_scenario_file_is_reported() {
    let dir = tempdir().unwrap();
    let err = Scenario::load(&dir.path().join("nope.json")).unwrap_err();
    assert!(format!("{err:#}").contains("nope.json"));
}
