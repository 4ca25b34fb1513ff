use lockscreen_overlay::surface::LayoutDefaults;
use lockscreen_overlay::Settings;
use tempfile::tempdir;

#[test]
fn missing_file_yields_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let settings = Settings::load(path.to_str().unwrap()).unwrap();
    assert_eq!(settings, Settings::default());
}

#[test]
fn empty_file_yields_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "  \n").unwrap();
    let settings = Settings::load(path.to_str().unwrap()).unwrap();
    assert_eq!(settings, Settings::default());
}

#[test]
fn partial_file_keeps_defaults_for_missing_fields() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{ "pixel_ui": true, "signal_workers": 0 }"#).unwrap();

    let settings = Settings::load(path.to_str().unwrap()).unwrap();
    assert!(settings.pixel_ui);
    assert!(settings.supports_dim_behind);
    assert!(settings.close_drawer_on_notification_shade);
    assert_eq!(settings.traversal_workers, 4);
    assert_eq!(settings.pool_sizes(), (1, 4));
    assert_eq!(settings.layout_defaults, LayoutDefaults::default());
}

#[test]
fn saved_settings_load_back() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let settings = Settings {
        debug_logging: true,
        log_file: Some("overlay.log".into()),
        preferences_file: Some("prefs.json".into()),
        layout_defaults: LayoutDefaults {
            frame_size: (420, 380),
            ..LayoutDefaults::default()
        },
        ..Settings::default()
    };
    settings.save(path.to_str().unwrap()).unwrap();

    let loaded = Settings::load(path.to_str().unwrap()).unwrap();
    assert_eq!(loaded, settings);
}

#[test]
fn malformed_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(Settings::load(path.to_str().unwrap()).is_err());
}
