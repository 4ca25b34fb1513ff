use std::{thread::sleep, time::Duration};

use serial_test::serial;
use tempfile::tempdir;

#[test]
#[serial]
fn init_without_file_creates_no_log() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("overlay.log");

    lockscreen_overlay::logging::init(false, None);
    tracing::info!("stdout only");

    sleep(Duration::from_millis(100));

    assert!(!path.exists(), "log file should not be created");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
