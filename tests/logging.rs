use std::{fs, thread::sleep, time::Duration};

use tempfile::tempdir;

// The global subscriber can only be installed once per test binary, so the
// whole lifecycle lives in one test.
#[test]
fn file_logging_installs_once() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("canvas.log");

    assert!(inkcanvas::logging::init_with_file(true, &path));
    tracing::info!(page = "p1", "canvas engine opened");

    sleep(Duration::from_millis(200));

    assert!(path.exists(), "log file was not created");
    let contents = fs::read_to_string(&path).unwrap();
    assert!(contents.contains("canvas engine opened"));

    let other = dir.path().join("other.log");
    inkcanvas::logging::init(false);
    assert!(!inkcanvas::logging::init_with_file(false, &other));
    tracing::info!("after reinit");
    sleep(Duration::from_millis(100));
    assert!(!other.exists() || fs::read_to_string(&other).unwrap().is_empty());
}
