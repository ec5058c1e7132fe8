//! Ctrl-C behaviour. The shutdown flag is process-wide, so these tests live
//! in their own binary.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use winvora_core::{request_shutdown, shutdown_requested, CoreError, CreateOptions, Manager, Settings};
use winvora_runtime::{LinuxPlatform, Platform};

const FAKE_WINE: &str = "#!/bin/sh\n\
if [ \"$1\" = wineboot ]; then mkdir -p \"$WINEPREFIX/drive_c\" || exit 1; fi\n\
exit 0\n";

#[test]
fn kill_all_after_shutdown_reports_skipped_pids() {
    let tmp = tempfile::tempdir().unwrap();
    let wine = tmp.path().join("wine");
    fs::write(&wine, FAKE_WINE).unwrap();
    fs::set_permissions(&wine, fs::Permissions::from_mode(0o755)).unwrap();

    let mut settings = Settings::default();
    settings.runtime_path = Some(wine);
    settings.prefixes_dir = Some(tmp.path().join("prefixes"));
    settings.min_free_space_mb = 0;
    settings.kill_grace_ms = 300;
    let platform: Arc<dyn Platform> = Arc::new(LinuxPlatform);
    let m = Manager::new(tmp.path().join("config"), settings, platform).unwrap();
    m.create("busy", &CreateOptions::default()).unwrap();
    let root = m.info("busy").unwrap().path;

    let mut child = Command::new("sleep")
        .arg("30")
        .env("WINEPREFIX", &root)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    let pid = child.id();
    let deadline = Instant::now() + Duration::from_secs(5);
    while m.processes(Some("busy")).unwrap().is_empty() {
        assert!(Instant::now() < deadline, "sleep never showed up in the prefix");
        thread::sleep(Duration::from_millis(50));
    }

    assert!(!request_shutdown());
    assert!(shutdown_requested());
    assert!(request_shutdown(), "second request reports the first");

    let err = m.kill_all(Some("busy")).unwrap_err();
    match err {
        CoreError::PartialFailure {
            ref operation,
            ref failed,
            ..
        } => {
            assert_eq!(operation, "kill_all");
            assert!(
                failed.iter().any(|f| f.starts_with(&format!("pid {pid}:"))),
                "{err}"
            );
        }
        other => panic!("expected partial failure, got {other}"),
    }

    // Single kills are not gated on shutdown.
    assert!(m.kill(pid).unwrap().success);
    let _ = child.wait();
}
