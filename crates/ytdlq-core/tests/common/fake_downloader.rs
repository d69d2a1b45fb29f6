//! A shell script standing in for the downloader.
//!
//! It prints each argument on its own line (so the job log records the
//! invocation) and exits 1 when the source URL contains `fail`.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SCRIPT: &str = r#"#!/bin/sh
for arg in "$@"; do
    echo "arg: $arg"
    last="$arg"
done
case "$last" in
    *fail*) echo "download failed" >&2; exit 1 ;;
esac
exit 0
"#;

pub fn install(dir: &Path) -> PathBuf {
    let path = dir.join("fake-downloader");
    fs::write(&path, SCRIPT).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    // Avoid ETXTBSY from children forked while the file was open for writing.
    std::thread::sleep(Duration::from_millis(50));
    path
}
