//! Single-instance enforcement through a pid file.
//!
//! The file holds the decimal pid of the running engine. A file whose pid is
//! no longer alive (e.g. left by a crash) is treated as stale and replaced.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{QueueError, Result};

/// An unparsable pid file younger than this may belong to an instance that
/// is still starting up, so it is not treated as stale.
const UNREADABLE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pid recorded in the file, or None if the file is absent or unreadable.
    pub fn read(&self) -> Option<u32> {
        let data = fs::read_to_string(&self.path).ok()?;
        data.trim().parse::<u32>().ok().filter(|pid| *pid > 0)
    }

    /// Write the current pid. Fails if the file already exists.
    ///
    /// The pid goes to a private temp file that is then hard-linked into
    /// place, so the lock file never exists without its content.
    pub fn write(&self) -> io::Result<u32> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let pid = std::process::id();
        let tmp = self.temp_path(pid);
        let linked = write_pid(&tmp, pid).and_then(|()| fs::hard_link(&tmp, &self.path));
        let _ = fs::remove_file(&tmp);
        linked.map(|()| pid)
    }

    /// Delete the file. Missing files are not an error.
    pub fn remove(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Take the lock for this process and return the pid written.
    ///
    /// Fails with `Lock` if a live process holds it (including this one), or
    /// if the file cannot be parsed but was modified within `UNREADABLE_GRACE`.
    pub fn acquire(&self) -> Result<u32> {
        if self.path.exists() {
            match self.read() {
                Some(pid) if process_alive(pid) => {
                    return Err(QueueError::Lock {
                        pid,
                        path: self.path.clone(),
                    });
                }
                None if self.recently_modified() => {
                    return Err(QueueError::Lock {
                        pid: 0,
                        path: self.path.clone(),
                    });
                }
                stale => {
                    tracing::warn!(pid = ?stale, path = %self.path.display(), "removing stale pid file");
                    self.remove()?;
                }
            }
        }
        match self.write() {
            Ok(pid) => Ok(pid),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(QueueError::Lock {
                pid: self.read().unwrap_or(0),
                path: self.path.clone(),
            }),
            Err(e) => Err(QueueError::Io(e)),
        }
    }

    fn temp_path(&self, pid: u32) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{pid}.tmp"));
        self.path.with_file_name(name)
    }

    fn recently_modified(&self) -> bool {
        fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.elapsed().ok())
            .is_some_and(|age| age < UNREADABLE_GRACE)
    }
}

fn write_pid(path: &Path, pid: u32) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    writeln!(file, "{pid}")?;
    file.sync_all()
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // Signal 0 performs the permission and existence checks without sending anything.
    let r = unsafe { libc::kill(pid, 0) };
    r == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(pid: u32) -> bool {
    pid == std::process::id()
}
