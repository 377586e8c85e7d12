use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

use crate::models::capture::{epoch_seconds, is_capture_frame, CaptureFrame, TimeWindow};

/// Default deadline for listing one capture directory.
pub const DEFAULT_ENUMERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Lists the capture frames of a directory whose timestamps fall inside a
/// window. Order of the returned frames is unspecified.
pub trait FrameEnumerator: Send + Sync {
    fn enumerate<'a>(
        &'a self,
        dir: &'a Path,
        window: TimeWindow,
    ) -> BoxFuture<'a, Result<Vec<CaptureFrame>, EnumerationError>>;
}

/// Single `read_dir` pass on a blocking thread, bounded by a deadline.
pub struct NativeFrameEnumerator {
    timeout: Duration,
}

impl NativeFrameEnumerator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for NativeFrameEnumerator {
    fn default() -> Self {
        Self::new(DEFAULT_ENUMERATION_TIMEOUT)
    }
}

impl FrameEnumerator for NativeFrameEnumerator {
    fn enumerate<'a>(
        &'a self,
        dir: &'a Path,
        window: TimeWindow,
    ) -> BoxFuture<'a, Result<Vec<CaptureFrame>, EnumerationError>> {
        let dir = dir.to_path_buf();
        let timeout = self.timeout;

        async move {
            let walk = tokio::task::spawn_blocking(move || walk_dir(&dir, window, timeout));

            match tokio::time::timeout(timeout, walk).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => Err(EnumerationError::Io(std::io::Error::other(join_err))),
                Err(_) => Err(EnumerationError::Timeout(timeout)),
            }
        }
        .boxed()
    }
}

fn walk_dir(
    dir: &Path,
    window: TimeWindow,
    timeout: Duration,
) -> Result<Vec<CaptureFrame>, EnumerationError> {
    let deadline = Instant::now() + timeout;
    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => EnumerationError::DirectoryMissing(dir.to_path_buf()),
        _ => EnumerationError::Io(e),
    })?;

    let mut frames = Vec::new();
    for entry in entries {
        if Instant::now() >= deadline {
            return Err(EnumerationError::Timeout(timeout));
        }

        // Files can disappear under rotation while we list.
        let Ok(entry) = entry else { continue };
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !is_capture_frame(name) {
            continue;
        }

        let Ok(metadata) = entry.metadata() else { continue };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else { continue };

        let timestamp = epoch_seconds(modified);
        if window.contains(timestamp) {
            frames.push(CaptureFrame {
                path: entry.path(),
                timestamp,
            });
        }
    }

    Ok(frames)
}

/// Delegates the listing to GNU `find`, narrowing on modification time
/// before anything reaches this process. The child is killed if the deadline
/// passes.
pub struct FindFrameEnumerator {
    program: String,
    timeout: Duration,
}

impl FindFrameEnumerator {
    pub fn new(timeout: Duration) -> Self {
        Self::with_program("find", timeout)
    }

    /// Use another GNU find binary, such as `gfind`.
    pub fn with_program(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl Default for FindFrameEnumerator {
    fn default() -> Self {
        Self::new(DEFAULT_ENUMERATION_TIMEOUT)
    }
}

impl FrameEnumerator for FindFrameEnumerator {
    fn enumerate<'a>(
        &'a self,
        dir: &'a Path,
        window: TimeWindow,
    ) -> BoxFuture<'a, Result<Vec<CaptureFrame>, EnumerationError>> {
        async move {
            if !dir.is_dir() {
                return Err(EnumerationError::DirectoryMissing(dir.to_path_buf()));
            }

            // -newermt is strict, so widen by a second and re-filter below.
            let newer_than = format!("@{}", (window.start - 1.0).floor() as i64);
            let child = Command::new(&self.program)
                .arg(dir)
                .args(["-maxdepth", "1", "-type", "f", "-name", "capture_*"])
                .args(["-newermt", newer_than.as_str()])
                .args(["-printf", "%T@\\t%p\\n"])
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| {
                    EnumerationError::Command(format!("failed to spawn {}: {e}", self.program))
                })?;

            let output = tokio::time::timeout(self.timeout, child.wait_with_output())
                .await
                .map_err(|_| EnumerationError::Timeout(self.timeout))?
                .map_err(EnumerationError::Io)?;

            if !output.status.success() {
                return Err(EnumerationError::Command(format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }

            Ok(parse_find_output(
                &String::from_utf8_lossy(&output.stdout),
                window,
            ))
        }
        .boxed()
    }
}

/// Parse `<mtime>\t<path>` lines, keeping capture frames inside `window`.
fn parse_find_output(stdout: &str, window: TimeWindow) -> Vec<CaptureFrame> {
    stdout
        .lines()
        .filter_map(|line| {
            let (mtime, path) = line.split_once('\t')?;
            let timestamp: f64 = mtime.trim().parse().ok()?;
            let path = PathBuf::from(path);
            let name = path.file_name()?.to_str()?;
            (is_capture_frame(name) && window.contains(timestamp))
                .then(|| CaptureFrame { path, timestamp })
        })
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum EnumerationError {
    #[error("capture directory missing: {}", .0.display())]
    DirectoryMissing(PathBuf),

    #[error("listing capture directory failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("listing capture directory timed out after {0:?}")]
    Timeout(Duration),

    #[error("listing command failed: {0}")]
    Command(String),
}
