use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

const CAPTURE_PREFIX: &str = "capture_";
const THUMBNAIL_MARKER: &str = "_thumbnail";
const CAPTURE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// One sampled frame discovered in a capture directory.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureFrame {
    pub path: PathBuf,
    /// Epoch seconds taken from the file's modification time at discovery.
    pub timestamp: f64,
}

/// Inclusive interval of epoch seconds in which a match counts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    /// Window anchored at the action, `timeout_ms` long.
    pub fn after(action_timestamp: f64, timeout_ms: u64) -> Self {
        Self {
            start: action_timestamp,
            end: action_timestamp + timeout_ms as f64 / 1000.0,
        }
    }

    pub fn contains(&self, timestamp: f64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

/// Whether a file name follows `capture_<sequence>.<ext>` and is not a
/// thumbnail variant.
pub fn is_capture_frame(file_name: &str) -> bool {
    if file_name.contains(THUMBNAIL_MARKER) {
        return false;
    }

    let Some(rest) = file_name.strip_prefix(CAPTURE_PREFIX) else {
        return false;
    };
    let Some((sequence, ext)) = rest.rsplit_once('.') else {
        return false;
    };

    !sequence.is_empty()
        && sequence
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && CAPTURE_EXTENSIONS
            .iter()
            .any(|known| ext.eq_ignore_ascii_case(known))
}

/// Convert a modification time to epoch seconds. Times before the epoch are
/// clamped to zero.
pub fn epoch_seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
