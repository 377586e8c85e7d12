use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::kpi::{KpiReference, KpiReferenceError};

/// Caller-supplied fields for a measurement, before validation.
///
/// Built right after the triggering action fires. Nothing here is defaulted:
/// every required field must be supplied by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct NewMeasurementRequest {
    pub execution_result_id: String,
    pub team_id: String,
    pub capture_dir: PathBuf,
    /// Epoch seconds at which the action was triggered.
    pub action_timestamp: f64,
    pub kpi_references: Vec<KpiReference>,
    pub timeout_ms: u64,
    pub device_id: String,
    #[serde(default)]
    pub device_model: Option<String>,
}

/// A validated, immutable measurement request.
///
/// Only obtainable through [`MeasurementRequest::new`], so every value of this
/// type passed all construction checks.
#[derive(Debug, Clone)]
pub struct MeasurementRequest {
    execution_result_id: String,
    team_id: String,
    capture_dir: PathBuf,
    action_timestamp: f64,
    kpi_references: Vec<KpiReference>,
    timeout_ms: u64,
    device_id: String,
    device_model: Option<String>,
}

impl MeasurementRequest {
    /// Validate `new` and build the request. Checks run in a fixed order and
    /// the first failure is returned.
    pub fn new(new: NewMeasurementRequest) -> Result<Self, RequestError> {
        if new.execution_result_id.trim().is_empty() {
            return Err(RequestError::MissingExecutionResultId);
        }
        if new.team_id.trim().is_empty() {
            return Err(RequestError::MissingTeamId);
        }
        if new.capture_dir.as_os_str().is_empty() {
            return Err(RequestError::MissingCaptureDir);
        }
        if !new.capture_dir.is_dir() {
            return Err(RequestError::CaptureDirNotFound(new.capture_dir));
        }
        if new.kpi_references.is_empty() {
            return Err(RequestError::MissingKpiReferences);
        }
        if new.timeout_ms == 0 {
            return Err(RequestError::InvalidTimeout);
        }
        if new.device_id.trim().is_empty() {
            return Err(RequestError::MissingDeviceId);
        }
        if !new.action_timestamp.is_finite() {
            return Err(RequestError::InvalidActionTimestamp);
        }
        for (index, reference) in new.kpi_references.iter().enumerate() {
            reference
                .check()
                .map_err(|source| RequestError::InvalidKpiReference { index, source })?;
        }

        Ok(Self {
            execution_result_id: new.execution_result_id,
            team_id: new.team_id,
            capture_dir: new.capture_dir,
            action_timestamp: new.action_timestamp,
            kpi_references: new.kpi_references,
            timeout_ms: new.timeout_ms,
            device_id: new.device_id,
            device_model: new.device_model,
        })
    }

    pub fn execution_result_id(&self) -> &str {
        &self.execution_result_id
    }

    pub fn team_id(&self) -> &str {
        &self.team_id
    }

    pub fn capture_dir(&self) -> &Path {
        &self.capture_dir
    }

    pub fn action_timestamp(&self) -> f64 {
        self.action_timestamp
    }

    /// Action timestamp as a UTC datetime, for logs.
    pub fn action_time(&self) -> Option<DateTime<Utc>> {
        let secs = self.action_timestamp.floor();
        let nanos = ((self.action_timestamp - secs) * 1e9) as u32;
        DateTime::from_timestamp(secs as i64, nanos)
    }

    pub fn kpi_references(&self) -> &[KpiReference] {
        &self.kpi_references
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn device_model(&self) -> Option<&str> {
        self.device_model.as_deref()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("execution_result_id is required")]
    MissingExecutionResultId,

    #[error("team_id is required")]
    MissingTeamId,

    #[error("capture_dir is required")]
    MissingCaptureDir,

    #[error("capture_dir does not exist: {}", .0.display())]
    CaptureDirNotFound(PathBuf),

    #[error("kpi_references must contain at least one verification")]
    MissingKpiReferences,

    #[error("timeout_ms must be greater than zero")]
    InvalidTimeout,

    #[error("device_id is required")]
    MissingDeviceId,

    #[error("action_timestamp must be a finite number of epoch seconds")]
    InvalidActionTimestamp,

    #[error("kpi_references[{index}] is invalid: {source}")]
    InvalidKpiReference {
        index: usize,
        source: KpiReferenceError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::kpi::ImageParams;

    fn sample_reference() -> KpiReference {
        KpiReference::Image {
            command: "waitForImageToAppear".to_string(),
            params: ImageParams {
                image_path: "refs/home.png".to_string(),
                threshold: 0.8,
                area: None,
            },
        }
    }

    fn sample_new(dir: &Path) -> NewMeasurementRequest {
        NewMeasurementRequest {
            execution_result_id: "exec-1".to_string(),
            team_id: "team-1".to_string(),
            capture_dir: dir.to_path_buf(),
            action_timestamp: 1_700_000_000.25,
            kpi_references: vec![sample_reference()],
            timeout_ms: 5000,
            device_id: "device1".to_string(),
            device_model: Some("android_tv".to_string()),
        }
    }

    #[test]
    fn test_valid_request() {
        let dir = tempfile::tempdir().unwrap();
        let request = MeasurementRequest::new(sample_new(dir.path())).unwrap();
        assert_eq!(request.execution_result_id(), "exec-1");
        assert_eq!(request.team_id(), "team-1");
        assert_eq!(request.capture_dir(), dir.path());
        assert_eq!(request.timeout_ms(), 5000);
        assert_eq!(request.device_id(), "device1");
        assert_eq!(request.device_model(), Some("android_tv"));
        assert_eq!(request.kpi_references().len(), 1);

        let time = request.action_time().unwrap();
        assert_eq!(time.timestamp(), 1_700_000_000);
        assert_eq!(time.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_device_model_not_validated() {
        let dir = tempfile::tempdir().unwrap();
        let mut new = sample_new(dir.path());
        new.device_model = None;
        assert!(MeasurementRequest::new(new).is_ok());
    }

    #[test]
    fn test_each_required_field_has_its_own_error() {
        let dir = tempfile::tempdir().unwrap();

        let mut new = sample_new(dir.path());
        new.execution_result_id = String::new();
        assert!(matches!(
            MeasurementRequest::new(new),
            Err(RequestError::MissingExecutionResultId)
        ));

        let mut new = sample_new(dir.path());
        new.team_id = " ".to_string();
        assert!(matches!(
            MeasurementRequest::new(new),
            Err(RequestError::MissingTeamId)
        ));

        let mut new = sample_new(dir.path());
        new.capture_dir = PathBuf::new();
        assert!(matches!(
            MeasurementRequest::new(new),
            Err(RequestError::MissingCaptureDir)
        ));

        let mut new = sample_new(dir.path());
        new.capture_dir = dir.path().join("missing");
        assert!(matches!(
            MeasurementRequest::new(new),
            Err(RequestError::CaptureDirNotFound(_))
        ));

        let mut new = sample_new(dir.path());
        new.kpi_references.clear();
        assert!(matches!(
            MeasurementRequest::new(new),
            Err(RequestError::MissingKpiReferences)
        ));

        let mut new = sample_new(dir.path());
        new.timeout_ms = 0;
        assert!(matches!(
            MeasurementRequest::new(new),
            Err(RequestError::InvalidTimeout)
        ));

        let mut new = sample_new(dir.path());
        new.device_id = String::new();
        assert!(matches!(
            MeasurementRequest::new(new),
            Err(RequestError::MissingDeviceId)
        ));

        let mut new = sample_new(dir.path());
        new.action_timestamp = f64::NAN;
        assert!(matches!(
            MeasurementRequest::new(new),
            Err(RequestError::InvalidActionTimestamp)
        ));
    }

    #[test]
    fn test_checks_run_in_order() {
        let mut new = sample_new(Path::new("/definitely/not/here"));
        new.team_id = String::new();
        new.timeout_ms = 0;
        // team_id is checked before capture_dir and timeout_ms
        assert!(matches!(
            MeasurementRequest::new(new),
            Err(RequestError::MissingTeamId)
        ));
    }

    #[test]
    fn test_capture_dir_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("capture_1.jpg");
        std::fs::write(&file, b"jpg").unwrap();

        let mut new = sample_new(dir.path());
        new.capture_dir = file;
        assert!(matches!(
            MeasurementRequest::new(new),
            Err(RequestError::CaptureDirNotFound(_))
        ));
    }

    #[test]
    fn test_invalid_reference_reports_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut new = sample_new(dir.path());
        new.kpi_references.push(KpiReference::Image {
            command: "waitForImageToAppear".to_string(),
            params: ImageParams {
                image_path: String::new(),
                threshold: 0.8,
                area: None,
            },
        });

        match MeasurementRequest::new(new) {
            Err(RequestError::InvalidKpiReference { index, .. }) => assert_eq!(index, 1),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_deserialize_without_device_model() {
        let json = serde_json::json!({
            "execution_result_id": "exec-9",
            "team_id": "team-9",
            "capture_dir": "/var/captures/device1",
            "action_timestamp": 1_700_000_000.0,
            "kpi_references": [{
                "verification_type": "text",
                "command": "waitForTextToAppear",
                "params": { "text": "Home" }
            }],
            "timeout_ms": 3000,
            "device_id": "device1"
        });
        let new: NewMeasurementRequest = serde_json::from_value(json).unwrap();
        assert!(new.device_model.is_none());
        assert_eq!(new.kpi_references.len(), 1);
    }
}
