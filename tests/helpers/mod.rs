//! Fakes and fixtures shared by the executor tests

#![allow(dead_code)]

use futures::future::BoxFuture;
use futures::FutureExt;
use kpi_measure::{
    models::{
        capture::epoch_seconds,
        kpi::{ImageParams, KpiReference},
        measurement::{MeasurementRequest, NewMeasurementRequest},
        outcome::KpiResultUpdate,
    },
    services::{
        devices::DeviceRegistry,
        enumerator::NativeFrameEnumerator,
        executor::{ExecutorConfig, KpiExecutor},
        result_sink::{ResultSink, SinkError},
        verification::{VerificationCapability, VerificationError, VerificationReport},
    },
};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub const DEVICE_ID: &str = "device1";
pub const TEAM_ID: &str = "team-1";

/// Verifier that passes frames by file name.
#[derive(Default)]
pub struct ScriptedVerifier {
    pub passing: Vec<String>,
    /// Frames whose verification panics.
    pub panicking: Vec<String>,
    pub delay: Duration,
    pub calls: Mutex<Vec<PathBuf>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedVerifier {
    pub fn passing(names: &[&str]) -> Self {
        Self {
            passing: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }

    /// Most verifications ever running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl VerificationCapability for ScriptedVerifier {
    fn execute<'a>(
        &'a self,
        _verifications: &'a [KpiReference],
        image_path: &'a Path,
        _team_id: &'a str,
    ) -> BoxFuture<'a, Result<VerificationReport, VerificationError>> {
        async move {
            self.calls.lock().unwrap().push(image_path.to_path_buf());
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let name = image_path.file_name().unwrap().to_string_lossy().to_string();
            if self.panicking.contains(&name) {
                panic!("matcher blew up on {name}");
            }

            Ok(VerificationReport {
                success: self.passing.contains(&name),
                ..Default::default()
            })
        }
        .boxed()
    }
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub execution_result_id: String,
    pub team_id: String,
    pub update: KpiResultUpdate,
}

/// Sink that keeps every outcome in memory. Ids starting with `fail` error
/// out after being recorded.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<Recorded>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<Recorded> {
        self.records.lock().unwrap().clone()
    }

    /// Wait until at least `count` outcomes arrived.
    pub async fn wait_for(&self, count: usize) -> Vec<Recorded> {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let records = self.records();
            if records.len() >= count {
                return records;
            }
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {count} results, got {}",
                records.len()
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl ResultSink for RecordingSink {
    fn record<'a>(
        &'a self,
        execution_result_id: &'a str,
        team_id: &'a str,
        update: &'a KpiResultUpdate,
    ) -> BoxFuture<'a, Result<bool, SinkError>> {
        async move {
            self.records.lock().unwrap().push(Recorded {
                execution_result_id: execution_result_id.to_string(),
                team_id: team_id.to_string(),
                update: update.clone(),
            });
            if execution_result_id.starts_with("fail") {
                return Err(SinkError::Database(sqlx::Error::PoolTimedOut));
            }
            Ok(true)
        }
        .boxed()
    }
}

pub fn executor(
    verifier: Arc<ScriptedVerifier>,
    sink: Arc<RecordingSink>,
    queue_capacity: usize,
) -> KpiExecutor {
    executor_with_config(
        verifier,
        sink,
        ExecutorConfig {
            queue_capacity,
            stop_timeout: Duration::from_secs(5),
        },
    )
}

pub fn executor_with_config(
    verifier: Arc<ScriptedVerifier>,
    sink: Arc<RecordingSink>,
    config: ExecutorConfig,
) -> KpiExecutor {
    let mut registry = DeviceRegistry::new();
    registry.register(DEVICE_ID, Some("android_tv"), verifier);

    KpiExecutor::new(
        config,
        Arc::new(registry),
        sink,
        Arc::new(NativeFrameEnumerator::default()),
    )
}

/// A whole second comfortably in the past, so frame mtimes are never in
/// the future.
pub fn action_timestamp() -> f64 {
    epoch_seconds(SystemTime::now()).floor() - 120.0
}

pub fn write_frame(dir: &Path, name: &str, timestamp: f64) {
    let file = File::create(dir.join(name)).unwrap();
    file.set_modified(UNIX_EPOCH + Duration::from_secs_f64(timestamp))
        .unwrap();
}

pub fn new_request(dir: &Path, execution_result_id: &str, action_timestamp: f64) -> NewMeasurementRequest {
    NewMeasurementRequest {
        execution_result_id: execution_result_id.to_string(),
        team_id: TEAM_ID.to_string(),
        capture_dir: dir.to_path_buf(),
        action_timestamp,
        kpi_references: vec![KpiReference::Image {
            command: "waitForImageToAppear".to_string(),
            params: ImageParams {
                image_path: "refs/home_banner.png".to_string(),
                threshold: 0.9,
                area: None,
            },
        }],
        timeout_ms: 5000,
        device_id: DEVICE_ID.to_string(),
        device_model: Some("android_tv".to_string()),
    }
}

pub fn request(dir: &Path, execution_result_id: &str, action_timestamp: f64) -> MeasurementRequest {
    MeasurementRequest::new(new_request(dir, execution_result_id, action_timestamp)).unwrap()
}

/// Poll `condition` until it holds or ten seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
