use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::models::measurement::MeasurementRequest;
use crate::models::outcome::{KpiResultUpdate, ScanOutcome};
use crate::services::devices::DeviceLookup;
use crate::services::enumerator::FrameEnumerator;
use crate::services::queue::{MeasurementQueue, QueueError};
use crate::services::result_sink::{ResultSink, SinkError};
use crate::services::scanner::scan_until_match;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);
pub const MEASUREMENT_ABORTED: &str = "measurement aborted";

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub queue_capacity: usize,
    /// Upper bound `stop()` waits for the worker to finish its current request.
    pub stop_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

/// Owns the measurement queue and its single background worker.
///
/// Build one per process at startup and hand out clones; all clones share
/// the same queue and worker.
#[derive(Clone)]
pub struct KpiExecutor {
    inner: Arc<Inner>,
}

struct Inner {
    config: ExecutorConfig,
    runtime: Handle,
    queue: MeasurementQueue,
    receiver: Arc<AsyncMutex<mpsc::Receiver<MeasurementRequest>>>,
    worker: Mutex<Option<WorkerHandle>>,
    deps: Arc<WorkerDeps>,
}

struct WorkerDeps {
    devices: Arc<dyn DeviceLookup>,
    sink: Arc<dyn ResultSink>,
    enumerator: Arc<dyn FrameEnumerator>,
}

struct WorkerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl KpiExecutor {
    /// Build the executor. The worker is not started.
    ///
    /// Must be called from within a Tokio runtime; the worker is spawned on
    /// that runtime whichever thread later calls [`KpiExecutor::start`].
    pub fn new(
        config: ExecutorConfig,
        devices: Arc<dyn DeviceLookup>,
        sink: Arc<dyn ResultSink>,
        enumerator: Arc<dyn FrameEnumerator>,
    ) -> Self {
        let (queue, receiver) = MeasurementQueue::new(config.queue_capacity);

        Self {
            inner: Arc::new(Inner {
                config,
                runtime: Handle::current(),
                queue,
                receiver: Arc::new(AsyncMutex::new(receiver)),
                worker: Mutex::new(None),
                deps: Arc::new(WorkerDeps {
                    devices,
                    sink,
                    enumerator,
                }),
            }),
        }
    }

    /// Spawn the worker. No-op if it is already running.
    pub fn start(&self) {
        let mut worker = self.worker_slot();
        if worker.as_ref().is_some_and(|w| !w.join.is_finished()) {
            info!("KPI executor already running");
            return;
        }

        let cancel = CancellationToken::new();
        let join = self.inner.runtime.spawn(run_worker(
            self.inner.receiver.clone(),
            self.inner.deps.clone(),
            cancel.clone(),
        ));
        *worker = Some(WorkerHandle { cancel, join });

        info!(
            queue_capacity = self.inner.queue.capacity(),
            "KPI executor started"
        );
    }

    /// Ask the worker to exit after its current request and wait for it, up
    /// to the configured stop timeout. No-op if not running.
    pub async fn stop(&self) {
        let handle = self.worker_slot().take();
        let Some(handle) = handle else {
            info!("KPI executor not running");
            return;
        };

        handle.cancel.cancel();
        match tokio::time::timeout(self.inner.config.stop_timeout, handle.join).await {
            Ok(Ok(())) => info!("KPI executor stopped"),
            Ok(Err(e)) => error!(error = %e, "KPI worker task ended abnormally"),
            Err(_) => warn!(
                timeout_secs = self.inner.config.stop_timeout.as_secs_f64(),
                "KPI worker still busy after stop timeout, it will exit after the current measurement"
            ),
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker_slot()
            .as_ref()
            .is_some_and(|w| !w.cancel.is_cancelled() && !w.join.is_finished())
    }

    /// Queue a measurement without waiting.
    ///
    /// Returns false if the queue is full; the measurement is dropped.
    pub fn enqueue(&self, request: MeasurementRequest) -> bool {
        let execution_result_id = request.execution_result_id().to_string();

        match self.inner.queue.try_enqueue(request) {
            Ok(()) => {
                metrics::counter!("kpi_measurements_enqueued_total").increment(1);
                metrics::gauge!("kpi_queue_depth").set(self.inner.queue.depth() as f64);
                debug!(
                    execution_result_id = %execution_result_id,
                    depth = self.inner.queue.depth(),
                    "KPI measurement queued"
                );
                true
            }
            Err(e @ QueueError::Full { .. }) => {
                metrics::counter!("kpi_measurements_dropped_total").increment(1);
                warn!(
                    error = %e,
                    capacity = self.inner.queue.capacity(),
                    "Dropped KPI measurement"
                );
                false
            }
            Err(e) => {
                metrics::counter!("kpi_measurements_dropped_total").increment(1);
                error!(error = %e, "Dropped KPI measurement");
                false
            }
        }
    }

    /// Requests waiting to be picked up by the worker.
    pub fn pending(&self) -> usize {
        self.inner.queue.depth()
    }

    fn worker_slot(&self) -> MutexGuard<'_, Option<WorkerHandle>> {
        self.inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_worker(
    receiver: Arc<AsyncMutex<mpsc::Receiver<MeasurementRequest>>>,
    deps: Arc<WorkerDeps>,
    cancel: CancellationToken,
) {
    // A previous worker that outlived its stop timeout keeps the receiver
    // until it finishes its current request.
    let mut rx = tokio::select! {
        guard = receiver.lock_owned() => guard,
        _ = cancel.cancelled() => return,
    };

    info!("KPI worker running");
    loop {
        let request = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            request = rx.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };
        metrics::gauge!("kpi_queue_depth").set(rx.len() as f64);

        process_request(&deps, request).await;
    }
    info!("KPI worker exited");
}

/// Run one measurement. Every error and panic is logged here and goes no
/// further. A panicking measurement is still recorded as a failure.
async fn process_request(deps: &WorkerDeps, request: MeasurementRequest) {
    let execution_result_id = request.execution_result_id().to_string();
    let device_id = request.device_id().to_string();

    match AssertUnwindSafe(measure(deps, &request)).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(
            execution_result_id = %execution_result_id,
            device_id = %device_id,
            error = %e,
            "Failed to record KPI result"
        ),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(
                execution_result_id = %execution_result_id,
                device_id = %device_id,
                panic = %message,
                "KPI measurement panicked"
            );

            let update = KpiResultUpdate {
                success: false,
                duration_ms: None,
                error: Some(format!("{MEASUREMENT_ABORTED}: {message}")),
            };
            metrics::counter!("kpi_measurements_completed_total", "outcome" => "failure")
                .increment(1);
            if let Err(e) = deps
                .sink
                .record(&execution_result_id, request.team_id(), &update)
                .await
            {
                error!(
                    execution_result_id = %execution_result_id,
                    error = %e,
                    "Failed to record aborted KPI measurement"
                );
            }
        }
    }
}

async fn measure(deps: &WorkerDeps, request: &MeasurementRequest) -> Result<(), SinkError> {
    info!(
        execution_result_id = %request.execution_result_id(),
        device_id = %request.device_id(),
        device_model = request.device_model().unwrap_or("unknown"),
        action_time = ?request.action_time(),
        timeout_ms = request.timeout_ms(),
        verifications = %verification_types(request),
        "Processing KPI measurement"
    );

    let outcome = match deps.devices.get_device(request.device_id()) {
        Some(device) => {
            scan_until_match(request, device.verifier.as_ref(), deps.enumerator.as_ref()).await
        }
        None => ScanOutcome::NotMatched {
            captures_scanned: 0,
            error: format!("device {} not found", request.device_id()),
        },
    };

    let update = KpiResultUpdate::from_outcome(&outcome, request.action_timestamp());
    record_metrics(&outcome, &update);

    if update.success {
        info!(
            execution_result_id = %request.execution_result_id(),
            duration_ms = update.duration_ms,
            captures_scanned = outcome.captures_scanned(),
            "KPI measured"
        );
    } else {
        info!(
            execution_result_id = %request.execution_result_id(),
            captures_scanned = outcome.captures_scanned(),
            error = update.error.as_deref().unwrap_or_default(),
            "KPI not measured"
        );
    }

    let recorded = deps
        .sink
        .record(request.execution_result_id(), request.team_id(), &update)
        .await?;
    if !recorded {
        warn!(
            execution_result_id = %request.execution_result_id(),
            team_id = %request.team_id(),
            "No execution result matched, KPI outcome not stored"
        );
    }

    Ok(())
}

fn verification_types(request: &MeasurementRequest) -> String {
    request
        .kpi_references()
        .iter()
        .map(|reference| reference.verification_type().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn record_metrics(outcome: &ScanOutcome, update: &KpiResultUpdate) {
    let label = if update.success { "success" } else { "failure" };
    metrics::counter!("kpi_measurements_completed_total", "outcome" => label).increment(1);
    metrics::histogram!("kpi_captures_scanned").record(outcome.captures_scanned() as f64);
    if let Some(duration_ms) = update.duration_ms {
        metrics::histogram!("kpi_measurement_duration_ms").record(duration_ms as f64);
    }
}
