use sqlx::PgPool;
use std::sync::Arc;

use crate::config::{AppConfig, EnumeratorKind};
use crate::services::{
    devices::DeviceRegistry,
    enumerator::{FindFrameEnumerator, FrameEnumerator, NativeFrameEnumerator},
    executor::KpiExecutor,
    result_sink::PgResultSink,
    verification::{HttpVerificationClient, VerificationError},
};

/// Process-wide services, built once by the startup routine.
#[derive(Clone)]
pub struct AppState {
    pub devices: Arc<DeviceRegistry>,
    pub executor: KpiExecutor,
}

impl AppState {
    pub fn new(config: &AppConfig, db: PgPool) -> Result<Self, VerificationError> {
        let mut registry = DeviceRegistry::new();
        for device_id in &config.device_ids {
            let client = HttpVerificationClient::new(&config.verification_url, device_id)?;
            registry.register(device_id, config.device_model.as_deref(), Arc::new(client));
        }
        let devices = Arc::new(registry);

        let enumerator: Arc<dyn FrameEnumerator> = match config.enumerator {
            EnumeratorKind::Native => {
                Arc::new(NativeFrameEnumerator::new(config.enumeration_timeout()))
            }
            EnumeratorKind::Find => Arc::new(FindFrameEnumerator::with_program(
                config.find_program.clone(),
                config.enumeration_timeout(),
            )),
        };

        let executor = KpiExecutor::new(
            config.executor(),
            devices.clone(),
            Arc::new(PgResultSink::new(db)),
            enumerator,
        );

        Ok(Self {
            devices,
            executor,
        })
    }
}
