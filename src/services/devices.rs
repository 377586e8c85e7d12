use std::collections::HashMap;
use std::sync::Arc;

use crate::services::verification::VerificationCapability;

/// A device known to the platform and the verifier that serves it.
#[derive(Clone)]
pub struct Device {
    pub device_id: String,
    pub device_model: Option<String>,
    pub verifier: Arc<dyn VerificationCapability>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("device_id", &self.device_id)
            .field("device_model", &self.device_model)
            .finish_non_exhaustive()
    }
}

pub trait DeviceLookup: Send + Sync {
    fn get_device(&self, device_id: &str) -> Option<Device>;
}

/// Fixed set of devices registered at startup.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        device_id: &str,
        device_model: Option<&str>,
        verifier: Arc<dyn VerificationCapability>,
    ) {
        self.devices.insert(
            device_id.to_string(),
            Device {
                device_id: device_id.to_string(),
                device_model: device_model.map(str::to_string),
                verifier,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl DeviceLookup for DeviceRegistry {
    fn get_device(&self, device_id: &str) -> Option<Device> {
        self.devices.get(device_id).cloned()
    }
}
