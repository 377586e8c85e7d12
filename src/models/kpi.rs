use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Kind of check a KPI reference performs against a capture frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VerificationType {
    Image,
    Text,
    Audio,
}

/// One verification the host must run against a frame to confirm the
/// expected on-screen state.
///
/// Serialized shape is `{verification_type, command, params}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "verification_type", rename_all = "snake_case")]
pub enum KpiReference {
    Image { command: String, params: ImageParams },
    Text { command: String, params: TextParams },
    Audio { command: String, params: AudioParams },
}

impl KpiReference {
    pub fn verification_type(&self) -> VerificationType {
        match self {
            KpiReference::Image { .. } => VerificationType::Image,
            KpiReference::Text { .. } => VerificationType::Text,
            KpiReference::Audio { .. } => VerificationType::Audio,
        }
    }

    pub fn command(&self) -> &str {
        match self {
            KpiReference::Image { command, .. }
            | KpiReference::Text { command, .. }
            | KpiReference::Audio { command, .. } => command,
        }
    }

    /// Check the command and the typed params of this reference.
    pub fn check(&self) -> Result<(), KpiReferenceError> {
        if self.command().trim().is_empty() {
            return Err(KpiReferenceError::EmptyCommand);
        }

        let report = match self {
            KpiReference::Image { params, .. } => params.validate(),
            KpiReference::Text { params, .. } => params.validate(),
            KpiReference::Audio { params, .. } => params.validate(),
        };
        report.map_err(KpiReferenceError::InvalidParams)
    }
}

/// Rectangle of the screen a matcher is restricted to.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct Area {
    #[garde(range(min = 0.0))]
    pub x: f64,

    #[garde(range(min = 0.0))]
    pub y: f64,

    #[garde(range(min = 1.0))]
    pub width: f64,

    #[garde(range(min = 1.0))]
    pub height: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ImageParams {
    /// Reference image the frame is matched against.
    #[garde(length(min = 1, max = 1024))]
    pub image_path: String,

    #[serde(default = "default_threshold")]
    #[garde(range(min = 0.0, max = 1.0))]
    pub threshold: f64,

    #[serde(default)]
    #[garde(dive)]
    pub area: Option<Area>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct TextParams {
    #[garde(length(min = 1, max = 500))]
    pub text: String,

    #[serde(default = "default_threshold")]
    #[garde(range(min = 0.0, max = 1.0))]
    pub confidence: f64,

    #[serde(default)]
    #[garde(dive)]
    pub area: Option<Area>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct AudioParams {
    /// Minimum normalized level counted as audible.
    #[serde(default = "default_threshold")]
    #[garde(range(min = 0.0, max = 1.0))]
    pub threshold: f64,

    #[serde(default)]
    #[garde(skip)]
    pub channel: Option<u32>,
}

fn default_threshold() -> f64 {
    0.8
}

#[derive(Debug, thiserror::Error)]
pub enum KpiReferenceError {
    #[error("verification command is empty")]
    EmptyCommand,

    #[error("invalid verification params: {0}")]
    InvalidParams(garde::Report),
}
