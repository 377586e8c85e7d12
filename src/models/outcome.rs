use serde::Serialize;

/// Result of one Scan-Until-Match pass.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// A frame verified; `captures_scanned` is its 1-based position in the
    /// time-ordered candidates.
    Matched {
        match_timestamp: f64,
        captures_scanned: usize,
    },
    NotMatched {
        captures_scanned: usize,
        error: String,
    },
}

impl ScanOutcome {
    pub fn success(&self) -> bool {
        matches!(self, ScanOutcome::Matched { .. })
    }

    pub fn captures_scanned(&self) -> usize {
        match self {
            ScanOutcome::Matched {
                captures_scanned, ..
            }
            | ScanOutcome::NotMatched {
                captures_scanned, ..
            } => *captures_scanned,
        }
    }

    pub fn match_timestamp(&self) -> Option<f64> {
        match self {
            ScanOutcome::Matched {
                match_timestamp, ..
            } => Some(*match_timestamp),
            ScanOutcome::NotMatched { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ScanOutcome::Matched { .. } => None,
            ScanOutcome::NotMatched { error, .. } => Some(error),
        }
    }

    /// Milliseconds from the action to the matching frame, rounded.
    pub fn duration_ms(&self, action_timestamp: f64) -> Option<i64> {
        self.match_timestamp()
            .map(|ts| ((ts - action_timestamp) * 1000.0).round() as i64)
    }
}

/// Values written onto the execution record once a measurement finishes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiResultUpdate {
    pub success: bool,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
}

impl KpiResultUpdate {
    pub fn from_outcome(outcome: &ScanOutcome, action_timestamp: f64) -> Self {
        Self {
            success: outcome.success(),
            duration_ms: outcome.duration_ms(action_timestamp),
            error: outcome.error().map(str::to_string),
        }
    }
}
