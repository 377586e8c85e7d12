use tracing::{debug, warn};

use crate::models::capture::{CaptureFrame, TimeWindow};
use crate::models::measurement::MeasurementRequest;
use crate::models::outcome::ScanOutcome;
use crate::services::enumerator::FrameEnumerator;
use crate::services::verification::VerificationCapability;

pub const NO_CAPTURES_IN_WINDOW: &str = "no captures in time window";

/// Find the earliest frame in the request's window that passes all of its
/// verifications.
///
/// Candidates are checked oldest first and the scan stops at the first pass.
/// Listing failures count as an empty window; a verification error on one
/// frame counts as a miss for that frame.
pub async fn scan_until_match(
    request: &MeasurementRequest,
    verifier: &dyn VerificationCapability,
    enumerator: &dyn FrameEnumerator,
) -> ScanOutcome {
    let window = TimeWindow::after(request.action_timestamp(), request.timeout_ms());
    let candidates = list_candidates(request, enumerator, window).await;

    if candidates.is_empty() {
        return ScanOutcome::NotMatched {
            captures_scanned: 0,
            error: NO_CAPTURES_IN_WINDOW.to_string(),
        };
    }

    debug!(
        execution_result_id = %request.execution_result_id(),
        candidates = candidates.len(),
        window_start = window.start,
        window_end = window.end,
        "Scanning capture window"
    );

    for (index, frame) in candidates.iter().enumerate() {
        let report = verifier
            .execute(request.kpi_references(), &frame.path, request.team_id())
            .await;

        match report {
            Ok(report) if report.success => {
                return ScanOutcome::Matched {
                    match_timestamp: frame.timestamp,
                    captures_scanned: index + 1,
                };
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    execution_result_id = %request.execution_result_id(),
                    frame = %frame.path.display(),
                    error = %e,
                    "Verification failed on frame, treating as no match"
                );
            }
        }
    }

    ScanOutcome::NotMatched {
        captures_scanned: candidates.len(),
        error: format!(
            "no match within {}ms ({} captures scanned)",
            request.timeout_ms(),
            candidates.len()
        ),
    }
}

async fn list_candidates(
    request: &MeasurementRequest,
    enumerator: &dyn FrameEnumerator,
    window: TimeWindow,
) -> Vec<CaptureFrame> {
    let mut frames = match enumerator.enumerate(request.capture_dir(), window).await {
        Ok(frames) => frames,
        Err(e) => {
            warn!(
                execution_result_id = %request.execution_result_id(),
                capture_dir = %request.capture_dir().display(),
                error = %e,
                "Capture listing failed, treating as empty window"
            );
            return Vec::new();
        }
    };

    // Enumerators may hand back anything; the window is enforced here too.
    frames.retain(|frame| window.contains(frame.timestamp));
    frames.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    frames
}
