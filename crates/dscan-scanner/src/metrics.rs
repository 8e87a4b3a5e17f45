//! Scan metrics.

use metrics::{counter, histogram};

use crate::reconciler::ScanReport;

pub mod names {
    pub const SCANS_TOTAL: &str = "dscan_scans_total";
    pub const SCAN_DURATION_SECONDS: &str = "dscan_scan_duration_seconds";
    pub const VIDEOS_DISCOVERED_TOTAL: &str = "dscan_videos_discovered_total";
    pub const VIDEOS_CLAIMED_TOTAL: &str = "dscan_videos_claimed_total";
    pub const VIDEOS_SKIPPED_TOTAL: &str = "dscan_videos_skipped_total";
    pub const BATCHES_TOTAL: &str = "dscan_batches_total";
    pub const TASKS_CREATED_TOTAL: &str = "dscan_tasks_created_total";
    pub const BATCHES_FAILED_TOTAL: &str = "dscan_batches_failed_total";
}

/// Record a finished pass.
pub fn record_scan(report: &ScanReport) {
    let labels = [
        ("phase", report.phase.as_str().to_string()),
        ("outcome", if report.ok { "ok" } else { "partial" }.to_string()),
    ];
    counter!(names::SCANS_TOTAL, &labels).increment(1);
    histogram!(names::SCAN_DURATION_SECONDS, &labels).record(report.duration_ms as f64 / 1000.0);

    counter!(names::VIDEOS_DISCOVERED_TOTAL).increment(report.discovered as u64);
    counter!(names::VIDEOS_CLAIMED_TOTAL).increment(report.new_queued as u64);
    counter!(names::VIDEOS_SKIPPED_TOTAL).increment((report.skipped + report.lost) as u64);
    counter!(names::BATCHES_TOTAL).increment(report.batches as u64);
    counter!(names::TASKS_CREATED_TOTAL).increment(report.tasks.len() as u64);
    counter!(names::BATCHES_FAILED_TOTAL).increment(report.failed_batches.len() as u64);
}

/// Record a pass that failed before producing a report.
pub fn record_scan_failure(phase: &'static str) {
    counter!(names::SCANS_TOTAL, "phase" => phase, "outcome" => "error").increment(1);
}
