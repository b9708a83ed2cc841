use std::time::Duration;

pub fn loaded_customers(count: usize) -> String {
    format!("Loaded {count} customers")
}

pub const EMPTY_LIST: &str =
    "Customer list is empty. Please upload a customer Excel file first.";

pub fn source_unavailable(err: &str) -> String {
    format!("Failed to fetch customer list: {err}")
}

pub fn processing(position: usize, total: usize) -> String {
    format!("Processing {position}/{total}")
}

pub fn sent_to(name: &str) -> String {
    format!("Sent to {name}")
}

pub fn generation_failed(name: &str, err: &str) -> String {
    format!("No text generated for {name}: {err}")
}

pub fn send_failed(name: &str, err: &str) -> String {
    format!("Send failed for {name}: {err}")
}

pub fn tracking_failed(err: &str) -> String {
    format!("Tracking write failed: {err}")
}

pub fn requeued(name: &str, attempt: u32, max_attempts: u32) -> String {
    format!("Requeued {name} (attempt {attempt}/{max_attempts})")
}

/// `Waiting 2h 5m for business hours`
pub fn waiting_for_hours(wait: Duration) -> String {
    let minutes = wait.as_secs().div_ceil(60);
    format!(
        "Waiting {}h {}m for business hours",
        minutes / 60,
        minutes % 60
    )
}

pub fn resumed_at(cursor: usize, total: usize) -> String {
    format!("Resuming at {cursor}/{total}")
}

pub const CHECKPOINT_MISMATCH: &str =
    "Saved progress belongs to a different customer list, starting from the beginning";

pub fn checkpoint_save_fail(err: &str) -> String {
    format!("Failed to save progress checkpoint: {err}")
}

pub fn stopped_at(cursor: usize, total: usize) -> String {
    format!("Stopped at {cursor}/{total}")
}

pub const WORKFLOW_COMPLETE: &str = "Workflow complete";

pub const TEST_MODE: &str = "Test mode: dispatching to a single synthetic customer";
