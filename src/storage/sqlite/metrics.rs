//! Metrics recording for storage operations.

use crate::Result;
use std::time::Instant;

/// Records operation metrics for storage operations.
///
/// Emits `storage_operations_total` (counter) and
/// `storage_operation_duration_ms` (histogram), both labelled by backend,
/// operation and status (`success` / `error`).
pub fn record_operation_metrics(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "storage_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Runs `op` and records its outcome and latency.
pub fn timed<T>(
    backend: &'static str,
    operation: &'static str,
    op: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let start = Instant::now();
    let result = op();
    let status = if result.is_ok() { "success" } else { "error" };
    record_operation_metrics(backend, operation, start, status);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_timed_passes_result_through() {
        assert_eq!(timed("sqlite", "lookup", || Ok(7)).unwrap(), 7);

        let err = timed::<()>("sqlite", "lookup", || Err(Error::InvalidInput("x".into())));
        assert!(matches!(err, Err(Error::InvalidInput(_))));
    }
}
