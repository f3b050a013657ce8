use crate::error::{ScanError, ScanResult};
use crate::partition::partition;
use crate::probe::probe;
use crate::services::ServiceTable;
use crate::types::{PortState, ResultSet, ResultSlice, ScanRange, ScanReport, WorkerAssignment};
use ::time::{format_description::well_known, OffsetDateTime};
use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

/// Validated input for one scan of a single host.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub host: String,
    pub start_port: u16,
    pub end_port: u16,
    pub max_workers: usize,
    pub timeout: Duration,
}

impl ScanRequest {
    pub fn new(host: impl Into<String>, start_port: u16, end_port: u16) -> Self {
        Self {
            host: host.into(),
            start_port,
            end_port,
            max_workers: 1,
            timeout: Duration::from_millis(1000),
        }
    }

    pub fn with_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn range(&self) -> ScanRange {
        ScanRange::new(self.start_port, self.end_port)
    }

    /// Reject anything the engine cannot scan, before any I/O happens.
    pub fn validate(&self) -> ScanResult<()> {
        if self.host.trim().is_empty() {
            return Err(ScanError::InvalidHost("host must not be empty".to_string()));
        }
        if self.start_port == 0 || self.end_port == 0 {
            return Err(ScanError::InvalidRange(
                "ports must be within 1-65535".to_string(),
            ));
        }
        if self.start_port > self.end_port {
            return Err(ScanError::InvalidRange(format!(
                "start port {} is greater than end port {}",
                self.start_port, self.end_port
            )));
        }
        if self.max_workers == 0 {
            return Err(ScanError::InvalidRange(
                "worker limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Lock-free counters a caller can watch while a scan runs.
#[derive(Clone, Debug)]
pub struct SharedProgress {
    pub scanned_done: Arc<AtomicU64>,
    pub open_count: Arc<AtomicU64>,
    pub closed_count: Arc<AtomicU64>,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self {
            scanned_done: Arc::new(AtomicU64::new(0)),
            open_count: Arc::new(AtomicU64::new(0)),
            closed_count: Arc::new(AtomicU64::new(0)),
        }
    }

    fn record(&self, state: PortState) {
        match state {
            PortState::Open => self.open_count.fetch_add(1, Ordering::Relaxed),
            _ => self.closed_count.fetch_add(1, Ordering::Relaxed),
        };
        self.scanned_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn scanned(&self) -> u64 {
        self.scanned_done.load(Ordering::Relaxed)
    }

    pub fn open(&self) -> u64 {
        self.open_count.load(Ordering::Relaxed)
    }

    pub fn closed(&self) -> u64 {
        self.closed_count.load(Ordering::Relaxed)
    }
}

impl Default for SharedProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan every port of `request` and return once all workers have finished.
///
/// - The range is partitioned into at most `max_workers` disjoint slices.
/// - Each worker is a task that owns its slice of the result set and probes
///   its ports in ascending order.
/// - Single-port failures are classified closed; only an invalid request is
///   an error.
pub async fn scan(request: &ScanRequest, services: &ServiceTable) -> ScanResult<ScanReport> {
    scan_internal(request, services, None, None).await
}

/// Variant that stops early when `cancel` fires. Ports not reached stay
/// `Unknown` and the report is flagged as cancelled.
pub async fn scan_with_cancel(
    request: &ScanRequest,
    services: &ServiceTable,
    cancel: CancellationToken,
) -> ScanResult<ScanReport> {
    scan_internal(request, services, Some(cancel), None).await
}

pub async fn scan_with_shared(
    request: &ScanRequest,
    services: &ServiceTable,
    cancel: CancellationToken,
    shared: SharedProgress,
) -> ScanResult<ScanReport> {
    scan_internal(request, services, Some(cancel), Some(shared)).await
}

async fn scan_internal(
    request: &ScanRequest,
    services: &ServiceTable,
    cancel_opt: Option<CancellationToken>,
    shared_opt: Option<SharedProgress>,
) -> ScanResult<ScanReport> {
    request.validate()?;
    if !services.range().covers(&request.range()) {
        return Err(ScanError::InvalidRange(format!(
            "service table covers {} but the scan asks for {}",
            services.range(),
            request.range()
        )));
    }
    let assignments = partition(request.start_port, request.end_port, request.max_workers)?;
    let results = ResultSet::new(request.range(), services);
    info!(
        host = %request.host,
        range = %request.range(),
        workers = assignments.len(),
        timeout_ms = request.timeout.as_millis() as u64,
        "scan partitioned"
    );

    let cancel = cancel_opt.unwrap_or_default();
    let progress = shared_opt.unwrap_or_default();
    let host: Arc<str> = Arc::from(request.host.as_str());
    let started_at = now_rfc3339();

    let handles: Vec<_> = results
        .split(&assignments)
        .into_iter()
        .map(|slice| {
            let span = info_span!("worker", id = slice.assignment.worker_id);
            tokio::spawn(
                run_worker(
                    slice,
                    host.clone(),
                    request.timeout,
                    cancel.clone(),
                    progress.clone(),
                )
                .instrument(span),
            )
        })
        .collect();

    // Barrier: nothing is read back until every worker has terminated.
    let joined = join_all(handles).await;

    let slices = joined
        .into_iter()
        .zip(assignments.iter())
        .map(|(res, assignment)| match res {
            Ok(slice) => slice,
            Err(e) => {
                error!(worker = assignment.worker_id, range = %assignment.range, error = %e, "worker crashed");
                ResultSlice::unscanned(*assignment, services)
            }
        })
        .collect();
    let results = ResultSet::join(request.start_port, slices);

    let report = ScanReport {
        host: request.host.clone(),
        start_port: request.start_port,
        end_port: request.end_port,
        workers: assignments.len(),
        started_at,
        finished_at: now_rfc3339(),
        cancelled: cancel.is_cancelled(),
        results,
    };
    info!(
        open = report.results.count(PortState::Open),
        closed = report.results.count(PortState::Closed),
        unknown = report.results.count(PortState::Unknown),
        cancelled = report.cancelled,
        "scan finished"
    );
    Ok(report)
}

/// Probe each port of the worker's slice in ascending order, writing each
/// entry's state exactly once.
async fn run_worker(
    mut slice: ResultSlice,
    host: Arc<str>,
    timeout: Duration,
    cancel: CancellationToken,
    progress: SharedProgress,
) -> ResultSlice {
    let WorkerAssignment { worker_id, range } = slice.assignment;
    debug!(worker_id, %range, "worker started");

    for entry in slice.entries.iter_mut() {
        if cancel.is_cancelled() {
            debug!(worker_id, port = entry.port, "cancelled");
            break;
        }
        let state = probe(&host, entry.port, timeout).await;
        entry.state = state;
        progress.record(state);
    }

    debug!(worker_id, %range, "worker finished");
    slice
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
