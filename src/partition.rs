use crate::error::{ScanError, ScanResult};
use crate::types::{ScanRange, WorkerAssignment};

/// Split `[start, end]` into at most `max_workers` contiguous, disjoint,
/// non-empty ranges that together cover every port exactly once.
///
/// With `total` ports and `workers = min(max_workers, total)`, the first
/// `total % workers` assignments get one extra port.
pub fn partition(start: u16, end: u16, max_workers: usize) -> ScanResult<Vec<WorkerAssignment>> {
    if max_workers == 0 {
        return Err(ScanError::InvalidRange(
            "worker limit must be at least 1".to_string(),
        ));
    }
    if start == 0 {
        return Err(ScanError::InvalidRange(
            "ports must be within 1-65535".to_string(),
        ));
    }
    if start > end {
        return Err(ScanError::InvalidRange(format!(
            "start port {start} is greater than end port {end}"
        )));
    }

    let total = ScanRange::new(start, end).len();
    let workers = max_workers.min(total);
    let base = total / workers;
    let extra = total % workers;

    let mut out = Vec::with_capacity(workers);
    let mut next = u32::from(start);
    for worker_id in 0..workers {
        let len = if worker_id < extra { base + 1 } else { base };
        // len >= 1 and the lengths sum to `total`, so `last` never passes `end`.
        let last = next + len as u32 - 1;
        out.push(WorkerAssignment {
            worker_id,
            range: ScanRange::new(next as u16, last as u16),
        });
        next = last + 1;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(v: &[WorkerAssignment]) -> Vec<(u16, u16)> {
        v.iter().map(|a| (a.range.start, a.range.end)).collect()
    }

    #[test]
    fn remainder_goes_to_first_workers() {
        let parts = partition(20, 22, 2).unwrap();
        assert_eq!(ranges(&parts), vec![(20, 21), (22, 22)]);

        let parts = partition(1, 10, 3).unwrap();
        assert_eq!(ranges(&parts), vec![(1, 4), (5, 7), (8, 10)]);
    }

    #[test]
    fn never_more_workers_than_ports() {
        let parts = partition(100, 102, 50).unwrap();
        assert_eq!(ranges(&parts), vec![(100, 100), (101, 101), (102, 102)]);
    }

    #[test]
    fn single_worker_takes_everything() {
        let parts = partition(1, 1024, 1).unwrap();
        assert_eq!(ranges(&parts), vec![(1, 1024)]);
    }

    #[test]
    fn top_of_port_space_does_not_overflow() {
        let parts = partition(65530, 65535, 4).unwrap();
        assert_eq!(
            ranges(&parts),
            vec![(65530, 65531), (65532, 65533), (65534, 65534), (65535, 65535)]
        );
        let parts = partition(1, 65535, 7).unwrap();
        assert_eq!(parts.last().unwrap().range.end, 65535);
    }

    #[test]
    fn worker_ids_are_sequential() {
        let parts = partition(1, 100, 8).unwrap();
        let ids: Vec<usize> = parts.iter().map(|a| a.worker_id).collect();
        assert_eq!(ids, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn invalid_inputs_rejected() {
        assert!(matches!(partition(1, 10, 0), Err(ScanError::InvalidRange(_))));
        assert!(matches!(partition(10, 1, 2), Err(ScanError::InvalidRange(_))));
        assert!(matches!(partition(0, 10, 2), Err(ScanError::InvalidRange(_))));
    }
}
