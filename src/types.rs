use serde::{Deserialize, Serialize};
use std::fmt;

use crate::services::ServiceTable;

/// Classification of one port. `Unknown` only exists before a worker has
/// probed the port.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    #[default]
    Unknown,
    Open,
    Closed,
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortState::Unknown => write!(f, "unknown"),
            PortState::Open => write!(f, "opened"),
            PortState::Closed => write!(f, "closed"),
        }
    }
}

/// One result row: a port, its conventional service name, and its state.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    pub port: u16,
    pub service_name: String,
    pub state: PortState,
}

/// Inclusive port interval.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRange {
    pub start: u16,
    pub end: u16,
}

impl ScanRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// Number of ports in the range. Counted in `usize` so `1..=65535` fits.
    pub fn len(&self) -> usize {
        if self.start > self.end {
            0
        } else {
            usize::from(self.end - self.start) + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, port: u16) -> bool {
        self.start <= port && port <= self.end
    }

    /// True when every port of `other` lies inside this range.
    pub fn covers(&self, other: &ScanRange) -> bool {
        other.is_empty() || (self.contains(other.start) && self.contains(other.end))
    }

    pub fn ports(&self) -> std::ops::RangeInclusive<u16> {
        self.start..=self.end
    }
}

impl fmt::Display for ScanRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// The slice of the port interval a single worker is responsible for.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerAssignment {
    pub worker_id: usize,
    pub range: ScanRange,
}

/// Results for every port of a scan, indexed by `port - start`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ResultSet {
    start: u16,
    entries: Vec<PortEntry>,
}

impl ResultSet {
    /// Allocate one `Unknown` entry per port of `range`, named from `services`.
    pub fn new(range: ScanRange, services: &ServiceTable) -> Self {
        let entries = range
            .ports()
            .map(|port| PortEntry {
                port,
                service_name: services.name(port).to_string(),
                state: PortState::Unknown,
            })
            .collect();
        Self {
            start: range.start,
            entries,
        }
    }

    pub fn get(&self, port: u16) -> Option<&PortEntry> {
        let idx = usize::from(port.checked_sub(self.start)?);
        self.entries.get(idx)
    }

    pub fn state(&self, port: u16) -> Option<PortState> {
        self.get(port).map(|e| e.state)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PortEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, state: PortState) -> usize {
        self.entries.iter().filter(|e| e.state == state).count()
    }

    pub fn open_ports(&self) -> Vec<u16> {
        self.entries
            .iter()
            .filter(|e| e.state == PortState::Open)
            .map(|e| e.port)
            .collect()
    }

    /// True once no entry is left `Unknown`.
    pub fn is_complete(&self) -> bool {
        self.count(PortState::Unknown) == 0
    }

    /// Hand out one owned, disjoint slice per assignment.
    ///
    /// `assignments` must be ascending and tile the set's range exactly, as
    /// produced by [`crate::partition::partition`].
    pub(crate) fn split(self, assignments: &[WorkerAssignment]) -> Vec<ResultSlice> {
        let mut rest = self.entries;
        let mut slices = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let tail = rest.split_off(assignment.range.len().min(rest.len()));
            slices.push(ResultSlice {
                assignment: *assignment,
                entries: rest,
            });
            rest = tail;
        }
        debug_assert!(rest.is_empty(), "assignments must cover every entry");
        slices
    }

    /// Stitch worker slices back together. Slices must be in assignment order.
    pub(crate) fn join(start: u16, slices: Vec<ResultSlice>) -> Self {
        let entries = slices.into_iter().flat_map(|s| s.entries).collect();
        Self { start, entries }
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a PortEntry;
    type IntoIter = std::slice::Iter<'a, PortEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A worker's exclusive share of the result set, moved into the worker task
/// and handed back once it finishes.
#[derive(Debug)]
pub(crate) struct ResultSlice {
    pub assignment: WorkerAssignment,
    pub entries: Vec<PortEntry>,
}

impl ResultSlice {
    /// Rebuild a slice of `Unknown` entries for an assignment whose worker
    /// never returned its own.
    pub fn unscanned(assignment: WorkerAssignment, services: &ServiceTable) -> Self {
        let entries = assignment
            .range
            .ports()
            .map(|port| PortEntry {
                port,
                service_name: services.name(port).to_string(),
                state: PortState::Unknown,
            })
            .collect();
        Self {
            assignment,
            entries,
        }
    }
}

/// Everything the display layer needs from a finished scan.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScanReport {
    pub host: String,
    pub start_port: u16,
    pub end_port: u16,
    pub workers: usize,
    pub started_at: String,
    pub finished_at: String,
    pub cancelled: bool,
    pub results: ResultSet,
}
