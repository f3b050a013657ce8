use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, trace};

use crate::error::{ScanError, ScanResult};
use crate::types::ScanRange;

/// Name reported for any port without a matching definition line.
pub const UNKNOWN_SERVICE: &str = "unknown";

/// Default location of the system services database.
pub const DEFAULT_SERVICES_PATH: &str = "/etc/services";

/// Port → service name mapping for one scan range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTable {
    range: ScanRange,
    names: BTreeMap<u16, String>,
}

impl ServiceTable {
    /// Build the table for `[start, end]` from services-file content.
    ///
    /// Only lines containing `/tcp` are considered. Each one is read as
    /// `<name><space|tab><port>/...`:
    /// - the name runs up to the first space or tab
    /// - the port token runs from after that separator up to the first `/`;
    ///   spaces and tabs inside it are dropped, then its leading digits are
    ///   the port
    /// - lines that do not fit are skipped
    ///
    /// Every line is visited, so the source does not need to be sorted. When
    /// several lines name the same port, the last one wins.
    pub fn parse(s: &str, start: u16, end: u16) -> Self {
        let range = ScanRange::new(start, end);
        let mut names = BTreeMap::new();

        for (idx, line) in s.lines().enumerate() {
            let Some((name, port)) = parse_tcp_line(line) else {
                continue;
            };
            if port < u32::from(start) || port > u32::from(end) {
                continue;
            }
            trace!(line = idx + 1, port, name, "service definition");
            // In range, so the value fits in u16.
            names.insert(port as u16, name.to_string());
        }

        Self { range, names }
    }

    /// Read and parse a services file. An unreadable file is fatal to the scan.
    pub fn load(path: impl AsRef<Path>, start: u16, end: u16) -> ScanResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ScanError::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::parse(&String::from_utf8_lossy(&bytes), start, end);
        debug!(
            path = %path.display(),
            range = %table.range,
            named = table.names.len(),
            "loaded service names"
        );
        Ok(table)
    }

    /// Name for `port`, or `"unknown"` when no line matched it.
    pub fn name(&self, port: u16) -> &str {
        self.names
            .get(&port)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_SERVICE)
    }

    pub fn range(&self) -> ScanRange {
        self.range
    }

    /// Ports that have a definition, in ascending order.
    pub fn known(&self) -> impl Iterator<Item = (u16, &str)> {
        self.names.iter().map(|(p, n)| (*p, n.as_str()))
    }
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// Extract `(name, port)` from a `/tcp` definition line.
fn parse_tcp_line(line: &str) -> Option<(&str, u32)> {
    if !line.contains("/tcp") {
        return None;
    }

    let sep = line.find(is_blank)?;
    let name = &line[..sep];
    if name.is_empty() {
        return None;
    }

    let rest = &line[sep + 1..];
    let token = &rest[..rest.find('/')?];
    let digits: String = token
        .chars()
        .filter(|c| !is_blank(*c))
        .take_while(char::is_ascii_digit)
        .collect();
    if digits.is_empty() {
        return None;
    }
    let port = digits.parse::<u32>().ok()?;
    Some((name, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_name_and_port() {
        assert_eq!(parse_tcp_line("ssh\t\t22/tcp"), Some(("ssh", 22)));
        assert_eq!(
            parse_tcp_line("http            80/tcp          www     # WorldWideWeb HTTP"),
            Some(("http", 80))
        );
    }

    #[test]
    fn embedded_blanks_in_port_token_are_dropped() {
        assert_eq!(parse_tcp_line("odd 8 0/tcp"), Some(("odd", 80)));
        assert_eq!(parse_tcp_line("odd\t 4\t43/tcp"), Some(("odd", 443)));
    }

    #[test]
    fn trailing_garbage_after_digits_is_ignored() {
        assert_eq!(parse_tcp_line("weird 25abc/tcp"), Some(("weird", 25)));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        assert_eq!(parse_tcp_line("domain 53/udp"), None);
        assert_eq!(parse_tcp_line("# Network services, Internet style"), None);
        assert_eq!(parse_tcp_line("\t22/tcp"), None);
        assert_eq!(parse_tcp_line("noseparator/tcp"), None);
        assert_eq!(parse_tcp_line("# see the /tcp entries"), None);
        assert_eq!(parse_tcp_line(""), None);
    }

    #[test]
    fn table_defaults_to_unknown_and_filters_range() {
        let input = "ftp\t\t21/tcp\nssh\t\t22/tcp\nsmtp\t\t25/tcp\tmail\n";
        let table = ServiceTable::parse(input, 20, 23);
        assert_eq!(table.name(20), UNKNOWN_SERVICE);
        assert_eq!(table.name(21), "ftp");
        assert_eq!(table.name(22), "ssh");
        assert_eq!(table.name(25), UNKNOWN_SERVICE);
        assert_eq!(table.known().count(), 2);
    }

    #[test]
    fn unsorted_source_still_resolves() {
        let input = "https 443/tcp\nssh 22/tcp\nhttp 80/tcp\n";
        let table = ServiceTable::parse(input, 1, 100);
        assert_eq!(table.name(22), "ssh");
        assert_eq!(table.name(80), "http");
        assert_eq!(table.name(443), UNKNOWN_SERVICE);
    }

    #[test]
    fn later_line_wins_for_same_port() {
        let input = "first 7/tcp\nsecond 7/tcp\n";
        let table = ServiceTable::parse(input, 1, 10);
        assert_eq!(table.name(7), "second");
    }

    #[test]
    fn missing_file_is_source_unavailable() {
        let err = ServiceTable::load("/definitely/not/here/services", 1, 10).unwrap_err();
        assert!(matches!(err, ScanError::SourceUnavailable { .. }));
    }
}
