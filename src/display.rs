use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::io::{BufRead, Write};

use crate::types::{PortEntry, PortState, ScanReport};

/// Which rows of the result table to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ShowFilter {
    Open,
    Closed,
    All,
}

impl ShowFilter {
    pub fn matches(self, state: PortState) -> bool {
        match self {
            ShowFilter::Open => state == PortState::Open,
            ShowFilter::Closed => state == PortState::Closed,
            ShowFilter::All => true,
        }
    }

    fn from_menu_choice(choice: u32) -> Option<Self> {
        match choice {
            1 => Some(ShowFilter::Open),
            2 => Some(ShowFilter::Closed),
            3 => Some(ShowFilter::All),
            _ => None,
        }
    }
}

fn state_cell(state: PortState, color: bool) -> String {
    let text = state.to_string();
    if !color {
        return text;
    }
    match state {
        PortState::Open => text.bright_green().bold().to_string(),
        PortState::Closed => text.red().bold().to_string(),
        PortState::Unknown => text.dimmed().to_string(),
    }
}

fn row(entry: &PortEntry, color: bool) -> String {
    format!(
        "{}\t{}\t{}\n",
        entry.port,
        state_cell(entry.state, color),
        entry.service_name
    )
}

/// Render the `PORT STATE SERVICE` table for the rows selected by `filter`.
pub fn render_table(report: &ScanReport, filter: ShowFilter, color: bool) -> String {
    let mut out = String::new();
    out.push_str("\nPORT\tSTATE\tSERVICE\n");
    out.push_str("-----------------------\n");
    for entry in report.results.iter().filter(|e| filter.matches(e.state)) {
        out.push_str(&row(entry, color));
    }
    out
}

/// One-line totals printed after the table.
pub fn render_summary(report: &ScanReport) -> String {
    let results = &report.results;
    let mut line = format!(
        "\n{}: {} open, {} closed of {} ports ({}-{}) with {} worker(s)",
        report.host,
        results.count(PortState::Open),
        results.count(PortState::Closed),
        results.len(),
        report.start_port,
        report.end_port,
        report.workers
    );
    let unknown = results.count(PortState::Unknown);
    if unknown > 0 {
        line.push_str(&format!(", {unknown} not scanned"));
    }
    if report.cancelled {
        line.push_str(" [cancelled]");
    }
    line.push('\n');
    line
}

fn menu_header(color: bool) -> String {
    let (title, opened, closed, warning) = if color {
        (
            "PORT SCANNER".blue().bold().to_string(),
            "opened".bright_green().bold().to_string(),
            "closed".red().bold().to_string(),
            "Warning".underline().to_string(),
        )
    } else {
        (
            "PORT SCANNER".to_string(),
            "opened".to_string(),
            "closed".to_string(),
            "Warning".to_string(),
        )
    };
    format!(
        "{title}\n\
         ===============================\n\
         [1]\tShow only {opened} ports\n\
         [2]\tShow only {closed} ports\n\
         [3]\tShow all results ({warning}: can be quite a long output depending on your port range)\n"
    )
}

fn read_choice<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<Option<u32>> {
    write!(output, "Choice: ")?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line).context("failed to read menu choice")? == 0 {
        return Ok(None);
    }
    let choice = line
        .trim()
        .parse::<u32>()
        .with_context(|| format!("unexpected input: {:?}", line.trim()))?;
    Ok(Some(choice))
}

/// Interactive post-scan menu: pick a filter, view the table, then go back
/// (`4`) or exit (`0`). End of input exits quietly; anything else is an error.
pub fn run_menu<R: BufRead, W: Write>(
    report: &ScanReport,
    input: &mut R,
    output: &mut W,
    color: bool,
) -> Result<()> {
    loop {
        write!(output, "{}", menu_header(color))?;
        let filter = match read_choice(input, output)? {
            None | Some(0) => return Ok(()),
            Some(c) => match ShowFilter::from_menu_choice(c) {
                Some(f) => f,
                None => bail!("unexpected input: {c}"),
            },
        };

        write!(output, "{}", render_table(report, filter, color))?;
        write!(output, "\n[4]\tGo back to menu\n[0]\tExit the program\n\n")?;

        match read_choice(input, output)? {
            Some(4) => continue,
            None | Some(0) => return Ok(()),
            Some(c) => bail!("unexpected input: {c}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServiceTable;
    use crate::types::{ResultSet, ScanRange};

    fn report() -> ScanReport {
        let table = ServiceTable::parse("ssh 22/tcp\n", 21, 23);
        let fresh = ResultSet::new(ScanRange::new(21, 23), &table);
        let mut slices = fresh.split(&crate::partition::partition(21, 23, 1).unwrap());
        let states = [PortState::Closed, PortState::Open, PortState::Closed];
        for (entry, state) in slices[0].entries.iter_mut().zip(states) {
            entry.state = state;
        }
        let results = ResultSet::join(21, slices);
        ScanReport {
            host: "example".into(),
            start_port: 21,
            end_port: 23,
            workers: 1,
            started_at: String::new(),
            finished_at: String::new(),
            cancelled: false,
            results,
        }
    }

    #[test]
    fn open_filter_shows_only_open_rows() {
        let out = render_table(&report(), ShowFilter::Open, false);
        assert!(out.contains("22\topened\tssh"));
        assert!(!out.contains("closed"));
    }

    #[test]
    fn all_filter_shows_every_row() {
        let out = render_table(&report(), ShowFilter::All, false);
        assert!(out.contains("21\tclosed\tunknown"));
        assert!(out.contains("22\topened\tssh"));
        assert!(out.contains("23\tclosed\tunknown"));
    }

    #[test]
    fn summary_counts_states() {
        let out = render_summary(&report());
        assert!(out.contains("1 open, 2 closed of 3 ports"));
        assert!(!out.contains("cancelled"));
    }

    #[test]
    fn menu_back_then_exit() {
        let mut input = "2\n4\n1\n0\n".as_bytes();
        let mut output = Vec::new();
        run_menu(&report(), &mut input, &mut output, false).unwrap();
        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("21\tclosed\tunknown"));
        assert!(text.contains("22\topened\tssh"));
        assert_eq!(text.matches("Go back to menu").count(), 2);
    }

    #[test]
    fn menu_rejects_unexpected_input() {
        let mut input = "1\n7\n".as_bytes();
        let mut output = Vec::new();
        assert!(run_menu(&report(), &mut input, &mut output, false).is_err());

        let mut input = "banana\n".as_bytes();
        assert!(run_menu(&report(), &mut input, &mut Vec::<u8>::new(), false).is_err());
    }
}
