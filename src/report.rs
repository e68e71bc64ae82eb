//! Persisting and rendering check results

use crate::proxy::{CheckSession, ProbeOutcome};
use crate::Result;
use anyhow::Context;
use clap::ValueEnum;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Header row of CSV exports
pub const CSV_HEADER: &str = "Proxy,Type,Status,Response Time,IP,Country";

pub const WORKING_FILE: &str = "working_proxies.txt";
pub const FAILED_FILE: &str = "failed_proxies.txt";

/// Format of the full results file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReportFormat {
    /// Plain-text table sorted by latency
    #[default]
    Txt,
    Json,
    Csv,
}

/// Write one entry per line, newline-terminated
pub fn write_lines<P: AsRef<Path>>(path: P, entries: &[String]) -> Result<()> {
    let path = path.as_ref();
    let content: String = entries.iter().map(|entry| format!("{entry}\n")).collect();
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}

/// Pretty JSON array of outcome records
pub fn write_json<P: AsRef<Path>>(path: P, outcomes: &[ProbeOutcome]) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(outcomes)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

pub fn write_csv<P: AsRef<Path>>(path: P, outcomes: &[ProbeOutcome]) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, to_csv(outcomes)).with_context(|| format!("failed to write {}", path.display()))
}

/// CSV with the fixed column set; absent values are empty cells
pub fn to_csv(outcomes: &[ProbeOutcome]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for outcome in outcomes {
        let row = [
            outcome.raw_proxy.clone(),
            outcome.type_label().to_string(),
            outcome.status_label(),
            outcome.latency_ms.map(|ms| ms.to_string()).unwrap_or_default(),
            outcome.exit_ip.clone().unwrap_or_default(),
            outcome.country.clone().unwrap_or_default(),
        ];
        let cells: Vec<String> = row.iter().map(|cell| csv_escape(cell)).collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

fn csv_escape(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

/// Write the working and failed lists plus the full results in `format`.
/// Returns the paths written.
pub fn save_session<P: AsRef<Path>>(
    session: &CheckSession,
    dir: P,
    format: ReportFormat,
) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let mut written = vec![dir.join(WORKING_FILE), dir.join(FAILED_FILE)];
    write_lines(&written[0], &session.working)?;
    write_lines(&written[1], &session.failed)?;

    let path = match format {
        ReportFormat::Txt => {
            let path = dir.join("results.txt");
            let table = render_table(&session.sorted_by_latency());
            fs::write(&path, table).with_context(|| format!("failed to write {}", path.display()))?;
            path
        }
        ReportFormat::Json => {
            let path = dir.join("results.json");
            write_json(&path, &session.all_results)?;
            path
        }
        ReportFormat::Csv => {
            let path = dir.join("results.csv");
            write_csv(&path, &session.all_results)?;
            path
        }
    };
    written.push(path);

    Ok(written)
}

/// Plain-text table, one row per outcome in the given order
pub fn render_table(outcomes: &[ProbeOutcome]) -> String {
    const HEADERS: [&str; 6] = ["Proxy", "Type", "Status", "Response Time (ms)", "IP", "Country"];

    let rows: Vec<[String; 6]> = outcomes
        .iter()
        .map(|outcome| {
            [
                outcome.raw_proxy.clone(),
                outcome.type_label().to_string(),
                outcome.status_label(),
                outcome
                    .latency_ms
                    .map_or_else(|| "N/A".to_string(), |ms| ms.to_string()),
                outcome.exit_ip.clone().unwrap_or_else(|| "N/A".to_string()),
                outcome.country.clone().unwrap_or_else(|| "N/A".to_string()),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let header: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
    push_row(&mut out, &header, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_row(&mut out, &rule, &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row(out: &mut String, cells: &[String], widths: &[usize; 6]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect();
    let _ = writeln!(out, "{}", line.join(" | ").trim_end());
}
