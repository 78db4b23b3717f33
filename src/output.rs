//! Run summaries for the terminal: a table for people, one JSON object for scripts.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use serde::Serialize;
use std::path::PathBuf;

use crate::config::IngestConfig;
use crate::dispatch::RunReport;

/// Output mode for CLI results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Writes reports and errors in the selected mode
#[derive(Debug, Clone)]
pub struct OutputWriter {
    pub mode: OutputMode,
}

#[derive(Debug, Serialize)]
struct ErrorLine<'a> {
    success: bool,
    category: &'a str,
    error: String,
}

#[derive(Debug, Serialize)]
struct WrittenFiles<'a> {
    operation: &'a str,
    written: &'a [PathBuf],
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        Self {
            mode: if json { OutputMode::Json } else { OutputMode::Human },
        }
    }

    /// Mode from a loaded config, which already folds in `--json`
    pub fn for_config(config: &IngestConfig) -> Self {
        Self::new(config.json_output)
    }

    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// Print the end-of-run report on stdout
    pub fn print_summary(&self, operation: &str, report: &RunReport) {
        match self.mode {
            OutputMode::Json => {
                if let Ok(json) = serde_json::to_string(&JsonReport { operation, report }) {
                    println!("{}", json);
                }
            }
            OutputMode::Human => {
                println!("{}", summary_table(operation, report));
                let samples = sample_lines(report);
                if !samples.is_empty() {
                    println!("{}", samples);
                }
            }
        }
    }

    /// Print the files a normalization step produced
    pub fn print_written(&self, operation: &str, written: &[PathBuf]) {
        match self.mode {
            OutputMode::Json => {
                if let Ok(json) = serde_json::to_string(&WrittenFiles { operation, written }) {
                    println!("{}", json);
                }
            }
            OutputMode::Human => {
                println!("{}: wrote {} file(s)", operation, written.len());
                for path in written {
                    println!("  {}", path.display());
                }
            }
        }
    }

    /// Print a fatal error on stderr
    pub fn error(&self, category: &str, msg: &str) {
        match self.mode {
            OutputMode::Json => {
                let line = ErrorLine {
                    success: false,
                    category,
                    error: sanitize_error(msg),
                };
                if let Ok(json) = serde_json::to_string(&line) {
                    eprintln!("{}", json);
                }
            }
            OutputMode::Human => {
                eprintln!("Error: {}", sanitize_error(msg));
            }
        }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    operation: &'a str,
    #[serde(flatten)]
    report: &'a RunReport,
}

/// Counts table for one run
pub fn summary_table(operation: &str, report: &RunReport) -> Table {
    let summary = &report.summary;
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new(format!("{} summary", operation))
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        Cell::new(""),
    ]);

    table.add_row(vec![
        Cell::new("Succeeded"),
        Cell::new(summary.succeeded.to_string())
            .fg(Color::Green)
            .add_attribute(Attribute::Bold),
    ]);
    table.add_row(vec![
        Cell::new("Skipped"),
        Cell::new(summary.skipped.to_string()).fg(Color::Yellow),
    ]);
    table.add_row(vec![
        Cell::new("Failed"),
        if summary.failed > 0 {
            Cell::new(summary.failed.to_string())
                .fg(Color::Red)
                .add_attribute(Attribute::Bold)
        } else {
            Cell::new("0")
        },
    ]);

    if !report.no_match.is_empty() {
        table.add_row(vec![
            Cell::new("No matching file"),
            Cell::new(report.no_match.len().to_string()).fg(Color::Yellow),
        ]);
    }
    if !report.multi_match.is_empty() {
        table.add_row(vec![
            Cell::new("Multiple matching files"),
            Cell::new(report.multi_match.len().to_string()).fg(Color::Yellow),
        ]);
    }

    table.add_row(vec![
        Cell::new("Duration"),
        Cell::new(format!("{:.2}s", summary.elapsed.as_secs_f64())).fg(Color::White),
    ]);
    table
}

/// Sample identifiers per non-success category, one category per line
pub fn sample_lines(report: &RunReport) -> String {
    let summary = &report.summary;
    let limit = summary.sample_size();
    let mut lines = Vec::new();

    let mut push = |name: &str, ids: &[String]| {
        if !ids.is_empty() {
            lines.push(format!("{}: {}", name, ids.join(", ")));
        }
    };
    push("failed", &summary.failed_samples);
    push("skipped", &summary.skipped_samples);
    push("no match", &report.no_match[..report.no_match.len().min(limit)]);
    push(
        "multiple matches",
        &report.multi_match[..report.multi_match.len().min(limit)],
    );

    lines.join("\n")
}

/// Collapse whitespace so an error fits on one line
pub fn sanitize_error(msg: &str) -> String {
    msg.split_whitespace().collect::<Vec<&str>>().join(" ")
}
