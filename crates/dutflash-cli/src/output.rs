//! Output formatting for dutflash (table, json)

use clap::ValueEnum;
use colored::Colorize;
use dutflash_engine::{FlashError, FlashReport, ResultCode};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// One line summary of a flash run
#[derive(Debug, Serialize, Tabled)]
pub struct ReportRow {
    #[tabled(rename = "Code")]
    pub code: u16,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Build")]
    pub build: String,
    #[tabled(rename = "Attempts")]
    pub attempts: u32,
    #[tabled(rename = "Message")]
    pub message: String,
}

impl ReportRow {
    pub fn from_report(report: &FlashReport) -> Self {
        let code = report.code();
        Self {
            code: code.as_u16(),
            status: status_name(code),
            build: report.build.build_number.clone(),
            attempts: report.attempts,
            message: report.message(),
        }
    }

    pub fn from_error(error: &FlashError) -> Self {
        let code = error.result_code();
        Self {
            code: code.as_u16(),
            status: status_name(code),
            build: match error {
                FlashError::Reconciliation { version, .. } => version.clone(),
                _ => String::from("-"),
            },
            attempts: 0,
            message: error.to_string(),
        }
    }
}

fn status_name(code: ResultCode) -> String {
    serde_json::to_value(code)
        .ok()
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| code.to_string())
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Whether interactive decorations (spinners) make sense
    pub fn interactive(&self) -> bool {
        !self.quiet && self.format == OutputFormat::Table
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Print the outcome of a flash run
    pub fn print_row(&self, row: &ReportRow, ok: bool) {
        match self.format {
            OutputFormat::Table => {
                println!("{}", Table::new([row]));
                if ok {
                    self.success(&row.message);
                } else {
                    self.error(&row.message);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(row).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
    }

    /// Print key-value pairs
    pub fn print_kv(&self, pairs: &[(String, String)]) {
        match self.format {
            OutputFormat::Table => {
                for (key, value) in pairs {
                    println!("{}: {}", key.bold(), value);
                }
            }
            OutputFormat::Json => {
                let map: std::collections::BTreeMap<&str, &str> = pairs
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&map).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dutflash_core::CollaboratorError;
    use dutflash_engine::{ResolvedBuild, TrackingRecord, WorkflowResult};
    use std::path::PathBuf;

    #[test]
    fn test_row_from_report() {
        let report = FlashReport {
            result: WorkflowResult::UpdateSucceeded {
                version: "120".into(),
            },
            build: ResolvedBuild {
                build_number: "120".into(),
                artifact_path: PathBuf::from("/dl/main/120/tools/devtool"),
            },
            attempts: 2,
            tracking: TrackingRecord::Target {
                tag: "D".into(),
                build_number: "120".into(),
            },
        };

        let row = ReportRow::from_report(&report);
        assert_eq!(row.code, 200);
        assert_eq!(row.status, "success");
        assert_eq!(row.attempts, 2);
        assert_eq!(row.message, "Device updated to build 120");
    }

    #[test]
    fn test_row_from_reconciliation_error_shows_version() {
        let error = FlashError::Reconciliation {
            version: "121".into(),
            source: CollaboratorError::NotFound("serial number".into()),
        };

        let row = ReportRow::from_error(&error);
        assert_eq!(row.code, 500);
        assert_eq!(row.build, "121");
        assert!(row.message.starts_with("Device updated to 121"));
    }

    #[test]
    fn test_row_from_resolution_error_has_no_build() {
        let error = FlashError::Resolution {
            token: "latest".into(),
            branch: "main".into(),
            source: CollaboratorError::NotFound("no builds".into()),
        };

        assert_eq!(ReportRow::from_error(&error).build, "-");
    }
}
