//! Report command - run one report or the whole catalogue

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use walletflow_core::services::{Report, ReportKind};

use super::get_context;
use crate::output::{self, OutputFormat};

/// JSON shape of one catalogue entry
#[derive(Serialize)]
pub(crate) struct NamedReport<'a> {
    report: &'static str,
    rows: &'a Report,
}

pub(crate) fn named(reports: &[(ReportKind, Report)]) -> Vec<NamedReport<'_>> {
    reports
        .iter()
        .map(|(kind, report)| NamedReport {
            report: kind.name(),
            rows: report,
        })
        .collect()
}

pub fn run(name: Option<&str>, format: OutputFormat) -> Result<()> {
    let kinds = match name {
        None | Some("all") => ReportKind::ALL.to_vec(),
        Some(name) => vec![name.parse::<ReportKind>()?],
    };

    let ctx = get_context()?;
    let reports = ctx.report_service.run_many(&kinds)?;
    print_reports(&reports, format)
}

pub(crate) fn print_reports(reports: &[(ReportKind, Report)], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let named = named(reports);
            // A single report prints bare so it can be piped straight into jq
            if let [only] = named.as_slice() {
                output::print_json(only.rows)
            } else {
                output::print_json(&named)
            }
        }
        OutputFormat::Csv | OutputFormat::Table => {
            let single = reports.len() == 1;
            for (kind, report) in reports {
                if !single {
                    println!("{}", kind.name().bold());
                }
                output::print_rows(&report.to_query_result()?, format);
                if !single {
                    println!();
                }
            }
            Ok(())
        }
    }
}
