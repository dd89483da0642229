//! Run command - load, normalize and report in one go

use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use walletflow_core::services::{LoadResult, NormalizeResult, ReportKind};

use super::report::{self, NamedReport};
use super::{get_context, load, normalize};
use crate::output::{self, OutputFormat};

#[derive(Serialize)]
struct BatchSummary<'a> {
    load: &'a LoadResult,
    normalize: &'a NormalizeResult,
    reports: Vec<NamedReport<'a>>,
}

pub fn run(file: &Path, replace: bool, format: OutputFormat) -> Result<()> {
    let ctx = get_context()?;

    let loaded = load::load(&ctx, file, replace)?;
    let normalized = normalize::normalize(&ctx)?;
    let reports = ctx.report_service.run_many(&ReportKind::ALL)?;

    if format == OutputFormat::Json {
        return output::print_json(&BatchSummary {
            load: &loaded,
            normalize: &normalized,
            reports: report::named(&reports),
        });
    }

    load::print_result(&loaded);
    normalize::print_result(&normalized);
    println!();
    output::info(&format!("{} report(s)", reports.len()));
    println!();
    report::print_reports(&reports, format)
}
