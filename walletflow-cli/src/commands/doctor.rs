//! Doctor command - soft-reference integrity report

use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, Color};
use walletflow_core::services::CheckStatus;

use super::get_context;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = ctx.doctor_service.run_checks()?;

    if json {
        return output::print_json(&result);
    }

    println!("{}", "Store Health Check".bold());
    println!();

    let mut table = output::create_table();
    table.set_header(vec!["Check", "Status", "Message"]);

    for (check_name, check) in &result.checks {
        let status_cell = match check.status {
            CheckStatus::Pass => Cell::new("PASS").fg(Color::Green),
            CheckStatus::Warning => Cell::new("WARN").fg(Color::Yellow),
        };
        table.add_row(vec![
            Cell::new(check_name),
            status_cell,
            Cell::new(&check.message),
        ]);
    }

    println!("{}", table);
    println!();
    println!(
        "Summary: {} passed, {} warnings",
        result.summary.passed.to_string().green(),
        result.summary.warnings.to_string().yellow(),
    );

    Ok(())
}
