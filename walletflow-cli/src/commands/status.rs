//! Status command - store summary

use anyhow::Result;
use colored::Colorize;

use super::get_context;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let status = ctx.status_service.get_status()?;

    if json {
        return output::print_json(&status);
    }

    println!("{}", "Walletflow Store Status".bold());
    if let Some(database) = &status.database {
        println!("{}", database.dimmed());
    }
    println!();

    let mut table = output::create_table();
    table.add_row(vec!["Staged rows", &status.tables.staging_rows.to_string()]);
    table.add_row(vec!["Users", &status.tables.users.to_string()]);
    table.add_row(vec!["Recipients", &status.tables.recipients.to_string()]);
    table.add_row(vec!["Transactions", &status.tables.transactions.to_string()]);
    println!("{}", table);

    if let (Some(earliest), Some(latest)) = (&status.sent_range.earliest, &status.sent_range.latest) {
        println!();
        println!(
            "Sent between {} and {}",
            earliest.format("%Y-%m-%d %H:%M:%S"),
            latest.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}
