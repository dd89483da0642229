//! Normalize command - staging into users, recipients and transactions

use anyhow::Result;
use chrono::Utc;
use walletflow_core::services::NormalizeResult;
use walletflow_core::WalletflowContext;

use super::get_context;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = normalize(&ctx)?;

    if json {
        return output::print_json(&result);
    }
    print_result(&result);
    Ok(())
}

pub(crate) fn normalize(ctx: &WalletflowContext) -> Result<NormalizeResult> {
    ctx.normalize_service.run(Utc::now())
}

pub(crate) fn print_result(result: &NormalizeResult) {
    if result.staged_rows == 0 {
        output::warning("Staging is empty, nothing to normalize");
        return;
    }

    let mut table = output::create_table();
    table.set_header(vec!["Table", "Candidates", "Inserted", "Already present"]);
    for (name, counts) in [
        ("users", &result.users),
        ("recipients", &result.recipients),
        ("transactions", &result.transactions),
    ] {
        table.add_row(vec![
            name.to_string(),
            counts.candidates.to_string(),
            counts.inserted.to_string(),
            counts.skipped().to_string(),
        ]);
    }

    output::success(&format!("Normalized {} staged row(s)", result.staged_rows));
    println!("{}", table);
}
