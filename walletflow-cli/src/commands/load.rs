//! Load command - append a CSV file to staging

use std::path::Path;

use anyhow::Result;
use walletflow_core::services::LoadResult;
use walletflow_core::WalletflowContext;

use super::get_context;
use crate::output;

pub fn run(file: &Path, replace: bool, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = load(&ctx, file, replace)?;

    if json {
        return output::print_json(&result);
    }
    print_result(&result);
    Ok(())
}

pub(crate) fn load(ctx: &WalletflowContext, file: &Path, replace: bool) -> Result<LoadResult> {
    ctx.load_service.load(file, &ctx.load_options(replace))
}

pub(crate) fn print_result(result: &LoadResult) {
    let verb = if result.replaced { "Replaced staging with" } else { "Staged" };
    output::success(&format!(
        "{} {} row(s) from {}",
        verb,
        result.rows_loaded,
        result.file.display()
    ));
    println!("Batch: {}", result.batch_id);
}
