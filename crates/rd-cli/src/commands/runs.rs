//! `runs ls [--all] [--cd <dir>]` (spec §6).

use crate::cli::{CommonOpts, OutputFormat, RunsArgs};
use crate::commands::connect;
use crate::output::print_value;

pub async fn run(common: &CommonOpts, args: RunsArgs, format: OutputFormat) -> rd_core::Result<()> {
    let (client, _target, cwd) = connect(common).await?;
    let cwd_str = cwd.to_string_lossy().to_string();
    let runs = client.list_runs(Some(&cwd_str), args.all).await?;

    print_value(
        format,
        || {
            if runs.is_empty() {
                return "no runs".to_string();
            }
            runs.iter()
                .map(|run| format!("{}  {:?}  {}  {}", run.id, run.status, run.created_at, run.cwd))
                .collect::<Vec<_>>()
                .join("\n")
        },
        &runs,
    );
    Ok(())
}
