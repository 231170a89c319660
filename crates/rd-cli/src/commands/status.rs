//! `status` (spec §6): reports the resolved runner target and its health.

use serde::Serialize;

use crate::cli::{CommonOpts, OutputFormat};
use crate::commands::connect;
use crate::output::print_value;

#[derive(Debug, Serialize)]
struct StatusReport {
    base_url: String,
    source: &'static str,
    ok: bool,
    codex_runtime: String,
}

pub async fn run(common: &CommonOpts, format: OutputFormat) -> rd_core::Result<()> {
    let (client, target, _cwd) = connect(common).await?;
    let health = client.health().await?;

    let source = match target.source {
        rd_client::TargetSource::Explicit => "explicit",
        rd_client::TargetSource::Daemon => "daemon",
        rd_client::TargetSource::Foreground => "foreground",
    };

    let report = StatusReport { base_url: target.base_url.clone(), source, ok: health.ok, codex_runtime: health.codex_runtime };
    print_value(
        format,
        || format!("{} ({source}): codex_runtime={}", report.base_url, report.codex_runtime),
        &report,
    );
    Ok(())
}
