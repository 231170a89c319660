//! `review [--uncommitted|--commit <sha>|--base <ref>] [--prompt <p>]`
//! (spec §6): combining `--prompt` with `--uncommitted`/`--base` forces
//! app-server mode with `sandbox=read-only`.

use rd_client::dto::CreateRunRequest;
use rd_core::model::{ReviewDelivery, ReviewDescriptor, ReviewMode, RunKind};

use crate::cli::{CommonOpts, OutputFormat, ReviewArgs};
use crate::commands::{attach, connect};
use crate::output::print_value;

pub async fn run(common: &CommonOpts, args: ReviewArgs, format: OutputFormat) -> rd_core::Result<()> {
    let (client, _target, cwd) = connect(common).await?;

    let forces_appserver = args.prompt.is_some() && (args.uncommitted || args.base.is_some());
    let mode = if forces_appserver { ReviewMode::Appserver } else { ReviewMode::Exec };

    let review = ReviewDescriptor {
        uncommitted: args.uncommitted,
        base_ref: args.base,
        commit_id: args.commit,
        title: args.title,
        extra_options: Vec::new(),
        mode,
        delivery: if args.detach { ReviewDelivery::Detached } else { ReviewDelivery::Inline },
    };

    let mut request =
        CreateRunRequest::new(cwd.to_string_lossy().to_string(), args.prompt.unwrap_or_default(), RunKind::Review);
    request.review = Some(review);
    if forces_appserver {
        request.sandbox = Some("read-only".to_string());
    }

    let created = client.create_run(&request).await?;
    print_value(format, || format!("created review run {}", created.run_id), &created);

    if !args.detach {
        attach(&client, created.run_id, format).await?;
    }
    Ok(())
}
