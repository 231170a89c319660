//! `exec [-d] <prompt>` (spec §6): create an exec run, attach unless `-d`.

use rd_client::dto::CreateRunRequest;
use rd_core::model::RunKind;

use crate::cli::{CommonOpts, ExecArgs, OutputFormat};
use crate::commands::{attach, connect};
use crate::output::print_value;

pub async fn run(common: &CommonOpts, args: ExecArgs, format: OutputFormat) -> rd_core::Result<()> {
    let (client, _target, cwd) = connect(common).await?;

    let mut request = CreateRunRequest::new(cwd.to_string_lossy().to_string(), args.prompt, RunKind::Exec);
    request.model = args.model;
    request.effort = args.reasoning.map(Into::into);
    request.sandbox = args.sandbox;
    request.approval_policy = args.approval_policy;

    let created = client.create_run(&request).await?;
    print_value(format, || format!("created run {}", created.run_id), &created);

    if !args.detach {
        attach(&client, created.run_id, format).await?;
    }
    Ok(())
}
