//! `run attach|interrupt|stop|resume|steer|messages|thinking` (spec §6).

use std::path::Path;

use rd_client::dto::ResumeRequest;
use rd_client::RunnerClient;

use crate::cli::{CommonOpts, OutputFormat, ResumeArgs, RunCommand, RunSelector, SteerArgs, ThinkingArgs};
use crate::commands::{attach, connect, resolve_run_id};
use crate::output::print_value;

pub async fn run(common: &CommonOpts, command: RunCommand, format: OutputFormat) -> rd_core::Result<()> {
    let (client, _target, cwd) = connect(common).await?;

    match command {
        RunCommand::Attach(selector) => {
            let id = resolve_run_id(&client, &selector, &cwd).await?;
            attach(&client, id, format).await
        }
        RunCommand::Interrupt(selector) => {
            let id = resolve_run_id(&client, &selector, &cwd).await?;
            client.interrupt(id).await?;
            print_value(format, || format!("interrupted {id}"), &serde_json::json!({ "runId": id.to_string() }));
            Ok(())
        }
        RunCommand::Stop(selector) => {
            let id = resolve_run_id(&client, &selector, &cwd).await?;
            client.stop(id).await?;
            print_value(format, || format!("stopped {id}"), &serde_json::json!({ "runId": id.to_string() }));
            Ok(())
        }
        RunCommand::Resume(args) => resume(&client, &cwd, format, args).await,
        RunCommand::Steer(args) => steer(&client, &cwd, format, args).await,
        RunCommand::Messages(selector) => messages(&client, &cwd, format, selector).await,
        RunCommand::Thinking(args) => thinking(&client, &cwd, format, args).await,
    }
}

async fn resume(client: &RunnerClient, cwd: &Path, format: OutputFormat, args: ResumeArgs) -> rd_core::Result<()> {
    let id = resolve_run_id(client, &args.selector, cwd).await?;
    let request = ResumeRequest { prompt: args.prompt, effort: args.reasoning.map(Into::into) };
    let record = client.resume(id, &request).await?;
    print_value(format, || format!("resumed {id} ({:?})", record.status), &record);
    attach(client, id, format).await
}

async fn steer(client: &RunnerClient, cwd: &Path, format: OutputFormat, args: SteerArgs) -> rd_core::Result<()> {
    let id = resolve_run_id(client, &args.selector, cwd).await?;
    client.steer(id, args.text).await?;
    print_value(format, || format!("steered {id}"), &serde_json::json!({ "runId": id.to_string() }));
    Ok(())
}

async fn messages(client: &RunnerClient, cwd: &Path, format: OutputFormat, selector: RunSelector) -> rd_core::Result<()> {
    let id = resolve_run_id(client, &selector, cwd).await?;
    let messages = client.messages(id, None, None).await?;
    print_value(
        format,
        || messages.iter().map(|m| m.text.clone()).collect::<Vec<_>>().join("\n"),
        &messages,
    );
    Ok(())
}

async fn thinking(client: &RunnerClient, cwd: &Path, format: OutputFormat, args: ThinkingArgs) -> rd_core::Result<()> {
    let id = resolve_run_id(client, &args.selector, cwd).await?;
    let summaries = client.thinking_summaries(id, args.timestamps, None).await?;
    print_value(
        format,
        || {
            summaries
                .iter()
                .map(|s| match s.created_at {
                    Some(ts) if args.timestamps => format!("[{ts}] {}", s.text),
                    _ => s.text.clone(),
                })
                .collect::<Vec<_>>()
                .join("\n")
        },
        &summaries,
    );
    Ok(())
}
