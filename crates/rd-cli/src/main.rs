//! Entry point. `fn main()` stays synchronous so `daemon start` can fork
//! before any tokio runtime exists; each subcommand that needs one builds
//! its own, mirroring the teacher's `fn main()` -> sync `try_main()` ->
//! per-subcommand `#[tokio::main] async fn` split.

mod cli;
mod commands;
mod daemon;
mod logging;
mod output;
mod serve;

use std::future::Future;

use clap::Parser;
use rd_core::config::RunnerConfig;

use cli::{Cli, Command, DaemonCommand, OutputFormat, RunCommand, ServeArgs};

fn main() {
    let cli = Cli::parse();
    let format = output::resolve(cli.common.output_format, cli.common.json, is_streaming(&cli.command));
    logging::init(format);

    let exit_code = try_main(cli, format);
    std::process::exit(exit_code);
}

fn is_streaming(command: &Command) -> bool {
    match command {
        Command::Exec(args) => !args.detach,
        Command::Review(args) => !args.detach,
        Command::Run { command: RunCommand::Attach(_) | RunCommand::Resume(_) } => true,
        _ => false,
    }
}

fn try_main(cli: Cli, format: OutputFormat) -> i32 {
    let common = cli.common;

    let result: rd_core::Result<()> = match cli.command {
        Command::Serve(args) => block_on(run_serve(args, false)),
        Command::InternalDaemonChild(args) => block_on(run_serve(args, true)),
        Command::Daemon { command } => run_daemon_command(command),
        Command::Exec(args) => block_on(async { commands::exec::run(&common, args, format).await }),
        Command::Review(args) => block_on(async { commands::review::run(&common, args, format).await }),
        Command::Run { command } => block_on(async { commands::run::run(&common, command, format).await }),
        Command::Runs(args) => block_on(async { commands::runs::run(&common, args, format).await }),
        Command::Status => block_on(async { commands::status::run(&common, format).await }),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    match result {
        Ok(()) => 0,
        Err(err) => {
            output::print_error(format, err.kind(), &err.to_string(), err.to_api_error().details.as_ref());
            output::exit_code_for(err.kind())
        }
    }
}

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
        .block_on(future)
}

async fn run_serve(args: ServeArgs, is_daemon_child: bool) -> rd_core::Result<()> {
    let config = RunnerConfig::default();
    let cwd = std::env::current_dir().map_err(rd_core::Error::from)?;

    let state_dir = match args.state_dir {
        Some(dir) => dir,
        None if is_daemon_child => config.daemon_state_dir().map_err(rd_core::Error::from)?,
        None => config.foreground_state_dir(&cwd),
    };
    let port = args.port.unwrap_or_else(|| if is_daemon_child { config.daemon_port() } else { config.foreground_port() });

    serve::run(state_dir, port, !args.no_auth, config.dev_mode, config.persist_raw_events, is_daemon_child).await
}

fn run_daemon_command(command: DaemonCommand) -> rd_core::Result<()> {
    match command {
        DaemonCommand::Start(args) => daemon::start(args.force),
        DaemonCommand::Stop(args) => daemon::stop(args.force),
        DaemonCommand::Status => {
            let running = daemon::status()?;
            println!("{}", if running { "running" } else { "stopped" });
            Ok(())
        }
    }
}
