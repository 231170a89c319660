//! Clap-derive CLI surface (spec §6). Grounded on the teacher's `ctl/main.rs`
//! `Cli`/`Command` shape: global flags via `#[command(flatten)]`/`global =
//! true`, doc comments doubling as `--help` text, nested subcommand enums
//! per resource.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "codex-d",
    author,
    version,
    about = "Local runner that mediates between the CLI and the codex agent.",
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub common: CommonOpts,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct CommonOpts {
    /// Base URL of a runner to talk to, bypassing discovery
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Bearer token, bypassing the environment and identity-file resolution
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Directory to resolve discovery and run creation against (default: current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub cd: Option<PathBuf>,

    /// Output format
    #[arg(long = "output-format", global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Deprecated alias for `--output-format json`; streaming commands coerce it to `jsonl`
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Jsonl,
}

/// Mirrors `rd_core::model::ReasoningEffort`, kept separate so this crate
/// never implements a foreign trait (`clap::ValueEnum`) for a foreign type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReasoningEffortArg {
    Low,
    Medium,
    High,
}

impl From<ReasoningEffortArg> for rd_core::model::ReasoningEffort {
    fn from(value: ReasoningEffortArg) -> Self {
        match value {
            ReasoningEffortArg::Low => rd_core::model::ReasoningEffort::Low,
            ReasoningEffortArg::Medium => rd_core::model::ReasoningEffort::Medium,
            ReasoningEffortArg::High => rd_core::model::ReasoningEffort::High,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the server in the foreground, blocking until shutdown
    Serve(ServeArgs),

    /// Manage a detached, per-user daemon
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Hidden entry point the daemon parent execs into the installed binary
    #[command(name = "__daemon-child", hide = true)]
    InternalDaemonChild(ServeArgs),

    /// Create a run and, unless `-d`, attach its event stream
    Exec(ExecArgs),

    /// Create a review run
    Review(ReviewArgs),

    /// Operate on an existing run
    Run {
        #[command(subcommand)]
        command: RunCommand,
    },

    /// List runs known to the runner
    Runs(RunsArgs),

    /// Report the resolved runner target and its health
    Status,

    /// Print the CLI's own version
    Version,
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Port to listen on (default: the dev/prod foreground default)
    #[arg(long)]
    pub port: Option<u16>,

    /// State directory override (default: `<cwd>/.codex-d`, or the daemon's per-user dir for the daemon child)
    #[arg(long, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Disable bearer-token authentication (local development only)
    #[arg(long)]
    pub no_auth: bool,
}

#[derive(Debug, Subcommand)]
pub enum DaemonCommand {
    /// Self-install if needed and start the detached daemon
    Start(DaemonStartArgs),
    /// Gracefully stop the detached daemon
    Stop(DaemonStopArgs),
    /// Report whether the detached daemon is running
    Status,
}

#[derive(Debug, Clone, Args)]
pub struct DaemonStartArgs {
    /// Reinstall and restart even if the installed version marker matches
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, Args)]
pub struct DaemonStopArgs {
    /// Kill by pid from the runtime descriptor if a graceful shutdown request fails
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ExecArgs {
    /// The prompt to send
    pub prompt: String,

    /// Create the run without attaching its event stream
    #[arg(short = 'd', long)]
    pub detach: bool,

    /// Model hint to pass through to the agent
    #[arg(long)]
    pub model: Option<String>,

    /// Reasoning effort to request
    #[arg(long, value_enum)]
    pub reasoning: Option<ReasoningEffortArg>,

    /// Sandbox policy (e.g. `read-only`)
    #[arg(long)]
    pub sandbox: Option<String>,

    /// Approval policy to request from the agent
    #[arg(long = "approval-policy")]
    pub approval_policy: Option<String>,
}

#[derive(Debug, Clone, Args)]
#[command(group(clap::ArgGroup::new("review_target").args(["uncommitted", "commit", "base"])))]
pub struct ReviewArgs {
    /// Review the uncommitted working tree
    #[arg(long)]
    pub uncommitted: bool,

    /// Review a specific commit
    #[arg(long, value_name = "SHA")]
    pub commit: Option<String>,

    /// Review the diff against a base ref
    #[arg(long, value_name = "REF")]
    pub base: Option<String>,

    /// Additional instructions for the reviewer. Combined with `--uncommitted`
    /// or `--base`, this forces app-server mode with the sandbox set to
    /// `read-only` (spec §6).
    #[arg(long)]
    pub prompt: Option<String>,

    /// Title for the review run
    #[arg(long)]
    pub title: Option<String>,

    /// Create the run without attaching its event stream
    #[arg(short = 'd', long)]
    pub detach: bool,
}

#[derive(Debug, Subcommand)]
pub enum RunCommand {
    /// Attach to a run's event stream
    Attach(RunSelector),
    /// Request cooperative cancellation, targeting `interrupted`
    Interrupt(RunSelector),
    /// Request cooperative cancellation, targeting `paused`
    Stop(RunSelector),
    /// Start a new turn against an existing run
    Resume(ResumeArgs),
    /// Inject text into the currently running turn
    Steer(SteerArgs),
    /// Print completed agent messages
    Messages(RunSelector),
    /// Print thinking-block headings
    Thinking(ThinkingArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunSelector {
    /// Run id (omit with `--last` to target the most recent run in `--cd`)
    pub id: Option<String>,

    /// Target the most recently created run instead of naming an id
    #[arg(long)]
    pub last: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ResumeArgs {
    #[command(flatten)]
    pub selector: RunSelector,

    /// New prompt for the resumed turn
    pub prompt: Option<String>,

    /// Reasoning effort to request for the resumed turn
    #[arg(long, value_enum)]
    pub reasoning: Option<ReasoningEffortArg>,
}

#[derive(Debug, Clone, Args)]
pub struct SteerArgs {
    #[command(flatten)]
    pub selector: RunSelector,

    /// Text to inject into the active turn
    pub text: String,
}

#[derive(Debug, Clone, Args)]
pub struct ThinkingArgs {
    #[command(flatten)]
    pub selector: RunSelector,

    /// Include timestamps with each heading
    #[arg(long)]
    pub timestamps: bool,
}

#[derive(Debug, Clone, Args)]
pub struct RunsArgs {
    /// Show runs for every cwd, not just `--cd`'s
    #[arg(long)]
    pub all: bool,
}
