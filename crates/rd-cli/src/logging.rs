//! Tracing initialization, grounded on the teacher's `init_logging`: an
//! `EnvFilter` layer plus a format layer chosen by output mode. Unlike the
//! teacher we don't dual-init a legacy `log`/`env_logger` bridge — nothing
//! in this workspace depends on the `log` facade.

use std::io::IsTerminal;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::cli::OutputFormat;

pub fn init(format: OutputFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        OutputFormat::Human => {
            let ansi = std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();
            let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_ansi(ansi);
            tracing_subscriber::registry().with(filter).with(fmt_layer).init();
        }
        OutputFormat::Json | OutputFormat::Jsonl => {
            let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr).json();
            tracing_subscriber::registry().with(filter).with(fmt_layer).init();
        }
    }
}
