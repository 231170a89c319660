//! Rendering for `--output-format human|json|jsonl` (spec §6, §7). Errors and
//! single values go through `print_value`/`print_error`; streaming commands
//! (`exec`, `review`, `run attach`) use `print_stream_value` per event.

use serde::Serialize;

use crate::cli::OutputFormat;

/// `--json` is a deprecated alias for `--output-format json`; streaming
/// commands coerce it to `jsonl` since each event is printed as its own line.
pub fn resolve(format: OutputFormat, json_flag: bool, streaming: bool) -> OutputFormat {
    if json_flag && format == OutputFormat::Human {
        return if streaming { OutputFormat::Jsonl } else { OutputFormat::Json };
    }
    format
}

pub fn print_value<T: Serialize>(format: OutputFormat, human: impl FnOnce() -> String, value: &T) {
    match format {
        OutputFormat::Human => println!("{}", human()),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value).expect("serializable value"));
        }
        OutputFormat::Jsonl => {
            println!("{}", serde_json::to_string(value).expect("serializable value"));
        }
    }
}

/// Streaming variant: every event is one compact line regardless of format,
/// since a pretty multi-line JSON blob per event would be unreadable to tail.
pub fn print_stream_value<T: Serialize>(format: OutputFormat, human: impl FnOnce() -> Option<String>, value: &T) {
    match format {
        OutputFormat::Human => {
            if let Some(line) = human() {
                println!("{line}");
            }
        }
        OutputFormat::Json | OutputFormat::Jsonl => {
            println!("{}", serde_json::to_string(value).expect("serializable value"));
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorPayload<'a> {
    error: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a serde_json::Value>,
}

/// Renders a terminal-facing error per `--output-format` (spec §7): a single
/// colorized line on stderr for humans, a structured object on stderr for
/// machines. Does not decide the exit code; callers map errors to codes
/// themselves via `exit_code_for`.
pub fn print_error(format: OutputFormat, kind: &str, message: &str, details: Option<&serde_json::Value>) {
    match format {
        OutputFormat::Human => {
            let use_color = std::io::IsTerminal::is_terminal(&std::io::stderr());
            if use_color {
                eprintln!("\x1b[31merror:\x1b[0m {message}");
            } else {
                eprintln!("error: {message}");
            }
        }
        OutputFormat::Json | OutputFormat::Jsonl => {
            let payload = ErrorPayload { error: kind, message, details };
            eprintln!("{}", serde_json::to_string(&payload).expect("serializable error"));
        }
    }
}

/// Exit code mapping (spec §6): 0 success, 1 runtime failure, 2 invalid usage.
pub fn exit_code_for(kind: &str) -> i32 {
    match kind {
        "invalid_request" => 2,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_is_a_noop_once_output_format_is_already_set_explicitly() {
        assert_eq!(resolve(OutputFormat::Json, true, false), OutputFormat::Json);
        assert_eq!(resolve(OutputFormat::Jsonl, true, true), OutputFormat::Jsonl);
    }

    #[test]
    fn json_flag_coerces_to_jsonl_for_streaming_commands_only() {
        assert_eq!(resolve(OutputFormat::Human, true, true), OutputFormat::Jsonl);
        assert_eq!(resolve(OutputFormat::Human, true, false), OutputFormat::Json);
    }

    #[test]
    fn no_json_flag_leaves_human_format_untouched() {
        assert_eq!(resolve(OutputFormat::Human, false, true), OutputFormat::Human);
    }

    #[test]
    fn invalid_request_maps_to_exit_code_two_everything_else_to_one() {
        assert_eq!(exit_code_for("invalid_request"), 2);
        assert_eq!(exit_code_for("not_found"), 1);
        assert_eq!(exit_code_for("exception"), 1);
    }
}
