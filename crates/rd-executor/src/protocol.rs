//! The JSON-line wire protocol spoken over the agent process's stdio.
//!
//! The agent is treated as a black box: it reads one `AgentCommand` JSON
//! object per line on stdin and writes one `AgentLine` JSON object per line
//! on stdout. Every command and line that concerns a specific run carries
//! that run's id so a single process can multiplex many concurrent turns.
//!
//! `AgentLine::parse_all` tolerates multiple JSON objects flushed onto one
//! line, the same defensive shape as the teacher's `PiMessage::parse_all`
//! (`serde_json::Deserializer::into_iter` recovers each concatenated
//! object instead of failing the whole line on "trailing characters").

use rd_core::RunId;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AgentCommand {
    StartTurn {
        run_id: RunId,
        #[serde(skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
        prompt: String,
        cwd: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        effort: Option<rd_core::model::ReasoningEffort>,
        sandbox: String,
        approval_policy: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        review: Option<rd_core::model::ReviewDescriptor>,
    },
    Steer {
        run_id: RunId,
        text: String,
    },
    Interrupt {
        run_id: RunId,
    },
}

/// One line read from the agent's stdout.
#[derive(Debug, Clone)]
pub enum AgentLine {
    /// Sent once after spawn to confirm the process is ready to accept
    /// `StartTurn` commands.
    Ready,
    /// A `codex.notification`-shaped event scoped to one run. `kind` is the
    /// dotted notification kind (e.g. `item/commandExecution/outputDelta`,
    /// `item/completed`); `payload` is its body, forwarded verbatim.
    Notification {
        run_id: RunId,
        kind: String,
        payload: Value,
    },
}

impl AgentLine {
    fn parse_one(value: Value) -> Result<Self, String> {
        let msg_type = value
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing \"type\" field".to_string())?;

        if msg_type == "ready" {
            return Ok(AgentLine::Ready);
        }

        let run_id = value
            .get("runId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "notification missing \"runId\"".to_string())?
            .parse::<RunId>()
            .map_err(|e| format!("invalid runId: {e}"))?;
        let payload = value.get("payload").cloned().unwrap_or(Value::Null);

        Ok(AgentLine::Notification {
            run_id,
            kind: msg_type.to_string(),
            payload,
        })
    }

    /// Parses a line that may contain one or more concatenated JSON
    /// objects. The fast path is a single `serde_json::from_str`; the slow
    /// path only triggers on "trailing characters", matching the teacher's
    /// `PiMessage::parse_all`.
    pub fn parse_all(line: &str) -> Vec<Result<Self, String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => return vec![Self::parse_one(value)],
            Err(e) if !e.to_string().contains("trailing characters") => {
                return vec![Err(e.to_string())];
            }
            Err(_) => {}
        }

        let stream = serde_json::Deserializer::from_str(trimmed).into_iter::<Value>();
        let mut results = Vec::new();
        for value_result in stream {
            match value_result {
                Ok(value) => results.push(Self::parse_one(value)),
                Err(e) => {
                    results.push(Err(format!("json stream: {e}")));
                    break;
                }
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_all_handles_single_ready_line() {
        let results = AgentLine::parse_all(r#"{"type":"ready"}"#);
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Ok(AgentLine::Ready)));
    }

    #[test]
    fn parse_all_handles_single_notification() {
        let run_id = RunId::new();
        let line = format!(
            r#"{{"type":"item/completed","runId":"{run_id}","payload":{{"item":{{"type":"agentMessage","text":"hi"}}}}}}"#
        );
        let results = AgentLine::parse_all(&line);
        assert_eq!(results.len(), 1);
        match &results[0] {
            Ok(AgentLine::Notification { run_id: parsed, kind, payload }) => {
                assert_eq!(*parsed, run_id);
                assert_eq!(kind, "item/completed");
                assert_eq!(payload["item"]["text"], "hi");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parse_all_recovers_concatenated_objects_on_one_line() {
        let run_id = RunId::new();
        let one = format!(r#"{{"type":"item/agentMessage/delta","runId":"{run_id}","payload":{{"delta":"a"}}}}"#);
        let two = format!(r#"{{"type":"item/agentMessage/delta","runId":"{run_id}","payload":{{"delta":"b"}}}}"#);
        let concatenated = format!("{one}{two}");
        let results = AgentLine::parse_all(&concatenated);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn parse_all_of_empty_line_is_empty() {
        assert!(AgentLine::parse_all("").is_empty());
        assert!(AgentLine::parse_all("   ").is_empty());
    }

    #[test]
    fn parse_all_reports_genuine_parse_errors_without_panicking() {
        let results = AgentLine::parse_all("not json at all");
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn start_turn_serializes_with_tagged_type_and_camel_case() {
        let cmd = AgentCommand::StartTurn {
            run_id: RunId::new(),
            thread_id: None,
            prompt: "hello".into(),
            cwd: "/tmp".into(),
            model: None,
            effort: None,
            sandbox: "workspace-write".into(),
            approval_policy: "never".into(),
            review: None,
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "startTurn");
        assert_eq!(json["approvalPolicy"], "never");
        assert!(json.get("threadId").is_none());
    }
}
