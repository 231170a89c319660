//! Converts noisy, delta-oriented agent notifications into the stable,
//! line-oriented transcript persisted to `rollup.jsonl` (spec §4.4).

use chrono::{DateTime, Utc};
use rd_core::model::{RollupKind, RollupRecord};

/// Accumulates partial lines across calls. One instance per run; dropped
/// with the run's other in-memory state when the run manager forgets it.
#[derive(Debug, Default)]
pub struct RollupEngine {
    buffer: String,
    /// Set when the last character consumed was an unresolved `\r` — it
    /// might be the first half of a split `\r\n`, so the line it terminates
    /// is held rather than emitted until the next character disambiguates
    /// it (spec §4.4 rule 1).
    pending_cr: bool,
}

/// One line completed by [`RollupEngine::push_delta`], before control-marker
/// classification.
struct CompletedLine {
    text: String,
}

impl RollupEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one `item/commandExecution/outputDelta` chunk and returns the
    /// `outputLine` records it completes, in order. A delta whose trimmed
    /// text is exactly `thinking` or `final` (case-insensitive) is a
    /// control marker and bypasses normal line accumulation entirely (spec
    /// §4.4 rule 3).
    pub fn push_delta(&mut self, delta: &str, now: DateTime<Utc>) -> Vec<RollupRecord> {
        let trimmed = delta.trim();
        if trimmed.eq_ignore_ascii_case("thinking") || trimmed.eq_ignore_ascii_case("final") {
            return vec![control_record(trimmed, now)];
        }

        self.split_lines(delta)
            .into_iter()
            .map(|line| output_line_record(line.text, true, now))
            .collect()
    }

    fn split_lines(&mut self, delta: &str) -> Vec<CompletedLine> {
        let mut completed = Vec::new();
        for ch in delta.chars() {
            if self.pending_cr {
                self.pending_cr = false;
                if ch == '\n' {
                    completed.push(CompletedLine {
                        text: std::mem::take(&mut self.buffer),
                    });
                    continue;
                }
                completed.push(CompletedLine {
                    text: std::mem::take(&mut self.buffer),
                });
            }
            match ch {
                '\r' => self.pending_cr = true,
                '\n' => completed.push(CompletedLine {
                    text: std::mem::take(&mut self.buffer),
                }),
                c => self.buffer.push(c),
            }
        }
        completed
    }

    /// Flushes whatever is left at run termination (spec §4.4 rule 2). A
    /// trailing unresolved `\r` is itself a terminator — what's held is a
    /// complete line, not a partial — so only a genuinely unterminated
    /// buffer gets `ends_with_newline = false`.
    pub fn finish(&mut self, now: DateTime<Utc>) -> Option<RollupRecord> {
        if self.pending_cr {
            self.pending_cr = false;
            return Some(output_line_record(std::mem::take(&mut self.buffer), true, now));
        }
        if self.buffer.is_empty() {
            return None;
        }
        Some(output_line_record(std::mem::take(&mut self.buffer), false, now))
    }

    /// Produces the `agentMessage` record for a finalized `item/completed`
    /// item of type `agentMessage` (spec §4.4 rule 5).
    pub fn agent_message(&self, text: &str, now: DateTime<Utc>) -> RollupRecord {
        RollupRecord {
            kind: RollupKind::AgentMessage,
            created_at: now,
            source: None,
            text: Some(text.to_string()),
            ends_with_newline: None,
            is_control: None,
        }
    }
}

fn control_record(trimmed_token: &str, now: DateTime<Utc>) -> RollupRecord {
    RollupRecord {
        kind: RollupKind::OutputLine,
        created_at: now,
        source: None,
        text: Some(trimmed_token.to_ascii_lowercase()),
        ends_with_newline: Some(true),
        is_control: Some(true),
    }
}

fn output_line_record(text: String, ends_with_newline: bool, now: DateTime<Utc>) -> RollupRecord {
    RollupRecord {
        kind: RollupKind::OutputLine,
        created_at: now,
        source: None,
        text: Some(text),
        ends_with_newline: Some(ends_with_newline),
        is_control: Some(false),
    }
}
