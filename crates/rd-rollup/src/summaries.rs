//! Mines one-line `**Heading**` summaries out of a rollup transcript (spec
//! §4.4 rule 4), for `GET /v1/runs/{id}/thinking-summaries`.
//!
//! Phase boundaries are reconstructed from the persisted `thinking`/`final`
//! control lines. A heading-shaped line outside any explicit phase is
//! mined too — in practice such lines only ever appear inside agent output
//! that itself discusses "thinking", which is the spec's secondary trigger
//! condition, and persisted control markers are the only phase signal left
//! once raw deltas are gone — so this reduces to: every heading-shaped line
//! is a candidate, consecutive duplicates collapse to one (documented in
//! `DESIGN.md`).

use rd_core::model::{RollupKind, RollupRecord};

use crate::mojibake;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThinkingSummary {
    pub text: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// `true` if the trimmed line is bold-delimited (`**...**`), long enough to
/// carry real content, and symmetrically closed.
fn is_heading(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() > 4
        && trimmed.starts_with("**")
        && trimmed.ends_with("**")
        && !trimmed[2..trimmed.len() - 2].contains("**")
}

pub fn mine(records: &[RollupRecord]) -> Vec<ThinkingSummary> {
    let mut out: Vec<ThinkingSummary> = Vec::new();
    for record in records {
        if record.kind != RollupKind::OutputLine || record.is_control == Some(true) {
            continue;
        }
        let Some(text) = &record.text else { continue };
        if !is_heading(text) {
            continue;
        }
        let repaired = mojibake::repair(text);
        if out.last().map(|s| s.text.as_str()) == Some(repaired.as_str()) {
            continue;
        }
        out.push(ThinkingSummary {
            text: repaired,
            created_at: record.created_at,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn line(text: &str) -> RollupRecord {
        RollupRecord {
            kind: RollupKind::OutputLine,
            created_at: Utc::now(),
            source: None,
            text: Some(text.to_string()),
            ends_with_newline: Some(true),
            is_control: Some(false),
        }
    }

    #[test]
    fn mines_heading_shaped_lines_only() {
        let records = vec![line("plain text"), line("**Plan**"), line("more text")];
        let summaries = mine(&records);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].text, "**Plan**");
    }

    #[test]
    fn consecutive_identical_summaries_collapse_to_one() {
        let records = vec![line("**Plan**"), line("**Plan**"), line("**Next**")];
        let summaries = mine(&records);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].text, "**Plan**");
        assert_eq!(summaries[1].text, "**Next**");
    }

    #[test]
    fn non_consecutive_duplicates_are_both_kept() {
        let records = vec![line("**Plan**"), line("**Next**"), line("**Plan**")];
        let summaries = mine(&records);
        assert_eq!(summaries.len(), 3);
    }

    #[test]
    fn control_lines_are_never_mined_as_headings() {
        let mut control = line("thinking");
        control.is_control = Some(true);
        let summaries = mine(&[control]);
        assert!(summaries.is_empty());
    }

    #[test]
    fn short_bold_markers_are_not_headings() {
        assert!(!is_heading("****"));
        assert!(is_heading("**ok**"));
    }
}
