//! Parsers that pull the loosely structured fields out of free-text model replies.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::{ChatMessage, DiagnosisEntry, RiskLevel, UrgencyResult};

static URGENCY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(\w+)\]\s*(.*)$").expect("urgency pattern compiles"));

static DIAGNOSIS_LINE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.\s*(.+?)\s*-\s*\[(.+?)\]$").expect("diagnosis pattern compiles")
});

/// Extracts the leading `[CODE]` tag. `text` is always the full reply; `code`
/// is `None` when the reply does not start with a tag.
pub fn parse_urgency(reply: &str) -> UrgencyResult {
    let code = URGENCY_PATTERN
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    UrgencyResult { code, text: reply.to_string() }
}

/// Parses `<index>. <name> - [<status>]` lines. Other lines are dropped.
pub fn parse_diagnosis(reply: &str) -> Vec<DiagnosisEntry> {
    reply
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            match DIAGNOSIS_LINE_PATTERN.captures(line) {
                Some(caps) => Some(DiagnosisEntry {
                    name: caps[2].to_string(),
                    status: caps[3].to_string(),
                }),
                None => {
                    if !line.is_empty() {
                        debug!("Dropping unparsed diagnosis line: {}", line);
                    }
                    None
                }
            }
        })
        .collect()
}

/// Anything other than an exact `[LOW]`, `[MEDIUM]` or `[HIGH]` means the model
/// did not commit to a level, so it is treated as needing more information.
pub fn normalize_risk(reply: &str) -> RiskLevel {
    match reply {
        "[LOW]" => RiskLevel::Low,
        "[MEDIUM]" => RiskLevel::Medium,
        "[HIGH]" => RiskLevel::High,
        other => {
            if other != "[MORE_INFO]" {
                debug!("Coercing risk reply {:?} to [MORE_INFO]", other);
            }
            RiskLevel::MoreInfo
        }
    }
}

pub fn format_diagnosis(entries: &[DiagnosisEntry]) -> String {
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| format!("{}. {} - [{}]", i + 1, entry.name, entry.status))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The previous diagnosis list as a synthetic assistant message, or nothing
/// when there was no diagnosis yet.
pub fn diagnosis_context(entries: &[DiagnosisEntry]) -> Vec<ChatMessage> {
    if entries.is_empty() {
        return Vec::new();
    }
    vec![ChatMessage::assistant(format_diagnosis(entries))]
}
