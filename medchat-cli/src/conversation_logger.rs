use anyhow::Result;
use chrono::{DateTime, Local};
use medchat_shared::{ChatMessage, ChatTurnResponse, DiagnosisEntry, MessageRole, RiskAssessment, UrgencyResult};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Serialize)]
pub struct ConversationEntry {
    pub timestamp: DateTime<Local>,
    pub entry_type: EntryType,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum EntryType {
    UserMessage {
        content: String,
    },
    AssistantMessage {
        content: String,
    },
    Assessment {
        urgency: Option<UrgencyResult>,
        diagnosis: Vec<DiagnosisEntry>,
        risks: Vec<RiskAssessment>,
    },
    Error {
        message: String,
    },
}

/// Appends one JSON line per event to a per-session transcript file.
pub struct ConversationLogger {
    log_file: Option<PathBuf>,
}

impl ConversationLogger {
    pub fn new(log_dir: impl AsRef<Path>) -> Result<Self> {
        let log_dir = log_dir.as_ref();
        if !log_dir.exists() {
            fs::create_dir_all(log_dir)?;
        }

        let session_start = Local::now();
        let filename = format!("conversation_{}.jsonl", session_start.format("%Y%m%d_%H%M%S_%3f"));
        let log_file = log_dir.join(filename);

        debug!("Starting conversation logger: {:?}", log_file);

        Ok(Self { log_file: Some(log_file) })
    }

    /// A logger that records nothing, for when the log directory is unusable.
    pub fn disabled() -> Self {
        Self { log_file: None }
    }

    pub fn log_entry(&self, entry_type: EntryType) -> Result<()> {
        if let Some(ref log_file) = self.log_file {
            let entry = ConversationEntry {
                timestamp: Local::now(),
                entry_type,
            };

            let json = serde_json::to_string(&entry)?;

            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)?;

            writeln!(file, "{}", json)?;
            file.flush()?;
        }
        Ok(())
    }

    pub fn log_message(&self, message: &ChatMessage) -> Result<()> {
        let entry_type = match message.role {
            MessageRole::User => EntryType::UserMessage {
                content: message.content.clone(),
            },
            MessageRole::Assistant => EntryType::AssistantMessage {
                content: message.content.clone(),
            },
            // The server owns system prompts; the client log never sees them.
            MessageRole::System => return Ok(()),
        };
        self.log_entry(entry_type)
    }

    pub fn log_assessment(&self, response: &ChatTurnResponse) -> Result<()> {
        self.log_entry(EntryType::Assessment {
            urgency: response.urgency.clone(),
            diagnosis: response.diagnosis.clone(),
            risks: response.risks.clone(),
        })
    }

    pub fn log_error(&self, message: &str) -> Result<()> {
        self.log_entry(EntryType::Error {
            message: message.to_string(),
        })
    }

    pub fn current_log_path(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }
}
