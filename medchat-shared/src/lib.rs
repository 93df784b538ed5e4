use serde::{Deserialize, Serialize};

pub mod extract;

pub use extract::{diagnosis_context, format_diagnosis, normalize_risk, parse_diagnosis, parse_urgency};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurnRequest {
    pub conversation: Vec<ChatMessage>,
    /// Previous turn's diagnosis list, re-encoded as synthetic assistant context.
    #[serde(default)]
    pub last_diagnosis: Vec<ChatMessage>,
}

/// Result of one turn. Fields whose completion failed are null/empty and the
/// failure is listed in `errors`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatTurnResponse {
    pub text: Option<String>,
    pub urgency: Option<UrgencyResult>,
    #[serde(default)]
    pub diagnosis: Vec<DiagnosisEntry>,
    #[serde(default)]
    pub risks: Vec<RiskAssessment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrgencyResult {
    pub code: Option<String>,
    pub text: String,
}

impl UrgencyResult {
    pub fn level(&self) -> Option<UrgencyCode> {
        self.code.as_deref().and_then(UrgencyCode::from_tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrgencyCode {
    Emergency,
    UrgentCare,
    PrimaryCare,
    Monitor,
    Safe,
}

impl UrgencyCode {
    pub const ALL: [UrgencyCode; 5] = [
        UrgencyCode::Emergency,
        UrgencyCode::UrgentCare,
        UrgencyCode::PrimaryCare,
        UrgencyCode::Monitor,
        UrgencyCode::Safe,
    ];

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.as_tag() == tag)
    }

    pub fn as_tag(&self) -> &'static str {
        match self {
            UrgencyCode::Emergency => "EMERGENCY",
            UrgencyCode::UrgentCare => "URGENT_CARE",
            UrgencyCode::PrimaryCare => "PRIMARY_CARE",
            UrgencyCode::Monitor => "MONITOR",
            UrgencyCode::Safe => "SAFE",
        }
    }

    /// The exact sentence the urgency prompt permits for this code.
    pub fn instruction(&self) -> &'static str {
        match self {
            UrgencyCode::Emergency => "Go to Emergency Room (life-threatening).",
            UrgencyCode::UrgentCare => "Seek urgent care soon (serious but not life-threatening).",
            UrgencyCode::PrimaryCare => "Schedule an appointment (non-urgent concern).",
            UrgencyCode::Monitor => "Watch symptoms and seek care if they worsen.",
            UrgencyCode::Safe => "No medical attention needed.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisEntry {
    pub name: String,
    pub status: String,
}

impl DiagnosisEntry {
    pub fn classify(&self) -> Option<DiagnosisStatus> {
        DiagnosisStatus::from_tag(&self.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosisStatus {
    Confirmed,
    AlsoPossible,
    MoreInfo,
}

impl DiagnosisStatus {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "TRUE" => Some(DiagnosisStatus::Confirmed),
            "ALSO_POSSIBLE" => Some(DiagnosisStatus::AlsoPossible),
            "MORE_INFO" => Some(DiagnosisStatus::MoreInfo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub condition: String,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "[LOW]")]
    Low,
    #[serde(rename = "[MEDIUM]")]
    Medium,
    #[serde(rename = "[HIGH]")]
    High,
    #[serde(rename = "[MORE_INFO]")]
    MoreInfo,
}

impl RiskLevel {
    pub fn as_tag(&self) -> &'static str {
        match self {
            RiskLevel::Low => "[LOW]",
            RiskLevel::Medium => "[MEDIUM]",
            RiskLevel::High => "[HIGH]",
            RiskLevel::MoreInfo => "[MORE_INFO]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// `text`, `urgency`, `diagnosis` or `risk:<condition>`
    pub field: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    ModelUnavailable,
    MalformedResponse,
    ExtractionAmbiguous,
}
