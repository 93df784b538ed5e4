use medchat_shared::{
    diagnosis_context, ChatMessage, ChatTurnRequest, ChatTurnResponse, DiagnosisEntry, ErrorKind,
    FieldError, RiskAssessment, UrgencyResult,
};

/// Latest assessment shown beside the chat. Replaced wholesale every turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sidebar {
    pub urgency: Option<UrgencyResult>,
    pub diagnosis: Vec<DiagnosisEntry>,
    pub risks: Vec<RiskAssessment>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    pub messages: Vec<ChatMessage>,
    pub sidebar: Sidebar,
    pub pending: bool,
    /// Shown when a whole turn failed.
    pub error: Option<String>,
    /// Shown when a turn came back with some fields missing.
    pub notice: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ChatEvent {
    Submitted(String),
    TurnCompleted(ChatTurnResponse),
    TurnFailed(String),
    DismissError,
}

impl ChatState {
    /// What to send for the turn just submitted: the whole log plus the
    /// current diagnosis as synthetic assistant context.
    pub fn next_request(&self) -> ChatTurnRequest {
        ChatTurnRequest {
            conversation: self.messages.clone(),
            last_diagnosis: diagnosis_context(&self.sidebar.diagnosis),
        }
    }
}

pub fn reduce(mut state: ChatState, event: ChatEvent) -> ChatState {
    match event {
        ChatEvent::Submitted(input) => {
            let content = input.trim();
            if content.is_empty() || state.pending {
                return state;
            }
            state.messages.push(ChatMessage::user(content));
            state.pending = true;
            state.error = None;
            state.notice = None;
        }
        ChatEvent::TurnCompleted(response) => {
            if let Some(text) = response.text {
                state.messages.push(ChatMessage::assistant(text));
            }
            state.notice = partial_notice(&response.errors);
            state.sidebar = Sidebar {
                urgency: response.urgency,
                diagnosis: response.diagnosis,
                risks: response.risks,
            };
            state.pending = false;
        }
        ChatEvent::TurnFailed(message) => {
            state.pending = false;
            state.error = Some(message);
        }
        ChatEvent::DismissError => {
            state.error = None;
        }
    }
    state
}

/// Missing fields and fields the model answered without the expected tag are
/// reported separately.
fn partial_notice(errors: &[FieldError]) -> Option<String> {
    let (unclear, unavailable): (Vec<&FieldError>, Vec<&FieldError>) = errors
        .iter()
        .partition(|e| e.kind == ErrorKind::ExtractionAmbiguous);
    let join = |errors: Vec<&FieldError>| {
        errors.iter().map(|e| e.field.as_str()).collect::<Vec<_>>().join(", ")
    };

    let mut parts = Vec::new();
    if !unavailable.is_empty() {
        parts.push(format!("unavailable: {}", join(unavailable)));
    }
    if !unclear.is_empty() {
        parts.push(format!("unclear: {}", join(unclear)));
    }
    if parts.is_empty() {
        None
    } else {
        Some(format!("Partial result, {}", parts.join("; ")))
    }
}
