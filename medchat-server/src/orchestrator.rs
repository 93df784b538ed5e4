use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use medchat_shared::{
    normalize_risk, parse_diagnosis, parse_urgency, ChatMessage, ChatTurnRequest, ChatTurnResponse,
    DiagnosisEntry, ErrorKind, FieldError, RiskAssessment, RiskLevel, UrgencyResult,
};
use tracing::{debug, error, info, warn};

use crate::error::{ModelError, TurnError};
use crate::llm::{GenerationParams, ModelClient};
use crate::prompts;

#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub conditions: Vec<String>,
    pub call_timeout: Duration,
    pub generation: GenerationParams,
}

/// Fans one turn out into independent completions and assembles the result.
pub struct Orchestrator {
    client: Arc<dyn ModelClient>,
    settings: TurnSettings,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn ModelClient>, settings: TurnSettings) -> Self {
        Self { client, settings }
    }

    pub fn conditions(&self) -> &[String] {
        &self.settings.conditions
    }

    pub async fn run_turn(&self, request: &ChatTurnRequest) -> Result<ChatTurnResponse, TurnError> {
        let conversation = request.conversation.as_slice();
        if conversation.is_empty() {
            return Err(TurnError::EmptyConversation);
        }

        info!(
            "Running turn: {} messages, {} prior diagnosis messages, {} risk conditions",
            conversation.len(),
            request.last_diagnosis.len(),
            self.settings.conditions.len()
        );
        let started = Instant::now();

        let (text, risks, urgency, diagnosis) = tokio::join!(
            self.call("text", prompts::chat_messages(conversation)),
            self.assess_risks(conversation),
            self.call("urgency", prompts::urgency_messages(conversation)),
            self.call(
                "diagnosis",
                prompts::diagnosis_messages(conversation, &request.last_diagnosis)
            ),
        );

        let total_calls = 3 + risks.len();
        let mut errors = Vec::new();

        let text = match text {
            Ok(reply) => Some(reply),
            Err(e) => {
                errors.push(e.into_field_error("text"));
                None
            }
        };

        let risks = risks
            .into_iter()
            .map(|(condition, outcome)| {
                let risk_level = match outcome {
                    Ok(reply) => normalize_risk(&reply),
                    Err(e) => {
                        errors.push(e.into_field_error(format!("risk:{}", condition)));
                        RiskLevel::MoreInfo
                    }
                };
                RiskAssessment { condition, risk_level }
            })
            .collect::<Vec<_>>();

        let urgency = match urgency {
            Ok(reply) => Some(extract_urgency(&reply, &mut errors)),
            Err(e) => {
                errors.push(e.into_field_error("urgency"));
                None
            }
        };

        let diagnosis = match diagnosis {
            Ok(reply) => extract_diagnosis(&reply, &mut errors),
            Err(e) => {
                errors.push(e.into_field_error("diagnosis"));
                Vec::new()
            }
        };

        let failed_calls = errors
            .iter()
            .filter(|e| e.kind != ErrorKind::ExtractionAmbiguous)
            .count();
        info!(
            "Turn finished in {:?}: {}/{} model calls failed",
            started.elapsed(),
            failed_calls,
            total_calls
        );
        if failed_calls == total_calls {
            return Err(TurnError::AllCallsFailed(errors));
        }

        Ok(ChatTurnResponse { text, urgency, diagnosis, risks, errors })
    }

    async fn assess_risks(
        &self,
        conversation: &[ChatMessage],
    ) -> Vec<(String, Result<String, ModelError>)> {
        let calls = self.settings.conditions.iter().map(|condition| async move {
            let outcome = self
                .call("risk", prompts::risk_messages(condition, conversation))
                .await;
            (condition.clone(), outcome)
        });
        join_all(calls).await
    }

    async fn call(&self, label: &str, messages: Vec<ChatMessage>) -> Result<String, ModelError> {
        let started = Instant::now();
        let timeout = self.settings.call_timeout;
        let outcome = match tokio::time::timeout(
            timeout,
            self.client.complete(&messages, &self.settings.generation),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout(timeout)),
        };

        match &outcome {
            Ok(reply) => debug!("{} call returned {} chars in {:?}", label, reply.len(), started.elapsed()),
            Err(e) => error!("{} call failed after {:?}: {}", label, started.elapsed(), e),
        }
        outcome
    }
}

fn extract_urgency(reply: &str, errors: &mut Vec<FieldError>) -> UrgencyResult {
    let urgency = parse_urgency(reply);
    if urgency.code.is_none() {
        warn!("Urgency reply has no leading tag: {:?}", reply);
        errors.push(FieldError {
            field: "urgency".to_string(),
            kind: ErrorKind::ExtractionAmbiguous,
            message: "reply does not start with a bracketed urgency code".to_string(),
        });
    }
    urgency
}

fn extract_diagnosis(reply: &str, errors: &mut Vec<FieldError>) -> Vec<DiagnosisEntry> {
    let diagnosis = parse_diagnosis(reply);
    if diagnosis.is_empty() && !reply.trim().is_empty() {
        warn!("Diagnosis reply has no parseable lines: {:?}", reply);
        errors.push(FieldError {
            field: "diagnosis".to_string(),
            kind: ErrorKind::ExtractionAmbiguous,
            message: "no line matched '<index>. <name> - [<status>]'".to_string(),
        });
    }
    diagnosis
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use medchat_shared::MessageRole;
    use std::sync::Mutex;

    /// Answers each prompt by inspecting its system instruction.
    pub(crate) struct CannedModel {
        pub chat: Result<String, ()>,
        pub urgency: Result<String, ()>,
        pub diagnosis: Result<String, ()>,
        pub risk: Box<dyn Fn(&str) -> Result<String, ()> + Send + Sync>,
        pub seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl CannedModel {
        pub(crate) fn healthy() -> Self {
            Self {
                chat: Ok("How long have you had the fever?".to_string()),
                urgency: Ok("[EMERGENCY] Go to Emergency Room (life-threatening).".to_string()),
                diagnosis: Ok("1. Influenza - [TRUE]\n2. Sepsis - [ALSO_POSSIBLE]".to_string()),
                risk: Box::new(|_: &str| Ok("[LOW]".to_string())),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                chat: Err(()),
                urgency: Err(()),
                diagnosis: Err(()),
                risk: Box::new(|_: &str| Err(())),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModelClient for CannedModel {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _params: &GenerationParams,
        ) -> Result<String, ModelError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            let system = &messages[0].content;
            let outcome = if system.contains("urgent or not") {
                self.urgency.clone()
            } else if system.contains("suggest potential conditions") {
                self.diagnosis.clone()
            } else if let Some(rest) = system.split("assess the risk of ").nth(1) {
                let condition = rest.split(" or being").next().unwrap_or_default();
                (self.risk)(condition)
            } else {
                self.chat.clone()
            };
            outcome.map_err(|_| ModelError::Unavailable("connection refused".to_string()))
        }
    }

    struct SlowModel;

    #[async_trait]
    impl ModelClient for SlowModel {
        async fn complete(&self, messages: &[ChatMessage], _: &GenerationParams) -> Result<String, ModelError> {
            let system = &messages[0].content;
            if system.contains("urgent or not") {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if system.contains("suggest potential conditions") {
                return Ok("1. Influenza - [TRUE]".to_string());
            }
            Ok("[MEDIUM]".to_string())
        }
    }

    fn settings() -> TurnSettings {
        TurnSettings {
            conditions: vec!["Hypertension".into(), "Diabetes".into(), "Depression".into()],
            call_timeout: Duration::from_secs(5),
            generation: GenerationParams::default(),
        }
    }

    fn fever_request() -> ChatTurnRequest {
        ChatTurnRequest {
            conversation: vec![ChatMessage::user("I have a 104F fever for 5 days")],
            last_diagnosis: vec![],
        }
    }

    #[tokio::test]
    async fn assembles_all_fields_from_canned_replies() {
        let orchestrator = Orchestrator::new(Arc::new(CannedModel::healthy()), settings());
        let response = orchestrator.run_turn(&fever_request()).await.unwrap();

        assert_eq!(response.text.as_deref(), Some("How long have you had the fever?"));
        let urgency = response.urgency.unwrap();
        assert!(matches!(urgency.code.as_deref(), Some("EMERGENCY") | Some("URGENT_CARE")));
        assert_eq!(urgency.text, "[EMERGENCY] Go to Emergency Room (life-threatening).");
        assert_eq!(response.diagnosis.len(), 2);
        assert_eq!(response.diagnosis[1].name, "Sepsis");
        assert_eq!(response.risks.len(), 3);
        assert!(response.risks.iter().all(|r| r.risk_level == RiskLevel::Low));
        assert!(response.errors.is_empty());
    }

    #[tokio::test]
    async fn one_risk_entry_per_condition_whatever_the_model_says() {
        let mut model = CannedModel::healthy();
        model.risk = Box::new(|condition: &str| match condition {
            "Hypertension" => Ok("[HIGH]".to_string()),
            "Diabetes" => Ok("I would say moderate".to_string()),
            _ => Err(()),
        });
        let orchestrator = Orchestrator::new(Arc::new(model), settings());
        let response = orchestrator.run_turn(&fever_request()).await.unwrap();

        let levels: Vec<(&str, RiskLevel)> = response
            .risks
            .iter()
            .map(|r| (r.condition.as_str(), r.risk_level))
            .collect();
        assert_eq!(
            levels,
            vec![
                ("Hypertension", RiskLevel::High),
                ("Diabetes", RiskLevel::MoreInfo),
                ("Depression", RiskLevel::MoreInfo),
            ]
        );
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].field, "risk:Depression");
        assert_eq!(response.errors[0].kind, ErrorKind::ModelUnavailable);
    }

    #[tokio::test]
    async fn failed_chat_call_leaves_other_fields_intact() {
        let mut model = CannedModel::healthy();
        model.chat = Err(());
        let orchestrator = Orchestrator::new(Arc::new(model), settings());
        let response = orchestrator.run_turn(&fever_request()).await.unwrap();

        assert_eq!(response.text, None);
        assert!(response.urgency.is_some());
        assert_eq!(response.diagnosis.len(), 2);
        assert_eq!(response.errors[0].field, "text");
    }

    #[tokio::test]
    async fn untagged_urgency_is_kept_raw_and_flagged() {
        let mut model = CannedModel::healthy();
        model.urgency = Ok("Please see a doctor soon.".to_string());
        model.diagnosis = Ok("I cannot tell yet.".to_string());
        let orchestrator = Orchestrator::new(Arc::new(model), settings());
        let response = orchestrator.run_turn(&fever_request()).await.unwrap();

        assert_eq!(
            response.urgency,
            Some(UrgencyResult { code: None, text: "Please see a doctor soon.".to_string() })
        );
        assert!(response.diagnosis.is_empty());
        let kinds: Vec<(&str, ErrorKind)> = response
            .errors
            .iter()
            .map(|e| (e.field.as_str(), e.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("urgency", ErrorKind::ExtractionAmbiguous),
                ("diagnosis", ErrorKind::ExtractionAmbiguous),
            ]
        );
    }

    #[tokio::test]
    async fn slow_call_times_out_without_failing_the_turn() {
        let mut settings = settings();
        settings.call_timeout = Duration::from_millis(50);
        let orchestrator = Orchestrator::new(Arc::new(SlowModel), settings);
        let response = orchestrator.run_turn(&fever_request()).await.unwrap();

        assert_eq!(response.urgency, None);
        assert_eq!(response.text.as_deref(), Some("[MEDIUM]"));
        assert_eq!(response.risks.len(), 3);
        assert!(response.risks.iter().all(|r| r.risk_level == RiskLevel::Medium));
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].field, "urgency");
        assert!(response.errors[0].message.contains("timed out"));
    }

    #[tokio::test]
    async fn every_call_failing_is_a_turn_error() {
        let orchestrator = Orchestrator::new(Arc::new(CannedModel::failing()), settings());
        match orchestrator.run_turn(&fever_request()).await {
            Err(TurnError::AllCallsFailed(errors)) => assert_eq!(errors.len(), 6),
            other => panic!("expected AllCallsFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_conversation_is_rejected() {
        let orchestrator = Orchestrator::new(Arc::new(CannedModel::healthy()), settings());
        assert!(matches!(
            orchestrator.run_turn(&ChatTurnRequest::default()).await,
            Err(TurnError::EmptyConversation)
        ));
    }

    #[tokio::test]
    async fn prior_diagnosis_reaches_only_the_diagnosis_prompt() {
        let model = Arc::new(CannedModel::healthy());
        let orchestrator = Orchestrator::new(model.clone(), settings());
        let request = ChatTurnRequest {
            conversation: vec![
                ChatMessage::user("I have a fever"),
                ChatMessage::assistant("How high?"),
                ChatMessage::user("104F"),
            ],
            last_diagnosis: vec![ChatMessage::assistant("1. Influenza - [MORE_INFO]")],
        };
        orchestrator.run_turn(&request).await.unwrap();

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 6);
        for messages in seen.iter() {
            let has_prior = messages.iter().any(|m| m.content == "1. Influenza - [MORE_INFO]");
            let is_diagnosis = messages[0].content.contains("suggest potential conditions");
            assert_eq!(has_prior, is_diagnosis);
            assert_eq!(messages.last().map(|m| m.role), Some(MessageRole::User));
            assert_eq!(messages.last().map(|m| m.content.as_str()), Some("104F"));
        }
    }
}
