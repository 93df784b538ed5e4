//! Fixed system instructions and the message lists built around them.

use medchat_shared::{ChatMessage, UrgencyCode};

const CHAT_SYSTEM_PROMPT: &str = "\
You are a medical AI assistant designed to gather patient data through conversation. \
Your goal is to ask relevant questions about factors such as age, family history, lifestyle habits, \
and medical test results to assess disease risk and provide preliminary insights.
1. Prioritize accuracy by tailoring questions based on the most likely conditions.
2. Ensure a natural, engaging, and respectful conversation while collecting data.
3. Clearly communicate that all assessments are preliminary and that users should consult a healthcare professional for a definitive diagnosis.
4. If data is incomplete, ask clarifying questions before making an assessment.
Maintain ethical, unbiased, and privacy-conscious responses at all times. \
Answer concisely and only ask one question at a time.";

const DIAGNOSIS_SYSTEM_PROMPT: &str = "\
You are a medical AI assistant trained to analyze patient data and suggest potential conditions \
based on symptoms, medical history, and lifestyle factors.
Your goal is to evaluate the conversation as well as the diagnosis at that point and provide a new \
diagnosis based on new data if there is any.
Select the diseases that you feel will be of utmost importance and are the most risky.
Respond with only the diseases and [TRUE] if they have been confirmed to have the disease or \
[MORE_INFO] if you do not have enough information.
If more than one is [TRUE] you must set the others as [ALSO_POSSIBLE].
1. Base assessments on medical correlations and established patterns.
Example Response:
1. Disease A - [TRUE]
2. Disease B - [ALSO_POSSIBLE]
3. Disease C - [MORE_INFO]";

fn risk_system_prompt(condition: &str) -> String {
    format!(
        "You are a medical AI assistant trained to assess the risk of {condition} or being diagnosed with \
{condition}, whichever is more likely, based on patient data. Your goal is to analyze information gathered \
from conversations, including age, family history, lifestyle factors, and medical test results, to provide \
a calculated risk factor for specific diseases.
Ensure risk assessments are based on reliable medical correlations and statistical models. \
Respond with [LOW], [MEDIUM] or [HIGH], or [MORE_INFO] if you need more information. \
Do not ask any questions, only respond with one of these four answers.
Example Response 1:
[LOW]
Example Response 2:
[MEDIUM]
Example Response 3:
[HIGH]
Example Response 4:
[MORE_INFO]
"
    )
}

fn urgency_system_prompt() -> String {
    let permitted = UrgencyCode::ALL
        .iter()
        .map(|code| format!("- [{}] {}", code.as_tag(), code.instruction()))
        .collect::<Vec<_>>()
        .join("\n");
    let response = |code: UrgencyCode| format!("[{}] {}", code.as_tag(), code.instruction());

    format!(
        "You are a medical AI assistant assessing whether a patient's symptoms are urgent or not.
Base your response on medical patterns and provide clear guidance based on the symptoms provided.

### **STRICT RESPONSE FORMAT**
You MUST return one of the following responses EXACTLY as written (do NOT generate any other text):
{permitted}

### **Example Responses**
User: I have a rash.
Response: {monitor}

User: I have 42C fever for 10 days.
Response: {emergency}

User: I have a cough.
Response: {monitor}
",
        monitor = response(UrgencyCode::Monitor),
        emergency = response(UrgencyCode::Emergency),
    )
}

fn with_system(system: String, conversation: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(1 + conversation.len());
    messages.push(ChatMessage::system(system));
    messages.extend_from_slice(conversation);
    messages
}

pub fn chat_messages(conversation: &[ChatMessage]) -> Vec<ChatMessage> {
    with_system(CHAT_SYSTEM_PROMPT.to_string(), conversation)
}

pub fn risk_messages(condition: &str, conversation: &[ChatMessage]) -> Vec<ChatMessage> {
    with_system(risk_system_prompt(condition), conversation)
}

pub fn urgency_messages(conversation: &[ChatMessage]) -> Vec<ChatMessage> {
    with_system(urgency_system_prompt(), conversation)
}

/// History without its final message, then the previous diagnosis, then the
/// final message, so the newest input is what the model reads last.
pub fn diagnosis_messages(
    conversation: &[ChatMessage],
    last_diagnosis: &[ChatMessage],
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(1 + conversation.len() + last_diagnosis.len());
    messages.push(ChatMessage::system(DIAGNOSIS_SYSTEM_PROMPT));
    match conversation.split_last() {
        Some((newest, history)) => {
            messages.extend_from_slice(history);
            messages.extend_from_slice(last_diagnosis);
            messages.push(newest.clone());
        }
        None => messages.extend_from_slice(last_diagnosis),
    }
    messages
}
