use medchat_shared::{ChatTurnRequest, ChatTurnResponse};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("could not reach server: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected response from server: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type TurnOutcome = Result<ChatTurnResponse, ClientError>;

/// Posts turns to `/api/chat` in the background and hands results back over
/// a channel so the UI loop never blocks on the network.
pub struct BackendClient {
    http: reqwest::Client,
    chat_url: String,
    tx: mpsc::UnboundedSender<TurnOutcome>,
}

impl BackendClient {
    pub fn new(server_url: &str) -> (Self, mpsc::UnboundedReceiver<TurnOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Self {
            http: reqwest::Client::new(),
            chat_url: format!("{}/api/chat", server_url.trim_end_matches('/')),
            tx,
        };
        (client, rx)
    }

    pub fn send_turn(&self, request: ChatTurnRequest) {
        let http = self.http.clone();
        let url = self.chat_url.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            info!("Sending turn with {} messages", request.conversation.len());
            let outcome = post_turn(&http, &url, &request).await;
            if let Err(e) = &outcome {
                error!("Turn failed: {}", e);
            }
            if tx.send(outcome).is_err() {
                error!("UI stopped listening for turn results");
            }
        });
    }
}

pub async fn post_turn(
    http: &reqwest::Client,
    url: &str,
    request: &ChatTurnRequest,
) -> TurnOutcome {
    let response = http.post(url).json(request).send().await?;
    let status = response.status();
    let body = response.bytes().await?;

    if !status.is_success() {
        return Err(ClientError::Status {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }

    Ok(serde_json::from_slice(&body)?)
}

fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_json_error_field() {
        let body = br#"{"error":"model provider unavailable","details":[]}"#;
        assert_eq!(error_message(body), "model provider unavailable");
        assert_eq!(error_message(b"Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn status_error_is_readable() {
        let err = ClientError::Status { status: 502, message: "model provider unavailable".into() };
        assert_eq!(err.to_string(), "server returned 502: model provider unavailable");
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let outcome = post_turn(
            &reqwest::Client::new(),
            &format!("http://{}/api/chat", addr),
            &ChatTurnRequest::default(),
        )
        .await;
        assert!(matches!(outcome, Err(ClientError::Transport(_))));
    }
}
