use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use medchat_shared::{ChatTurnRequest, ChatTurnResponse};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::error::TurnError;
use crate::orchestrator::Orchestrator;

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn build_router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(orchestrator)
}

async fn root(State(orchestrator): State<Arc<Orchestrator>>) -> Json<Value> {
    Json(json!({
        "service": "medchat",
        "version": env!("CARGO_PKG_VERSION"),
        "riskConditions": orchestrator.conditions(),
        "endpoints": {
            "POST /api/chat": "Run one conversation turn",
            "GET /health": "Health check"
        }
    }))
}

async fn health() -> &'static str {
    "OK"
}

async fn chat(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(request): Json<ChatTurnRequest>,
) -> ApiResult<ChatTurnResponse> {
    info!("Chat turn received with {} messages", request.conversation.len());

    match orchestrator.run_turn(&request).await {
        Ok(response) => {
            if !response.errors.is_empty() {
                warn!("Turn completed with {} field errors", response.errors.len());
            }
            Ok(Json(response))
        }
        Err(TurnError::EmptyConversation) => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": TurnError::EmptyConversation.to_string() })),
        )),
        Err(TurnError::AllCallsFailed(details)) => {
            error!("Every model call of the turn failed");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "model provider unavailable",
                    "details": details,
                })),
            ))
        }
    }
}
