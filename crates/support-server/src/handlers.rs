//! HTTP/SSE Handlers

use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use agent_core::{Agent, AgentError, Conversation, StreamEvent};
use order_support::SupportResponse;

use crate::sse::spawn_stream;
use crate::state::AppState;

const MIN_QUESTION_CHARS: usize = 3;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub provider: String,
    pub provider_connected: bool,
    pub tools: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuestionQuery {
    #[serde(default)]
    pub question: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn invalid_question() -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: "question must be a string".into(),
            code: "INVALID_QUESTION".into(),
        }),
    )
}

fn agent_failure(e: &AgentError) -> ApiError {
    tracing::error!("Agent error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: e.user_message(),
            code: e.code().into(),
        }),
    )
}

/// A question is a string of at least three characters once trimmed
fn validate_question(question: Option<&str>) -> Result<String, ApiError> {
    match question {
        Some(q) if q.trim().chars().count() >= MIN_QUESTION_CHARS => Ok(q.to_string()),
        _ => Err(invalid_question()),
    }
}

fn query_question(query: Result<Query<QuestionQuery>, QueryRejection>) -> Result<String, ApiError> {
    let Ok(Query(query)) = query else {
        return Err(invalid_question());
    };
    validate_question(query.question.as_deref())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let provider_connected = state.provider.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: if provider_connected { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        provider: state.provider.name().to_string(),
        provider_connected,
        tools: state.agent.tools().names().into_iter().map(str::to_string).collect(),
    })
}

/// Synchronous support answer
pub async fn support_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Ok(Json(body)) = payload else {
        return Err(invalid_question());
    };
    let question = validate_question(body.get("question").and_then(Value::as_str))?;

    let span = tracing::info_span!("support", request_id = %Uuid::new_v4(), structured = state.structured);
    answer(&state, &question).instrument(span).await
}

async fn answer(state: &AppState, question: &str) -> Result<Json<Value>, ApiError> {
    if state.structured {
        let response: SupportResponse = state
            .agent
            .ask_structured(question)
            .await
            .map_err(|e| agent_failure(&e))?;
        let value = serde_json::to_value(response).map_err(|e| agent_failure(&AgentError::from(e)))?;
        return Ok(Json(value));
    }

    let answer = state.agent.ask(question).await.map_err(|e| agent_failure(&e))?;
    Ok(Json(json!({ "answer": answer })))
}

/// Stream an answer without tools
pub async fn support_stream_handler(
    State(state): State<AppState>,
    query: Result<Query<QuestionQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let question = query_question(query)?;
    Ok(stream_mode(
        Arc::clone(&state.direct),
        question,
        "direct",
        |agent, conversation, mut tx, cancel| async move {
            agent.stream_direct(conversation, &mut tx, cancel).await;
        },
    ))
}

/// Resolve tools, then stream the answer
pub async fn support_stream_final_handler(
    State(state): State<AppState>,
    query: Result<Query<QuestionQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let question = query_question(query)?;
    Ok(stream_mode(
        Arc::clone(&state.agent),
        question,
        "resolved",
        |agent, conversation, mut tx, cancel| async move {
            agent.stream_resolved(conversation, &mut tx, cancel).await;
        },
    ))
}

/// Stream every turn, then deliver a `SupportResponse`
pub async fn support_stream_structured_handler(
    State(state): State<AppState>,
    query: Result<Query<QuestionQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let question = query_question(query)?;
    Ok(stream_mode(
        Arc::clone(&state.agent),
        question,
        "structured",
        |agent, conversation, mut tx, cancel| async move {
            agent
                .stream_structured::<SupportResponse>(conversation, &mut tx, cancel)
                .await;
        },
    ))
}

/// Open an SSE response driven by `run` on its own task
fn stream_mode<F, Fut>(agent: Arc<Agent>, question: String, mode: &'static str, run: F) -> Response
where
    F: FnOnce(Arc<Agent>, Conversation, mpsc::Sender<StreamEvent>, CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let span = tracing::info_span!("support_stream", request_id = %Uuid::new_v4(), mode);
    span.in_scope(|| {
        tracing::debug!("opening event stream");
        spawn_stream(move |tx, cancel| {
            let conversation = agent.conversation(&question);
            run(agent, conversation, tx, cancel)
        })
        .into_response()
    })
}
