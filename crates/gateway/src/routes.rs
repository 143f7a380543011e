//! API route handlers.
//!
//! `POST /api/chat` streams agent events as SSE frames (`data: <json>\n\n`,
//! no event names — the payload's `type` field carries the discriminator).
//! Everything else is ordinary JSON over the stores and registries.

use std::collections::BTreeMap;
use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

use miniagent_core::message::{Message, Role, SessionKey};

use crate::AppState;

/// All `/api` routes.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/sessions", get(list_sessions_handler))
        .route(
            "/sessions/{key}",
            get(get_session_handler)
                .patch(rename_session_handler)
                .delete(delete_session_handler),
        )
        .route("/tools", get(list_tools_handler))
        .route("/tools/{name}", get(get_tool_handler))
        .route("/skills", get(list_skills_handler))
        .route("/skills/{name}", get(get_skill_handler))
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default = "default_session_key")]
    pub session_key: String,
}

fn default_session_key() -> String {
    "default".into()
}

#[derive(Serialize, Deserialize)]
struct SessionListResponse {
    sessions: Vec<SessionInfoDto>,
}

#[derive(Serialize, Deserialize)]
struct SessionInfoDto {
    key: String,
    name: String,
}

#[derive(Serialize, Deserialize)]
struct SessionDetailResponse {
    session_key: String,
    messages: Vec<MessageDto>,
}

#[derive(Serialize, Deserialize)]
struct MessageDto {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCallDto>>,
    timestamp: String,
}

#[derive(Serialize, Deserialize)]
struct ToolCallDto {
    id: String,
    tool: String,
    args: serde_json::Value,
}

#[derive(Deserialize)]
struct RenameSessionRequest {
    name: String,
}

#[derive(Serialize, Deserialize)]
struct ToolListResponse {
    groups: Vec<ToolGroupDto>,
    count: usize,
}

#[derive(Serialize, Deserialize)]
struct ToolGroupDto {
    category: String,
    tools: Vec<ToolDto>,
}

#[derive(Serialize, Deserialize)]
struct ToolDto {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct SkillListResponse {
    skills: Vec<SkillDto>,
}

#[derive(Serialize, Deserialize)]
struct SkillDto {
    name: String,
    description: String,
    source: String,
}

#[derive(Serialize, Deserialize)]
struct SkillDetailResponse {
    name: String,
    description: String,
    source: String,
    body: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn not_found(what: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("{what} not found"),
        }),
    )
}

// ── Handlers ──────────────────────────────────────────────────────────────

pub async fn health_handler() -> &'static str {
    "OK"
}

/// `POST /api/chat` — run one query, stream agent events over SSE.
///
/// The cancellation token's drop-guard lives inside the response stream's
/// closure: when the client disconnects, Axum drops the stream, the guard
/// drops, and the loop is cancelled.
async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    info!(session_key = %payload.session_key, "chat request");

    let cancel = CancellationToken::new();
    let rx = state
        .agent
        .run_stream(&payload.message, &payload.session_key, cancel.clone());
    let guard = cancel.drop_guard();

    let stream = ReceiverStream::new(rx).map(move |event| {
        let _cancel_on_drop = &guard;
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().data(data))
    });

    Sse::new(stream)
}

async fn list_sessions_handler(
    State(state): State<AppState>,
) -> Result<Json<SessionListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let sessions = state.agent.sessions().list_sessions().await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
    })?;

    Ok(Json(SessionListResponse {
        sessions: sessions
            .into_iter()
            .map(|s| SessionInfoDto {
                key: s.key,
                name: s.name,
            })
            .collect(),
    }))
}

async fn get_session_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<SessionDetailResponse>, (StatusCode, Json<ErrorResponse>)> {
    let normalized = SessionKey::normalize(&key);
    let messages = state.agent.sessions().load(&normalized).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
    })?;

    Ok(Json(SessionDetailResponse {
        session_key: normalized.to_string(),
        messages: messages.iter().map(message_to_dto).collect(),
    }))
}

fn message_to_dto(message: &Message) -> MessageDto {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    let tool_calls = if message.tool_calls.is_empty() {
        None
    } else {
        Some(
            message
                .tool_calls
                .iter()
                .map(|tc| ToolCallDto {
                    id: tc.id.clone(),
                    tool: tc.name.clone(),
                    args: serde_json::from_str(&tc.arguments).unwrap_or_default(),
                })
                .collect(),
        )
    };
    MessageDto {
        role: role.to_string(),
        content: message.content.clone(),
        tool_calls,
        timestamp: message.timestamp.to_rfc3339(),
    }
}

async fn rename_session_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(payload): Json<RenameSessionRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    let normalized = SessionKey::normalize(&key);
    state
        .agent
        .sessions()
        .rename(&normalized, &payload.name)
        .await
        .map_err(|_| not_found("session"))?;

    Ok(Json(serde_json::json!({
        "status": "updated",
        "session_key": normalized.to_string(),
        "name": payload.name,
    })))
}

async fn delete_session_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let normalized = SessionKey::normalize(&key);
    state
        .agent
        .sessions()
        .delete(&normalized)
        .await
        .map_err(|_| not_found("session"))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_tools_handler(State(state): State<AppState>) -> Json<ToolListResponse> {
    let registry = state.agent.tools();
    let mut grouped: BTreeMap<String, Vec<ToolDto>> = BTreeMap::new();
    let mut count = 0;
    for def in registry.definitions() {
        count += 1;
        grouped
            .entry(registry.category_of(&def.name).to_string())
            .or_default()
            .push(ToolDto {
                name: def.name,
                description: def.description,
                parameters: def.parameters,
            });
    }

    Json(ToolListResponse {
        groups: grouped
            .into_iter()
            .map(|(category, tools)| ToolGroupDto { category, tools })
            .collect(),
        count,
    })
}

async fn get_tool_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ToolDto>, (StatusCode, Json<ErrorResponse>)> {
    let tool = state.agent.tools().get(&name).ok_or_else(|| not_found("tool"))?;
    Ok(Json(ToolDto {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        parameters: tool.parameters_schema(),
    }))
}

async fn list_skills_handler(State(state): State<AppState>) -> Json<SkillListResponse> {
    Json(SkillListResponse {
        skills: state
            .skills
            .list()
            .into_iter()
            .map(|s| SkillDto {
                name: s.name.clone(),
                description: s.description.clone(),
                source: s.source.as_str().to_string(),
            })
            .collect(),
    })
}

async fn get_skill_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SkillDetailResponse>, (StatusCode, Json<ErrorResponse>)> {
    let skill = state.skills.get(&name).ok_or_else(|| not_found("skill"))?;
    Ok(Json(SkillDetailResponse {
        name: skill.name.clone(),
        description: skill.description.clone(),
        source: skill.source.as_str().to_string(),
        body: skill.body.clone(),
    }))
}
