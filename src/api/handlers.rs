//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    ActionRequest, ContextResponse, CustomerRequest, DisplayedItemsRequest, ErrorResponse,
    ReturnsResponse, ToolCallResponse, ToolsResponse,
};
use super::AppState;
use crate::db::{DbError, StoredReturn};
use crate::engine::{EngineError, ToolBridge, TransportAck};
use crate::flow::{FlowEvent, SessionRecord};
use crate::returns::ReturnServiceError;
use crate::session::StoreError;
use crate::summary::{agent_preamble, summarize};
use crate::tools::ToolContext;
use crate::widgets::NextWidgetSpec;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Widget clicks
        .route("/api/threads/:id/actions", post(post_action))
        // Agent tools
        .route("/api/tools", get(list_tools))
        .route("/api/threads/:id/tools/:name", post(call_tool))
        // Session state
        .route("/api/threads/:id/session", get(get_session))
        .route("/api/threads/:id/context", get(get_context))
        .route("/api/threads/:id/stream", get(stream_session))
        // Transport notifications
        .route("/api/threads/:id/customer", post(post_customer))
        .route("/api/threads/:id/displayed-items", post(post_displayed_items))
        // Created returns
        .route("/api/threads/:id/returns", get(list_returns))
        .route("/api/customers/:id/returns", get(list_customer_returns))
        .route("/api/returns/:id", get(get_return))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Widget Actions
// ============================================================

/// Run work that creates returns on its own task, so a client that
/// disconnects mid-request cannot leave a created return unrecorded.
async fn run_detached<T, F>(work: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, EngineError>> + Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(result) => result.map_err(AppError::from),
        Err(e) => Err(AppError::Internal(format!("Request task failed: {e}"))),
    }
}

async fn post_action(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Json(request): Json<ActionRequest>,
) -> Result<Json<NextWidgetSpec>, AppError> {
    let engine = state.engine.clone();
    let next = run_detached(async move {
        engine
            .handle_action(
                &thread_id,
                &request.action_type,
                &request.payload,
                CancellationToken::new(),
            )
            .await
    })
    .await?;
    Ok(Json(next))
}

// ============================================================
// Agent Tools
// ============================================================

async fn list_tools(State(state): State<AppState>) -> Json<ToolsResponse> {
    Json(ToolsResponse {
        tools: state.tools.definitions(),
    })
}

async fn call_tool(
    State(state): State<AppState>,
    Path((thread_id, name)): Path<(String, String)>,
    Json(input): Json<Value>,
) -> Result<Json<ToolCallResponse>, AppError> {
    let bridge: Arc<dyn ToolBridge> = state.engine.clone();
    let ctx = ToolContext::new(CancellationToken::new(), thread_id, bridge);
    let tools = state.tools.clone();
    let output = run_detached(async move { tools.execute(&name, input, ctx).await }).await?;
    Ok(Json(ToolCallResponse {
        success: output.success,
        result: output.output,
    }))
}

// ============================================================
// Session State
// ============================================================

async fn get_session(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<SessionRecord>, AppError> {
    Ok(Json(state.engine.session(&thread_id).await?))
}

async fn get_context(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<ContextResponse>, AppError> {
    let record = state.engine.session(&thread_id).await?;
    Ok(Json(ContextResponse {
        summary: summarize(&record),
        preamble: agent_preamble(&record),
    }))
}

async fn stream_session(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    // Subscribe before reading so no commit falls between the two
    let broadcast_rx = state.engine.subscribe(&thread_id).await;
    let current = state.engine.session(&thread_id).await?;
    Ok(sse_stream(current, broadcast_rx))
}

// ============================================================
// Transport Notifications
// ============================================================

async fn post_customer(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Json(request): Json<CustomerRequest>,
) -> Result<Json<TransportAck>, AppError> {
    if request.customer_id.trim().is_empty() {
        return Err(AppError::BadRequest("customer_id must not be empty".to_string()));
    }
    let event = FlowEvent::CustomerIdentified {
        customer_id: request.customer_id,
        name: request.name,
        tier: request.tier,
    };
    Ok(Json(state.engine.record_transport_event(&thread_id, event).await?))
}

async fn post_displayed_items(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Json(request): Json<DisplayedItemsRequest>,
) -> Result<Json<TransportAck>, AppError> {
    let event = FlowEvent::ItemsDisplayed {
        items: request.items,
    };
    Ok(Json(state.engine.record_transport_event(&thread_id, event).await?))
}

// ============================================================
// Returns
// ============================================================

async fn list_returns(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<ReturnsResponse>, AppError> {
    let returns = state
        .db
        .list_returns_for_thread(&thread_id)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(ReturnsResponse { returns }))
}

async fn list_customer_returns(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Json<ReturnsResponse>, AppError> {
    let returns = state
        .db
        .list_returns_for_customer(&customer_id)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(ReturnsResponse { returns }))
}

async fn get_return(
    State(state): State<AppState>,
    Path(return_id): Path<String>,
) -> Result<Json<StoredReturn>, AppError> {
    let stored = state.db.get_return(&return_id).map_err(|e| match e {
        DbError::ReturnNotFound(_) => AppError::NotFound(e.to_string()),
        _ => AppError::Internal(e.to_string()),
    })?;
    Ok(Json(stored))
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("return-desk ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
    Unavailable(String),
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Store(StoreError::Backend(_)) => AppError::Internal(e.to_string()),
            EngineError::Store(_) | EngineError::ReturnService(ReturnServiceError::Ineligible(_)) => {
                AppError::BadRequest(e.to_string())
            }
            EngineError::ReturnService(ReturnServiceError::Unavailable(_))
            | EngineError::Cancelled => AppError::Unavailable(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
