// SPDX-License-Identifier: MIT

use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::error::MixragError;
use crate::session::SessionStore;
use crate::workflow::engine::{RunEvent, WorkflowEngine};
use crate::workflow::state::Turn;

#[derive(Clone)]
struct AppState {
    engine: Arc<WorkflowEngine>,
    sessions: SessionStore,
}

pub async fn serve(engine: Arc<WorkflowEngine>, port: u16) -> Result<(), MixragError> {
    let state = AppState {
        engine,
        sessions: SessionStore::new(),
    };

    let app = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/query", post(run_query))
        .route("/api/query/stream", post(stream_query))
        .route("/api/sessions/{id}", get(get_session).delete(delete_session))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct QueryRequest {
    /// Omit to start a fresh session
    session_id: Option<Uuid>,
    question: String,
}

async fn run_query(
    State(state): State<AppState>,
    Json(payload): Json<QueryRequest>,
) -> Json<Value> {
    let session_id = payload.session_id.unwrap_or_else(Uuid::new_v4);
    let history = state.sessions.history(&session_id).await;

    match state.engine.run_query(&history, &payload.question).await {
        Ok(result) => {
            state
                .sessions
                .append(
                    session_id,
                    vec![Turn::user(&payload.question), Turn::assistant(&result.answer)],
                )
                .await;

            Json(json!({
                "session_id": session_id,
                "answer": result.answer,
                "citations": result.citations,
                "used_fallback": result.used_fallback,
                "rewrite_count": result.rewrite_count,
            }))
        }
        Err(e) => Json(json!({ "error": format!("Query failed: {}", e) })),
    }
}

async fn stream_query(
    State(state): State<AppState>,
    Json(payload): Json<QueryRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<RunEvent>(100);

    tokio::spawn(async move {
        let session_id = payload.session_id.unwrap_or_else(Uuid::new_v4);
        log::info!("starting streaming run for session {}", session_id);

        let history = state.sessions.history(&session_id).await;

        match state
            .engine
            .run_query_stream(&history, &payload.question, tx)
            .await
        {
            Ok(result) => {
                state
                    .sessions
                    .append(
                        session_id,
                        vec![Turn::user(&payload.question), Turn::assistant(&result.answer)],
                    )
                    .await;
            }
            Err(e) => {
                // The engine already sent the Error event; the session
                // keeps its pre-run history
                log::error!("streaming run failed: {}", e);
            }
        }
    });

    let stream =
        ReceiverStream::new(rx).map(|event| Ok(Event::default().json_data(event).unwrap()));

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new().interval(std::time::Duration::from_secs(1)),
    )
}

async fn get_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Json<Value> {
    let turns = state.sessions.history(&id).await;
    Json(json!({ "session_id": id, "turns": turns }))
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Json<Value> {
    let removed = state.sessions.remove(&id).await;
    Json(json!({ "session_id": id, "removed": removed }))
}
