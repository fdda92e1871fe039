// src/api.rs
// HTTP surface: health check plus the run trigger. The trigger ignores the
// request body and method; any hit performs one full orchestrated run.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use tower_http::cors::CorsLayer;

use crate::normalize::SelectionRecord;
use crate::pipeline::{self, AppContext, RunFailure, RunReport};
use crate::store::truncate_chars;

#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<AppContext>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/analyze", get(analyze).post(analyze))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Serialize)]
struct HealthResp {
    status: &'static str,
    service: &'static str,
    timestamp: String,
    message: &'static str,
}

async fn health() -> Json<HealthResp> {
    Json(HealthResp {
        status: "healthy",
        service: "japan-news-curator",
        timestamp: Utc::now().to_rfc3339(),
        message: "Service is running normally",
    })
}

#[derive(serde::Serialize)]
struct SelectedNewsOut {
    title: String,
    reason: String,
    writing_direction: String,
}

#[derive(serde::Serialize)]
struct RunData {
    date: String,
    total_titles: usize,
    unique_titles: usize,
    selected_count: usize,
    saved_count: usize,
    selected_news: Vec<SelectedNewsOut>,
    execution_time_seconds: f64,
}

#[derive(serde::Serialize)]
struct SuccessResp {
    success: bool,
    message: String,
    data: RunData,
    logs: Vec<String>,
    errors: Option<Vec<String>>,
    timestamp: String,
}

#[derive(serde::Serialize)]
struct FailureResp {
    success: bool,
    message: String,
    logs: Vec<String>,
    execution_time_seconds: f64,
    timestamp: String,
}

async fn analyze(State(state): State<AppState>) -> Response {
    match pipeline::run(&state.ctx).await {
        Ok(report) => (StatusCode::OK, Json(success_body(report))).into_response(),
        Err(failure) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(failure_body(failure)),
        )
            .into_response(),
    }
}

fn success_body(report: RunReport) -> SuccessResp {
    let selected_news = report
        .selected
        .iter()
        .map(|r: &SelectionRecord| SelectedNewsOut {
            title: r.title.clone(),
            // Clipped in the response only; the full text is what persists.
            reason: truncate_chars(&r.reason, 100),
            writing_direction: truncate_chars(&r.writing_direction, 100),
        })
        .collect();

    SuccessResp {
        success: true,
        message: report.message.clone(),
        data: RunData {
            date: report.date,
            total_titles: report.total_titles,
            unique_titles: report.unique_titles,
            selected_count: report.selected_count,
            saved_count: report.saved_count,
            selected_news,
            execution_time_seconds: report.execution_time_seconds,
        },
        logs: report.logs,
        errors: if report.errors.is_empty() {
            None
        } else {
            Some(report.errors)
        },
        timestamp: Utc::now().to_rfc3339(),
    }
}

fn failure_body(failure: RunFailure) -> FailureResp {
    FailureResp {
        success: false,
        message: format!("執行失敗：{}", failure.error),
        logs: failure.logs,
        execution_time_seconds: failure.execution_time_seconds,
        timestamp: Utc::now().to_rfc3339(),
    }
}
