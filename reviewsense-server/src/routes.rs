//! HTTP surface for the analysis lifecycle.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use reviewsense_core::{AnalysisId, ClusterId, ReviewId, ServiceError};

use crate::AppState;

pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/analyses", get(list_analyses).post(create_analysis))
        .route(
            "/analyses/{id}",
            get(get_analysis).delete(delete_analysis),
        )
        .route("/analyses/{id}/reviews", get(list_reviews))
        .route("/analyses/{id}/clusters", get(list_clusters))
        .route("/reviews/{id}", get(get_review).patch(update_review))
        .route("/clusters/{id}", get(get_cluster))
        .with_state(state)
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "reviewsense"
    }))
}

async fn create_analysis(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Response {
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("upload").to_string();
            match field.bytes().await {
                Ok(bytes) => file = Some((filename, bytes.to_vec())),
                Err(e) => {
                    warn!("Failed to read uploaded file: {}", e);
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(json!({"error": "cannot read file"})),
                    )
                        .into_response();
                }
            }
            break;
        }
    }

    let Some((filename, bytes)) = file else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "file is required"})),
        )
            .into_response();
    };

    match state.service.submit(&bytes, &filename).await {
        Ok(analysis) => Json(analysis).into_response(),
        Err(e) => {
            warn!("Task dispatch failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "failed to send task"})),
            )
                .into_response()
        }
    }
}

async fn list_analyses(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let data = state.service.list().await;
    Json(json!({ "data": data }))
}

async fn get_analysis(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    match state.service.get(AnalysisId(id)).await {
        Ok(analysis) => Json(analysis).into_response(),
        Err(ServiceError::NotFound) => not_found(),
        Err(e) => {
            warn!("Failed to get analysis {}: {}", id, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn delete_analysis(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> StatusCode {
    state.service.delete(AnalysisId(id)).await;
    StatusCode::NO_CONTENT
}

async fn list_reviews(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Json<serde_json::Value> {
    let data = state.service.reviews_for(AnalysisId(id)).await;
    Json(json!({ "data": data }))
}

async fn get_review(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    match state.service.get_review(ReviewId(id)).await {
        Ok(review) => Json(review).into_response(),
        Err(_) => not_found(),
    }
}

#[derive(Debug, Deserialize)]
struct UpdateReviewRequest {
    sentiment: Option<String>,
}

async fn update_review(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateReviewRequest>,
) -> Response {
    let result = match payload.sentiment {
        Some(sentiment) => state.service.set_review_sentiment(ReviewId(id), sentiment).await,
        // No sentiment in the body: echo the record unchanged.
        None => state.service.get_review(ReviewId(id)).await,
    };

    match result {
        Ok(review) => Json(review).into_response(),
        Err(_) => not_found(),
    }
}

async fn list_clusters(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Json<serde_json::Value> {
    let data = state.service.clusters_for(AnalysisId(id)).await;
    Json(json!({ "data": data }))
}

async fn get_cluster(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    match state.service.get_cluster(ClusterId(id)).await {
        Ok(cluster) => Json(cluster).into_response(),
        Err(_) => not_found(),
    }
}
