//! HTTP handlers for the inventory and pruning API

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use inventory::{DeletionOutcome, GlobalStats, ImageRecord, Inventory};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ServiceError, ServiceResult};

/// Number of images a ranking returns when no usable limit is given.
pub const DEFAULT_LIMIT: usize = 10;

/// Router for the `/api` endpoints
pub fn router() -> Router<Inventory> {
    Router::new()
        .route("/api/repositories", get(list_repositories))
        .route("/api/global-stats", get(global_stats))
        .route("/api/images", get(list_images))
        .route("/api/images/most-downloaded", get(most_downloaded))
        .route("/api/images/largest", get(largest))
        .route("/api/images/expired", get(expired))
        .route("/api/images/delete", post(delete_images))
        .route("/api/images/delete-by-date", post(delete_by_date))
}

#[derive(Debug, Deserialize)]
struct ImagesQuery {
    repository: Option<String>,
    limit: Option<String>,
    #[serde(rename = "daysOld")]
    days_old: Option<String>,
}

impl ImagesQuery {
    fn repository(&self) -> ServiceResult<&str> {
        match self.repository.as_deref() {
            Some(repository) if !repository.is_empty() => Ok(repository),
            _ => Err(ServiceError::MissingParameter("repository")),
        }
    }

    fn limit(&self) -> usize {
        parse_limit(self.limit.as_deref())
    }

    fn days_old(&self) -> ServiceResult<i64> {
        match self.days_old.as_deref() {
            None | Some("") => Ok(0),
            Some(value) => value.parse().map_err(|_| ServiceError::InvalidParameter {
                name: "daysOld",
                value: value.to_owned(),
            }),
        }
    }
}

/// A ranking limit, falling back to [`DEFAULT_LIMIT`] when absent,
/// unparsable or not positive.
fn parse_limit(limit: Option<&str>) -> usize {
    limit
        .and_then(|limit| limit.parse::<i64>().ok())
        .filter(|&limit| limit > 0)
        .and_then(|limit| usize::try_from(limit).ok())
        .unwrap_or(DEFAULT_LIMIT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest {
    #[serde(default)]
    repository_name: String,
    #[serde(default)]
    image_digests: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteByDateRequest {
    #[serde(default)]
    repository_name: String,
    #[serde(default)]
    days_old: i64,
    #[serde(default)]
    image_digests: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    message: String,
    deleted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<String>>,
}

/// A deletion outcome rendered as 200, or 206 when anything failed.
#[derive(Debug)]
struct Deletion(DeletionOutcome);

impl IntoResponse for Deletion {
    fn into_response(self) -> Response {
        let Deletion(outcome) = self;
        if outcome.is_partial() {
            let body = DeleteResponse {
                message: format!(
                    "Partially completed: {} images deleted, but encountered {} errors",
                    outcome.deleted,
                    outcome.errors.len()
                ),
                deleted: outcome.deleted,
                errors: Some(outcome.errors),
            };
            return (StatusCode::PARTIAL_CONTENT, Json(body)).into_response();
        }

        let body = DeleteResponse {
            message: "Images deleted successfully".into(),
            deleted: outcome.deleted,
            errors: None,
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

async fn list_repositories(State(inventory): State<Inventory>) -> ServiceResult<Json<Vec<String>>> {
    Ok(Json(inventory.repositories().await?))
}

async fn global_stats(State(inventory): State<Inventory>) -> ServiceResult<Json<GlobalStats>> {
    Ok(Json(inventory.global_stats().await?))
}

async fn list_images(
    State(inventory): State<Inventory>,
    Query(query): Query<ImagesQuery>,
) -> ServiceResult<Json<Vec<ImageRecord>>> {
    let repository = query.repository()?;
    Ok(Json(inventory.images(repository).await?))
}

/// Images ranked by last pull time, most recent first.
async fn most_downloaded(
    State(inventory): State<Inventory>,
    Query(query): Query<ImagesQuery>,
) -> ServiceResult<Json<Vec<ImageRecord>>> {
    let repository = query.repository()?;
    let images = inventory.most_recent(repository, Some(query.limit())).await?;
    Ok(Json(images))
}

async fn largest(
    State(inventory): State<Inventory>,
    Query(query): Query<ImagesQuery>,
) -> ServiceResult<Json<Vec<ImageRecord>>> {
    let repository = query.repository()?;
    let images = inventory.largest(repository, Some(query.limit())).await?;
    Ok(Json(images))
}

async fn expired(
    State(inventory): State<Inventory>,
    Query(query): Query<ImagesQuery>,
) -> ServiceResult<Json<Vec<ImageRecord>>> {
    let repository = query.repository()?;
    let images = inventory.expired(repository, query.days_old()?).await?;
    Ok(Json(images))
}

async fn delete_images(
    State(inventory): State<Inventory>,
    request: Result<Json<DeleteRequest>, JsonRejection>,
) -> ServiceResult<Deletion> {
    let Json(request) = request?;
    let outcome = inventory
        .delete_images(&request.repository_name, &request.image_digests)
        .await?;
    Ok(Deletion(outcome))
}

async fn delete_by_date(
    State(inventory): State<Inventory>,
    request: Result<Json<DeleteByDateRequest>, JsonRejection>,
) -> ServiceResult<Response> {
    let Json(request) = request?;
    let selection = inventory
        .delete_by_age(
            &request.repository_name,
            request.days_old,
            &request.image_digests,
        )
        .await?;

    match selection {
        Some(outcome) => Ok(Deletion(outcome).into_response()),
        None => {
            let body = json!({ "message": "No images found matching criteria", "deleted": 0 });
            Ok((StatusCode::OK, Json(body)).into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_falls_back_to_default() {
        assert_eq!(parse_limit(None), DEFAULT_LIMIT);
        assert_eq!(parse_limit(Some("")), DEFAULT_LIMIT);
        assert_eq!(parse_limit(Some("ten")), DEFAULT_LIMIT);
        assert_eq!(parse_limit(Some("0")), DEFAULT_LIMIT);
        assert_eq!(parse_limit(Some("-4")), DEFAULT_LIMIT);
        assert_eq!(parse_limit(Some("25")), 25);
    }

    #[test]
    fn partial_outcome_is_206() {
        let outcome = DeletionOutcome {
            deleted: 3,
            errors: vec!["Failed to delete image sha256:1: ImageNotFound".into()],
        };
        assert_eq!(
            Deletion(outcome).into_response().status(),
            StatusCode::PARTIAL_CONTENT
        );
        assert_eq!(
            Deletion(DeletionOutcome::default()).into_response().status(),
            StatusCode::OK
        );
    }
}
