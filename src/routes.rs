use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequestParts, Path, Query, State,
    },
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::db::{Database, Feed, FeedFollow, User};
use crate::error::StorageError;

const DEFAULT_POSTS_LIMIT: i64 = 20;

pub struct AppState {
    pub db: Arc<Database>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let v1 = Router::new()
        .route("/healthz", get(health))
        .route("/err", get(internal_error))
        .route("/users", get(get_user).post(create_user))
        .route("/feeds", get(list_feeds).post(create_feed))
        .route(
            "/feed_follows",
            get(list_feed_follows).post(create_feed_follow),
        )
        .route("/feed_follows/:follow_id", delete(delete_feed_follow))
        .route("/posts", get(list_posts));

    Router::new()
        .nest("/v1", v1)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Error type rendered as `{"error": "..."}`
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(_) => Self::new(StatusCode::CONFLICT, "already exists"),
            StorageError::NotFound => Self::not_found("not found"),
            other => {
                error!(error = %other, "storage error while handling request");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }
}

/// The user owning the `Authorization: ApiKey <key>` header.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("ApiKey "))
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(AppError::unauthorized)?;

        let user = state
            .db
            .get_user_by_api_key(key)
            .await?
            .ok_or_else(AppError::unauthorized)?;

        Ok(AuthUser(user))
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|_| AppError::bad_request("error decoding request body"))
}

// Route handlers
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn internal_error() -> AppError {
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let request = body(payload)?;
    let user = state.db.create_user(&request.name).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get_user(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

pub async fn list_feeds(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Feed>>, AppError> {
    Ok(Json(state.db.list_feeds().await?))
}

#[derive(Deserialize)]
pub struct CreateFeedRequest {
    pub name: String,
    pub url: String,
}

#[derive(Serialize)]
pub struct CreateFeedResponse {
    pub feed: Feed,
    pub feed_follow: FeedFollow,
}

/// Register a feed; its creator follows it straight away.
pub async fn create_feed(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<CreateFeedRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let request = body(payload)?;
    if request.url.trim().is_empty() {
        return Err(AppError::bad_request("feed url is required"));
    }

    let feed = state
        .db
        .create_feed(&request.name, request.url.trim(), user.id)
        .await?;
    let feed_follow = state.db.create_feed_follow(user.id, feed.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateFeedResponse { feed, feed_follow }),
    ))
}

#[derive(Deserialize)]
pub struct CreateFollowRequest {
    pub feed_id: i64,
}

pub async fn create_feed_follow(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<CreateFollowRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let request = payload
        .map(|Json(value)| value)
        .map_err(|_| AppError::bad_request("invalid feed id"))?;

    let feed = state
        .db
        .get_feed(request.feed_id)
        .await?
        .ok_or_else(|| AppError::not_found("feed not found"))?;

    let follow = state.db.create_feed_follow(user.id, feed.id).await?;
    Ok((StatusCode::CREATED, Json(follow)))
}

pub async fn list_feed_follows(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<FeedFollow>>, AppError> {
    Ok(Json(state.db.list_user_feed_follows(user.id).await?))
}

pub async fn delete_feed_follow(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    follow_id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let Path(follow_id) =
        follow_id.map_err(|_| AppError::bad_request("invalid feed follow id"))?;

    let follow = state
        .db
        .get_feed_follow(follow_id)
        .await?
        .ok_or_else(|| AppError::not_found("feed follow not found"))?;
    if follow.user_id != user.id {
        return Err(AppError::new(StatusCode::FORBIDDEN, "operation not allowed"));
    }

    state.db.delete_feed_follow(follow_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct PostsQuery {
    pub limit: Option<i64>,
}

pub async fn list_posts(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    query: Result<Query<PostsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(query) = query.map_err(|_| AppError::bad_request("invalid limit query parameter"))?;
    let limit = query.limit.unwrap_or(DEFAULT_POSTS_LIMIT);
    if limit <= 0 {
        return Err(AppError::bad_request("invalid limit query parameter"));
    }

    let posts = state.db.get_user_posts(user.id, limit).await?;
    Ok(Json(posts))
}
