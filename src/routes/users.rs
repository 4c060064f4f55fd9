use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::users::{AvatarRequest, AvatarResponse, SubscriptionList, SubscriptionQuery, UserList},
    error::AppResult,
    middleware::auth::AuthUser,
    models::User,
    response::ApiResponse,
    routes::params::Pagination,
    services::{
        toggle_service::{self, RelationKind, Toggled},
        user_service,
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/me", get(me))
        .route("/me/avatar", put(set_avatar).delete(delete_avatar))
        .route("/subscriptions", get(list_subscriptions))
        .route("/{id}", get(get_user))
        .route("/{id}/subscribe", post(subscribe).delete(unsubscribe))
}

#[utoipa::path(
    get,
    path = "/api/users",
    params(Pagination),
    responses(
        (status = 200, description = "List users", body = ApiResponse<UserList>)
    ),
    tag = "Users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    viewer: Option<AuthUser>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<UserList>>> {
    let resp = user_service::list_users(&state, viewer.as_ref(), pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User profile", body = ApiResponse<User>),
        (status = 404, description = "User not found")
    ),
    tag = "Users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    viewer: Option<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = user_service::get_user(&state, viewer.as_ref(), id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/users/me",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<User>),
        (status = 401, description = "Unauthenticated")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = user_service::me(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/users/me/avatar",
    request_body = AvatarRequest,
    responses(
        (status = 200, description = "Avatar updated", body = ApiResponse<AvatarResponse>),
        (status = 400, description = "Invalid image")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn set_avatar(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AvatarRequest>,
) -> AppResult<Json<ApiResponse<AvatarResponse>>> {
    let resp = user_service::set_avatar(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/users/me/avatar",
    responses(
        (status = 204, description = "Avatar removed")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn delete_avatar(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<StatusCode> {
    user_service::delete_avatar(&state, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/users/subscriptions",
    params(SubscriptionQuery),
    responses(
        (status = 200, description = "Followed authors with recipe previews", body = ApiResponse<SubscriptionList>),
        (status = 401, description = "Unauthenticated")
    ),
    security(("bearer_auth" = [])),
    tag = "Subscriptions"
)]
pub async fn list_subscriptions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<SubscriptionQuery>,
) -> AppResult<Json<ApiResponse<SubscriptionList>>> {
    let resp = user_service::list_subscriptions(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/users/{id}/subscribe",
    params(("id" = Uuid, Path, description = "Author ID")),
    responses(
        (status = 201, description = "Subscribed", body = ApiResponse<Toggled>),
        (status = 400, description = "Already subscribed or self-subscription"),
        (status = 404, description = "Author not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Subscriptions"
)]
pub async fn subscribe(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<ApiResponse<Toggled>>)> {
    let follow = toggle_service::add(&state, &user, id, RelationKind::Follow).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Subscribed", follow, None)),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/users/{id}/subscribe",
    params(("id" = Uuid, Path, description = "Author ID")),
    responses(
        (status = 204, description = "Unsubscribed"),
        (status = 400, description = "Self-subscription"),
        (status = 404, description = "Author or subscription not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Subscriptions"
)]
pub async fn unsubscribe(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    toggle_service::remove(&state, &user, id, RelationKind::Follow).await?;
    Ok(StatusCode::NO_CONTENT)
}
