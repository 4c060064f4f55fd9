use std::collections::HashSet;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction},
    dto::users::{AvatarRequest, AvatarResponse, SubscriptionList, SubscriptionQuery, UserList},
    entity::{
        follows::{Column as FollowCol, Entity as Follows},
        recipes::{Column as RecipeCol, Entity as Recipes},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult},
    media::{self, AVATARS_DIR},
    middleware::auth::AuthUser,
    models::{SubscribedAuthor, User},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::recipe_service::short_recipe_from_entity,
    state::AppState,
};

pub fn user_from_entity(model: UserModel, is_subscribed: bool) -> User {
    User {
        id: model.id,
        email: model.email,
        username: model.username,
        first_name: model.first_name,
        last_name: model.last_name,
        avatar: model.avatar.as_deref().map(media::media_url),
        is_subscribed,
    }
}

async fn subscribed_to(
    state: &AppState,
    viewer: Option<&AuthUser>,
    author_ids: Vec<Uuid>,
) -> AppResult<HashSet<Uuid>> {
    let Some(viewer) = viewer else {
        return Ok(HashSet::new());
    };
    let ids = Follows::find()
        .filter(FollowCol::FollowerId.eq(viewer.user_id))
        .filter(FollowCol::AuthorId.is_in(author_ids))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|f| f.author_id)
        .collect();
    Ok(ids)
}

pub async fn list_users(
    state: &AppState,
    viewer: Option<&AuthUser>,
    pagination: Pagination,
) -> AppResult<ApiResponse<UserList>> {
    let (page, limit, offset) = pagination.normalize();
    let finder = Users::find().order_by_asc(UserCol::Email);
    let total = finder.clone().count(&state.orm).await? as i64;

    let models = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;
    let subscribed = subscribed_to(state, viewer, models.iter().map(|u| u.id).collect()).await?;
    let items = models
        .into_iter()
        .map(|u| {
            let is_subscribed = subscribed.contains(&u.id);
            user_from_entity(u, is_subscribed)
        })
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Users", UserList { items }, Some(meta)))
}

pub async fn get_user(
    state: &AppState,
    viewer: Option<&AuthUser>,
    id: Uuid,
) -> AppResult<ApiResponse<User>> {
    let user = Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let is_subscribed = subscribed_to(state, viewer, vec![user.id])
        .await?
        .contains(&user.id);
    Ok(ApiResponse::success(
        "User",
        user_from_entity(user, is_subscribed),
        None,
    ))
}

pub async fn me(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let model = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Unauthenticated("User no longer exists".into()))?;
    Ok(ApiResponse::success("Me", user_from_entity(model, false), None))
}

pub async fn set_avatar(
    state: &AppState,
    user: &AuthUser,
    payload: AvatarRequest,
) -> AppResult<ApiResponse<AvatarResponse>> {
    let existing = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Unauthenticated("User no longer exists".into()))?;

    let path = media::save_image(&state.config.media_root, AVATARS_DIR, &payload.avatar).await?;
    let old = existing.avatar.clone();

    let mut active: UserActive = existing.into();
    active.avatar = Set(Some(path.clone()));
    if let Err(err) = active.update(&state.orm).await {
        media::remove_image(&state.config.media_root, &path).await;
        return Err(err.into());
    }
    if let Some(old) = old {
        media::remove_image(&state.config.media_root, &old).await;
    }

    audit::record(
        &state.pool,
        user.user_id,
        AuditAction::AvatarUpdate,
        serde_json::json!({ "avatar": path }),
    )
    .await;

    Ok(ApiResponse::success(
        "Avatar updated",
        AvatarResponse {
            avatar: Some(media::media_url(&path)),
        },
        Some(Meta::empty()),
    ))
}

/// Clearing an absent avatar is a no-op.
pub async fn delete_avatar(state: &AppState, user: &AuthUser) -> AppResult<()> {
    let existing = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Unauthenticated("User no longer exists".into()))?;

    let Some(old) = existing.avatar.clone() else {
        return Ok(());
    };

    let mut active: UserActive = existing.into();
    active.avatar = Set(None);
    active.update(&state.orm).await?;
    media::remove_image(&state.config.media_root, &old).await;

    audit::record(
        &state.pool,
        user.user_id,
        AuditAction::AvatarDelete,
        serde_json::json!({ "avatar": old }),
    )
    .await;
    Ok(())
}

/// Authors the user follows, each with a preview of their newest recipes.
pub async fn list_subscriptions(
    state: &AppState,
    user: &AuthUser,
    query: SubscriptionQuery,
) -> AppResult<ApiResponse<SubscriptionList>> {
    let (page, limit, offset) = query.pagination().normalize();

    let finder = Follows::find()
        .filter(FollowCol::FollowerId.eq(user.user_id))
        .order_by_desc(FollowCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;

    let edges = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let mut items = Vec::with_capacity(edges.len());
    for edge in edges {
        let Some(author) = Users::find_by_id(edge.author_id).one(&state.orm).await? else {
            continue;
        };

        let recipes_finder = Recipes::find()
            .filter(RecipeCol::AuthorId.eq(author.id))
            .order_by_desc(RecipeCol::CreatedAt);
        let recipes_count = recipes_finder.clone().count(&state.orm).await? as i64;
        let recipes_finder = match query.recipes_limit {
            Some(n) => recipes_finder.limit(n),
            None => recipes_finder,
        };
        let recipes = recipes_finder
            .all(&state.orm)
            .await?
            .into_iter()
            .map(short_recipe_from_entity)
            .collect();

        items.push(SubscribedAuthor {
            user: user_from_entity(author, true),
            recipes,
            recipes_count,
        });
    }

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Subscriptions",
        SubscriptionList { items },
        Some(meta),
    ))
}
