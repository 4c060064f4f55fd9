//! Add/remove protocol shared by favorites, the shopping cart and author subscriptions.
//!
//! Adding never checks for an existing row first: the INSERT is issued directly and the
//! `(actor, target)` unique constraint decides the winner, so concurrent duplicate adds
//! resolve to one success and `AlreadyExists` for everyone else.

use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, DbErr, EntityTrait, QueryFilter, Set,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction},
    entity::{
        favorites::{ActiveModel as FavoriteActive, Column as FavCol, Entity as Favorites},
        follows::{ActiveModel as FollowActive, Column as FollowCol, Entity as Follows},
        recipes::Entity as Recipes,
        shopping_cart::{ActiveModel as CartActive, Column as CartCol, Entity as ShoppingCart},
        users::Entity as Users,
    },
    error::{AppError, AppResult, is_unique_violation},
    middleware::auth::AuthUser,
    models::{FollowSummary, ShortRecipe},
    services::recipe_service::short_recipe_from_entity,
    state::AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Favorite,
    Cart,
    Follow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleIntent {
    Add,
    Remove,
}

/// What a successful add hands back: the recipe card, or both usernames of a follow edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(untagged)]
pub enum Toggled {
    Recipe(ShortRecipe),
    Follow(FollowSummary),
}

impl RelationKind {
    pub fn table(self) -> &'static str {
        match self {
            RelationKind::Favorite => "favorites",
            RelationKind::Cart => "shopping_cart",
            RelationKind::Follow => "follows",
        }
    }

    pub fn forbids_self_relation(self) -> bool {
        matches!(self, RelationKind::Follow)
    }

    pub fn duplicate_message(self) -> &'static str {
        match self {
            RelationKind::Favorite => "Recipe is already in favorites",
            RelationKind::Cart => "Recipe is already in the shopping cart",
            RelationKind::Follow => "Already subscribed to this author",
        }
    }

    pub fn self_relation_message(self) -> &'static str {
        "You cannot subscribe to yourself"
    }

    pub fn audit_action(self, intent: ToggleIntent) -> AuditAction {
        match (self, intent) {
            (RelationKind::Favorite, ToggleIntent::Add) => AuditAction::FavoriteAdd,
            (RelationKind::Favorite, ToggleIntent::Remove) => AuditAction::FavoriteRemove,
            (RelationKind::Cart, ToggleIntent::Add) => AuditAction::CartAdd,
            (RelationKind::Cart, ToggleIntent::Remove) => AuditAction::CartRemove,
            (RelationKind::Follow, ToggleIntent::Add) => AuditAction::FollowAdd,
            (RelationKind::Follow, ToggleIntent::Remove) => AuditAction::FollowRemove,
        }
    }
}

/// Returns `Some` with the target's compact form on add and `None` on remove.
///
/// Errors: `NotFound` when the target does not exist or, on remove, when there was no row;
/// `SelfRelation` for a follow aimed at the actor; `AlreadyExists` for a duplicate add.
pub async fn toggle(
    state: &AppState,
    actor: &AuthUser,
    target_id: Uuid,
    kind: RelationKind,
    intent: ToggleIntent,
) -> AppResult<Option<Toggled>> {
    let target = load_target(state, actor, target_id, kind).await?;

    if kind.forbids_self_relation() && target_id == actor.user_id {
        return Err(AppError::SelfRelation(kind.self_relation_message().into()));
    }

    let outcome = match intent {
        ToggleIntent::Add => {
            insert_membership(state, actor.user_id, target_id, kind).await?;
            Some(target)
        }
        ToggleIntent::Remove => {
            let removed = delete_membership(state, actor.user_id, target_id, kind).await?;
            if removed == 0 {
                return Err(AppError::NotFound);
            }
            None
        }
    };

    tracing::debug!(
        relation = kind.table(),
        ?intent,
        user_id = %actor.user_id,
        target_id = %target_id,
        "relation toggled"
    );

    audit::record(
        &state.pool,
        actor.user_id,
        kind.audit_action(intent),
        serde_json::json!({ "target_id": target_id }),
    )
    .await;

    Ok(outcome)
}

pub async fn add(
    state: &AppState,
    actor: &AuthUser,
    target_id: Uuid,
    kind: RelationKind,
) -> AppResult<Toggled> {
    toggle(state, actor, target_id, kind, ToggleIntent::Add)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("add returned no target")))
}

pub async fn remove(
    state: &AppState,
    actor: &AuthUser,
    target_id: Uuid,
    kind: RelationKind,
) -> AppResult<()> {
    toggle(state, actor, target_id, kind, ToggleIntent::Remove)
        .await
        .map(|_| ())
}

async fn load_target(
    state: &AppState,
    actor: &AuthUser,
    target_id: Uuid,
    kind: RelationKind,
) -> AppResult<Toggled> {
    match kind {
        RelationKind::Favorite | RelationKind::Cart => {
            let recipe = Recipes::find_by_id(target_id)
                .one(&state.orm)
                .await?
                .ok_or(AppError::NotFound)?;
            Ok(Toggled::Recipe(short_recipe_from_entity(recipe)))
        }
        RelationKind::Follow => {
            let author = Users::find_by_id(target_id)
                .one(&state.orm)
                .await?
                .ok_or(AppError::NotFound)?;
            Ok(Toggled::Follow(FollowSummary {
                user: actor.username.clone(),
                author: author.username,
            }))
        }
    }
}

async fn insert_membership(
    state: &AppState,
    actor_id: Uuid,
    target_id: Uuid,
    kind: RelationKind,
) -> AppResult<()> {
    let id = Uuid::new_v4();
    let inserted: Result<(), DbErr> = match kind {
        RelationKind::Favorite => FavoriteActive {
            id: Set(id),
            user_id: Set(actor_id),
            recipe_id: Set(target_id),
            created_at: NotSet,
        }
        .insert(&state.orm)
        .await
        .map(|_| ()),
        RelationKind::Cart => CartActive {
            id: Set(id),
            user_id: Set(actor_id),
            recipe_id: Set(target_id),
            created_at: NotSet,
        }
        .insert(&state.orm)
        .await
        .map(|_| ()),
        RelationKind::Follow => FollowActive {
            id: Set(id),
            follower_id: Set(actor_id),
            author_id: Set(target_id),
            created_at: NotSet,
        }
        .insert(&state.orm)
        .await
        .map(|_| ()),
    };

    match inserted {
        Ok(()) => Ok(()),
        Err(err) if is_unique_violation(&err) => {
            Err(AppError::AlreadyExists(kind.duplicate_message().into()))
        }
        Err(err) => Err(err.into()),
    }
}

async fn delete_membership(
    state: &AppState,
    actor_id: Uuid,
    target_id: Uuid,
    kind: RelationKind,
) -> AppResult<u64> {
    let result = match kind {
        RelationKind::Favorite => {
            Favorites::delete_many()
                .filter(FavCol::UserId.eq(actor_id))
                .filter(FavCol::RecipeId.eq(target_id))
                .exec(&state.orm)
                .await?
        }
        RelationKind::Cart => {
            ShoppingCart::delete_many()
                .filter(CartCol::UserId.eq(actor_id))
                .filter(CartCol::RecipeId.eq(target_id))
                .exec(&state.orm)
                .await?
        }
        RelationKind::Follow => {
            Follows::delete_many()
                .filter(FollowCol::FollowerId.eq(actor_id))
                .filter(FollowCol::AuthorId.eq(target_id))
                .exec(&state.orm)
                .await?
        }
    };
    Ok(result.rows_affected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_follow_forbids_self_relation() {
        assert!(RelationKind::Follow.forbids_self_relation());
        assert!(!RelationKind::Favorite.forbids_self_relation());
        assert!(!RelationKind::Cart.forbids_self_relation());
    }

    #[test]
    fn duplicate_messages_name_the_relation() {
        assert!(RelationKind::Cart.duplicate_message().contains("shopping cart"));
        assert!(RelationKind::Favorite.duplicate_message().contains("favorites"));
    }

    #[test]
    fn audit_actions_follow_intent() {
        assert_eq!(
            RelationKind::Cart.audit_action(ToggleIntent::Add),
            AuditAction::CartAdd
        );
        assert_eq!(
            RelationKind::Follow.audit_action(ToggleIntent::Remove),
            AuditAction::FollowRemove
        );
    }

    #[test]
    fn toggled_serializes_without_tag() {
        let value = serde_json::to_value(Toggled::Follow(FollowSummary {
            user: "anna".into(),
            author: "boris".into(),
        }))
        .unwrap();
        assert_eq!(value, serde_json::json!({ "user": "anna", "author": "boris" }));
    }
}
