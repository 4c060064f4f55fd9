use serde_json::Value;
use uuid::Uuid;

use crate::{db::DbPool, error::AppResult};

/// Mutating actions recorded in `audit_logs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    UserRegister,
    UserLogin,
    AvatarUpdate,
    AvatarDelete,
    RecipeCreate,
    RecipeUpdate,
    RecipeDelete,
    FavoriteAdd,
    FavoriteRemove,
    CartAdd,
    CartRemove,
    FollowAdd,
    FollowRemove,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::UserRegister => "user_register",
            AuditAction::UserLogin => "user_login",
            AuditAction::AvatarUpdate => "avatar_update",
            AuditAction::AvatarDelete => "avatar_delete",
            AuditAction::RecipeCreate => "recipe_create",
            AuditAction::RecipeUpdate => "recipe_update",
            AuditAction::RecipeDelete => "recipe_delete",
            AuditAction::FavoriteAdd => "favorite_add",
            AuditAction::FavoriteRemove => "favorite_remove",
            AuditAction::CartAdd => "cart_add",
            AuditAction::CartRemove => "cart_remove",
            AuditAction::FollowAdd => "follow_add",
            AuditAction::FollowRemove => "follow_remove",
        }
    }

    /// Table the action touched.
    pub fn resource(self) -> &'static str {
        match self {
            AuditAction::UserRegister
            | AuditAction::UserLogin
            | AuditAction::AvatarUpdate
            | AuditAction::AvatarDelete => "users",
            AuditAction::RecipeCreate | AuditAction::RecipeUpdate | AuditAction::RecipeDelete => {
                "recipes"
            }
            AuditAction::FavoriteAdd | AuditAction::FavoriteRemove => "favorites",
            AuditAction::CartAdd | AuditAction::CartRemove => "shopping_cart",
            AuditAction::FollowAdd | AuditAction::FollowRemove => "follows",
        }
    }
}

pub async fn log_audit(
    pool: &DbPool,
    user_id: Option<Uuid>,
    action: AuditAction,
    metadata: Option<Value>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, user_id, action, resource, metadata)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(action.as_str())
    .bind(action.resource())
    .bind(metadata)
    .execute(pool)
    .await?;

    Ok(())
}

/// Best-effort variant of [`log_audit`]: a failed insert is logged and never fails the request.
pub async fn record(pool: &DbPool, user_id: Uuid, action: AuditAction, metadata: Value) {
    if let Err(err) = log_audit(pool, Some(user_id), action, Some(metadata)).await {
        tracing::warn!(error = %err, action = action.as_str(), "audit log failed");
    }
}

#[cfg(test)]
mod tests {
    use super::AuditAction;

    #[test]
    fn toggle_actions_point_at_their_tables() {
        assert_eq!(AuditAction::FavoriteAdd.resource(), "favorites");
        assert_eq!(AuditAction::CartRemove.resource(), "shopping_cart");
        assert_eq!(AuditAction::FollowAdd.as_str(), "follow_add");
    }
}
