use std::collections::{HashMap, HashSet};

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
    sea_query::Query,
};
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction},
    dto::recipes::{
        CreateRecipeRequest, IngredientAmountRequest, RecipeList, RecipeQuery, ShortLinkResponse,
        UpdateRecipeRequest,
    },
    entity::{
        favorites::{Column as FavCol, Entity as Favorites},
        follows::{Column as FollowCol, Entity as Follows},
        ingredients::{Column as IngredientCol, Entity as Ingredients},
        recipe_ingredients::{
            ActiveModel as RecipeIngredientActive, Column as RecipeIngredientCol,
            Entity as RecipeIngredients,
        },
        recipes::{ActiveModel as RecipeActive, Column as RecipeCol, Entity as Recipes, Model as RecipeModel},
        shopping_cart::{Column as CartCol, Entity as ShoppingCart},
        users::{Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    media::{self, RECIPE_IMAGES_DIR},
    middleware::auth::AuthUser,
    models::{Recipe, RecipeIngredient, ShortRecipe},
    response::{ApiResponse, Meta},
    services::user_service::user_from_entity,
    state::AppState,
};

const MAX_RECIPE_NAME_LEN: usize = 256;

pub fn short_recipe_from_entity(model: RecipeModel) -> ShortRecipe {
    ShortRecipe {
        id: model.id,
        name: model.name,
        image: model.image.as_deref().map(media::media_url),
        cooking_time: model.cooking_time,
    }
}

pub fn validate_recipe_fields(
    name: Option<&str>,
    text: Option<&str>,
    cooking_time: Option<i32>,
    ingredients: &[IngredientAmountRequest],
) -> AppResult<()> {
    if let Some(name) = name {
        if name.trim().is_empty() {
            return Err(AppError::Validation("name must not be empty".into()));
        }
        if name.chars().count() > MAX_RECIPE_NAME_LEN {
            return Err(AppError::Validation(format!(
                "name must be at most {MAX_RECIPE_NAME_LEN} characters"
            )));
        }
    }
    if let Some(text) = text {
        if text.trim().is_empty() {
            return Err(AppError::Validation("text must not be empty".into()));
        }
    }
    if let Some(cooking_time) = cooking_time {
        if cooking_time < 1 {
            return Err(AppError::Validation(
                "cooking_time must be at least 1".into(),
            ));
        }
    }
    if ingredients.is_empty() {
        return Err(AppError::Validation(
            "recipe must contain at least one ingredient".into(),
        ));
    }
    let mut seen = HashSet::new();
    for item in ingredients {
        if item.amount < 1 {
            return Err(AppError::Validation(
                "ingredient amount must be at least 1".into(),
            ));
        }
        if !seen.insert(item.id) {
            return Err(AppError::Validation(format!(
                "ingredient {} is listed more than once",
                item.id
            )));
        }
    }
    Ok(())
}

async fn ensure_ingredients_exist(
    state: &AppState,
    ingredients: &[IngredientAmountRequest],
) -> AppResult<()> {
    let ids: Vec<Uuid> = ingredients.iter().map(|i| i.id).collect();
    let found = Ingredients::find()
        .filter(IngredientCol::Id.is_in(ids.clone()))
        .count(&state.orm)
        .await?;
    if found as usize != ids.len() {
        return Err(AppError::Validation("Unknown ingredient id".into()));
    }
    Ok(())
}

async fn insert_recipe_ingredients(
    txn: &DatabaseTransaction,
    recipe_id: Uuid,
    ingredients: &[IngredientAmountRequest],
) -> AppResult<()> {
    let rows = ingredients.iter().map(|item| RecipeIngredientActive {
        id: Set(Uuid::new_v4()),
        recipe_id: Set(recipe_id),
        ingredient_id: Set(item.id),
        amount: Set(item.amount),
    });
    RecipeIngredients::insert_many(rows).exec(txn).await?;
    Ok(())
}

/// Build full recipe views in a handful of batched queries instead of one round-trip per recipe.
async fn recipe_views(
    state: &AppState,
    viewer: Option<&AuthUser>,
    models: Vec<RecipeModel>,
) -> AppResult<Vec<Recipe>> {
    if models.is_empty() {
        return Ok(Vec::new());
    }
    let recipe_ids: Vec<Uuid> = models.iter().map(|m| m.id).collect();
    let author_ids: Vec<Uuid> = models
        .iter()
        .map(|m| m.author_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let authors: HashMap<Uuid, _> = Users::find()
        .filter(UserCol::Id.is_in(author_ids.clone()))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let mut ingredients: HashMap<Uuid, Vec<RecipeIngredient>> = HashMap::new();
    let rows = RecipeIngredients::find()
        .filter(RecipeIngredientCol::RecipeId.is_in(recipe_ids.clone()))
        .find_also_related(Ingredients)
        .order_by_asc(IngredientCol::Name)
        .all(&state.orm)
        .await?;
    for (link, ingredient) in rows {
        if let Some(ingredient) = ingredient {
            ingredients
                .entry(link.recipe_id)
                .or_default()
                .push(RecipeIngredient {
                    id: ingredient.id,
                    name: ingredient.name,
                    measurement_unit: ingredient.measurement_unit,
                    amount: link.amount,
                });
        }
    }

    let (favorited, in_cart, subscribed) = match viewer {
        Some(viewer) => {
            let favorited: HashSet<Uuid> = Favorites::find()
                .filter(FavCol::UserId.eq(viewer.user_id))
                .filter(FavCol::RecipeId.is_in(recipe_ids.clone()))
                .all(&state.orm)
                .await?
                .into_iter()
                .map(|f| f.recipe_id)
                .collect();
            let in_cart: HashSet<Uuid> = ShoppingCart::find()
                .filter(CartCol::UserId.eq(viewer.user_id))
                .filter(CartCol::RecipeId.is_in(recipe_ids.clone()))
                .all(&state.orm)
                .await?
                .into_iter()
                .map(|c| c.recipe_id)
                .collect();
            let subscribed: HashSet<Uuid> = Follows::find()
                .filter(FollowCol::FollowerId.eq(viewer.user_id))
                .filter(FollowCol::AuthorId.is_in(author_ids))
                .all(&state.orm)
                .await?
                .into_iter()
                .map(|f| f.author_id)
                .collect();
            (favorited, in_cart, subscribed)
        }
        None => Default::default(),
    };

    models
        .into_iter()
        .map(|model| {
            let author = authors
                .get(&model.author_id)
                .cloned()
                .ok_or_else(|| AppError::Internal(anyhow::anyhow!("recipe author missing")))?;
            Ok(Recipe {
                id: model.id,
                author: user_from_entity(author, subscribed.contains(&model.author_id)),
                ingredients: ingredients.remove(&model.id).unwrap_or_default(),
                is_favorited: favorited.contains(&model.id),
                is_in_shopping_cart: in_cart.contains(&model.id),
                name: model.name,
                text: model.text,
                image: model.image.as_deref().map(media::media_url),
                cooking_time: model.cooking_time,
                created_at: model.created_at.with_timezone(&Utc),
            })
        })
        .collect()
}

async fn recipe_view(
    state: &AppState,
    viewer: Option<&AuthUser>,
    model: RecipeModel,
) -> AppResult<Recipe> {
    recipe_views(state, viewer, vec![model])
        .await?
        .pop()
        .ok_or(AppError::NotFound)
}

async fn find_owned_recipe(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<RecipeModel> {
    let recipe = Recipes::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    if recipe.author_id != user.user_id {
        return Err(AppError::Forbidden);
    }
    Ok(recipe)
}

pub async fn list_recipes(
    state: &AppState,
    viewer: Option<&AuthUser>,
    query: RecipeQuery,
) -> AppResult<ApiResponse<RecipeList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();

    if let Some(author) = query.author {
        condition = condition.add(RecipeCol::AuthorId.eq(author));
    }

    // Membership filters only make sense for a logged-in viewer and are ignored otherwise.
    if let Some(viewer) = viewer {
        if query.is_favorited == Some(1) {
            condition = condition.add(
                RecipeCol::Id.in_subquery(
                    Query::select()
                        .column(FavCol::RecipeId)
                        .from(Favorites)
                        .and_where(FavCol::UserId.eq(viewer.user_id))
                        .to_owned(),
                ),
            );
        }
        if query.is_in_shopping_cart == Some(1) {
            condition = condition.add(
                RecipeCol::Id.in_subquery(
                    Query::select()
                        .column(CartCol::RecipeId)
                        .from(ShoppingCart)
                        .and_where(CartCol::UserId.eq(viewer.user_id))
                        .to_owned(),
                ),
            );
        }
    }

    let finder = Recipes::find()
        .filter(condition)
        .order_by_desc(RecipeCol::CreatedAt)
        .order_by_asc(RecipeCol::Id);

    let total = finder.clone().count(&state.orm).await? as i64;

    let models = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;
    let items = recipe_views(state, viewer, models).await?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Recipes", RecipeList { items }, Some(meta)))
}

pub async fn get_recipe(
    state: &AppState,
    viewer: Option<&AuthUser>,
    id: Uuid,
) -> AppResult<ApiResponse<Recipe>> {
    let model = Recipes::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let recipe = recipe_view(state, viewer, model).await?;
    Ok(ApiResponse::success("Recipe", recipe, None))
}

pub async fn create_recipe(
    state: &AppState,
    user: &AuthUser,
    payload: CreateRecipeRequest,
) -> AppResult<ApiResponse<Recipe>> {
    validate_recipe_fields(
        Some(&payload.name),
        Some(&payload.text),
        Some(payload.cooking_time),
        &payload.ingredients,
    )?;
    ensure_ingredients_exist(state, &payload.ingredients).await?;

    let image = media::save_image(&state.config.media_root, RECIPE_IMAGES_DIR, &payload.image).await?;

    let created = async {
        let txn = state.orm.begin().await?;
        let recipe = RecipeActive {
            id: Set(Uuid::new_v4()),
            author_id: Set(user.user_id),
            name: Set(payload.name),
            text: Set(payload.text),
            image: Set(Some(image.clone())),
            cooking_time: Set(payload.cooking_time),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        insert_recipe_ingredients(&txn, recipe.id, &payload.ingredients).await?;
        txn.commit().await?;
        Ok::<_, AppError>(recipe)
    }
    .await;

    let recipe = match created {
        Ok(recipe) => recipe,
        Err(err) => {
            media::remove_image(&state.config.media_root, &image).await;
            return Err(err);
        }
    };

    audit::record(
        &state.pool,
        user.user_id,
        AuditAction::RecipeCreate,
        serde_json::json!({ "recipe_id": recipe.id }),
    )
    .await;

    let recipe = recipe_view(state, Some(user), recipe).await?;
    Ok(ApiResponse::success("Recipe created", recipe, Some(Meta::empty())))
}

/// Scalar fields are patched; the ingredient list is deleted and reinserted in the same
/// transaction, never diffed.
pub async fn update_recipe(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateRecipeRequest,
) -> AppResult<ApiResponse<Recipe>> {
    let existing = find_owned_recipe(state, user, id).await?;
    validate_recipe_fields(
        payload.name.as_deref(),
        payload.text.as_deref(),
        payload.cooking_time,
        &payload.ingredients,
    )?;
    ensure_ingredients_exist(state, &payload.ingredients).await?;

    let new_image = match payload.image.as_deref() {
        Some(data_uri) => {
            Some(media::save_image(&state.config.media_root, RECIPE_IMAGES_DIR, data_uri).await?)
        }
        None => None,
    };
    let old_image = existing.image.clone();

    let updated = async {
        let txn = state.orm.begin().await?;
        let mut active: RecipeActive = existing.into();
        if let Some(name) = payload.name {
            active.name = Set(name);
        }
        if let Some(text) = payload.text {
            active.text = Set(text);
        }
        if let Some(cooking_time) = payload.cooking_time {
            active.cooking_time = Set(cooking_time);
        }
        if let Some(image) = &new_image {
            active.image = Set(Some(image.clone()));
        }
        let recipe = active.update(&txn).await?;

        RecipeIngredients::delete_many()
            .filter(RecipeIngredientCol::RecipeId.eq(recipe.id))
            .exec(&txn)
            .await?;
        insert_recipe_ingredients(&txn, recipe.id, &payload.ingredients).await?;
        txn.commit().await?;
        Ok::<_, AppError>(recipe)
    }
    .await;

    let recipe = match updated {
        Ok(recipe) => recipe,
        Err(err) => {
            if let Some(image) = &new_image {
                media::remove_image(&state.config.media_root, image).await;
            }
            return Err(err);
        }
    };
    if let (Some(_), Some(old)) = (&new_image, &old_image) {
        media::remove_image(&state.config.media_root, old).await;
    }

    audit::record(
        &state.pool,
        user.user_id,
        AuditAction::RecipeUpdate,
        serde_json::json!({ "recipe_id": recipe.id }),
    )
    .await;

    let recipe = recipe_view(state, Some(user), recipe).await?;
    Ok(ApiResponse::success("Updated", recipe, Some(Meta::empty())))
}

pub async fn delete_recipe(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<()> {
    let existing = find_owned_recipe(state, user, id).await?;
    let result = Recipes::delete_by_id(existing.id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }
    if let Some(image) = &existing.image {
        media::remove_image(&state.config.media_root, image).await;
    }

    audit::record(
        &state.pool,
        user.user_id,
        AuditAction::RecipeDelete,
        serde_json::json!({ "recipe_id": id }),
    )
    .await;
    Ok(())
}

pub fn short_link(base_url: &str, id: Uuid) -> String {
    format!("{}/s/{}", base_url.trim_end_matches('/'), id)
}

pub async fn get_short_link(
    state: &AppState,
    id: Uuid,
) -> AppResult<ApiResponse<ShortLinkResponse>> {
    let exists = Recipes::find_by_id(id).one(&state.orm).await?.is_some();
    if !exists {
        return Err(AppError::NotFound);
    }
    Ok(ApiResponse::success(
        "Short link",
        ShortLinkResponse {
            short_link: short_link(&state.config.public_base_url, id),
        },
        None,
    ))
}

/// Resolve a short link to the recipe's frontend path.
pub async fn resolve_short_link(state: &AppState, id: Uuid) -> AppResult<String> {
    let recipe = Recipes::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(format!("/recipes/{}/", recipe.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(amount: i32) -> IngredientAmountRequest {
        IngredientAmountRequest {
            id: Uuid::new_v4(),
            amount,
        }
    }

    #[test]
    fn accepts_a_well_formed_recipe() {
        assert!(validate_recipe_fields(Some("Soup"), Some("Boil."), Some(30), &[item(1), item(5)]).is_ok());
    }

    #[test]
    fn rejects_zero_amount_and_cooking_time() {
        assert!(matches!(
            validate_recipe_fields(Some("Soup"), Some("Boil."), Some(30), &[item(0)]),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_recipe_fields(Some("Soup"), Some("Boil."), Some(0), &[item(1)]),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn rejects_duplicate_and_missing_ingredients() {
        let dup = item(2);
        assert!(matches!(
            validate_recipe_fields(None, None, None, &[dup.clone(), dup]),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_recipe_fields(None, None, None, &[]),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn rejects_blank_and_overlong_names() {
        assert!(validate_recipe_fields(Some("  "), None, None, &[item(1)]).is_err());
        let long = "x".repeat(MAX_RECIPE_NAME_LEN + 1);
        assert!(validate_recipe_fields(Some(&long), None, None, &[item(1)]).is_err());
    }

    #[test]
    fn short_link_joins_base_and_id() {
        let id = Uuid::nil();
        assert_eq!(
            short_link("http://localhost:3000/", id),
            "http://localhost:3000/s/00000000-0000-0000-0000-000000000000"
        );
    }
}
