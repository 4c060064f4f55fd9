use sea_orm::{
    EntityTrait, QueryFilter, QueryOrder,
    sea_query::{Expr, extension::postgres::PgExpr},
};
use uuid::Uuid;

use crate::{
    dto::ingredients::{IngredientList, IngredientQuery},
    entity::ingredients::{Column, Entity as Ingredients, Model as IngredientModel},
    error::{AppError, AppResult},
    models::Ingredient,
    response::ApiResponse,
    state::AppState,
};

pub fn ingredient_from_entity(model: IngredientModel) -> Ingredient {
    Ingredient {
        id: model.id,
        name: model.name,
        measurement_unit: model.measurement_unit,
    }
}

/// `LIKE` pattern matching names that start with `prefix`; wildcards in the input are literal.
pub fn prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Unpaginated; all ingredients when no prefix is given.
pub async fn search_ingredients(
    state: &AppState,
    query: IngredientQuery,
) -> AppResult<ApiResponse<IngredientList>> {
    let mut finder = Ingredients::find();
    if let Some(prefix) = query.name.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        finder = finder.filter(Expr::col(Column::Name).ilike(prefix_pattern(prefix)));
    }

    let items = finder
        .order_by_asc(Column::Name)
        .order_by_asc(Column::MeasurementUnit)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(ingredient_from_entity)
        .collect();

    Ok(ApiResponse::success("Ingredients", IngredientList { items }, None))
}

pub async fn get_ingredient(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Ingredient>> {
    let ingredient = Ingredients::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success(
        "Ingredient",
        ingredient_from_entity(ingredient),
        None,
    ))
}

#[cfg(test)]
mod tests {
    use super::prefix_pattern;

    #[test]
    fn escapes_like_wildcards() {
        assert_eq!(prefix_pattern("sug"), "sug%");
        assert_eq!(prefix_pattern("50%_"), "50\\%\\_%");
        assert_eq!(prefix_pattern(""), "%");
    }
}
