use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{models::Recipe, routes::params::Pagination};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct IngredientAmountRequest {
    pub id: Uuid,
    pub amount: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRecipeRequest {
    pub ingredients: Vec<IngredientAmountRequest>,
    /// `data:image/<ext>;base64,<payload>`
    pub image: String,
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
}

/// The ingredient list is always replaced wholesale; other fields are optional.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRecipeRequest {
    pub ingredients: Vec<IngredientAmountRequest>,
    pub image: Option<String>,
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
}

#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
pub struct RecipeQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub author: Option<Uuid>,
    pub is_favorited: Option<u8>,
    pub is_in_shopping_cart: Option<u8>,
}

impl RecipeQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct RecipeList {
    #[schema(value_type = Vec<Recipe>)]
    pub items: Vec<Recipe>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShortLinkResponse {
    #[serde(rename = "short-link")]
    pub short_link: String,
}
