use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        ingredients::{IngredientList, IngredientQuery},
        recipes::{
            CreateRecipeRequest, IngredientAmountRequest, RecipeList, RecipeQuery,
            ShortLinkResponse, UpdateRecipeRequest,
        },
        users::{AvatarRequest, AvatarResponse, SubscriptionList, SubscriptionQuery, UserList},
    },
    models::{FollowSummary, Ingredient, Recipe, RecipeIngredient, ShortRecipe, SubscribedAuthor, User},
    response::{ApiResponse, Meta},
    routes::{auth, health, ingredients, params, recipes, short_link, users},
    services::toggle_service::Toggled,
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        users::list_users,
        users::get_user,
        users::me,
        users::set_avatar,
        users::delete_avatar,
        users::list_subscriptions,
        users::subscribe,
        users::unsubscribe,
        recipes::list_recipes,
        recipes::create_recipe,
        recipes::get_recipe,
        recipes::update_recipe,
        recipes::delete_recipe,
        recipes::add_favorite,
        recipes::remove_favorite,
        recipes::add_to_shopping_cart,
        recipes::remove_from_shopping_cart,
        recipes::download_shopping_cart,
        recipes::get_link,
        short_link::follow_short_link,
        ingredients::list_ingredients,
        ingredients::get_ingredient
    ),
    components(
        schemas(
            User,
            Ingredient,
            Recipe,
            RecipeIngredient,
            ShortRecipe,
            FollowSummary,
            SubscribedAuthor,
            Toggled,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            AvatarRequest,
            AvatarResponse,
            CreateRecipeRequest,
            UpdateRecipeRequest,
            IngredientAmountRequest,
            ShortLinkResponse,
            RecipeList,
            UserList,
            SubscriptionList,
            IngredientList,
            params::Pagination,
            RecipeQuery,
            SubscriptionQuery,
            IngredientQuery,
            health::HealthData,
            Meta,
            ApiResponse<Recipe>,
            ApiResponse<RecipeList>,
            ApiResponse<User>,
            ApiResponse<UserList>,
            ApiResponse<SubscriptionList>,
            ApiResponse<Toggled>,
            ApiResponse<IngredientList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration and token endpoints"),
        (name = "Users", description = "User profile endpoints"),
        (name = "Subscriptions", description = "Author subscription endpoints"),
        (name = "Recipes", description = "Recipe endpoints"),
        (name = "Favorites", description = "Favorite endpoints"),
        (name = "Cart", description = "Shopping cart endpoints"),
        (name = "Ingredients", description = "Ingredient lookup endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
