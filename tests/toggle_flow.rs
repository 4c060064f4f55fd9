use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use foodgram_api::{
    config::AppConfig,
    db::{create_pool, run_migrations},
    dto::recipes::{CreateRecipeRequest, IngredientAmountRequest, UpdateRecipeRequest},
    entity::{
        ingredients::ActiveModel as IngredientActive,
        recipe_ingredients::ActiveModel as RecipeIngredientActive,
        recipes::ActiveModel as RecipeActive, users::ActiveModel as UserActive,
    },
    error::AppError,
    middleware::auth::AuthUser,
    routes::create_app,
    services::{
        auth_service::issue_token,
        recipe_service, shopping_list_service,
        toggle_service::{self, RelationKind, Toggled},
    },
    state::AppState,
};
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, Set};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "test-secret";

// Skips when no database is configured in the environment.
async fn setup_state() -> anyhow::Result<Option<AppState>> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run toggle flow tests.");
            return Ok(None);
        }
    };

    let pool = create_pool(&database_url).await?;
    run_migrations(&pool).await?;
    let config = AppConfig {
        database_url,
        host: "127.0.0.1".into(),
        port: 0,
        jwt_secret: SECRET.into(),
        jwt_ttl_hours: 1,
        media_root: std::env::temp_dir().join(format!("foodgram-{}", Uuid::new_v4())),
        public_base_url: "http://localhost:3000".into(),
        body_limit_bytes: 1024 * 1024,
    };
    Ok(Some(AppState::new(pool, config)))
}

fn tag() -> String {
    Uuid::new_v4().simple().to_string()
}

async fn create_user(state: &AppState, name: &str) -> anyhow::Result<AuthUser> {
    let username = format!("{name}{}", &tag()[..12]);
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(format!("{username}@example.com")),
        username: Set(username.clone()),
        first_name: Set(None),
        last_name: Set(None),
        avatar: Set(None),
        password_hash: Set("dummy".into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(AuthUser {
        user_id: user.id,
        username,
    })
}

async fn create_ingredient(state: &AppState, name: &str, unit: &str) -> anyhow::Result<Uuid> {
    let ingredient = IngredientActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.into()),
        measurement_unit: Set(unit.into()),
    }
    .insert(&state.orm)
    .await?;
    Ok(ingredient.id)
}

async fn create_recipe(
    state: &AppState,
    author: &AuthUser,
    name: &str,
    ingredients: &[(Uuid, i32)],
) -> anyhow::Result<Uuid> {
    let recipe = RecipeActive {
        id: Set(Uuid::new_v4()),
        author_id: Set(author.user_id),
        name: Set(name.into()),
        text: Set("Mix and bake".into()),
        image: Set(None),
        cooking_time: Set(10),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    for (ingredient_id, amount) in ingredients {
        RecipeIngredientActive {
            id: Set(Uuid::new_v4()),
            recipe_id: Set(recipe.id),
            ingredient_id: Set(*ingredient_id),
            amount: Set(*amount),
        }
        .insert(&state.orm)
        .await?;
    }
    Ok(recipe.id)
}

#[tokio::test]
async fn favorite_add_twice_then_remove_twice() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let author = create_user(&state, "author").await?;
    let user = create_user(&state, "fan").await?;
    let recipe_id = create_recipe(&state, &author, "Pancakes", &[]).await?;

    let added = toggle_service::add(&state, &user, recipe_id, RelationKind::Favorite).await?;
    match added {
        Toggled::Recipe(recipe) => assert_eq!(recipe.id, recipe_id),
        other => panic!("unexpected toggle result: {other:?}"),
    }

    let again = toggle_service::add(&state, &user, recipe_id, RelationKind::Favorite).await;
    assert!(matches!(again, Err(AppError::AlreadyExists(_))));

    toggle_service::remove(&state, &user, recipe_id, RelationKind::Favorite).await?;
    let missing = toggle_service::remove(&state, &user, recipe_id, RelationKind::Favorite).await;
    assert!(matches!(missing, Err(AppError::NotFound)));

    // Removing leaves the relation addable again.
    toggle_service::add(&state, &user, recipe_id, RelationKind::Favorite).await?;
    Ok(())
}

#[tokio::test]
async fn toggles_on_missing_targets_are_not_found() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let user = create_user(&state, "ghost").await?;
    let missing = Uuid::new_v4();

    for kind in [RelationKind::Favorite, RelationKind::Cart, RelationKind::Follow] {
        let result = toggle_service::add(&state, &user, missing, kind).await;
        assert!(matches!(result, Err(AppError::NotFound)), "{kind:?}");
    }
    Ok(())
}

#[tokio::test]
async fn follow_rejects_self_and_reports_usernames() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let follower = create_user(&state, "reader").await?;
    let author = create_user(&state, "writer").await?;

    let own = toggle_service::add(&state, &follower, follower.user_id, RelationKind::Follow).await;
    assert!(matches!(own, Err(AppError::SelfRelation(_))));
    let own = toggle_service::remove(&state, &follower, follower.user_id, RelationKind::Follow).await;
    assert!(matches!(own, Err(AppError::SelfRelation(_))));

    match toggle_service::add(&state, &follower, author.user_id, RelationKind::Follow).await? {
        Toggled::Follow(summary) => {
            assert_eq!(summary.user, follower.username);
            assert_eq!(summary.author, author.username);
        }
        other => panic!("unexpected toggle result: {other:?}"),
    }
    let duplicate = toggle_service::add(&state, &follower, author.user_id, RelationKind::Follow).await;
    assert!(matches!(duplicate, Err(AppError::AlreadyExists(_))));
    Ok(())
}

#[tokio::test]
async fn concurrent_cart_adds_resolve_to_one_winner() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let author = create_user(&state, "chef").await?;
    let user = create_user(&state, "buyer").await?;
    let recipe_id = create_recipe(&state, &author, "Soup", &[]).await?;

    let (first, second) = tokio::join!(
        toggle_service::add(&state, &user, recipe_id, RelationKind::Cart),
        toggle_service::add(&state, &user, recipe_id, RelationKind::Cart),
    );
    let results = [first, second];
    let wins = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::AlreadyExists(_))))
        .count();
    assert_eq!(wins, 1);
    assert_eq!(duplicates, 1);
    Ok(())
}

#[tokio::test]
async fn shopping_list_sums_cart_ingredients() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let author = create_user(&state, "baker").await?;
    let user = create_user(&state, "shopper").await?;
    let suffix = tag();
    let flour = create_ingredient(&state, &format!("flour {suffix}"), "g").await?;
    let eggs = create_ingredient(&state, &format!("eggs {suffix}"), "pcs").await?;

    let bread = create_recipe(&state, &author, "Bread", &[(flour, 500)]).await?;
    let cake = create_recipe(&state, &author, "Cake", &[(flour, 200), (eggs, 3)]).await?;
    let salad = create_recipe(&state, &author, "Salad", &[]).await?;

    for id in [bread, cake, salad] {
        toggle_service::add(&state, &user, id, RelationKind::Cart).await?;
    }

    let list = shopping_list_service::load_shopping_list(&state.pool, &user).await?;
    let items = list.items();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].name, format!("eggs {suffix}"));
    assert_eq!(items[0].amount, 3);
    assert_eq!(items[1].name, format!("flour {suffix}"));
    assert_eq!(items[1].amount, 700);
    assert_eq!(list.recipe_titles(), vec!["Bread", "Cake", "Salad"]);

    let report = shopping_list_service::export_shopping_list(&state, &user).await?;
    assert!(report.contains("— 700"));

    // Removing a recipe from the cart drops its contribution.
    toggle_service::remove(&state, &user, cake, RelationKind::Cart).await?;
    let list = shopping_list_service::load_shopping_list(&state.pool, &user).await?;
    assert_eq!(list.items().len(), 1);
    assert_eq!(list.items()[0].amount, 500);
    Ok(())
}

#[tokio::test]
async fn empty_cart_exports_headers_only() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let user = create_user(&state, "idle").await?;
    let report = shopping_list_service::export_shopping_list(&state, &user).await?;
    assert!(report.starts_with("Shopping list for "));
    assert!(report.contains("Products:"));
    assert!(report.ends_with("Recipes that need these products:"));
    Ok(())
}

#[tokio::test]
async fn recipe_lifecycle_respects_authorship() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let author = create_user(&state, "owner").await?;
    let other = create_user(&state, "other").await?;
    let salt = create_ingredient(&state, &format!("salt {}", tag()), "g").await?;

    let created = recipe_service::create_recipe(
        &state,
        &author,
        CreateRecipeRequest {
            ingredients: vec![IngredientAmountRequest { id: salt, amount: 5 }],
            image: "data:image/png;base64,iVBORw0KGgo=".into(),
            name: "Brine".into(),
            text: "Dissolve salt".into(),
            cooking_time: 1,
        },
    )
    .await?;
    let recipe = created.data.expect("recipe");
    assert_eq!(recipe.ingredients.len(), 1);
    assert_eq!(recipe.ingredients[0].amount, 5);

    let forbidden = recipe_service::delete_recipe(&state, &other, recipe.id).await;
    assert!(matches!(forbidden, Err(AppError::Forbidden)));

    toggle_service::add(&state, &other, recipe.id, RelationKind::Favorite).await?;
    recipe_service::delete_recipe(&state, &author, recipe.id).await?;

    // Memberships go with the recipe.
    let gone = toggle_service::remove(&state, &other, recipe.id, RelationKind::Favorite).await;
    assert!(matches!(gone, Err(AppError::NotFound)));
    Ok(())
}

#[tokio::test]
async fn patch_replaces_the_ingredient_list() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let author = create_user(&state, "editor").await?;
    let suffix = tag();
    let milk = create_ingredient(&state, &format!("milk {suffix}"), "ml").await?;
    let oats = create_ingredient(&state, &format!("oats {suffix}"), "g").await?;
    let honey = create_ingredient(&state, &format!("honey {suffix}"), "g").await?;

    let created = recipe_service::create_recipe(
        &state,
        &author,
        CreateRecipeRequest {
            ingredients: vec![
                IngredientAmountRequest { id: milk, amount: 200 },
                IngredientAmountRequest { id: oats, amount: 50 },
            ],
            image: "data:image/png;base64,iVBORw0KGgo=".into(),
            name: "Porridge".into(),
            text: "Simmer oats in milk".into(),
            cooking_time: 10,
        },
    )
    .await?;
    let recipe = created.data.expect("recipe");
    assert_eq!(recipe.ingredients.len(), 2);

    let updated = recipe_service::update_recipe(
        &state,
        &author,
        recipe.id,
        UpdateRecipeRequest {
            ingredients: vec![IngredientAmountRequest { id: honey, amount: 15 }],
            image: None,
            name: None,
            text: None,
            cooking_time: None,
        },
    )
    .await?;
    let updated = updated.data.expect("recipe");
    assert_eq!(updated.name, "Porridge");
    assert_eq!(updated.ingredients.len(), 1);
    assert_eq!(updated.ingredients[0].id, honey);
    assert_eq!(updated.ingredients[0].amount, 15);

    toggle_service::add(&state, &author, recipe.id, RelationKind::Cart).await?;
    let list = shopping_list_service::load_shopping_list(&state.pool, &author).await?;
    let items = list.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, format!("honey {suffix}"));
    assert_eq!(items[0].amount, 15);
    Ok(())
}

#[tokio::test]
async fn download_serves_a_text_attachment() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let author = create_user(&state, "cook").await?;
    let user = create_user(&state, "downloader").await?;
    let rice = create_ingredient(&state, &format!("rice {}", tag()), "g").await?;
    let recipe_id = create_recipe(&state, &author, "Pilaf", &[(rice, 300)]).await?;
    toggle_service::add(&state, &user, recipe_id, RelationKind::Cart).await?;

    let token = issue_token(user.user_id, &user.username, SECRET, 1)?;
    let response = create_app(state.clone())
        .oneshot(
            Request::get("/api/recipes/download_shopping_cart")
                .header(header::AUTHORIZATION, format!("Token {token}"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"shopping_cart.txt\""
    );

    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let report = String::from_utf8(bytes.to_vec())?;
    let first_line = report.lines().next().unwrap_or_default();
    assert!(first_line.starts_with("Shopping list for "));
    assert!(first_line.ends_with(':'));
    assert!(report.contains("— 300"));
    assert!(report.ends_with("1. Pilaf"));
    Ok(())
}
