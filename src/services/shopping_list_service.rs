//! Shopping list export: sums ingredient amounts over every recipe in a user's cart.

use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
};

use chrono::{Local, NaiveDate};
use sqlx::FromRow;

use crate::{db::DbPool, error::AppResult, middleware::auth::AuthUser, state::AppState};

pub const FILE_NAME: &str = "shopping_cart.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingListItem {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

/// Totals keyed by the exact `(name, measurement_unit)` pair. Names are not case-folded and
/// units are never converted, so `flour (g)` and `flour (kg)` stay separate.
#[derive(Debug, Default, Clone)]
pub struct ShoppingList {
    totals: HashMap<(String, String), i64>,
    recipes: HashSet<String>,
}

fn case_insensitive(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// First character upper-cased, the rest lower-cased.
pub fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

impl ShoppingList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_recipe(&mut self, title: impl Into<String>) {
        self.recipes.insert(title.into());
    }

    pub fn add_ingredient(&mut self, name: &str, measurement_unit: &str, amount: i64) {
        *self
            .totals
            .entry((name.to_string(), measurement_unit.to_string()))
            .or_insert(0) += amount;
    }

    /// Items ordered by name ignoring case; ties fall back to exact name, then unit.
    pub fn items(&self) -> Vec<ShoppingListItem> {
        let mut items: Vec<ShoppingListItem> = self
            .totals
            .iter()
            .map(|((name, unit), amount)| ShoppingListItem {
                name: name.clone(),
                measurement_unit: unit.clone(),
                amount: *amount,
            })
            .collect();
        items.sort_by(|a, b| {
            case_insensitive(&a.name, &b.name)
                .then_with(|| a.measurement_unit.cmp(&b.measurement_unit))
        });
        items
    }

    pub fn recipe_titles(&self) -> Vec<&str> {
        let mut titles: Vec<&str> = self.recipes.iter().map(String::as_str).collect();
        titles.sort_by(|a, b| case_insensitive(a, b));
        titles
    }

    pub fn render(&self, date: NaiveDate) -> String {
        let mut lines = vec![
            format!("Shopping list for {}:", date.format("%d.%m.%Y")),
            "Products:".to_string(),
        ];

        for (idx, item) in self.items().iter().enumerate() {
            lines.push(format!(
                "{}. {} ({}) — {}",
                idx + 1,
                capitalize(&item.name),
                item.measurement_unit,
                item.amount
            ));
        }

        lines.push(String::new());
        lines.push("Recipes that need these products:".to_string());
        for (idx, title) in self.recipe_titles().iter().enumerate() {
            lines.push(format!("{}. {}", idx + 1, title));
        }

        lines.join("\n")
    }
}

#[derive(Debug, FromRow)]
struct CartIngredientRow {
    recipe_name: String,
    ingredient_name: Option<String>,
    measurement_unit: Option<String>,
    amount: Option<i32>,
}

/// One row per (cart recipe, ingredient); recipes without ingredients still yield a row.
pub async fn load_shopping_list(pool: &DbPool, user: &AuthUser) -> AppResult<ShoppingList> {
    let rows = sqlx::query_as::<_, CartIngredientRow>(
        r#"
        SELECT r.name AS recipe_name,
               i.name AS ingredient_name,
               i.measurement_unit,
               ri.amount
        FROM shopping_cart sc
        JOIN recipes r ON r.id = sc.recipe_id
        LEFT JOIN recipe_ingredients ri ON ri.recipe_id = r.id
        LEFT JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE sc.user_id = $1
        "#,
    )
    .bind(user.user_id)
    .fetch_all(pool)
    .await?;

    let mut list = ShoppingList::new();
    for row in rows {
        list.add_recipe(row.recipe_name);
        if let (Some(name), Some(unit), Some(amount)) =
            (row.ingredient_name, row.measurement_unit, row.amount)
        {
            list.add_ingredient(&name, &unit, i64::from(amount));
        }
    }
    Ok(list)
}

pub async fn export_shopping_list(state: &AppState, user: &AuthUser) -> AppResult<String> {
    let list = load_shopping_list(&state.pool, user).await?;
    tracing::debug!(
        user_id = %user.user_id,
        items = list.items().len(),
        recipes = list.recipe_titles().len(),
        "shopping list exported"
    );
    Ok(list.render(Local::now().date_naive()))
}
