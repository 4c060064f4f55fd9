pub mod audit_logs;
pub mod favorites;
pub mod follows;
pub mod ingredients;
pub mod recipe_ingredients;
pub mod recipes;
pub mod shopping_cart;
pub mod users;

pub use audit_logs::Entity as AuditLogs;
pub use favorites::Entity as Favorites;
pub use follows::Entity as Follows;
pub use ingredients::Entity as Ingredients;
pub use recipe_ingredients::Entity as RecipeIngredients;
pub use recipes::Entity as Recipes;
pub use shopping_cart::Entity as ShoppingCart;
pub use users::Entity as Users;
