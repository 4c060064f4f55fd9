use axum::{
    Router,
    extract::{Path, State},
    response::Redirect,
    routing::get,
};
use uuid::Uuid;

use crate::{error::AppResult, services::recipe_service, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/s/{id}", get(follow_short_link))
}

#[utoipa::path(
    get,
    path = "/s/{id}",
    params(("id" = Uuid, Path, description = "Recipe ID")),
    responses(
        (status = 303, description = "Redirect to the recipe page"),
        (status = 404, description = "Recipe not found")
    ),
    tag = "Recipes"
)]
pub async fn follow_short_link(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Redirect> {
    let location = recipe_service::resolve_short_link(&state, id).await?;
    Ok(Redirect::to(&location))
}
