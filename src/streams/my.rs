use axum::{Json, debug_handler, extract::State, response::{IntoResponse, Response}};
use serde_json::json;

use crate::{AppResult, Store, queries, res, session::CurrentUser};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn my_streams(
    State(store): State<Store>,
    user: CurrentUser,
) -> AppResult<Response> {
    let Some(user_id) = user.id() else {
        return res::unauthenticated();
    };

    let streams = queries::streams_for_user(&store, user_id).await?;

    Ok(Json(json!({ "streams": streams })).into_response())
}
