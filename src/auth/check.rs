use axum::{Json, debug_handler, extract::State};
use serde_json::{Value, json};

use crate::{Store, session::CurrentUser};

/// Whether the caller is signed in, and as whom. Never fails: lookup
/// problems read as signed out.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn auth_check(State(store): State<Store>, user: CurrentUser) -> Json<Value> {
    let user = match user.id() {
        Some(id) => store.get_user(id).await.unwrap_or_else(|e| {
            tracing::warn!(user_id = %id, error = %e, "could not load signed-in user");
            None
        }),
        None => None,
    };

    Json(json!({
        "isLoggedIn": user.is_some(),
        "user": user,
    }))
}
