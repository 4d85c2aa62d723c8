use axum::{Json, debug_handler};
use serde_json::{Value, json};
use tower_sessions::Session;

#[debug_handler]
pub(crate) async fn logout(session: Session) -> Json<Value> {
    session.clear().await;
    Json(json!({ "message": "Signed out" }))
}
