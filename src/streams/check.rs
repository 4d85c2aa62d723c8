use axum::{Json, debug_handler, extract::{Path, State}, response::{IntoResponse, Response}};
use serde_json::json;

use crate::{
    AppState,
    db::StreamId,
    registration::{Registrar, RegistrationError},
    session::CurrentUser,
};

#[debug_handler(state = AppState)]
pub(crate) async fn check_registration(
    Path(stream_id): Path<StreamId>,
    State(registrar): State<Registrar>,
    user: CurrentUser,
) -> Result<Response, RegistrationError> {
    let Some(user_id) = user.id() else {
        return Ok(Json(json!({ "isRegistered": false })).into_response());
    };

    let registration = registrar.registration_of(Some(user_id), stream_id).await?;

    Ok(Json(json!({
        "isRegistered": registration.is_some(),
        "registration": registration,
    }))
    .into_response())
}
