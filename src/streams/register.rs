use axum::{Json, debug_handler, extract::{Path, State}};
use serde::Serialize;

use crate::{
    AppState,
    db::{StreamId, UserId},
    registration::{Registrar, RegistrationError},
    session::CurrentUser,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Registered {
    message: &'static str,
    stream_id: StreamId,
    user_id: UserId,
}

#[debug_handler(state = AppState)]
pub(crate) async fn register(
    Path(stream_id): Path<StreamId>,
    State(registrar): State<Registrar>,
    user: CurrentUser,
) -> Result<Json<Registered>, RegistrationError> {
    let registration = registrar.register(user.id(), stream_id).await?;

    Ok(Json(Registered {
        message: "You are registered for the stream",
        stream_id: registration.stream_id,
        user_id: registration.user_id,
    }))
}
