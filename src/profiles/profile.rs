use axum::{
    Json, debug_handler,
    extract::State,
    response::{IntoResponse, Response},
};
use time::{Date, macros::format_description};

use crate::{AppResult, Store, db::ProfileUpdate, res, session::CurrentUser};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn profile(State(store): State<Store>, user: CurrentUser) -> AppResult<Response> {
    let Some(user_id) = user.id() else {
        return res::unauthenticated();
    };

    let Some(user) = store.get_user(user_id).await? else {
        return res::unauthenticated();
    };

    Ok(Json(user).into_response())
}

/// Edits the caller's own profile. Only the session's user can be changed.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn update_profile(
    State(store): State<Store>,
    user: CurrentUser,
    Json(update): Json<ProfileUpdate>,
) -> AppResult<Response> {
    let Some(user_id) = user.id() else {
        return res::unauthenticated();
    };

    if let Err(message) = validate(&update) {
        return res::bad_request(message);
    }

    let Some(user) = store.update_profile(user_id, &update).await? else {
        return res::unauthenticated();
    };

    tracing::info!(%user_id, "profile updated");
    Ok(Json(user).into_response())
}

fn validate(update: &ProfileUpdate) -> Result<(), &'static str> {
    if let Some(first_name) = &update.first_name {
        if first_name.trim().is_empty() {
            return Err("First name can't be empty");
        }
    }

    if let Some(birth_date) = &update.birth_date {
        if !birth_date.is_empty()
            && Date::parse(birth_date, format_description!("[year]-[month]-[day]")).is_err()
        {
            return Err("Birth date must look like YYYY-MM-DD");
        }
    }

    Ok(())
}
