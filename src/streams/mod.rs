mod check;
mod detail;
mod my;
mod register;

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/my", get(my::my_streams))
        .route("/{id}", get(detail::stream_detail))
        .route("/{id}/check", get(check::check_registration))
        .route("/{id}/register", post(register::register))
}
