mod check;
mod clients;
mod lockin;
mod login;
mod logout;

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

pub use clients::{ClientProvider, Clients};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login/{provider}", get(login::login))
        .route("/lockin/{provider}", get(lockin::lockin))
        .route("/logout", post(logout::logout))
        .route("/api/auth/check", get(check::auth_check))
}
