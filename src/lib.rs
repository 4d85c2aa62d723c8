pub mod auth;
pub mod config;
pub mod db;
pub mod profiles;
pub mod queries;
pub mod registration;
pub mod res;
pub mod seed;
pub mod session;
pub mod streams;

use axum::{
    Json, Router,
    extract::FromRef,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};

pub use config::Config;
pub use db::Store;
pub use registration::{Registrar, RegistrationError};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Store,
    pub registrar: Registrar,
    pub clients: auth::Clients,
}

impl AppState {
    pub fn new(store: Store, clients: auth::Clients) -> Self {
        Self {
            registrar: Registrar::new(store.clone()),
            store,
            clients,
        }
    }
}

/// All routes, before state and middleware are attached.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .nest("/api/streams", streams::router())
        .nest("/api/profile", profiles::router())
}

pub fn session_layer(config: &Config) -> SessionManagerLayer<MemoryStore> {
    SessionManagerLayer::new(MemoryStore::default())
        .with_secure(config.secure_cookies)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            config.session_inactivity_minutes,
        )))
}

/// The full application: routes with sessions and request tracing.
pub fn app(state: AppState, config: &Config) -> Router {
    routes()
        .with_state(state)
        .layer(session_layer(config))
        .layer(TraceLayer::new_for_http())
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
    fn get_id_field(&self, field: &str) -> AppResult<String>;
}

impl GetField for Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(self
            .get(field)
            .ok_or(format!("expected {field} in response"))?
            .as_str()
            .ok_or(format!("expected {field} in response to be a string"))?
            .to_owned())
    }

    /// Provider ids come back as strings (Google) or numbers (GitHub).
    fn get_id_field(&self, field: &str) -> AppResult<String> {
        match self.get(field) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(format!("expected {field} in response to be an id").into()),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// An unexpected failure. The detail is logged; callers get a generic 500.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = ?self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Internal server error" })),
        )
            .into_response()
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self(anyhow::Error::msg(err))
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self(anyhow::Error::msg(err.to_owned()))
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(serde_json::Error);
apperr_impl!(sqlx::Error);
apperr_impl!(tower_sessions::session::Error);
apperr_impl!(reqwest::Error);
apperr_impl!(oauth2::url::ParseError);

impl<E, R> From<oauth2::RequestTokenError<E, R>> for AppError
where
    E: core::error::Error + Send + Sync + 'static,
    R: oauth2::ErrorResponse + Send + Sync + 'static,
{
    fn from(err: oauth2::RequestTokenError<E, R>) -> Self {
        Self(anyhow::Error::from(err))
    }
}
