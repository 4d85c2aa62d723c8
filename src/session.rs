use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use std::convert::Infallible;
use tower_sessions::Session;
use tracing::warn;

use crate::db::{Store, UserId};

pub const USER_ID: &str = "user_id";
pub const CSRF_STATE: &str = "csrf_state";
pub const PKCE_VERIFIER: &str = "pkce_verifier";
pub const RETURN_URL: &str = "return_url";

/// The identity behind the request, if any.
///
/// Only ids whose user row still exists are resolved. Anything that goes
/// wrong while resolving is treated as "not logged in".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub Option<UserId>);

impl CurrentUser {
    pub fn id(&self) -> Option<UserId> {
        self.0
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    Store: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(session) = Session::from_request_parts(parts, state).await else {
            warn!("session layer missing, treating request as anonymous");
            return Ok(Self(None));
        };

        let raw = match session.get::<String>(USER_ID).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(Self(None)),
            Err(e) => {
                warn!(error = %e, "could not read session");
                return Ok(Self(None));
            }
        };

        let Ok(user_id) = raw.parse::<UserId>() else {
            warn!(%raw, "malformed user id in session");
            return Ok(Self(None));
        };

        match Store::from_ref(state).user_exists(user_id).await {
            Ok(true) => Ok(Self(Some(user_id))),
            Ok(false) => {
                warn!(%user_id, "session refers to an unknown user");
                Ok(Self(None))
            }
            Err(e) => {
                warn!(%user_id, error = %e, "could not resolve session user");
                Ok(Self(None))
            }
        }
    }
}

/// Binds `user_id` to the session, rotating the session id first.
pub async fn sign_in(session: &Session, user_id: UserId) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(USER_ID, user_id.to_string()).await
}
