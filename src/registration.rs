use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::db::{Inserted, Registration, Store, StreamId, UserId};

/// Where a registration attempt was when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ValidatingExistence,
    ValidatingAuth,
    ValidatingDuplicate,
    ValidatingCapacity,
    Committing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Stage::*;
        f.write_str(match self {
            ValidatingExistence => "validating existence",
            ValidatingAuth => "validating auth",
            ValidatingDuplicate => "validating duplicate",
            ValidatingCapacity => "validating capacity",
            Committing => "committing",
        })
    }
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("Stream not found")]
    NotFound,

    #[error("You need to sign in to register for a stream")]
    Unauthenticated,

    #[error("You are already registered for this stream")]
    AlreadyRegistered,

    #[error("This stream has no free spots left")]
    Full,

    #[error("storage failure while {stage}")]
    Storage {
        stage: Stage,
        #[source]
        source: sqlx::Error,
    },
}

impl RegistrationError {
    pub fn status(&self) -> StatusCode {
        use RegistrationError::*;
        match self {
            NotFound => StatusCode::NOT_FOUND,
            Unauthenticated => StatusCode::UNAUTHORIZED,
            AlreadyRegistered | Full => StatusCode::BAD_REQUEST,
            Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The text shown to callers. Storage details never leave the process.
    pub fn public_message(&self) -> String {
        match self {
            RegistrationError::Storage { .. } => "Internal server error".to_owned(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for RegistrationError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.public_message() }))).into_response()
    }
}

/// Enforces the capacity and uniqueness rules for stream registrations.
///
/// Every check made before the commit is advisory: the commit re-validates
/// both rules inside one transaction (unique index on the pair, conditional
/// counter increment), so concurrent callers cannot overshoot capacity or
/// register twice. Nothing here locks in-process; several server processes
/// may share the database.
#[derive(Clone)]
pub struct Registrar {
    store: Store,
}

impl Registrar {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    #[tracing::instrument(skip(self))]
    pub async fn register(
        &self,
        user_id: Option<UserId>,
        stream_id: StreamId,
    ) -> Result<Registration, RegistrationError> {
        let storage = |stage: Stage| {
            move |source: sqlx::Error| {
                error!(%stream_id, ?user_id, %stage, error = %source, "registration storage failure");
                RegistrationError::Storage { stage, source }
            }
        };

        let Some(stream) = self
            .store
            .get_stream(stream_id)
            .await
            .map_err(storage(Stage::ValidatingExistence))?
        else {
            debug!(stage = %Stage::ValidatingExistence, "stream does not exist");
            return Err(RegistrationError::NotFound);
        };

        let Some(user_id) = user_id else {
            debug!(stage = %Stage::ValidatingAuth, "no user in session");
            return Err(RegistrationError::Unauthenticated);
        };

        if self
            .store
            .find_registration(user_id, stream_id)
            .await
            .map_err(storage(Stage::ValidatingDuplicate))?
            .is_some()
        {
            debug!(stage = %Stage::ValidatingDuplicate, "already registered");
            return Err(RegistrationError::AlreadyRegistered);
        }

        if stream.is_full() {
            debug!(stage = %Stage::ValidatingCapacity, max = stream.max_participants, "stream is full");
            return Err(RegistrationError::Full);
        }

        let mut tx = self
            .store
            .begin()
            .await
            .map_err(storage(Stage::Committing))?;

        // insert first so a racing duplicate is reported before capacity
        let registration = match tx
            .insert_registration(user_id, stream_id)
            .await
            .map_err(storage(Stage::Committing))?
        {
            Inserted::Created(registration) => registration,
            Inserted::Duplicate => {
                tx.rollback().await.map_err(storage(Stage::Committing))?;
                debug!("lost duplicate race");
                return Err(RegistrationError::AlreadyRegistered);
            }
        };

        if !tx
            .increment_participants(stream_id)
            .await
            .map_err(storage(Stage::Committing))?
        {
            tx.rollback().await.map_err(storage(Stage::Committing))?;
            debug!("lost capacity race");
            return Err(RegistrationError::Full);
        }

        tx.commit().await.map_err(storage(Stage::Committing))?;

        info!(%stream_id, %user_id, "registered for stream");
        Ok(registration)
    }

    /// The caller's registration on `stream_id`, if any. An absent user is
    /// simply not registered.
    pub async fn registration_of(
        &self,
        user_id: Option<UserId>,
        stream_id: StreamId,
    ) -> Result<Option<Registration>, RegistrationError> {
        let Some(user_id) = user_id else {
            return Ok(None);
        };

        self.store
            .find_registration(user_id, stream_id)
            .await
            .map_err(|source| {
                error!(%stream_id, %user_id, error = %source, "registration lookup failed");
                RegistrationError::Storage {
                    stage: Stage::ValidatingDuplicate,
                    source,
                }
            })
    }
}
