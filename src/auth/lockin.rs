use axum::{
    debug_handler,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeVerifier, TokenResponse};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{
    AppResult, AppState, Store, res,
    session::{CSRF_STATE, PKCE_VERIFIER, RETURN_URL, sign_in},
};

use super::{Clients, clients::ClientProvider};

#[derive(Deserialize)]
pub struct LockinQuery {
    pub state: Option<String>,
    pub code: Option<String>,
}

/// OAuth callback: trades the code for a token, resolves the provider
/// account to a local user (creating it on first login) and binds it to the
/// session.
#[debug_handler(state = AppState)]
pub(crate) async fn lockin(
    Path(provider): Path<ClientProvider>,
    Query(LockinQuery { state, code }): Query<LockinQuery>,
    State(store): State<Store>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<Response> {
    let Some(client) = clients.get_client(provider) else {
        return res::sorry(&format!("{provider} login provider"));
    };

    let (Some(state), Some(code)) = (state, code) else {
        return res::bad_request("OAuth callback without state or code");
    };
    let state = CsrfToken::new(state);
    let code = AuthorizationCode::new(code);

    let stored_state = session.remove::<String>(CSRF_STATE).await?;
    let pkce_verifier = session.remove::<String>(PKCE_VERIFIER).await?;
    let (Some(stored_state), Some(pkce_verifier)) = (stored_state, pkce_verifier) else {
        return res::bad_request("No login in progress");
    };

    if state.secret().as_str() != stored_state.as_str() {
        tracing::warn!(%provider, "oauth csrf state mismatch");
        return res::bad_request("Login state mismatch");
    }

    let http_client = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let token_result = client
        .exchange_code(code)
        .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
        .request_async(&http_client)
        .await?;

    let info: serde_json::Value = http_client
        .get(provider.userinfo_url())
        .bearer_auth(token_result.access_token().secret())
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let user = store.find_or_create_user(provider.new_user(&info)?).await?;
    sign_in(&session, user.id).await?;

    tracing::info!(user_id = %user.id, %provider, "signed in");

    let return_url = session
        .remove::<String>(RETURN_URL)
        .await?
        .unwrap_or_else(|| "/".to_owned());
    Ok(Redirect::to(&return_url).into_response())
}
