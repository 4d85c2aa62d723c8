use std::{fmt, path::Path};

use anyhow::Context;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, EndpointNotSet, EndpointSet, RedirectUrl, Scope, TokenUrl,
    basic::BasicClient,
};
use serde::Deserialize;
use serde_json::Value;

use crate::{AppResult, GetField, db::NewUser};

pub(crate) type ProviderClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientProvider {
    Google,
    Github,
}

impl ClientProvider {
    pub fn id(&self) -> &'static str {
        use ClientProvider::*;
        match self {
            Google => "google.com",
            Github => "github.com",
        }
    }

    fn slug(&self) -> &'static str {
        use ClientProvider::*;
        match self {
            Google => "google",
            Github => "github",
        }
    }

    fn auth_url(&self) -> &'static str {
        use ClientProvider::*;
        match self {
            Google => "https://accounts.google.com/o/oauth2/auth",
            Github => "https://github.com/login/oauth/authorize",
        }
    }

    fn token_url(&self) -> &'static str {
        use ClientProvider::*;
        match self {
            Google => "https://oauth2.googleapis.com/token",
            Github => "https://github.com/login/oauth/access_token",
        }
    }

    pub(crate) fn userinfo_url(&self) -> &'static str {
        use ClientProvider::*;
        match self {
            Google => "https://www.googleapis.com/oauth2/v2/userinfo",
            Github => "https://api.github.com/user",
        }
    }

    pub(crate) fn scopes(&self) -> Vec<Scope> {
        use ClientProvider::*;
        let scopes: &[&str] = match self {
            Google => &["openid", "profile"],
            Github => &["read:user"],
        };
        scopes.iter().map(|s| Scope::new((*s).to_owned())).collect()
    }

    /// Turns a user-info document into a new local account. The provider's
    /// subject id becomes the account's `external_id`.
    pub(crate) fn new_user(&self, info: &Value) -> AppResult<NewUser> {
        use ClientProvider::*;
        let subject = info.get_id_field("id")?;
        let (first_name, last_name) = match self {
            Google => (
                info.get_str_field("given_name")
                    .or_else(|_| info.get_str_field("name"))
                    .unwrap_or_else(|_| "Nameless".to_owned()),
                info.get_str_field("family_name").unwrap_or_default(),
            ),
            Github => (
                info.get_str_field("name")
                    .or_else(|_| info.get_str_field("login"))
                    .unwrap_or_else(|_| "Nameless".to_owned()),
                String::new(),
            ),
        };

        Ok(NewUser {
            external_id: format!("{}:{subject}", self.id()),
            first_name,
            last_name,
            ..Default::default()
        })
    }
}

impl fmt::Display for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// OAuth clients for the providers that have credentials configured.
#[derive(Clone, Default)]
pub struct Clients {
    google_client: Option<ProviderClient>,
    github_client: Option<ProviderClient>,
}

impl Clients {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: &Path, public_url: &str) -> anyhow::Result<Clients> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading OAuth clients from {}", path.display()))?;
        let json: Value = serde_json::from_str(&text)
            .with_context(|| format!("parsing OAuth clients in {}", path.display()))?;
        Clients::from_json(&json, public_url).map_err(|e| e.0)
    }

    pub fn from_json(json: &Value, public_url: &str) -> AppResult<Clients> {
        let client = |provider: ClientProvider| -> AppResult<Option<ProviderClient>> {
            let Some(json) = json.get(provider.slug()) else {
                return Ok(None);
            };
            let client_id = ClientId::new(json.get_str_field("client_id")?);
            let client_secret = ClientSecret::new(json.get_str_field("client_secret")?);
            let redirect_url = RedirectUrl::new(format!("{public_url}/lockin/{}", provider.slug()))?;

            Ok(Some(
                BasicClient::new(client_id)
                    .set_client_secret(client_secret)
                    .set_auth_uri(AuthUrl::new(provider.auth_url().to_owned())?)
                    .set_token_uri(TokenUrl::new(provider.token_url().to_owned())?)
                    .set_redirect_uri(redirect_url),
            ))
        };

        Ok(Clients {
            google_client: client(ClientProvider::Google)?,
            github_client: client(ClientProvider::Github)?,
        })
    }

    pub(crate) fn get_client(&self, provider: ClientProvider) -> Option<&ProviderClient> {
        use ClientProvider::*;
        match provider {
            Google => self.google_client.as_ref(),
            Github => self.github_client.as_ref(),
        }
    }

    pub fn is_configured(&self, provider: ClientProvider) -> bool {
        self.get_client(provider).is_some()
    }
}
