use std::{net::SocketAddr, path::PathBuf, str::FromStr};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub max_connections: u32,
    pub session_inactivity_minutes: i64,
    pub secure_cookies: bool,
    /// Base URL the OAuth providers redirect back to.
    pub public_url: String,
    pub oauth_clients_file: Option<PathBuf>,
    pub seed_demo_data: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://streamsignup.db".to_owned(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 16,
            session_inactivity_minutes: 60,
            secure_cookies: false,
            public_url: "http://localhost:8080".to_owned(),
            oauth_clients_file: None,
            seed_demo_data: false,
        }
    }
}

impl Config {
    /// Reads `.env` if present, then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        fn parsed<T: FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &'static str,
            default: T,
        ) -> Result<T, ConfigError> {
            match lookup(key) {
                Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { key, value }),
                None => Ok(default),
            }
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_addr: parsed(&lookup, "BIND_ADDR", defaults.bind_addr)?,
            max_connections: parsed(&lookup, "DB_MAX_CONNECTIONS", defaults.max_connections)?,
            session_inactivity_minutes: parsed(
                &lookup,
                "SESSION_INACTIVITY_MINUTES",
                defaults.session_inactivity_minutes,
            )?,
            secure_cookies: parsed(&lookup, "SECURE_COOKIES", defaults.secure_cookies)?,
            public_url: lookup("PUBLIC_URL")
                .map(|url| url.trim_end_matches('/').to_owned())
                .unwrap_or(defaults.public_url),
            oauth_clients_file: lookup("OAUTH_CLIENTS_FILE").map(PathBuf::from),
            seed_demo_data: parsed(&lookup, "SEED_DEMO_DATA", defaults.seed_demo_data)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let c = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(c.bind_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(c.max_connections, 16);
        assert_eq!(c.session_inactivity_minutes, 60);
        assert!(!c.secure_cookies);
        assert!(!c.seed_demo_data);
        assert!(c.oauth_clients_file.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let c = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("BIND_ADDR", "127.0.0.1:3000"),
            ("SEED_DEMO_DATA", "true"),
            ("PUBLIC_URL", "https://streams.example/"),
            ("OAUTH_CLIENTS_FILE", "clients.json"),
        ]))
        .unwrap();
        assert_eq!(c.database_url, "sqlite::memory:");
        assert_eq!(c.bind_addr.port(), 3000);
        assert!(c.seed_demo_data);
        assert_eq!(c.public_url, "https://streams.example");
        assert_eq!(c.oauth_clients_file, Some(PathBuf::from("clients.json")));
    }

    #[test]
    fn malformed_value_is_an_error() {
        let err = Config::from_lookup(lookup(&[("DB_MAX_CONNECTIONS", "lots")])).unwrap_err();
        assert!(err.to_string().contains("DB_MAX_CONNECTIONS"));
    }
}
