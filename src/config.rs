use serde::Deserialize;

use std::{env, fs, path::Path};

use crate::{auth::Permission, models::NewUser};

const DEFAULT_PORT: u16 = 8000;
const CONFIG_VAR: &str = "MARKNOTE_CONFIG";
const DEFAULT_CONFIG: &str = "config.yaml";
const EXAMPLE_CONFIG: &str = "config.example.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    pub storage: StorageConfig,
    /// Accounts registered at startup. Tokens are issued out of band.
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    Postgres { dsn: String },
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub token: String,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

impl From<UserConfig> for NewUser {
    fn from(user: UserConfig) -> Self {
        Self {
            username: user.username,
            token: user.token,
            permissions: user.permissions.into_iter().collect(),
        }
    }
}

impl Config {
    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }
}

fn load_from_env() -> Result<Config, Box<dyn std::error::Error>> {
    let dsn = env::var("PG_DSN").map_err(|_| "PG_DSN environment variable is required")?;

    let port = match env::var("PORT") {
        Ok(port) => port
            .parse::<u16>()
            .map_err(|e| format!("Failed to parse PORT: {e}"))?,
        Err(_) => DEFAULT_PORT,
    };

    Ok(Config {
        port,
        storage: StorageConfig::Postgres { dsn },
        users: Vec::new(),
    })
}

fn load_from_file(path: &str) -> Result<Config, Box<dyn std::error::Error>> {
    let contents = fs::read_to_string(path)?;
    Config::from_yaml(&contents).map_err(Into::into)
}

/// Returns the first candidate that exists, along with the ones tried before it.
fn locate<'a>(
    candidates: impl IntoIterator<Item = &'a str>,
    exists: impl Fn(&str) -> bool,
) -> (Option<&'a str>, Vec<&'a str>) {
    let mut tried: Vec<&'a str> = Vec::new();
    for path in candidates {
        if tried.contains(&path) {
            continue;
        }
        if exists(path) {
            return (Some(path), tried);
        }
        tried.push(path);
    }
    (None, tried)
}

pub fn load_config() -> Result<Config, Box<dyn std::error::Error>> {
    let requested = env::var(CONFIG_VAR).ok();
    let candidates = requested
        .iter()
        .map(String::as_str)
        .chain([DEFAULT_CONFIG, EXAMPLE_CONFIG]);

    let (found, tried) = locate(candidates, |path| Path::new(path).exists());
    if let Some(path) = found {
        if !tried.is_empty() {
            tracing::warn!("Config not found at {}, falling back to '{path}'", tried.join(", "));
        }
        if path == EXAMPLE_CONFIG {
            tracing::warn!("'{path}' holds demo users and should be replaced with real data");
        }
        return load_from_file(path);
    }

    tracing::info!("No config file found, loading configuration from environment variables");
    let config = load_from_env().map_err(|e| {
        format!(
            "Config file not found (tried {}) and environment variables are incomplete: {e}",
            tried.join(", ")
        )
    })?;
    tracing::info!("Successfully loaded configuration from environment variables");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn parses_postgres_config_with_users() {
        let config = Config::from_yaml(
            r#"
port: 9000
storage:
  backend: postgres
  dsn: "host=localhost user=marknote"
users:
  - username: alice
    token: alice-secret
    permissions: [add_note, view_note]
"#,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert!(matches!(
            config.storage,
            StorageConfig::Postgres { ref dsn } if dsn == "host=localhost user=marknote"
        ));

        let user = NewUser::from(config.users[0].clone());
        assert_eq!(user.username, "alice");
        assert_eq!(user.permissions.len(), 2);
    }

    #[test]
    fn memory_backend_and_default_port() {
        let config = Config::from_yaml("storage:\n  backend: memory\n").unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert!(matches!(config.storage, StorageConfig::Memory));
        assert!(config.users.is_empty());
    }

    #[test]
    fn first_existing_candidate_wins() {
        let candidates = ["custom.yaml", DEFAULT_CONFIG, EXAMPLE_CONFIG];

        let (found, tried) = locate(candidates, |path| path == EXAMPLE_CONFIG);
        assert_eq!(found, Some(EXAMPLE_CONFIG));
        assert_eq!(tried, vec!["custom.yaml", DEFAULT_CONFIG]);

        let (found, tried) = locate(candidates, |path| path == "custom.yaml");
        assert_eq!(found, Some("custom.yaml"));
        assert!(tried.is_empty());
    }

    #[test]
    fn missing_candidates_are_each_tried_once() {
        let candidates = [DEFAULT_CONFIG, DEFAULT_CONFIG, EXAMPLE_CONFIG];

        let (found, tried) = locate(candidates, |_| false);
        assert_eq!(found, None);
        assert_eq!(tried, vec![DEFAULT_CONFIG, EXAMPLE_CONFIG]);
    }

    #[test]
    fn unknown_permission_is_rejected() {
        let result = Config::from_yaml(
            r#"
storage:
  backend: memory
users:
  - username: bob
    token: t
    permissions: [fly_note]
"#,
        );

        assert!(result.is_err());
    }
}
