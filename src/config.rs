use rocket::figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_API_BASE_PATH: &str = "/api";
pub const DEFAULT_SESSION_COOKIE: &str = "identity_session";
pub const DEFAULT_MAX_USERS_BATCH: usize = 20;

/// Deployment environment. Parsed case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Local,
    Test,
    Staging,
    Prod,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Environment::Local),
            "test" => Ok(Environment::Test),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Environment::Local => "local",
            Environment::Test => "test",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        };
        f.write_str(name)
    }
}

impl Serialize for Environment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Environment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    pub env: Environment,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub cors: CorsConfig,
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub identity_provider: IdentityProviderConfig,
    pub users: UsersConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
    pub run_migrations: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub address: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    pub base_path: String,
    pub enable_swagger: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub secure_cookie: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IdentityProviderConfig {
    /// Bare host (`tenant.eu.auth0.com`) or a full base URL.
    pub domain: String,
    pub timeout_seconds: u64,
}

impl IdentityProviderConfig {
    pub fn base_url(&self) -> String {
        let domain = self.domain.trim().trim_end_matches('/');
        if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UsersConfig {
    pub max_batch_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/identity_db".to_string(),
            max_connections: 16,
            min_connections: 4,
            acquire_timeout: 5,
            run_migrations: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            address: "127.0.0.1".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            allow_credentials: true,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_API_BASE_PATH.to_string(),
            enable_swagger: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
            secure_cookie: true,
        }
    }
}

impl Default for IdentityProviderConfig {
    fn default() -> Self {
        Self {
            domain: "localhost".to_string(),
            timeout_seconds: 10,
        }
    }
}

impl Default for UsersConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_USERS_BATCH,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources in priority order:
    /// 1. Built-in defaults
    /// 2. Identity.toml (if present)
    /// 3. Environment variables prefixed with IDENTITY_ (nested keys split on `__`,
    ///    e.g. IDENTITY_DATABASE__MAX_CONNECTIONS)
    /// 4. DATABASE_URL
    pub fn load() -> Result<Self, figment::Error> {
        Self::from_figment(Self::figment())
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("Identity.toml"))
            .merge(Env::prefixed("IDENTITY_").split("__"))
            .merge(Env::raw().only(&["DATABASE_URL"]).map(|_| "database.url".into()))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, figment::Error> {
        let mut config: Config = figment.extract()?;

        // Local development runs over plain http.
        if config.env == Environment::Local {
            config.session.secure_cookie = false;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn environment_parsing_is_case_insensitive() {
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Prod));
        assert_eq!("Staging".parse::<Environment>(), Ok(Environment::Staging));
        assert_eq!(" local ".parse::<Environment>(), Ok(Environment::Local));
        assert!("qa".parse::<Environment>().is_err());
    }

    #[test]
    fn defaults_are_loaded_without_sources() {
        Jail::expect_with(|_jail| {
            let config = Config::load()?;
            assert_eq!(config.env, Environment::Local);
            assert_eq!(config.api.base_path, DEFAULT_API_BASE_PATH);
            assert_eq!(config.session.cookie_name, DEFAULT_SESSION_COOKIE);
            assert_eq!(config.users.max_batch_size, 20);
            assert!(!config.session.secure_cookie);
            Ok(())
        });
    }

    #[test]
    fn file_and_env_layers_override_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "Identity.toml",
                r#"
                env = "Prod"

                [identity_provider]
                domain = "tenant.eu.auth0.com"

                [users]
                max_batch_size = 5
                "#,
            )?;
            jail.set_env("IDENTITY_DATABASE__MAX_CONNECTIONS", "3");
            jail.set_env("DATABASE_URL", "postgres://db/identity");

            let config = Config::load()?;
            assert_eq!(config.env, Environment::Prod);
            assert!(config.session.secure_cookie);
            assert_eq!(config.users.max_batch_size, 5);
            assert_eq!(config.database.max_connections, 3);
            assert_eq!(config.database.url, "postgres://db/identity");
            assert_eq!(config.identity_provider.base_url(), "https://tenant.eu.auth0.com");
            Ok(())
        });
    }

    #[test]
    fn provider_base_url_keeps_explicit_scheme() {
        let config = IdentityProviderConfig {
            domain: "http://127.0.0.1:9000/".to_string(),
            timeout_seconds: 1,
        };
        assert_eq!(config.base_url(), "http://127.0.0.1:9000");
    }
}
