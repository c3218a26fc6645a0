//! Configuration loading
//!
//! Resolution priority for every key:
//! 1. Environment variable (highest priority)
//! 2. TOML config file named by `CONFIG_FILE` (lower-cased keys)
//! 3. Compiled default (fallback)
//!
//! Values are read once at startup and are read-only afterwards.

use crate::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for the lifetime of a demo organization
pub const MAX_TRYOUT_TTL_HOURS: i64 = 24;

/// Deployment stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Dev,
    Prod,
}

impl Stage {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DEV" | "" => Ok(Stage::Dev),
            "PROD" => Ok(Stage::Prod),
            other => Err(Error::Config(format!("Unknown STAGE '{}' (expected DEV or PROD)", other))),
        }
    }

    pub fn is_prod(self) -> bool {
        self == Stage::Prod
    }
}

/// Google OAuth client settings
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

/// Application configuration shared by the server and the migration CLI
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub stage: Stage,
    pub frontend_url: String,
    pub api_domain: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
    pub request_timeout: Duration,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub tryout_ttl_hours: i64,
    pub migration_path: PathBuf,
    pub per_tenant_migration_path: PathBuf,
    pub dry_run: bool,
    pub google: Option<GoogleConfig>,
    pub blob_root: PathBuf,
    pub blob_public_url: String,
    pub blob_signing_key: String,
}

/// Key/value source consulted after the environment
#[derive(Debug, Default, Clone)]
pub struct FileValues {
    values: HashMap<String, String>,
}

impl FileValues {
    /// Load flat `key = value` pairs from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;

        let values = table
            .into_iter()
            .filter_map(|(key, value)| {
                let text = match value {
                    toml::Value::String(s) => s,
                    toml::Value::Integer(i) => i.to_string(),
                    toml::Value::Boolean(b) => b.to_string(),
                    toml::Value::Float(f) => f.to_string(),
                    _ => return None,
                };
                Some((key.to_ascii_lowercase(), text))
            })
            .collect();

        Ok(Self { values })
    }
}

/// Layered lookup: environment first, then file values
struct Lookup<'a, F: Fn(&str) -> Option<String>> {
    env: F,
    file: &'a FileValues,
}

impl<'a, F: Fn(&str) -> Option<String>> Lookup<'a, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.env)(key)
            .or_else(|| self.file.values.get(&key.to_ascii_lowercase()).cloned())
            .filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.get(key)
            .ok_or_else(|| Error::Config(format!("{} is not set", key)))
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map_err(|_| Error::Config(format!("{} has invalid value '{}'", key, raw))),
            None => Ok(default),
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment (and `CONFIG_FILE`)
    pub fn from_env() -> Result<Self> {
        let file = match std::env::var("CONFIG_FILE") {
            Ok(path) if !path.trim().is_empty() => FileValues::load(Path::new(&path))?,
            _ => FileValues::default(),
        };
        Self::from_sources(|key| std::env::var(key).ok(), &file)
    }

    /// Build configuration from an explicit environment accessor
    pub fn from_sources<F>(env: F, file: &FileValues) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = Lookup { env, file };

        let port: u16 = lookup.parsed("PORT", 8080)?;
        let stage = Stage::parse(&lookup.get("STAGE").unwrap_or_default())?;
        let jwt_secret = lookup.required("JWT_SECRET")?;

        let tryout_ttl_hours: i64 = lookup.parsed("TRYOUT_TTL_HOURS", MAX_TRYOUT_TTL_HOURS)?;
        let tryout_ttl_hours = tryout_ttl_hours.clamp(1, MAX_TRYOUT_TTL_HOURS);

        let google = match (
            lookup.get("GOOGLE_CLIENT_ID"),
            lookup.get("GOOGLE_CLIENT_SECRET"),
            lookup.get("GOOGLE_REDIRECT_URL"),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_url)) => Some(GoogleConfig {
                client_id,
                client_secret,
                redirect_url,
            }),
            _ => None,
        };

        let dry_run = lookup
            .get("DRY_RUN")
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            port,
            stage,
            frontend_url: lookup
                .get("FRONTEND_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            api_domain: lookup.get("API_DOMAIN").unwrap_or_else(|| "localhost".to_string()),
            database_url: lookup.required("DATABASE_URL")?,
            db_max_connections: lookup.parsed("DB_MAX_CONNECTIONS", 20)?,
            db_acquire_timeout: Duration::from_secs(lookup.parsed("DB_ACQUIRE_TIMEOUT_SECS", 5)?),
            request_timeout: Duration::from_secs(lookup.parsed("REQUEST_TIMEOUT_SECS", 30)?),
            blob_signing_key: lookup
                .get("BLOB_SIGNING_KEY")
                .unwrap_or_else(|| jwt_secret.clone()),
            jwt_secret,
            token_ttl_hours: lookup.parsed("TOKEN_TTL_HOURS", 24)?,
            tryout_ttl_hours,
            migration_path: PathBuf::from(
                lookup.get("MIGRATION_PATH").unwrap_or_else(|| "migrations/root".to_string()),
            ),
            per_tenant_migration_path: PathBuf::from(
                lookup
                    .get("PER_TENANT_MIGRATION_PATH")
                    .unwrap_or_else(|| "migrations/tenant".to_string()),
            ),
            dry_run,
            google,
            blob_root: PathBuf::from(lookup.get("BLOB_ROOT").unwrap_or_else(|| "./blobs".to_string())),
            blob_public_url: lookup
                .get("BLOB_PUBLIC_URL")
                .unwrap_or_else(|| format!("http://localhost:{}/blobs", port)),
        })
    }

    /// Lifetime of a demo organization
    pub fn tryout_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.tryout_ttl_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_of(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("JWT_SECRET", "s3cret"),
        ("DATABASE_URL", "postgres://localhost/stockroom"),
    ];

    #[test]
    fn test_defaults_apply() {
        let config = AppConfig::from_sources(env_of(MINIMAL), &FileValues::default()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.stage, Stage::Dev);
        assert_eq!(config.tryout_ttl_hours, 24);
        assert!(!config.dry_run);
        assert!(config.google.is_none());
        assert_eq!(config.blob_signing_key, "s3cret");
        assert_eq!(config.blob_public_url, "http://localhost:8080/blobs");
    }

    #[test]
    fn test_missing_secret_is_config_error() {
        let result = AppConfig::from_sources(
            env_of(&[("DATABASE_URL", "postgres://x")]),
            &FileValues::default(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_tryout_ttl_is_clamped() {
        let env = env_of(&[
            ("JWT_SECRET", "s"),
            ("DATABASE_URL", "postgres://x"),
            ("TRYOUT_TTL_HOURS", "72"),
        ]);
        let config = AppConfig::from_sources(env, &FileValues::default()).unwrap();
        assert_eq!(config.tryout_ttl_hours, MAX_TRYOUT_TTL_HOURS);
    }

    #[test]
    fn test_env_wins_over_file() {
        let file = FileValues::parse("port = 9000\nstage = \"PROD\"\ndry_run = true\n").unwrap();
        let env = env_of(&[
            ("JWT_SECRET", "s"),
            ("DATABASE_URL", "postgres://x"),
            ("PORT", "7000"),
        ]);
        let config = AppConfig::from_sources(env, &file).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.stage, Stage::Prod);
        assert!(config.dry_run);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let env = env_of(&[
            ("JWT_SECRET", "s"),
            ("DATABASE_URL", "postgres://x"),
            ("DB_MAX_CONNECTIONS", "many"),
        ]);
        assert!(AppConfig::from_sources(env, &FileValues::default()).is_err());
    }

    #[test]
    fn test_stage_parse() {
        assert_eq!(Stage::parse("prod").unwrap(), Stage::Prod);
        assert_eq!(Stage::parse("DEV").unwrap(), Stage::Dev);
        assert!(Stage::parse("staging").is_err());
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stockroom.toml");
        std::fs::write(
            &path,
            "jwt_secret = \"from-file\"\ndatabase_url = \"postgres://file/db\"\nrequest_timeout_secs = 12\n",
        )
        .unwrap();

        std::env::set_var("CONFIG_FILE", &path);
        std::env::remove_var("REQUEST_TIMEOUT_SECS");
        let config = AppConfig::from_env();
        std::env::remove_var("CONFIG_FILE");

        let config = config.unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(12));
    }
}
