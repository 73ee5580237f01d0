//! Process settings read from the environment (after `dotenvy::dotenv()` in the binary).

use crate::error::ConfigError;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    /// Model file edited by the API.
    pub models_path: PathBuf,
    /// Directory holding revision scripts.
    pub versions_dir: PathBuf,
    pub version_table: String,
    /// Postgres schema that holds the managed tables and the version table.
    pub db_schema: String,
    pub bind_addr: String,
    pub lock_timeout: Duration,
    pub max_connections: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/schema_forge".into(),
            models_path: PathBuf::from("models.py"),
            versions_dir: PathBuf::from("versions"),
            version_table: "schema_version".into(),
            db_schema: "public".into(),
            bind_addr: "127.0.0.1:8000".into(),
            lock_timeout: Duration::from_secs(30),
            max_connections: 5,
        }
    }
}

fn identifier_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern"))
}

fn identifier(key: &'static str, value: String) -> Result<String, ConfigError> {
    if identifier_re().is_match(&value) {
        Ok(value)
    } else {
        Err(ConfigError::Identifier { key, value })
    }
}

fn number<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut s = Settings::default();
        if let Some(v) = get("DATABASE_URL") {
            s.database_url = v;
        }
        if let Some(v) = get("MODELS_PATH") {
            s.models_path = PathBuf::from(v);
        }
        if let Some(v) = get("VERSIONS_DIR") {
            s.versions_dir = PathBuf::from(v);
        }
        if let Some(v) = get("VERSION_TABLE") {
            s.version_table = identifier("VERSION_TABLE", v)?;
        }
        if let Some(v) = get("DB_SCHEMA") {
            s.db_schema = identifier("DB_SCHEMA", v)?;
        }
        if let Some(v) = get("BIND_ADDR") {
            s.bind_addr = v;
        }
        if let Some(v) = get("LOCK_TIMEOUT_SECS") {
            s.lock_timeout = Duration::from_secs(number("LOCK_TIMEOUT_SECS", v)?);
        }
        if let Some(v) = get("MAX_CONNECTIONS") {
            s.max_connections = number("MAX_CONNECTIONS", v)?;
        }
        Ok(s)
    }
}
