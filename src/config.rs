use crate::core::{DatabaseError, Result};
use crate::parser::parse_uri;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;

/// File path that keeps an embedded database in memory.
pub const MEMORY_PATH: &str = ":memory:";

/// Default port of the client-server backend.
pub const POSTGRES_DEFAULT_PORT: u16 = 5432;

const CONFIG_PATHS: [&str; 2] = ["/etc/sqlbridge/sqlbridge.toml", "./sqlbridge.toml"];

/// Which backend a connection talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum BackendKind {
    /// Single-file embedded engine (SQLite)
    #[default]
    Sqlite,
    /// Client-server engine (PostgreSQL)
    Postgres,
}

impl FromStr for BackendKind {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" | "embedded" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "psql" | "pg" => Ok(Self::Postgres),
            other => Err(DatabaseError::Config(format!("unsupported backend '{other}'"))),
        }
    }
}

impl TryFrom<String> for BackendKind {
    type Error = DatabaseError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Postgres => write!(f, "postgres"),
        }
    }
}

/// Logical connection parameters.
///
/// `file_path` belongs to the embedded backend and cannot be combined with a
/// client-server backend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub backend: BackendKind,
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub port: Option<u16>,
    pub file_path: Option<String>,
}

/// Values given on the command line; each one wins over every other source.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub uri: Option<String>,
    pub backend: Option<BackendKind>,
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub port: Option<u16>,
    pub file_path: Option<String>,
}

/// Shape of `sqlbridge.toml` and of `SQLBRIDGE_*` variables.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    uri: Option<String>,
    backend: Option<BackendKind>,
    host: Option<String>,
    user: Option<String>,
    password: Option<String>,
    database: Option<String>,
    port: Option<u16>,
    file_path: Option<String>,
}

impl From<RawConfig> for ConnectionConfig {
    fn from(raw: RawConfig) -> Self {
        Self {
            backend: raw.backend.unwrap_or_default(),
            host: raw.host,
            user: raw.user,
            password: raw.password,
            database: raw.database,
            port: raw.port,
            file_path: raw.file_path,
        }
    }
}

impl ConnectionConfig {
    /// Embedded database stored in `path` (or `:memory:`).
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::Sqlite,
            file_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Client-server database reachable at `host`.
    pub fn postgres(host: impl Into<String>, user: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::Postgres,
            host: Some(host.into()),
            user: Some(user.into()),
            database: Some(database.into()),
            port: Some(POSTGRES_DEFAULT_PORT),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Parses a connection string.
    ///
    /// For the embedded backend the target file is created empty when it
    /// does not exist yet; an existing file is left alone and any other
    /// filesystem failure is a configuration error.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let parsed = parse_uri(uri)?;
        let backend = match parsed.scheme.as_deref() {
            None => BackendKind::Sqlite,
            Some(scheme) => scheme.parse()?,
        };

        match backend {
            BackendKind::Sqlite => {
                let path = if parsed.path.is_empty() {
                    MEMORY_PATH.to_string()
                } else {
                    parsed.path
                };
                ensure_database_file(&path)?;
                Ok(Self::sqlite(path))
            }
            BackendKind::Postgres => Ok(Self {
                backend,
                host: parsed.host,
                user: parsed.user,
                password: parsed.password,
                database: (!parsed.path.is_empty()).then_some(parsed.path),
                port: parsed.port,
                file_path: None,
            }
            .validate()?),
        }
    }

    /// Checks parameter exclusivity and fills backend defaults.
    pub fn validate(mut self) -> Result<Self> {
        match self.backend {
            BackendKind::Sqlite => {
                if self.file_path.is_none() {
                    self.file_path = Some(MEMORY_PATH.to_string());
                }
            }
            BackendKind::Postgres => {
                if let Some(path) = &self.file_path {
                    return Err(DatabaseError::Config(format!(
                        "file path '{path}' cannot be used with the {} backend",
                        self.backend
                    )));
                }
                self.port.get_or_insert(POSTGRES_DEFAULT_PORT);
                self.host.get_or_insert_with(|| "127.0.0.1".to_string());
            }
        }
        Ok(self)
    }

    /// Loads configuration with priority: overrides > ENV > config file > defaults.
    ///
    /// A `uri` (from any source) is parsed first and the discrete fields are
    /// then applied on top of it.
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        // 1. Optional config file
        let mut builder = Config::builder();
        for path in CONFIG_PATHS {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
                log::info!("Loaded config from: {path}");
                break;
            }
        }

        // 2. Environment (SQLBRIDGE_*)
        builder = builder.add_source(Environment::with_prefix("SQLBRIDGE").prefix_separator("_"));
        let mut raw: RawConfig = builder.build()?.try_deserialize()?;

        // 3. Connection string, when present, is the base
        let uri = overrides.uri.clone().or_else(|| raw.uri.take());
        let mut config = match uri {
            Some(uri) => Self::from_uri(&uri)?,
            None => Self::from(raw),
        };

        // 4. CLI overrides everything
        if let Some(backend) = overrides.backend {
            config.backend = backend;
        }
        let fields = [
            (&mut config.host, &overrides.host),
            (&mut config.user, &overrides.user),
            (&mut config.password, &overrides.password),
            (&mut config.database, &overrides.database),
            (&mut config.file_path, &overrides.file_path),
        ];
        for (slot, value) in fields {
            if value.is_some() {
                slot.clone_from(value);
            }
        }
        if overrides.port.is_some() {
            config.port = overrides.port;
        }
        if overrides.file_path.is_some() && overrides.backend.is_none() {
            config.backend = BackendKind::Sqlite;
        }

        config.validate()
    }
}

/// Creates an empty database file at `path` unless it already exists.
fn ensure_database_file(path: &str) -> Result<()> {
    if path == MEMORY_PATH {
        return Ok(());
    }
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => {
            log::info!("Created empty database file {path}");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(DatabaseError::Config(format!("bad file path '{path}': {e}"))),
    }
}
