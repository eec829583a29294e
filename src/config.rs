use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
    /// Owner recorded when an upload carries no `userId`.
    pub default_user_id: String,
    /// Directory for the audit-trail files; `None` keeps the trail on the
    /// console only.
    pub audit_log_dir: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Externally reachable base URL, used to build local-store object URLs.
    pub public_base_url: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Disabled,
    Local,
    S3,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for local storage backend
    pub local_storage_path: String,
    /// HMAC key for local signed download URLs. Random per process when unset.
    pub local_signing_secret: Option<String>,
    /// Complete S3 settings, or `None` when any required variable is missing.
    pub s3: Option<S3Config>,
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    /// Path-style endpoint, e.g. `https://s3.ap-south-1.amazonaws.com`.
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseBackend {
    MySql,
    Redb,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    /// Directory for the redb backend
    pub data_dir: String,
    pub mysql: Option<MySqlConfig>,
}

#[derive(Debug, Clone)]
pub struct MySqlConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub pool_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3001".to_string(),
            public_base_url: "http://localhost:3001".to_string(),
            cors_allowed_origins: vec![
                "http://localhost:8080".to_string(),
                "http://127.0.0.1:8080".to_string(),
            ],
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_storage_path: "./files".to_string(),
            local_signing_secret: None,
            s3: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::Redb,
            data_dir: "./data".to_string(),
            mysql: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let server_defaults = ServerConfig::default();
        let bind_address = var("BIND_ADDRESS").unwrap_or(server_defaults.bind_address);
        let public_base_url = var("PUBLIC_BASE_URL")
            .unwrap_or(server_defaults.public_base_url)
            .trim_end_matches('/')
            .to_string();
        let cors_allowed_origins = var("CORS_ALLOWED_ORIGINS")
            .map(|origins| split_list(&origins))
            .unwrap_or(server_defaults.cors_allowed_origins);

        let max_upload_size = parse_or(var("MAX_UPLOAD_SIZE"), "MAX_UPLOAD_SIZE", 50 * 1024 * 1024)?; // 50MB
        let default_user_id = var("DEFAULT_USER_ID").unwrap_or_else(|| "default-user".to_string());
        let audit_log_dir = match var("AUDIT_LOG_DIR") {
            Some(dir) if dir.eq_ignore_ascii_case("none") => None,
            Some(dir) => Some(dir),
            None => Some("./logs".to_string()),
        };

        let storage_backend = match var("STORAGE_BACKEND")
            .unwrap_or_else(|| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "s3" => StorageBackend::S3,
            "none" | "disabled" => StorageBackend::Disabled,
            "local" => StorageBackend::Local,
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "STORAGE_BACKEND must be one of local, s3, none (got '{other}')"
                )))
            }
        };

        let s3 = match (
            var("AWS_BUCKET_NAME"),
            var("AWS_REGION"),
            var("AWS_ACCESS_KEY_ID"),
            var("AWS_SECRET_ACCESS_KEY"),
        ) {
            (Some(bucket), Some(region), Some(access_key_id), Some(secret_access_key)) => {
                let endpoint = var("AWS_S3_ENDPOINT")
                    .unwrap_or_else(|| format!("https://s3.{region}.amazonaws.com"))
                    .trim_end_matches('/')
                    .to_string();
                Some(S3Config {
                    bucket,
                    region,
                    access_key_id,
                    secret_access_key,
                    session_token: var("AWS_SESSION_TOKEN"),
                    endpoint,
                })
            }
            _ => None,
        };

        let database_backend = match var("DATABASE_BACKEND")
            .unwrap_or_else(|| "redb".to_string())
            .to_lowercase()
            .as_str()
        {
            "mysql" => DatabaseBackend::MySql,
            "redb" => DatabaseBackend::Redb,
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "DATABASE_BACKEND must be one of redb, mysql (got '{other}')"
                )))
            }
        };

        let mysql = match (var("DB_HOST"), var("DB_USER"), var("DB_NAME")) {
            (Some(host), Some(user), Some(database)) => Some(MySqlConfig {
                host,
                port: parse_or(var("DB_PORT"), "DB_PORT", 3306)?,
                user,
                password: lookup("DB_PASSWORD").unwrap_or_default(),
                database,
                pool_size: parse_or(var("DB_POOL_SIZE"), "DB_POOL_SIZE", 10)?,
            }),
            _ => None,
        };

        let config = Config {
            server: ServerConfig {
                bind_address,
                public_base_url,
                cors_allowed_origins,
            },
            storage: StorageConfig {
                backend: storage_backend,
                local_storage_path: var("LOCAL_STORAGE_PATH")
                    .unwrap_or_else(|| "./files".to_string()),
                local_signing_secret: var("LOCAL_SIGNING_SECRET"),
                s3,
            },
            database: DatabaseConfig {
                backend: database_backend,
                data_dir: var("DATA_DIR").unwrap_or_else(|| "./data".to_string()),
                mysql,
            },
            max_upload_size,
            default_user_id,
            audit_log_dir,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_upload_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_UPLOAD_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.database.backend == DatabaseBackend::MySql {
            match &self.database.mysql {
                None => {
                    return Err(ConfigError::ValidationError(
                        "DB_HOST, DB_USER and DB_NAME are required when DATABASE_BACKEND=mysql"
                            .to_string(),
                    ))
                }
                Some(mysql) if mysql.pool_size == 0 => {
                    return Err(ConfigError::ValidationError(
                        "DB_POOL_SIZE must be greater than 0".to_string(),
                    ))
                }
                Some(_) => {}
            }
        }

        if let Some(ref s3) = self.storage.s3 {
            if reqwest::Url::parse(&s3.endpoint).is_err() {
                return Err(ConfigError::ValidationError(format!(
                    "AWS_S3_ENDPOINT is not a valid URL: {}",
                    s3.endpoint
                )));
            }
        }

        if self.storage.backend == StorageBackend::S3 && self.storage.s3.is_none() {
            tracing::warn!(
                "STORAGE_BACKEND=s3 but AWS_BUCKET_NAME, AWS_REGION, AWS_ACCESS_KEY_ID or \
                 AWS_SECRET_ACCESS_KEY is missing. Uploads will use fallback URLs."
            );
        }

        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(raw) => raw.parse().map_err(|_| {
            ConfigError::ValidationError(format!("{name} must be a number (got '{raw}')"))
        }),
        None => Ok(default),
    }
}
