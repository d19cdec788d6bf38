use std::{
    env,
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};

const DEFAULT_HOST: [u8; 4] = [127, 0, 0, 1];
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_PICTURE_DIR: &str = "static/profile_pics";
const DEFAULT_STATIC_DIR: &str = "static";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Deployment settings read once at startup and shared through `AppState`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    pub picture_dir: PathBuf,
    pub static_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        Ok(Self {
            database_url,
            host: parse_var("HOST", IpAddr::from(DEFAULT_HOST))?,
            port: parse_var("PORT", DEFAULT_PORT)?,
            picture_dir: path_var("PICTURE_DIR", DEFAULT_PICTURE_DIR),
            static_dir: path_var("STATIC_DIR", DEFAULT_STATIC_DIR),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
        })
    }

    /// Configuration for tests and tooling: everything default except the
    /// database location and the picture directory.
    pub fn with_paths(database_url: impl Into<String>, picture_dir: impl Into<PathBuf>) -> Self {
        Self {
            database_url: database_url.into(),
            host: IpAddr::from(DEFAULT_HOST),
            port: DEFAULT_PORT,
            picture_dir: picture_dir.into(),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        _ => Ok(default),
    }
}

fn path_var(key: &str, default: &str) -> PathBuf {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}
