use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::AppError;

/// Process configuration, read once at startup. The cache root lives here
/// and is handed to the content store at construction; nothing else reads
/// it from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub cache_root: PathBuf,
    pub bind_addr: SocketAddr,
    pub refresh_interval_secs: Option<u64>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://coursebase.db".to_string());

        let cache_root = env::var("CACHE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("cache"));

        let bind_addr = match env::var("BIND_ADDR") {
            Ok(s) => s
                .parse()
                .map_err(|_| AppError::BadRequest(format!("BIND_ADDR is not a valid socket address: {s}")))?,
            Err(_) => SocketAddr::from(([127, 0, 0, 1], 3000)),
        };

        let refresh_interval_secs = match env::var("REFRESH_INTERVAL_SECS") {
            Ok(s) => Some(s.parse().map_err(|_| {
                AppError::BadRequest(format!("REFRESH_INTERVAL_SECS is not a number: {s}"))
            })?),
            Err(_) => None,
        };

        Ok(Self {
            database_url,
            cache_root,
            bind_addr,
            refresh_interval_secs,
        })
    }
}
