use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use tracing::warn;

const DEV_SECRET: &str = "dev-secret-change-me";

/// Server settings, read from `PARLEY_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub db_pool: usize,
    pub jwt_secret: String,
    pub photo_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = env_or("PARLEY_HOST", "0.0.0.0");
        let port: u16 = env_or("PARLEY_PORT", "3000")
            .parse()
            .context("PARLEY_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", host, port))?;

        let db_pool: usize = env_or("PARLEY_DB_POOL", &parley_db::DEFAULT_POOL_SIZE.to_string())
            .parse()
            .context("PARLEY_DB_POOL must be a positive integer")?;
        if db_pool == 0 {
            anyhow::bail!("PARLEY_DB_POOL must be at least 1");
        }

        let jwt_secret = env_or("PARLEY_JWT_SECRET", DEV_SECRET);
        if jwt_secret == DEV_SECRET {
            warn!("PARLEY_JWT_SECRET not set, using the development secret");
        }

        Ok(Self {
            addr,
            db_path: PathBuf::from(env_or("PARLEY_DB_PATH", "parley.db")),
            db_pool,
            jwt_secret,
            photo_dir: PathBuf::from(env_or("PARLEY_PHOTO_DIR", "photos")),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
