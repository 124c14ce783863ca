//! Runtime configuration, read from the environment at startup
use anyhow::{Context, Result};
use std::net::SocketAddr;

pub const BIND_ADDR_VAR: &str = "LISTINGS_BIND_ADDR";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const DATABASE_POOL_SIZE_VAR: &str = "DATABASE_POOL_SIZE";

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5001";
pub const DEFAULT_DATABASE_POOL_SIZE: u32 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// `None` keeps all listings in memory
    pub database_url: Option<String>,
    pub database_pool_size: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| var(name).filter(|value| !value.trim().is_empty());

        let bind_addr = var(BIND_ADDR_VAR)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned())
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid {BIND_ADDR_VAR}"))?;

        let database_pool_size = match var(DATABASE_POOL_SIZE_VAR) {
            Some(size) => size
                .trim()
                .parse::<u32>()
                .with_context(|| format!("invalid {DATABASE_POOL_SIZE_VAR}: {size:?}"))?,
            None => DEFAULT_DATABASE_POOL_SIZE,
        };
        if database_pool_size == 0 {
            anyhow::bail!("{DATABASE_POOL_SIZE_VAR} must be at least 1");
        }

        Ok(Self {
            bind_addr,
            database_url: var(DATABASE_URL_VAR),
            database_pool_size,
        })
    }
}
