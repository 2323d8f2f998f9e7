//! Gateway configuration, loaded once at startup from the environment.

use crate::address::Address;
use anyhow::{Context, Result};

/// Datasource backend selected by `DATASOURCE_TYPE`.
///
/// `hyperliquid` is the only implemented backend; any other value is an
/// `UnsupportedDatasource` startup failure (spec §6/§7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasourceType {
    Hyperliquid,
}

impl DatasourceType {
    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "hyperliquid" => Ok(Self::Hyperliquid),
            other => anyhow::bail!("unsupported DATASOURCE_TYPE: {other}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub target_builder: Option<Address>,
    pub datasource_type: DatasourceType,
    pub upstream_base_url: String,
    pub cache_fills_ttl_ms: u64,
    pub cache_clearinghouse_ttl_ms: u64,
    pub max_start_capital: f64,
    pub log_level: String,
    pub rate_limit_max_weight: u32,
    pub rate_limit_window_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        let target_builder = match std::env::var("TARGET_BUILDER") {
            Ok(raw) if !raw.trim().is_empty() => {
                Some(Address::parse(&raw).context("invalid TARGET_BUILDER address")?)
            }
            _ => None,
        };

        let datasource_type = DatasourceType::parse(
            &std::env::var("DATASOURCE_TYPE").unwrap_or_else(|_| "hyperliquid".to_string()),
        )?;

        let upstream_base_url = std::env::var("UPSTREAM_BASE_URL")
            .unwrap_or_else(|_| "https://api.hyperliquid.xyz".to_string());

        let cache_fills_ttl_ms = std::env::var("CACHE_FILLS_TTL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60_000);

        let cache_clearinghouse_ttl_ms = std::env::var("CACHE_CLEARINGHOUSE_TTL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5_000);

        let max_start_capital = std::env::var("MAX_START_CAPITAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1_000_000.0);

        let log_level = std::env::var("LOG_LEVEL")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".to_string());

        let rate_limit_max_weight = std::env::var("RATE_LIMIT_MAX_WEIGHT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1200);

        let rate_limit_window_ms = std::env::var("RATE_LIMIT_WINDOW_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60_000);

        Ok(Self {
            port,
            target_builder,
            datasource_type,
            upstream_base_url,
            cache_fills_ttl_ms,
            cache_clearinghouse_ttl_ms,
            max_start_capital,
            log_level,
            rate_limit_max_weight,
            rate_limit_window_ms,
        })
    }
}
