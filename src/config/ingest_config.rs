use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

use crate::infrastructure::ingest::decoder::DexPrograms;

/// Which pool-event driver runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolSourceKind {
    Push,
    Log,
}

impl FromStr for PoolSourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "push" => Ok(PoolSourceKind::Push),
            "log" => Ok(PoolSourceKind::Log),
            _ => anyhow::bail!("Invalid POOL_SOURCE: {}. Must be 'push' or 'log'", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestEnvConfig {
    pub pool_source: PoolSourceKind,
    pub push_endpoint: String,
    pub push_token: String,
    pub programs: DexPrograms,
}

impl IngestEnvConfig {
    pub fn from_env() -> Result<Self> {
        let pool_source = env::var("POOL_SOURCE")
            .unwrap_or_else(|_| "log".to_string())
            .parse::<PoolSourceKind>()?;

        let push_endpoint = env::var("PUSH_ENDPOINT").unwrap_or_default();
        let push_token = env::var("PUSH_TOKEN").unwrap_or_default();
        if pool_source == PoolSourceKind::Push && push_endpoint.is_empty() {
            anyhow::bail!("POOL_SOURCE=push requires PUSH_ENDPOINT");
        }

        let mut programs = DexPrograms::default();
        if let Ok(raw) = env::var("DEX_PROGRAMS_JSON") {
            programs = serde_json::from_str(&raw).context("Failed to parse DEX_PROGRAMS_JSON")?;
        }

        Ok(Self {
            pool_source,
            push_endpoint,
            push_token,
            programs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_source_parsing() {
        assert_eq!("push".parse::<PoolSourceKind>().unwrap(), PoolSourceKind::Push);
        assert_eq!("LOG".parse::<PoolSourceKind>().unwrap(), PoolSourceKind::Log);
        assert!("geyser".parse::<PoolSourceKind>().is_err());
    }
}
