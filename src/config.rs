use crate::models::network::{rpc_env_var, NetworkConfig, SUPPORTED_NETWORKS};
use anyhow::{bail, Context, Result};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Testnet,
    Production,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,

    // Chain access
    pub networks: Vec<NetworkConfig>,
    pub rpc_timeout: Duration,

    // Redis (shared store for tasks, verifications and rate limits)
    pub redis_url: Option<String>,

    // Rate Limiting (fixed window, per client)
    pub rate_limit_per_window: u64,
    pub rate_limit_window: Duration,
    /// Key clients by `X-Forwarded-For`; only behind a proxy that sets it.
    pub trust_forwarded_for: bool,

    pub task_cache_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = Self::parse_environment(lookup("ENVIRONMENT"))?;

        let config = Self {
            environment,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: lookup("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse()
                .context("Invalid PORT")?,

            networks: Self::parse_networks(&lookup),
            rpc_timeout: Duration::from_secs(
                lookup("RPC_TIMEOUT_SECS")
                    .unwrap_or_else(|| "10".to_string())
                    .parse()
                    .context("Invalid RPC_TIMEOUT_SECS")?,
            ),

            redis_url: lookup("REDIS_URL").filter(|url| !url.trim().is_empty()),

            rate_limit_per_window: lookup("RATE_LIMIT_PER_WINDOW")
                .unwrap_or_else(|| "20".to_string())
                .parse()
                .context("Invalid RATE_LIMIT_PER_WINDOW")?,
            rate_limit_window: Duration::from_secs(
                lookup("RATE_LIMIT_WINDOW_SECS")
                    .unwrap_or_else(|| "60".to_string())
                    .parse()
                    .context("Invalid RATE_LIMIT_WINDOW_SECS")?,
            ),
            trust_forwarded_for: lookup("TRUST_FORWARDED_FOR")
                .unwrap_or_else(|| "false".to_string())
                .to_lowercase()
                .parse()
                .context("Invalid TRUST_FORWARDED_FOR")?,

            task_cache_ttl: Duration::from_secs(
                lookup("TASK_CACHE_TTL_SECS")
                    .unwrap_or_else(|| "60".to_string())
                    .parse()
                    .context("Invalid TASK_CACHE_TTL_SECS")?,
            ),
        };

        config.validate()?;
        Ok(config)
    }

    fn parse_environment(value: Option<String>) -> Result<Environment> {
        let env = value.unwrap_or_else(|| "development".to_string());

        match env.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testnet" | "test" => Ok(Environment::Testnet),
            "production" | "prod" => Ok(Environment::Production),
            _ => bail!("Unknown environment: {}", env),
        }
    }

    fn parse_networks<F>(lookup: &F) -> Vec<NetworkConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        SUPPORTED_NETWORKS
            .iter()
            .filter_map(|(name, chain_id)| {
                lookup(&rpc_env_var(name)).map(|rpc_url| NetworkConfig {
                    name: name.to_string(),
                    chain_id: *chain_id,
                    rpc_url,
                })
            })
            .collect()
    }

    fn validate(&self) -> Result<()> {
        if self.networks.is_empty() {
            bail!("No networks configured, set at least one RPC_URL_<NETWORK> (e.g. RPC_URL_SEPOLIA)");
        }
        for network in &self.networks {
            if !network.rpc_url.starts_with("http") {
                bail!("{} must be HTTP(S) URL", rpc_env_var(&network.name));
            }
        }

        if self.environment == Environment::Production && self.redis_url.is_none() {
            bail!("REDIS_URL required in production");
        }

        if self.rate_limit_window.is_zero() {
            bail!("RATE_LIMIT_WINDOW_SECS must be positive");
        }

        tracing::info!(
            networks = self.networks.len(),
            "Configuration validated for {:?} environment",
            self.environment
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_with_one_network() {
        let config =
            Config::from_lookup(lookup_from(&[("RPC_URL_SEPOLIA", "https://rpc.sepolia.org")]))
                .unwrap();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.port, 8080);
        assert_eq!(config.networks.len(), 1);
        assert_eq!(config.networks[0].name, "sepolia");
        assert_eq!(config.networks[0].chain_id, 11_155_111);
        assert_eq!(config.rpc_timeout, Duration::from_secs(10));
        assert_eq!(config.rate_limit_per_window, 20);
        assert!(!config.trust_forwarded_for);
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn forwarded_for_trust_is_opt_in() {
        let vars = [
            ("RPC_URL_SEPOLIA", "https://rpc.sepolia.org"),
            ("TRUST_FORWARDED_FOR", "TRUE"),
        ];
        assert!(Config::from_lookup(lookup_from(&vars)).unwrap().trust_forwarded_for);

        let vars = [
            ("RPC_URL_SEPOLIA", "https://rpc.sepolia.org"),
            ("TRUST_FORWARDED_FOR", "yes please"),
        ];
        assert!(Config::from_lookup(lookup_from(&vars)).is_err());
    }

    #[test]
    fn requires_a_network() {
        assert!(Config::from_lookup(lookup_from(&[])).is_err());
    }

    #[test]
    fn rejects_non_http_rpc() {
        let result = Config::from_lookup(lookup_from(&[("RPC_URL_BASE", "ws://node:8546")]));
        assert!(result.is_err());
    }

    #[test]
    fn production_requires_redis() {
        let vars = [
            ("ENVIRONMENT", "production"),
            ("RPC_URL_MAINNET", "https://eth.example.com"),
        ];
        assert!(Config::from_lookup(lookup_from(&vars)).is_err());

        let vars = [
            ("ENVIRONMENT", "prod"),
            ("RPC_URL_MAINNET", "https://eth.example.com"),
            ("REDIS_URL", "redis://cache:6379"),
        ];
        let config = Config::from_lookup(lookup_from(&vars)).unwrap();
        assert_eq!(config.environment, Environment::Production);
    }
}
