use crate::domain::{Decimal, WalletAddress};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub yields_api_url: String,
    pub pool_cache_ttl: Duration,
    pub distribution_enabled: bool,
    pub apr_penalty_pct: Decimal,
    pub min_apr_for_penalty: Decimal,
    pub session_ttl: Duration,
    pub session_activity_interval: Duration,
    pub admin_wallets: Vec<WalletAddress>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let yields_api_url = env_map
            .get("YIELDS_API_URL")
            .cloned()
            .unwrap_or_else(|| "https://yields.llama.fi".to_string())
            .trim_end_matches('/')
            .to_string();

        let pool_cache_ttl = Duration::from_secs(parse_secs(&env_map, "POOL_CACHE_TTL_SECS", 300)?);

        let distribution_enabled = match env_map
            .get("DAILY_APR_DISTRIBUTION_ENABLED")
            .map(|s| s.trim().to_lowercase())
            .as_deref()
            .unwrap_or("true")
        {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "DAILY_APR_DISTRIBUTION_ENABLED".to_string(),
                    format!("must be true or false, got {}", other),
                ))
            }
        };

        let apr_penalty_pct = parse_decimal(&env_map, "APR_PENALTY_PCT", "7.73")?;
        let min_apr_for_penalty = parse_decimal(&env_map, "MIN_APR_FOR_PENALTY", "30")?;

        let session_ttl = Duration::from_secs(parse_secs(&env_map, "SESSION_TTL_SECS", 604_800)?);
        let session_activity_interval =
            Duration::from_secs(parse_secs(&env_map, "SESSION_ACTIVITY_INTERVAL_SECS", 300)?);

        let admin_wallets = parse_admin_wallets_from_map(&env_map)?;

        Ok(Config {
            port,
            database_path,
            yields_api_url,
            pool_cache_ttl,
            distribution_enabled,
            apr_penalty_pct,
            min_apr_for_penalty,
            session_ttl,
            session_activity_interval,
            admin_wallets,
        })
    }

    pub fn is_admin(&self, wallet: &WalletAddress) -> bool {
        self.admin_wallets.contains(wallet)
    }
}

fn parse_secs(
    env_map: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
            ConfigError::InvalidValue(
                key.to_string(),
                "must be a whole number of seconds".to_string(),
            )
        }),
    }
}

fn parse_decimal(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<Decimal, ConfigError> {
    let raw = env_map.get(key).map(|s| s.as_str()).unwrap_or(default);
    let value = Decimal::from_str(raw).map_err(|_| {
        ConfigError::InvalidValue(key.to_string(), "must be a decimal number".to_string())
    })?;
    if value.is_negative() {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must not be negative".to_string(),
        ));
    }
    Ok(value)
}

fn parse_admin_wallets_from_map(
    env_map: &HashMap<String, String>,
) -> Result<Vec<WalletAddress>, ConfigError> {
    match env_map.get("ADMIN_WALLETS") {
        None => Ok(Vec::new()),
        Some(list) => list
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                WalletAddress::from_str(s).map_err(|e| {
                    ConfigError::InvalidValue("ADMIN_WALLETS".to_string(), e.to_string())
                })
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.yields_api_url, "https://yields.llama.fi");
        assert_eq!(config.pool_cache_ttl, Duration::from_secs(300));
        assert!(config.distribution_enabled);
        assert_eq!(config.apr_penalty_pct.to_canonical_string(), "7.73");
        assert_eq!(config.min_apr_for_penalty, Decimal::from_i64(30));
        assert_eq!(config.session_ttl, Duration::from_secs(7 * 24 * 3600));
        assert_eq!(config.session_activity_interval, Duration::from_secs(300));
        assert!(config.admin_wallets.is_empty());
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_distribution_can_be_disabled() {
        let mut env_map = setup_required_env();
        env_map.insert(
            "DAILY_APR_DISTRIBUTION_ENABLED".to_string(),
            "false".to_string(),
        );
        let config = Config::from_env_map(env_map).unwrap();
        assert!(!config.distribution_enabled);
    }

    #[test]
    fn test_invalid_distribution_flag() {
        let mut env_map = setup_required_env();
        env_map.insert(
            "DAILY_APR_DISTRIBUTION_ENABLED".to_string(),
            "sometimes".to_string(),
        );
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => {
                assert_eq!(k, "DAILY_APR_DISTRIBUTION_ENABLED")
            }
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_penalty() {
        let mut env_map = setup_required_env();
        env_map.insert("APR_PENALTY_PCT".to_string(), "-1".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "APR_PENALTY_PCT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_admin_wallets_are_normalised() {
        let mut env_map = setup_required_env();
        env_map.insert(
            "ADMIN_WALLETS".to_string(),
            " 0xABCDEF0000000000000000000000000000000001, ,".to_string(),
        );
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.admin_wallets.len(), 1);
        let wallet =
            WalletAddress::from_str("0xabcdef0000000000000000000000000000000001").unwrap();
        assert!(config.is_admin(&wallet));
    }

    #[test]
    fn test_invalid_admin_wallet() {
        let mut env_map = setup_required_env();
        env_map.insert("ADMIN_WALLETS".to_string(), "alice".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "ADMIN_WALLETS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }
}
