use anyhow::{bail, Context, Result};
use ethers::types::Address;
use std::str::FromStr;

/// USDC on Avalanche Fuji.
pub const FUJI_USDC_ADDRESS: &str = "0x5425890298aed601595a70AB815c96711a31Bc65";
pub const FUJI_CHAIN_ID: u64 = 43113;
pub const FUJI_RPC_URL: &str = "https://api.avax-test.network/ext/bc/C/rpc";

#[derive(Debug, Clone, PartialEq, Eq)]
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

    // Public base URL used to build claim links
    pub app_url: String,

    // Storage
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,

    // Chain
    pub rpc_url: String,
    pub chain_id: u64,
    pub usdc_address: Address,
    pub sponsor_address: Address,
    pub sponsor_private_key: Option<String>,
    pub verify_funding: bool,

    // Email
    pub resend_api_key: Option<String>,
    pub resend_api_url: String,
    pub from_email: String,

    pub claim_lock_ttl_secs: u64,
    pub payout_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let environment = Self::parse_environment()?;
        let sponsor_private_key = optional_var("SPONSOR_WALLET_PRIVATE_KEY").map(normalize_key);

        let config = Self {
            environment,
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid PORT")?,

            app_url: std::env::var("APP_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),

            database_url: optional_var("DATABASE_URL"),
            database_max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,
            redis_url: optional_var("REDIS_URL"),

            rpc_url: std::env::var("RPC_URL").unwrap_or_else(|_| FUJI_RPC_URL.to_string()),
            chain_id: std::env::var("CHAIN_ID")
                .unwrap_or_else(|_| FUJI_CHAIN_ID.to_string())
                .parse()
                .context("Invalid CHAIN_ID")?,
            usdc_address: Address::from_str(
                &std::env::var("USDC_ADDRESS").unwrap_or_else(|_| FUJI_USDC_ADDRESS.to_string()),
            )
            .context("Invalid address for USDC_ADDRESS")?,
            sponsor_address: Self::sponsor_address(sponsor_private_key.as_deref())?,
            sponsor_private_key,
            verify_funding: parse_bool("VERIFY_FUNDING", true)?,

            resend_api_key: optional_var("RESEND_API_KEY"),
            resend_api_url: std::env::var("RESEND_API_URL")
                .unwrap_or_else(|_| "https://api.resend.com".to_string()),
            from_email: std::env::var("FROM_EMAIL")
                .unwrap_or_else(|_| "noreply@beam-app.com".to_string()),

            claim_lock_ttl_secs: std::env::var("CLAIM_LOCK_TTL_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .context("Invalid CLAIM_LOCK_TTL_SECS")?,
            payout_timeout_secs: std::env::var("PAYOUT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "45".to_string())
                .parse()
                .context("Invalid PAYOUT_TIMEOUT_SECS")?,
        };

        config.validate()?;
        Ok(config)
    }

    fn parse_environment() -> Result<Environment> {
        let env = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        match env.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testnet" | "test" => Ok(Environment::Testnet),
            "production" | "prod" => Ok(Environment::Production),
            _ => bail!("Unknown environment: {}", env),
        }
    }

    /// The sponsor address comes from SPONSOR_WALLET_ADDRESS, or is derived
    /// from the private key when only the key is set.
    fn sponsor_address(private_key: Option<&str>) -> Result<Address> {
        if let Some(addr) = optional_var("SPONSOR_WALLET_ADDRESS") {
            return Address::from_str(&addr).context("Invalid address for SPONSOR_WALLET_ADDRESS");
        }

        let Some(key) = private_key else {
            bail!("SPONSOR_WALLET_ADDRESS or SPONSOR_WALLET_PRIVATE_KEY required");
        };

        use ethers::signers::{LocalWallet, Signer};
        let wallet = key
            .parse::<LocalWallet>()
            .context("Invalid SPONSOR_WALLET_PRIVATE_KEY")?;
        Ok(wallet.address())
    }

    fn validate(&self) -> Result<()> {
        if !self.rpc_url.starts_with("http") {
            bail!("RPC_URL must be HTTP(S) URL");
        }
        if !self.app_url.starts_with("http") {
            bail!("APP_URL must be HTTP(S) URL");
        }
        if !self.resend_api_url.starts_with("http") {
            bail!("RESEND_API_URL must be HTTP(S) URL");
        }
        check_payout_window(self.payout_timeout_secs, self.claim_lock_ttl_secs)?;

        if self.environment == Environment::Production {
            if self.database_url.is_none() {
                bail!("DATABASE_URL required in production");
            }
            if !self.verify_funding {
                bail!("VERIFY_FUNDING cannot be disabled in production");
            }
        }

        if self.sponsor_private_key.is_none() {
            tracing::warn!("SPONSOR_WALLET_PRIVATE_KEY not set, claims will fail");
        }
        if !self.verify_funding {
            tracing::warn!("Funding verification disabled, transfers are recorded without on-chain proof");
        }

        tracing::info!(
            "Configuration validated for {:?} environment",
            self.environment
        );

        Ok(())
    }
}

/// Broadcast and confirmation each get `payout_timeout_secs`, and the claim
/// lock must outlive both.
fn check_payout_window(payout_timeout_secs: u64, claim_lock_ttl_secs: u64) -> Result<()> {
    if payout_timeout_secs == 0 {
        bail!("PAYOUT_TIMEOUT_SECS must be positive");
    }
    if claim_lock_ttl_secs <= payout_timeout_secs.saturating_mul(2) {
        bail!(
            "CLAIM_LOCK_TTL_SECS ({}) must exceed twice PAYOUT_TIMEOUT_SECS ({})",
            claim_lock_ttl_secs,
            payout_timeout_secs
        );
    }
    Ok(())
}

fn optional_var(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(var: &str, default: bool) -> Result<bool> {
    match optional_var(var) {
        None => Ok(default),
        Some(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => bail!("Invalid boolean for {}: {}", var, v),
        },
    }
}

/// Keys are accepted with or without the 0x prefix.
fn normalize_key(key: String) -> String {
    let key = key.trim();
    if key.starts_with("0x") {
        key.to_string()
    } else {
        format!("0x{}", key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_private_key_prefix() {
        assert_eq!(normalize_key("abcd".to_string()), "0xabcd");
        assert_eq!(normalize_key(" 0xabcd ".to_string()), "0xabcd");
    }

    #[test]
    fn parses_boolean_flags() {
        std::env::set_var("BEAM_TEST_FLAG_ON", "yes");
        std::env::set_var("BEAM_TEST_FLAG_OFF", "0");
        std::env::set_var("BEAM_TEST_FLAG_BAD", "maybe");

        assert!(parse_bool("BEAM_TEST_FLAG_ON", false).unwrap());
        assert!(!parse_bool("BEAM_TEST_FLAG_OFF", true).unwrap());
        assert!(parse_bool("BEAM_TEST_FLAG_BAD", true).is_err());
        assert!(parse_bool("BEAM_TEST_FLAG_UNSET", true).unwrap());
    }

    #[test]
    fn claim_lock_must_outlive_payout() {
        assert!(check_payout_window(45, 120).is_ok());
        assert!(check_payout_window(60, 120).is_err());
        assert!(check_payout_window(0, 120).is_err());
        assert!(check_payout_window(10, 0).is_err());
    }
}
