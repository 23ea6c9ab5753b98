use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,
    pub log_dir: String,
    pub settings_cache_ttl_secs: u64,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn or_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has invalid value {raw:?}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Read configuration from the environment (after `.env` is loaded).
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: or_default("ACCESS_TOKEN_TTL", 900)?, // 15 min
            refresh_token_ttl: or_default("REFRESH_TOKEN_TTL", 604_800)?, // 7 days

            rate_login_per_min: or_default("RATE_LOGIN_PER_MIN", 60)?,
            rate_refresh_per_min: or_default("RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: or_default("RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
            settings_cache_ttl_secs: or_default("SETTINGS_CACHE_TTL_SECS", 60)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Keys are unique to each test so parallel tests don't race on env.
    #[test]
    fn default_used_when_unset() {
        let v: u32 = or_default("GEO_ATT_TEST_UNSET_KEY", 42).unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn invalid_value_is_an_error() {
        unsafe { env::set_var("GEO_ATT_TEST_BAD_NUMBER", "ten") };
        let err = or_default::<u32>("GEO_ATT_TEST_BAD_NUMBER", 1).unwrap_err();
        assert!(err.to_string().contains("GEO_ATT_TEST_BAD_NUMBER"));
    }

    #[test]
    fn missing_required_names_the_key() {
        let err = required("GEO_ATT_TEST_REQUIRED_MISSING").unwrap_err();
        assert_eq!(err.to_string(), "GEO_ATT_TEST_REQUIRED_MISSING must be set");
    }
}
