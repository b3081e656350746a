use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::AppError;
use crate::remote::RemoteConfig;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub remote: RemoteConfig,
    pub probe_interval_secs: u64,
}

impl AppConfig {
    /// Read settings from the environment. Call `dotenvy::dotenv()` first to
    /// pick up a `.env` file.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .unwrap_or_else(|| "sqlite://swarnabindu.db?mode=rwc".to_string());

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "127.0.0.1:3000".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| AppError::Config(format!("BIND_ADDR is invalid: {}", e)))?;

        let base_url = lookup("REMOTE_URL")
            .ok_or_else(|| AppError::Config("REMOTE_URL is not set".to_string()))?;
        let api_key = lookup("REMOTE_API_KEY")
            .ok_or_else(|| AppError::Config("REMOTE_API_KEY is not set".to_string()))?;

        let remote = RemoteConfig {
            base_url,
            api_key,
            registrations_table: lookup("REGISTRATIONS_TABLE")
                .unwrap_or_else(|| "registrations".to_string()),
            screenings_table: lookup("SCREENINGS_TABLE")
                .unwrap_or_else(|| "screenings".to_string()),
            timeout: Duration::from_secs(positive_secs(&lookup, "REMOTE_TIMEOUT_SECS", 15)?),
        };

        Ok(Self {
            database_url,
            bind_addr,
            remote,
            probe_interval_secs: positive_secs(&lookup, "PROBE_INTERVAL_SECS", 30)?,
        })
    }
}

fn positive_secs<F>(lookup: &F, key: &str, default: u64) -> Result<u64, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(0) | Err(_) => Err(AppError::Config(format!(
                "{} must be a positive number of seconds, got {:?}",
                key, raw
            ))),
            Ok(secs) => Ok(secs),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_remote_is_set() {
        let config = AppConfig::from_lookup(lookup(&[
            ("REMOTE_URL", "https://example.supabase.co"),
            ("REMOTE_API_KEY", "anon"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.remote.registrations_table, "registrations");
        assert_eq!(config.remote.timeout, Duration::from_secs(15));
        assert_eq!(config.probe_interval_secs, 30);
    }

    #[test]
    fn missing_remote_is_a_config_error() {
        let err = AppConfig::from_lookup(lookup(&[("REMOTE_API_KEY", "anon")])).unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("REMOTE_URL")));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[
            ("REMOTE_URL", "https://example.supabase.co"),
            ("REMOTE_API_KEY", "anon"),
            ("REMOTE_TIMEOUT_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
