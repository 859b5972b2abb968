use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use tribu_api::state::Settings;

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

const DEFAULT_MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;

/// Log filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "tribu=debug,tribu_api=debug,tribu_db=debug,tower_http=debug";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub settings: Settings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset keys take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let secret_key = lookup("TRIBU_SECRET_KEY").unwrap_or_default();
        if secret_key.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&secret_key.as_str()) {
            bail!("TRIBU_SECRET_KEY is unset or still a placeholder");
        }

        let host = lookup("TRIBU_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("TRIBU_PORT")
            .unwrap_or_else(|| "8000".into())
            .parse()
            .context("TRIBU_PORT must be a port number")?;
        let db_path: PathBuf = lookup("TRIBU_DB_PATH")
            .unwrap_or_else(|| "tribu.db".into())
            .into();
        let media_dir: PathBuf = lookup("TRIBU_MEDIA_DIR")
            .unwrap_or_else(|| "./media".into())
            .into();
        let session_days: i64 = match lookup("TRIBU_SESSION_DAYS") {
            Some(raw) => raw.parse().context("TRIBU_SESSION_DAYS must be a number of days")?,
            None => 14,
        };
        if session_days <= 0 {
            bail!("TRIBU_SESSION_DAYS must be positive");
        }
        let max_avatar_bytes: usize = match lookup("TRIBU_MAX_AVATAR_BYTES") {
            Some(raw) => raw.parse().context("TRIBU_MAX_AVATAR_BYTES must be a byte count")?,
            None => DEFAULT_MAX_AVATAR_BYTES,
        };

        Ok(Self {
            host,
            port,
            db_path,
            settings: Settings {
                secret_key,
                session_days,
                media_dir,
                max_avatar_bytes,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let cfg = config(&[("TRIBU_SECRET_KEY", "a-long-random-value")]).unwrap();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.db_path, PathBuf::from("tribu.db"));
        assert_eq!(cfg.settings.media_dir, PathBuf::from("./media"));
        assert_eq!(cfg.settings.session_days, 14);
        assert_eq!(cfg.settings.max_avatar_bytes, 2 * 1024 * 1024);
    }

    #[test]
    fn missing_or_placeholder_secret_is_rejected() {
        assert!(config(&[]).is_err());
        assert!(config(&[("TRIBU_SECRET_KEY", "dev-secret-change-me")]).is_err());
        assert!(config(&[("TRIBU_SECRET_KEY", "   ")]).is_err());
    }

    #[test]
    fn malformed_numbers_are_errors() {
        assert!(config(&[("TRIBU_SECRET_KEY", "k3y"), ("TRIBU_PORT", "http")]).is_err());
        assert!(config(&[("TRIBU_SECRET_KEY", "k3y"), ("TRIBU_SESSION_DAYS", "0")]).is_err());
        let cfg = config(&[("TRIBU_SECRET_KEY", "k3y"), ("TRIBU_MAX_AVATAR_BYTES", "1024")]).unwrap();
        assert_eq!(cfg.settings.max_avatar_bytes, 1024);
    }

    #[test]
    fn default_log_filter_covers_every_crate() {
        for target in ["tribu=", "tribu_api=", "tribu_db=", "tower_http="] {
            assert!(DEFAULT_LOG_FILTER.split(',').any(|d| d.starts_with(target)), "{target}");
        }
        assert!(DEFAULT_LOG_FILTER.parse::<tracing_subscriber::EnvFilter>().is_ok());
    }
}
