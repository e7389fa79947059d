use std::time::Duration;

use crate::auth::qr::DEFAULT_QR_TTL;

/// Requests per minute per client address; zero disables a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub login: u32,
    pub qr_generate: u32,
    pub qr_poll: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            login: 10,
            qr_generate: 10,
            qr_poll: 120,
        }
    }
}

/// Runtime settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// RocksDB directory, or `:memory:` for a throwaway in-process store.
    pub db_path: String,
    pub store_timeout: Duration,
    pub qr_ttl: Duration,
    pub cors_allow_any: bool,
    pub rate_limits: RateLimits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: "companion_db".to_string(),
            store_timeout: Duration::from_millis(5000),
            qr_ttl: DEFAULT_QR_TTL,
            cors_allow_any: true,
            rate_limits: RateLimits::default(),
        }
    }
}

impl Config {
    pub const MEMORY_DB: &'static str = ":memory:";

    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Ok(Self {
            port: dotenvy::var("PORT")
                .unwrap_or_else(|_| defaults.port.to_string())
                .parse()?,

            db_path: dotenvy::var("DB_PATH").unwrap_or(defaults.db_path),

            store_timeout: dotenvy::var("STORE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_timeout),

            qr_ttl: dotenvy::var("QR_SESSION_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.qr_ttl),

            cors_allow_any: dotenvy::var("CORS_ALLOW_ANY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cors_allow_any),

            rate_limits: RateLimits {
                login: per_minute("RATE_LIMIT_LOGIN_PER_MIN", defaults.rate_limits.login),
                qr_generate: per_minute(
                    "RATE_LIMIT_QR_GENERATE_PER_MIN",
                    defaults.rate_limits.qr_generate,
                ),
                qr_poll: per_minute("RATE_LIMIT_QR_POLL_PER_MIN", defaults.rate_limits.qr_poll),
            },
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn per_minute(var: &str, default: u32) -> u32 {
    dotenvy::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
