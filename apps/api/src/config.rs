use anyhow::{bail, Context, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Non-persistent; for local demos.
    Memory,
}

#[derive(Debug, Clone)]
pub struct EmailApiConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub run_migrations: bool,
    pub port: u16,
    pub rust_log: String,
    pub public_base_url: String,
    /// `None` logs emails instead of sending them.
    pub email_api: Option<EmailApiConfig>,
    /// 0 disables the in-process ticker.
    pub workflow_tick_secs: u64,
    pub workflow_claim_lease_secs: u64,
    pub auto_assign_leads: bool,
    pub default_budget_ceiling: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let store_backend = match optional_env("STORE_BACKEND")
            .unwrap_or_else(|| "postgres".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => bail!("STORE_BACKEND must be 'postgres' or 'memory', got '{other}'"),
        };

        let database_url = match store_backend {
            StoreBackend::Postgres => Some(require_env("DATABASE_URL")?),
            StoreBackend::Memory => optional_env("DATABASE_URL"),
        };

        let email_api = match (optional_env("EMAIL_API_URL"), optional_env("EMAIL_API_KEY")) {
            (Some(api_url), Some(api_key)) => Some(EmailApiConfig {
                api_url,
                api_key,
                from: optional_env("EMAIL_FROM")
                    .unwrap_or_else(|| "no-reply@localhost".to_string()),
            }),
            _ => None,
        };

        Ok(Config {
            store_backend,
            database_url,
            run_migrations: flag_env("RUN_MIGRATIONS", true)?,
            port: parsed_env("PORT", 8080)?,
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            public_base_url: optional_env("PUBLIC_BASE_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            email_api,
            workflow_tick_secs: parsed_env("WORKFLOW_TICK_SECS", 0)?,
            workflow_claim_lease_secs: parsed_env("WORKFLOW_CLAIM_LEASE_SECS", 60)?,
            auto_assign_leads: flag_env("AUTO_ASSIGN_LEADS", true)?,
            default_budget_ceiling: parsed_env("DEFAULT_BUDGET_CEILING", 10_000_000.0)?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

fn flag_env(key: &str, default: bool) -> Result<bool> {
    match optional_env(key) {
        Some(raw) => parse_flag(&raw).with_context(|| format!("{key} must be true or false")),
        None => Ok(default),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag_accepts_common_spellings() {
        assert_eq!(parse_flag(" TRUE "), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
