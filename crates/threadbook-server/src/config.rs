use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Placeholder secrets that must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me", "change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub session_secret: String,
    pub centrifugo: CentrifugoConfig,
    /// Voice is disabled when the media service is not configured.
    pub livekit: Option<LiveKitConfig>,
}

#[derive(Debug, Clone)]
pub struct CentrifugoConfig {
    /// `None` selects the in-process broker.
    pub api_url: Option<String>,
    pub api_key: String,
    pub token_secret: String,
    pub token_issuer: Option<String>,
    pub token_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct LiveKitConfig {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
    pub token_ttl: Duration,
    pub empty_room_ttl_secs: u32,
    pub max_participants: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = parse_or(&get, "THREADBOOK_PORT", 8080u16)?;

        let centrifugo = CentrifugoConfig {
            api_url: get("CENTRIFUGO_API_URL"),
            api_key: get("CENTRIFUGO_API_KEY").unwrap_or_default(),
            token_secret: secret(&get, "CENTRIFUGO_TOKEN_SECRET")?,
            token_issuer: get("CENTRIFUGO_TOKEN_ISSUER"),
            token_ttl: Duration::from_secs(parse_or(&get, "CENTRIFUGO_TOKEN_TTL_SECS", 3600u64)?),
        };

        let livekit = match get("LIVEKIT_URL") {
            None => None,
            Some(url) => Some(LiveKitConfig {
                url,
                api_key: get("LIVEKIT_API_KEY").context("LIVEKIT_API_KEY is required when LIVEKIT_URL is set")?,
                api_secret: secret(&get, "LIVEKIT_API_SECRET")?,
                token_ttl: Duration::from_secs(parse_or(&get, "LIVEKIT_TOKEN_TTL_SECS", 900u64)?),
                empty_room_ttl_secs: parse_or(&get, "LIVEKIT_EMPTY_ROOM_TTL_SECS", 300u32)?,
                max_participants: parse_or(&get, "LIVEKIT_MAX_PARTICIPANTS", 50u32)?,
            }),
        };

        Ok(Self {
            host: get("THREADBOOK_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: get("THREADBOOK_DB_PATH").unwrap_or_else(|| "threadbook.db".into()).into(),
            session_secret: secret(&get, "THREADBOOK_SESSION_SECRET")?,
            centrifugo,
            livekit,
        })
    }
}

fn secret(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    match get(key) {
        None => bail!("{} is unset", key),
        Some(value) if PLACEHOLDER_SECRETS.contains(&value.as_str()) => {
            bail!("{} is still a placeholder; set a random value", key)
        }
        Some(value) => Ok(value),
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().with_context(|| format!("{} has invalid value '{}'", key, raw)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("THREADBOOK_SESSION_SECRET", "s3ssion"),
        ("CENTRIFUGO_TOKEN_SECRET", "tr4nsport"),
    ];

    #[test]
    fn defaults_apply() {
        let config = load(REQUIRED).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.db_path, PathBuf::from("threadbook.db"));
        assert!(config.centrifugo.api_url.is_none());
        assert_eq!(config.centrifugo.token_ttl, Duration::from_secs(3600));
        assert!(config.livekit.is_none());
    }

    #[test]
    fn placeholder_and_missing_secrets_abort() {
        assert!(load(&[("CENTRIFUGO_TOKEN_SECRET", "tr4nsport")]).is_err());
        assert!(load(&[("THREADBOOK_SESSION_SECRET", "change-me"), ("CENTRIFUGO_TOKEN_SECRET", "x")]).is_err());
        assert!(load(&[("THREADBOOK_SESSION_SECRET", "x"), ("CENTRIFUGO_TOKEN_SECRET", "  ")]).is_err());
    }

    #[test]
    fn livekit_block_is_all_or_nothing() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("LIVEKIT_URL", "wss://lk.example.com"));
        assert!(load(&vars).is_err());

        vars.push(("LIVEKIT_API_KEY", "APIkey"));
        vars.push(("LIVEKIT_API_SECRET", "dev-secret-change-me"));
        assert!(load(&vars).is_err());

        vars.pop();
        vars.push(("LIVEKIT_API_SECRET", "lk-secret"));
        vars.push(("LIVEKIT_MAX_PARTICIPANTS", "8"));
        let livekit = load(&vars).unwrap().livekit.unwrap();
        assert_eq!(livekit.max_participants, 8);
        assert_eq!(livekit.token_ttl, Duration::from_secs(900));
        assert_eq!(livekit.empty_room_ttl_secs, 300);
    }

    #[test]
    fn bad_numbers_are_reported() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("THREADBOOK_PORT", "eighty"));
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("THREADBOOK_PORT"));
    }
}
