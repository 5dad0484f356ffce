use std::{env, fs, path::Path, str::FromStr, time::Duration};

use crate::{errors::Error, ownership::SyncConfig, reconcile::ReconcileConfig, Result};

/// Where device and user rows live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    /// The DataBase REST API.
    Http,
    /// Process-local maps; state is lost on exit.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "http" | "api" => Ok(StoreBackend::Http),
            "memory" | "mem" => Ok(StoreBackend::Memory),
            other => Err(Error::Config(format!(
                "STORE_BACKEND must be `http` or `memory`, got `{other}`"
            ))),
        }
    }
}

/// Typed configuration for the bot and the reconciliation job.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,

    // Stores
    pub api_base_url: String,
    pub store_backend: StoreBackend,
    pub http_timeout: Duration,
    pub store_timeout: Duration,

    // Ownership sync
    pub serialize_membership_writes: bool,

    // Reconciliation
    pub reconcile_delete_orphans: bool,
    pub reconcile_orphan_grace: Duration,
    /// How often the bot runs a pass in-process; zero turns it off.
    pub reconcile_interval: Duration,

    // Add-device dialog limits (chars)
    pub device_title_max_len: usize,
    pub device_description_max_len: usize,
    pub device_address_max_len: usize,
}

impl Config {
    /// Read the environment, after loading `.env` from the working dir if present.
    ///
    /// The bot token is not required here; binaries that talk to Telegram call
    /// [`Config::require_bot_token`].
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let defaults = Self::for_tests();

        let store_backend = match env_str("STORE_BACKEND").and_then(non_empty) {
            Some(v) => v.parse()?,
            None => StoreBackend::Http,
        };

        let api_base_url = env_str("API_BASE_URL")
            .and_then(non_empty)
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base_url);
        if store_backend == StoreBackend::Http
            && !(api_base_url.starts_with("http://") || api_base_url.starts_with("https://"))
        {
            return Err(Error::Config(format!(
                "API_BASE_URL must be an http(s) URL, got `{api_base_url}`"
            )));
        }

        let http_timeout = Duration::from_millis(env_u64("HTTP_TIMEOUT_MS").unwrap_or(30_000));
        let store_timeout = Duration::from_millis(env_u64("STORE_TIMEOUT_MS").unwrap_or(10_000));
        if store_timeout.is_zero() || http_timeout.is_zero() {
            return Err(Error::Config(
                "HTTP_TIMEOUT_MS and STORE_TIMEOUT_MS must be positive".to_string(),
            ));
        }

        Ok(Self {
            telegram_bot_token: env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
            api_base_url,
            store_backend,
            http_timeout,
            store_timeout,
            serialize_membership_writes: env_bool("SERIALIZE_MEMBERSHIP_WRITES")
                .unwrap_or(defaults.serialize_membership_writes),
            reconcile_delete_orphans: env_bool("RECONCILE_DELETE_ORPHANS")
                .unwrap_or(defaults.reconcile_delete_orphans),
            reconcile_orphan_grace: env_u64("RECONCILE_ORPHAN_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.reconcile_orphan_grace),
            reconcile_interval: env_u64("RECONCILE_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.reconcile_interval),
            device_title_max_len: env_usize("DEVICE_TITLE_MAX_LEN")
                .unwrap_or(defaults.device_title_max_len),
            device_description_max_len: env_usize("DEVICE_DESCRIPTION_MAX_LEN")
                .unwrap_or(defaults.device_description_max_len),
            device_address_max_len: env_usize("DEVICE_ADDRESS_MAX_LEN")
                .unwrap_or(defaults.device_address_max_len),
        })
    }

    /// Defaults without touching the environment, on the in-memory backend.
    pub fn for_tests() -> Self {
        Self {
            telegram_bot_token: String::new(),
            api_base_url: "http://database:8000".to_string(),
            store_backend: StoreBackend::Memory,
            http_timeout: Duration::from_secs(30),
            store_timeout: Duration::from_secs(10),
            serialize_membership_writes: true,
            reconcile_delete_orphans: false,
            reconcile_orphan_grace: Duration::from_secs(300),
            reconcile_interval: Duration::from_secs(3600),
            device_title_max_len: 100,
            device_description_max_len: 500,
            device_address_max_len: 200,
        }
    }

    pub fn require_bot_token(&self) -> Result<&str> {
        let token = self.telegram_bot_token.trim();
        if token.is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }
        Ok(token)
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            store_timeout: self.store_timeout,
            serialize_membership_writes: self.serialize_membership_writes,
        }
    }

    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            store_timeout: self.store_timeout,
            delete_orphans: self.reconcile_delete_orphans,
            orphan_grace: self.reconcile_orphan_grace,
        }
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };
    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_none() {
            env::set_var(key, val);
        }
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = &val[1..val.len() - 1];
        }
        out.push((key.to_string(), val.to_string()));
    }
    out
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).and_then(|s| parse_bool(&s))
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
