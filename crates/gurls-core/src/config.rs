use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::{errors::Error, utils::parse_duration, Result};

const DEFAULT_CONFIG_PATH: &str = "config/local.yml";
const DEFAULT_ENV: &str = "production";
const DEFAULT_BACKEND_ADDRESS: &str = "localhost:50051";
const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Typed configuration for the bot process.
#[derive(Clone, Debug)]
pub struct Config {
    /// Deployment environment; `production` switches logging to JSON.
    pub env: String,

    // Telegram
    pub telegram_token: String,

    // Shortening service
    pub backend_address: String,
    pub backend_timeout: Duration,

    /// Public base URL short links are joined onto (`{base_url}/{alias}`).
    pub base_url: String,
}

/// On-disk layout of the optional YAML config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    env: Option<String>,
    telegram: TelegramSection,
    grpc_client: GrpcClientSection,
    http_server: HttpServerSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TelegramSection {
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GrpcClientSection {
    backend_address: Option<String>,
    timeout: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HttpServerSection {
    base_url: Option<String>,
}

impl Config {
    /// Load configuration: `.env` → YAML file at `CONFIG_PATH` (if present) →
    /// environment overrides → defaults.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let path = env_path("CONFIG_PATH").unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let file = if path.is_file() {
            let raw = fs::read_to_string(&path)?;
            serde_yaml::from_str::<FileConfig>(&raw)?
        } else {
            FileConfig::default()
        };

        Self::resolve(file, env_str)
    }

    fn resolve(file: FileConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let pick = |key: &str, from_file: Option<String>| lookup(key).and_then(non_empty).or(from_file);

        let env = pick("ENV", file.env).unwrap_or_else(|| DEFAULT_ENV.to_string());

        let telegram_token = pick("TELEGRAM_TOKEN", file.telegram.token)
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("TELEGRAM_TOKEN environment variable is required".to_string())
            })?;

        let backend_address = pick("GRPC_BACKEND_ADDRESS", file.grpc_client.backend_address)
            .unwrap_or_else(|| DEFAULT_BACKEND_ADDRESS.to_string());

        let backend_timeout = match pick("GRPC_CLIENT_TIMEOUT", file.grpc_client.timeout) {
            Some(raw) => parse_duration(raw.trim())
                .and_then(|d| d.to_std().ok())
                .filter(|d| !d.is_zero())
                .ok_or_else(|| Error::Config(format!("invalid GRPC_CLIENT_TIMEOUT: {raw}")))?,
            None => DEFAULT_BACKEND_TIMEOUT,
        };

        let base_url = pick("BASE_URL", file.http_server.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            env,
            telegram_token,
            backend_address,
            backend_timeout,
            base_url,
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
