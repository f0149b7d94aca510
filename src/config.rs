#![forbid(unsafe_code)]

use anyhow::{Context, Result, anyhow};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;
pub const DEFAULT_VIEW_WINDOW_SECS: i64 = 30 * 60;
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
pub const DEFAULT_ABYSS_API_BASE_URL: &str = "https://api.abyss.to";
pub const DEFAULT_ABYSS_UPLOAD_BASE_URL: &str = "https://up.abyss.to";
pub const DEFAULT_ABYSS_EMBED_DOMAIN: &str = "abyss.to";
pub const DEFAULT_CLOUDINARY_FOLDER: &str = "video-thumbnails";

/// Credentials and endpoints for the external video host.
#[derive(Debug, Clone)]
pub struct AbyssSettings {
    pub api_key: String,
    pub api_base_url: String,
    pub upload_base_url: String,
    pub embed_domain: String,
}

/// Cloudinary is optional; thumbnails fall back to the host URL without it.
#[derive(Debug, Clone)]
pub struct CloudinarySettings {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub admin_password: String,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub view_window_secs: i64,
    pub frontend_origins: Vec<String>,
    /// Take the viewer address from `X-Forwarded-For` instead of the socket peer.
    pub trust_proxy: bool,
    pub abyss: AbyssSettings,
    pub cloudinary: Option<CloudinarySettings>,
}

impl RuntimeConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("catalog.db")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub data_dir: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub env_path: Option<PathBuf>,
    pub trust_proxy: Option<bool>,
}

pub fn resolve_runtime_config(overrides: RuntimeOverrides) -> Result<RuntimeConfig> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_runtime_config_with_overrides(&file_vars, env_var_string, overrides)
}

#[cfg(test)]
fn build_runtime_config(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<RuntimeConfig> {
    build_runtime_config_with_overrides(file_vars, env_lookup, RuntimeOverrides::default())
}

fn build_runtime_config_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> Result<RuntimeConfig> {
    let lookup = |key: &str| lookup_value(key, file_vars, &env_lookup);
    let required = |key: &str| lookup(key).ok_or_else(|| anyhow!("{key} not set"));

    let data_dir = overrides
        .data_dir
        .map(|path| path.to_string_lossy().into_owned())
        .or_else(|| lookup("DATA_DIR"))
        .ok_or_else(|| anyhow!("DATA_DIR not set"))?;
    let port = overrides
        .port
        .or_else(|| lookup("PORT").and_then(|value| value.parse::<u16>().ok()))
        .unwrap_or(DEFAULT_PORT);
    let host = overrides
        .host
        .and_then(|value| {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        })
        .or_else(|| lookup("VIDVAULT_HOST"))
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());

    let admin_password = required("ADMIN_PASSWORD")?;
    let jwt_secret = required("JWT_SECRET")?;
    let token_ttl_hours = parse_positive(lookup("TOKEN_TTL_HOURS"), "TOKEN_TTL_HOURS")?
        .unwrap_or(DEFAULT_TOKEN_TTL_HOURS);
    let view_window_secs = parse_positive(lookup("VIEW_WINDOW_SECS"), "VIEW_WINDOW_SECS")?
        .unwrap_or(DEFAULT_VIEW_WINDOW_SECS);

    let frontend_origins = lookup("FRONTEND_URL")
        .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string())
        .split(',')
        .map(|origin| origin.trim().to_string())
        .filter(|origin| !origin.is_empty())
        .collect();

    let trust_proxy = match overrides.trust_proxy {
        Some(value) => value,
        None => parse_flag(lookup("TRUST_PROXY"), "TRUST_PROXY")?.unwrap_or(false),
    };

    let abyss = AbyssSettings {
        api_key: lookup("ABYSS_API_KEY").unwrap_or_default(),
        api_base_url: lookup("ABYSS_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_ABYSS_API_BASE_URL.to_string()),
        upload_base_url: lookup("ABYSS_UPLOAD_BASE_URL")
            .unwrap_or_else(|| DEFAULT_ABYSS_UPLOAD_BASE_URL.to_string()),
        embed_domain: lookup("ABYSS_EMBED_DOMAIN")
            .unwrap_or_else(|| DEFAULT_ABYSS_EMBED_DOMAIN.to_string()),
    };

    let cloudinary = match (
        lookup("CLOUDINARY_CLOUD_NAME"),
        lookup("CLOUDINARY_API_KEY"),
        lookup("CLOUDINARY_API_SECRET"),
    ) {
        (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinarySettings {
            cloud_name,
            api_key,
            api_secret,
            folder: lookup("CLOUDINARY_FOLDER")
                .unwrap_or_else(|| DEFAULT_CLOUDINARY_FOLDER.to_string()),
        }),
        _ => None,
    };

    Ok(RuntimeConfig {
        data_dir: PathBuf::from(data_dir),
        host,
        port,
        admin_password,
        jwt_secret,
        token_ttl_hours,
        view_window_secs,
        frontend_origins,
        trust_proxy,
        abyss,
        cloudinary,
    })
}

fn parse_positive(raw: Option<String>, key: &str) -> Result<Option<i64>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value = raw
        .parse::<i64>()
        .with_context(|| format!("{key} must be a whole number"))?;
    if value <= 0 {
        return Err(anyhow!("{key} must be positive"));
    }
    Ok(Some(value))
}

fn parse_flag(raw: Option<String>, key: &str) -> Result<Option<bool>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(anyhow!("{key} must be true or false")),
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key)
        .or_else(|| file_vars.get(key).cloned())
        .filter(|value| !value.trim().is_empty())
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
