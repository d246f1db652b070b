//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::ConfigError;

/// Settings for the HTTP server, loaded once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Credential every protected call must present
    pub secret_key: String,
    /// Passphrase exchanged for `secret_key` at login
    pub login_password: String,
    /// Where finished clips are written; temporary files go to `tmp/` inside it
    pub output_dir: PathBuf,
    pub ytdlp_bin: PathBuf,
    pub ffmpeg_bin: PathBuf,
    /// Origin allowed to call the API from a browser
    pub cors_origin: String,
    pub json_logs: bool,
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| var(key).ok_or(ConfigError::Missing(key));

        let port = match var("PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key: "PORT", value: raw })?,
            None => 3000,
        };

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            secret_key: required("SECRET_KEY")?,
            login_password: required("LOGIN_PASSWORD")?,
            output_dir: var("OUTPUT_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("downloads")),
            ytdlp_bin: var("YTDLP_BIN").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("yt-dlp")),
            ffmpeg_bin: var("FFMPEG_BIN").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("ffmpeg")),
            cors_origin: var("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string()),
            json_logs: var("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|_| ConfigError::Invalid { key: "HOST", value: raw })
    }
}
