//! Persisted settings and environment overrides, resolved into a validated runtime config.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::Deserialize;

/// File name used under the per-user config directory.
const SETTINGS_FILE: &str = "settings.json";
/// Default name of the persisted OAuth token.
const TOKEN_FILE: &str = "token.json";

/// Environment variable names recognised on top of `settings.json`.
pub mod vars {
    pub const IMAGE_FOLDER: &str = "IMAGE_FOLDER";
    pub const DRIVE_FOLDER_ID: &str = "GOOGLE_DRIVE_FOLDER_ID";
    pub const POLL_INTERVAL_SECS: &str = "REMEM_POLL_INTERVAL_SECS";
    pub const COOLDOWN_SECS: &str = "REMEM_COOLDOWN_SECS";
    pub const TOKEN_FILE: &str = "REMEM_TOKEN_FILE";
    pub const CLIENT_SECRET_FILE: &str = "REMEM_CLIENT_SECRET_FILE";
    pub const REDIRECT_PORT: &str = "REMEM_REDIRECT_PORT";
}

/// Settings persisted to `settings.json`. Every field may be overridden from the environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding the local images.
    pub image_folder: Option<PathBuf>,
    /// Drive folder watched for uploads.
    pub drive_folder_id: Option<String>,
    /// Seconds between two remote snapshots.
    pub poll_interval_secs: u64,
    /// Seconds to stay dark after a new upload.
    pub cooldown_secs: u64,
    /// Where the OAuth token is kept across runs.
    pub token_file: Option<PathBuf>,
    /// OAuth client secret used to bootstrap authorization.
    pub client_secret_file: PathBuf,
    /// Local port the authorization redirect lands on.
    pub redirect_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            image_folder: None,
            drive_folder_id: None,
            poll_interval_secs: 5,
            cooldown_secs: 3600,
            token_file: None,
            client_secret_file: PathBuf::from("credentials.json"),
            redirect_port: 8080,
        }
    }
}

/// Validated configuration the rest of the program runs on.
#[derive(Debug, Clone)]
pub struct Config {
    pub image_folder: PathBuf,
    pub drive_folder_id: String,
    pub poll_interval: Duration,
    pub cooldown: Duration,
    pub token_file: PathBuf,
    pub client_secret_file: PathBuf,
    pub redirect_port: u16,
}

impl Settings {
    /// Apply environment overrides and validate the result.
    ///
    /// `env` looks a variable up by name; production passes `std::env::var`.
    pub fn resolve<F>(self, env: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        let image_folder = lookup(vars::IMAGE_FOLDER)
            .map(PathBuf::from)
            .or(self.image_folder)
            .ok_or_else(|| anyhow!("{} is not set", vars::IMAGE_FOLDER))?;
        if !image_folder.is_dir() {
            bail!("image folder {} is not a directory", image_folder.display());
        }

        let drive_folder_id = lookup(vars::DRIVE_FOLDER_ID)
            .or(self.drive_folder_id)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow!("{} is not set", vars::DRIVE_FOLDER_ID))?;

        let poll_interval_secs = parse_var(&lookup, vars::POLL_INTERVAL_SECS)?
            .unwrap_or(self.poll_interval_secs);
        let cooldown_secs = parse_var(&lookup, vars::COOLDOWN_SECS)?.unwrap_or(self.cooldown_secs);
        if poll_interval_secs == 0 {
            bail!("poll interval must be at least one second");
        }
        if cooldown_secs == 0 {
            bail!("cooldown must be at least one second");
        }

        let token_file = match lookup(vars::TOKEN_FILE).map(PathBuf::from).or(self.token_file) {
            Some(path) => path,
            None => default_token_path()?,
        };
        let client_secret_file = lookup(vars::CLIENT_SECRET_FILE)
            .map(PathBuf::from)
            .unwrap_or(self.client_secret_file);
        let redirect_port =
            parse_var(&lookup, vars::REDIRECT_PORT)?.unwrap_or(self.redirect_port);

        Ok(Config {
            image_folder,
            drive_folder_id,
            poll_interval: Duration::from_secs(poll_interval_secs),
            cooldown: Duration::from_secs(cooldown_secs),
            token_file,
            client_secret_file,
            redirect_port,
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("{key} has an invalid value {raw:?}"))
        })
        .transpose()
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "remem", "remem").ok_or_else(|| anyhow!("cannot determine config directory"))
}

/// Build the settings path and ensure the directory exists.
fn settings_path() -> Result<PathBuf> {
    let proj_dirs = project_dirs()?;
    let config_dir = proj_dirs.config_dir();
    fs::create_dir_all(config_dir)?;
    Ok(config_dir.join(SETTINGS_FILE))
}

fn default_token_path() -> Result<PathBuf> {
    let proj_dirs = project_dirs()?;
    let config_dir = proj_dirs.config_dir();
    fs::create_dir_all(config_dir)
        .with_context(|| format!("failed to create {}", config_dir.display()))?;
    Ok(config_dir.join(TOKEN_FILE))
}

/// Load settings from disk, returning defaults when missing.
pub fn load() -> Settings {
    let path = match settings_path() {
        Ok(path) => path,
        Err(_) => return Settings::default(),
    };
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(_) => return Settings::default(),
    };
    serde_json::from_str(&contents).unwrap_or_else(|err| {
        tracing::warn!("ignoring malformed {}: {err}", path.display());
        Settings::default()
    })
}
